//! Engine and link parameters.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use validator::Validate;

use ringswitch_core::engine::EngineSettings;
use ringswitch_core::flush::TransferMode;
use ringswitch_core::jitter::JitterSettings;

use crate::validation;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct EngineConfig {
    /// Owner name in the interface registry.
    #[validate(custom(function = validation::validate_engine_name))]
    pub name: String,

    pub transfer: TransferMode,

    /// TX syncs attempted before staged slots are discarded.
    #[validate(range(max = 1024))]
    pub tx_retries: u32,

    pub jitter: JitterSettings,

    /// Pause after linking while the NIC resets its PHY.
    #[validate(range(max = 60000))]
    pub link_settle_ms: u64,

    /// Pause after reading a slot with an implausible buffer index.
    #[validate(range(max = 60000))]
    pub bogus_index_pause_ms: u64,

    /// Extra buffers requested when opening a physical interface.
    pub extra_bufs: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            name: "engine0".into(),
            transfer: TransferMode::Swap,
            tx_retries: 8,
            jitter: JitterSettings::default(),
            link_settle_ms: 2000,
            bogus_index_pause_ms: 1000,
            extra_bufs: 0,
        }
    }
}

impl EngineConfig {
    pub fn settings(&self) -> EngineSettings {
        EngineSettings {
            name: self.name.clone(),
            transfer: self.transfer,
            tx_retries: self.tx_retries,
            jitter: self.jitter,
            link_settle: Duration::from_millis(self.link_settle_ms),
            bogus_index_pause: Duration::from_millis(self.bogus_index_pause_ms),
            extra_bufs: self.extra_bufs,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct LinkConfig {
    #[validate(custom(function = validation::validate_endpoint))]
    pub interface: String,

    /// Slots consumed per RX ring and cycle while no rule exists.
    #[validate(range(min = 1, max = 4096))]
    pub batch_size: u16,

    /// Hardware queue to read; required when another engine holds the
    /// interface.
    pub queue_id: Option<u16>,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            interface: "eth0".into(),
            batch_size: 512,
            queue_id: None,
        }
    }
}

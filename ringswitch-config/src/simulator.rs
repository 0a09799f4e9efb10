//! In-memory substrate and traffic parameters for `ringswitch simulate`.

use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::validation;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct SimulatorConfig {
    /// Seed for the traffic generator.
    pub seed: u64,

    /// Distinct flows in the generated traffic.
    #[validate(range(min = 1, max = 65536))]
    pub flows: usize,

    /// RX/TX ring pairs of the linked interface.
    #[validate(range(min = 1, max = 64))]
    pub rings: u16,

    /// Slots per ring.
    #[validate(range(min = 8, max = 16384), custom(function = validation::validate_power_of_two))]
    pub ring_size: u32,

    /// Bytes per buffer.
    #[validate(range(min = 128, max = 65535))]
    pub buf_size: usize,

    /// Poll cycles to run; 0 runs until interrupted.
    pub cycles: u64,

    /// Frames injected per RX ring before each cycle.
    #[validate(range(min = 1))]
    pub frames_per_cycle: u32,

    /// Embedded into the payload of every `marker_every`-th frame.
    pub marker: Option<String>,

    #[validate(range(min = 1))]
    pub marker_every: u32,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            flows: 16,
            rings: 1,
            ring_size: 256,
            buf_size: 2048,
            cycles: 100,
            frames_per_cycle: 64,
            marker: None,
            marker_every: 10,
        }
    }
}

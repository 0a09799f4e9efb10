//! ## ringswitch-core::jitter
//! **Perturbation of SHARE child selection**
//!
//! With jitter off the SHARE choice is pure `flow_hash mod children`, which
//! keeps every packet of a flow on the same child. Random jitter spreads a
//! single heavy flow over all children at the cost of flow affinity.

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JitterMode {
    #[default]
    Off,
    Random,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JitterSettings {
    #[serde(default)]
    pub mode: JitterMode,
    /// Largest value a draw may return (inclusive).
    #[serde(default)]
    pub bound: u32,
    #[serde(default)]
    pub seed: u64,
}

#[derive(Debug)]
pub struct JitterSource {
    mode: JitterMode,
    bound: u32,
    rng: SmallRng,
}

impl JitterSource {
    pub fn new(settings: JitterSettings) -> Self {
        Self {
            mode: settings.mode,
            bound: settings.bound,
            rng: SmallRng::seed_from_u64(settings.seed),
        }
    }

    /// Source that always yields zero.
    pub fn off() -> Self {
        Self::new(JitterSettings::default())
    }

    #[inline]
    pub fn draw(&mut self) -> u32 {
        match self.mode {
            JitterMode::Off => 0,
            JitterMode::Random => self.rng.random_range(0..=self.bound),
        }
    }
}

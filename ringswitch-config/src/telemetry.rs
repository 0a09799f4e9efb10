//! Observability configuration.

use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::validation;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct TelemetryConfig {
    /// Fallback filter when `RUST_LOG` is unset.
    #[validate(custom(function = validation::validate_log_level))]
    pub log_level: String,

    /// Export engine counters in Prometheus text format.
    pub metrics: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: "info".into(),
            metrics: true,
        }
    }
}

//! # ringswitch telemetry
//!
//! Log subscriber setup and Prometheus export of engine counters.

pub mod logging;
pub mod metrics;

pub use logging::init_logging;
pub use metrics::MetricsRecorder;

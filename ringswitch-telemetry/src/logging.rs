//! ## ringswitch-telemetry::logging
//! **`tracing` subscriber setup**
//!
//! `RUST_LOG` wins when set; otherwise the configured level applies to every
//! target.

use tracing::info;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::{fmt, EnvFilter};

/// Installs the global fmt subscriber. Returns `false` if one was already set.
pub fn init_logging(default_level: &str) -> bool {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let installed = fmt()
        .with_env_filter(filter)
        .with_thread_names(true)
        .with_span_events(FmtSpan::CLOSE)
        .try_init()
        .is_ok();
    if installed {
        info!("Logging initialised at {default_level}");
    }
    installed
}

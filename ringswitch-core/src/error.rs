use thiserror::Error;

use crate::registry::RegistryError;
use crate::ring::RingError;
use crate::tree::FanOut;

#[derive(Debug, Error)]
pub enum SwitchError {
    #[error("Allocation failed: {0}")]
    Allocation(String),

    #[error("Interface {iface} is bound incompatibly: {source}")]
    BindingConflict {
        iface: String,
        #[source]
        source: RegistryError,
    },

    #[error("Interface {0} is shared with another engine, a hardware queue id is required")]
    QueueRequired(String),

    #[error("Unable to open {name}: {source}")]
    ChannelOpen {
        name: String,
        #[source]
        source: RingError,
    },

    /// No attachable source interface. Also returned when the source already
    /// carries a rule with a different fan-out mode.
    #[error("No appropriate source interface {0}")]
    SourceUnavailable(String),

    #[error("Fan-out mode {0:?} cannot carry channels")]
    InvalidMode(FanOut),

    #[error("Engine has no linked interface")]
    NotLinked,

    #[error("Engine is not running")]
    NotRunning,

    #[error("Ring error: {0}")]
    Ring(#[from] RingError),
}

//! # ringswitch-filter
//!
//! Frame predicates for rule-tree leaves: header field matches plus payload
//! byte patterns, compiled from a serializable [`FilterSpec`].

pub mod signatures;
pub mod spec;

use thiserror::Error;

pub use signatures::PatternSet;
pub use spec::{FilterSpec, FrameFilter};

#[derive(Debug, Error)]
pub enum FilterError {
    #[error("Empty pattern")]
    EmptyPattern,

    #[error("Invalid hex pattern {pattern}: {source}")]
    InvalidHex {
        pattern: String,
        #[source]
        source: hex::FromHexError,
    },

    #[error("Pattern compilation failed: {0}")]
    PatternError(String),
}

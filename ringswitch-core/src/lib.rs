//! # ringswitch-core
//!
//! Rule-tree packet switching over a zero-copy ring substrate.
//!
//! Every poll cycle drains the bound RX rings, routes each frame through the
//! fan-out tree, stages the selected slots per destination and finally
//! flushes them into the destination TX rings, either by swapping buffer
//! indices or by copying payload bytes.
//!
//! ### Key Submodules:
//! - `tree`: fan-out graph (`RuleTree`, `RuleNode`, `TerminalNode`) and staging queues
//! - `dispatch`: per-packet routing decision and the staging pass
//! - `flush`: swap/copy transfer into destination rings with bounded retry
//! - `builder`: link/unlink, channel creation, filters and teardown
//! - `engine`: the per-engine context and the poll loop
//! - `ring` / `registry`: collaborator traits for the ring substrate and
//!   the interface ownership registry

pub mod builder;
pub mod dispatch;
pub mod engine;
pub mod error;
pub mod filter;
pub mod flush;
pub mod frame;
pub mod hash;
pub mod jitter;
pub mod registry;
pub mod ring;
pub mod stats;
pub mod tree;

pub mod prelude {
    pub use crate::engine::{EngineSettings, StopHandle, SwitchEngine};
    pub use crate::error::SwitchError;
    pub use crate::filter::FilterGate;
    pub use crate::flush::TransferMode;
    pub use crate::hash::{FlowHash, SymmetricFlowHash};
    pub use crate::jitter::{JitterMode, JitterSettings};
    pub use crate::registry::{InterfaceRegistry, InterfaceTable, QueueMode};
    pub use crate::ring::{Direction, OpenFlags, PortId, RingId, RingProvider, Slot};
    pub use crate::stats::SwitchStats;
    pub use crate::tree::{peer_name, FanOut, RuleNode, RuleTree, TerminalNode};
}

pub use error::SwitchError;

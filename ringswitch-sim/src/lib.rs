/*!
# ringswitch-sim

In-memory ring substrate for driving switch engines without kernel-bypass
hardware.

## Key Components:
- **MemRingProvider:** netmap-like rings (slots, buffer indices, cursor/tail,
  TX synchronization) over one shared buffer pool, with stall injection.
- **TrafficGenerator:** seeded Ethernet/IPv4/UDP frame source.
- **Delivery digest:** BLAKE3 digest over everything transmitted, for
  comparing runs.
*/

use thiserror::Error;

pub mod provider;
pub mod traffic;

pub use provider::{MemRingProvider, SimSettings};
pub use traffic::TrafficGenerator;

#[derive(Debug, Error)]
pub enum SimError {
    #[error("Interface {0} already exists")]
    DuplicateInterface(String),

    #[error("Unknown interface: {0}")]
    UnknownInterface(String),

    #[error("Ring {ring} out of range for {iface}")]
    NoSuchRing { iface: String, ring: u16 },

    #[error("Frame of {len} bytes exceeds buffer size {max}")]
    FrameTooLarge { len: usize, max: usize },
}

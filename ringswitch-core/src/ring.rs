//! ## ringswitch-core::ring
//! **Zero-copy ring substrate surface**
//!
//! The substrate owns the rings, slots and buffers. The switch only ever
//! addresses them through [`RingProvider`], which keeps routing logic free of
//! any particular kernel-bypass backend.

use std::fmt;

use thiserror::Error;

/// Buffer indices below this value are reserved by the substrate and never
/// carry a frame.
pub const FIRST_VALID_BUFFER: u32 = 2;

#[derive(Debug, Error)]
pub enum RingError {
    #[error("No such interface: {0}")]
    NoSuchInterface(String),

    #[error("Queue {queue} out of range for {iface} ({available} queues)")]
    QueueOutOfRange {
        iface: String,
        queue: u16,
        available: u16,
    },

    #[error("Unknown port {0}")]
    UnknownPort(PortId),

    #[error("Synchronization failed: {0}")]
    Sync(String),
}

/// Handle of an open endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PortId(pub u32);

impl fmt::Display for PortId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "port#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Rx,
    Tx,
}

/// One ring of an open port, addressed by its position in the port's ring list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RingId {
    pub port: PortId,
    pub dir: Direction,
    pub index: u16,
}

impl RingId {
    #[inline]
    pub fn rx(port: PortId, index: u16) -> Self {
        Self {
            port,
            dir: Direction::Rx,
            index,
        }
    }

    #[inline]
    pub fn tx(port: PortId, index: u16) -> Self {
        Self {
            port,
            dir: Direction::Tx,
            index,
        }
    }
}

/// Per-slot flags.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SlotFlags(pub u16);

impl SlotFlags {
    /// The slot now points at a different buffer; the substrate must reload it.
    pub const BUF_CHANGED: SlotFlags = SlotFlags(0x0001);

    #[inline]
    pub fn contains(self, other: SlotFlags) -> bool {
        self.0 & other.0 == other.0
    }
}

/// A ring slot descriptor.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Slot {
    pub buf_idx: u32,
    pub len: u16,
    pub flags: SlotFlags,
}

/// Which hardware rings a port binds to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RingSelect {
    #[default]
    All,
    One(u16),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OpenFlags {
    /// Extra buffers to reserve in the shared region.
    pub extra_bufs: u32,
    /// Reuse the memory region of the `shared` handle instead of mapping a new one.
    pub no_mmap: bool,
    /// Take the interface name from the call, not from the shared handle.
    pub by_name: bool,
    pub rings: RingSelect,
}

impl OpenFlags {
    /// Flags for the process-wide handle of a physical interface.
    pub fn global(extra_bufs: u32, queue: Option<u16>) -> Self {
        Self {
            extra_bufs,
            no_mmap: false,
            by_name: false,
            rings: queue.map_or(RingSelect::All, RingSelect::One),
        }
    }

    /// Flags for an engine's local handle that piggybacks on a global one.
    pub fn local(queue: Option<u16>) -> Self {
        Self {
            extra_bufs: 0,
            no_mmap: true,
            by_name: true,
            rings: queue.map_or(RingSelect::All, RingSelect::One),
        }
    }

    /// Flags for an output channel sharing the engine's memory region.
    pub fn output() -> Self {
        Self {
            extra_bufs: 0,
            no_mmap: true,
            by_name: false,
            rings: RingSelect::All,
        }
    }
}

/// Ring substrate consumed by the switch.
///
/// `is_empty` follows the substrate convention for both directions: an RX ring
/// is empty when it holds no received frames, a TX ring is empty when it has
/// no free slots left.
pub trait RingProvider {
    fn open(
        &mut self,
        name: &str,
        flags: OpenFlags,
        shared: Option<PortId>,
    ) -> Result<PortId, RingError>;

    fn close(&mut self, port: PortId);

    fn ring_count(&self, port: PortId, dir: Direction) -> u16;

    /// Number of slots in the ring.
    fn ring_size(&self, ring: RingId) -> u32;

    fn is_empty(&self, ring: RingId) -> bool;

    /// Slots available to the switch (frames to read, or free TX slots).
    fn space(&self, ring: RingId) -> u32;

    fn cursor(&self, ring: RingId) -> u32;

    /// Hands the slot under the cursor back to the substrate and moves on.
    fn advance(&mut self, ring: RingId);

    fn slot(&self, ring: RingId, index: u32) -> Slot;

    fn set_slot(&mut self, ring: RingId, index: u32, slot: Slot);

    /// Full buffer behind `buf_idx`, or an empty slice for an invalid index.
    fn buffer(&self, ring: RingId, buf_idx: u32) -> &[u8];

    /// Copies `len` bytes between two buffers.
    fn copy_payload(&mut self, src: (RingId, u32), dst: (RingId, u32), len: usize);

    /// Asks the substrate to reconcile ring state (reclaim completed TX slots,
    /// or pick up newly received frames).
    fn sync(&mut self, port: PortId, dir: Direction) -> Result<(), RingError>;

    /// Whether two handles map the same buffer region (zero-copy possible).
    fn shares_memory(&self, a: PortId, b: PortId) -> bool;

    /// Frame bytes held by `slot`.
    fn frame(&self, ring: RingId, slot: &Slot) -> &[u8] {
        let buf = self.buffer(ring, slot.buf_idx);
        &buf[..buf.len().min(slot.len as usize)]
    }
}

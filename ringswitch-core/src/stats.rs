//! Engine counters.
//!
//! Counters live in the engine context and are only touched by the polling
//! thread, so plain integers are enough.

use serde::Serialize;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SwitchStats {
    /// Frames drained from RX rings.
    pub packets: u64,
    /// Bytes drained from RX rings.
    pub bytes: u64,
    /// Frames consumed without any rule in place.
    pub dropped: u64,
    /// (ring, slot) entries recorded against leaves.
    pub staged: u64,
    /// Staged entries written into destination TX rings.
    pub forwarded: u64,
    /// Staged entries given up after the retry budget ran out.
    pub discarded: u64,
    /// Slots carrying an implausible buffer index.
    pub bogus_slots: u64,
    /// TX synchronization requests issued while retrying.
    pub tx_syncs: u64,
}

impl SwitchStats {
    /// Counter increments since `earlier`.
    pub fn since(&self, earlier: &SwitchStats) -> SwitchStats {
        SwitchStats {
            packets: self.packets - earlier.packets,
            bytes: self.bytes - earlier.bytes,
            dropped: self.dropped - earlier.dropped,
            staged: self.staged - earlier.staged,
            forwarded: self.forwarded - earlier.forwarded,
            discarded: self.discarded - earlier.discarded,
            bogus_slots: self.bogus_slots - earlier.bogus_slots,
            tx_syncs: self.tx_syncs - earlier.tx_syncs,
        }
    }
}

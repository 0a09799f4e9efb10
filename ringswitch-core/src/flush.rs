//! ## ringswitch-core::flush
//! **Transfer of staged slots into destination rings**
//!
//! Runs once per poll cycle. For every leaf with staged entries the
//! destination TX rings are scanned from the first one; when they fill up the
//! engine asks the substrate to reclaim completed slots and scans again, at
//! most `retries` times. Whatever is still staged after that is discarded.
//! Either way the leaf starts the next cycle empty.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::ring::{Direction, PortId, RingId, RingProvider, SlotFlags};
use crate::tree::{FanOut, Leaf, Role, RuleNode, StagedSlot};

/// How payloads reach the destination ring.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransferMode {
    /// Exchange buffer indices between source and destination slots.
    #[default]
    Swap,
    /// Copy payload bytes; the source buffer stays in RX circulation.
    Copy,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlushOutcome {
    pub forwarded: u64,
    pub discarded: u64,
    pub tx_syncs: u64,
}

impl FlushOutcome {
    fn absorb(&mut self, other: FlushOutcome) {
        self.forwarded += other.forwarded;
        self.discarded += other.discarded;
        self.tx_syncs += other.tx_syncs;
    }
}

/// Drains every staged leaf below `rule`. Nested rules are flushed before
/// the leaves beside them; within each pass children go in order.
///
/// A slot staged on several leaves must stay in the RX ring until the last of
/// them is served, so below a COPY rule with more than one child payloads are
/// copied whatever `mode` says.
pub fn flush<P: RingProvider + ?Sized>(
    rule: &mut RuleNode,
    provider: &mut P,
    mode: TransferMode,
    retries: u32,
) -> FlushOutcome {
    let mode = effective_mode(rule, mode);
    let mut outcome = FlushOutcome::default();
    for child in rule.children.iter_mut() {
        if let Role::Branch(nested) = &mut child.role {
            outcome.absorb(flush(nested, provider, mode, retries));
        }
    }
    for child in rule.children.iter_mut() {
        if let Role::Leaf(leaf) = &mut child.role {
            if !leaf.queue.is_empty() {
                outcome.absorb(drain_leaf(leaf, child.channel, provider, mode, retries));
            }
        }
    }
    outcome
}

#[inline]
fn effective_mode(rule: &RuleNode, mode: TransferMode) -> TransferMode {
    if rule.mode == FanOut::Copy && rule.count() > 1 {
        TransferMode::Copy
    } else {
        mode
    }
}

fn drain_leaf<P: RingProvider + ?Sized>(
    leaf: &mut Leaf,
    channel: PortId,
    provider: &mut P,
    mode: TransferMode,
    retries: u32,
) -> FlushOutcome {
    let staged = leaf.queue.entries();
    let total = staged.len();
    let tx_rings = provider.ring_count(channel, Direction::Tx);
    let mut done = 0;
    let mut budget = retries;
    let mut tx_syncs = 0;

    loop {
        for index in 0..tx_rings {
            if done == total {
                break;
            }
            let ring = RingId::tx(channel, index);
            while done < total && !provider.is_empty(ring) {
                transfer(provider, staged[done], ring, mode);
                provider.advance(ring);
                done += 1;
            }
        }

        if done == total || budget == 0 {
            break;
        }
        budget -= 1;
        tx_syncs += 1;
        if let Err(e) = provider.sync(channel, Direction::Tx) {
            warn!("TX sync on {channel} failed: {e}");
        }
    }

    let leftover = (total - done) as u64;
    if leftover > 0 {
        debug!("{leftover} buffers leftover on {channel}");
    }
    leaf.counters.forwarded += done as u64;
    leaf.counters.discarded += leftover;
    leaf.queue.reset();

    FlushOutcome {
        forwarded: done as u64,
        discarded: leftover,
        tx_syncs,
    }
}

/// Moves one staged frame into the slot under the cursor of `dst_ring`.
#[inline]
fn transfer<P: RingProvider + ?Sized>(
    provider: &mut P,
    entry: StagedSlot,
    dst_ring: RingId,
    mode: TransferMode,
) {
    let dst_idx = provider.cursor(dst_ring);
    let mut src = provider.slot(entry.ring, entry.slot);
    let mut dst = provider.slot(dst_ring, dst_idx);
    dst.len = src.len;

    match mode {
        TransferMode::Swap => {
            std::mem::swap(&mut dst.buf_idx, &mut src.buf_idx);
            dst.flags = SlotFlags::BUF_CHANGED;
            src.flags = SlotFlags::BUF_CHANGED;
            provider.set_slot(entry.ring, entry.slot, src);
        }
        TransferMode::Copy => {
            provider.copy_payload(
                (entry.ring, src.buf_idx),
                (dst_ring, dst.buf_idx),
                usize::from(src.len),
            );
        }
    }
    provider.set_slot(dst_ring, dst_idx, dst);
}

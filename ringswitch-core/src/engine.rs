//! ## ringswitch-core::engine
//! **Per-engine context and poll loop**
//!
//! One engine owns one linked interface (or one hardware queue of it), its
//! counters and its jitter source. A poll cycle drains every non-empty RX
//! ring, dispatches and stages each frame, then flushes all staged entries.
//! Nothing suspends inside a cycle; a stop request is only observed between
//! cycles, so the last cycle is always flushed.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use crate::dispatch::{dispatch, stage};
use crate::error::SwitchError;
use crate::flush::{flush, TransferMode};
use crate::hash::{FlowHash, SymmetricFlowHash};
use crate::jitter::{JitterSettings, JitterSource};
use crate::registry::InterfaceRegistry;
use crate::ring::{Direction, PortId, RingId, RingProvider, FIRST_VALID_BUFFER};
use crate::stats::SwitchStats;
use crate::tree::RuleTree;

/// Engine-wide behaviour, fixed at initialization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineSettings {
    /// Owner name used in the interface registry.
    pub name: String,
    pub transfer: TransferMode,
    /// TX synchronizations attempted before staged entries are given up.
    pub tx_retries: u32,
    pub jitter: JitterSettings,
    /// Pause after linking while the NIC resets its PHY.
    pub link_settle: Duration,
    /// Pause after reading a slot with an implausible buffer index.
    pub bogus_index_pause: Duration,
    /// Extra buffers requested when opening a physical interface.
    pub extra_bufs: u32,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            name: "engine0".into(),
            transfer: TransferMode::Swap,
            tx_retries: 8,
            jitter: JitterSettings::default(),
            link_settle: Duration::from_secs(2),
            bogus_index_pause: Duration::from_secs(1),
            extra_bufs: 0,
        }
    }
}

#[derive(Debug, Clone)]
pub(crate) struct LinkState {
    pub(crate) name: String,
    pub(crate) local: PortId,
    pub(crate) batch_size: u16,
}

/// Cloneable run flag; lets another thread stop a polling engine.
#[derive(Debug, Clone)]
pub struct StopHandle(Arc<AtomicBool>);

impl StopHandle {
    pub fn is_running(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    /// Fails if the engine was already stopped.
    pub fn stop(&self) -> Result<(), SwitchError> {
        self.0
            .compare_exchange(true, false, Ordering::AcqRel, Ordering::Acquire)
            .map(|_| ())
            .map_err(|_| SwitchError::NotRunning)
    }
}

pub struct SwitchEngine<P: RingProvider> {
    pub(crate) settings: EngineSettings,
    pub(crate) provider: P,
    pub(crate) registry: Arc<dyn InterfaceRegistry>,
    hasher: Box<dyn FlowHash>,
    jitter: JitterSource,
    pub(crate) stats: SwitchStats,
    pub(crate) link: Option<LinkState>,
    /// Physical interface handles this engine opened and must close.
    pub(crate) globals: Vec<(String, PortId)>,
    run: StopHandle,
}

impl<P: RingProvider> SwitchEngine<P> {
    /// Initializes an engine context. The engine starts in the running state.
    pub fn new(settings: EngineSettings, provider: P, registry: Arc<dyn InterfaceRegistry>) -> Self {
        info!(
            "Initializing engine {} ({:?} transfer, {} TX retries)",
            settings.name, settings.transfer, settings.tx_retries
        );
        Self {
            jitter: JitterSource::new(settings.jitter),
            settings,
            provider,
            registry,
            hasher: Box::new(SymmetricFlowHash),
            stats: SwitchStats::default(),
            link: None,
            globals: Vec::new(),
            run: StopHandle(Arc::new(AtomicBool::new(true))),
        }
    }

    /// Replaces the flow hash used for SHARE selection.
    pub fn with_flow_hash(mut self, hasher: impl FlowHash + 'static) -> Self {
        self.hasher = Box::new(hasher);
        self
    }

    pub fn name(&self) -> &str {
        &self.settings.name
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    pub fn stats(&self) -> &SwitchStats {
        &self.stats
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    pub fn provider_mut(&mut self) -> &mut P {
        &mut self.provider
    }

    /// Local handle of the linked interface.
    pub fn local_port(&self) -> Option<PortId> {
        self.link.as_ref().map(|l| l.local)
    }

    pub fn link_name(&self) -> Option<&str> {
        self.link.as_ref().map(|l| l.name.as_str())
    }

    pub fn stop_handle(&self) -> StopHandle {
        self.run.clone()
    }

    pub fn is_running(&self) -> bool {
        self.run.is_running()
    }

    /// Requests the poll loop to stop after the current cycle.
    pub fn shutdown(&self) -> Result<(), SwitchError> {
        self.run.stop()?;
        info!("Engine {} shutting down", self.settings.name);
        Ok(())
    }

    /// Upper bound of slots one cycle can drain from the linked interface.
    pub(crate) fn staging_capacity(&self, local: PortId) -> usize {
        (0..self.provider.ring_count(local, Direction::Rx))
            .map(|i| self.provider.ring_size(RingId::rx(local, i)) as usize)
            .sum()
    }

    /// One drain, dispatch, stage and flush cycle over every RX ring of the
    /// linked interface. Returns the counter increments of this cycle.
    pub fn poll_once(&mut self, tree: &mut RuleTree) -> Result<SwitchStats, SwitchError> {
        let (local, batch_size, iface) = match &self.link {
            Some(link) => (link.local, link.batch_size, link.name.clone()),
            None => {
                warn!("Engine {} polled without a linked interface", self.settings.name);
                return Err(SwitchError::NotLinked);
            }
        };
        let before = self.stats;

        for index in 0..self.provider.ring_count(local, Direction::Rx) {
            let ring = RingId::rx(local, index);
            if self.provider.is_empty(ring) {
                continue;
            }
            if tree.is_empty() {
                self.drop_slots(ring, batch_size);
            } else {
                self.drain_ring(ring, tree, &iface);
            }
        }

        if let Some(root) = tree.root_mut() {
            let outcome = flush(
                root,
                &mut self.provider,
                self.settings.transfer,
                self.settings.tx_retries,
            );
            self.stats.forwarded += outcome.forwarded;
            self.stats.discarded += outcome.discarded;
            self.stats.tx_syncs += outcome.tx_syncs;
        }

        Ok(self.stats.since(&before))
    }

    /// Consumes at most `batch_size` slots without routing them.
    fn drop_slots(&mut self, ring: RingId, batch_size: u16) {
        let n = self.provider.space(ring).min(u32::from(batch_size));
        for _ in 0..n {
            let slot = self.provider.slot(ring, self.provider.cursor(ring));
            self.stats.bytes += u64::from(slot.len);
            self.stats.packets += 1;
            self.stats.dropped += 1;
            self.provider.advance(ring);
        }
    }

    /// Drains the whole ring through the tree.
    fn drain_ring(&mut self, ring: RingId, tree: &mut RuleTree, iface: &str) {
        let Self {
            provider,
            hasher,
            jitter,
            stats,
            settings,
            ..
        } = self;
        let Some(root) = tree.root_mut() else {
            return;
        };

        while !provider.is_empty(ring) {
            let cur = provider.cursor(ring);
            let slot = provider.slot(ring, cur);
            stats.bytes += u64::from(slot.len);
            stats.packets += 1;

            if slot.buf_idx < FIRST_VALID_BUFFER {
                warn!("{iface} bogus RX index {} at offset {cur}", slot.buf_idx);
                stats.bogus_slots += 1;
                if !settings.bogus_index_pause.is_zero() {
                    std::thread::sleep(settings.bogus_index_pause);
                }
                provider.advance(ring);
                continue;
            }

            let frame = provider.frame(ring, &slot);
            let flow_hash = hasher.hash(frame);
            dispatch(Some(&mut *root), frame, flow_hash, jitter);
            provider.advance(ring);
            stats.staged += stage(root, ring, cur) as u64;
        }
    }

    /// Polls until [`StopHandle::stop`] is called. Each iteration first asks
    /// the substrate for newly received frames.
    #[instrument(skip_all, fields(engine = %self.settings.name))]
    pub fn run(&mut self, tree: &mut RuleTree) -> Result<(), SwitchError> {
        let local = self.local_port().ok_or(SwitchError::NotLinked)?;
        info!("Entering poll loop");

        while self.run.is_running() {
            self.provider.sync(local, Direction::Rx)?;
            let cycle = self.poll_once(tree)?;
            if cycle.packets == 0 {
                std::thread::yield_now();
            }
        }

        debug!("Poll loop finished: {:?}", self.stats);
        Ok(())
    }
}

//! ## ringswitch-telemetry::metrics
//! **Prometheus export of engine counters**
//!
//! Engine counters are plain integers owned by the polling thread; the
//! recorder mirrors them into Prometheus counters from per-cycle deltas.

use prometheus::{Encoder, IntCounter, IntCounterVec, Opts, Registry, TextEncoder};

use ringswitch_core::stats::SwitchStats;

#[derive(Debug, Clone)]
pub struct MetricsRecorder {
    pub registry: Registry,
    pub packets: IntCounter,
    pub bytes: IntCounter,
    /// Slot fates, labelled `dropped`, `staged`, `forwarded`, `discarded`,
    /// `bogus`.
    pub slots: IntCounterVec,
    pub tx_syncs: IntCounter,
}

impl MetricsRecorder {
    pub fn new(engine: &str) -> Result<Self, prometheus::Error> {
        let registry = Registry::new();
        let opts = |name: &str, help: &str| Opts::new(name, help).const_label("engine", engine);

        let packets = IntCounter::with_opts(opts(
            "ringswitch_rx_packets_total",
            "Frames drained from RX rings",
        ))?;
        let bytes = IntCounter::with_opts(opts(
            "ringswitch_rx_bytes_total",
            "Bytes drained from RX rings",
        ))?;
        let slots = IntCounterVec::new(
            opts("ringswitch_slots_total", "RX slots by outcome"),
            &["outcome"],
        )?;
        let tx_syncs = IntCounter::with_opts(opts(
            "ringswitch_tx_syncs_total",
            "TX synchronizations issued while retrying",
        ))?;

        registry.register(Box::new(packets.clone()))?;
        registry.register(Box::new(bytes.clone()))?;
        registry.register(Box::new(slots.clone()))?;
        registry.register(Box::new(tx_syncs.clone()))?;

        Ok(Self {
            registry,
            packets,
            bytes,
            slots,
            tx_syncs,
        })
    }

    /// Adds one cycle's counter increments.
    pub fn observe(&self, delta: &SwitchStats) {
        self.packets.inc_by(delta.packets);
        self.bytes.inc_by(delta.bytes);
        for (outcome, value) in [
            ("dropped", delta.dropped),
            ("staged", delta.staged),
            ("forwarded", delta.forwarded),
            ("discarded", delta.discarded),
            ("bogus", delta.bogus_slots),
        ] {
            self.slots.with_label_values(&[outcome]).inc_by(value);
        }
        self.tx_syncs.inc_by(delta.tx_syncs);
    }

    pub fn gather_metrics(&self) -> Result<String, prometheus::Error> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::<u8>::new();
        encoder.encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

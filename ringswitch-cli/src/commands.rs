use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::{Args, Parser, Subcommand};
use tracing::{debug, info, warn};

use ringswitch_config::{SimulatorConfig, SwitchConfig};
use ringswitch_core::builder::UNLINK_ALL;
use ringswitch_core::prelude::*;
use ringswitch_sim::{MemRingProvider, SimSettings, TrafficGenerator};
use ringswitch_telemetry::MetricsRecorder;

#[derive(Parser)]
#[command(name = "ringswitch", version, about)]
pub struct Cli {
    /// Configuration file. Without it, config/ringswitch.yaml and the
    /// RINGSWITCH_ENV overlay are used.
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Drive the configured pipeline with generated traffic over in-memory rings
    Simulate(SimulateArgs),
    /// Validate the configuration and print the rule tree it builds
    Check,
}

#[derive(Args, Debug, Clone)]
pub struct SimulateArgs {
    /// Poll cycles to run (0 runs until Ctrl-C); overrides simulator.cycles
    #[arg(long)]
    pub cycles: Option<u64>,
    /// Traffic seed; overrides simulator.seed
    #[arg(long)]
    pub seed: Option<u64>,
    /// Expected delivery digest; the run fails on mismatch
    #[arg(long)]
    pub validate_hash: Option<String>,
}

pub fn load_config(path: Option<&Path>) -> anyhow::Result<SwitchConfig> {
    match path {
        Some(path) => SwitchConfig::load_from_path(path),
        None => SwitchConfig::load(),
    }
    .context("Failed to load configuration")
}

/// A linked engine with its pipeline built on the in-memory substrate.
struct Switch {
    engine: SwitchEngine<MemRingProvider>,
    tree: RuleTree,
}

impl Switch {
    fn build(config: &SwitchConfig) -> anyhow::Result<Self> {
        let sim = &config.simulator;
        let mut provider = MemRingProvider::new(SimSettings {
            ring_size: sim.ring_size,
            buf_size: sim.buf_size,
            ..SimSettings::default()
        });
        provider.add_interface(&config.link.interface, sim.rings)?;

        let mut engine = SwitchEngine::new(
            config.engine_settings(),
            provider,
            Arc::new(InterfaceTable::new()),
        );
        engine.link(
            &config.link.interface,
            config.link.batch_size,
            config.link.queue_id,
        )?;

        let mut tree = RuleTree::new();
        for channel in &config.pipeline {
            engine
                .create_channel(&mut tree, &channel.source, &channel.destination, channel.mode)
                .with_context(|| {
                    format!(
                        "Failed to create channel {} --> {}",
                        channel.source, channel.destination
                    )
                })?;
        }
        for entry in &config.filters {
            let filter = entry
                .filter
                .compile()
                .with_context(|| format!("Invalid filter for {}", entry.interface))?;
            engine.add_filter(&mut tree, &filter, &entry.interface);
        }

        Ok(Self { engine, tree })
    }

    fn print_leaves(&self) {
        self.tree.for_each_leaf(|node, leaf| {
            println!(
                "  {:<24} forwarded {:>8}  discarded {:>6}  filtered {}",
                node.name,
                leaf.counters.forwarded,
                leaf.counters.discarded,
                leaf.filter.is_some()
            );
        });
    }

    fn teardown(mut self) {
        self.engine.delete_all(&mut self.tree);
        self.engine.unlink(UNLINK_ALL);
    }
}

#[derive(Debug, Default)]
struct RunReport {
    cycles: u64,
    generated: u64,
    rx_overruns: u64,
    delivered: usize,
}

pub async fn run_simulation(config: SwitchConfig, args: SimulateArgs) -> anyhow::Result<()> {
    let mut sim = config.simulator.clone();
    if let Some(cycles) = args.cycles {
        sim.cycles = cycles;
    }
    if let Some(seed) = args.seed {
        sim.seed = seed;
    }
    let metrics = MetricsRecorder::new(&config.engine.name)?;

    // Linking may sleep for the PHY settle time.
    let build_config = config.clone();
    let switch = tokio::task::spawn_blocking(move || Switch::build(&build_config)).await??;
    info!("Rule tree:\n{}", switch.tree);

    let stop = switch.engine.stop_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupt received, stopping engine");
            if let Err(e) = stop.stop() {
                warn!("Stop request ignored: {e}");
            }
        }
    });

    let iface = config.link.interface.clone();
    let (switch, metrics, outcome) = tokio::task::spawn_blocking(move || {
        let mut switch = switch;
        let outcome = drive(&mut switch, &iface, &sim, &metrics);
        (switch, metrics, outcome)
    })
    .await?;
    let report = outcome?;

    if switch.engine.is_running() {
        switch.engine.shutdown()?;
    }

    println!(
        "Ran {} cycles: {} frames generated, {} RX overruns, {} frames delivered",
        report.cycles, report.generated, report.rx_overruns, report.delivered
    );
    print!("{}", serde_yaml::to_string(switch.engine.stats())?);
    println!("Leaves:");
    switch.print_leaves();

    let digest = switch.engine.provider().delivery_digest();
    println!("Delivery digest: {digest}");
    if config.telemetry.metrics {
        print!("{}", metrics.gather_metrics()?);
    }
    switch.teardown();

    if let Some(expected) = args.validate_hash {
        if expected != digest {
            bail!("Delivery digest mismatch: expected {expected}, got {digest}");
        }
        info!("Delivery digest validated");
    }
    Ok(())
}

fn drive(
    switch: &mut Switch,
    iface: &str,
    sim: &SimulatorConfig,
    metrics: &MetricsRecorder,
) -> anyhow::Result<RunReport> {
    let mut traffic = TrafficGenerator::new(sim.seed, sim.flows);
    if let Some(marker) = &sim.marker {
        traffic = traffic.with_marker(marker.as_bytes(), sim.marker_every);
    }

    let mut report = RunReport::default();
    while switch.engine.is_running() && (sim.cycles == 0 || report.cycles < sim.cycles) {
        for ring in 0..sim.rings {
            for _ in 0..sim.frames_per_cycle {
                let frame = traffic.next_frame();
                if !switch.engine.provider_mut().inject(iface, ring, &frame)? {
                    report.rx_overruns += 1;
                    break;
                }
            }
        }
        if let Some(local) = switch.engine.local_port() {
            switch.engine.provider_mut().sync(local, Direction::Rx)?;
        }

        let delta = switch.engine.poll_once(&mut switch.tree)?;
        metrics.observe(&delta);
        let delivered = switch.engine.provider_mut().transmit_pending();
        report.delivered += delivered;
        debug!(
            cycle = report.cycles,
            packets = delta.packets,
            forwarded = delta.forwarded,
            delivered,
            "Cycle complete"
        );
        report.cycles += 1;
    }
    report.generated = traffic.emitted();
    Ok(report)
}

/// Validates the configuration, then builds its pipeline on in-memory rings
/// to prove every channel can be created.
pub fn run_check(config: SwitchConfig) -> anyhow::Result<()> {
    print!("{}", serde_yaml::to_string(&config)?);

    let mut dry_run = config;
    dry_run.engine.link_settle_ms = 0;
    let switch = Switch::build(&dry_run)?;
    println!("Rule tree:\n{}", switch.tree);
    println!(
        "{} channels, {} leaves, {} filters",
        dry_run.pipeline.len(),
        switch.tree.leaf_count(),
        dry_run.filters.len()
    );
    switch.teardown();
    Ok(())
}

#![allow(dead_code)]

use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::Duration;

use ringswitch_core::prelude::*;
use ringswitch_sim::traffic::{udp_frame, Flow};
use ringswitch_sim::{MemRingProvider, SimSettings};

pub const IFACE: &str = "eth0";

pub fn settings(transfer: TransferMode) -> EngineSettings {
    EngineSettings {
        name: "eng0".into(),
        transfer,
        link_settle: Duration::ZERO,
        bogus_index_pause: Duration::ZERO,
        ..Default::default()
    }
}

/// Substrate with `eth0` carrying `rings` ring pairs of `ring_size` slots.
pub fn provider(ring_size: u32, rings: u16) -> MemRingProvider {
    let mut provider = MemRingProvider::new(SimSettings {
        ring_size,
        buf_size: 512,
        pipe_rings: 1,
    });
    provider.add_interface(IFACE, rings).unwrap();
    provider
}

pub fn engine_with(
    settings: EngineSettings,
    provider: MemRingProvider,
) -> (SwitchEngine<MemRingProvider>, Arc<InterfaceTable>) {
    let table = Arc::new(InterfaceTable::new());
    let engine = SwitchEngine::new(settings, provider, table.clone());
    (engine, table)
}

/// Engine linked to all queues of `eth0`.
pub fn linked(transfer: TransferMode, ring_size: u32, rings: u16) -> SwitchEngine<MemRingProvider> {
    let (mut engine, _) = engine_with(settings(transfer), provider(ring_size, rings));
    engine.link(IFACE, 512, None).unwrap();
    engine
}

pub fn flow(i: u32) -> Flow {
    Flow {
        src: Ipv4Addr::from(0x0a00_0001 + i),
        dst: Ipv4Addr::new(10, 1, 0, 1),
        sport: 1024 + (i % 1000) as u16,
        dport: 53,
    }
}

pub fn frame(i: u32) -> Vec<u8> {
    let payload: Vec<u8> = (0..32u32).map(|b| (b + i) as u8).collect();
    udp_frame(flow(i), &payload).to_vec()
}

pub fn inject_all(engine: &mut SwitchEngine<MemRingProvider>, ring: u16, frames: &[Vec<u8>]) {
    for f in frames {
        assert!(engine.provider_mut().inject(IFACE, ring, f).unwrap());
    }
}

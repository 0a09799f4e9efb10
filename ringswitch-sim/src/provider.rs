//! ## ringswitch-sim::provider
//! **In-memory netmap-style ring substrate**
//!
//! Every endpoint owns RX and TX rings of slots; slots point into one shared
//! buffer pool by index. Indices below [`FIRST_VALID_BUFFER`] are reserved
//! and never handed out.
//!
//! RX: frames live between `cur` and `tail`; the ring is empty when they meet.
//! TX: free slots live between `cur` and `tail`, so a fresh ring offers
//! `size - 1` slots. A TX sync transmits everything between `hwcur` and `cur`
//! and returns those slots to the free span, unless the endpoint is stalled.
//!
//! Names containing `{` or `}` are pipes and come into existence on first
//! open. Transmitting on a pipe delivers into the RX ring of its peer when the
//! peer has been opened.

use std::collections::HashMap;
use std::ops::Range;

use bytes::Bytes;
use tracing::{debug, trace};

use ringswitch_core::ring::{
    Direction, OpenFlags, PortId, RingError, RingId, RingProvider, RingSelect, Slot, SlotFlags,
    FIRST_VALID_BUFFER,
};
use ringswitch_core::tree::peer_name;

use crate::SimError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SimSettings {
    /// Slots per ring.
    pub ring_size: u32,
    /// Bytes per buffer.
    pub buf_size: usize,
    /// Ring pairs given to pipes created on open.
    pub pipe_rings: u16,
}

impl Default for SimSettings {
    fn default() -> Self {
        Self {
            ring_size: 256,
            buf_size: 2048,
            pipe_rings: 1,
        }
    }
}

#[derive(Debug)]
struct SimRing {
    slots: Vec<Slot>,
    cur: u32,
    tail: u32,
    hwcur: u32,
}

impl SimRing {
    fn new(first_buf: u32, size: u32, dir: Direction) -> Self {
        let slots = (0..size)
            .map(|i| Slot {
                buf_idx: first_buf + i,
                len: 0,
                flags: SlotFlags::default(),
            })
            .collect();
        let tail = match dir {
            Direction::Rx => 0,
            Direction::Tx => size - 1,
        };
        Self {
            slots,
            cur: 0,
            tail,
            hwcur: 0,
        }
    }

    #[inline]
    fn size(&self) -> u32 {
        self.slots.len() as u32
    }

    #[inline]
    fn next(&self, i: u32) -> u32 {
        (i + 1) % self.size()
    }

    #[inline]
    fn space(&self) -> u32 {
        (self.tail + self.size() - self.cur) % self.size()
    }
}

#[derive(Debug)]
struct Endpoint {
    name: String,
    rx: Vec<SimRing>,
    tx: Vec<SimRing>,
    stalled: bool,
    transmitted: Vec<Bytes>,
}

#[derive(Debug, Clone, Copy)]
struct Binding {
    endpoint: usize,
    rings: RingSelect,
    region: u32,
}

#[derive(Debug)]
pub struct MemRingProvider {
    settings: SimSettings,
    pool: Vec<u8>,
    buf_count: u32,
    endpoints: Vec<Endpoint>,
    by_name: HashMap<String, usize>,
    ports: HashMap<PortId, Binding>,
    next_port: u32,
    next_region: u32,
}

impl Default for MemRingProvider {
    fn default() -> Self {
        Self::new(SimSettings::default())
    }
}

impl MemRingProvider {
    pub fn new(settings: SimSettings) -> Self {
        Self {
            settings,
            pool: vec![0; FIRST_VALID_BUFFER as usize * settings.buf_size],
            buf_count: FIRST_VALID_BUFFER,
            endpoints: Vec::new(),
            by_name: HashMap::new(),
            ports: HashMap::new(),
            next_port: 0,
            next_region: 0,
        }
    }

    pub fn settings(&self) -> &SimSettings {
        &self.settings
    }

    /// Registers a physical interface with `rings` RX/TX ring pairs.
    pub fn add_interface(&mut self, name: &str, rings: u16) -> Result<(), SimError> {
        if self.by_name.contains_key(name) {
            return Err(SimError::DuplicateInterface(name.to_string()));
        }
        self.create_endpoint(name, rings);
        Ok(())
    }

    pub fn interfaces(&self) -> impl Iterator<Item = &str> {
        self.endpoints.iter().map(|e| e.name.as_str())
    }

    /// Number of handles currently open.
    pub fn open_ports(&self) -> usize {
        self.ports.len()
    }

    /// Makes `frame` appear on RX ring `ring` of `name`. Returns `false` when
    /// the ring is full.
    pub fn inject(&mut self, name: &str, ring: u16, frame: &[u8]) -> Result<bool, SimError> {
        let endpoint = self.endpoint_index(name)?;
        if frame.len() > self.settings.buf_size || frame.len() > usize::from(u16::MAX) {
            return Err(SimError::FrameTooLarge {
                len: frame.len(),
                max: self.settings.buf_size,
            });
        }
        self.deliver(endpoint, ring, frame)
    }

    /// Publishes a raw RX descriptor without touching any buffer, modelling
    /// corrupted ring state.
    pub fn inject_slot(
        &mut self,
        name: &str,
        ring: u16,
        buf_idx: u32,
        len: u16,
    ) -> Result<bool, SimError> {
        let endpoint = self.endpoint_index(name)?;
        let r = self.rx_ring_mut(endpoint, ring, name)?;
        if r.next(r.tail) == r.cur {
            return Ok(false);
        }
        let tail = r.tail as usize;
        r.slots[tail] = Slot {
            buf_idx,
            len,
            flags: SlotFlags::default(),
        };
        r.tail = r.next(r.tail);
        Ok(true)
    }

    /// Frames waiting on RX ring `ring` of `name`.
    pub fn rx_pending(&self, name: &str, ring: u16) -> u32 {
        self.by_name
            .get(name)
            .and_then(|&e| self.endpoints[e].rx.get(usize::from(ring)))
            .map_or(0, SimRing::space)
    }

    /// Free slots on TX ring `ring` of `name`.
    pub fn tx_free(&self, name: &str, ring: u16) -> u32 {
        self.by_name
            .get(name)
            .and_then(|&e| self.endpoints[e].tx.get(usize::from(ring)))
            .map_or(0, SimRing::space)
    }

    /// While stalled, TX syncs on `name` reclaim nothing and transmit nothing.
    pub fn set_stalled(&mut self, name: &str, stalled: bool) -> Result<(), SimError> {
        let endpoint = self.endpoint_index(name)?;
        self.endpoints[endpoint].stalled = stalled;
        debug!("{name} stalled: {stalled}");
        Ok(())
    }

    /// Frames transmitted on `name` so far, in transmit order.
    pub fn transmitted(&self, name: &str) -> &[Bytes] {
        match self.by_name.get(name) {
            Some(&e) => &self.endpoints[e].transmitted,
            None => &[],
        }
    }

    pub fn take_transmitted(&mut self, name: &str) -> Vec<Bytes> {
        self.by_name
            .get(name)
            .map(|&e| std::mem::take(&mut self.endpoints[e].transmitted))
            .unwrap_or_default()
    }

    /// TX-syncs every endpoint, as the hardware would between poll cycles.
    /// Returns the number of frames transmitted.
    pub fn transmit_pending(&mut self) -> usize {
        (0..self.endpoints.len())
            .map(|e| {
                let rings = 0..self.endpoints[e].tx.len();
                self.transmit(e, rings)
            })
            .sum()
    }

    /// BLAKE3 digest over every endpoint's transmitted frames, endpoints in
    /// name order.
    pub fn delivery_digest(&self) -> String {
        let mut order: Vec<&Endpoint> = self.endpoints.iter().collect();
        order.sort_by(|a, b| a.name.cmp(&b.name));

        let mut hasher = blake3::Hasher::new();
        for endpoint in order {
            hasher.update(endpoint.name.as_bytes());
            for frame in &endpoint.transmitted {
                hasher.update(&(frame.len() as u32).to_le_bytes());
                hasher.update(frame);
            }
        }
        hex::encode(hasher.finalize().as_bytes())
    }

    fn endpoint_index(&self, name: &str) -> Result<usize, SimError> {
        self.by_name
            .get(name)
            .copied()
            .ok_or_else(|| SimError::UnknownInterface(name.to_string()))
    }

    fn rx_ring_mut(
        &mut self,
        endpoint: usize,
        ring: u16,
        name: &str,
    ) -> Result<&mut SimRing, SimError> {
        self.endpoints[endpoint]
            .rx
            .get_mut(usize::from(ring))
            .ok_or_else(|| SimError::NoSuchRing {
                iface: name.to_string(),
                ring,
            })
    }

    fn create_endpoint(&mut self, name: &str, rings: u16) -> usize {
        let size = self.settings.ring_size;
        let mut make = |dir| {
            (0..rings)
                .map(|_| {
                    let first = self.alloc_buffers(size);
                    SimRing::new(first, size, dir)
                })
                .collect::<Vec<_>>()
        };
        let rx = make(Direction::Rx);
        let tx = make(Direction::Tx);

        let index = self.endpoints.len();
        self.endpoints.push(Endpoint {
            name: name.to_string(),
            rx,
            tx,
            stalled: false,
            transmitted: Vec::new(),
        });
        self.by_name.insert(name.to_string(), index);
        debug!("Created endpoint {name} with {rings} ring pairs");
        index
    }

    fn alloc_buffers(&mut self, n: u32) -> u32 {
        let first = self.buf_count;
        self.buf_count += n;
        self.pool
            .resize(self.buf_count as usize * self.settings.buf_size, 0);
        first
    }

    #[inline]
    fn valid_buffer(&self, buf_idx: u32) -> bool {
        buf_idx >= FIRST_VALID_BUFFER && buf_idx < self.buf_count
    }

    #[inline]
    fn offset(&self, buf_idx: u32) -> usize {
        buf_idx as usize * self.settings.buf_size
    }

    fn deliver(&mut self, endpoint: usize, ring: u16, frame: &[u8]) -> Result<bool, SimError> {
        let name = self.endpoints[endpoint].name.clone();
        let r = self.rx_ring_mut(endpoint, ring, &name)?;
        if r.next(r.tail) == r.cur {
            trace!("RX ring {ring} of {name} full");
            return Ok(false);
        }
        let tail = r.tail;
        let mut slot = r.slots[tail as usize];

        if !self.valid_buffer(slot.buf_idx) {
            slot.buf_idx = self.alloc_buffers(1);
        }
        let off = self.offset(slot.buf_idx);
        self.pool[off..off + frame.len()].copy_from_slice(frame);
        slot.len = frame.len() as u16;
        slot.flags = SlotFlags::default();

        let r = self.rx_ring_mut(endpoint, ring, &name)?;
        r.slots[tail as usize] = slot;
        r.tail = r.next(tail);
        Ok(true)
    }

    fn transmit(&mut self, endpoint: usize, rings: Range<usize>) -> usize {
        if self.endpoints[endpoint].stalled {
            trace!("{} stalled, TX sync ignored", self.endpoints[endpoint].name);
            return 0;
        }

        let mut pending = Vec::new();
        for i in rings {
            let Some(ring) = self.endpoints[endpoint].tx.get_mut(i) else {
                continue;
            };
            let mut j = ring.hwcur;
            while j != ring.cur {
                let slot = &mut ring.slots[j as usize];
                pending.push((slot.buf_idx, slot.len));
                slot.flags = SlotFlags::default();
                j = ring.next(j);
            }
            ring.hwcur = ring.cur;
            ring.tail = (ring.cur + ring.size() - 1) % ring.size();
        }

        let sent: Vec<Bytes> = pending
            .into_iter()
            .map(|(buf_idx, len)| {
                if !self.valid_buffer(buf_idx) {
                    return Bytes::new();
                }
                let off = self.offset(buf_idx);
                let len = usize::from(len).min(self.settings.buf_size);
                Bytes::copy_from_slice(&self.pool[off..off + len])
            })
            .collect();
        let count = sent.len();

        let peer = self
            .by_name
            .get(&peer_name(&self.endpoints[endpoint].name))
            .copied()
            .filter(|&p| p != endpoint);
        if let Some(peer) = peer {
            for frame in &sent {
                // Pipes drop on overrun.
                let _ = self.deliver(peer, 0, frame);
            }
        }

        self.endpoints[endpoint].transmitted.extend(sent);
        count
    }

    fn binding(&self, port: PortId) -> Option<&Binding> {
        self.ports.get(&port)
    }

    fn selected(&self, binding: &Binding, dir: Direction) -> Range<usize> {
        let endpoint = &self.endpoints[binding.endpoint];
        let total = match dir {
            Direction::Rx => endpoint.rx.len(),
            Direction::Tx => endpoint.tx.len(),
        };
        match binding.rings {
            RingSelect::All => 0..total,
            RingSelect::One(q) => {
                let q = usize::from(q).min(total);
                q..(q + 1).min(total)
            }
        }
    }

    /// Substrate ring behind a port-relative ring id.
    fn locate(&self, ring: RingId) -> Option<(usize, usize)> {
        let binding = self.binding(ring.port)?;
        let range = self.selected(binding, ring.dir);
        let actual = range.start + usize::from(ring.index);
        (actual < range.end).then_some((binding.endpoint, actual))
    }

    fn ring_ref(&self, ring: RingId) -> Option<&SimRing> {
        let (e, i) = self.locate(ring)?;
        match ring.dir {
            Direction::Rx => self.endpoints[e].rx.get(i),
            Direction::Tx => self.endpoints[e].tx.get(i),
        }
    }

    fn ring_mut(&mut self, ring: RingId) -> Option<&mut SimRing> {
        let (e, i) = self.locate(ring)?;
        match ring.dir {
            Direction::Rx => self.endpoints[e].rx.get_mut(i),
            Direction::Tx => self.endpoints[e].tx.get_mut(i),
        }
    }
}

impl RingProvider for MemRingProvider {
    fn open(
        &mut self,
        name: &str,
        flags: OpenFlags,
        shared: Option<PortId>,
    ) -> Result<PortId, RingError> {
        let region = match shared {
            Some(port) => {
                let parent = self.binding(port).ok_or(RingError::UnknownPort(port))?;
                if flags.no_mmap {
                    Some(parent.region)
                } else {
                    None
                }
            }
            None => None,
        };

        let endpoint = match self.by_name.get(name) {
            Some(&e) => e,
            None if name.contains(|c| c == '{' || c == '}') => {
                let rings = self.settings.pipe_rings;
                self.create_endpoint(name, rings)
            }
            None => return Err(RingError::NoSuchInterface(name.to_string())),
        };

        let available = self.endpoints[endpoint].rx.len() as u16;
        if let RingSelect::One(queue) = flags.rings {
            if queue >= available {
                return Err(RingError::QueueOutOfRange {
                    iface: name.to_string(),
                    queue,
                    available,
                });
            }
        }

        let region = region.unwrap_or_else(|| {
            self.next_region += 1;
            self.next_region
        });
        let port = PortId(self.next_port);
        self.next_port += 1;
        self.ports.insert(
            port,
            Binding {
                endpoint,
                rings: flags.rings,
                region,
            },
        );
        debug!("Opened {name} as {port} ({:?}, region {region})", flags.rings);
        Ok(port)
    }

    fn close(&mut self, port: PortId) {
        if self.ports.remove(&port).is_some() {
            debug!("Closed {port}");
        }
    }

    fn ring_count(&self, port: PortId, dir: Direction) -> u16 {
        self.binding(port)
            .map_or(0, |b| self.selected(b, dir).len() as u16)
    }

    fn ring_size(&self, ring: RingId) -> u32 {
        self.ring_ref(ring).map_or(0, SimRing::size)
    }

    fn is_empty(&self, ring: RingId) -> bool {
        self.ring_ref(ring).map_or(true, |r| r.cur == r.tail)
    }

    fn space(&self, ring: RingId) -> u32 {
        self.ring_ref(ring).map_or(0, SimRing::space)
    }

    fn cursor(&self, ring: RingId) -> u32 {
        self.ring_ref(ring).map_or(0, |r| r.cur)
    }

    fn advance(&mut self, ring: RingId) {
        if let Some(r) = self.ring_mut(ring) {
            if r.cur != r.tail {
                r.cur = r.next(r.cur);
            }
        }
    }

    fn slot(&self, ring: RingId, index: u32) -> Slot {
        self.ring_ref(ring)
            .and_then(|r| r.slots.get(index as usize))
            .copied()
            .unwrap_or_default()
    }

    fn set_slot(&mut self, ring: RingId, index: u32, slot: Slot) {
        if let Some(s) = self
            .ring_mut(ring)
            .and_then(|r| r.slots.get_mut(index as usize))
        {
            *s = slot;
        }
    }

    fn buffer(&self, _ring: RingId, buf_idx: u32) -> &[u8] {
        if !self.valid_buffer(buf_idx) {
            return &[];
        }
        let off = self.offset(buf_idx);
        &self.pool[off..off + self.settings.buf_size]
    }

    fn copy_payload(&mut self, src: (RingId, u32), dst: (RingId, u32), len: usize) {
        let (src_buf, dst_buf) = (src.1, dst.1);
        if !self.valid_buffer(src_buf) || !self.valid_buffer(dst_buf) || src_buf == dst_buf {
            return;
        }
        let len = len.min(self.settings.buf_size);
        let from = self.offset(src_buf);
        let to = self.offset(dst_buf);
        self.pool.copy_within(from..from + len, to);
    }

    fn sync(&mut self, port: PortId, dir: Direction) -> Result<(), RingError> {
        let binding = *self.binding(port).ok_or(RingError::UnknownPort(port))?;
        let rings = self.selected(&binding, dir);
        match dir {
            Direction::Rx => {
                for ring in &mut self.endpoints[binding.endpoint].rx[rings] {
                    ring.slots
                        .iter_mut()
                        .for_each(|s| s.flags = SlotFlags::default());
                }
            }
            Direction::Tx => {
                let sent = self.transmit(binding.endpoint, rings);
                trace!("TX sync on {port}: {sent} frames");
            }
        }
        Ok(())
    }

    fn shares_memory(&self, a: PortId, b: PortId) -> bool {
        match (self.binding(a), self.binding(b)) {
            (Some(a), Some(b)) => a.region == b.region,
            _ => false,
        }
    }
}

//! Flow hashing used by SHARE fan-out.

use std::net::IpAddr;

use crate::frame::FrameHeaders;

/// Header-derived hash of a frame. Equal flows must hash equally.
pub trait FlowHash: Send {
    fn hash(&self, frame: &[u8]) -> u32;
}

impl<F> FlowHash for F
where
    F: Fn(&[u8]) -> u32 + Send,
{
    fn hash(&self, frame: &[u8]) -> u32 {
        self(frame)
    }
}

/// Direction-agnostic 5-tuple hash: both directions of a flow land on the
/// same SHARE child.
#[derive(Debug, Clone, Copy, Default)]
pub struct SymmetricFlowHash;

impl FlowHash for SymmetricFlowHash {
    fn hash(&self, frame: &[u8]) -> u32 {
        let Some(headers) = FrameHeaders::parse(frame) else {
            return 0;
        };
        let raw = match headers.ip {
            Some(ip) => {
                let (sport, dport) = ip.ports.unwrap_or((0, 0));
                fold_addr(&ip.src)
                    .wrapping_add(fold_addr(&ip.dst))
                    .wrapping_add(u32::from(sport))
                    .wrapping_add(u32::from(dport))
                    .wrapping_add(u32::from(ip.protocol))
            }
            None => fold_mac(&headers.src_mac)
                .wrapping_add(fold_mac(&headers.dst_mac))
                .wrapping_add(u32::from(headers.ether_type)),
        };
        mix(raw)
    }
}

fn fold_addr(addr: &IpAddr) -> u32 {
    match addr {
        IpAddr::V4(v4) => u32::from(*v4),
        IpAddr::V6(v6) => v6
            .octets()
            .chunks_exact(4)
            .map(|c| u32::from_be_bytes([c[0], c[1], c[2], c[3]]))
            .fold(0u32, |acc, w| acc.wrapping_add(w)),
    }
}

fn fold_mac(mac: &[u8; 6]) -> u32 {
    u32::from_be_bytes([mac[2], mac[3], mac[4], mac[5]]).wrapping_add(u32::from(
        u16::from_be_bytes([mac[0], mac[1]]),
    ))
}

/// Integer avalanche so that close tuples spread over all children.
#[inline]
pub fn mix(mut a: u32) -> u32 {
    a = (a ^ 61) ^ (a >> 16);
    a = a.wrapping_add(a << 3);
    a ^= a >> 4;
    a = a.wrapping_mul(0x27d4_eb2d);
    a ^ (a >> 15)
}

//! ## ringswitch-core::frame
//! Read-only view of the link, network and transport headers of a frame.
//!
//! Only the fields needed for flow hashing and header filters are decoded.
//! Payloads are never touched.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

pub const ETHERTYPE_IPV4: u16 = 0x0800;
pub const ETHERTYPE_IPV6: u16 = 0x86DD;
pub const ETHERTYPE_ARP: u16 = 0x0806;
const ETHERTYPE_VLAN: u16 = 0x8100;
const ETHERTYPE_QINQ: u16 = 0x88A8;

pub const IPPROTO_TCP: u8 = 6;
pub const IPPROTO_UDP: u8 = 17;
pub const IPPROTO_SCTP: u8 = 132;

const ETH_HEADER_LEN: usize = 14;
const VLAN_TAG_LEN: usize = 4;
const IPV6_HEADER_LEN: usize = 40;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeaders {
    pub src_mac: [u8; 6],
    pub dst_mac: [u8; 6],
    /// Innermost ethertype after VLAN tags.
    pub ether_type: u16,
    pub ip: Option<IpHeader>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IpHeader {
    pub src: IpAddr,
    pub dst: IpAddr,
    pub protocol: u8,
    /// Source and destination port for TCP, UDP and SCTP.
    pub ports: Option<(u16, u16)>,
}

#[inline]
fn be16(data: &[u8], at: usize) -> Option<u16> {
    data.get(at..at + 2).map(|b| u16::from_be_bytes([b[0], b[1]]))
}

impl FrameHeaders {
    /// Returns `None` for frames shorter than an Ethernet header.
    pub fn parse(frame: &[u8]) -> Option<Self> {
        if frame.len() < ETH_HEADER_LEN {
            return None;
        }
        let mut dst_mac = [0u8; 6];
        let mut src_mac = [0u8; 6];
        dst_mac.copy_from_slice(&frame[0..6]);
        src_mac.copy_from_slice(&frame[6..12]);

        let mut offset = 12;
        let mut ether_type = be16(frame, offset)?;
        while ether_type == ETHERTYPE_VLAN || ether_type == ETHERTYPE_QINQ {
            offset += VLAN_TAG_LEN;
            ether_type = be16(frame, offset)?;
        }
        offset += 2;

        let ip = match ether_type {
            ETHERTYPE_IPV4 => parse_ipv4(&frame[offset..]),
            ETHERTYPE_IPV6 => parse_ipv6(&frame[offset..]),
            _ => None,
        };

        Some(Self {
            src_mac,
            dst_mac,
            ether_type,
            ip,
        })
    }
}

fn parse_ipv4(data: &[u8]) -> Option<IpHeader> {
    let first = *data.first()?;
    if first >> 4 != 4 {
        return None;
    }
    let ihl = usize::from(first & 0x0F) * 4;
    if ihl < 20 || data.len() < ihl {
        return None;
    }
    let src = Ipv4Addr::new(data[12], data[13], data[14], data[15]);
    let dst = Ipv4Addr::new(data[16], data[17], data[18], data[19]);
    let protocol = data[9];
    // Only the first fragment carries the transport header.
    let fragment_offset = be16(data, 6)? & 0x1FFF;
    let ports = if fragment_offset == 0 {
        parse_ports(protocol, &data[ihl..])
    } else {
        None
    };
    Some(IpHeader {
        src: IpAddr::V4(src),
        dst: IpAddr::V4(dst),
        protocol,
        ports,
    })
}

fn parse_ipv6(data: &[u8]) -> Option<IpHeader> {
    if data.len() < IPV6_HEADER_LEN || data[0] >> 4 != 6 {
        return None;
    }
    let mut src = [0u8; 16];
    let mut dst = [0u8; 16];
    src.copy_from_slice(&data[8..24]);
    dst.copy_from_slice(&data[24..40]);
    let protocol = data[6];
    Some(IpHeader {
        src: IpAddr::V6(Ipv6Addr::from(src)),
        dst: IpAddr::V6(Ipv6Addr::from(dst)),
        protocol,
        ports: parse_ports(protocol, &data[IPV6_HEADER_LEN..]),
    })
}

fn parse_ports(protocol: u8, l4: &[u8]) -> Option<(u16, u16)> {
    match protocol {
        IPPROTO_TCP | IPPROTO_UDP | IPPROTO_SCTP => Some((be16(l4, 0)?, be16(l4, 2)?)),
        _ => None,
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Ethernet + IPv4 + UDP frame with the given addresses and ports.
    pub(crate) fn udp4(src: [u8; 4], dst: [u8; 4], sport: u16, dport: u16) -> Vec<u8> {
        let mut f = vec![0u8; 14 + 20 + 8];
        f[0..6].copy_from_slice(&[0x02, 0, 0, 0, 0, 1]);
        f[6..12].copy_from_slice(&[0x02, 0, 0, 0, 0, 2]);
        f[12..14].copy_from_slice(&ETHERTYPE_IPV4.to_be_bytes());
        f[14] = 0x45;
        f[23] = IPPROTO_UDP;
        f[26..30].copy_from_slice(&src);
        f[30..34].copy_from_slice(&dst);
        f[34..36].copy_from_slice(&sport.to_be_bytes());
        f[36..38].copy_from_slice(&dport.to_be_bytes());
        f
    }

    #[test]
    fn parses_udp_over_ipv4() {
        let frame = udp4([10, 0, 0, 1], [10, 0, 0, 2], 4000, 53);
        let headers = FrameHeaders::parse(&frame).unwrap();
        assert_eq!(headers.ether_type, ETHERTYPE_IPV4);
        let ip = headers.ip.unwrap();
        assert_eq!(ip.protocol, IPPROTO_UDP);
        assert_eq!(ip.ports, Some((4000, 53)));
        assert_eq!(ip.src, IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1)));
    }

    #[test]
    fn skips_vlan_tag() {
        let plain = udp4([1, 1, 1, 1], [2, 2, 2, 2], 1, 2);
        let mut tagged = plain[..12].to_vec();
        tagged.extend_from_slice(&[0x81, 0x00, 0x00, 0x0A]);
        tagged.extend_from_slice(&plain[12..]);

        let headers = FrameHeaders::parse(&tagged).unwrap();
        assert_eq!(headers.ether_type, ETHERTYPE_IPV4);
        assert_eq!(headers.ip.unwrap().ports, Some((1, 2)));
    }

    #[test]
    fn non_ip_frame_has_no_ip_header() {
        let mut frame = vec![0u8; 42];
        frame[12..14].copy_from_slice(&ETHERTYPE_ARP.to_be_bytes());
        let headers = FrameHeaders::parse(&frame).unwrap();
        assert_eq!(headers.ether_type, ETHERTYPE_ARP);
        assert!(headers.ip.is_none());
    }

    #[test]
    fn runt_frame_is_rejected() {
        assert!(FrameHeaders::parse(&[0u8; 10]).is_none());
    }

    #[test]
    fn truncated_ipv4_yields_no_ip() {
        let frame = udp4([1, 1, 1, 1], [2, 2, 2, 2], 1, 2);
        let headers = FrameHeaders::parse(&frame[..20]).unwrap();
        assert!(headers.ip.is_none());
    }
}

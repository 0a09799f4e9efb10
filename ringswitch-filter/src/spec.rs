//! ## ringswitch-filter::spec
//! **Declarative leaf filters**
//!
//! Every field that is set must match; unset fields match anything. A frame
//! whose headers cannot be parsed fails any header condition. `invert` flips
//! the final verdict.

use std::net::IpAddr;

use serde::{Deserialize, Serialize};
use tracing::debug;

use ringswitch_core::filter::FilterGate;
use ringswitch_core::frame::FrameHeaders;

use crate::signatures::PatternSet;
use crate::FilterError;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FilterSpec {
    /// EtherType after any VLAN tags.
    pub ether_type: Option<u16>,
    pub ip_protocol: Option<u8>,
    /// Source or destination address.
    pub address: Option<IpAddr>,
    /// Source or destination transport port.
    pub port: Option<u16>,
    /// Byte patterns searched anywhere in the frame; any one suffices.
    pub patterns: Vec<String>,
    pub invert: bool,
}

impl FilterSpec {
    pub fn compile(&self) -> Result<FrameFilter, FilterError> {
        let patterns = if self.patterns.is_empty() {
            None
        } else {
            Some(PatternSet::compile(&self.patterns)?)
        };
        debug!(
            "Compiled filter with {} payload patterns",
            patterns.as_ref().map_or(0, PatternSet::len)
        );
        Ok(FrameFilter {
            spec: self.clone(),
            patterns,
        })
    }

    fn needs_headers(&self) -> bool {
        self.ether_type.is_some()
            || self.ip_protocol.is_some()
            || self.address.is_some()
            || self.port.is_some()
    }
}

/// Compiled [`FilterSpec`], attachable to leaves.
#[derive(Debug, Clone)]
pub struct FrameFilter {
    spec: FilterSpec,
    patterns: Option<PatternSet>,
}

impl FrameFilter {
    pub fn spec(&self) -> &FilterSpec {
        &self.spec
    }

    fn headers_match(&self, frame: &[u8]) -> bool {
        if !self.spec.needs_headers() {
            return true;
        }
        let Some(headers) = FrameHeaders::parse(frame) else {
            return false;
        };
        if self.spec.ether_type.is_some_and(|t| t != headers.ether_type) {
            return false;
        }

        let ip_conditions =
            self.spec.ip_protocol.is_some() || self.spec.address.is_some() || self.spec.port.is_some();
        if !ip_conditions {
            return true;
        }
        let Some(ip) = headers.ip else {
            return false;
        };

        self.spec.ip_protocol.map_or(true, |p| p == ip.protocol)
            && self
                .spec
                .address
                .map_or(true, |a| a == ip.src || a == ip.dst)
            && self.spec.port.map_or(true, |port| {
                ip.ports
                    .is_some_and(|(sport, dport)| port == sport || port == dport)
            })
    }
}

impl FilterGate for FrameFilter {
    fn pass(&self, frame: &[u8]) -> bool {
        let verdict = self.headers_match(frame)
            && self.patterns.as_ref().map_or(true, |p| p.is_match(frame));
        verdict != self.spec.invert
    }

    fn clone_gate(&self) -> Box<dyn FilterGate> {
        Box::new(self.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ringswitch_core::frame::{ETHERTYPE_ARP, ETHERTYPE_IPV4, IPPROTO_TCP, IPPROTO_UDP};

    fn udp(src: [u8; 4], dst: [u8; 4], sport: u16, dport: u16, payload: &[u8]) -> Vec<u8> {
        let mut f = vec![0u8; 14 + 20 + 8];
        f[12..14].copy_from_slice(&ETHERTYPE_IPV4.to_be_bytes());
        f[14] = 0x45;
        f[23] = IPPROTO_UDP;
        f[26..30].copy_from_slice(&src);
        f[30..34].copy_from_slice(&dst);
        f[34..36].copy_from_slice(&sport.to_be_bytes());
        f[36..38].copy_from_slice(&dport.to_be_bytes());
        f.extend_from_slice(payload);
        f
    }

    fn arp() -> Vec<u8> {
        let mut f = vec![0u8; 42];
        f[12..14].copy_from_slice(&ETHERTYPE_ARP.to_be_bytes());
        f
    }

    #[test]
    fn empty_spec_passes_everything() {
        let filter = FilterSpec::default().compile().unwrap();
        assert!(filter.pass(&arp()));
        assert!(filter.pass(b""));
    }

    #[test]
    fn header_fields_must_all_match() {
        let filter = FilterSpec {
            ip_protocol: Some(IPPROTO_UDP),
            port: Some(53),
            ..Default::default()
        }
        .compile()
        .unwrap();

        assert!(filter.pass(&udp([10, 0, 0, 1], [10, 0, 0, 2], 40000, 53, b"")));
        assert!(filter.pass(&udp([10, 0, 0, 2], [10, 0, 0, 1], 53, 40000, b"")));
        assert!(!filter.pass(&udp([10, 0, 0, 1], [10, 0, 0, 2], 40000, 80, b"")));
        assert!(!filter.pass(&arp()));
    }

    #[test]
    fn protocol_mismatch_fails() {
        let filter = FilterSpec {
            ip_protocol: Some(IPPROTO_TCP),
            ..Default::default()
        }
        .compile()
        .unwrap();
        assert!(!filter.pass(&udp([1, 1, 1, 1], [2, 2, 2, 2], 1, 2, b"")));
    }

    #[test]
    fn address_matches_either_direction() {
        let filter = FilterSpec {
            address: Some("192.168.1.7".parse().unwrap()),
            ..Default::default()
        }
        .compile()
        .unwrap();
        assert!(filter.pass(&udp([192, 168, 1, 7], [10, 0, 0, 1], 1, 2, b"")));
        assert!(filter.pass(&udp([10, 0, 0, 1], [192, 168, 1, 7], 1, 2, b"")));
        assert!(!filter.pass(&udp([10, 0, 0, 1], [10, 0, 0, 2], 1, 2, b"")));
    }

    #[test]
    fn patterns_and_invert() {
        let spec = FilterSpec {
            patterns: vec!["attack".into(), "hex:cafe".into()],
            ..Default::default()
        };
        let filter = spec.compile().unwrap();
        assert!(filter.pass(&udp([1, 1, 1, 1], [2, 2, 2, 2], 1, 2, b"an attack")));
        assert!(filter.pass(&udp([1, 1, 1, 1], [2, 2, 2, 2], 1, 2, &[0xca, 0xfe])));
        assert!(!filter.pass(&udp([1, 1, 1, 1], [2, 2, 2, 2], 1, 2, b"benign")));

        let inverted = FilterSpec {
            invert: true,
            ..spec
        }
        .compile()
        .unwrap();
        assert!(!inverted.pass(&udp([1, 1, 1, 1], [2, 2, 2, 2], 1, 2, b"an attack")));
        assert!(inverted.pass(&udp([1, 1, 1, 1], [2, 2, 2, 2], 1, 2, b"benign")));
    }

    #[test]
    fn cloned_gate_behaves_identically() {
        let filter = FilterSpec {
            ether_type: Some(ETHERTYPE_ARP),
            ..Default::default()
        }
        .compile()
        .unwrap();
        let gate = filter.clone_gate();
        assert!(gate.pass(&arp()));
        assert!(!gate.pass(&udp([1, 1, 1, 1], [2, 2, 2, 2], 1, 2, b"")));
    }

    #[test]
    fn spec_reads_from_yaml() {
        let spec: FilterSpec = serde_yaml::from_str(
            "ip_protocol: 17\nport: 53\npatterns: [\"hex:00ff\"]\n",
        )
        .unwrap();
        assert_eq!(spec.port, Some(53));
        assert_eq!(spec.patterns, vec!["hex:00ff".to_string()]);
        assert!(!spec.invert);

        let unknown: Result<FilterSpec, _> = serde_yaml::from_str("colour: red\n");
        assert!(unknown.is_err());
    }
}

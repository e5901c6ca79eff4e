//! Frame normalisation (component C2): computing a Canonical Frame Key from
//! raw frame bytes under a declared policy, per spec §4.2.

use crate::error::{Error, Result};
use crate::pcap::LINKTYPE_ETHERNET;

const ETHERNET_HEADER_LEN: usize = 14;
const VLAN_HEADER_LEN: usize = 18;
const VLAN_TPID: [u8; 2] = [0x81, 0x00];

/// The active canonicalisation policy. `StripL3` implies `StripL2` (spec
/// §4.2: "`strip-l3` — imply `strip-l2`"), so the three flags named in the
/// spec collapse to exactly these three reachable states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Policy {
    /// Neither flag set: the key equals the raw frame bytes.
    Identity,
    /// `strip-l2`: the key is the frame with its link-layer header removed.
    StripL2,
    /// `strip-l3`: `StripL2` plus homogenisation of mutable L3 fields.
    StripL3,
}

impl Policy {
    pub fn strips_link_layer(self) -> bool {
        !matches!(self, Policy::Identity)
    }
}

/// Compute the Canonical Frame Key for `frame` under `policy`. `link_type`
/// is the owning Capture's link-layer type; it is only consulted when the
/// policy needs to strip link-layer framing.
pub fn canonical_key(frame: &[u8], link_type: u32, policy: Policy) -> Result<Vec<u8>> {
    match policy {
        Policy::Identity => Ok(frame.to_vec()),
        Policy::StripL2 => strip_l2(frame, link_type).map(|payload| payload.to_vec()),
        Policy::StripL3 => {
            let payload = strip_l2(frame, link_type)?;
            homogenize_l3(payload)
        }
    }
}

/// Remove the link-layer header from `frame`, returning the remaining
/// payload. Only Ethernet (with optional single VLAN tag) is supported;
/// any other link type is `UnsupportedLinkType` (spec §4.2).
fn strip_l2(frame: &[u8], link_type: u32) -> Result<&[u8]> {
    if link_type != LINKTYPE_ETHERNET {
        return Err(Error::UnsupportedLinkType { link_type });
    }

    let header_len = if frame.len() >= 14 && frame[12..14] == VLAN_TPID {
        VLAN_HEADER_LEN
    } else {
        ETHERNET_HEADER_LEN
    };

    if frame.len() < header_len {
        return Err(Error::UnsupportedLinkType { link_type });
    }

    Ok(&frame[header_len..])
}

/// Rewrite the fixed fields of an IPv4/IPv6 header that a Layer-3 hop
/// mutates (TTL/hop-limit, header checksum, NAT'd addresses) to canonical
/// constants, per spec §4.2. The protocol byte and everything above L3 is
/// preserved untouched.
fn homogenize_l3(l3_and_up: &[u8]) -> Result<Vec<u8>> {
    if l3_and_up.is_empty() {
        return Err(Error::UnsupportedIpVersion { nibble: 0 });
    }
    let version = l3_and_up[0] >> 4;

    let mut out = l3_and_up.to_vec();
    match version {
        4 => {
            // Validate the header is at least well-formed before mutating
            // fixed offsets; a frame whose declared header doesn't fit its
            // own bytes is not something we can safely rewrite in place.
            etherparse::Ipv4HeaderSlice::from_slice(&out)
                .map_err(|_| Error::UnsupportedIpVersion { nibble: version })?;
            if out.len() < 20 {
                return Err(Error::UnsupportedIpVersion { nibble: version });
            }
            out[8] = 0xff; // TTL
            out[10] = 0x13; // header checksum
            out[11] = 0x37;
            out[12..16].copy_from_slice(&[0x0a, 0x01, 0x01, 0x01]); // source
            out[16..20].copy_from_slice(&[0x0a, 0x02, 0x02, 0x02]); // destination
        }
        6 => {
            etherparse::Ipv6HeaderSlice::from_slice(&out)
                .map_err(|_| Error::UnsupportedIpVersion { nibble: version })?;
            if out.len() < 8 {
                return Err(Error::UnsupportedIpVersion { nibble: version });
            }
            out[7] = 0x2a; // hop limit
        }
        other => return Err(Error::UnsupportedIpVersion { nibble: other }),
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ethernet_ipv4_frame() -> Vec<u8> {
        let mut frame = vec![0u8; 14 + 20 + 4];
        frame[12] = 0x08;
        frame[13] = 0x00; // ethertype IPv4
        let ip = &mut frame[14..];
        ip[0] = 0x45; // version 4, ihl 5
        ip[8] = 64; // ttl
        ip[9] = 17; // protocol (udp), preserved
        ip[12..16].copy_from_slice(&[192, 168, 1, 1]);
        ip[16..20].copy_from_slice(&[192, 168, 1, 2]);
        ip[20..24].copy_from_slice(b"UDP!");
        frame
    }

    #[test]
    fn identity_returns_raw_bytes() {
        let frame = ethernet_ipv4_frame();
        let key = canonical_key(&frame, LINKTYPE_ETHERNET, Policy::Identity).unwrap();
        assert_eq!(key, frame);
    }

    #[test]
    fn strip_l2_removes_ethernet_header_only() {
        let frame = ethernet_ipv4_frame();
        let key = canonical_key(&frame, LINKTYPE_ETHERNET, Policy::StripL2).unwrap();
        assert_eq!(key, frame[14..]);
    }

    #[test]
    fn strip_l3_rewrites_mutable_fields_but_preserves_payload() {
        let frame = ethernet_ipv4_frame();
        let key = canonical_key(&frame, LINKTYPE_ETHERNET, Policy::StripL3).unwrap();
        assert_eq!(key[8], 0xff);
        assert_eq!(&key[10..12], &[0x13, 0x37]);
        assert_eq!(&key[12..16], &[0x0a, 0x01, 0x01, 0x01]);
        assert_eq!(&key[16..20], &[0x0a, 0x02, 0x02, 0x02]);
        assert_eq!(&key[9..10], &[17]); // protocol byte preserved
        assert_eq!(&key[20..24], b"UDP!"); // payload preserved
    }

    #[test]
    fn strip_l3_is_idempotent() {
        let frame = ethernet_ipv4_frame();
        let once = canonical_key(&frame, LINKTYPE_ETHERNET, Policy::StripL3).unwrap();
        let twice = homogenize_l3(&once).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn strip_l3_subsumes_strip_l2() {
        // Applying StripL2 to the StripL3 key (itself already L2-stripped)
        // is a no-op, since the key has no link-layer header left to strip
        // relative to its own link type of "raw IP".
        let frame = ethernet_ipv4_frame();
        let l3_key = canonical_key(&frame, LINKTYPE_ETHERNET, Policy::StripL3).unwrap();
        assert_eq!(l3_key, homogenize_l3(&l3_key).unwrap());
    }

    #[test]
    fn vlan_tagged_frame_uses_18_byte_header() {
        let mut frame = vec![0u8; 18 + 20];
        frame[12] = 0x81;
        frame[13] = 0x00;
        frame[16] = 0x08;
        frame[17] = 0x00;
        frame[18] = 0x45;
        let key = canonical_key(&frame, LINKTYPE_ETHERNET, Policy::StripL2).unwrap();
        assert_eq!(key, frame[18..]);
    }

    #[test]
    fn non_ethernet_linktype_rejected_for_strip() {
        let frame = ethernet_ipv4_frame();
        let err = canonical_key(&frame, 105 /* 802.11 */, Policy::StripL2).unwrap_err();
        assert!(matches!(err, Error::UnsupportedLinkType { .. }));
    }

    #[test]
    fn unknown_ip_version_rejected() {
        let mut frame = ethernet_ipv4_frame();
        frame[14] = 0x55; // version nibble 5
        let err = canonical_key(&frame, LINKTYPE_ETHERNET, Policy::StripL3).unwrap_err();
        assert!(matches!(err, Error::UnsupportedIpVersion { .. }));
    }
}

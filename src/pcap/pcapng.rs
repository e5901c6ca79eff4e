//! Minimal pcapng reader (additive convenience, see SPEC_FULL.md §4.1).
//!
//! Understands only the block types the specification's own source material
//! assumes exist: Section Header, Interface Description, and
//! Enhanced/Simple Packet blocks. Anything else is skipped rather than
//! rejected, since a full pcapng implementation (options, name resolution,
//! interface statistics, …) is out of scope — the `editcap`-conversion path
//! (spec §6) remains the contract of record for pcapng inputs when this
//! reader does not recognise something.

use std::path::Path;
use std::time::Duration;

use byteorder::{BigEndian, ByteOrder, LittleEndian};

use crate::error::{Error, Result};
use crate::timestamp::Timestamp;

use super::{ParsedPcap, RawRecord};

const BYTE_ORDER_MAGIC: u32 = 0x1A2B_3C4D;

const BLOCK_SECTION_HEADER: u32 = 0x0A0D_0D0A;
const BLOCK_INTERFACE_DESCRIPTION: u32 = 0x0000_0001;
const BLOCK_SIMPLE_PACKET: u32 = 0x0000_0003;
const BLOCK_ENHANCED_PACKET: u32 = 0x0000_0006;

#[derive(Clone, Copy)]
enum Bo {
    Little,
    Big,
}

impl Bo {
    fn u32(self, b: &[u8]) -> u32 {
        match self {
            Bo::Little => LittleEndian::read_u32(b),
            Bo::Big => BigEndian::read_u32(b),
        }
    }

    fn u16(self, b: &[u8]) -> u16 {
        match self {
            Bo::Little => LittleEndian::read_u16(b),
            Bo::Big => BigEndian::read_u16(b),
        }
    }
}

struct Interface {
    link_type: u32,
    /// duration represented by one timestamp unit, derived from the
    /// interface's `if_tsresol` option (default 10^-6, i.e. microseconds).
    tick: Duration,
}

impl Default for Interface {
    fn default() -> Self {
        Interface {
            link_type: super::LINKTYPE_ETHERNET,
            tick: Duration::from_micros(1),
        }
    }
}

/// Parse a pcapng byte stream into the same [`ParsedPcap`] shape the legacy
/// codec produces. The file-global `link_type` in the returned header is
/// taken from the first Interface Description Block seen; per-packet link
/// type changes mid-file (legal in pcapng, vanishingly rare in practice) are
/// not represented, matching the Capture data model's single `link_type`
/// field (spec §3).
pub fn parse_pcapng(data: &[u8], path: &Path) -> Result<ParsedPcap> {
    if data.len() < 12 || data[0..4] != super::PCAPNG_MAGIC {
        return Err(Error::BadMagic {
            path: path.to_path_buf(),
            magic: data.get(0..4).and_then(|s| s.try_into().ok()).unwrap_or([0; 4]),
        });
    }

    // The byte-order magic sits at offset 8 of the Section Header Block and
    // tells us how to read everything else, including the block's own
    // length fields.
    let bom_le = LittleEndian::read_u32(&data[8..12]);
    let bo = if bom_le == BYTE_ORDER_MAGIC {
        Bo::Little
    } else {
        Bo::Big
    };

    let mut interfaces: Vec<Interface> = Vec::new();
    let mut records = Vec::new();
    let mut offset = 0usize;
    let mut file_link_type = None;

    while offset + 12 <= data.len() {
        let block_type = bo.u32(&data[offset..offset + 4]);
        let block_len = bo.u32(&data[offset + 4..offset + 8]) as usize;
        if block_len < 12 || offset + block_len > data.len() {
            return Err(Error::TruncatedRecord {
                path: path.to_path_buf(),
                offset: offset as u64,
                claimed: block_len as u32,
                available: (data.len() - offset) as u64,
            });
        }
        let body = &data[offset + 8..offset + block_len - 4];

        match block_type {
            BLOCK_SECTION_HEADER => {}
            BLOCK_INTERFACE_DESCRIPTION => {
                let link_type = bo.u16(&body[0..2]) as u32;
                let mut iface = Interface {
                    link_type,
                    ..Interface::default()
                };
                parse_if_ts_resol(bo, &body[8..], &mut iface.tick);
                if file_link_type.is_none() {
                    file_link_type = Some(link_type);
                }
                interfaces.push(iface);
            }
            BLOCK_SIMPLE_PACKET => {
                let iface = interfaces.first().map(|i| i.tick).unwrap_or(Duration::from_micros(1));
                let packet_len = bo.u32(&body[0..4]) as usize;
                let captured = &body[4..4 + packet_len.min(body.len().saturating_sub(4))];
                records.push(RawRecord {
                    timestamp: Timestamp(Duration::ZERO),
                    data: captured.to_vec(),
                    original_len: packet_len as u32,
                });
                let _ = iface;
            }
            BLOCK_ENHANCED_PACKET => {
                let iface_id = bo.u32(&body[0..4]) as usize;
                let ts_high = bo.u32(&body[4..8]) as u64;
                let ts_low = bo.u32(&body[8..12]) as u64;
                let units = (ts_high << 32) | ts_low;
                let captured_len = bo.u32(&body[12..16]) as usize;
                let original_len = bo.u32(&body[16..20]);
                let payload = &body[20..20 + captured_len.min(body.len().saturating_sub(20))];

                let tick = interfaces
                    .get(iface_id)
                    .map(|i| i.tick)
                    .unwrap_or(Duration::from_micros(1));
                let timestamp = Timestamp(scale_duration(tick, units));

                records.push(RawRecord {
                    timestamp,
                    data: payload.to_vec(),
                    original_len,
                });
            }
            _ => {
                // Unrecognised block type: skip it. A full pcapng
                // implementation would also honour Name Resolution and
                // Interface Statistics blocks; this reader is a convenience
                // fallback, not a replacement for the editcap path.
            }
        }

        offset += block_len;
    }

    let header = super::GlobalHeader {
        version_major: 1,
        version_minor: 0,
        utc_offset_secs: 0,
        ts_accuracy: 0,
        snaplen: 0xffff,
        link_type: file_link_type.unwrap_or(super::LINKTYPE_ETHERNET),
        resolution: crate::timestamp::Resolution::Nanos,
    };

    Ok(ParsedPcap { header, records })
}

/// `tick * units` without `Duration::saturating_mul`'s `u32` ceiling: an
/// Enhanced Packet Block's 64-bit unit count routinely exceeds `u32::MAX`
/// (e.g. any microsecond-resolution Unix timestamp does, by design).
fn scale_duration(tick: Duration, units: u64) -> Duration {
    let total_nanos = tick.as_nanos().saturating_mul(units as u128);
    let secs = (total_nanos / 1_000_000_000) as u64;
    let subsec_nanos = (total_nanos % 1_000_000_000) as u32;
    Duration::new(secs, subsec_nanos)
}

/// Scan an Interface Description Block's options for `if_tsresol` (option
/// code 9) and, if present, set `tick` to the duration of one timestamp
/// unit. Matches the resolution formula documented by the pcapng draft: the
/// high bit selects base 2 vs base 10, the low 7 bits are the negated
/// exponent.
fn parse_if_ts_resol(bo: Bo, mut options: &[u8], tick: &mut Duration) {
    while options.len() >= 4 {
        let code = bo.u16(&options[0..2]);
        let len = bo.u16(&options[2..4]) as usize;
        let padded = (len + 3) & !3;
        if options.len() < 4 + padded {
            break;
        }
        if code == 9 && len >= 1 {
            let reso = options[4];
            let base: u32 = if reso & 0x80 == 0 { 10 } else { 2 };
            let divisor = base.saturating_pow((reso & 0x7f) as u32).max(1);
            *tick = Duration::from_secs(1) / divisor;
        }
        if code == 0 {
            break;
        }
        options = &options[4 + padded..];
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn block(block_type: u32, body: &[u8]) -> Vec<u8> {
        let total_len = (8 + body.len() + 4) as u32;
        let mut out = Vec::with_capacity(total_len as usize);
        out.extend_from_slice(&block_type.to_le_bytes());
        out.extend_from_slice(&total_len.to_le_bytes());
        out.extend_from_slice(body);
        out.extend_from_slice(&total_len.to_le_bytes());
        out
    }

    fn section_header() -> Vec<u8> {
        let mut body = Vec::new();
        body.extend_from_slice(&BYTE_ORDER_MAGIC.to_le_bytes());
        body.extend_from_slice(&1u16.to_le_bytes()); // major
        body.extend_from_slice(&0u16.to_le_bytes()); // minor
        body.extend_from_slice(&u64::MAX.to_le_bytes()); // section length unknown
        block(BLOCK_SECTION_HEADER, &body)
    }

    fn interface_description(ts_resol_exp: u8) -> Vec<u8> {
        let mut body = Vec::new();
        body.extend_from_slice(&1u16.to_le_bytes()); // link_type: Ethernet
        body.extend_from_slice(&0u16.to_le_bytes()); // reserved
        body.extend_from_slice(&0u32.to_le_bytes()); // snaplen
        // if_tsresol option: code 9, length 1, value padded to 4 bytes.
        body.extend_from_slice(&9u16.to_le_bytes());
        body.extend_from_slice(&1u16.to_le_bytes());
        body.extend_from_slice(&[ts_resol_exp, 0, 0, 0]);
        // opt_endofopt
        body.extend_from_slice(&0u16.to_le_bytes());
        body.extend_from_slice(&0u16.to_le_bytes());
        block(BLOCK_INTERFACE_DESCRIPTION, &body)
    }

    fn enhanced_packet(units: u64, payload: &[u8]) -> Vec<u8> {
        let mut body = Vec::new();
        body.extend_from_slice(&0u32.to_le_bytes()); // interface id
        body.extend_from_slice(&((units >> 32) as u32).to_le_bytes());
        body.extend_from_slice(&(units as u32).to_le_bytes());
        body.extend_from_slice(&(payload.len() as u32).to_le_bytes());
        body.extend_from_slice(&(payload.len() as u32).to_le_bytes());
        body.extend_from_slice(payload);
        block(BLOCK_ENHANCED_PACKET, &body)
    }

    #[test]
    fn reads_link_type_and_payload_from_enhanced_packet_block() {
        let mut data = section_header();
        data.extend(interface_description(6)); // microsecond resolution
        data.extend(enhanced_packet(1, b"hello"));

        let parsed = parse_pcapng(&data, Path::new("mem.pcapng")).unwrap();
        assert_eq!(parsed.header.link_type, 1);
        assert_eq!(parsed.records.len(), 1);
        assert_eq!(parsed.records[0].data, b"hello");
    }

    #[test]
    fn large_tick_counts_do_not_truncate_through_u32() {
        let mut data = section_header();
        data.extend(interface_description(9)); // nanosecond resolution
        data.extend(enhanced_packet(5_000_000_000, b"x")); // 5 seconds of ns ticks

        let parsed = parse_pcapng(&data, Path::new("mem.pcapng")).unwrap();
        assert_eq!(parsed.records[0].timestamp.seconds(), 5);
    }

    #[test]
    fn rejects_non_pcapng_magic() {
        let err = parse_pcapng(&[0u8; 12], Path::new("mem")).unwrap_err();
        assert!(matches!(err, Error::BadMagic { .. }));
    }
}

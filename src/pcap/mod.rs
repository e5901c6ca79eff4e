//! The libpcap binary codec (component C1).
//!
//! Reads and writes the classic libpcap file format directly from bytes, per
//! the authoritative layout in the specification: a 24-byte global header
//! followed by records of a 16-byte prefix and a variable-length payload.
//! See also `pcapng` for the additive pcapng reader.

mod pcapng;

use std::fs;
use std::io::Write as _;
use std::path::Path;

use byteorder::{BigEndian, ByteOrder, LittleEndian};

use crate::error::{Error, Result};
use crate::timestamp::{Resolution, Timestamp};

pub use pcapng::parse_pcapng;

/// Magic number selecting little-endian, microsecond-resolution records.
pub const MAGIC_LE_MICROS: [u8; 4] = [0xd4, 0xc3, 0xb2, 0xa1];
/// Magic number selecting big-endian, microsecond-resolution records.
pub const MAGIC_BE_MICROS: [u8; 4] = [0xa1, 0xb2, 0xc3, 0xd4];
/// Magic number selecting little-endian, nanosecond-resolution records (§9).
pub const MAGIC_LE_NANOS: [u8; 4] = [0x4d, 0x3c, 0xb2, 0xa1];
/// Magic number selecting big-endian, nanosecond-resolution records (§9).
pub const MAGIC_BE_NANOS: [u8; 4] = [0xa1, 0xb2, 0x3c, 0x4d];

pub const GLOBAL_HEADER_LEN: usize = 24;
pub const RECORD_HEADER_LEN: usize = 16;

/// Link-layer type written for captures produced under an L3-stripping
/// normalisation policy (spec §3, "Derived Capture").
pub const LINKTYPE_RAW: u32 = 101;
pub const LINKTYPE_ETHERNET: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Endianness {
    Little,
    Big,
}

impl Endianness {
    fn read_u16(self, bytes: &[u8]) -> u16 {
        match self {
            Endianness::Little => LittleEndian::read_u16(bytes),
            Endianness::Big => BigEndian::read_u16(bytes),
        }
    }

    fn read_u32(self, bytes: &[u8]) -> u32 {
        match self {
            Endianness::Little => LittleEndian::read_u32(bytes),
            Endianness::Big => BigEndian::read_u32(bytes),
        }
    }

    fn read_i32(self, bytes: &[u8]) -> i32 {
        self.read_u32(bytes) as i32
    }
}

/// The parsed global header of a pcap file.
#[derive(Debug, Clone, Copy)]
pub struct GlobalHeader {
    pub version_major: u16,
    pub version_minor: u16,
    pub utc_offset_secs: i32,
    pub ts_accuracy: u32,
    pub snaplen: u32,
    pub link_type: u32,
    pub resolution: Resolution,
}

/// One parsed record: its reconstructed timestamp and captured payload.
#[derive(Debug, Clone)]
pub struct RawRecord {
    pub timestamp: Timestamp,
    pub data: Vec<u8>,
    pub original_len: u32,
}

/// A fully parsed pcap file: its global header plus its records in the
/// order they were read (capture order is preserved, per spec §1 Non-goals).
#[derive(Debug, Clone)]
pub struct ParsedPcap {
    pub header: GlobalHeader,
    pub records: Vec<RawRecord>,
}

/// Controls the one behaviour the specification flags as inconsistent in
/// the reference implementation (§9): whether a nonzero global-header UTC
/// offset is added to every record's seconds field on read.
#[derive(Debug, Clone, Copy)]
pub struct ReadOptions {
    pub apply_utc_offset: bool,
}

impl Default for ReadOptions {
    fn default() -> Self {
        // Matches the observed reference behaviour (spec §4.1, §9).
        ReadOptions {
            apply_utc_offset: true,
        }
    }
}

/// Parse a pcap file already resident in memory. `path` is used only to
/// annotate errors.
pub fn parse_bytes(data: &[u8], path: &Path, options: ReadOptions) -> Result<ParsedPcap> {
    if data.len() < GLOBAL_HEADER_LEN {
        return Err(Error::BadMagic {
            path: path.to_path_buf(),
            magic: [0; 4],
        });
    }

    let magic: [u8; 4] = data[0..4].try_into().unwrap();
    let (endianness, resolution) = match magic {
        MAGIC_LE_MICROS => (Endianness::Little, Resolution::Micros),
        MAGIC_BE_MICROS => (Endianness::Big, Resolution::Micros),
        MAGIC_LE_NANOS => (Endianness::Little, Resolution::Nanos),
        MAGIC_BE_NANOS => (Endianness::Big, Resolution::Nanos),
        other => {
            return Err(Error::BadMagic {
                path: path.to_path_buf(),
                magic: other,
            })
        }
    };

    let version_major = endianness.read_u16(&data[4..6]);
    let version_minor = endianness.read_u16(&data[6..8]);
    let utc_offset_secs = endianness.read_i32(&data[8..12]);
    let ts_accuracy = endianness.read_u32(&data[12..16]);
    let snaplen = endianness.read_u32(&data[16..20]);
    let link_type = endianness.read_u32(&data[20..24]);

    let header = GlobalHeader {
        version_major,
        version_minor,
        utc_offset_secs,
        ts_accuracy,
        snaplen,
        link_type,
        resolution,
    };

    let mut records = Vec::new();
    let mut offset = GLOBAL_HEADER_LEN;
    while offset < data.len() {
        if data.len() - offset < RECORD_HEADER_LEN {
            return Err(Error::TruncatedRecord {
                path: path.to_path_buf(),
                offset: offset as u64,
                claimed: 0,
                available: (data.len() - offset) as u64,
            });
        }

        let rec_header = &data[offset..offset + RECORD_HEADER_LEN];
        let mut ts_sec = endianness.read_u32(&rec_header[0..4]) as i64;
        let ts_subsec = endianness.read_u32(&rec_header[4..8]);
        let caplen = endianness.read_u32(&rec_header[8..12]);
        let origlen = endianness.read_u32(&rec_header[12..16]);

        if options.apply_utc_offset && utc_offset_secs != 0 {
            ts_sec += utc_offset_secs as i64;
        }

        let payload_start = offset + RECORD_HEADER_LEN;
        let available = data.len().saturating_sub(payload_start) as u64;
        if caplen as u64 > available {
            return Err(Error::TruncatedRecord {
                path: path.to_path_buf(),
                offset: offset as u64,
                claimed: caplen,
                available,
            });
        }

        let payload_end = payload_start + caplen as usize;
        let frame_bytes = data[payload_start..payload_end].to_vec();

        let seconds = u32::try_from(ts_sec.max(0)).unwrap_or(u32::MAX);
        let timestamp = Timestamp::from_secs_subsec(seconds, ts_subsec, resolution);

        records.push(RawRecord {
            timestamp,
            data: frame_bytes,
            original_len: origlen,
        });

        offset = payload_end;
    }

    Ok(ParsedPcap { header, records })
}

/// Read and parse a capture file from disk, dispatching to the pcapng
/// reader when [`sniff_format`] recognises the pcapng magic and to the
/// legacy-pcap parser otherwise (spec §4.1's additive pcapng convenience).
pub fn read_file(path: &Path, options: ReadOptions) -> Result<ParsedPcap> {
    let bytes = fs::read(path).map_err(|source| Error::FilesystemError {
        path: path.to_path_buf(),
        source,
    })?;
    match sniff_format(&bytes) {
        Format::PcapNg => parse_pcapng(&bytes, path),
        Format::Pcap => parse_bytes(&bytes, path, options),
    }
}

/// Serialise `records` (sorted ascending by timestamp, per spec §4.1 "the
/// single point of ordering normalisation in the system") as a pcap byte
/// stream using native endianness, fixed header fields, and the given link
/// type.
pub fn write_bytes(link_type: u32, records: &[RawRecord]) -> Vec<u8> {
    let mut sorted: Vec<&RawRecord> = records.iter().collect();
    sorted.sort_by_key(|r| r.timestamp);

    let mut out = Vec::with_capacity(GLOBAL_HEADER_LEN + sorted.len() * 32);
    out.extend_from_slice(&MAGIC_BE_MICROS);
    write_native_u16(&mut out, 2);
    write_native_u16(&mut out, 4);
    write_native_i32(&mut out, 0); // utc_offset
    write_native_u32(&mut out, 0); // ts_accuracy
    write_native_u32(&mut out, 0xffff); // snaplen
    write_native_u32(&mut out, link_type);

    for record in sorted {
        let secs = record.timestamp.seconds();
        let usecs = record.timestamp.subsec(Resolution::Micros);
        let len = record.data.len() as u32;

        write_native_u32(&mut out, secs as u32);
        write_native_u32(&mut out, usecs);
        write_native_u32(&mut out, len);
        write_native_u32(&mut out, len);
        out.extend_from_slice(&record.data);
    }

    out
}

/// Write `records` to `path` as a pcap file.
pub fn write_file(path: &Path, link_type: u32, records: &[RawRecord]) -> Result<()> {
    let bytes = write_bytes(link_type, records);
    let mut file = fs::File::create(path).map_err(|source| Error::FilesystemError {
        path: path.to_path_buf(),
        source,
    })?;
    file
        .write_all(&bytes)
        .map_err(|source| Error::FilesystemError {
            path: path.to_path_buf(),
            source,
        })?;
    Ok(())
}

fn write_native_u16(out: &mut Vec<u8>, v: u16) {
    out.extend_from_slice(&v.to_ne_bytes());
}

fn write_native_u32(out: &mut Vec<u8>, v: u32) {
    out.extend_from_slice(&v.to_ne_bytes());
}

fn write_native_i32(out: &mut Vec<u8>, v: i32) {
    out.extend_from_slice(&v.to_ne_bytes());
}

/// `.pcapng` magic (Section Header Block type), used by callers to decide
/// between the legacy-pcap and pcapng parse paths without touching the
/// filesystem extension.
pub const PCAPNG_MAGIC: [u8; 4] = [0x0a, 0x0d, 0x0d, 0x0a];

pub fn sniff_format(data: &[u8]) -> Format {
    if data.len() >= 4 && data[0..4] == PCAPNG_MAGIC {
        Format::PcapNg
    } else {
        Format::Pcap
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Pcap,
    PcapNg,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn sample_record(secs: u64, usecs: u32, data: &[u8]) -> RawRecord {
        RawRecord {
            timestamp: Timestamp(Duration::new(secs, usecs * 1_000)),
            data: data.to_vec(),
            original_len: data.len() as u32,
        }
    }

    #[test]
    fn round_trip_preserves_frames_and_linktype() {
        let records = vec![
            sample_record(10, 500, b"hello"),
            sample_record(5, 0, b"world"),
        ];
        let bytes = write_bytes(LINKTYPE_ETHERNET, &records);
        let parsed = parse_bytes(&bytes, Path::new("mem"), ReadOptions::default()).unwrap();

        assert_eq!(parsed.header.link_type, LINKTYPE_ETHERNET);
        // write_bytes sorts ascending; "world" (t=5) must come first.
        assert_eq!(parsed.records[0].data, b"world");
        assert_eq!(parsed.records[1].data, b"hello");
    }

    #[test]
    fn rejects_bad_magic() {
        let data = vec![0u8; 24];
        let err = parse_bytes(&data, Path::new("bad"), ReadOptions::default()).unwrap_err();
        assert!(matches!(err, Error::BadMagic { .. }));
    }

    #[test]
    fn rejects_truncated_record() {
        let mut bytes = write_bytes(LINKTYPE_ETHERNET, &[sample_record(1, 0, b"abcdef")]);
        bytes.truncate(bytes.len() - 3);
        let err = parse_bytes(&bytes, Path::new("trunc"), ReadOptions::default()).unwrap_err();
        assert!(matches!(err, Error::TruncatedRecord { .. }));
    }

    #[test]
    fn utc_offset_is_applied_when_requested() {
        let mut bytes = write_bytes(LINKTYPE_ETHERNET, &[sample_record(100, 0, b"x")]);
        // Patch the global header's utc_offset field (native-endian i32 at offset 8).
        let offset: i32 = 3600;
        bytes[8..12].copy_from_slice(&offset.to_ne_bytes());
        // write_bytes always writes the big-endian microsecond magic.
        bytes[0..4].copy_from_slice(&MAGIC_BE_MICROS);

        let applied = parse_bytes(&bytes, Path::new("off"), ReadOptions::default()).unwrap();
        assert_eq!(applied.records[0].timestamp.seconds(), 3700);

        let ignored = parse_bytes(
            &bytes,
            Path::new("off"),
            ReadOptions {
                apply_utc_offset: false,
            },
        )
        .unwrap();
        assert_eq!(ignored.records[0].timestamp.seconds(), 100);
    }

    #[test]
    fn nanosecond_magic_is_recognised() {
        let mut bytes = write_bytes(LINKTYPE_ETHERNET, &[sample_record(1, 0, b"x")]);
        bytes[0..4].copy_from_slice(&MAGIC_BE_NANOS);
        // rewrite the subsecond field as 500_000_000 ns (half a second)
        bytes[GLOBAL_HEADER_LEN + 4..GLOBAL_HEADER_LEN + 8]
            .copy_from_slice(&500_000_000u32.to_ne_bytes());
        let parsed = parse_bytes(&bytes, Path::new("ns"), ReadOptions::default()).unwrap();
        assert_eq!(parsed.header.resolution, Resolution::Nanos);
        assert_eq!(parsed.records[0].timestamp.0.subsec_nanos(), 500_000_000);
    }
}

//! Exercises the codec and the Set Algebra Engine together against the
//! `simul1`/`simul2`/`simul3` scenarios: three 60-second overlapping
//! synthetic captures, each with an ICMP-echo-shaped frame and a
//! DNS-query-shaped frame per second, starting at absolute offsets 0s,
//! 20s, and 40s. No `editcap` dependency: fixtures are built and parsed
//! entirely in memory through the real pcap codec.

use std::path::Path;
use std::time::Duration;

use pcapgraph_core::algebra::{
    bounded_intersection, difference, intersection, inverse_bounded_intersection,
    symmetric_difference, union,
};
use pcapgraph_core::capture::{Capture, Origin};
use pcapgraph_core::normalize::Policy;
use pcapgraph_core::pcap::{self, LINKTYPE_ETHERNET, RawRecord, ReadOptions};
use pcapgraph_core::timestamp::Timestamp;

/// A minimal, deterministic Ethernet+IPv4 frame for absolute second `t` and
/// a frame `kind` (0 = ICMP echo, 1 = DNS query). Two distinct frames exist
/// per second; frames for the same `(t, kind)` pair are byte-identical
/// across every capture that contains that absolute second, and distinct
/// otherwise, regardless of which capture or relative offset produced them.
fn frame_for(t: u64, kind: u8) -> Vec<u8> {
    let mut frame = vec![0u8; 14 + 20 + 8];
    frame[12] = 0x08;
    frame[13] = 0x00; // ethertype IPv4
    let ip = &mut frame[14..];
    ip[0] = 0x45;
    ip[9] = if kind == 0 { 1 } else { 17 }; // ICMP or UDP
    ip[12..16].copy_from_slice(&[10, 0, 0, 1]);
    ip[16..20].copy_from_slice(&[10, 0, 0, 2]);
    let payload = &mut ip[20..];
    payload[0] = kind;
    payload[1..9].copy_from_slice(&t.to_be_bytes());
    frame
}

fn absolute_ts(t: u64) -> Timestamp {
    Timestamp(Duration::from_secs(t) + Timestamp::MIN_PLAUSIBLE.0)
}

/// A 60-second synthetic capture covering absolute seconds
/// `[start, start + 60)`, two frames per second, parsed back through the
/// real codec rather than constructed directly.
fn simul(name: &str, start: u64) -> Capture {
    let mut records = Vec::new();
    for t in start..start + 60 {
        for kind in [0u8, 1u8] {
            let data = frame_for(t, kind);
            records.push(RawRecord {
                timestamp: absolute_ts(t),
                original_len: data.len() as u32,
                data,
            });
        }
    }

    let bytes = pcap::write_bytes(LINKTYPE_ETHERNET, &records);
    let parsed = pcap::parse_bytes(&bytes, Path::new(name), ReadOptions::default()).unwrap();

    let frames = parsed
        .records
        .into_iter()
        .map(|r| pcapgraph_core::capture::Frame {
            bytes: r.data,
            timestamp: r.timestamp,
        })
        .collect();

    Capture::from_frames(
        name,
        Origin::Input {
            path: format!("{name}.pcap").into(),
        },
        parsed.header.link_type,
        frames,
    )
}

fn captures() -> (Capture, Capture, Capture) {
    let _ = env_logger::try_init();
    (simul("simul1", 0), simul("simul2", 20), simul("simul3", 40))
}

#[test]
fn union_counts_distinct_frames_and_earliest_timestamp() {
    let (a, b, c) = captures();
    let (u, _report) = union(&[a.clone(), b.clone(), c.clone()], Policy::Identity).unwrap();

    // Absolute seconds spanned across all three: [0, 100), 2 frames/sec.
    assert_eq!(u.len(), 200);
    assert_eq!(u.summary().earliest, Some(absolute_ts(0)));
}

#[test]
fn intersection_is_the_40_to_60_overlap_window() {
    let (a, b, c) = captures();
    let (x, report) = intersection(&[a.clone(), b.clone(), c.clone()], Policy::Identity).unwrap();

    // Overlap common to all three: absolute seconds [40, 60), 2 frames/sec.
    assert_eq!(x.len(), 40);
    assert_eq!(report.coverage_percent.len(), 3);
    for (_, pct) in report.coverage_percent {
        assert!((pct - (40.0 / 120.0 * 100.0)).abs() < 1e-9);
    }
}

#[test]
fn difference_simul1_minus_simul3_is_two_thirds_of_simul1() {
    let (a, _b, c) = captures();
    let d = difference(&[a.clone(), c], Policy::Identity).unwrap();

    // simul1 \ simul3 == absolute seconds [0, 40), 2 frames/sec == 80 frames.
    assert_eq!(d.len(), 80);
    assert_eq!(d.len(), a.len() * 2 / 3);
}

#[test]
fn symmetric_difference_simul2_is_empty_and_suppressed_on_exclude_empty() {
    let (a, b, c) = captures();
    let sds = symmetric_difference(&[a, b, c], Policy::Identity).unwrap();

    let simul2_symdiff = sds.iter().find(|cap| cap.name == "symdiff_simul2").unwrap();
    assert!(simul2_symdiff.is_empty());

    let dir = tempfile::tempdir().unwrap();
    let summaries =
        pcapgraph_core::assemble::assemble(dir.path(), &sds, true).unwrap();
    assert!(summaries.iter().all(|s| s.filename != "symdiff_simul2.pcap"));
}

#[test]
fn bounded_intersection_slices_equal_the_plain_intersection() {
    let (a, b, c) = captures();
    let (x, slices) = bounded_intersection(&[a, b, c], Policy::Identity).unwrap();

    assert_eq!(slices.len(), 3);
    let mut x_bytes: Vec<&[u8]> = x.frames().iter().map(|f| f.bytes.as_slice()).collect();
    x_bytes.sort();

    for slice in &slices {
        let mut slice_bytes: Vec<&[u8]> =
            slice.frames().iter().map(|f| f.bytes.as_slice()).collect();
        slice_bytes.sort();
        assert_eq!(slice_bytes, x_bytes);
    }
}

#[test]
fn inverse_bounded_intersection_is_empty_for_all_three() {
    let (a, b, c) = captures();
    let invs = inverse_bounded_intersection(&[a, b, c], Policy::Identity).unwrap();

    assert_eq!(invs.len(), 3);
    assert!(invs.iter().all(Capture::is_empty));
}

//! The Output Assembler (component C5): serialises Derived Captures back
//! through the codec and reports a minimal summary to the external grapher
//! collaborator (spec §4.5).

use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::capture::Capture;
use crate::error::Result;
use crate::pcap::{self, RawRecord};
use crate::timestamp::Timestamp;

/// What the Output Assembler hands back to the external grapher (spec
/// §4.5: "a minimal summary `(filename, count, earliest, latest)`").
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmittedSummary {
    pub filename: String,
    pub count: usize,
    pub earliest: Option<Timestamp>,
    pub latest: Option<Timestamp>,
}

/// Serialise every capture in `captures` into `output_dir`, one pcap file
/// each, applying the `exclude-empty` policy (spec §4.4 "Empty results")
/// before any file is written.
pub fn assemble(
    output_dir: &Path,
    captures: &[Capture],
    exclude_empty: bool,
) -> Result<Vec<EmittedSummary>> {
    let mut summaries = Vec::with_capacity(captures.len());
    for capture in captures {
        if exclude_empty && capture.is_empty() {
            continue;
        }
        let path = unique_path(output_dir, &capture.name);
        let records: Vec<RawRecord> = capture
            .frames()
            .iter()
            .map(|frame| RawRecord {
                timestamp: frame.timestamp,
                original_len: frame.bytes.len() as u32,
                data: frame.bytes.clone(),
            })
            .collect();

        pcap::write_file(&path, capture.link_type, &records)?;

        let summary = capture.summary();
        summaries.push(EmittedSummary {
            filename: path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
            count: summary.count,
            earliest: summary.earliest,
            latest: summary.latest,
        });
    }
    Ok(summaries)
}

/// `<output_dir>/<name>.pcap`, or — on collision with a file already on
/// disk — `<output_dir>/<name>_<unix-nanos>.pcap` (spec §4.5: "On filename
/// collision, append a timestamp suffix to make the name unique").
fn unique_path(output_dir: &Path, name: &str) -> PathBuf {
    let candidate = output_dir.join(format!("{name}.pcap"));
    if !candidate.exists() {
        return candidate;
    }
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or(0);
    output_dir.join(format!("{name}_{nanos}.pcap"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::{Frame, Origin};
    use std::time::Duration;

    fn sample() -> Capture {
        Capture::from_frames(
            "union",
            Origin::Derived { operation: "union" },
            pcap::LINKTYPE_ETHERNET,
            vec![Frame {
                bytes: b"hi".to_vec(),
                timestamp: Timestamp(Duration::from_secs(1) + Timestamp::MIN_PLAUSIBLE.0),
            }],
        )
    }

    #[test]
    fn assembles_named_file_with_summary() {
        let dir = tempfile::tempdir().unwrap();
        let summaries = assemble(dir.path(), &[sample()], false).unwrap();
        assert_eq!(summaries.len(), 1);
        assert_eq!(summaries[0].filename, "union.pcap");
        assert_eq!(summaries[0].count, 1);
        assert!(dir.path().join("union.pcap").is_file());
    }

    #[test]
    fn exclude_empty_suppresses_empty_captures() {
        let dir = tempfile::tempdir().unwrap();
        let empty = Capture::from_frames(
            "symdiff_b",
            Origin::Derived {
                operation: "symmetric_difference",
            },
            pcap::LINKTYPE_ETHERNET,
            vec![],
        );
        let summaries = assemble(dir.path(), &[empty], true).unwrap();
        assert!(summaries.is_empty());
        assert!(!dir.path().join("symdiff_b.pcap").exists());
    }

    #[test]
    fn collision_gets_a_unique_suffix() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("union.pcap"), b"existing").unwrap();
        let summaries = assemble(dir.path(), &[sample()], false).unwrap();
        assert_ne!(summaries[0].filename, "union.pcap");
        assert!(summaries[0].filename.starts_with("union_"));
    }
}

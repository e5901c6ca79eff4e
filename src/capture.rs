//! The Capture Store (component C3): an in-memory, read-only view of one
//! parsed input, plus the lazily-built canonical-key index the Set Algebra
//! Engine queries.

use std::cell::RefCell;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::normalize::{self, Policy};
use crate::pcap::{self, ReadOptions};
use crate::timestamp::Timestamp;

/// One captured link-layer frame and its capture timestamp (spec §3).
#[derive(Debug, Clone)]
pub struct Frame {
    pub bytes: Vec<u8>,
    pub timestamp: Timestamp,
}

/// Where a Capture came from: parsed straight from an input file, or
/// produced by the Set Algebra Engine from other Captures. Tracked only for
/// diagnostics and display; it does not affect set-algebra semantics.
#[derive(Debug, Clone)]
pub enum Origin {
    Input { path: PathBuf },
    Derived { operation: &'static str },
}

/// A non-fatal condition surfaced through the diagnostic channel named in
/// spec §7 ("Warnings … are delivered to the operator through a diagnostic
/// channel but do not fail the run").
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Diagnostic {
    EmptyCapture { name: String },
}

/// The parsed contents of one input file (or one Set Algebra result),
/// holding frames in the order they were parsed (spec §3: "Frames inside
/// one Capture are stored in the order they were parsed").
#[derive(Debug, Clone)]
pub struct Capture {
    pub name: String,
    pub origin: Origin,
    pub link_type: u32,
    frames: Vec<Frame>,
    #[allow(clippy::type_complexity)]
    key_index: RefCell<HashMap<Policy, HashMap<Vec<u8>, Vec<usize>>>>,
}

/// `(count, earliest, latest)`, computed once at construction in O(1) after
/// the single sequential scan already required to build the Capture (spec
/// §4.3). `None` for an empty capture.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Summary {
    pub count: usize,
    pub earliest: Option<Timestamp>,
    pub latest: Option<Timestamp>,
}

impl Capture {
    /// Build a Capture directly from already-parsed frames, without going
    /// through the file-parsing path. Used by the Set Algebra Engine to
    /// produce Derived Captures and by tests.
    pub fn from_frames(
        name: impl Into<String>,
        origin: Origin,
        link_type: u32,
        frames: Vec<Frame>,
    ) -> Capture {
        Capture {
            name: name.into(),
            origin,
            link_type,
            frames,
            key_index: RefCell::new(HashMap::new()),
        }
    }

    /// Parse `path` as a pcap file (see [`crate::pcap`]) and build the
    /// resulting Capture, enforcing the `[2000-01-01 UTC, +∞)` timestamp
    /// bound from spec §4.3. Zero-frame files are not an error: they
    /// produce an empty Capture plus an [`Diagnostic::EmptyCapture`].
    pub fn read(path: &Path, options: ReadOptions) -> Result<(Capture, Vec<Diagnostic>)> {
        let parsed = pcap::read_file(path, options)?;
        let name = display_name(path);

        let mut frames = Vec::with_capacity(parsed.records.len());
        for record in parsed.records {
            if !record.timestamp.is_plausible() {
                return Err(Error::TimestampOutOfRange {
                    path: path.to_path_buf(),
                    timestamp_secs: record.timestamp.seconds() as i64,
                });
            }
            frames.push(Frame {
                bytes: record.data,
                timestamp: record.timestamp,
            });
        }

        let mut diagnostics = Vec::new();
        if frames.is_empty() {
            log::warn!("{name}: parsed capture contains zero frames");
            diagnostics.push(Diagnostic::EmptyCapture { name: name.clone() });
        }

        let capture = Capture::from_frames(
            name,
            Origin::Input {
                path: path.to_path_buf(),
            },
            parsed.header.link_type,
            frames,
        );

        Ok((capture, diagnostics))
    }

    pub fn frames(&self) -> &[Frame] {
        &self.frames
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn summary(&self) -> Summary {
        if self.frames.is_empty() {
            return Summary {
                count: 0,
                earliest: None,
                latest: None,
            };
        }
        let mut earliest = self.frames[0].timestamp;
        let mut latest = self.frames[0].timestamp;
        for frame in &self.frames[1..] {
            earliest = earliest.min(frame.timestamp);
            latest = latest.max(frame.timestamp);
        }
        Summary {
            count: self.frames.len(),
            earliest: Some(earliest),
            latest: Some(latest),
        }
    }

    /// Canonical key for the frame at `index` under `policy`.
    pub fn key_at(&self, index: usize, policy: Policy) -> Result<Vec<u8>> {
        normalize::canonical_key(&self.frames[index].bytes, self.link_type, policy)
    }

    /// All canonical keys for this capture under `policy`, in capture order.
    pub fn keys(&self, policy: Policy) -> Result<Vec<Vec<u8>>> {
        (0..self.frames.len())
            .map(|i| self.key_at(i, policy))
            .collect()
    }

    /// Indices of frames whose canonical key under `policy` equals `key`,
    /// via a hash index built lazily on first use and cached thereafter
    /// (spec §4.3: "lookup frame by canonical key under a given policy (O(1)
    /// average … lazily built on first request and cached per policy)").
    pub fn indices_for_key(&self, key: &[u8], policy: Policy) -> Result<Vec<usize>> {
        self.ensure_index(policy)?;
        let index = self.key_index.borrow();
        Ok(index
            .get(&policy)
            .and_then(|m| m.get(key))
            .cloned()
            .unwrap_or_default())
    }

    fn ensure_index(&self, policy: Policy) -> Result<()> {
        if self.key_index.borrow().contains_key(&policy) {
            return Ok(());
        }
        let mut by_key: HashMap<Vec<u8>, Vec<usize>> = HashMap::with_capacity(self.frames.len());
        for (i, frame) in self.frames.iter().enumerate() {
            let key = normalize::canonical_key(&frame.bytes, self.link_type, policy)?;
            by_key.entry(key).or_default().push(i);
        }
        self.key_index.borrow_mut().insert(policy, by_key);
        Ok(())
    }
}

/// Basename without extension, per spec §3 ("display name (basename without
/// extension)").
fn display_name(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string_lossy().into_owned())
}

//! Set algebra and canonicalisation over packet captures.
//!
//! This crate is the engine behind a packet-capture comparison tool: given
//! two or more captures it canonicalises frames under a declared
//! normalisation policy and computes union, intersection, difference,
//! symmetric difference, bounded intersection, or inverse bounded
//! intersection over them, writing the result back out as pcap files.
//!
//! The command-line surface, the bar-chart renderer, and the synthetic
//! example-capture generator are separate collaborators and live outside
//! this crate; see [`contract`] for the plain data types they exchange with
//! [`run`].

pub mod algebra;
pub mod assemble;
pub mod capture;
pub mod contract;
pub mod error;
pub mod normalize;
pub mod pcap;
pub mod timestamp;
pub mod toolchain;

use std::path::{Path, PathBuf};

use tempfile::TempDir;

pub use capture::Diagnostic;
pub use contract::{EngineOptions, GraphEntry, NormalizationPolicy, RequestedOperation};
pub use error::{Error, Result};

use algebra::{IntersectionReport, UnionReport};
use capture::Capture;
use normalize::Policy;
use pcap::ReadOptions;

/// Everything [`run`] needs to perform one comparison (spec §4, §6).
pub struct RunRequest {
    pub inputs: Vec<PathBuf>,
    pub operation: RequestedOperation,
    pub normalization: NormalizationPolicy,
    pub read_options: ReadOptions,
    pub engine_options: EngineOptions,
    pub output_dir: PathBuf,
}

/// Everything [`run`] hands back: the files it wrote (for the external
/// grapher), and the non-fatal diagnostics collected along the way (spec
/// §7's diagnostic channel).
pub struct RunOutcome {
    pub graph_entries: Vec<GraphEntry>,
    pub diagnostics: Vec<Diagnostic>,
    pub union_report: Option<UnionReport>,
    pub intersection_report: Option<IntersectionReport>,
}

/// Run one comparison end to end: probe the toolchain, parse every input
/// (converting non-native formats via `editcap` first), canonicalise,
/// compute the requested set-algebra operation, and write the results
/// (spec's C1 → C7 → C2 → C3 → C4 → C5 data flow).
pub fn run(request: RunRequest) -> Result<RunOutcome> {
    toolchain::probe()?;

    let policy: Policy = request.normalization.into();
    let mut diagnostics = Vec::new();
    let mut captures = Vec::with_capacity(request.inputs.len());

    for path in &request.inputs {
        let (capture, mut input_diagnostics) = read_input(path, request.read_options)?;
        diagnostics.append(&mut input_diagnostics);
        captures.push(capture);
    }

    let (outputs, union_report, intersection_report) =
        compute_outputs(&captures, request.operation, policy)?;

    for capture in &outputs {
        if capture.is_empty() {
            log::warn!("{}: derived capture is empty", capture.name);
            diagnostics.push(Diagnostic::EmptyCapture {
                name: capture.name.clone(),
            });
        }
    }

    let summaries = assemble::assemble(
        &request.output_dir,
        &outputs,
        request.engine_options.exclude_empty,
    )?;

    let graph_entries = summaries
        .into_iter()
        .map(|s| GraphEntry {
            name: s.filename,
            earliest: s.earliest,
            latest: s.latest,
        })
        .collect();

    Ok(RunOutcome {
        graph_entries,
        diagnostics,
        union_report,
        intersection_report,
    })
}

/// Dispatch one requested operation to the Set Algebra Engine and return
/// its Derived Captures plus whichever side-channel report applies,
/// separated from [`run`] so it can be exercised directly against
/// in-memory captures without the Toolchain Probe's `PATH` requirement.
///
/// For `BoundedIntersection`, the plain intersection `X` the engine
/// computes internally to derive the boundary timestamps (spec §4.4) is
/// discarded here rather than emitted: spec §8 scenario 5 is explicit that
/// `bounded_intersection(simul1, simul2, simul3)` produces exactly three
/// Derived Captures, one per input, not `X` plus three.
fn compute_outputs(
    captures: &[Capture],
    operation: RequestedOperation,
    policy: Policy,
) -> Result<(Vec<Capture>, Option<UnionReport>, Option<IntersectionReport>)> {
    match operation {
        RequestedOperation::Union => {
            let (capture, report) = algebra::union(captures, policy)?;
            Ok((vec![capture], Some(report), None))
        }
        RequestedOperation::Intersection => {
            let (capture, report) = algebra::intersection(captures, policy)?;
            Ok((vec![capture], None, Some(report)))
        }
        RequestedOperation::Difference => {
            Ok((vec![algebra::difference(captures, policy)?], None, None))
        }
        RequestedOperation::SymmetricDifference => {
            Ok((algebra::symmetric_difference(captures, policy)?, None, None))
        }
        RequestedOperation::BoundedIntersection => {
            let (_x, slices) = algebra::bounded_intersection(captures, policy)?;
            Ok((slices, None, None))
        }
        RequestedOperation::InverseBoundedIntersection => {
            Ok((algebra::inverse_bounded_intersection(captures, policy)?, None, None))
        }
    }
}

/// Parse one input, converting it first via the Toolchain Probe if its
/// extension isn't native libpcap (spec §6). The conversion's scratch
/// directory is dropped, and thus removed, before this function returns.
fn read_input(path: &Path, options: ReadOptions) -> Result<(Capture, Vec<Diagnostic>)> {
    if toolchain::needs_conversion(path) {
        let (_scratch, converted): (TempDir, PathBuf) = toolchain::convert_to_pcap(path)?;
        let (capture, diagnostics) = Capture::read(&converted, options)?;
        // Re-tag the display name after the converted temp path is used for
        // parsing; the operator still wants to see the original file's name.
        Ok((rename(capture, path), diagnostics))
    } else {
        Capture::read(path, options)
    }
}

fn rename(capture: Capture, original_path: &Path) -> Capture {
    let name = original_path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| original_path.to_string_lossy().into_owned());
    Capture::from_frames(name, capture.origin.clone(), capture.link_type, capture.frames().to_vec())
}

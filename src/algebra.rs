//! The Set Algebra Engine (component C4): multiset operations across
//! captures using canonical keys, preserving timestamp provenance. This is
//! the most load-bearing component of the crate (spec §2 estimates 45% of
//! the implementation here).

use std::collections::{HashMap, HashSet};

use crate::capture::{Capture, Frame, Origin};
use crate::error::{Error, Result};
use crate::normalize::Policy;
use crate::pcap::{LINKTYPE_ETHERNET, LINKTYPE_RAW};

/// Ethertypes unconditionally excluded from Intersection (spec §4.4): ARP,
/// LACP, LLDP. Ambient broadcast protocols whose frames repeat verbatim and
/// would otherwise swamp the result. Not excluded from Union or Difference
/// — the specification preserves this asymmetry as observed (§9).
const EXCLUDED_ETHERTYPES: [u16; 3] = [0x0806, 0x8809, 0x88CC];

/// Top N most common multi-occurrence keys reported alongside Union, for
/// operator diagnostics only; it never affects the emitted Union capture.
const UNION_REPORT_SIZE: usize = 10;

/// Side-channel report returned alongside a Union result.
#[derive(Debug, Clone)]
pub struct UnionReport {
    /// `(key, total occurrences across every input)`, the ten most frequent
    /// keys that occur more than once, most frequent first.
    pub most_common: Vec<(Vec<u8>, usize)>,
}

/// Side-channel report returned alongside an Intersection result.
#[derive(Debug, Clone)]
pub struct IntersectionReport {
    /// `(input display name, |X| / |Iᵢ| as a percentage)`.
    pub coverage_percent: Vec<(String, f64)>,
}

fn require_min_inputs(operation: &'static str, inputs: &[Capture]) -> Result<()> {
    if inputs.len() < 2 {
        return Err(Error::InsufficientInputs {
            operation,
            minimum: 2,
            got: inputs.len(),
        });
    }
    Ok(())
}

fn output_link_type(inputs: &[Capture], policy: Policy) -> u32 {
    if policy.strips_link_layer() {
        LINKTYPE_RAW
    } else {
        inputs[0].link_type
    }
}

/// Emitted bytes for a surviving key: the normalised bytes when the policy
/// strips headers (spec §4.4), otherwise the frame's original raw bytes.
fn emit_bytes(capture: &Capture, index: usize, key: &[u8], policy: Policy) -> Vec<u8> {
    if policy.strips_link_layer() {
        key.to_vec()
    } else {
        capture.frames()[index].bytes.clone()
    }
}

fn ethertype(capture: &Capture, index: usize) -> Option<u16> {
    if capture.link_type != LINKTYPE_ETHERNET {
        return None;
    }
    let bytes = &capture.frames()[index].bytes;
    if bytes.len() < 14 {
        return None;
    }
    Some(u16::from_be_bytes([bytes[12], bytes[13]]))
}

fn is_excluded(capture: &Capture, index: usize) -> bool {
    ethertype(capture, index)
        .map(|et| EXCLUDED_ETHERTYPES.contains(&et))
        .unwrap_or(false)
}

/// `U = K₁ ∪ K₂ ∪ … ∪ Kₙ`, set semantics (spec §4.4). Requires `n ≥ 2`.
pub fn union(inputs: &[Capture], policy: Policy) -> Result<(Capture, UnionReport)> {
    require_min_inputs("union", inputs)?;

    let mut seen: HashSet<Vec<u8>> = HashSet::new();
    let mut frequency: HashMap<Vec<u8>, usize> = HashMap::new();
    let mut frames = Vec::new();

    for capture in inputs {
        let keys = capture.keys(policy)?;
        for (i, key) in keys.iter().enumerate() {
            *frequency.entry(key.clone()).or_insert(0) += 1;
            if seen.insert(key.clone()) {
                frames.push(Frame {
                    bytes: emit_bytes(capture, i, key, policy),
                    timestamp: capture.frames()[i].timestamp,
                });
            }
        }
    }

    let mut repeated: Vec<(Vec<u8>, usize)> =
        frequency.into_iter().filter(|(_, n)| *n > 1).collect();
    repeated.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    repeated.truncate(UNION_REPORT_SIZE);

    let capture = Capture::from_frames(
        "union",
        Origin::Derived { operation: "union" },
        output_link_type(inputs, policy),
        frames,
    );
    Ok((
        capture,
        UnionReport {
            most_common: repeated,
        },
    ))
}

/// `X = K₁ ∩ K₂ ∩ … ∩ Kₙ`, with ARP/LACP/LLDP excluded (spec §4.4). Requires
/// `n ≥ 2`.
pub fn intersection(inputs: &[Capture], policy: Policy) -> Result<(Capture, IntersectionReport)> {
    require_min_inputs("intersection", inputs)?;

    // For each input, the set of keys eligible to participate (i.e. not
    // carried by an excluded Ethertype), built from the first occurrence of
    // each key so excluded-frame detection only needs one representative.
    let mut eligible_sets: Vec<HashSet<Vec<u8>>> = Vec::with_capacity(inputs.len());
    for capture in inputs {
        let keys = capture.keys(policy)?;
        let mut set = HashSet::new();
        for (i, key) in keys.iter().enumerate() {
            if !is_excluded(capture, i) {
                set.insert(key.clone());
            }
        }
        eligible_sets.push(set);
    }

    let mut common: HashSet<Vec<u8>> = eligible_sets[0].clone();
    for set in &eligible_sets[1..] {
        common.retain(|k| set.contains(k));
    }

    // Preserve deterministic output order: the order keys first appear in
    // I₁, since every surviving key is present in I₁ by definition.
    let first = &inputs[0];
    let first_keys = first.keys(policy)?;
    let mut seen = HashSet::new();
    let mut frames = Vec::new();
    for (i, key) in first_keys.iter().enumerate() {
        if common.contains(key) && seen.insert(key.clone()) {
            frames.push(Frame {
                bytes: emit_bytes(first, i, key, policy),
                timestamp: first.frames()[i].timestamp,
            });
        }
    }

    let x_len = frames.len();
    let coverage_percent = inputs
        .iter()
        .map(|cap| {
            let pct = if cap.len() == 0 {
                0.0
            } else {
                100.0 * x_len as f64 / cap.len() as f64
            };
            (cap.name.clone(), pct)
        })
        .collect();

    let capture = Capture::from_frames(
        "intersect",
        Origin::Derived {
            operation: "intersect",
        },
        output_link_type(inputs, policy),
        frames,
    );
    Ok((capture, IntersectionReport { coverage_percent }))
}

/// `D = K₁ \ (K₂ ∪ … ∪ Kₙ)`. `I₁` is the minuend. Requires `n ≥ 2`.
pub fn difference(inputs: &[Capture], policy: Policy) -> Result<Capture> {
    require_min_inputs("difference", inputs)?;
    difference_by_index(inputs, 0, policy, "diff")
}

fn difference_by_index(
    inputs: &[Capture],
    minuend_index: usize,
    policy: Policy,
    name_prefix: &str,
) -> Result<Capture> {
    let mut subtrahend: HashSet<Vec<u8>> = HashSet::new();
    for (i, capture) in inputs.iter().enumerate() {
        if i == minuend_index {
            continue;
        }
        for key in capture.keys(policy)? {
            subtrahend.insert(key);
        }
    }

    let minuend = &inputs[minuend_index];
    let keys = minuend.keys(policy)?;
    let mut seen = HashSet::new();
    let mut frames = Vec::new();
    for (i, key) in keys.iter().enumerate() {
        if !subtrahend.contains(key) && seen.insert(key.clone()) {
            frames.push(Frame {
                bytes: emit_bytes(minuend, i, key, policy),
                timestamp: minuend.frames()[i].timestamp,
            });
        }
    }

    let name = format!("{name_prefix}_{}", minuend.name);
    Ok(Capture::from_frames(
        name,
        Origin::Derived {
            operation: "difference",
        },
        output_link_type(inputs, policy),
        frames,
    ))
}

/// For each `i`, `Sᵢ = Kᵢ \ ⋃_{j≠i} Kⱼ`, i.e. `n` applications of
/// [`difference`] with rotating minuend (spec §4.4). Requires `n ≥ 2`.
pub fn symmetric_difference(inputs: &[Capture], policy: Policy) -> Result<Vec<Capture>> {
    require_min_inputs("symmetric_difference", inputs)?;
    (0..inputs.len())
        .map(|i| difference_by_index(inputs, i, policy, "symdiff"))
        .collect()
}

/// Boundary timestamps of the plain intersection `X`, and which key
/// realises each boundary (spec §4.4: "ties on timestamp are broken by the
/// input ordering" — since every key in `X` is represented in `X` by its
/// `I₁` frame, the tie-break is simply first-occurrence-in-`X` order).
struct Bounds {
    min_key: Vec<u8>,
    max_key: Vec<u8>,
}

fn bounds_of(x: &Capture) -> Option<Bounds> {
    if x.is_empty() {
        return None;
    }
    let frames = x.frames();
    let mut min_idx = 0;
    let mut max_idx = 0;
    for (i, frame) in frames.iter().enumerate() {
        if frame.timestamp < frames[min_idx].timestamp {
            min_idx = i;
        }
        if frame.timestamp > frames[max_idx].timestamp {
            max_idx = i;
        }
    }
    Some(Bounds {
        min_key: x.key_at(min_idx, Policy::Identity).unwrap_or_default(),
        max_key: x.key_at(max_idx, Policy::Identity).unwrap_or_default(),
    })
}

/// Locate the first frame (forward scan) in `capture` whose canonical key
/// equals `key`, via the Capture Store's own cached key→indices lookup
/// (spec §4.3) rather than re-scanning every key by hand.
fn find_first(capture: &Capture, key: &[u8], policy: Policy) -> Result<Option<usize>> {
    Ok(capture.indices_for_key(key, policy)?.first().copied())
}

/// Locate the last frame (reverse scan) in `capture` whose canonical key
/// equals `key`, via the same cached lookup as [`find_first`].
fn find_last(capture: &Capture, key: &[u8], policy: Policy) -> Result<Option<usize>> {
    Ok(capture.indices_for_key(key, policy)?.last().copied())
}

/// The plain intersection `X`, plus for each input the contiguous slice
/// `Bᵢ = Iᵢ[first..=last]` bounded by `X`'s earliest/latest timestamps
/// (spec §4.4 "Bounded intersection"). Requires `n ≥ 2`. Fails with
/// `EmptyIntersection` if `X` is empty, or `BoundaryNotFound` if some input
/// does not contain one of the boundary keys.
pub fn bounded_intersection(inputs: &[Capture], policy: Policy) -> Result<(Capture, Vec<Capture>)> {
    require_min_inputs("bounded_intersection", inputs)?;
    let (x, _report) = intersection(inputs, policy)?;

    // X's stored bytes are already `emit_bytes` under `policy` (raw bytes
    // for Identity, canonical bytes otherwise), so keying them under
    // Identity yields exactly the policy-canonical key for each boundary
    // frame — the same value `find_first`/`find_last` below look up via
    // each input's own cached `indices_for_key(_, policy)` index.
    let Some(bounds) = bounds_of(&x) else {
        return Err(Error::EmptyIntersection);
    };
    let (min_key, max_key) = (bounds.min_key, bounds.max_key);

    let mut slices = Vec::with_capacity(inputs.len());
    for capture in inputs {
        let first = find_first(capture, &min_key, policy)?
            .ok_or_else(|| Error::BoundaryNotFound {
                input: capture.name.clone(),
            })?;
        let last = find_last(capture, &max_key, policy)?
            .ok_or_else(|| Error::BoundaryNotFound {
                input: capture.name.clone(),
            })?;
        let (lo, hi) = if first <= last {
            (first, last)
        } else {
            (last, first)
        };

        let keys = capture.keys(policy)?;
        let frames: Vec<Frame> = (lo..=hi)
            .map(|i| Frame {
                bytes: emit_bytes(capture, i, &keys[i], policy),
                timestamp: capture.frames()[i].timestamp,
            })
            .collect();

        let name = format!("bounded_intersect-{}", capture.name);
        slices.push(Capture::from_frames(
            name,
            Origin::Derived {
                operation: "bounded_intersection",
            },
            output_link_type(inputs, policy),
            frames,
        ));
    }

    Ok((x, slices))
}

/// For each `Bᵢ` from [`bounded_intersection`], `Bᵢ \ X` (spec §4.4
/// "Inverse bounded intersection"). Requires `n ≥ 2`.
pub fn inverse_bounded_intersection(inputs: &[Capture], policy: Policy) -> Result<Vec<Capture>> {
    let (x, bounded) = bounded_intersection(inputs, policy)?;
    let x_keys: HashSet<Vec<u8>> = x.keys(policy)?.into_iter().collect();

    bounded
        .into_iter()
        .map(|bi| {
            let keys = bi.keys(policy)?;
            let mut seen = HashSet::new();
            let mut frames = Vec::new();
            for (i, key) in keys.iter().enumerate() {
                if !x_keys.contains(key) && seen.insert(key.clone()) {
                    frames.push(Frame {
                        bytes: emit_bytes(&bi, i, key, policy),
                        timestamp: bi.frames()[i].timestamp,
                    });
                }
            }
            let name = format!("inv_bounded_intersect-{}", input_suffix(&bi.name));
            Ok(Capture::from_frames(
                name,
                Origin::Derived {
                    operation: "inverse_bounded_intersection",
                },
                bi.link_type,
                frames,
            ))
        })
        .collect()
}

fn input_suffix(bounded_name: &str) -> &str {
    bounded_name
        .strip_prefix("bounded_intersect-")
        .unwrap_or(bounded_name)
}

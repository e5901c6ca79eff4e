//! Plain data types for the collaborator contracts named in spec §6. The
//! CLI parser, bar-chart renderer, and example-capture generator are all
//! out of scope for this crate (spec §1); these types are the shapes a
//! caller implementing them constructs and consumes.

use crate::normalize::Policy;
use crate::timestamp::Timestamp;

/// The normalisation policy as the CLI parser would naturally express it
/// (spec §4.2's "three mutually compatible flags"), convertible to the
/// engine's canonical three-state [`Policy`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NormalizationPolicy {
    pub strip_l2: bool,
    pub strip_l3: bool,
}

impl From<NormalizationPolicy> for Policy {
    fn from(value: NormalizationPolicy) -> Self {
        if value.strip_l3 {
            Policy::StripL3
        } else if value.strip_l2 {
            Policy::StripL2
        } else {
            Policy::Identity
        }
    }
}

/// The operations the CLI parser may request (spec §4.4), one value per
/// operator the Set Algebra Engine understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequestedOperation {
    Union,
    Intersection,
    Difference,
    SymmetricDifference,
    BoundedIntersection,
    InverseBoundedIntersection,
}

/// Whether empty Derived Captures are suppressed from the output list
/// (spec §4.4 "Empty results").
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EngineOptions {
    pub exclude_empty: bool,
}

/// What the external grapher collaborator consumes: "a list of (display
/// name, earliest, latest) tuples; it never sees frame bytes" (spec §6).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GraphEntry {
    pub name: String,
    pub earliest: Option<Timestamp>,
    pub latest: Option<Timestamp>,
}

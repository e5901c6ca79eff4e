use std::fmt;
use std::time::Duration;

/// A capture timestamp: seconds and a sub-second counter since the Unix
/// epoch, stored as a [`Duration`] so microsecond- and nanosecond-resolution
/// sources (see spec §9) compare and order the same way regardless of which
/// resolution produced them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Timestamp(pub Duration);

impl Timestamp {
    pub const EPOCH: Timestamp = Timestamp(Duration::ZERO);

    /// The threshold below which a capture timestamp is nonsensical
    /// (spec §4.3: "`[2000-01-01 UTC, +∞)`").
    ///
    /// 2000-01-01T00:00:00Z is 946_684_800 seconds after the Unix epoch.
    pub const MIN_PLAUSIBLE: Timestamp = Timestamp(Duration::from_secs(946_684_800));

    pub fn from_secs_subsec(seconds: u32, subsec: u32, resolution: Resolution) -> Timestamp {
        let nanos = match resolution {
            Resolution::Micros => subsec.saturating_mul(1_000),
            Resolution::Nanos => subsec,
        };
        Timestamp(Duration::new(seconds as u64, nanos))
    }

    pub fn seconds(&self) -> u64 {
        self.0.as_secs()
    }

    /// Sub-second part expressed in the given resolution, truncating any
    /// finer-grained component (micros discards sub-microsecond nanos).
    pub fn subsec(&self, resolution: Resolution) -> u32 {
        match resolution {
            Resolution::Micros => self.0.subsec_micros(),
            Resolution::Nanos => self.0.subsec_nanos(),
        }
    }

    pub fn is_plausible(&self) -> bool {
        *self >= Self::MIN_PLAUSIBLE
    }
}

impl From<Duration> for Timestamp {
    fn from(d: Duration) -> Self {
        Timestamp(d)
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:06}", self.0.as_secs(), self.0.subsec_micros())
    }
}

/// Sub-second resolution of a capture's timestamps, determined per-file by
/// the global header magic (µs magic `d4 c3 b2 a1` / `a1 b2 c3 d4`, ns magic
/// `4d 3c b2 a1`, see spec §9).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    Micros,
    Nanos,
}

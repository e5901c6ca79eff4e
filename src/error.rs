use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// The error kinds a caller of this crate needs to distinguish.
///
/// Every public, fallible entry point returns `Result<T>` with this as its
/// error type. Exit-code mapping lives on [`Error::exit_code`] so a CLI
/// collaborator does not need to duplicate the table from the
/// specification.
#[derive(Error, Debug)]
pub enum Error {
    #[error("required external tool {tool:?} was not found on PATH")]
    MissingToolchain { tool: &'static str },

    #[error("{path:?} is not in a supported capture format")]
    UnsupportedFormat { path: PathBuf },

    #[error("{path:?}: unrecognised pcap magic number {magic:02x?}")]
    BadMagic { path: PathBuf, magic: [u8; 4] },

    #[error("{path:?}: record at offset {offset} claims {claimed} bytes but only {available} remain")]
    TruncatedRecord {
        path: PathBuf,
        offset: u64,
        claimed: u32,
        available: u64,
    },

    #[error("link-layer type {link_type} is not supported by the requested normalisation policy")]
    UnsupportedLinkType { link_type: u32 },

    #[error("frame has unsupported IP version nibble {nibble:#x}, expected 4 or 6")]
    UnsupportedIpVersion { nibble: u8 },

    #[error("{path:?}: capture timestamp {timestamp_secs} is before 2000-01-01 UTC")]
    TimestampOutOfRange { path: PathBuf, timestamp_secs: i64 },

    #[error("bounded intersection is empty: no frame is common to every input")]
    EmptyIntersection,

    #[error("{input:?} does not contain the intersection boundary frame")]
    BoundaryNotFound { input: String },

    #[error("{operation} requires at least {minimum} inputs, got {got}")]
    InsufficientInputs {
        operation: &'static str,
        minimum: usize,
        got: usize,
    },

    #[error("filesystem error on {path:?}: {source}")]
    FilesystemError { path: PathBuf, source: io::Error },

    #[error("internal invariant violated: {0}")]
    InternalInvariant(String),
}

impl Error {
    /// Process exit code per the specification's external contract (§6).
    pub fn exit_code(&self) -> u8 {
        match self {
            Error::InsufficientInputs { .. } => 2,
            Error::MissingToolchain { .. } => 3,
            Error::UnsupportedFormat { .. }
            | Error::BadMagic { .. }
            | Error::TruncatedRecord { .. }
            | Error::UnsupportedLinkType { .. }
            | Error::UnsupportedIpVersion { .. }
            | Error::TimestampOutOfRange { .. }
            | Error::FilesystemError { .. } => 4,
            Error::EmptyIntersection
            | Error::BoundaryNotFound { .. }
            | Error::InternalInvariant(_) => 5,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

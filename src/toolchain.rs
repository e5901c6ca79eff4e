//! The Toolchain Probe (component C7): locates the external utilities this
//! crate shells out to, and performs the `editcap`-based format conversion
//! for non-native inputs (spec §6).

use std::env;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::process::Command;

use anyhow::Context;
use tempfile::TempDir;

use crate::error::{Error, Result};

/// Every external tool the core assumes is on `PATH` (spec §6). `capinfos`
/// and `tshark` are consumed by the out-of-scope grapher collaborator, not
/// by this crate directly, but spec §6 requires their absence be detected
/// here too: "Their absence is detected on startup; missing tools fail with
/// `MissingToolchain` and no input is parsed."
pub const REQUIRED_TOOLS: [&str; 3] = ["editcap", "capinfos", "tshark"];

/// Extensions that must be converted to `.pcap` via `editcap` before this
/// crate's codec can read them (spec §6). `.pcapng` is deliberately absent:
/// the codec's own minimal pcapng reader (`crate::pcap::parse_pcapng`)
/// handles it directly, so the `editcap` round trip is reserved for formats
/// this crate cannot parse natively.
pub const CONVERTIBLE_EXTENSIONS: [&str; 12] = [
    "cap", "dmp", "5vw", "TRC0", "TRC1", "enc", "trc", "fdc", "syc", "bfr", "tr1", "snoop",
];

/// Confirm every tool in [`REQUIRED_TOOLS`] is resolvable on `PATH`. Must be
/// called, and must succeed, before any input file is parsed.
pub fn probe() -> Result<()> {
    for tool in REQUIRED_TOOLS {
        if find_on_path(tool).is_none() {
            log::warn!("required tool {tool:?} was not found on PATH");
            return Err(Error::MissingToolchain { tool });
        }
    }
    Ok(())
}

fn find_on_path(name: &str) -> Option<PathBuf> {
    let path_var = env::var_os("PATH")?;
    env::split_paths(&path_var).find_map(|dir| {
        let candidate = dir.join(name);
        candidate.is_file().then_some(candidate)
    })
}

/// Does `path`'s extension require conversion via `editcap` before it can
/// be parsed as libpcap (spec §6)?
pub fn needs_conversion(path: &Path) -> bool {
    let Some(ext) = path.extension().and_then(OsStr::to_str) else {
        return false;
    };
    ext != "pcap" && CONVERTIBLE_EXTENSIONS.iter().any(|c| c.eq_ignore_ascii_case(ext))
}

/// Convert `input` to libpcap format via `editcap -F pcap <input>
/// <tempfile>`, in a scoped temporary directory released on every exit path
/// (spec §5). The returned [`TempDir`] must be kept alive until the
/// converted file has been read; dropping it removes the directory.
pub fn convert_to_pcap(input: &Path) -> Result<(TempDir, PathBuf)> {
    let scratch = TempDir::new().map_err(|source| Error::FilesystemError {
        path: input.to_path_buf(),
        source,
    })?;
    let output = scratch.path().join("converted.pcap");

    run_editcap(input, &output)
        .map_err(|_| Error::UnsupportedFormat {
            path: input.to_path_buf(),
        })?;

    if !output.is_file() {
        return Err(Error::UnsupportedFormat {
            path: input.to_path_buf(),
        });
    }

    Ok((scratch, output))
}

fn run_editcap(input: &Path, output: &Path) -> anyhow::Result<()> {
    let status = Command::new("editcap")
        .arg("-F")
        .arg("pcap")
        .arg(input)
        .arg(output)
        .status()
        .with_context(|| format!("failed to launch editcap for {}", input.display()))?;

    if !status.success() {
        anyhow::bail!("editcap exited with {status} while converting {}", input.display());
    }
    Ok(())
}

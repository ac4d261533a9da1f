//! # Scan Target Model
//!
//! Defines the inputs of a scan run.
//!
//! A target is whatever the port-scan binary accepts on its command line:
//! * A single IP address (host).
//! * A CIDR block (e.g., `10.0.0.0/24`).
//! * A domain name.
//!
//! Targets are read once from a line-delimited file at startup and stay
//! immutable for the rest of the run; each one is consumed by exactly one
//! worker.

use std::fmt;
use std::fs;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ScanError;

/// A single host, CIDR, or domain entry from the input list.
///
/// No validation beyond non-empty: the wrapped binaries are the authority on
/// what they accept, and rejecting here would just desynchronize us from them.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Target(String);

impl Target {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Filesystem-safe name for the per-target directory and result file.
    ///
    /// CIDR and host:port notation carry `/` and `:`, both illegal or
    /// ambiguous in file names.
    pub fn slug(&self) -> String {
        self.0.replace(['/', ':'], "_")
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Target {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err("empty target".to_string());
        }
        Ok(Target(trimmed.to_string()))
    }
}

/// Reads the line-delimited target file.
///
/// Blank lines and `#` comments are skipped. A file that is unreadable or
/// yields zero targets is `InvalidTargetFile`, fatal before any scanning.
pub fn load_targets(path: &Path) -> Result<Vec<Target>, ScanError> {
    let content = fs::read_to_string(path).map_err(|e| ScanError::InvalidTargetFile {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;

    let targets: Vec<Target> = content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(|line| Target(line.to_string()))
        .collect();

    if targets.is_empty() {
        return Err(ScanError::InvalidTargetFile {
            path: path.to_path_buf(),
            reason: "no usable targets".to_string(),
        });
    }

    tracing::debug!(count = targets.len(), path = %path.display(), "target file loaded");
    Ok(targets)
}

// ╔════════════════════════════════════════════╗
// ║ ████████╗███████╗███████╗████████╗███████╗ ║
// ║ ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝██╔════╝ ║
// ║    ██║   █████╗  ███████╗   ██║   ███████╗ ║
// ║    ██║   ██╔══╝  ╚════██║   ██║   ╚════██║ ║
// ║    ██║   ███████╗███████║   ██║   ███████║ ║
// ║    ╚═╝   ╚══════╝╚══════╝   ╚═╝   ╚══════╝ ║
// ╚════════════════════════════════════════════╝

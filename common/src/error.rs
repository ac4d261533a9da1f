use std::path::PathBuf;
use thiserror::Error;

/// Errors produced while orchestrating a scan run.
///
/// `MissingExecutable` and `InvalidTargetFile` are fatal at startup, before
/// any stage is launched. The stage-level kinds are folded into the owning
/// target's record and never abort the run.
#[derive(Error, Debug)]
pub enum ScanError {
    #[error("executable '{name}' not found (searched {searched})")]
    MissingExecutable { name: String, searched: String },
    #[error("invalid target file '{path}': {reason}")]
    InvalidTargetFile { path: PathBuf, reason: String },
    #[error("stage '{stage}' timed out after {secs}s")]
    StageTimeout { stage: &'static str, secs: u64 },
    #[error("stage '{stage}' exited with {code}: {stderr}")]
    StageNonZeroExit {
        stage: &'static str,
        code: i32,
        stderr: String,
    },
    #[error("failed to write '{path}': {source}")]
    OutputWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("run interrupted")]
    Interrupted,
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ScanError>;

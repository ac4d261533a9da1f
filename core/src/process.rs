//! # Process Runner
//!
//! The single place where external processes are spawned.
//!
//! Every stage hands a [`CommandSpec`] to [`run`], which launches the
//! executable, streams its output into capture files, and enforces the stage
//! timeout. A child is never left behind: timeout and shutdown both kill it
//! and reap the exit status before returning.

use std::env;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tokio::process::Command;
use tokio::sync::watch;
use tracing::{debug, warn};

use redseam_common::error::ScanError;

/// A fully resolved external invocation.
#[derive(Clone, Debug)]
pub struct CommandSpec {
    /// Stage label, used for capture file names and error reporting.
    pub stage: &'static str,
    /// Resolved path to the executable (see [`resolve_executable`]).
    pub program: PathBuf,
    pub args: Vec<String>,
    /// Working directory for the child; capture files land here too.
    pub cwd: PathBuf,
    pub timeout: Duration,
}

/// Outcome of one external invocation.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StageResult {
    /// `None` when the child was killed (timeout) or died to a signal.
    pub exit_code: Option<i32>,
    pub stdout_path: PathBuf,
    pub stderr_path: PathBuf,
    pub duration: Duration,
    pub timed_out: bool,
}

impl StageResult {
    pub fn success(&self) -> bool {
        !self.timed_out && self.exit_code == Some(0)
    }

    /// Tail of the captured stderr, for folding into error messages.
    pub fn stderr_excerpt(&self) -> String {
        let content = std::fs::read_to_string(&self.stderr_path).unwrap_or_default();
        let tail: Vec<&str> = content.lines().rev().take(5).collect();
        tail.into_iter().rev().collect::<Vec<_>>().join(" | ")
    }
}

/// Locates `name` before anything is spawned.
///
/// Names containing a path separator are checked as given; bare names walk
/// `$PATH`. Missing executables surface as the distinct
/// [`ScanError::MissingExecutable`] kind so startup preflight can abort
/// before any scanning.
pub fn resolve_executable(name: &str) -> Result<PathBuf, ScanError> {
    let candidate = Path::new(name);
    if candidate.components().count() > 1 {
        if is_executable(candidate) {
            return Ok(candidate.to_path_buf());
        }
        return Err(ScanError::MissingExecutable {
            name: name.to_string(),
            searched: candidate.display().to_string(),
        });
    }

    if let Some(paths) = env::var_os("PATH") {
        for dir in env::split_paths(&paths) {
            let full = dir.join(name);
            if is_executable(&full) {
                return Ok(full);
            }
        }
    }

    Err(ScanError::MissingExecutable {
        name: name.to_string(),
        searched: "$PATH".to_string(),
    })
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    path.metadata()
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}

/// Launches the command and waits up to its timeout.
///
/// Stdout and stderr are redirected straight into `<stage>.stdout` /
/// `<stage>.stderr` under the working directory. On timeout the child is
/// killed and reaped, and the result carries `timed_out = true`. A shutdown
/// signal kills the child the same way and returns [`ScanError::Interrupted`].
pub async fn run(
    spec: &CommandSpec,
    mut shutdown: watch::Receiver<bool>,
) -> Result<StageResult, ScanError> {
    let stdout_path = spec.cwd.join(format!("{}.stdout", spec.stage));
    let stderr_path = spec.cwd.join(format!("{}.stderr", spec.stage));

    let stdout_file = std::fs::File::create(&stdout_path).map_err(|e| ScanError::OutputWrite {
        path: stdout_path.clone(),
        source: e,
    })?;
    let stderr_file = std::fs::File::create(&stderr_path).map_err(|e| ScanError::OutputWrite {
        path: stderr_path.clone(),
        source: e,
    })?;

    debug!(
        stage = spec.stage,
        program = %spec.program.display(),
        args = ?spec.args,
        "spawning"
    );

    let start: Instant = Instant::now();
    let mut child = Command::new(&spec.program)
        .args(&spec.args)
        .current_dir(&spec.cwd)
        .stdin(Stdio::null())
        .stdout(Stdio::from(stdout_file))
        .stderr(Stdio::from(stderr_file))
        .kill_on_drop(true)
        .spawn()?;

    let (exit_code, timed_out) = tokio::select! {
        status = child.wait() => (status?.code(), false),
        _ = tokio::time::sleep(spec.timeout) => {
            kill_and_reap(&mut child, spec.stage).await;
            (None, true)
        }
        _ = wait_for_stop(&mut shutdown) => {
            kill_and_reap(&mut child, spec.stage).await;
            return Err(ScanError::Interrupted);
        }
    };

    Ok(StageResult {
        exit_code,
        stdout_path,
        stderr_path,
        duration: start.elapsed(),
        timed_out,
    })
}

/// Resolves only when a stop has actually been signalled. A sender that goes
/// away without signalling must not look like a shutdown.
async fn wait_for_stop(rx: &mut watch::Receiver<bool>) {
    if rx.wait_for(|stop| *stop).await.is_err() {
        std::future::pending::<()>().await;
    }
}

/// Kills the child and waits for the exit status so the process table entry
/// is released before the runner returns.
async fn kill_and_reap(child: &mut tokio::process::Child, stage: &str) {
    if let Err(e) = child.kill().await {
        warn!(stage, "failed to kill child process: {e}");
    }
    let _ = child.wait().await;
}

// ╔════════════════════════════════════════════╗
// ║ ████████╗███████╗███████╗████████╗███████╗ ║
// ║ ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝██╔════╝ ║
// ║    ██║   █████╗  ███████╗   ██║   ███████╗ ║
// ║    ██║   ██╔══╝  ╚════██║   ██║   ╚════██║ ║
// ║    ██║   ███████╗███████║   ██║   ███████║ ║
// ║    ╚═╝   ╚══════╝╚══════╝   ╚═╝   ╚══════╝ ║
// ╚════════════════════════════════════════════╝

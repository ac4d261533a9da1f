//! # Result Records & Aggregation
//!
//! Serde shapes for everything the run writes to disk, plus the
//! [`Aggregator`] that owns the output directory: one JSON record per target
//! written incrementally, one timestamped summary report per run.

use std::collections::BTreeSet;
use std::fs;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use redseam_common::error::ScanError;
use redseam_common::target::Target;

use crate::process::StageResult;
use crate::stage::PortHit;
use crate::stats::StatsSnapshot;

/// Lifecycle of one target through the pipeline.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetState {
    Pending,
    PortScan,
    Crawl,
    VulnScan,
    Done,
    Failed,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    /// The pipeline never reached this stage.
    NotRun,
    /// Deliberately not invoked (empty input pass-through).
    Skipped,
    Completed,
    Failed,
    TimedOut,
}

/// Outcome of one stage within a target's record.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StageReport {
    pub status: StageStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<StageResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl StageReport {
    pub fn not_run() -> Self {
        Self {
            status: StageStatus::NotRun,
            result: None,
            error: None,
        }
    }

    pub fn skipped() -> Self {
        Self {
            status: StageStatus::Skipped,
            result: None,
            error: None,
        }
    }

    pub fn completed(result: StageResult) -> Self {
        Self {
            status: StageStatus::Completed,
            result: Some(result),
            error: None,
        }
    }

    pub fn failed(result: Option<StageResult>, error: String) -> Self {
        Self {
            status: StageStatus::Failed,
            result,
            error: Some(error),
        }
    }

    pub fn timed_out(result: StageResult, error: String) -> Self {
        Self {
            status: StageStatus::TimedOut,
            result: Some(result),
            error: Some(error),
        }
    }

    pub fn is_empty_not_failed(&self) -> bool {
        matches!(self.status, StageStatus::NotRun | StageStatus::Skipped)
    }
}

/// Everything learned about one target. Built by the sequencer, owned by a
/// single worker, serialized by the aggregator.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TargetRecord {
    pub target: Target,
    pub state: TargetState,
    pub started_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    pub port_scan: StageReport,
    pub crawl: StageReport,
    pub vuln_scan: StageReport,
    pub open_ports: BTreeSet<PortHit>,
    pub urls: BTreeSet<String>,
    /// Opaque pass-through from the vulnerability scanner.
    pub findings: Vec<Value>,
    pub errors: Vec<String>,
}

impl TargetRecord {
    pub fn new(target: Target) -> Self {
        Self {
            target,
            state: TargetState::Pending,
            started_at: Utc::now(),
            finished_at: None,
            port_scan: StageReport::not_run(),
            crawl: StageReport::not_run(),
            vuln_scan: StageReport::not_run(),
            open_ports: BTreeSet::new(),
            urls: BTreeSet::new(),
            findings: Vec::new(),
            errors: Vec::new(),
        }
    }

    pub fn finish(&mut self, state: TargetState) {
        self.state = state;
        self.finished_at = Some(Utc::now());
    }
}

/// Top-level summary, one per invocation.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ScanReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub target_count: usize,
    pub stats: StatsSnapshot,
    pub records: Vec<TargetRecord>,
}

/// Owns the output directory and the write discipline.
///
/// Per-target files from earlier runs are never clobbered unless the run was
/// started with overwrite; summary file names carry a timestamp and cannot
/// collide.
pub struct Aggregator {
    output_dir: PathBuf,
    overwrite: bool,
}

impl Aggregator {
    pub fn new(output_dir: PathBuf, overwrite: bool) -> Self {
        Self {
            output_dir,
            overwrite,
        }
    }

    pub fn record_path(&self, record: &TargetRecord) -> PathBuf {
        self.output_dir
            .join(format!("{}_result.json", record.target.slug()))
    }

    /// Writes one per-target record. Returns `None` when an existing file was
    /// preserved because overwrite is off.
    pub fn write_record(&self, record: &TargetRecord) -> Result<Option<PathBuf>, ScanError> {
        let path = self.record_path(record);
        if path.exists() && !self.overwrite {
            warn!(
                target_entry = %record.target,
                path = %path.display(),
                "result file exists, keeping previous run's output (use --overwrite)"
            );
            return Ok(None);
        }
        self.write_json(&path, record)?;
        Ok(Some(path))
    }

    pub fn write_summary(&self, report: &ScanReport) -> Result<PathBuf, ScanError> {
        let name = format!(
            "scan_report_{}.json",
            report.finished_at.format("%Y%m%d_%H%M%S")
        );
        let path = self.output_dir.join(name);
        self.write_json(&path, report)?;
        Ok(path)
    }

    fn write_json<T: Serialize>(&self, path: &PathBuf, value: &T) -> Result<(), ScanError> {
        let json =
            serde_json::to_string_pretty(value).expect("record types always serialize to JSON");
        fs::write(path, json).map_err(|e| ScanError::OutputWrite {
            path: path.clone(),
            source: e,
        })
    }
}

// ╔════════════════════════════════════════════╗
// ║ ████████╗███████╗███████╗████████╗███████╗ ║
// ║ ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝██╔════╝ ║
// ║    ██║   █████╗  ███████╗   ██║   ███████╗ ║
// ║    ██║   ██╔══╝  ╚════██║   ██║   ╚════██║ ║
// ║    ██║   ███████╗███████║   ██║   ███████║ ║
// ║    ╚═╝   ╚══════╝╚══════╝   ╚═╝   ╚══════╝ ║
// ╚════════════════════════════════════════════╝

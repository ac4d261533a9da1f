//! Run-wide counters.
//!
//! One [`ScanStats`] is created when a run starts, shared with every worker,
//! and dropped when the run ends. All mutation goes through atomics; there is
//! no ambient global state.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Instant;

use serde::{Deserialize, Serialize};

use crate::report::{TargetRecord, TargetState};

#[derive(Debug)]
pub struct ScanStats {
    total_targets: usize,
    completed: AtomicUsize,
    failed: AtomicUsize,
    open_ports: AtomicUsize,
    urls: AtomicUsize,
    findings: AtomicUsize,
    started: Instant,
}

/// Point-in-time copy of the counters, serialized into the summary report.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StatsSnapshot {
    pub total_targets: usize,
    pub completed: usize,
    pub failed: usize,
    pub open_ports: usize,
    pub urls: usize,
    pub findings: usize,
    pub elapsed_secs: f64,
}

impl ScanStats {
    pub fn new(total_targets: usize) -> Self {
        Self {
            total_targets,
            completed: AtomicUsize::new(0),
            failed: AtomicUsize::new(0),
            open_ports: AtomicUsize::new(0),
            urls: AtomicUsize::new(0),
            findings: AtomicUsize::new(0),
            started: Instant::now(),
        }
    }

    /// Folds one finished record into the counters.
    pub fn record(&self, record: &TargetRecord) {
        match record.state {
            TargetState::Failed => {
                self.failed.fetch_add(1, Ordering::Relaxed);
            }
            _ => {
                self.completed.fetch_add(1, Ordering::Relaxed);
            }
        }
        self.open_ports
            .fetch_add(record.open_ports.len(), Ordering::Relaxed);
        self.urls.fetch_add(record.urls.len(), Ordering::Relaxed);
        self.findings
            .fetch_add(record.findings.len(), Ordering::Relaxed);
    }

    pub fn processed(&self) -> usize {
        self.completed.load(Ordering::Relaxed) + self.failed.load(Ordering::Relaxed)
    }

    pub fn total_targets(&self) -> usize {
        self.total_targets
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            total_targets: self.total_targets,
            completed: self.completed.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            open_ports: self.open_ports.load(Ordering::Relaxed),
            urls: self.urls.load(Ordering::Relaxed),
            findings: self.findings.load(Ordering::Relaxed),
            elapsed_secs: self.started.elapsed().as_secs_f64(),
        }
    }
}

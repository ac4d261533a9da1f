//! # Stage Sequencer
//!
//! Runs one target through `Pending → PortScan → Crawl → VulnScan → Done |
//! Failed`, purely sequentially. The transitions encode the pass-through
//! policy: a downstream binary is never invoked on an empty input set, and a
//! stage failure is recorded on the target instead of aborting the run.

use std::collections::BTreeSet;
use std::fs;
use std::path::Path;

use tokio::sync::watch;
use tracing::{debug, info, warn};

use redseam_common::config::Config;
use redseam_common::error::ScanError;
use redseam_common::target::Target;

use crate::process::StageResult;
use crate::report::{StageReport, TargetRecord, TargetState};
use crate::stage::{
    CRAWL_URLS_FILE, CrawlStage, ENDPOINTS_FILE, FINDINGS_FILE, PortHit, PortScanStage, Stage,
    StageContext, VulnScanStage, endpoints_for, parse_port_hits, read_findings, read_url_list,
};

/// What one stage invocation amounted to, before folding into the record.
enum StageOutcome {
    Completed(StageResult),
    Failed(StageReport),
}

/// Runs the full three-stage sequence for one target.
///
/// Only [`ScanError::Interrupted`] propagates as `Err`; every other failure
/// is folded into the returned record so the pool keeps going.
pub async fn run_target(
    target: Target,
    config: &Config,
    shutdown: watch::Receiver<bool>,
) -> Result<TargetRecord, ScanError> {
    let mut record = TargetRecord::new(target.clone());
    let work_dir = config.output_dir.join(target.slug());

    if let Err(e) = fs::create_dir_all(&work_dir) {
        let err = ScanError::OutputWrite {
            path: work_dir.clone(),
            source: e,
        };
        record.errors.push(err.to_string());
        record.port_scan = StageReport::skipped();
        record.crawl = StageReport::skipped();
        record.vuln_scan = StageReport::skipped();
        record.finish(TargetState::Failed);
        return Ok(record);
    }

    let ctx = StageContext {
        target: &target,
        work_dir: &work_dir,
        config,
    };

    // Stage A: port discovery. A failure here fails the target outright;
    // there is nothing meaningful to feed forward.
    record.state = TargetState::PortScan;
    info!(target_entry = %target, "port scan starting");
    let port_scan = run_stage(&PortScanStage, &ctx, &shutdown).await?;
    match port_scan {
        StageOutcome::Completed(result) => {
            let stdout = fs::read_to_string(&result.stdout_path).unwrap_or_default();
            let hits: Vec<PortHit> = parse_port_hits(&stdout);
            record.open_ports = hits.iter().cloned().collect::<BTreeSet<PortHit>>();
            record.port_scan = StageReport::completed(result);

            if hits.is_empty() {
                // Zero open ports: downstream stages are skipped, not failed.
                info!(target_entry = %target, "no open ports, skipping crawl and vuln scan");
                record.crawl = StageReport::skipped();
                record.vuln_scan = StageReport::skipped();
                record.finish(TargetState::Done);
                return Ok(record);
            }

            info!(target_entry = %target, open_ports = hits.len(), "open ports discovered");
            if let Err(e) = write_endpoints(&work_dir, &hits) {
                record.errors.push(e.to_string());
                record.crawl = StageReport::skipped();
                record.vuln_scan = StageReport::skipped();
                record.finish(TargetState::Failed);
                return Ok(record);
            }
        }
        StageOutcome::Failed(report) => {
            if let Some(err) = &report.error {
                record.errors.push(err.clone());
            }
            record.port_scan = report;
            record.crawl = StageReport::skipped();
            record.vuln_scan = StageReport::skipped();
            record.finish(TargetState::Failed);
            return Ok(record);
        }
    }

    let mut stage_failed = false;

    // Stage B: crawl. Its failure does not stop the vuln scan, which consumes
    // the endpoint list rather than the crawler's URLs.
    record.state = TargetState::Crawl;
    info!(target_entry = %target, "crawl starting");
    match run_stage(&CrawlStage, &ctx, &shutdown).await? {
        StageOutcome::Completed(result) => {
            record.urls = read_url_list(&work_dir.join(CRAWL_URLS_FILE))
                .into_iter()
                .collect();
            debug!(target_entry = %target, urls = record.urls.len(), "crawl finished");
            record.crawl = StageReport::completed(result);
        }
        StageOutcome::Failed(report) => {
            if let Some(err) = &report.error {
                record.errors.push(err.clone());
            }
            warn!(target_entry = %target, "crawl failed, continuing to vuln scan");
            record.crawl = report;
            stage_failed = true;
        }
    }

    // Stage C: vulnerability scan, unconditionally (the endpoint list is
    // known to be non-empty here).
    record.state = TargetState::VulnScan;
    info!(target_entry = %target, "vuln scan starting");
    match run_stage(&VulnScanStage, &ctx, &shutdown).await? {
        StageOutcome::Completed(result) => {
            record.findings = read_findings(&work_dir.join(FINDINGS_FILE));
            debug!(target_entry = %target, findings = record.findings.len(), "vuln scan finished");
            record.vuln_scan = StageReport::completed(result);
        }
        StageOutcome::Failed(report) => {
            if let Some(err) = &report.error {
                record.errors.push(err.clone());
            }
            record.vuln_scan = report;
            stage_failed = true;
        }
    }

    record.finish(if stage_failed {
        TargetState::Failed
    } else {
        TargetState::Done
    });
    Ok(record)
}

/// Executes one stage and normalizes its outcome.
///
/// A missing binary mid-run is fatal for this target only; timeouts and
/// non-zero exits are classified into the matching error kinds.
async fn run_stage(
    stage: &dyn Stage,
    ctx: &StageContext<'_>,
    shutdown: &watch::Receiver<bool>,
) -> Result<StageOutcome, ScanError> {
    match stage.execute(ctx, shutdown.clone()).await {
        Ok(result) if result.timed_out => {
            let err = ScanError::StageTimeout {
                stage: stage.name(),
                secs: result.duration.as_secs(),
            };
            Ok(StageOutcome::Failed(StageReport::timed_out(
                result,
                err.to_string(),
            )))
        }
        Ok(result) if !result.success() => {
            let err = ScanError::StageNonZeroExit {
                stage: stage.name(),
                code: result.exit_code.unwrap_or(-1),
                stderr: result.stderr_excerpt(),
            };
            Ok(StageOutcome::Failed(StageReport::failed(
                Some(result),
                err.to_string(),
            )))
        }
        Ok(result) => Ok(StageOutcome::Completed(result)),
        Err(ScanError::Interrupted) => Err(ScanError::Interrupted),
        Err(e) => Ok(StageOutcome::Failed(StageReport::failed(
            None,
            e.to_string(),
        ))),
    }
}

fn write_endpoints(work_dir: &Path, hits: &[PortHit]) -> Result<(), ScanError> {
    let path = work_dir.join(ENDPOINTS_FILE);
    let mut content = endpoints_for(hits).join("\n");
    content.push('\n');
    fs::write(&path, content).map_err(|e| ScanError::OutputWrite { path, source: e })
}

// ╔════════════════════════════════════════════╗
// ║ ████████╗███████╗███████╗████████╗███████╗ ║
// ║ ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝██╔════╝ ║
// ║    ██║   █████╗  ███████╗   ██║   ███████╗ ║
// ║    ██║   ██╔══╝  ╚════██║   ██║   ╚════██║ ║
// ║    ██║   ███████╗███████║   ██║   ███████║ ║
// ║    ╚═╝   ╚══════╝╚══════╝   ╚═╝   ╚══════╝ ║
// ╚════════════════════════════════════════════╝

#[cfg(test)]
#[cfg(unix)]
mod tests {
    use super::*;
    use std::str::FromStr;

    use redseam_common::config::ToolPaths;

    use crate::report::StageStatus;
    use crate::test_util::write_stub;

    fn test_config(dir: &Path, tools: ToolPaths) -> Config {
        Config {
            output_dir: dir.join("out"),
            tools,
            ..Config::default()
        }
    }

    fn no_shutdown() -> watch::Receiver<bool> {
        let (_tx, rx) = watch::channel(false);
        rx
    }

    #[tokio::test]
    async fn test_zero_ports_short_circuits_to_done() {
        let dir = tempfile::tempdir().unwrap();
        let tools = ToolPaths {
            // Prints a banner but no open ports.
            port_scanner: write_stub(dir.path(), "portscan", "echo 'Starting scan'"),
            crawler: write_stub(dir.path(), "crawler", "exit 1"),
            vuln_scanner: write_stub(dir.path(), "vuln", "exit 1"),
        };
        let config = test_config(dir.path(), tools);
        let target = Target::from_str("10.9.9.9").unwrap();

        let record = run_target(target, &config, no_shutdown()).await.unwrap();

        assert_eq!(record.state, TargetState::Done);
        assert!(record.open_ports.is_empty());
        assert!(record.urls.is_empty());
        assert!(record.findings.is_empty());
        assert!(record.crawl.is_empty_not_failed());
        assert!(record.vuln_scan.is_empty_not_failed());
        assert!(record.errors.is_empty());
    }

    #[tokio::test]
    async fn test_port_scan_failure_fails_target_and_skips_downstream() {
        let dir = tempfile::tempdir().unwrap();
        let tools = ToolPaths {
            port_scanner: write_stub(dir.path(), "portscan", "echo 'cannot bind' >&2; exit 2"),
            crawler: write_stub(dir.path(), "crawler", "exit 0"),
            vuln_scanner: write_stub(dir.path(), "vuln", "exit 0"),
        };
        let config = test_config(dir.path(), tools);
        let target = Target::from_str("10.9.9.9").unwrap();

        let record = run_target(target, &config, no_shutdown()).await.unwrap();

        assert_eq!(record.state, TargetState::Failed);
        assert_eq!(record.port_scan.status, StageStatus::Failed);
        assert_eq!(record.crawl.status, StageStatus::Skipped);
        assert_eq!(record.vuln_scan.status, StageStatus::Skipped);
        assert!(record.errors[0].contains("port-scan"));
    }

    #[tokio::test]
    async fn test_crawl_failure_still_feeds_vuln_scan() {
        let dir = tempfile::tempdir().unwrap();
        let tools = ToolPaths {
            port_scanner: write_stub(
                dir.path(),
                "portscan",
                "echo 'Discovered open port 80/tcp on 127.0.0.1'",
            ),
            crawler: write_stub(dir.path(), "crawler", "exit 1"),
            vuln_scanner: write_stub(
                dir.path(),
                "vuln",
                r#"echo '{"poc":"test-poc"}' > findings.txt"#,
            ),
        };
        let config = test_config(dir.path(), tools);
        let target = Target::from_str("127.0.0.1").unwrap();

        let record = run_target(target, &config, no_shutdown()).await.unwrap();

        // Crawl failed but the vuln scan still ran on the endpoint list.
        assert_eq!(record.state, TargetState::Failed);
        assert_eq!(record.crawl.status, StageStatus::Failed);
        assert_eq!(record.vuln_scan.status, StageStatus::Completed);
        assert_eq!(record.findings.len(), 1);
        assert_eq!(record.open_ports.len(), 1);
    }

    #[tokio::test]
    async fn test_missing_binary_mid_run_fails_target_only() {
        let dir = tempfile::tempdir().unwrap();
        let tools = ToolPaths {
            port_scanner: write_stub(
                dir.path(),
                "portscan",
                "echo 'Discovered open port 80/tcp on 127.0.0.1'",
            ),
            crawler: "redseam-vanished-crawler".to_string(),
            vuln_scanner: write_stub(dir.path(), "vuln", "exit 0"),
        };
        let config = test_config(dir.path(), tools);
        let target = Target::from_str("127.0.0.1").unwrap();

        let record = run_target(target, &config, no_shutdown()).await.unwrap();

        assert_eq!(record.state, TargetState::Failed);
        assert_eq!(record.crawl.status, StageStatus::Failed);
        assert!(record.errors.iter().any(|e| e.contains("not found")));
        // Stage C still ran.
        assert_eq!(record.vuln_scan.status, StageStatus::Completed);
    }

    #[tokio::test]
    async fn test_endpoints_file_contents() {
        let dir = tempfile::tempdir().unwrap();
        let tools = ToolPaths {
            port_scanner: write_stub(
                dir.path(),
                "portscan",
                "echo 'Discovered open port 443/tcp on 127.0.0.1'",
            ),
            crawler: write_stub(dir.path(), "crawler", "exit 0"),
            vuln_scanner: write_stub(dir.path(), "vuln", "exit 0"),
        };
        let config = test_config(dir.path(), tools);
        let target = Target::from_str("127.0.0.1").unwrap();

        let record = run_target(target, &config, no_shutdown()).await.unwrap();
        assert_eq!(record.state, TargetState::Done);

        let endpoints = fs::read_to_string(
            config
                .output_dir
                .join(record.target.slug())
                .join(ENDPOINTS_FILE),
        )
        .unwrap();
        assert_eq!(endpoints, "http://127.0.0.1:443\nhttps://127.0.0.1:443\n");
    }
}

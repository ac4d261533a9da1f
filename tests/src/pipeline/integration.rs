#![cfg(test)]
#![cfg(unix)]

use std::fs;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::watch;

use redseam_common::config::ToolPaths;
use redseam_common::target::Target;
use redseam_core::pipeline::run_target;
use redseam_core::pool;
use redseam_core::report::{Aggregator, ScanReport, StageStatus, TargetState};
use redseam_core::stats::ScanStats;

use crate::util::{config_with, happy_path_tools, write_stub};

fn no_shutdown() -> watch::Receiver<bool> {
    let (_tx, rx) = watch::channel(false);
    rx
}

/// One target with an open port, three crawled URLs, and one finding: the
/// summary must count exactly what the stubs produced.
#[tokio::test]
async fn full_pipeline_single_target() {
    let dir = tempfile::tempdir().unwrap();
    let tools = happy_path_tools(
        dir.path(),
        &[
            "http://127.0.0.1/",
            "http://127.0.0.1/login",
            "http://127.0.0.1/api",
        ],
        &[r#"{"poc":"weak-auth","severity":"high"}"#],
    );
    let config = Arc::new(config_with(dir.path(), tools, 1));
    let stats = Arc::new(ScanStats::new(1));
    let aggregator = Arc::new(Aggregator::new(config.output_dir.clone(), false));

    let started_at = Utc::now();
    let targets = vec![Target::from_str("127.0.0.1").unwrap()];
    let records = pool::run(
        targets,
        config.clone(),
        stats.clone(),
        aggregator.clone(),
        no_shutdown(),
        None,
    )
    .await;

    let report = ScanReport {
        started_at,
        finished_at: Utc::now(),
        target_count: records.len(),
        stats: stats.snapshot(),
        records,
    };

    assert_eq!(report.target_count, 1);
    let record = &report.records[0];
    assert_eq!(record.state, TargetState::Done);
    assert_eq!(record.open_ports.len(), 1);
    assert_eq!(record.urls.len(), 3);
    assert_eq!(record.findings.len(), 1);
    assert_eq!(record.findings[0]["poc"], "weak-auth");

    // The per-target record landed on disk and round-trips.
    let record_file = config.output_dir.join("127.0.0.1_result.json");
    let on_disk: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(&record_file).unwrap()).unwrap();
    assert_eq!(on_disk["state"], "done");
    assert_eq!(on_disk["findings"].as_array().unwrap().len(), 1);

    let summary = aggregator.write_summary(&report).unwrap();
    let summary_json: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(&summary).unwrap()).unwrap();
    assert_eq!(summary_json["target_count"], 1);
    assert_eq!(summary_json["stats"]["findings"], 1);
}

/// An unreachable target with zero open ports finishes `Done`, with the
/// downstream stages empty rather than failed.
#[tokio::test]
async fn unreachable_target_is_done_not_failed() {
    let dir = tempfile::tempdir().unwrap();
    let tools = ToolPaths {
        port_scanner: write_stub(dir.path(), "portscan", "echo 'rate: 0.00-kpps, 100% done'"),
        crawler: write_stub(dir.path(), "crawler", "exit 1"),
        vuln_scanner: write_stub(dir.path(), "vuln", "exit 1"),
    };
    let config = config_with(dir.path(), tools, 1);
    let target = Target::from_str("10.255.255.1").unwrap();

    let record = run_target(target, &config, no_shutdown()).await.unwrap();

    assert_eq!(record.state, TargetState::Done);
    assert!(record.open_ports.is_empty());
    assert!(record.urls.is_empty());
    assert!(record.findings.is_empty());
    assert_eq!(record.crawl.status, StageStatus::Skipped);
    assert_eq!(record.vuln_scan.status, StageStatus::Skipped);
}

/// A hanging crawler hits the stage timeout, is killed, and the vuln stage
/// still runs afterwards.
#[tokio::test]
async fn stage_timeout_kills_process_and_pipeline_continues() {
    let dir = tempfile::tempdir().unwrap();
    let marker = dir.path().join("crawler_survived");
    let tools = ToolPaths {
        port_scanner: write_stub(
            dir.path(),
            "portscan",
            "echo 'Discovered open port 80/tcp on 127.0.0.1'",
        ),
        crawler: write_stub(
            dir.path(),
            "crawler",
            &format!("sleep 5; touch {}", marker.display()),
        ),
        vuln_scanner: write_stub(dir.path(), "vuln", "echo pwned > findings.txt"),
    };
    let mut config = config_with(dir.path(), tools, 1);
    config.stage_timeout = Duration::from_millis(300);
    let target = Target::from_str("127.0.0.1").unwrap();

    let record = run_target(target, &config, no_shutdown()).await.unwrap();

    assert_eq!(record.state, TargetState::Failed);
    assert_eq!(record.crawl.status, StageStatus::TimedOut);
    assert!(record.crawl.result.as_ref().unwrap().timed_out);
    assert_eq!(record.vuln_scan.status, StageStatus::Completed);
    assert_eq!(record.findings.len(), 1);

    // The crawler was killed; give it the chance it no longer has.
    tokio::time::sleep(Duration::from_millis(400)).await;
    assert!(!marker.exists());
}

/// With pool size 2 and 6 targets, stub timestamps must never show more than
/// two port-scan processes alive at once.
#[tokio::test]
async fn pool_bounds_concurrent_process_groups() {
    let dir = tempfile::tempdir().unwrap();
    let times_dir = dir.path().join("times");
    fs::create_dir_all(&times_dir).unwrap();

    let body = format!(
        "date +%s%N > {times}/start_$1\nsleep 0.3\ndate +%s%N > {times}/end_$1\necho 'no ports'",
        times = times_dir.display()
    );
    let tools = ToolPaths {
        port_scanner: write_stub(dir.path(), "portscan", &body),
        crawler: write_stub(dir.path(), "crawler", "exit 0"),
        vuln_scanner: write_stub(dir.path(), "vuln", "exit 0"),
    };
    let config = Arc::new(config_with(dir.path(), tools, 2));

    let targets: Vec<Target> = (1..=6)
        .map(|i| Target::from_str(&format!("10.0.0.{i}")).unwrap())
        .collect();
    let stats = Arc::new(ScanStats::new(targets.len()));
    let aggregator = Arc::new(Aggregator::new(config.output_dir.clone(), false));

    let records = pool::run(
        targets,
        config,
        stats,
        aggregator,
        no_shutdown(),
        None,
    )
    .await;
    assert_eq!(records.len(), 6);

    let mut intervals: Vec<(u128, u128)> = Vec::new();
    for i in 1..=6 {
        let start: u128 = fs::read_to_string(times_dir.join(format!("start_10.0.0.{i}")))
            .unwrap()
            .trim()
            .parse()
            .unwrap();
        let end: u128 = fs::read_to_string(times_dir.join(format!("end_10.0.0.{i}")))
            .unwrap()
            .trim()
            .parse()
            .unwrap();
        intervals.push((start, end));
    }

    let max_overlap = intervals
        .iter()
        .map(|(start, _)| {
            intervals
                .iter()
                .filter(|(s, e)| s <= start && start < e)
                .count()
        })
        .max()
        .unwrap();
    assert!(
        max_overlap <= 2,
        "{max_overlap} stage processes were alive at once with a pool of 2"
    );
}

/// Re-running into the same output directory must not clobber earlier
/// per-target results unless overwrite was requested.
#[tokio::test]
async fn rerun_preserves_previous_results() {
    let dir = tempfile::tempdir().unwrap();
    let tools = happy_path_tools(dir.path(), &["http://127.0.0.1/"], &["first run"]);
    let config = Arc::new(config_with(dir.path(), tools, 1));
    let record_file = config.output_dir.join("127.0.0.1_result.json");

    let run_once = |cfg: Arc<redseam_common::config::Config>| async move {
        let stats = Arc::new(ScanStats::new(1));
        let aggregator = Arc::new(Aggregator::new(cfg.output_dir.clone(), cfg.overwrite));
        pool::run(
            vec![Target::from_str("127.0.0.1").unwrap()],
            cfg,
            stats,
            aggregator,
            no_shutdown(),
            None,
        )
        .await
    };

    run_once(config.clone()).await;
    let first = fs::read(&record_file).unwrap();

    // Second run produces a different finding, but may not overwrite.
    let tools = happy_path_tools(dir.path(), &["http://127.0.0.1/"], &["second run"]);
    let mut changed = config_with(dir.path(), tools, 1);
    changed.output_dir = config.output_dir.clone();
    run_once(Arc::new(changed.clone())).await;
    assert_eq!(fs::read(&record_file).unwrap(), first);

    // With overwrite on, the new record replaces the old one.
    changed.overwrite = true;
    run_once(Arc::new(changed)).await;
    let rewritten = fs::read_to_string(&record_file).unwrap();
    assert!(rewritten.contains("second run"));
}

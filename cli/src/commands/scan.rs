use std::fs;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use chrono::Utc;
use colored::*;
use tokio::sync::watch;
use tracing::{info, warn};
use url::Url;

use redseam_common::config::{Config, ToolPaths};
use redseam_common::target::{Target, load_targets};
use redseam_core::pool;
use redseam_core::process::resolve_executable;
use redseam_core::report::{Aggregator, ScanReport};
use redseam_core::stats::ScanStats;

use crate::commands::ScanArgs;
use crate::terminal::{print, progress};

pub async fn scan(args: ScanArgs) -> anyhow::Result<()> {
    let config = Arc::new(build_config(&args)?);

    // Startup preflight: all three binaries must resolve and the target file
    // must yield something, before any stage is launched.
    for program in [
        &config.tools.port_scanner,
        &config.tools.crawler,
        &config.tools.vuln_scanner,
    ] {
        resolve_executable(program)?;
    }

    let targets: Vec<Target> = load_targets(&args.targets)?;
    info!(count = targets.len(), "targets loaded");

    if !is_root::is_root() {
        warn!("not running as root; the port-scan stage may fail to open raw sockets");
    }

    fs::create_dir_all(&config.output_dir).with_context(|| {
        format!(
            "failed to create output directory '{}'",
            config.output_dir.display()
        )
    })?;

    print_config(&args, &config, targets.len());

    let stats = Arc::new(ScanStats::new(targets.len()));
    let aggregator = Arc::new(Aggregator::new(config.output_dir.clone(), config.overwrite));
    let shutdown = spawn_interrupt_handler();

    let started_at = Utc::now();
    let total = targets.len();

    let span = progress::scan_span(total as u64);
    let span_handle = span.clone();
    let guard = span.enter();

    let records = pool::run(
        targets,
        config.clone(),
        stats.clone(),
        aggregator.clone(),
        shutdown,
        Some(Box::new(move |record| {
            progress::advance(&span_handle);
            info!(target_entry = %record.target, state = ?record.state, "target finished");
        })),
    )
    .await;

    drop(guard);

    let snapshot = stats.snapshot();
    if snapshot.total_targets > records.len() {
        warn!(
            processed = records.len(),
            total = snapshot.total_targets,
            "run interrupted, summary covers the processed targets only"
        );
    }

    let report = ScanReport {
        started_at,
        finished_at: Utc::now(),
        target_count: records.len(),
        stats: snapshot,
        records,
    };

    match aggregator.write_summary(&report) {
        Ok(path) => info!("summary report written to {}", path.display()),
        Err(e) => warn!("{e}"),
    }

    print::summary_table(&report.stats, args.quiet);

    if report.stats.findings > 0 {
        warn!(
            findings = report.stats.findings,
            "potential vulnerabilities recorded, review the findings"
        );
    }

    Ok(())
}

fn build_config(args: &ScanArgs) -> anyhow::Result<Config> {
    if let Some(proxy) = &args.proxy {
        Url::parse(proxy).with_context(|| format!("invalid proxy URL '{proxy}'"))?;
    }

    Ok(Config {
        output_dir: args.output.clone(),
        ports: args.ports.clone(),
        rate: args.rate,
        workers: args.threads,
        stage_timeout: Duration::from_secs(args.timeout),
        proxy: args.proxy.clone(),
        tools: ToolPaths {
            port_scanner: args.tools.port_scanner.clone(),
            crawler: args.tools.crawler.clone(),
            vuln_scanner: args.tools.vuln_scanner.clone(),
        },
        overwrite: args.overwrite,
        quiet: args.quiet,
    })
}

/// Ctrl-C flips the run-wide stop signal; the runner kills in-flight stage
/// processes and workers stop pulling targets.
fn spawn_interrupt_handler() -> watch::Receiver<bool> {
    let (tx, rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, terminating stage processes");
            let _ = tx.send(true);
        }
    });
    rx
}

fn print_config(args: &ScanArgs, config: &Config, target_count: usize) {
    if config.quiet {
        return;
    }

    print::header("scan configuration", config.quiet);

    const KEYS: &[&str] = &[
        "Targets", "Output", "Ports", "Rate", "Workers", "Timeout", "Proxy", "Stages",
    ];
    print::set_key_width(KEYS);

    print::aligned_line(
        "Targets",
        format!("{} ({} entries)", args.targets.display(), target_count),
    );
    print::aligned_line("Output", config.output_dir.display().to_string());
    print::aligned_line("Ports", config.ports.clone());
    print::aligned_line("Rate", config.rate.to_string());
    print::aligned_line("Workers", config.workers.to_string());
    print::aligned_line("Timeout", format!("{}s per stage", args.timeout));
    if let Some(proxy) = &config.proxy {
        print::aligned_line("Proxy", proxy.clone());
    }
    print::aligned_line(
        "Stages",
        format!(
            "{} ⇒ {} ⇒ {}",
            config.tools.port_scanner, config.tools.crawler, config.tools.vuln_scanner
        )
        .bright_black(),
    );
}

pub mod check;
pub mod scan;

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use redseam_common::config::{DEFAULT_PORTS, DEFAULT_RATE, DEFAULT_TIMEOUT_SECS, DEFAULT_WORKERS};

#[derive(Parser)]
#[command(name = "redseam")]
#[command(about = "Stitches a port scanner, a crawler, and a vuln scanner into one pipeline.")]
pub struct CommandLine {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the staged scan against a target list
    #[command(alias = "s")]
    Scan(ScanArgs),
    /// Verify that the three stage binaries resolve
    #[command(alias = "c")]
    Check(ToolArgs),
}

/// Programs for the three wrapped stages, shared by `scan` and `check`.
#[derive(Args)]
pub struct ToolArgs {
    /// Port-scan binary
    #[arg(long, default_value = "masscan")]
    pub port_scanner: String,
    /// Crawler binary
    #[arg(long, default_value = "rad")]
    pub crawler: String,
    /// Vulnerability-scan binary
    #[arg(long, default_value = "dddd")]
    pub vuln_scanner: String,
}

#[derive(Args)]
pub struct ScanArgs {
    /// Line-delimited file of hosts, CIDRs, or domains
    #[arg(short = 't', long = "targets")]
    pub targets: PathBuf,

    /// Output directory for per-target results and the summary report
    #[arg(short = 'o', long = "output", default_value = "scan_results")]
    pub output: PathBuf,

    /// Ports handed to the port-scan stage
    #[arg(short = 'p', long, default_value = DEFAULT_PORTS)]
    pub ports: String,

    /// Port-scan packet rate
    #[arg(short = 'r', long, default_value_t = DEFAULT_RATE)]
    pub rate: u32,

    /// How many targets to process in parallel
    #[arg(long = "threads", alias = "workers", default_value_t = DEFAULT_WORKERS)]
    pub threads: usize,

    /// Per-stage timeout in seconds (the vuln-scan stage gets twice this)
    #[arg(long = "timeout", default_value_t = DEFAULT_TIMEOUT_SECS)]
    pub timeout: u64,

    /// Proxy URL forwarded to the crawl and vuln-scan stages
    #[arg(long)]
    pub proxy: Option<String>,

    /// Clobber per-target result files left by earlier runs
    #[arg(long)]
    pub overwrite: bool,

    /// Enable debug logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Also write a plain-text log to this file
    #[arg(long)]
    pub log_file: Option<PathBuf>,

    /// Suppress the startup banner
    #[arg(long)]
    pub no_banner: bool,

    /// Suppress headers and the config listing
    #[arg(short, long)]
    pub quiet: bool,

    #[command(flatten)]
    pub tools: ToolArgs,
}

impl CommandLine {
    pub fn parse_args() -> Self {
        Self::parse()
    }
}

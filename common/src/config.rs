use std::path::PathBuf;
use std::time::Duration;

/// Default port set handed to the port-scan stage.
pub const DEFAULT_PORTS: &str = "80,443,22,3389,8080,8443,9090";
/// Default packets-per-second rate for the port-scan stage.
pub const DEFAULT_RATE: u32 = 5000;
/// Default worker count. Deliberately low: every stage binary generates its
/// own scan traffic on top of ours.
pub const DEFAULT_WORKERS: usize = 3;
/// Default per-stage timeout in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Programs for the three wrapped stages.
///
/// Plain program names resolve through `$PATH`; anything containing a path
/// separator is taken as-is.
#[derive(Clone, Debug)]
pub struct ToolPaths {
    pub port_scanner: String,
    pub crawler: String,
    pub vuln_scanner: String,
}

impl Default for ToolPaths {
    fn default() -> Self {
        Self {
            port_scanner: "masscan".to_string(),
            crawler: "rad".to_string(),
            vuln_scanner: "dddd".to_string(),
        }
    }
}

/// Run configuration, built once by the CLI and shared read-only with every
/// worker.
#[derive(Clone, Debug)]
pub struct Config {
    pub output_dir: PathBuf,
    pub ports: String,
    /// Port-scan packet rate.
    pub rate: u32,
    /// Upper bound on targets processed in parallel.
    pub workers: usize,
    /// Per-stage timeout. The vuln-scan stage gets twice this.
    pub stage_timeout: Duration,
    /// Forwarded to the crawl and vuln-scan stages.
    pub proxy: Option<String>,
    pub tools: ToolPaths,
    /// Allow clobbering per-target result files from earlier runs.
    pub overwrite: bool,
    pub quiet: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("scan_results"),
            ports: DEFAULT_PORTS.to_string(),
            rate: DEFAULT_RATE,
            workers: DEFAULT_WORKERS,
            stage_timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            proxy: None,
            tools: ToolPaths::default(),
            overwrite: false,
            quiet: false,
        }
    }
}

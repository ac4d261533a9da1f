//! The central **abstraction** for the three wrapped scan binaries.
//!
//! A [`Stage`] knows how to turn the run configuration and one target's
//! working directory into an external command line. The sequencer drives
//! stages exclusively through this trait, so the pipeline logic never cares
//! which binary it is talking to.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::watch;

use redseam_common::config::Config;
use redseam_common::error::ScanError;
use redseam_common::target::Target;

use crate::process::{self, CommandSpec, StageResult, resolve_executable};

/// Endpoint list fed to the crawl and vuln-scan stages.
pub const ENDPOINTS_FILE: &str = "endpoints.txt";
/// URL list the crawler writes.
pub const CRAWL_URLS_FILE: &str = "crawl_urls.txt";
/// Findings file the vulnerability scanner writes.
pub const FINDINGS_FILE: &str = "findings.txt";

/// Ports that get an additional `https://` endpoint.
const TLS_PORTS: &[u16] = &[443, 8443];

/// Everything a stage needs to build its command line.
pub struct StageContext<'a> {
    pub target: &'a Target,
    /// Per-target working directory; capture and hand-off files live here.
    pub work_dir: &'a Path,
    pub config: &'a Config,
}

#[async_trait]
pub trait Stage: Send + Sync {
    fn name(&self) -> &'static str;

    /// Builds the external invocation. Resolving the executable happens here,
    /// before any spawn, so a binary that vanished mid-run surfaces as
    /// [`ScanError::MissingExecutable`] for this target only.
    fn command(&self, ctx: &StageContext<'_>) -> Result<CommandSpec, ScanError>;

    async fn execute(
        &self,
        ctx: &StageContext<'_>,
        shutdown: watch::Receiver<bool>,
    ) -> Result<StageResult, ScanError> {
        let spec = self.command(ctx)?;
        process::run(&spec, shutdown).await
    }
}

/// Stage A: the port-discovery binary.
pub struct PortScanStage;

#[async_trait]
impl Stage for PortScanStage {
    fn name(&self) -> &'static str {
        "port-scan"
    }

    fn command(&self, ctx: &StageContext<'_>) -> Result<CommandSpec, ScanError> {
        let program: PathBuf = resolve_executable(&ctx.config.tools.port_scanner)?;
        Ok(CommandSpec {
            stage: self.name(),
            program,
            args: vec![
                ctx.target.as_str().to_string(),
                "-p".to_string(),
                ctx.config.ports.clone(),
                "--rate".to_string(),
                ctx.config.rate.to_string(),
                "--wait".to_string(),
                "3".to_string(),
            ],
            cwd: ctx.work_dir.to_path_buf(),
            timeout: ctx.config.stage_timeout,
        })
    }
}

/// Stage B: the crawler, fed with the endpoints discovered by stage A.
pub struct CrawlStage;

#[async_trait]
impl Stage for CrawlStage {
    fn name(&self) -> &'static str {
        "crawl"
    }

    fn command(&self, ctx: &StageContext<'_>) -> Result<CommandSpec, ScanError> {
        let program: PathBuf = resolve_executable(&ctx.config.tools.crawler)?;
        let mut args: Vec<String> = vec![
            "--target-file".to_string(),
            ENDPOINTS_FILE.to_string(),
            "--text-output".to_string(),
            CRAWL_URLS_FILE.to_string(),
        ];
        if let Some(proxy) = &ctx.config.proxy {
            args.push("--proxy".to_string());
            args.push(proxy.clone());
        }
        Ok(CommandSpec {
            stage: self.name(),
            program,
            args,
            cwd: ctx.work_dir.to_path_buf(),
            timeout: ctx.config.stage_timeout,
        })
    }
}

/// Stage C: the vulnerability scanner.
pub struct VulnScanStage;

#[async_trait]
impl Stage for VulnScanStage {
    fn name(&self) -> &'static str {
        "vuln-scan"
    }

    fn command(&self, ctx: &StageContext<'_>) -> Result<CommandSpec, ScanError> {
        let program: PathBuf = resolve_executable(&ctx.config.tools.vuln_scanner)?;
        let mut args: Vec<String> = vec![
            "-t".to_string(),
            ENDPOINTS_FILE.to_string(),
            "-o".to_string(),
            FINDINGS_FILE.to_string(),
        ];
        if let Some(proxy) = &ctx.config.proxy {
            args.push("--proxy".to_string());
            args.push(proxy.clone());
        }
        Ok(CommandSpec {
            stage: self.name(),
            program,
            args,
            cwd: ctx.work_dir.to_path_buf(),
            // Rule matching walks every endpoint with the full POC set and
            // needs headroom the discovery stages do not.
            timeout: ctx.config.stage_timeout * 2,
        })
    }
}

/// One open port reported by the port-scan stage.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PortHit {
    pub ip: String,
    pub port: u16,
    pub proto: String,
}

/// Parses the port scanner's stdout.
///
/// Expected line shape: `Discovered open port 80/tcp on 192.168.1.1`.
/// Anything that does not match is skipped, not an error; the scanner mixes
/// banners and rate diagnostics into the same stream.
pub fn parse_port_hits(output: &str) -> Vec<PortHit> {
    let mut hits: Vec<PortHit> = Vec::new();

    for line in output.lines() {
        let line = line.trim();
        if line.is_empty() || !line.contains("open") {
            continue;
        }
        let parts: Vec<&str> = line.split_whitespace().collect();
        if parts.len() < 6 {
            continue;
        }
        let Some((port_str, proto)) = parts[3].split_once('/') else {
            continue;
        };
        let Ok(port) = port_str.parse::<u16>() else {
            continue;
        };
        hits.push(PortHit {
            ip: parts[5].to_string(),
            port,
            proto: proto.to_string(),
        });
    }

    hits
}

/// Derives the endpoint URLs handed to the crawl and vuln-scan stages.
///
/// Every hit becomes `http://ip:port`; the usual TLS ports additionally get
/// an `https://` twin, since either scheme may be the one that answers.
pub fn endpoints_for(hits: &[PortHit]) -> Vec<String> {
    let mut endpoints: Vec<String> = Vec::with_capacity(hits.len());
    for hit in hits {
        endpoints.push(format!("http://{}:{}", hit.ip, hit.port));
        if TLS_PORTS.contains(&hit.port) {
            endpoints.push(format!("https://{}:{}", hit.ip, hit.port));
        }
    }
    endpoints
}

/// Reads the crawler's URL list. A missing file means the crawler found
/// nothing, which is a valid empty result, not an error.
pub fn read_url_list(path: &Path) -> Vec<String> {
    let content = std::fs::read_to_string(path).unwrap_or_default();
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

/// Reads the vulnerability scanner's findings file.
///
/// Findings are opaque: JSON lines pass through verbatim, anything else is
/// preserved as a plain string. Their schema belongs to the scanner binary.
pub fn read_findings(path: &Path) -> Vec<Value> {
    let content = std::fs::read_to_string(path).unwrap_or_default();
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(|line| {
            serde_json::from_str::<Value>(line).unwrap_or_else(|_| Value::String(line.to_string()))
        })
        .collect()
}

// ╔════════════════════════════════════════════╗
// ║ ████████╗███████╗███████╗████████╗███████╗ ║
// ║ ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝██╔════╝ ║
// ║    ██║   █████╗  ███████╗   ██║   ███████╗ ║
// ║    ██║   ██╔══╝  ╚════██║   ██║   ╚════██║ ║
// ║    ██║   ███████╗███████║   ██║   ███████║ ║
// ║    ╚═╝   ╚══════╝╚══════╝   ╚═╝   ╚══════╝ ║
// ╚════════════════════════════════════════════╝

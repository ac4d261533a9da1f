//! Shared helpers for driving the pipeline against stub stage binaries.

use std::fs;
use std::path::Path;

use redseam_common::config::{Config, ToolPaths};

/// Drops an executable shell script into `dir` and returns its path as a
/// tool-path string.
#[cfg(unix)]
pub fn write_stub(dir: &Path, name: &str, body: &str) -> String {
    use std::os::unix::fs::PermissionsExt;
    let path = dir.join(name);
    fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
    fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
    path.display().to_string()
}

/// A stub set where the port scanner reports one open port 80, the crawler
/// writes `urls` into its output file, and the vuln scanner emits `findings`
/// as JSON lines.
#[cfg(unix)]
pub fn happy_path_tools(dir: &Path, urls: &[&str], findings: &[&str]) -> ToolPaths {
    let url_lines = urls.join("\\n");
    let finding_lines = findings.join("\\n");
    ToolPaths {
        port_scanner: write_stub(
            dir,
            "portscan",
            "echo 'Discovered open port 80/tcp on 127.0.0.1'",
        ),
        crawler: write_stub(
            dir,
            "crawler",
            &format!("printf '{url_lines}\\n' > crawl_urls.txt"),
        ),
        vuln_scanner: write_stub(
            dir,
            "vuln",
            &format!("printf '{finding_lines}\\n' > findings.txt"),
        ),
    }
}

pub fn config_with(dir: &Path, tools: ToolPaths, workers: usize) -> Config {
    let output_dir = dir.join("out");
    fs::create_dir_all(&output_dir).unwrap();
    Config {
        output_dir,
        workers,
        tools,
        ..Config::default()
    }
}

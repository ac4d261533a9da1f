use anyhow::bail;
use colored::*;

use redseam_core::process::resolve_executable;

use crate::commands::ToolArgs;
use crate::terminal::print;

/// Preflight for the three wrapped binaries, without scanning anything.
pub fn check(tools: &ToolArgs) -> anyhow::Result<()> {
    const KEYS: &[&str] = &["Port scan", "Crawl", "Vuln scan"];
    print::set_key_width(KEYS);

    let mut missing: usize = 0;
    for (label, program) in [
        ("Port scan", &tools.port_scanner),
        ("Crawl", &tools.crawler),
        ("Vuln scan", &tools.vuln_scanner),
    ] {
        match resolve_executable(program) {
            Ok(path) => print::aligned_line(label, path.display().to_string().green()),
            Err(_) => {
                missing += 1;
                print::aligned_line(label, format!("{program} (missing)").red().bold());
            }
        }
    }

    if missing > 0 {
        bail!("{missing} stage binaries missing");
    }

    tracing::info!("all stage binaries resolved");
    Ok(())
}

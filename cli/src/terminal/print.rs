use std::{cell::Cell, fmt::Display};

use colored::*;
use tracing::info;
use unicode_width::UnicodeWidthStr;

use redseam_core::stats::StatsSnapshot;

use crate::terminal::colors;

pub const TOTAL_WIDTH: usize = 64;

thread_local! {
    pub static GLOBAL_KEY_WIDTH: Cell<usize> = const { Cell::new(0) }
}

pub trait WithDefaultColor {
    fn with_default(self, default_color: Color) -> ColoredString;
}

impl WithDefaultColor for &str {
    fn with_default(self, default_color: Color) -> ColoredString {
        self.color(default_color)
    }
}

impl WithDefaultColor for String {
    fn with_default(self, default_color: Color) -> ColoredString {
        self.color(default_color)
    }
}

impl WithDefaultColor for ColoredString {
    fn with_default(self, _default_color: Color) -> ColoredString {
        self
    }
}

/// Routes terminal output through tracing so the progress layer can
/// interleave it without tearing the bar.
pub fn print(msg: &str) {
    info!(target: "redseam::print", "{msg}");
}

pub fn banner(no_banner: bool, quiet: bool) {
    if no_banner || quiet {
        return;
    }

    let text_content: String = format!("⟦ REDSEAM v{} ⟧ ", env!("CARGO_PKG_VERSION"));
    let text_width: usize = UnicodeWidthStr::width(text_content.as_str());
    let text: ColoredString = text_content.bright_green().bold();
    let sep: ColoredString = "═".repeat((TOTAL_WIDTH - text_width) / 2).bright_black();
    let output: String = format!("{}{}{}", sep, text, sep);

    print(&output);
    centerln(&format!(
        "{}",
        "port scan ⇒ crawl ⇒ vuln scan".italic().bright_black()
    ));
}

pub fn header(msg: &str, quiet: bool) {
    if quiet {
        return;
    }

    let formatted: String = format!("⟦ {} ⟧", msg);
    let msg_len: usize = formatted.chars().count();

    let dash_count: usize = TOTAL_WIDTH.saturating_sub(msg_len);
    let left: usize = dash_count / 2;
    let right: usize = dash_count - left;

    let line: ColoredString = format!(
        "{}{}{}",
        "─".repeat(left),
        formatted.to_uppercase().bright_green(),
        "─".repeat(right)
    )
    .bright_black();

    print(&format!("{}", line));
}

pub fn fat_separator() {
    let sep: ColoredString = "═".repeat(TOTAL_WIDTH).bright_black();
    print(&format!("{}", sep));
}

/// Fixes the dotted alignment for a block of [`aligned_line`] calls.
pub fn set_key_width(keys: &[&str]) {
    let widest: usize = keys.iter().map(|k| k.len()).max().unwrap_or(0);
    GLOBAL_KEY_WIDTH.set(widest);
}

pub fn aligned_line<V>(key: &str, value: V)
where
    V: Display + WithDefaultColor,
{
    let whitespace: String = ".".repeat((GLOBAL_KEY_WIDTH.get() + 1).saturating_sub(key.len()));
    let colon: String = format!(
        "{}{}",
        whitespace.color(colors::SEPARATOR),
        ":".color(colors::SEPARATOR)
    );
    let value: ColoredString = value.with_default(colors::TEXT_DEFAULT);
    print_status(format!("{}{} {}", key.color(colors::PRIMARY), colon, value));
}

pub fn print_status<T: AsRef<str>>(msg: T) {
    let prefix: ColoredString = ">".color(colors::SEPARATOR);
    let message: String = format!("{} {}", prefix, msg.as_ref().color(colors::TEXT_DEFAULT));
    print(&message);
}

pub fn centerln(msg: &str) {
    let space = " ".repeat(TOTAL_WIDTH.saturating_sub(console::measure_text_width(msg)) / 2);
    print(&format!("{}{}{}", space, msg, space));
}

/// End-of-run summary block.
pub fn summary_table(stats: &StatsSnapshot, quiet: bool) {
    header("scan summary", quiet);

    const KEYS: &[&str] = &[
        "Targets",
        "Completed",
        "Failed",
        "Open ports",
        "URLs",
        "Findings",
        "Elapsed",
    ];
    set_key_width(KEYS);

    aligned_line("Targets", stats.total_targets.to_string());
    aligned_line("Completed", stats.completed.to_string().green().bold());
    let failed: ColoredString = if stats.failed > 0 {
        stats.failed.to_string().red().bold()
    } else {
        stats.failed.to_string().normal()
    };
    aligned_line("Failed", failed);
    aligned_line("Open ports", stats.open_ports.to_string());
    aligned_line("URLs", stats.urls.to_string());
    let findings: ColoredString = if stats.findings > 0 {
        stats.findings.to_string().color(colors::ALERT).bold()
    } else {
        stats.findings.to_string().normal()
    };
    aligned_line("Findings", findings);
    aligned_line("Elapsed", format!("{:.1}s", stats.elapsed_secs).yellow());

    fat_separator();
}

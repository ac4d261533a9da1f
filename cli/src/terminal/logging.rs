use std::fs::File;
use std::path::Path;
use std::sync::Mutex;

use colored::*;
use tracing::{Event, Level, Subscriber};
use tracing_indicatif::IndicatifLayer;
use tracing_indicatif::filter::IndicatifFilter;
use tracing_subscriber::fmt::FormatEvent;
use tracing_subscriber::fmt::format::{self, Writer};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, fmt};

pub struct SeamFormatter;

impl<S, N> FormatEvent<S, N> for SeamFormatter
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> format::FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &tracing_subscriber::fmt::FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &Event<'_>,
    ) -> std::fmt::Result {
        let meta = event.metadata();

        // Raw terminal output (banner, headers, tables) carries no symbol.
        if meta.target() == "redseam::print" {
            ctx.field_format().format_fields(writer.by_ref(), event)?;
            return writeln!(writer);
        }

        let (symbol, color_func): (&str, fn(ColoredString) -> ColoredString) = match *meta.level() {
            Level::TRACE => ("[ ]", |s| s.dimmed()),
            Level::DEBUG => ("[?]", |s| s.blue()),
            Level::INFO => ("[+]", |s| s.green().bold()),
            Level::WARN => ("[*]", |s| s.yellow().bold()),
            Level::ERROR => ("[-]", |s| s.red().bold()),
        };

        write!(writer, "{} ", color_func(symbol.into()))?;

        ctx.field_format().format_fields(writer.by_ref(), event)?;

        writeln!(writer)
    }
}

/// Installs the tracing stack: env-filter, the symbol formatter writing
/// through the progress layer, and an optional plain-text file layer.
pub fn init(verbose: bool, log_file: Option<&Path>) -> anyhow::Result<()> {
    let default_directive = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive));

    let indicatif_layer = IndicatifLayer::new();
    let console_layer = fmt::layer()
        .event_format(SeamFormatter)
        .with_writer(indicatif_layer.get_stderr_writer());

    // Bars only for spans that opt in via the `indicatif.pb_show` field.
    let registry = tracing_subscriber::registry()
        .with(filter)
        .with(console_layer)
        .with(indicatif_layer.with_filter(IndicatifFilter::new(false)));

    match log_file {
        Some(path) => {
            let file = File::create(path)?;
            let file_layer = fmt::layer().with_ansi(false).with_writer(Mutex::new(file));
            registry.with(file_layer).init();
        }
        None => registry.init(),
    }

    Ok(())
}

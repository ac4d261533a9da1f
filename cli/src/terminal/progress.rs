use indicatif::ProgressStyle;
use tracing::{Span, info_span};
use tracing_indicatif::span_ext::IndicatifSpanExt;

/// Span whose attached progress bar tracks finished targets.
///
/// Workers bump it through a cloned handle; the bar disappears with the span
/// when the pool drains.
pub fn scan_span(total_targets: u64) -> Span {
    let span = info_span!("scan", indicatif.pb_show = true);
    span.pb_set_style(
        &ProgressStyle::with_template(
            "{spinner:.green} {msg} [{bar:40.green/black}] {pos}/{len} targets",
        )
        .expect("static progress template parses"),
    );
    span.pb_set_length(total_targets);
    span.pb_set_message("scanning");
    span
}

pub fn advance(span: &Span) {
    span.pb_inc(1);
}

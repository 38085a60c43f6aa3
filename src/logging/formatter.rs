use tracing_subscriber::{
    fmt::{self, format::FmtSpan, MakeWriter},
    layer::Layer,
    registry::LookupSpan,
};

use super::config::LogFormat;

/// Presentation switches shared by every sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LayerOptions {
    pub ansi: bool,
    pub target: bool,
    pub thread_ids: bool,
    pub line_numbers: bool,
}

/// Builds a fmt layer writing to `writer`. Boxed so json, pretty and
/// compact layers share one type.
pub fn build_formatter<S, W>(
    format: LogFormat,
    writer: W,
    options: LayerOptions,
) -> Box<dyn Layer<S> + Send + Sync>
where
    S: tracing::Subscriber + for<'a> LookupSpan<'a>,
    W: for<'writer> MakeWriter<'writer> + Send + Sync + 'static,
{
    let base = fmt::layer()
        .with_writer(writer)
        .with_ansi(options.ansi)
        .with_target(options.target)
        .with_thread_names(options.thread_ids)
        .with_thread_ids(options.thread_ids)
        .with_line_number(options.line_numbers);

    match format {
        LogFormat::Json => Box::new(
            base.event_format(fmt::format().json().with_current_span(true))
                .fmt_fields(fmt::format::JsonFields::new()),
        ),
        LogFormat::Pretty => Box::new(
            base.event_format(fmt::format().pretty())
                .with_span_events(FmtSpan::CLOSE),
        ),
        LogFormat::Compact => Box::new(base.event_format(fmt::format().compact())),
    }
}

use std::io::{self, Stdout};

use tracing_subscriber::{layer::Layer, registry::LookupSpan};

use crate::logging::{
    config::ConsoleConfig,
    formatter::{build_formatter, LayerOptions},
};

/// Stdout layer built from the console section.
pub fn layer_with_config<S>(config: &ConsoleConfig) -> Box<dyn Layer<S> + Send + Sync>
where
    S: tracing::Subscriber + for<'a> LookupSpan<'a>,
{
    let writer: fn() -> Stdout = io::stdout;
    build_formatter(
        config.format,
        writer,
        LayerOptions {
            ansi: config.with_ansi,
            target: config.with_target,
            thread_ids: config.with_thread_ids,
            line_numbers: config.with_line_numbers,
        },
    )
}

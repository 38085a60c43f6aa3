//! Logging initialisation.
//!
//! Call sites use the `tracing` macros directly; this module only wires the
//! subscriber: an env filter, a console sink and an optional rolling file
//! sink.

pub mod config;
mod filters;
mod formatter;
pub mod handle;
pub mod sinks;

pub use config::{ConsoleConfig, FileConfig, LogFormat, LoggingConfig};
pub use handle::LoggingHandle;
use plexus_error::{GenericError, PlexusResult, StatusCode};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, Layer, Registry};

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// Installs the global subscriber. Fails if one is already installed.
///
/// `RUST_LOG` takes precedence over the configured directive.
pub fn init_logging(config: &LoggingConfig) -> PlexusResult<LoggingHandle> {
    config.validate()?;

    let mut layers: Vec<BoxedLayer> = Vec::new();
    if config.console.enabled {
        layers.push(sinks::console::layer_with_config(&config.console));
    }
    let file_guard = if config.file.enabled {
        let (layer, guard) = sinks::file::layer_with_config(&config.file)?;
        layers.push(layer);
        Some(guard)
    } else {
        None
    };

    tracing_subscriber::registry()
        .with(layers)
        .with(filters::build_filter_from_config(config))
        .try_init()
        .map_err(|err| GenericError::new(StatusCode::Internal, format!("logging already initialised: {err}")))?;

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        level = %config.level,
        console = config.console.enabled,
        file = config.file.enabled,
        "logging initialised"
    );
    Ok(LoggingHandle::new(file_guard))
}

use std::fs;

use plexus_error::{PlexusResult, ResultExt};
use tracing_appender::{non_blocking, non_blocking::WorkerGuard, rolling};
use tracing_subscriber::{layer::Layer, registry::LookupSpan};

use crate::logging::{
    config::FileConfig,
    formatter::{build_formatter, LayerOptions},
};

/// Daily-rolling file layer. The returned guard flushes the background
/// writer when dropped and must outlive the subscriber.
pub fn layer_with_config<S>(
    config: &FileConfig
) -> PlexusResult<(Box<dyn Layer<S> + Send + Sync>, WorkerGuard)>
where
    S: tracing::Subscriber + for<'a> LookupSpan<'a>,
{
    fs::create_dir_all(&config.dir)
        .with_context(|| format!("creating log directory {}", config.dir.display()))?;

    let appender = rolling::daily(&config.dir, &config.prefix);
    let (writer, guard) = non_blocking(appender);
    let layer = build_formatter(
        config.format,
        writer,
        LayerOptions {
            ansi: false,
            target: true,
            thread_ids: true,
            line_numbers: true,
        },
    );
    Ok((layer, guard))
}

#[cfg(test)]
mod tests {
    use tracing_subscriber::{prelude::*, registry::Registry};

    use super::*;

    #[test]
    fn test_file_layer_writes_into_dir() {
        let dir = tempfile::tempdir().unwrap();
        let config = FileConfig {
            enabled: true,
            dir: dir.path().join("nested"),
            prefix: "test.log".to_string(),
            ..Default::default()
        };

        let (layer, guard) = layer_with_config::<Registry>(&config).unwrap();
        let subscriber = Registry::default().with(layer);
        tracing::subscriber::with_default(subscriber, || {
            tracing::info!(answer = 42, "written to file");
        });
        drop(guard);

        let files: Vec<_> = fs::read_dir(&config.dir).unwrap().collect();
        assert_eq!(files.len(), 1);
        let path = files[0].as_ref().unwrap().path();
        let contents = fs::read_to_string(path).unwrap();
        assert!(contents.contains("written to file"));
    }
}

use tracing_subscriber::EnvFilter;

use super::config::LoggingConfig;

/// `RUST_LOG` when set, otherwise the configured directive, otherwise
/// `info`.
pub fn build_filter_from_config(config: &LoggingConfig) -> EnvFilter {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return filter;
    }
    let directive = config.build_filter_directive();
    EnvFilter::try_new(&directive).unwrap_or_else(|err| {
        eprintln!("invalid log filter directive '{directive}': {err}; falling back to 'info'");
        EnvFilter::new("info")
    })
}

#[cfg(test)]
mod tests {
    use std::{
        env,
        sync::{Arc, Mutex},
    };

    use serial_test::serial;
    use tracing_subscriber::{fmt, prelude::*, registry::Registry};

    use super::*;

    // In-memory writer
    #[derive(Clone)]
    struct VecMakeWriter(Arc<Mutex<Vec<u8>>>);

    impl<'a> fmt::MakeWriter<'a> for VecMakeWriter {
        type Writer = VecWriterGuard;

        fn make_writer(&'a self) -> Self::Writer {
            VecWriterGuard(self.0.clone())
        }
    }

    struct VecWriterGuard(Arc<Mutex<Vec<u8>>>);

    impl std::io::Write for VecWriterGuard {
        fn write(
            &mut self,
            buf: &[u8],
        ) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    fn capture(filter: EnvFilter) -> String {
        let buffer = Arc::new(Mutex::new(Vec::new()));
        let layer = fmt::layer()
            .with_writer(VecMakeWriter(buffer.clone()))
            .with_ansi(false)
            .with_filter(filter);
        let subscriber = Registry::default().with(layer);
        tracing::subscriber::with_default(subscriber, || {
            tracing::info!("info message");
            tracing::warn!("warn message");
        });
        let out = buffer.lock().unwrap();
        String::from_utf8_lossy(&out).into_owned()
    }

    /// The configured directive filters out info.
    #[test]
    #[serial]
    fn test_config_directive_filters_levels() {
        env::remove_var("RUST_LOG");
        let config = LoggingConfig {
            level: "warn".to_string(),
            ..Default::default()
        };
        let out = capture(build_filter_from_config(&config));
        assert!(out.contains("warn message"));
        assert!(!out.contains("info message"));
    }

    #[test]
    #[serial]
    fn test_rust_log_overrides_config() {
        env::set_var("RUST_LOG", "info");
        let config = LoggingConfig {
            level: "error".to_string(),
            ..Default::default()
        };
        let out = capture(build_filter_from_config(&config));
        env::remove_var("RUST_LOG");
        assert!(out.contains("info message"));
    }

    /// An invalid directive falls back to "info".
    #[test]
    #[serial]
    fn test_invalid_directive_falls_back_to_info() {
        env::remove_var("RUST_LOG");
        let config = LoggingConfig {
            level: "plexus=verbose".to_string(),
            ..Default::default()
        };
        let out = capture(build_filter_from_config(&config));
        assert!(out.contains("info message"));
    }
}

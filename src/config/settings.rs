//! Runtime settings.
//!
//! Sources, later ones winning: built-in defaults, an optional file (format
//! from its extension), then `PLEXUS__SECTION__KEY` environment variables,
//! e.g. `PLEXUS__TRANSPORT__LOCK_TIMEOUT_MS=250`.

use std::{path::Path, time::Duration};

use config::{Config, Environment, File};
use plexus_error::{ensure, ConfigError, PlexusResult};
use serde::{Deserialize, Serialize};

use crate::{
    bus::DEFAULT_BUS_CAPACITY,
    logging::LoggingConfig,
    transport::{gateway::DEFAULT_MAX_BUFFER, PollerConfig, StoreConfig},
};

pub const ENV_PREFIX: &str = "PLEXUS";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportSettings {
    pub lock_timeout_ms: u64,
    pub bus_capacity: usize,
    pub gateway_max_buffer: usize,
}

impl Default for TransportSettings {
    fn default() -> Self {
        Self {
            lock_timeout_ms: 5_000,
            bus_capacity: DEFAULT_BUS_CAPACITY,
            gateway_max_buffer: DEFAULT_MAX_BUFFER,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollerSettings {
    pub interval_ms: u64,
    pub default_timeout_ms: u64,
}

impl Default for PollerSettings {
    fn default() -> Self {
        Self {
            interval_ms: 10,
            default_timeout_ms: 1_000,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub transport: TransportSettings,
    pub poller: PollerSettings,
    pub logging: LoggingConfig,
}

fn load_error(err: config::ConfigError) -> ConfigError {
    ConfigError::Load {
        reason: err.to_string(),
    }
}

fn invalid(
    field: &str,
    reason: &str,
) -> ConfigError {
    ConfigError::Invalid {
        field: field.to_string(),
        reason: reason.to_string(),
    }
}

impl Settings {
    /// Defaults plus environment overrides.
    pub fn load() -> PlexusResult<Self> {
        Self::load_from(None)
    }

    /// Defaults, then `path` if given (it must exist), then the
    /// environment.
    pub fn load_from(path: Option<&Path>) -> PlexusResult<Self> {
        let mut builder =
            Config::builder().add_source(Config::try_from(&Settings::default()).map_err(load_error)?);
        if let Some(path) = path {
            builder = builder.add_source(File::from(path).required(true));
        }
        let settings: Settings = builder
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(load_error)?
            .try_deserialize()
            .map_err(load_error)?;

        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> PlexusResult<()> {
        ensure!(
            self.transport.lock_timeout_ms > 0,
            invalid("transport.lock_timeout_ms", "must be positive")
        );
        ensure!(
            self.transport.bus_capacity > 0,
            invalid("transport.bus_capacity", "must be positive")
        );
        ensure!(
            self.transport.gateway_max_buffer > 0,
            invalid("transport.gateway_max_buffer", "must be positive")
        );
        ensure!(
            self.poller.interval_ms > 0,
            invalid("poller.interval_ms", "must be positive")
        );
        ensure!(
            self.poller.interval_ms <= self.poller.default_timeout_ms,
            invalid("poller.interval_ms", "must not exceed poller.default_timeout_ms")
        );
        self.logging.validate()
    }

    pub fn store_config(&self) -> StoreConfig {
        StoreConfig {
            lock_timeout: Duration::from_millis(self.transport.lock_timeout_ms),
        }
    }

    pub fn poller_config(&self) -> PollerConfig {
        PollerConfig {
            interval: Duration::from_millis(self.poller.interval_ms),
        }
    }

    pub fn default_poll_timeout(&self) -> Duration {
        Duration::from_millis(self.poller.default_timeout_ms)
    }
}

////////////////////////////////////////////////////////////////////////////////
// Tests
////////////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use std::{env, io::Write};

    use plexus_error::StatusCode;
    use serial_test::serial;

    use super::*;
    use crate::logging::LogFormat;

    fn clear_env() {
        for (key, _) in env::vars() {
            if key.starts_with("PLEXUS__") {
                env::remove_var(key);
            }
        }
    }

    fn toml_file(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    /// Defaults apply with no file and no environment.
    #[test]
    #[serial]
    fn test_defaults() {
        clear_env();
        let settings = Settings::load().unwrap();
        assert_eq!(settings, Settings::default());
        assert_eq!(settings.store_config().lock_timeout, Duration::from_secs(5));
        assert_eq!(settings.poller_config().interval, Duration::from_millis(10));
    }

    #[test]
    #[serial]
    fn test_file_overrides_defaults() {
        clear_env();
        let file = toml_file(
            r#"
            [transport]
            lock_timeout_ms = 250

            [poller]
            interval_ms = 5

            [logging]
            level = "debug"
            console = { format = "json" }
            "#,
        );
        let settings = Settings::load_from(Some(file.path())).unwrap();
        assert_eq!(settings.transport.lock_timeout_ms, 250);
        assert_eq!(settings.transport.bus_capacity, DEFAULT_BUS_CAPACITY);
        assert_eq!(settings.poller.interval_ms, 5);
        assert_eq!(settings.poller.default_timeout_ms, 1_000);
        assert_eq!(settings.logging.level, "debug");
        assert_eq!(settings.logging.console.format, LogFormat::Json);
    }

    /// Environment variables override the file.
    #[test]
    #[serial]
    fn test_env_overrides_file() {
        clear_env();
        let file = toml_file("[transport]\nlock_timeout_ms = 250\n");
        env::set_var("PLEXUS__TRANSPORT__LOCK_TIMEOUT_MS", "75");
        env::set_var("PLEXUS__POLLER__DEFAULT_TIMEOUT_MS", "20");
        let settings = Settings::load_from(Some(file.path()));
        clear_env();

        let settings = settings.unwrap();
        assert_eq!(settings.transport.lock_timeout_ms, 75);
        assert_eq!(settings.poller.default_timeout_ms, 20);
    }

    #[test]
    #[serial]
    fn test_missing_file_is_an_error() {
        clear_env();
        let err = Settings::load_from(Some(Path::new("/nonexistent/plexus.toml"))).unwrap_err();
        assert_eq!(err.status_code(), StatusCode::InvalidConfig);
    }

    #[test]
    #[serial]
    fn test_validation_rejects_zero_interval() {
        clear_env();
        env::set_var("PLEXUS__POLLER__INTERVAL_MS", "0");
        let result = Settings::load();
        clear_env();

        let err = result.unwrap_err();
        assert_eq!(err.status_code(), StatusCode::InvalidConfig);
        assert!(err.to_string().contains("poller.interval_ms"));
    }

    #[test]
    fn test_interval_longer_than_timeout_rejected() {
        let mut settings = Settings::default();
        settings.poller.interval_ms = 2_000;
        assert!(settings.validate().is_err());
    }
}

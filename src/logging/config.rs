use std::path::PathBuf;

use plexus_error::{ensure, ConfigError, PlexusResult};
use serde::{Deserialize, Serialize};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Json,
    Pretty,
    #[default]
    Compact,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsoleConfig {
    pub enabled: bool,
    pub format: LogFormat,
    pub with_ansi: bool,
    pub with_target: bool,
    pub with_thread_ids: bool,
    pub with_line_numbers: bool,
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            format: LogFormat::Compact,
            with_ansi: true,
            with_target: true,
            with_thread_ids: false,
            with_line_numbers: false,
        }
    }
}

/// Daily-rolling file sink written through a background worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    pub enabled: bool,
    pub dir: PathBuf,
    pub prefix: String,
    pub format: LogFormat,
}

impl Default for FileConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            dir: PathBuf::from("logs"),
            prefix: "plexus.log".to_string(),
            format: LogFormat::Json,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default level for every target.
    pub level: String,
    /// Extra `target=level` directives, e.g. `plexus::transport=trace`.
    pub directives: Vec<String>,
    pub console: ConsoleConfig,
    pub file: FileConfig,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            directives: Vec::new(),
            console: ConsoleConfig::default(),
            file: FileConfig::default(),
        }
    }
}

impl LoggingConfig {
    /// `level` followed by the extra directives, comma separated.
    pub fn build_filter_directive(&self) -> String {
        std::iter::once(self.level.as_str())
            .chain(self.directives.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(",")
    }

    pub fn validate(&self) -> PlexusResult<()> {
        let directive = self.build_filter_directive();
        if let Err(err) = EnvFilter::try_new(&directive) {
            return Err(ConfigError::Invalid {
                field: "logging.directives".to_string(),
                reason: format!("'{directive}': {err}"),
            }
            .into());
        }
        ensure!(
            !self.file.enabled || !self.file.prefix.is_empty(),
            ConfigError::Invalid {
                field: "logging.file.prefix".to_string(),
                reason: "must not be empty when the file sink is enabled".to_string(),
            }
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use plexus_error::StatusCode;

    use super::*;

    #[test]
    fn test_default_directive() {
        assert_eq!(LoggingConfig::default().build_filter_directive(), "info");
    }

    #[test]
    fn test_directive_with_targets() {
        let config = LoggingConfig {
            level: "warn".to_string(),
            directives: vec!["plexus::transport=trace".to_string(), "plexus::bus=debug".to_string()],
            ..Default::default()
        };
        assert_eq!(
            config.build_filter_directive(),
            "warn,plexus::transport=trace,plexus::bus=debug"
        );
        assert!(config.validate().is_ok());
    }

    /// Validation rejects an unparsable directive.
    #[test]
    fn test_invalid_directive_rejected() {
        let config = LoggingConfig {
            level: "plexus=verbose".to_string(),
            ..Default::default()
        };
        let err = config.validate().unwrap_err();
        assert_eq!(err.status_code(), StatusCode::InvalidConfig);
    }

    #[test]
    fn test_empty_file_prefix_rejected() {
        let mut config = LoggingConfig::default();
        config.file.enabled = true;
        config.file.prefix.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_deserialize_partial() {
        let config: LoggingConfig =
            serde_json::from_str(r#"{"level":"debug","console":{"format":"json"}}"#).unwrap();
        assert_eq!(config.level, "debug");
        assert_eq!(config.console.format, LogFormat::Json);
        assert!(config.console.enabled);
        assert!(!config.file.enabled);
    }
}

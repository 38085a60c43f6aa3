use std::any::Any;

use thiserror::Error;

use crate::{ErrorExt, StatusCode};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {reason}")]
    Load { reason: String },

    #[error("invalid value for '{field}': {reason}")]
    Invalid { field: String, reason: String },
}

impl ErrorExt for ConfigError {
    fn status_code(&self) -> StatusCode {
        StatusCode::InvalidConfig
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

use std::any::Any;

use thiserror::Error;

use crate::{ErrorExt, StatusCode};

/// Failures of the serialize/parse dispatch.
///
/// Every variant describes a single message: callers drop that message, log
/// it and keep going.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MarshallingError {
    /// No parser is known for the scheme id (dynamic path only).
    #[error("unknown marshalling scheme {scheme}")]
    UnknownScheme { scheme: i32 },

    /// The message id is absent from the dialect registry.
    #[error("message id {msg_id} is not registered, unable to validate CRC")]
    UnknownMessageId { msg_id: u32 },

    #[error("bad checksum for message id {msg_id}: expected {expected:#06x}, got {actual:#06x}")]
    BadChecksum {
        msg_id: u32,
        expected: u16,
        actual: u16,
    },

    #[error("bad signature for message id {msg_id}")]
    BadSignature { msg_id: u32 },

    /// More bytes are needed before a complete message can be framed.
    #[error("incomplete message: need {needed} more byte(s)")]
    Incomplete { needed: usize },

    #[error("malformed {type_name}: {reason}")]
    Malformed { type_name: String, reason: String },

    #[error("type mismatch: expected {expected}, got {actual}")]
    TypeMismatch { expected: String, actual: String },

    #[error("failed to serialize {type_name}: {reason}")]
    Serialize { type_name: String, reason: String },

    #[error("payload too large: {size} bytes (max {max})")]
    TooLarge { size: usize, max: usize },
}

impl MarshallingError {
    pub fn malformed(
        type_name: impl Into<String>,
        reason: impl ToString,
    ) -> Self {
        Self::Malformed {
            type_name: type_name.into(),
            reason: reason.to_string(),
        }
    }

    pub fn serialize(
        type_name: impl Into<String>,
        reason: impl ToString,
    ) -> Self {
        Self::Serialize {
            type_name: type_name.into(),
            reason: reason.to_string(),
        }
    }
}

impl ErrorExt for MarshallingError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::UnknownScheme { .. } => StatusCode::UnknownScheme,
            Self::UnknownMessageId { .. } => StatusCode::UnknownMessageId,
            Self::BadChecksum { .. } => StatusCode::BadChecksum,
            Self::BadSignature { .. } => StatusCode::BadSignature,
            Self::Incomplete { .. } => StatusCode::IncompleteFrame,
            Self::Malformed { .. } | Self::TypeMismatch { .. } => {
                StatusCode::DeserializationFailed
            }
            Self::Serialize { .. } => StatusCode::SerializationFailed,
            Self::TooLarge { .. } => StatusCode::SizeLimit,
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

use std::any::Any;

use thiserror::Error;

use crate::{ErrorExt, MarshallingError, StatusCode};

/// Errors of the publish/subscribe transporters.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// User traffic attempted on a group reserved for forwarding.
    #[error("group '{group}' is reserved for internal forwarding")]
    ReservedGroup { group: String },

    #[error("invalid pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },

    /// A partition lock could not be taken in time. The only hard failure.
    #[error("subscription store lock not acquired within {waited_ms}ms")]
    LockTimeout { waited_ms: u64 },

    #[error("envelope codec error: {reason}")]
    EnvelopeCodec { reason: String },

    #[error("boundary '{name}' is closed")]
    BoundaryClosed { name: String },

    #[error(transparent)]
    Marshalling(#[from] MarshallingError),
}

impl ErrorExt for TransportError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::ReservedGroup { .. } => StatusCode::ReservedGroup,
            Self::InvalidPattern { .. } => StatusCode::InvalidPattern,
            Self::LockTimeout { .. } => StatusCode::LockTimeout,
            Self::EnvelopeCodec { .. } => StatusCode::CorruptedData,
            Self::BoundaryClosed { .. } => StatusCode::BoundaryClosed,
            Self::Marshalling(inner) => inner.status_code(),
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

pub mod config;
pub mod marshalling;
pub mod transport;

pub use config::*;
pub use marshalling::*;
pub use transport::*;

use crate::{ErrorExt, StatusCode};

/// Universal error carrying a code and a message.
#[derive(Debug, Clone)]
pub struct GenericError {
    code: StatusCode,
    message: String,
}

impl GenericError {
    pub fn new(
        code: StatusCode,
        message: impl Into<String>,
    ) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl std::fmt::Display for GenericError {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for GenericError {}

impl ErrorExt for GenericError {
    fn status_code(&self) -> StatusCode {
        self.code
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}

/// I/O failures (log directories, settings files) keep their kind as a code.
impl From<std::io::Error> for crate::StackError {
    fn from(err: std::io::Error) -> Self {
        let code = match err.kind() {
            std::io::ErrorKind::NotFound => StatusCode::NotFound,
            std::io::ErrorKind::TimedOut => StatusCode::Timeout,
            std::io::ErrorKind::InvalidInput => StatusCode::InvalidArgs,
            _ => StatusCode::Io,
        };
        crate::StackError::new(GenericError::new(code, err.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use std::io;

    use super::*;

    #[test]
    fn test_generic_error_basic() {
        let err = GenericError::new(StatusCode::InvalidArgs, "test message");
        assert_eq!(err.status_code(), StatusCode::InvalidArgs);
        assert_eq!(err.to_string(), "test message");
    }

    #[test]
    fn test_io_error_kind_mapping() {
        let cases = [
            (io::ErrorKind::NotFound, StatusCode::NotFound, "no file"),
            (io::ErrorKind::TimedOut, StatusCode::Timeout, "timeout"),
            (io::ErrorKind::Other, StatusCode::Io, "other"),
        ];

        for (kind, expected_code, msg) in cases {
            let stack: crate::StackError = io::Error::new(kind, msg).into();
            assert_eq!(stack.status_code(), expected_code, "kind={kind:?}");
            assert!(stack.to_string().contains(msg));
        }
    }
}

use std::{any::Any, error::Error};

use crate::StatusCode;

/// What every plexus error exposes beyond `std::error::Error`: a status code
/// and downcasting once it is boxed inside a [`StackError`](crate::StackError).
pub trait ErrorExt: Error + Send + Sync + 'static {
    /// Defaults to [`StatusCode::Internal`].
    fn status_code(&self) -> StatusCode {
        StatusCode::Internal
    }

    fn as_any(&self) -> &dyn Any;
}

#[cfg(test)]
mod tests {
    use std::fmt;

    use super::*;

    #[derive(Debug)]
    struct Plain;

    impl fmt::Display for Plain {
        fn fmt(
            &self,
            f: &mut fmt::Formatter<'_>,
        ) -> fmt::Result {
            f.write_str("plain")
        }
    }

    impl Error for Plain {}

    impl ErrorExt for Plain {
        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    #[test]
    fn test_default_status_code_is_internal() {
        assert_eq!(Plain.status_code(), StatusCode::Internal);
        assert!(Plain.as_any().downcast_ref::<Plain>().is_some());
    }
}

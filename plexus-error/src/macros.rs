/// Returns early with a `StackError` (like `anyhow::bail!`).
///
/// - `bail!(err)` takes any `StackError`-compatible error;
/// - `bail!(code, "msg")` builds a `GenericError`;
/// - `bail!(code, "fmt {}", arg)` formats the message.
///
/// ```ignore
/// use plexus_error::{bail, StatusCode};
///
/// fn check_interval(ms: u64) -> plexus_error::PlexusResult<()> {
///     if ms == 0 {
///         bail!(StatusCode::InvalidConfig, "poll interval must be positive");
///     }
///     Ok(())
/// }
/// ```
#[macro_export]
macro_rules! bail {
    ($err:expr) => {
        return Err($crate::StackError::from($err))
    };
    ($code:expr, $msg:expr) => {
        return Err($crate::StackError::new(
            $crate::types::GenericError::new($code, $msg)
        ))
    };
    ($code:expr, $fmt:expr, $($arg:tt)*) => {
        return Err($crate::StackError::new(
            $crate::types::GenericError::new($code, format!($fmt, $($arg)*))
        ))
    };
}

/// Calls `bail!` when the condition is false. Same forms as `bail!`.
#[macro_export]
macro_rules! ensure {
    ($cond:expr, $err:expr) => {
        if !($cond) {
            $crate::bail!($err);
        }
    };
    ($cond:expr, $code:expr, $msg:expr) => {
        if !($cond) {
            $crate::bail!($code, $msg);
        }
    };
    ($cond:expr, $code:expr, $fmt:expr, $($arg:tt)*) => {
        if !($cond) {
            $crate::bail!($code, $fmt, $($arg)*);
        }
    };
}

/// Adds `.context(..)` / `.with_context(..)` to any `Result` whose error
/// converts into [`StackError`](crate::StackError).
pub trait ResultExt<T> {
    fn context<C>(
        self,
        ctx: C,
    ) -> Result<T, crate::StackError>
    where
        C: Into<String>;

    /// Lazy variant: the closure only runs on error.
    fn with_context<C, F>(
        self,
        f: F,
    ) -> Result<T, crate::StackError>
    where
        C: Into<String>,
        F: FnOnce() -> C;
}

impl<T, E> ResultExt<T> for Result<T, E>
where
    E: Into<crate::StackError>,
{
    #[track_caller]
    fn context<C>(
        self,
        ctx: C,
    ) -> Result<T, crate::StackError>
    where
        C: Into<String>,
    {
        // No closure here: `#[track_caller]` does not reach into one.
        match self {
            Ok(value) => Ok(value),
            Err(e) => Err(e.into().context(ctx)),
        }
    }

    #[track_caller]
    fn with_context<C, F>(
        self,
        f: F,
    ) -> Result<T, crate::StackError>
    where
        C: Into<String>,
        F: FnOnce() -> C,
    {
        match self {
            Ok(value) => Ok(value),
            Err(e) => Err(e.into().context(f())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{GenericError, PlexusResult, StatusCode};

    #[test]
    fn test_bail_with_format() {
        fn example(value: u64) -> PlexusResult<()> {
            bail!(StatusCode::InvalidConfig, "bad interval: {}", value);
        }

        let err = example(0).unwrap_err();
        assert!(err.to_string().contains("bad interval: 0"));
        assert_eq!(err.status_code(), StatusCode::InvalidConfig);
    }

    #[test]
    fn test_ensure() {
        fn validate(x: u64) -> PlexusResult<()> {
            ensure!(x > 0, StatusCode::InvalidConfig, "must be positive");
            ensure!(x < 100, StatusCode::InvalidConfig, "too large: {}", x);
            Ok(())
        }

        assert!(validate(50).is_ok());
        assert!(validate(0).is_err());
        assert!(validate(150).is_err());
    }

    #[test]
    fn test_result_ext() {
        fn inner() -> Result<(), GenericError> {
            Err(GenericError::new(StatusCode::Internal, "inner error"))
        }

        fn outer() -> PlexusResult<()> {
            inner().context("outer context")?;
            Ok(())
        }

        let err = outer().unwrap_err();
        assert_eq!(err.trail().len(), 1);
        assert_eq!(err.trail()[0].message, "outer context");
        assert_eq!(err.trail()[0].location.file(), file!());
    }

    #[test]
    fn test_with_context_lazy() {
        let mut called = false;
        let ok: Result<(), GenericError> = Ok(());
        let _ = ok.with_context(|| {
            called = true;
            "never"
        });
        assert!(!called);
    }
}

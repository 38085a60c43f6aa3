use std::{fmt, panic::Location, sync::Arc};

use crate::{ErrorExt, StatusCode};

/// A root error plus the trail of notes added while it travelled outward
/// (`read settings file` inside `load settings`, and so on).
///
/// Cloning is cheap: the root is shared and notes are few.
#[derive(Clone)]
pub struct StackError {
    root: Arc<dyn ErrorExt>,
    trail: Vec<Note>,
}

/// One step of the trail and the line that added it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Note {
    pub message: String,
    pub location: &'static Location<'static>,
}

impl fmt::Display for Note {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        write!(
            f,
            "{} ({}:{})",
            self.message,
            self.location.file(),
            self.location.line()
        )
    }
}

impl StackError {
    pub fn new<E: ErrorExt>(err: E) -> Self {
        Self {
            root: Arc::new(err),
            trail: Vec::new(),
        }
    }

    #[track_caller]
    pub fn context(
        mut self,
        message: impl Into<String>,
    ) -> Self {
        self.trail.push(Note {
            message: message.into(),
            location: Location::caller(),
        });
        self
    }

    /// Code of the root error; notes never change it.
    pub fn status_code(&self) -> StatusCode {
        self.root.status_code()
    }

    /// Innermost note first.
    pub fn trail(&self) -> &[Note] {
        &self.trail
    }

    pub fn downcast_ref<T: ErrorExt>(&self) -> Option<&T> {
        self.root.as_any().downcast_ref::<T>()
    }
}

impl fmt::Debug for StackError {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("StackError")
            .field("status_code", &self.status_code())
            .field("root", &self.root.to_string())
            .field(
                "trail",
                &self.trail.iter().map(Note::to_string).collect::<Vec<_>>(),
            )
            .finish()
    }
}

/// Outermost note first, root error last: `load settings: read file: ...`.
impl fmt::Display for StackError {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        for note in self.trail.iter().rev() {
            write!(f, "{}: ", note.message)?;
        }
        write!(f, "{}", self.root)
    }
}

impl std::error::Error for StackError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(self.root.as_ref())
    }
}

impl<E: ErrorExt> From<E> for StackError {
    fn from(e: E) -> Self {
        StackError::new(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ConfigError, MarshallingError, TransportError};

    #[test]
    fn test_trail_records_callers() {
        let err = StackError::new(TransportError::LockTimeout { waited_ms: 50 })
            .context("subscribe")
            .context("forwarder setup");

        let trail = err.trail();
        assert_eq!(trail.len(), 2);
        assert_eq!(trail[0].message, "subscribe");
        assert_eq!(trail[0].location.file(), file!());
        assert_eq!(err.status_code(), StatusCode::LockTimeout);
    }

    #[test]
    fn test_downcast_to_root() {
        let err = StackError::new(MarshallingError::UnknownScheme { scheme: 42 });
        assert!(err.downcast_ref::<MarshallingError>().is_some());
        assert!(err.downcast_ref::<TransportError>().is_none());
    }

    #[test]
    fn test_display_outermost_first() {
        let err = StackError::from(ConfigError::Load {
            reason: "missing file".into(),
        })
        .context("read settings.toml")
        .context("load settings");

        assert_eq!(
            err.to_string(),
            "load settings: read settings.toml: failed to load configuration: missing file"
        );
    }
}

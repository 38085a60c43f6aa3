use std::fmt;

use num_enum::TryFromPrimitive;

/// Status codes used to categorize errors.
///
/// # Ranges
/// - 0xxx: success
/// - 1xxx: general errors
/// - 2xxx: data / addressing errors
/// - 5xxx: marshalling (serialize / parse)
/// - 6xxx: transport and resources
/// - 8xxx: protocol / framing
///
/// `num_enum::TryFromPrimitive` provides `TryFrom<u32>` for codes read back
/// from a number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, TryFromPrimitive)]
#[repr(u32)]
#[non_exhaustive]
pub enum StatusCode {
    // 0xxx: success
    Success = 0,

    // 1xxx: general
    Unknown = 1000,
    Unsupported = 1001,
    Internal = 1003,
    InvalidArgs = 1004,
    InvalidConfig = 1005,

    // 2xxx: data / addressing
    NotFound = 2000,
    InvalidGroup = 2001,
    ReservedGroup = 2002,
    InvalidPattern = 2003,

    // 5xxx: marshalling
    UnknownScheme = 5000,
    SerializationFailed = 5003,
    DeserializationFailed = 5004,
    CorruptedData = 5005,

    // 6xxx: transport / resources
    Io = 6000,
    Timeout = 6002,
    LockTimeout = 6003,
    BoundaryClosed = 6004,

    // 8xxx: protocol / framing
    InvalidFrame = 8000,
    BadChecksum = 8001,
    BadSignature = 8002,
    UnknownMessageId = 8003,
    IncompleteFrame = 8004,
    SizeLimit = 8007,
}

impl StatusCode {
    pub const fn code(self) -> u32 {
        self as u32
    }

    /// Per-message failures: the message is dropped, processing continues.
    pub fn is_transient(&self) -> bool {
        let c = self.code();
        (5000..=5999).contains(&c) || (8000..=8999).contains(&c)
    }

    /// Resource-level failures: the caller cannot make progress and must be
    /// told, even on paths that otherwise log and carry on.
    pub fn is_critical(&self) -> bool {
        matches!(self, Self::Internal | Self::LockTimeout | Self::BoundaryClosed)
    }
}

impl From<StatusCode> for u32 {
    fn from(c: StatusCode) -> Self {
        c.code()
    }
}

impl fmt::Display for StatusCode {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        write!(f, "{:?} ({})", self, self.code())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_vs_critical() {
        assert!(StatusCode::BadChecksum.is_transient());
        assert!(StatusCode::UnknownScheme.is_transient());
        assert!(!StatusCode::InvalidConfig.is_transient());
        assert!(!StatusCode::LockTimeout.is_transient());
        assert!(StatusCode::LockTimeout.is_critical());
        assert!(StatusCode::BoundaryClosed.is_critical());
        assert!(!StatusCode::BadChecksum.is_critical());
    }

    #[test]
    fn test_round_trip_through_u32() {
        let n = u32::from(StatusCode::BadChecksum);
        assert_eq!(n, 8001);
        assert_eq!(StatusCode::try_from(n).unwrap(), StatusCode::BadChecksum);
        assert!(StatusCode::try_from(99_999).is_err());
    }

    #[test]
    fn test_display_has_name_and_code() {
        assert_eq!(StatusCode::LockTimeout.to_string(), "LockTimeout (6003)");
    }
}

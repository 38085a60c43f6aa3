use std::fmt;

use serde::{Deserialize, Serialize};

/// Numeric identifier of a wire encoding.
///
/// The set is open: registries and dynamic parsers may know ids that have no
/// named constant here.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Scheme(i32);

impl Scheme {
    /// NUL-terminated UTF-8 strings.
    pub const CSTR: Scheme = Scheme(0);
    pub const BINCODE: Scheme = Scheme(1);
    pub const CBOR: Scheme = Scheme(3);
    pub const MSGPACK: Scheme = Scheme(4);
    /// Checksummed binary frames with a message-id dialect.
    pub const FRAMED: Scheme = Scheme(6);
    pub const JSON: Scheme = Scheme(7);

    #[inline]
    pub const fn new(id: i32) -> Self {
        Scheme(id)
    }

    #[inline]
    pub const fn id(self) -> i32 {
        self.0
    }

    /// Name of a built-in scheme, `None` for ids without a constant.
    pub fn name(self) -> Option<&'static str> {
        match self {
            Self::CSTR => Some("CSTR"),
            Self::BINCODE => Some("BINCODE"),
            Self::CBOR => Some("CBOR"),
            Self::MSGPACK => Some("MSGPACK"),
            Self::FRAMED => Some("FRAMED"),
            Self::JSON => Some("JSON"),
            _ => None,
        }
    }

    /// Reverse of [`Scheme::name`], case-insensitive.
    pub fn from_name(name: &str) -> Option<Self> {
        [
            Self::CSTR,
            Self::BINCODE,
            Self::CBOR,
            Self::MSGPACK,
            Self::FRAMED,
            Self::JSON,
        ]
        .into_iter()
        .find(|s| s.name().is_some_and(|n| n.eq_ignore_ascii_case(name)))
    }
}

impl fmt::Display for Scheme {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        match self.name() {
            Some(name) => f.write_str(name),
            None => write!(f, "{}", self.0),
        }
    }
}

impl fmt::Debug for Scheme {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        write!(f, "Scheme({}={})", self, self.0)
    }
}

/// Compile-time marker for a scheme, used as the type parameter of
/// [`SerializerParser`](super::SerializerParser).
pub trait MarshallingScheme: Send + Sync + 'static {
    const SCHEME: Scheme;
}

macro_rules! marker {
    ($(#[$meta:meta])* $name:ident => $scheme:expr) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
        pub struct $name;

        impl MarshallingScheme for $name {
            const SCHEME: Scheme = $scheme;
        }
    };
}

marker!(
    /// Marker for [`Scheme::CSTR`].
    Cstr => Scheme::CSTR
);
marker!(Bincode => Scheme::BINCODE);
marker!(Cbor => Scheme::CBOR);
marker!(MsgPack => Scheme::MSGPACK);
marker!(
    /// Marker for [`Scheme::FRAMED`].
    Framed => Scheme::FRAMED
);
marker!(Json => Scheme::JSON);

use std::borrow::Cow;

use plexus_error::MarshallingError;

use super::MarshallingScheme;

/// Result of a successful parse: the value and how many input bytes it
/// took, so stream readers can advance past exactly one message.
#[derive(Debug, Clone, PartialEq)]
pub struct Parsed<T> {
    pub value: T,
    pub consumed: usize,
}

impl<T> Parsed<T> {
    pub fn new(
        value: T,
        consumed: usize,
    ) -> Self {
        Self { value, consumed }
    }
}

/// Stable wire name for serde-based types.
///
/// Implement this once per type to get the JSON, MessagePack, CBOR and
/// bincode schemes for free.
pub trait Named {
    const TYPE_NAME: &'static str;
}

/// Serializer/parser for `Self` under scheme `S`.
///
/// Resolved at compile time: the transporter picks the impl from the value
/// type and the scheme marker, so no lookup happens at runtime. Types that
/// travel under several schemes implement this once per scheme.
pub trait SerializerParser<S: MarshallingScheme>: Sized + Send + Sync + 'static {
    /// Type name carried on the wire and used to key subscriptions.
    fn type_name() -> Cow<'static, str>;

    /// Type name of a particular value. Must agree with [`type_name`] for
    /// subscribers to see the publication.
    ///
    /// [`type_name`]: SerializerParser::type_name
    fn type_name_of(&self) -> Cow<'static, str> {
        Self::type_name()
    }

    fn serialize(&self) -> Result<Vec<u8>, MarshallingError>;

    /// Decodes one value from the front of `bytes`.
    ///
    /// `type_name` is the name that arrived with the bytes; parsers that
    /// cover several types use it to pick one.
    fn parse(
        bytes: &[u8],
        type_name: &str,
    ) -> Result<Parsed<Self>, MarshallingError>;
}

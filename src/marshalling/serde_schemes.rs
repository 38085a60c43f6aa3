//! Self-describing and compact encodings backed by serde.
//!
//! Any `Serialize + DeserializeOwned + Named` type travels under JSON,
//! MessagePack, CBOR and bincode without further code.

use std::{
    borrow::Cow,
    io::{self, Cursor},
};

use bincode::Options;
use plexus_error::MarshallingError;
use serde::{de::DeserializeOwned, de::IgnoredAny, Serialize};

use super::{Bincode, Cbor, Json, MsgPack, Named, Parsed, SerializerParser};

////////////////////////////////////////////////////////////////////////////////
// JSON
////////////////////////////////////////////////////////////////////////////////

pub(crate) fn decode_json<T: DeserializeOwned>(
    bytes: &[u8],
    type_name: &str,
) -> Result<Parsed<T>, MarshallingError> {
    let mut stream = serde_json::Deserializer::from_slice(bytes).into_iter::<T>();
    match stream.next() {
        Some(Ok(value)) => Ok(Parsed::new(value, stream.byte_offset())),
        Some(Err(e)) if e.is_eof() => Err(MarshallingError::Incomplete { needed: 1 }),
        Some(Err(e)) => Err(MarshallingError::malformed(type_name, e)),
        None => Err(MarshallingError::Incomplete { needed: 1 }),
    }
}

/// Length of the first JSON value in `bytes`, without building it.
pub(crate) fn frame_json(bytes: &[u8]) -> Result<usize, MarshallingError> {
    decode_json::<IgnoredAny>(bytes, "JSON").map(|p| p.consumed)
}

////////////////////////////////////////////////////////////////////////////////
// MessagePack
////////////////////////////////////////////////////////////////////////////////

fn is_eof(err: &io::Error) -> bool {
    err.kind() == io::ErrorKind::UnexpectedEof
}

pub(crate) fn decode_msgpack<T: DeserializeOwned>(
    bytes: &[u8],
    type_name: &str,
) -> Result<Parsed<T>, MarshallingError> {
    use rmp_serde::decode::Error;

    let mut cursor = Cursor::new(bytes);
    let result = {
        let mut de = rmp_serde::Deserializer::new(&mut cursor);
        T::deserialize(&mut de)
    };
    match result {
        Ok(value) => Ok(Parsed::new(value, cursor.position() as usize)),
        Err(Error::InvalidMarkerRead(ref e) | Error::InvalidDataRead(ref e)) if is_eof(e) => {
            Err(MarshallingError::Incomplete { needed: 1 })
        }
        Err(e) => Err(MarshallingError::malformed(type_name, e)),
    }
}

pub(crate) fn frame_msgpack(bytes: &[u8]) -> Result<usize, MarshallingError> {
    decode_msgpack::<IgnoredAny>(bytes, "MSGPACK").map(|p| p.consumed)
}

////////////////////////////////////////////////////////////////////////////////
// CBOR
////////////////////////////////////////////////////////////////////////////////

pub(crate) fn decode_cbor<T: DeserializeOwned>(
    bytes: &[u8],
    type_name: &str,
) -> Result<Parsed<T>, MarshallingError> {
    let mut de = serde_cbor::Deserializer::from_slice(bytes);
    match T::deserialize(&mut de) {
        Ok(value) => Ok(Parsed::new(value, de.byte_offset())),
        Err(e) if e.is_eof() => Err(MarshallingError::Incomplete { needed: 1 }),
        Err(e) => Err(MarshallingError::malformed(type_name, e)),
    }
}

pub(crate) fn frame_cbor(bytes: &[u8]) -> Result<usize, MarshallingError> {
    decode_cbor::<IgnoredAny>(bytes, "CBOR").map(|p| p.consumed)
}

////////////////////////////////////////////////////////////////////////////////
// bincode
////////////////////////////////////////////////////////////////////////////////

/// Options matching `bincode::serialize`, with reads capped at `limit`
/// bytes so a forged length prefix cannot force a huge allocation.
pub(crate) fn bounded_bincode(limit: usize) -> impl Options {
    bincode::DefaultOptions::new()
        .with_fixint_encoding()
        .allow_trailing_bytes()
        .with_limit(limit as u64)
}

pub(crate) fn decode_bincode<T: DeserializeOwned>(
    bytes: &[u8],
    type_name: &str,
) -> Result<Parsed<T>, MarshallingError> {
    let mut rest = bytes;
    match bounded_bincode(bytes.len()).deserialize_from::<_, T>(&mut rest) {
        Ok(value) => Ok(Parsed::new(value, bytes.len() - rest.len())),
        Err(e) => match e.as_ref() {
            bincode::ErrorKind::Io(io) if is_eof(io) => {
                Err(MarshallingError::Incomplete { needed: 1 })
            }
            // A length larger than the buffer: the rest may still arrive.
            bincode::ErrorKind::SizeLimit => Err(MarshallingError::Incomplete { needed: 1 }),
            _ => Err(MarshallingError::malformed(type_name, e)),
        },
    }
}

////////////////////////////////////////////////////////////////////////////////
// Blanket impls
////////////////////////////////////////////////////////////////////////////////

macro_rules! serde_scheme {
    ($marker:ty, $encode:expr, $decode:path) => {
        impl<T> SerializerParser<$marker> for T
        where
            T: Serialize + DeserializeOwned + Named + Send + Sync + 'static,
        {
            fn type_name() -> Cow<'static, str> {
                Cow::Borrowed(T::TYPE_NAME)
            }

            fn serialize(&self) -> Result<Vec<u8>, MarshallingError> {
                let encode = $encode;
                encode(self).map_err(|e| MarshallingError::serialize(T::TYPE_NAME, e))
            }

            fn parse(
                bytes: &[u8],
                _type_name: &str,
            ) -> Result<Parsed<Self>, MarshallingError> {
                $decode(bytes, T::TYPE_NAME)
            }
        }
    };
}

serde_scheme!(Json, |v: &T| serde_json::to_vec(v), decode_json);
serde_scheme!(MsgPack, |v: &T| rmp_serde::to_vec_named(v), decode_msgpack);
serde_scheme!(Cbor, |v: &T| serde_cbor::to_vec(v), decode_cbor);
serde_scheme!(Bincode, |v: &T| bincode::serialize(v), decode_bincode);

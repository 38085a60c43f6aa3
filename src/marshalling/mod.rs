//! Serializer/parser dispatch.
//!
//! - `scheme`: scheme ids and the compile-time scheme markers.
//! - `traits`: the [`SerializerParser`] trait resolved at compile time.
//! - `cstr`, `serde_schemes`, `frame`: the built-in encodings.
//! - `registry`: runtime table of schemes and frame dialects.
//! - `dynamic`: scheme dispatch for bytes whose type is only known at
//!   runtime.

pub mod cstr;
pub mod dynamic;
pub mod frame;
pub mod registry;
pub mod scheme;
mod serde_schemes;
pub mod traits;

pub use dynamic::{DynamicParser, FrameInfo};
pub use frame::{FramedMessage, RawFrame, SigningKey, Tagged};
pub use registry::{MessageEntry, SchemeRegistry};
pub use scheme::{Bincode, Cbor, Cstr, Framed, Json, MarshallingScheme, MsgPack, Scheme};
pub use traits::{Named, Parsed, SerializerParser};
pub(crate) use serde_schemes::bounded_bincode;

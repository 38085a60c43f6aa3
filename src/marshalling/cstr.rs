//! NUL-terminated string scheme.

use std::borrow::Cow;

use plexus_error::MarshallingError;

use super::{Cstr, Parsed, SerializerParser};

pub const CSTR_TYPE_NAME: &str = "CSTR";

/// Finds one NUL-terminated UTF-8 string at the front of `bytes`.
///
/// Returns the text (without terminator) and the bytes consumed including
/// the terminator.
pub(crate) fn frame_cstr(bytes: &[u8]) -> Result<(&str, usize), MarshallingError> {
    let end = memchr::memchr(0, bytes).ok_or(MarshallingError::Incomplete { needed: 1 })?;
    let text = std::str::from_utf8(&bytes[..end])
        .map_err(|e| MarshallingError::malformed(CSTR_TYPE_NAME, e))?;
    Ok((text, end + 1))
}

impl SerializerParser<Cstr> for String {
    fn type_name() -> Cow<'static, str> {
        Cow::Borrowed(CSTR_TYPE_NAME)
    }

    fn serialize(&self) -> Result<Vec<u8>, MarshallingError> {
        if memchr::memchr(0, self.as_bytes()).is_some() {
            return Err(MarshallingError::serialize(
                CSTR_TYPE_NAME,
                "string contains an interior NUL byte",
            ));
        }
        let mut out = Vec::with_capacity(self.len() + 1);
        out.extend_from_slice(self.as_bytes());
        out.push(0);
        Ok(out)
    }

    fn parse(
        bytes: &[u8],
        _type_name: &str,
    ) -> Result<Parsed<Self>, MarshallingError> {
        let (text, consumed) = frame_cstr(bytes)?;
        Ok(Parsed::new(text.to_owned(), consumed))
    }
}

//! Runtime dispatch on a scheme id.
//!
//! Used where the static type is unknown: stream gateways and relays that
//! only see bytes plus a scheme id. The parser frames one message and
//! validates what the scheme allows to be validated, it never builds a
//! typed value.

use std::sync::Arc;

use plexus_error::MarshallingError;
use tracing::{debug, warn};

use super::{
    cstr::{frame_cstr, CSTR_TYPE_NAME},
    frame::RawFrame,
    serde_schemes::{frame_cbor, frame_json, frame_msgpack},
    Parsed, Scheme, SchemeRegistry,
};

/// One message located at the front of a buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameInfo {
    pub type_name: String,
    pub consumed: usize,
}

#[derive(Debug, Clone)]
pub struct DynamicParser {
    registry: Arc<SchemeRegistry>,
}

impl DynamicParser {
    pub fn new(registry: Arc<SchemeRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Arc<SchemeRegistry> {
        &self.registry
    }

    /// Locates and validates one message of `scheme` at the front of
    /// `bytes`.
    ///
    /// `type_name` is used for schemes whose bytes do not carry a type;
    /// frame schemes report the message id instead. Bincode is not
    /// self-describing, so the whole input is taken as one message.
    pub fn frame(
        &self,
        scheme: Scheme,
        type_name: &str,
        bytes: &[u8],
    ) -> Result<FrameInfo, MarshallingError> {
        if !self.registry.knows_scheme(scheme) {
            return Err(MarshallingError::UnknownScheme {
                scheme: scheme.id(),
            });
        }

        let with_name = |consumed| FrameInfo {
            type_name: type_name.to_owned(),
            consumed,
        };

        match scheme {
            Scheme::CSTR => frame_cstr(bytes).map(|(_, consumed)| FrameInfo {
                type_name: CSTR_TYPE_NAME.to_owned(),
                consumed,
            }),
            Scheme::JSON => frame_json(bytes).map(with_name),
            Scheme::MSGPACK => frame_msgpack(bytes).map(with_name),
            Scheme::CBOR => frame_cbor(bytes).map(with_name),
            Scheme::BINCODE if bytes.is_empty() => Err(MarshallingError::Incomplete { needed: 1 }),
            Scheme::BINCODE => Ok(with_name(bytes.len())),
            Scheme::FRAMED => self.parse_frame(scheme, bytes).map(|p| FrameInfo {
                type_name: p.value.msg_id.to_string(),
                consumed: p.consumed,
            }),
            // Known to the registry but not built in: only checksummed
            // dialects can be registered at runtime.
            other => self.parse_frame(other, bytes).map(|p| FrameInfo {
                type_name: p.value.msg_id.to_string(),
                consumed: p.consumed,
            }),
        }
    }

    /// Splits and fully validates one checksummed frame of `scheme`.
    pub fn parse_frame(
        &self,
        scheme: Scheme,
        bytes: &[u8],
    ) -> Result<Parsed<RawFrame>, MarshallingError> {
        let parsed = RawFrame::decode(bytes)?;
        let frame = &parsed.value;

        let Some(entry) = self.registry.entry(scheme, frame.msg_id) else {
            debug!(
                scheme = %scheme,
                msg_id = frame.msg_id,
                "message id unknown, unable to validate CRC"
            );
            return Err(MarshallingError::UnknownMessageId {
                msg_id: frame.msg_id,
            });
        };

        if let Err(err) = frame.check_crc(entry.crc_extra) {
            warn!(scheme = %scheme, msg_id = frame.msg_id, name = entry.name, %err, "dropping frame");
            return Err(err);
        }

        if !entry.accepts_len(frame.payload.len()) {
            return Err(MarshallingError::malformed(
                entry.name,
                format!(
                    "payload length {} outside {}..={}",
                    frame.payload.len(),
                    entry.min_len,
                    entry.max_len
                ),
            ));
        }

        if frame.is_signed() {
            let verified = match self.registry.signing_key(scheme) {
                Some(key) => frame.verify_signature(&key),
                None => Err(MarshallingError::BadSignature {
                    msg_id: frame.msg_id,
                }),
            };
            if let Err(err) = verified {
                warn!(scheme = %scheme, msg_id = frame.msg_id, name = entry.name, "bad frame signature");
                return Err(err);
            }
        }

        Ok(parsed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::marshalling::{
        frame::{
            tests::{heartbeat, Heartbeat},
            SigningKey,
        },
        Framed, FramedMessage, SerializerParser,
    };

    fn parser() -> DynamicParser {
        let registry = SchemeRegistry::with_builtin_schemes();
        registry.register::<Heartbeat>();
        DynamicParser::new(Arc::new(registry))
    }

    #[test]
    fn test_unknown_scheme_fails_immediately() {
        let err = parser().frame(Scheme::new(55), "x", b"anything").unwrap_err();
        assert_eq!(err, MarshallingError::UnknownScheme { scheme: 55 });
    }

    #[test]
    fn test_frame_reports_msg_id_as_type() {
        let bytes = SerializerParser::<Framed>::serialize(&heartbeat()).unwrap();
        let info = parser().frame(Scheme::FRAMED, "", &bytes).unwrap();
        assert_eq!(info.type_name, "0");
        assert_eq!(info.consumed, bytes.len());
    }

    #[test]
    fn test_unregistered_msg_id() {
        let frame = RawFrame::new(900, vec![1, 2]).seal(0).unwrap();
        let err = parser().frame(Scheme::FRAMED, "", &frame.encode()).unwrap_err();
        assert_eq!(err, MarshallingError::UnknownMessageId { msg_id: 900 });
    }

    #[test]
    fn test_bad_crc() {
        let mut bytes = SerializerParser::<Framed>::serialize(&heartbeat()).unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xff;
        let err = parser().frame(Scheme::FRAMED, "", &bytes).unwrap_err();
        assert!(matches!(err, MarshallingError::BadChecksum { msg_id: 0, .. }));
    }

    #[test]
    fn test_payload_length_checked_against_entry() {
        let frame = RawFrame::new(0, vec![0; 4]).seal(Heartbeat::CRC_EXTRA).unwrap();
        let err = parser().frame(Scheme::FRAMED, "", &frame.encode()).unwrap_err();
        assert!(matches!(err, MarshallingError::Malformed { .. }));
    }

    /// A signed frame is accepted only with the right key registered.
    #[test]
    fn test_signed_frames_need_registered_key() {
        let key = SigningKey::new([3; 32]);
        let mut payload = Vec::new();
        heartbeat().encode_payload(&mut payload);
        let bytes = RawFrame::new(0, payload)
            .sign(Heartbeat::CRC_EXTRA, &key, 1, 99)
            .unwrap()
            .encode();

        let parser = parser();
        assert_eq!(
            parser.frame(Scheme::FRAMED, "", &bytes).unwrap_err(),
            MarshallingError::BadSignature { msg_id: 0 }
        );

        parser.registry().set_signing_key(Scheme::FRAMED, key);
        assert_eq!(parser.frame(Scheme::FRAMED, "", &bytes).unwrap().consumed, bytes.len());
    }

    #[test]
    fn test_self_describing_schemes_use_given_name() {
        let parser = parser();
        let info = parser.frame(Scheme::JSON, "Widget", b"{\"a\":1} trailing").unwrap();
        assert_eq!(info.type_name, "Widget");
        assert_eq!(info.consumed, 7);

        let info = parser.frame(Scheme::CSTR, "ignored", b"hi\0more").unwrap();
        assert_eq!(info.type_name, CSTR_TYPE_NAME);
        assert_eq!(info.consumed, 3);

        let info = parser.frame(Scheme::BINCODE, "Blob", &[1, 2, 3]).unwrap();
        assert_eq!(info.consumed, 3);
    }

    #[test]
    fn test_runtime_dialect_under_custom_scheme() {
        let custom = Scheme::new(40);
        let parser = parser();
        parser.registry().register_dialect(
            custom,
            [crate::marshalling::MessageEntry {
                msg_id: 5,
                crc_extra: 11,
                name: "CUSTOM",
                min_len: 1,
                max_len: 8,
            }],
        );
        let bytes = RawFrame::new(5, vec![9, 9]).seal(11).unwrap().encode();
        let info = parser.frame(custom, "", &bytes).unwrap();
        assert_eq!(info.type_name, "5");
    }
}

//! Checksummed binary frames.
//!
//! Layout, all integers little endian:
//!
//! ```text
//! 0      magic 0xFD
//! 1      payload length
//! 2      incompatibility flags (bit 0: signed)
//! 3      compatibility flags
//! 4      sequence
//! 5      system id
//! 6      component id
//! 7..10  message id (24 bit)
//! 10..   payload
//! +2     CRC-16/MCRF4XX over bytes 1.. of header and payload, then crc_extra
//! +13    optional signature: link id, 48-bit timestamp, 6 bytes of SHA-256
//! ```
//!
//! `crc_extra` is a per-message-id seed byte that makes two dialects with
//! the same id but a different layout fail the checksum.

use std::{borrow::Cow, fmt};

use crc16::{State, MCRF4XX};
use plexus_error::MarshallingError;
use sha2::{Digest, Sha256};

use super::{Framed, Parsed, SerializerParser};

pub const FRAME_MAGIC: u8 = 0xFD;
pub const HEADER_LEN: usize = 10;
pub const CHECKSUM_LEN: usize = 2;
pub const SIGNATURE_LEN: usize = 13;
pub const MAX_PAYLOAD_LEN: usize = u8::MAX as usize;
pub const MAX_MSG_ID: u32 = 0x00FF_FFFF;

const FLAG_SIGNED: u8 = 0x01;

/// Offset of the first frame start marker in `bytes`.
#[inline]
pub fn find_magic(bytes: &[u8]) -> Option<usize> {
    memchr::memchr(FRAME_MAGIC, bytes)
}

/// Secret shared by the signing and verifying ends of a link.
#[derive(Clone, PartialEq, Eq)]
pub struct SigningKey([u8; 32]);

impl SigningKey {
    pub fn new(secret: [u8; 32]) -> Self {
        Self(secret)
    }
}

impl fmt::Debug for SigningKey {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.write_str("SigningKey(..)")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Signature {
    pub link_id: u8,
    /// 48-bit timestamp; the top 16 bits are dropped on the wire.
    pub timestamp: u64,
    pub value: [u8; 6],
}

/// A frame with its payload still encoded.
///
/// This is what the dynamic path hands around when only the message id is
/// known at runtime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawFrame {
    pub seq: u8,
    pub sys_id: u8,
    pub comp_id: u8,
    pub compat_flags: u8,
    pub msg_id: u32,
    pub payload: Vec<u8>,
    pub checksum: u16,
    pub signature: Option<Signature>,
}

impl RawFrame {
    pub fn new(
        msg_id: u32,
        payload: Vec<u8>,
    ) -> Self {
        Self {
            seq: 0,
            sys_id: 1,
            comp_id: 1,
            compat_flags: 0,
            msg_id,
            payload,
            checksum: 0,
            signature: None,
        }
    }

    pub fn with_address(
        mut self,
        sys_id: u8,
        comp_id: u8,
    ) -> Self {
        self.sys_id = sys_id;
        self.comp_id = comp_id;
        self
    }

    pub fn with_seq(
        mut self,
        seq: u8,
    ) -> Self {
        self.seq = seq;
        self
    }

    /// Checks the size limits and stamps the checksum.
    pub fn seal(
        mut self,
        crc_extra: u8,
    ) -> Result<Self, MarshallingError> {
        if self.payload.len() > MAX_PAYLOAD_LEN {
            return Err(MarshallingError::TooLarge {
                size: self.payload.len(),
                max: MAX_PAYLOAD_LEN,
            });
        }
        if self.msg_id > MAX_MSG_ID {
            return Err(MarshallingError::serialize(
                self.msg_id.to_string(),
                "message id does not fit in 24 bits",
            ));
        }
        self.checksum = self.compute_checksum(crc_extra);
        Ok(self)
    }

    /// Seals the frame and appends a signature.
    ///
    /// The signed flag is part of the checksummed header, so the checksum
    /// is recomputed here.
    pub fn sign(
        mut self,
        crc_extra: u8,
        key: &SigningKey,
        link_id: u8,
        timestamp: u64,
    ) -> Result<Self, MarshallingError> {
        self.signature = Some(Signature {
            link_id,
            timestamp: timestamp & 0xFFFF_FFFF_FFFF,
            value: [0; 6],
        });
        let mut sealed = self.seal(crc_extra)?;
        let value = sealed.compute_signature(key, link_id, timestamp);
        if let Some(sig) = sealed.signature.as_mut() {
            sig.value = value;
        }
        Ok(sealed)
    }

    pub fn is_signed(&self) -> bool {
        self.signature.is_some()
    }

    pub fn encoded_len(&self) -> usize {
        HEADER_LEN
            + self.payload.len()
            + CHECKSUM_LEN
            + if self.is_signed() { SIGNATURE_LEN } else { 0 }
    }

    fn header(&self) -> [u8; HEADER_LEN] {
        let id = self.msg_id.to_le_bytes();
        [
            FRAME_MAGIC,
            self.payload.len() as u8,
            if self.is_signed() { FLAG_SIGNED } else { 0 },
            self.compat_flags,
            self.seq,
            self.sys_id,
            self.comp_id,
            id[0],
            id[1],
            id[2],
        ]
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.encoded_len());
        out.extend_from_slice(&self.header());
        out.extend_from_slice(&self.payload);
        out.extend_from_slice(&self.checksum.to_le_bytes());
        if let Some(sig) = &self.signature {
            out.push(sig.link_id);
            out.extend_from_slice(&sig.timestamp.to_le_bytes()[..6]);
            out.extend_from_slice(&sig.value);
        }
        out
    }

    /// Splits one frame off the front of `bytes` without validating the
    /// checksum (that needs the dialect's `crc_extra`).
    pub fn decode(bytes: &[u8]) -> Result<Parsed<RawFrame>, MarshallingError> {
        if bytes.is_empty() {
            return Err(MarshallingError::Incomplete { needed: HEADER_LEN });
        }
        if bytes[0] != FRAME_MAGIC {
            return Err(MarshallingError::malformed(
                "frame",
                format!("expected start marker {FRAME_MAGIC:#04x}, got {:#04x}", bytes[0]),
            ));
        }
        if bytes.len() < HEADER_LEN {
            return Err(MarshallingError::Incomplete {
                needed: HEADER_LEN - bytes.len(),
            });
        }

        let payload_len = bytes[1] as usize;
        let incompat = bytes[2];
        if incompat & !FLAG_SIGNED != 0 {
            return Err(MarshallingError::malformed(
                "frame",
                format!("unsupported incompatibility flags {incompat:#04x}"),
            ));
        }
        let signed = incompat & FLAG_SIGNED != 0;
        let total = HEADER_LEN
            + payload_len
            + CHECKSUM_LEN
            + if signed { SIGNATURE_LEN } else { 0 };
        if bytes.len() < total {
            return Err(MarshallingError::Incomplete {
                needed: total - bytes.len(),
            });
        }

        let msg_id = u32::from_le_bytes([bytes[7], bytes[8], bytes[9], 0]);
        let body_end = HEADER_LEN + payload_len;
        let checksum = u16::from_le_bytes([bytes[body_end], bytes[body_end + 1]]);
        let signature = signed.then(|| {
            let sig = &bytes[body_end + CHECKSUM_LEN..total];
            let mut ts = [0u8; 8];
            ts[..6].copy_from_slice(&sig[1..7]);
            let mut value = [0u8; 6];
            value.copy_from_slice(&sig[7..13]);
            Signature {
                link_id: sig[0],
                timestamp: u64::from_le_bytes(ts),
                value,
            }
        });

        let frame = RawFrame {
            seq: bytes[4],
            sys_id: bytes[5],
            comp_id: bytes[6],
            compat_flags: bytes[3],
            msg_id,
            payload: bytes[HEADER_LEN..body_end].to_vec(),
            checksum,
            signature,
        };
        Ok(Parsed::new(frame, total))
    }

    pub fn compute_checksum(
        &self,
        crc_extra: u8,
    ) -> u16 {
        let mut state = State::<MCRF4XX>::new();
        state.update(&self.header()[1..]);
        state.update(&self.payload);
        state.update(&[crc_extra]);
        state.get()
    }

    pub fn check_crc(
        &self,
        crc_extra: u8,
    ) -> Result<(), MarshallingError> {
        let expected = self.compute_checksum(crc_extra);
        if expected != self.checksum {
            return Err(MarshallingError::BadChecksum {
                msg_id: self.msg_id,
                expected,
                actual: self.checksum,
            });
        }
        Ok(())
    }

    fn compute_signature(
        &self,
        key: &SigningKey,
        link_id: u8,
        timestamp: u64,
    ) -> [u8; 6] {
        let mut hasher = Sha256::new();
        hasher.update(key.0);
        hasher.update(self.header());
        hasher.update(&self.payload);
        hasher.update(self.checksum.to_le_bytes());
        hasher.update([link_id]);
        hasher.update(&timestamp.to_le_bytes()[..6]);
        let digest = hasher.finalize();
        let mut out = [0u8; 6];
        out.copy_from_slice(&digest[..6]);
        out
    }

    /// Fails with `BadSignature` when the frame is unsigned or the digest
    /// does not match `key`.
    pub fn verify_signature(
        &self,
        key: &SigningKey,
    ) -> Result<(), MarshallingError> {
        let sig = self
            .signature
            .as_ref()
            .ok_or(MarshallingError::BadSignature { msg_id: self.msg_id })?;
        if self.compute_signature(key, sig.link_id, sig.timestamp) != sig.value {
            return Err(MarshallingError::BadSignature { msg_id: self.msg_id });
        }
        Ok(())
    }
}

////////////////////////////////////////////////////////////////////////////////
// Statically typed messages
////////////////////////////////////////////////////////////////////////////////

/// A message type of a frame dialect.
///
/// Implementations describe how to lay out the payload; framing, checksums
/// and the serializer/parser impls come from this module.
pub trait FramedMessage: Sized + Send + Sync + 'static {
    const MSG_ID: u32;
    const CRC_EXTRA: u8;
    const NAME: &'static str;
    const MIN_LEN: u8 = 0;
    const MAX_LEN: u8 = u8::MAX;

    fn encode_payload(
        &self,
        out: &mut Vec<u8>,
    );

    fn decode_payload(payload: &[u8]) -> Result<Self, MarshallingError>;
}

/// A framed message together with the link addressing it travelled with.
#[derive(Debug, Clone, PartialEq)]
pub struct Tagged<T> {
    pub seq: u8,
    pub sys_id: u8,
    pub comp_id: u8,
    pub message: T,
}

impl<T> Tagged<T> {
    pub fn new(
        sys_id: u8,
        comp_id: u8,
        message: T,
    ) -> Self {
        Self {
            seq: 0,
            sys_id,
            comp_id,
            message,
        }
    }
}

fn encode_tagged<T: FramedMessage>(
    message: &T,
    seq: u8,
    sys_id: u8,
    comp_id: u8,
) -> Result<Vec<u8>, MarshallingError> {
    let mut payload = Vec::with_capacity(T::MAX_LEN as usize);
    message.encode_payload(&mut payload);
    let frame = RawFrame::new(T::MSG_ID, payload)
        .with_seq(seq)
        .with_address(sys_id, comp_id)
        .seal(T::CRC_EXTRA)?;
    Ok(frame.encode())
}

fn decode_tagged<T: FramedMessage>(bytes: &[u8]) -> Result<Parsed<Tagged<T>>, MarshallingError> {
    let Parsed {
        value: frame,
        consumed,
    } = RawFrame::decode(bytes)?;
    if frame.msg_id != T::MSG_ID {
        return Err(MarshallingError::TypeMismatch {
            expected: T::MSG_ID.to_string(),
            actual: frame.msg_id.to_string(),
        });
    }
    frame.check_crc(T::CRC_EXTRA)?;
    // No key is reachable from a static parse.
    if frame.is_signed() {
        return Err(MarshallingError::BadSignature { msg_id: frame.msg_id });
    }
    let message = T::decode_payload(&frame.payload)?;
    Ok(Parsed::new(
        Tagged {
            seq: frame.seq,
            sys_id: frame.sys_id,
            comp_id: frame.comp_id,
            message,
        },
        consumed,
    ))
}

impl<T: FramedMessage> SerializerParser<Framed> for T {
    fn type_name() -> Cow<'static, str> {
        Cow::Owned(T::MSG_ID.to_string())
    }

    fn serialize(&self) -> Result<Vec<u8>, MarshallingError> {
        encode_tagged(self, 0, 1, 1)
    }

    fn parse(
        bytes: &[u8],
        _type_name: &str,
    ) -> Result<Parsed<Self>, MarshallingError> {
        decode_tagged::<T>(bytes).map(|p| Parsed::new(p.value.message, p.consumed))
    }
}

impl<T: FramedMessage> SerializerParser<Framed> for Tagged<T> {
    fn type_name() -> Cow<'static, str> {
        <T as SerializerParser<Framed>>::type_name()
    }

    fn serialize(&self) -> Result<Vec<u8>, MarshallingError> {
        encode_tagged(&self.message, self.seq, self.sys_id, self.comp_id)
    }

    fn parse(
        bytes: &[u8],
        _type_name: &str,
    ) -> Result<Parsed<Self>, MarshallingError> {
        decode_tagged::<T>(bytes)
    }
}

//! Byte stream to envelope adapter.
//!
//! A gateway sits at the edge of a process where raw bytes arrive in
//! arbitrary chunks (a serial link, a pipe). It buffers them, splits
//! complete messages with a [`DynamicParser`] and publishes every message as
//! an envelope into an inner transport, so forwarded descriptors and
//! wildcard subscribers see it like any other publication.

use bytes::BytesMut;
use memchr::memchr;
use plexus_error::{ErrorExt, MarshallingError, TransportError};
use tracing::{debug, warn};

use super::{Envelope, InnerTransport, TransporterId};
use crate::{
    group::Group,
    marshalling::{frame::find_magic, DynamicParser, Scheme},
};

pub const DEFAULT_MAX_BUFFER: usize = 64 * 1024;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GatewayStats {
    /// Messages published.
    pub messages: u64,
    /// Malformed messages dropped.
    pub dropped: u64,
    /// Bytes discarded while resynchronising or on overflow.
    pub skipped_bytes: u64,
}

fn is_framed(scheme: Scheme) -> bool {
    !matches!(
        scheme,
        Scheme::CSTR | Scheme::JSON | Scheme::MSGPACK | Scheme::CBOR | Scheme::BINCODE
    )
}

pub struct StreamGateway<I: InnerTransport> {
    id: TransporterId,
    inner: I,
    parser: DynamicParser,
    scheme: Scheme,
    type_name: String,
    group: Group,
    buffer: BytesMut,
    max_buffer: usize,
    stats: GatewayStats,
}

impl<I: InnerTransport> StreamGateway<I> {
    /// `type_name` names the messages of schemes that do not carry one.
    pub fn new(
        inner: I,
        parser: DynamicParser,
        scheme: Scheme,
        type_name: impl Into<String>,
        group: Group,
    ) -> Result<Self, TransportError> {
        if group.is_reserved() {
            return Err(TransportError::ReservedGroup {
                group: group.name().to_owned(),
            });
        }
        Ok(Self {
            id: TransporterId::next(),
            inner,
            parser,
            scheme,
            type_name: type_name.into(),
            group,
            buffer: BytesMut::new(),
            max_buffer: DEFAULT_MAX_BUFFER,
            stats: GatewayStats::default(),
        })
    }

    pub fn with_max_buffer(
        mut self,
        max_buffer: usize,
    ) -> Self {
        self.max_buffer = max_buffer.max(1);
        self
    }

    pub fn id(&self) -> TransporterId {
        self.id
    }

    pub fn stats(&self) -> GatewayStats {
        self.stats
    }

    /// Bytes waiting for the rest of a message.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Appends `bytes` and publishes every complete message. Returns the
    /// number of consumers reached.
    pub fn feed(
        &mut self,
        bytes: &[u8],
    ) -> Result<usize, TransportError> {
        self.buffer.extend_from_slice(bytes);
        let mut reached = 0;

        loop {
            if is_framed(self.scheme) {
                self.resync();
            }
            if self.buffer.is_empty() {
                break;
            }

            match self.parser.frame(self.scheme, &self.type_name, &self.buffer) {
                Ok(info) => {
                    let message = self.buffer.split_to(info.consumed).freeze();
                    let envelope =
                        Envelope::new(self.scheme, info.type_name, self.group.clone(), message)
                            .with_origin(self.id);
                    self.stats.messages += 1;
                    match self.inner.publish_envelope(&envelope) {
                        Ok(n) => reached += n,
                        Err(err) if err.status_code().is_critical() => return Err(err),
                        Err(err) => warn!(gateway = %self.id, %err, "publication dropped"),
                    }
                }
                Err(MarshallingError::Incomplete { .. }) => break,
                Err(err @ MarshallingError::UnknownScheme { .. }) => {
                    warn!(gateway = %self.id, %err, discarded = self.buffer.len(), "discarding stream input");
                    self.discard(self.buffer.len());
                    self.stats.dropped += 1;
                    break;
                }
                Err(err) => {
                    warn!(gateway = %self.id, scheme = %self.scheme, %err, "skipping malformed message");
                    self.stats.dropped += 1;
                    let skip = self.skip_len();
                    self.discard(skip);
                }
            }
        }

        if self.buffer.len() > self.max_buffer {
            warn!(gateway = %self.id, buffered = self.buffer.len(), max = self.max_buffer, "stream buffer overflow, discarding");
            self.discard(self.buffer.len());
        }
        Ok(reached)
    }

    /// Drops everything before the next frame start.
    fn resync(&mut self) {
        match find_magic(&self.buffer) {
            Some(0) => {}
            Some(offset) => {
                debug!(gateway = %self.id, skipped = offset, "resynchronised on frame start");
                self.discard(offset);
            }
            None => {
                let len = self.buffer.len();
                self.discard(len);
            }
        }
    }

    /// How much to drop after a malformed message.
    fn skip_len(&self) -> usize {
        let buffer = &self.buffer[..];
        if self.scheme == Scheme::CSTR {
            memchr(0, buffer).map_or(buffer.len(), |nul| nul + 1)
        } else if is_framed(self.scheme) {
            // Past the bad magic byte; resync finds the next one.
            1
        } else {
            buffer.len()
        }
    }

    fn discard(
        &mut self,
        len: usize,
    ) {
        let len = len.min(self.buffer.len());
        let _ = self.buffer.split_to(len);
        self.stats.skipped_bytes += len as u64;
    }
}

impl<I: InnerTransport> std::fmt::Debug for StreamGateway<I> {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("StreamGateway")
            .field("id", &self.id)
            .field("scheme", &self.scheme)
            .field("group", &self.group)
            .field("buffered", &self.buffer.len())
            .field("stats", &self.stats)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::{
        sync::{
            atomic::{AtomicUsize, Ordering},
            Arc,
        },
        time::Duration,
    };

    use parking_lot::Mutex;
    use serde::{Deserialize, Serialize};

    use super::*;
    use crate::{
        marshalling::{
            frame::tests::{heartbeat, Heartbeat},
            Framed, Json, Named, SchemeRegistry, SerializerParser,
        },
        transport::{
            BoundaryId, InterThreadTransporter, RegexFilter, StoreConfig, SubscriptionStore,
            Transporter,
        },
    };

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Sample {
        n: u32,
    }

    impl Named for Sample {
        const TYPE_NAME: &'static str = "Sample";
    }

    fn inner() -> InterThreadTransporter {
        InterThreadTransporter::with_boundary(Arc::new(SubscriptionStore::new()), BoundaryId::new())
    }

    fn parser() -> DynamicParser {
        let registry = SchemeRegistry::with_builtin_schemes();
        registry.register::<Heartbeat>();
        DynamicParser::new(Arc::new(registry))
    }

    /// Messages split across chunks are reassembled.
    #[test]
    fn test_json_split_across_chunks() {
        let inner = inner();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        inner
            .subscribe::<Json, Sample, _>(&Group::new("uart"), move |s| sink.lock().push(s.n))
            .unwrap();

        let mut gateway =
            StreamGateway::new(inner.clone(), parser(), Scheme::JSON, "Sample", Group::new("uart")).unwrap();
        assert_eq!(gateway.feed(br#"{"n":1}{"n""#).unwrap(), 1);
        assert_eq!(gateway.buffered(), 4);
        assert_eq!(gateway.feed(br#":2}{"n":3}"#).unwrap(), 2);

        assert_eq!(*seen.lock(), vec![1, 2, 3]);
        assert_eq!(gateway.stats().messages, 3);
        assert_eq!(gateway.buffered(), 0);
    }

    #[test]
    fn test_frames_resync_after_noise_and_bad_crc() {
        let inner = inner();
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        inner
            .subscribe::<Framed, Heartbeat, _>(&Group::new("link"), move |hb| {
                assert_eq!(hb, &heartbeat());
                counter.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();

        let good = SerializerParser::<Framed>::serialize(&heartbeat()).unwrap();
        let mut bad = good.clone();
        let last = bad.len() - 1;
        bad[last] ^= 0xFF;

        let mut stream = vec![0x00, 0x13, 0x37];
        stream.extend_from_slice(&good);
        stream.extend_from_slice(&bad);
        stream.extend_from_slice(&good);

        let mut gateway =
            StreamGateway::new(inner.clone(), parser(), Scheme::FRAMED, "", Group::new("link")).unwrap();
        assert_eq!(gateway.feed(&stream).unwrap(), 2);
        assert_eq!(hits.load(Ordering::SeqCst), 2);

        let stats = gateway.stats();
        assert_eq!(stats.messages, 2);
        assert_eq!(stats.dropped, 1);
        assert!(stats.skipped_bytes >= 3 + bad.len() as u64);
    }

    #[test]
    fn test_wildcard_subscriber_sees_stream_messages() {
        let inner = inner();
        let names = Arc::new(Mutex::new(Vec::new()));
        let sink = names.clone();
        inner
            .subscribe_regex(RegexFilter::any(), move |_: &[u8], _, type_name: &str, _: &Group| {
                sink.lock().push(type_name.to_owned());
            })
            .unwrap();

        let mut gateway =
            StreamGateway::new(inner.clone(), parser(), Scheme::CSTR, "", Group::new("console")).unwrap();
        gateway.feed(b"hello\0wor").unwrap();
        gateway.feed(b"ld\0").unwrap();
        assert_eq!(*names.lock(), vec!["CSTR".to_owned(), "CSTR".to_owned()]);
    }

    #[test]
    fn test_invalid_cstr_is_skipped_up_to_nul() {
        let inner = inner();
        let mut gateway =
            StreamGateway::new(inner.clone(), parser(), Scheme::CSTR, "", Group::new("console")).unwrap();
        gateway.feed(b"\xff\xfe\0ok\0").unwrap();
        let stats = gateway.stats();
        assert_eq!(stats.dropped, 1);
        assert_eq!(stats.messages, 1);
        assert_eq!(stats.skipped_bytes, 3);
    }

    #[test]
    fn test_unknown_scheme_discards_input() {
        let inner = inner();
        let mut gateway =
            StreamGateway::new(inner, parser(), Scheme::new(42), "X", Group::new("g")).unwrap();
        assert_eq!(gateway.feed(b"\xfd\x01\x02").unwrap(), 0);
        assert_eq!(gateway.buffered(), 0);
        assert_eq!(gateway.stats().dropped, 1);
    }

    #[test]
    fn test_overflow_discards_buffer() {
        let inner = inner();
        let mut gateway = StreamGateway::new(inner, parser(), Scheme::JSON, "Sample", Group::new("g"))
            .unwrap()
            .with_max_buffer(8);
        gateway.feed(br#"{"n": 1234567890"#).unwrap();
        assert_eq!(gateway.buffered(), 0);
        assert_eq!(gateway.stats().skipped_bytes, 16);
    }

    #[test]
    fn test_lock_timeout_propagates() {
        let store = Arc::new(SubscriptionStore::with_config(StoreConfig {
            lock_timeout: Duration::from_millis(20),
        }));
        let inner = InterThreadTransporter::with_boundary(store.clone(), BoundaryId::new());
        inner
            .subscribe::<Json, Sample, _>(&Group::new("uart"), |_| {})
            .unwrap();
        let mut gateway =
            StreamGateway::new(inner.clone(), parser(), Scheme::JSON, "Sample", Group::new("uart")).unwrap();

        let err = store
            .while_locked(inner.boundary(), || gateway.feed(br#"{"n":1}"#))
            .unwrap_err();
        assert!(err.status_code().is_critical());
        assert_eq!(err, TransportError::LockTimeout { waited_ms: 20 });
    }

    #[test]
    fn test_reserved_group_rejected() {
        let err = StreamGateway::new(inner(), parser(), Scheme::JSON, "Sample", crate::group::REGEX_GROUP.clone())
            .unwrap_err();
        assert!(matches!(err, TransportError::ReservedGroup { .. }));
    }
}

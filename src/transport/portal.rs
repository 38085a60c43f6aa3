//! Bridge between an inner transporter and a [`Broker`].
//!
//! Outbound: every envelope forwarded into the inner boundary is encoded
//! once and published on a channel under [`FORWARD_GROUP_NAME`]. Inbound:
//! bus messages are drained by [`Pollable::poll_pending`], matched against
//! the interest forwarded into the inner boundary, and published there.
//! Each portal stamps its frames with a random sender id and ignores its
//! own frames when they come back from the bus.

use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
};

use bincode::Options;
use bytes::Bytes;
use parking_lot::{Mutex, RwLock};
use plexus_error::{ErrorExt, TransportError};
use serde::{Deserialize, Serialize};
use tracing::{debug, trace, warn};
use uuid::Uuid;

use super::{
    EnvelopeTap, Envelope, InnerTransport, InterThreadTransporter, Pollable, RegexDescriptor,
    RegexFilter, SubscriptionDescriptor, SubscriptionId, TransporterId,
};
use crate::{
    bus::{Broker, PatternSubscription, TryRecvError},
    group::{Group, FORWARD_GROUP_NAME},
    marshalling::{bounded_bincode, Scheme},
};

#[derive(Serialize)]
struct OutboundFrame<'a> {
    sender: Uuid,
    envelope: &'a Envelope,
}

#[derive(Deserialize)]
struct InboundFrame {
    sender: Uuid,
    envelope: Envelope,
}

/// Interest forwarded into the inner boundary by outer layers.
#[derive(Debug)]
enum Interest {
    Exact {
        scheme: Scheme,
        type_name: Arc<str>,
        group: Group,
    },
    Pattern(RegexFilter),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Dispatch {
    Full,
    RegexOnly,
    Drop,
}

type InterestTable = RwLock<HashMap<SubscriptionId, Interest>>;

fn dispatch_for(
    table: &InterestTable,
    envelope: &Envelope,
) -> Dispatch {
    let table = table.read();
    let mut dispatch = Dispatch::Drop;
    for interest in table.values() {
        match interest {
            Interest::Exact {
                scheme,
                type_name,
                group,
            } => {
                if *scheme == envelope.scheme()
                    && **type_name == *envelope.type_name()
                    && group == envelope.group()
                {
                    return Dispatch::Full;
                }
            }
            Interest::Pattern(filter) => {
                if filter.matches_envelope(envelope) {
                    dispatch = Dispatch::RegexOnly;
                }
            }
        }
    }
    dispatch
}

/// Bus channel of an envelope.
pub fn channel_for(envelope: &Envelope) -> String {
    format!(
        "{}/{}/{}/{}",
        FORWARD_GROUP_NAME,
        envelope.scheme().id(),
        envelope.type_name(),
        envelope.group()
    )
}

struct PortalTap {
    sender: Uuid,
    broker: Arc<Broker>,
    interest: Arc<InterestTable>,
    published: AtomicUsize,
}

impl EnvelopeTap for PortalTap {
    fn on_envelope(
        &self,
        envelope: &Envelope,
    ) {
        let frame = OutboundFrame {
            sender: self.sender,
            envelope,
        };
        let bytes = match bincode::serialize(&frame) {
            Ok(bytes) => bytes,
            Err(err) => {
                warn!(type_name = envelope.type_name(), group = %envelope.group(), %err, "failed to encode envelope for the bus");
                return;
            }
        };
        let channel = channel_for(envelope);
        let reached = self.broker.publish(&channel, Bytes::from(bytes));
        self.published.fetch_add(1, Ordering::Relaxed);
        trace!(%channel, reached, "envelope sent to bus");
    }

    fn on_subscription(
        &self,
        descriptor: &SubscriptionDescriptor,
    ) {
        self.interest.write().insert(
            descriptor.id(),
            Interest::Exact {
                scheme: descriptor.scheme(),
                type_name: descriptor.type_name.clone(),
                group: descriptor.group().clone(),
            },
        );
    }

    fn on_regex(
        &self,
        descriptor: &RegexDescriptor,
    ) {
        self.interest
            .write()
            .insert(descriptor.id(), Interest::Pattern(descriptor.filter().clone()));
    }

    fn on_withdraw(
        &self,
        id: SubscriptionId,
    ) {
        self.interest.write().remove(&id);
    }
}

pub struct InterProcessPortal {
    id: TransporterId,
    inner: InterThreadTransporter,
    tap: Arc<PortalTap>,
    tap_id: SubscriptionId,
    inbound: Mutex<PatternSubscription>,
}

impl InterProcessPortal {
    /// Attaches to the boundary of `inner` and starts listening on `broker`.
    pub fn new(
        inner: InterThreadTransporter,
        broker: Arc<Broker>,
    ) -> Result<Self, TransportError> {
        let id = TransporterId::next();
        let sender = Uuid::new_v4();
        let inbound = broker.psubscribe(&format!("{FORWARD_GROUP_NAME}/*"))?;
        let tap = Arc::new(PortalTap {
            sender,
            broker,
            interest: Arc::new(RwLock::new(HashMap::new())),
            published: AtomicUsize::new(0),
        });
        let tap_id = inner
            .store()
            .attach_tap(inner.boundary(), id, tap.clone())?;
        debug!(portal = %id, %sender, boundary = %inner.boundary(), "portal attached");
        Ok(Self {
            id,
            inner,
            tap,
            tap_id,
            inbound: Mutex::new(inbound),
        })
    }

    pub fn id(&self) -> TransporterId {
        self.id
    }

    pub fn sender(&self) -> Uuid {
        self.tap.sender
    }

    pub fn inner(&self) -> &InterThreadTransporter {
        &self.inner
    }

    pub fn broker(&self) -> &Arc<Broker> {
        &self.tap.broker
    }

    /// Forwarded descriptors currently known to the portal.
    pub fn interest_count(&self) -> usize {
        self.tap.interest.read().len()
    }

    /// Envelopes sent to the bus so far.
    pub fn published_count(&self) -> usize {
        self.tap.published.load(Ordering::Relaxed)
    }

    fn deliver(
        &self,
        payload: &[u8],
    ) -> Result<usize, TransportError> {
        let frame: InboundFrame = match bounded_bincode(payload.len()).deserialize(payload) {
            Ok(frame) => frame,
            Err(err) => {
                warn!(portal = %self.id, %err, "dropping undecodable bus frame");
                return Ok(0);
            }
        };
        if frame.sender == self.tap.sender {
            return Ok(0);
        }

        let envelope = frame.envelope.with_origin(self.id);
        let store = self.inner.store();
        let boundary = self.inner.boundary();
        let result = match dispatch_for(&self.tap.interest, &envelope) {
            Dispatch::Full => store.publish_envelope(boundary, &envelope),
            Dispatch::RegexOnly => store.publish_regex_envelope(boundary, &envelope),
            Dispatch::Drop => {
                trace!(portal = %self.id, type_name = envelope.type_name(), group = %envelope.group(), "no interest in bus frame");
                return Ok(0);
            }
        };
        match result {
            Ok(delivered) => Ok(delivered),
            Err(err) if err.status_code().is_critical() => Err(err),
            Err(err) => {
                warn!(portal = %self.id, %err, "dropping bus frame");
                Ok(0)
            }
        }
    }
}

impl Pollable for InterProcessPortal {
    /// Drains everything queued on the bus.
    fn poll_pending(&self) -> Result<usize, TransportError> {
        let mut delivered = 0;
        let mut inbound = self.inbound.lock();
        loop {
            match inbound.try_recv() {
                Ok(message) => delivered += self.deliver(&message.payload)?,
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Lagged(missed)) => {
                    warn!(portal = %self.id, missed, "portal lagged behind the bus");
                }
                Err(TryRecvError::Closed) => {
                    return Err(TransportError::BoundaryClosed {
                        name: FORWARD_GROUP_NAME.to_owned(),
                    });
                }
            }
        }
        Ok(delivered)
    }
}

/// Lets forwarders sit directly on a portal.
impl InnerTransport for InterProcessPortal {
    fn publish_envelope(
        &self,
        envelope: &Envelope,
    ) -> Result<usize, TransportError> {
        self.inner.publish_envelope(envelope)
    }

    fn publish_regex_envelope(
        &self,
        envelope: &Envelope,
    ) -> Result<usize, TransportError> {
        self.inner.publish_regex_envelope(envelope)
    }

    fn forward_subscription(
        &self,
        descriptor: SubscriptionDescriptor,
    ) -> Result<SubscriptionId, TransportError> {
        self.inner.forward_subscription(descriptor)
    }

    fn forward_regex(
        &self,
        descriptor: RegexDescriptor,
    ) -> Result<SubscriptionId, TransportError> {
        self.inner.forward_regex(descriptor)
    }

    fn withdraw(
        &self,
        id: SubscriptionId,
    ) -> Result<bool, TransportError> {
        self.inner.withdraw(id)
    }
}

impl Drop for InterProcessPortal {
    fn drop(&mut self) {
        if let Err(err) = self
            .inner
            .store()
            .unsubscribe(self.inner.boundary(), self.tap_id)
        {
            warn!(portal = %self.id, %err, "failed to detach portal");
        }
    }
}

impl std::fmt::Debug for InterProcessPortal {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("InterProcessPortal")
            .field("id", &self.id)
            .field("sender", &self.tap.sender)
            .field("boundary", &self.inner.boundary())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use serde::{Deserialize, Serialize};

    use super::*;
    use crate::{
        marshalling::{Json, Named},
        transport::{BoundaryId, InterProcessForwarder, SubscriptionStore, Transporter},
    };

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Reading {
        value: i64,
    }

    impl Named for Reading {
        const TYPE_NAME: &'static str = "Reading";
    }

    struct Node {
        portal: Arc<InterProcessPortal>,
        forwarder: InterProcessForwarder<Arc<InterProcessPortal>>,
    }

    fn node(broker: &Arc<Broker>) -> Node {
        let inner =
            InterThreadTransporter::with_boundary(Arc::new(SubscriptionStore::new()), BoundaryId::new());
        let portal = Arc::new(InterProcessPortal::new(inner, broker.clone()).unwrap());
        let forwarder = InterProcessForwarder::new(portal.clone());
        Node { portal, forwarder }
    }

    #[test]
    fn test_channel_name() {
        let envelope = Envelope::new(Scheme::JSON, "Reading", Group::with_id("temp", 2), Bytes::new());
        assert_eq!(channel_for(&envelope), "plexus::InterProcessForwarder/7/Reading/temp#2");
    }

    /// Delivery between two nodes sharing one bus.
    #[test]
    fn test_publication_crosses_the_bus() {
        let broker = Arc::new(Broker::new(64));
        let a = node(&broker);
        let b = node(&broker);

        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        a.forwarder
            .subscribe::<Json, Reading, _>(&Group::new("temp"), move |r| {
                assert_eq!(r.value, 21);
                counter.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();
        assert_eq!(a.portal.interest_count(), 1);

        b.forwarder
            .publish::<Json, _>(&Reading { value: 21 }, &Group::new("temp"))
            .unwrap();
        assert_eq!(b.portal.published_count(), 1);

        assert_eq!(b.portal.poll_pending().unwrap(), 0);
        assert_eq!(a.portal.poll_pending().unwrap(), 1);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(a.forwarder.poll_pending().unwrap(), 1);
    }

    #[test]
    fn test_no_interest_drops_frame() {
        let broker = Arc::new(Broker::new(64));
        let a = node(&broker);
        let b = node(&broker);

        b.forwarder
            .publish::<Json, _>(&Reading { value: 1 }, &Group::new("temp"))
            .unwrap();
        assert_eq!(a.portal.poll_pending().unwrap(), 0);
    }

    #[test]
    fn test_regex_only_interest() {
        let broker = Arc::new(Broker::new(64));
        let a = node(&broker);
        let b = node(&broker);

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        a.forwarder
            .subscribe_regex(
                RegexFilter::new([], "Read.*", "te.*").unwrap(),
                move |bytes: &[u8], scheme: Scheme, _: &str, group: &Group| {
                    sink.lock().push((bytes.to_vec(), scheme, group.clone()));
                },
            )
            .unwrap();

        b.forwarder
            .publish::<Json, _>(&Reading { value: 5 }, &Group::new("temp"))
            .unwrap();
        assert_eq!(a.portal.poll_pending().unwrap(), 1);

        let seen = seen.lock();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].0, br#"{"value":5}"#.to_vec());
        assert_eq!(seen[0].1, Scheme::JSON);
        assert_eq!(seen[0].2, Group::new("temp"));
    }

    #[test]
    fn test_withdraw_updates_interest() {
        let broker = Arc::new(Broker::new(64));
        let a = node(&broker);
        let id = a
            .forwarder
            .subscribe::<Json, Reading, _>(&Group::new("temp"), |_| {})
            .unwrap();
        assert_eq!(a.portal.interest_count(), 1);
        a.forwarder.unsubscribe(id).unwrap();
        assert_eq!(a.portal.interest_count(), 0);
    }

    #[test]
    fn test_garbage_on_the_bus_is_skipped() {
        let broker = Arc::new(Broker::new(64));
        let a = node(&broker);
        broker.publish(&format!("{FORWARD_GROUP_NAME}/junk"), Bytes::from_static(b"\xff\x00"));
        assert_eq!(a.portal.poll_pending().unwrap(), 0);
    }

    #[test]
    fn test_forged_lengths_on_the_bus_are_skipped() {
        let broker = Arc::new(Broker::new(64));
        let a = node(&broker);
        let mut frame = 16u64.to_le_bytes().to_vec();
        frame.extend_from_slice(&[7; 16]);
        frame.extend_from_slice(&2i32.to_le_bytes());
        frame.extend_from_slice(&(1u64 << 40).to_le_bytes());
        broker.publish(&format!("{FORWARD_GROUP_NAME}/forged"), Bytes::from(frame));
        assert_eq!(a.portal.poll_pending().unwrap(), 0);
    }
}

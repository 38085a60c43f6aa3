//! Publish/subscribe transporters.
//!
//! - `store`: the partitioned subscription store every transporter sits on.
//! - `interthread`: the innermost transporter, dispatching between threads.
//! - `forwarder`: the outer layer that mirrors a subscriber set onto an
//!   inner transport.
//! - `portal`: bridges an inner transport to a message bus.
//! - `gateway`: turns a raw byte stream into envelopes.
//! - `poller`: waits on several transporters at once.

pub mod boundary;
pub mod envelope;
pub mod forwarder;
pub mod gateway;
pub mod id;
pub mod interthread;
pub mod pattern;
pub mod poller;
pub mod portal;
pub mod store;
pub mod subscription;

use std::sync::Arc;

pub use boundary::{BoundaryGuard, BoundaryId};
pub use envelope::{DeliveryConfig, Envelope};
pub use forwarder::InterProcessForwarder;
pub use gateway::{GatewayStats, StreamGateway};
pub use id::{SubscriptionId, TransporterId};
pub use interthread::InterThreadTransporter;
pub use pattern::{RegexDescriptor, RegexFilter, RegexHandler, RegexSubscription};
use plexus_error::TransportError;
pub use poller::{Pollable, Poller, PollerConfig};
pub use portal::InterProcessPortal;
pub use store::{EnvelopeTap, StoreConfig, SubscriptionStore};
pub use subscription::{Subscription, SubscriptionDescriptor};

use crate::{
    group::Group,
    marshalling::{MarshallingScheme, Scheme, SerializerParser},
};

/// Typed publish/subscribe surface shared by every layer.
///
/// Scheme and value type are compile-time parameters, so
/// `publish::<Json, _>(&value, &group)` picks its serializer statically.
pub trait Transporter {
    fn publish_with<S, T>(
        &self,
        value: &T,
        group: &Group,
        config: Option<&DeliveryConfig>,
    ) -> Result<usize, TransportError>
    where
        S: MarshallingScheme,
        T: SerializerParser<S>;

    /// Publishes `value` on `group`. Returns how many consumers it reached.
    fn publish<S, T>(
        &self,
        value: &T,
        group: &Group,
    ) -> Result<usize, TransportError>
    where
        S: MarshallingScheme,
        T: SerializerParser<S>,
    {
        self.publish_with::<S, T>(value, group, None)
    }

    fn subscribe_with<S, T>(
        &self,
        subscription: Subscription<T, S>,
    ) -> Result<SubscriptionId, TransportError>
    where
        S: MarshallingScheme,
        T: SerializerParser<S>;

    fn subscribe<S, T, F>(
        &self,
        group: &Group,
        handler: F,
    ) -> Result<SubscriptionId, TransportError>
    where
        S: MarshallingScheme,
        T: SerializerParser<S>,
        F: Fn(&T) + Send + Sync + 'static,
    {
        self.subscribe_with(Subscription::<T, S>::new(group.clone(), handler))
    }

    /// Subscribes to `subscribed` where the group of each value is computed
    /// by `extract`.
    fn subscribe_by_content<S, T, F, E>(
        &self,
        subscribed: &Group,
        extract: E,
        handler: F,
    ) -> Result<SubscriptionId, TransportError>
    where
        S: MarshallingScheme,
        T: SerializerParser<S>,
        F: Fn(&T) + Send + Sync + 'static,
        E: Fn(&T) -> Group + Send + Sync + 'static,
    {
        self.subscribe_with(Subscription::<T, S>::new(subscribed.clone(), handler).with_extractor(extract))
    }

    fn subscribe_regex<F>(
        &self,
        filter: RegexFilter,
        handler: F,
    ) -> Result<SubscriptionId, TransportError>
    where
        F: Fn(&[u8], Scheme, &str, &Group) + Send + Sync + 'static;

    fn unsubscribe(
        &self,
        id: SubscriptionId,
    ) -> Result<bool, TransportError>;
}

/// What an outer layer needs from the layer beneath it.
///
/// Everything here is type-erased: envelopes and descriptors only.
pub trait InnerTransport: Send + Sync {
    fn publish_envelope(
        &self,
        envelope: &Envelope,
    ) -> Result<usize, TransportError>;

    /// Regex-group path: reaches pattern subscribers only.
    fn publish_regex_envelope(
        &self,
        envelope: &Envelope,
    ) -> Result<usize, TransportError>;

    fn forward_subscription(
        &self,
        descriptor: SubscriptionDescriptor,
    ) -> Result<SubscriptionId, TransportError>;

    fn forward_regex(
        &self,
        descriptor: RegexDescriptor,
    ) -> Result<SubscriptionId, TransportError>;

    fn withdraw(
        &self,
        id: SubscriptionId,
    ) -> Result<bool, TransportError>;
}

impl<I: InnerTransport + ?Sized> InnerTransport for Arc<I> {
    fn publish_envelope(
        &self,
        envelope: &Envelope,
    ) -> Result<usize, TransportError> {
        (**self).publish_envelope(envelope)
    }

    fn publish_regex_envelope(
        &self,
        envelope: &Envelope,
    ) -> Result<usize, TransportError> {
        (**self).publish_regex_envelope(envelope)
    }

    fn forward_subscription(
        &self,
        descriptor: SubscriptionDescriptor,
    ) -> Result<SubscriptionId, TransportError> {
        (**self).forward_subscription(descriptor)
    }

    fn forward_regex(
        &self,
        descriptor: RegexDescriptor,
    ) -> Result<SubscriptionId, TransportError> {
        (**self).forward_regex(descriptor)
    }

    fn withdraw(
        &self,
        id: SubscriptionId,
    ) -> Result<bool, TransportError> {
        (**self).withdraw(id)
    }
}

use std::sync::Arc;

use plexus_error::TransportError;

use super::{
    BoundaryId, DeliveryConfig, Envelope, InnerTransport, Pollable, RegexDescriptor, RegexFilter,
    RegexSubscription, Subscription, SubscriptionDescriptor, SubscriptionId, SubscriptionStore,
    Transporter, TransporterId,
};
use crate::{
    group::Group,
    marshalling::{MarshallingScheme, Scheme, SerializerParser},
};

/// The innermost transporter: dispatch between threads of one process.
///
/// A cheap handle over a shared [`SubscriptionStore`] bound to one
/// boundary. Clones share identity and boundary.
#[derive(Clone)]
pub struct InterThreadTransporter {
    id: TransporterId,
    store: Arc<SubscriptionStore>,
    boundary: BoundaryId,
}

impl InterThreadTransporter {
    /// Handle bound to the calling thread's boundary.
    pub fn new(store: Arc<SubscriptionStore>) -> Self {
        Self::with_boundary(store, BoundaryId::current())
    }

    pub fn with_boundary(
        store: Arc<SubscriptionStore>,
        boundary: BoundaryId,
    ) -> Self {
        Self {
            id: TransporterId::next(),
            store,
            boundary,
        }
    }

    pub fn id(&self) -> TransporterId {
        self.id
    }

    pub fn boundary(&self) -> BoundaryId {
        self.boundary
    }

    pub fn store(&self) -> &Arc<SubscriptionStore> {
        &self.store
    }

    pub fn subscription_count(&self) -> Result<usize, TransportError> {
        self.store.subscription_count(self.boundary)
    }
}

impl std::fmt::Debug for InterThreadTransporter {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("InterThreadTransporter")
            .field("id", &self.id)
            .field("boundary", &self.boundary)
            .finish()
    }
}

impl Transporter for InterThreadTransporter {
    fn publish_with<S, T>(
        &self,
        value: &T,
        group: &Group,
        config: Option<&DeliveryConfig>,
    ) -> Result<usize, TransportError>
    where
        S: MarshallingScheme,
        T: SerializerParser<S>,
    {
        self.store.publish::<S, T>(self.boundary, value, group, config)
    }

    fn subscribe_with<S, T>(
        &self,
        subscription: Subscription<T, S>,
    ) -> Result<SubscriptionId, TransportError>
    where
        S: MarshallingScheme,
        T: SerializerParser<S>,
    {
        self.store.subscribe(self.boundary, subscription)
    }

    fn subscribe_regex<F>(
        &self,
        filter: RegexFilter,
        handler: F,
    ) -> Result<SubscriptionId, TransportError>
    where
        F: Fn(&[u8], Scheme, &str, &Group) + Send + Sync + 'static,
    {
        self.store
            .subscribe_regex(self.boundary, RegexSubscription::new(filter, handler))
    }

    fn unsubscribe(
        &self,
        id: SubscriptionId,
    ) -> Result<bool, TransportError> {
        self.store.unsubscribe(self.boundary, id)
    }
}

impl InnerTransport for InterThreadTransporter {
    fn publish_envelope(
        &self,
        envelope: &Envelope,
    ) -> Result<usize, TransportError> {
        self.store.publish_envelope(self.boundary, envelope)
    }

    fn publish_regex_envelope(
        &self,
        envelope: &Envelope,
    ) -> Result<usize, TransportError> {
        self.store.publish_regex_envelope(self.boundary, envelope)
    }

    fn forward_subscription(
        &self,
        descriptor: SubscriptionDescriptor,
    ) -> Result<SubscriptionId, TransportError> {
        self.store.register_descriptor(self.boundary, descriptor)
    }

    fn forward_regex(
        &self,
        descriptor: RegexDescriptor,
    ) -> Result<SubscriptionId, TransportError> {
        self.store
            .register_regex_descriptor(self.boundary, descriptor)
    }

    fn withdraw(
        &self,
        id: SubscriptionId,
    ) -> Result<bool, TransportError> {
        self.store.unsubscribe(self.boundary, id)
    }
}

impl Pollable for InterThreadTransporter {
    /// Delivery is synchronous, so polling reports what was delivered in
    /// this boundary since the last poll.
    fn poll_pending(&self) -> Result<usize, TransportError> {
        Ok(self.store.take_delivered(self.boundary))
    }
}

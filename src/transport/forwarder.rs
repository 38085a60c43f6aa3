//! Outer layer of the transport stack.
//!
//! A forwarder owns a private subscriber set and mirrors it onto an inner
//! transport: typed subscriptions become descriptors registered below,
//! publications are dispatched locally and handed down as one serialized
//! envelope. Values coming back up are parsed once and delivered to every
//! local subscriber of that key.

use std::{collections::HashMap, sync::Arc};

use bytes::Bytes;
use once_cell::unsync::OnceCell;
use parking_lot::Mutex;
use plexus_error::TransportError;
use tracing::{debug, trace, warn};

use super::{
    BoundaryId, DeliveryConfig, Envelope, InnerTransport, InterThreadTransporter, Pollable,
    RegexDescriptor, RegexFilter, RegexHandler, RegexSubscription, Subscription,
    SubscriptionDescriptor, SubscriptionId, SubscriptionStore, Transporter, TransporterId,
};
use crate::{
    group::Group,
    marshalling::{MarshallingScheme, Scheme, SerializerParser},
};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct ForwardKey {
    scheme: Scheme,
    type_name: Arc<str>,
    group: Group,
}

/// Local subscribers sharing one descriptor below.
#[derive(Debug, Default)]
struct ForwardedInterest {
    /// `None` while the descriptor is being registered.
    inner_id: Option<SubscriptionId>,
    locals: Vec<SubscriptionId>,
}

pub struct InterProcessForwarder<I: InnerTransport> {
    id: TransporterId,
    local: InterThreadTransporter,
    inner: I,
    forwarded: Mutex<HashMap<ForwardKey, ForwardedInterest>>,
    /// Local regex subscription -> descriptor id below.
    regex_forwarded: Mutex<HashMap<SubscriptionId, SubscriptionId>>,
}

impl<I: InnerTransport> InterProcessForwarder<I> {
    pub fn new(inner: I) -> Self {
        Self::with_store(inner, Arc::new(SubscriptionStore::new()))
    }

    /// Keeps the local subscriber set in a fresh partition of `store`.
    pub fn with_store(
        inner: I,
        store: Arc<SubscriptionStore>,
    ) -> Self {
        Self {
            id: TransporterId::next(),
            local: InterThreadTransporter::with_boundary(store, BoundaryId::new()),
            inner,
            forwarded: Mutex::new(HashMap::new()),
            regex_forwarded: Mutex::new(HashMap::new()),
        }
    }

    pub fn id(&self) -> TransporterId {
        self.id
    }

    pub fn inner(&self) -> &I {
        &self.inner
    }

    /// Descriptors currently registered on the inner transport.
    pub fn forwarded_count(&self) -> usize {
        let typed = self
            .forwarded
            .lock()
            .values()
            .filter(|i| i.inner_id.is_some())
            .count();
        typed + self.regex_forwarded.lock().len()
    }

    pub fn local_subscription_count(&self) -> Result<usize, TransportError> {
        self.local.subscription_count()
    }

    fn descriptor_for<S, T>(
        &self,
        key: &ForwardKey,
    ) -> SubscriptionDescriptor
    where
        S: MarshallingScheme,
        T: SerializerParser<S>,
    {
        let local = self.local.clone();
        SubscriptionDescriptor::new(
            self.id,
            key.scheme,
            key.type_name.clone(),
            key.group.clone(),
            move |envelope: &Envelope| {
                let parsed =
                    match <T as SerializerParser<S>>::parse(envelope.bytes(), envelope.type_name()) {
                        Ok(parsed) => parsed,
                        Err(err) => {
                            warn!(
                                scheme = %envelope.scheme(),
                                type_name = envelope.type_name(),
                                group = %envelope.group(),
                                %err,
                                "dropping forwarded publication that failed to parse"
                            );
                            return;
                        }
                    };
                if let Err(err) = local.store().deliver_parsed::<S, T>(
                    local.boundary(),
                    &parsed.value,
                    envelope.group(),
                ) {
                    warn!(%err, "local delivery of forwarded publication failed");
                }
            },
        )
    }

    /// Registers the descriptor for `key` below and records its id.
    fn forward<S, T>(
        &self,
        key: &ForwardKey,
    ) -> Result<(), TransportError>
    where
        S: MarshallingScheme,
        T: SerializerParser<S>,
    {
        let inner_id = self
            .inner
            .forward_subscription(self.descriptor_for::<S, T>(key))?;
        let stale = {
            let mut forwarded = self.forwarded.lock();
            match forwarded.get_mut(key) {
                Some(interest) if interest.inner_id.is_none() => {
                    interest.inner_id = Some(inner_id);
                    None
                }
                // Every local subscriber left, or another descriptor won.
                _ => Some(inner_id),
            }
        };
        if let Some(stale) = stale {
            self.inner.withdraw(stale)?;
        }
        Ok(())
    }

    /// Forgets `local_id`; returns the descriptor to withdraw when it was
    /// the last subscriber of its key.
    fn release(
        &self,
        local_id: SubscriptionId,
    ) -> Option<SubscriptionId> {
        let mut forwarded = self.forwarded.lock();
        let key = forwarded
            .iter()
            .find(|(_, interest)| interest.locals.contains(&local_id))
            .map(|(key, _)| key.clone())?;
        let interest = forwarded.get_mut(&key)?;
        interest.locals.retain(|id| *id != local_id);
        if interest.locals.is_empty() {
            forwarded.remove(&key).and_then(|interest| interest.inner_id)
        } else {
            None
        }
    }
}

impl<I: InnerTransport> Transporter for InterProcessForwarder<I> {
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
        let cache = OnceCell::new();
        let local = self.local.store().publish_cached::<S, T>(
            self.local.boundary(),
            value,
            group,
            config,
            Some(self.id),
            &cache,
        )?;

        let bytes = match cache.get_or_try_init(|| value.serialize().map(Bytes::from)) {
            Ok(bytes) => bytes.clone(),
            Err(err) => {
                warn!(scheme = %S::SCHEME, %group, %err, "serialization failed, publication stays local");
                return Ok(local);
            }
        };
        let envelope = Envelope::new(S::SCHEME, value.type_name_of(), group.clone(), bytes)
            .with_config(config.cloned())
            .with_origin(self.id);
        let remote = self.inner.publish_envelope(&envelope)?;

        trace!(
            forwarder = %self.id,
            scheme = %S::SCHEME,
            type_name = envelope.type_name(),
            %group,
            local,
            remote,
            "forwarded publication"
        );
        Ok(local + remote)
    }

    fn subscribe_with<S, T>(
        &self,
        subscription: Subscription<T, S>,
    ) -> Result<SubscriptionId, TransportError>
    where
        S: MarshallingScheme,
        T: SerializerParser<S>,
    {
        let key = ForwardKey {
            scheme: S::SCHEME,
            type_name: T::type_name().into(),
            group: subscription.group().clone(),
        };
        let local_id = self.local.subscribe_with(subscription)?;

        let first = {
            let mut forwarded = self.forwarded.lock();
            let interest = forwarded.entry(key.clone()).or_default();
            interest.locals.push(local_id);
            interest.locals.len() == 1
        };

        if first {
            if let Err(err) = self.forward::<S, T>(&key) {
                self.release(local_id);
                self.local.unsubscribe(local_id)?;
                return Err(err);
            }
        }

        debug!(
            forwarder = %self.id,
            id = %local_id,
            scheme = %key.scheme,
            type_name = %key.type_name,
            group = %key.group,
            forwarded = first,
            "subscribed"
        );
        Ok(local_id)
    }

    fn subscribe_regex<F>(
        &self,
        filter: RegexFilter,
        handler: F,
    ) -> Result<SubscriptionId, TransportError>
    where
        F: Fn(&[u8], Scheme, &str, &Group) + Send + Sync + 'static,
    {
        let handler: RegexHandler = Arc::new(handler);
        let local_id = self.local.store().subscribe_regex(
            self.local.boundary(),
            RegexSubscription::with_handler(filter.clone(), handler.clone()),
        )?;

        let store = self.local.store().clone();
        let boundary = self.local.boundary();
        let descriptor = RegexDescriptor::new(self.id, filter, move |envelope: &Envelope| {
            handler(
                envelope.bytes(),
                envelope.scheme(),
                envelope.type_name(),
                envelope.group(),
            );
            store.record_delivered(boundary, 1);
        });

        match self.inner.forward_regex(descriptor) {
            Ok(inner_id) => {
                self.regex_forwarded.lock().insert(local_id, inner_id);
                Ok(local_id)
            }
            Err(err) => {
                self.local.unsubscribe(local_id)?;
                Err(err)
            }
        }
    }

    fn unsubscribe(
        &self,
        id: SubscriptionId,
    ) -> Result<bool, TransportError> {
        if !self.local.unsubscribe(id)? {
            return Ok(false);
        }
        let regex_inner = self.regex_forwarded.lock().remove(&id);
        let withdraw = regex_inner.or_else(|| self.release(id));
        if let Some(inner_id) = withdraw {
            self.inner.withdraw(inner_id)?;
            debug!(forwarder = %self.id, %id, %inner_id, "forwarded interest withdrawn");
        }
        Ok(true)
    }
}

impl<I: InnerTransport> Pollable for InterProcessForwarder<I> {
    fn poll_pending(&self) -> Result<usize, TransportError> {
        self.local.poll_pending()
    }
}

impl<I: InnerTransport> Drop for InterProcessForwarder<I> {
    fn drop(&mut self) {
        let ids: Vec<SubscriptionId> = self
            .forwarded
            .get_mut()
            .drain()
            .filter_map(|(_, interest)| interest.inner_id)
            .chain(self.regex_forwarded.get_mut().drain().map(|(_, id)| id))
            .collect();
        for id in ids {
            if let Err(err) = self.inner.withdraw(id) {
                warn!(forwarder = %self.id, %id, %err, "failed to withdraw forwarded interest");
            }
        }
        self.local.store().remove_partition(self.local.boundary());
    }
}

////////////////////////////////////////////////////////////////////////////////
// Tests
////////////////////////////////////////////////////////////////////////////////

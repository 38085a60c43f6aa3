use std::{
    any::{Any, TypeId},
    fmt,
    marker::PhantomData,
    sync::Arc,
};

use plexus_error::MarshallingError;

use super::{envelope::Route, Envelope, SubscriptionId, TransporterId};
use crate::{
    group::Group,
    marshalling::{MarshallingScheme, Scheme, SerializerParser},
};

pub type Handler<T> = Arc<dyn Fn(&T) + Send + Sync>;
pub type GroupExtractor<T> = Arc<dyn Fn(&T) -> Group + Send + Sync>;

/// A typed subscriber: handler plus the group it listens on.
///
/// With an extractor, the group is computed from each received value and
/// compared against the subscribed group instead of the publication's
/// group. That is content addressing: one publication group can fan out to
/// subscribers keyed by a field of the message.
pub struct Subscription<T, S> {
    id: SubscriptionId,
    group: Group,
    extractor: Option<GroupExtractor<T>>,
    handler: Handler<T>,
    _scheme: PhantomData<fn() -> S>,
}

impl<T, S> Subscription<T, S>
where
    S: MarshallingScheme,
    T: SerializerParser<S>,
{
    pub fn new<F>(
        group: Group,
        handler: F,
    ) -> Self
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        Self {
            id: SubscriptionId::next(),
            group,
            extractor: None,
            handler: Arc::new(handler),
            _scheme: PhantomData,
        }
    }

    pub fn with_extractor<E>(
        mut self,
        extractor: E,
    ) -> Self
    where
        E: Fn(&T) -> Group + Send + Sync + 'static,
    {
        self.extractor = Some(Arc::new(extractor));
        self
    }

    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    pub fn group(&self) -> &Group {
        &self.group
    }

    pub fn scheme(&self) -> Scheme {
        S::SCHEME
    }

    fn matches(
        &self,
        value: &T,
        group: &Group,
    ) -> bool {
        match &self.extractor {
            Some(extract) => extract(value) == self.group,
            None => *group == self.group,
        }
    }
}

impl<T, S> fmt::Debug for Subscription<T, S>
where
    S: MarshallingScheme,
    T: SerializerParser<S>,
{
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("scheme", &S::SCHEME)
            .field("type", &T::type_name())
            .field("group", &self.group)
            .field("extractor", &self.extractor.is_some())
            .finish()
    }
}

/// Object-safe view of a [`Subscription`], so subscribers of unrelated
/// types can share one table.
pub(crate) trait ErasedSubscription: Send + Sync {
    fn id(&self) -> SubscriptionId;

    fn value_type(&self) -> TypeId;

    /// Runs the handler if `value` has the subscribed type and the group
    /// matches. Returns whether it ran.
    fn deliver(
        &self,
        value: &dyn Any,
        group: &Group,
    ) -> bool;

    fn parse(
        &self,
        envelope: &Envelope,
    ) -> Result<Box<dyn Any + Send + Sync>, MarshallingError>;
}

impl<T, S> ErasedSubscription for Subscription<T, S>
where
    S: MarshallingScheme,
    T: SerializerParser<S>,
{
    fn id(&self) -> SubscriptionId {
        self.id
    }

    fn value_type(&self) -> TypeId {
        TypeId::of::<T>()
    }

    fn deliver(
        &self,
        value: &dyn Any,
        group: &Group,
    ) -> bool {
        match value.downcast_ref::<T>() {
            Some(value) if self.matches(value, group) => {
                (self.handler)(value);
                true
            }
            _ => false,
        }
    }

    fn parse(
        &self,
        envelope: &Envelope,
    ) -> Result<Box<dyn Any + Send + Sync>, MarshallingError> {
        let parsed = T::parse(envelope.bytes(), envelope.type_name())?;
        Ok(Box::new(parsed.value))
    }
}

/// Typed interest registered by another layer on this one.
///
/// Carries only what the receiving layer needs to route: scheme, type name,
/// group, and a relay that takes matching envelopes back across the
/// boundary. The value type stays on the registering side.
pub struct SubscriptionDescriptor {
    pub(crate) id: SubscriptionId,
    pub(crate) origin: TransporterId,
    pub(crate) scheme: Scheme,
    pub(crate) type_name: Arc<str>,
    pub(crate) group: Group,
    pub(crate) relay: Arc<dyn Fn(&Envelope) + Send + Sync>,
}

impl SubscriptionDescriptor {
    pub fn new<F>(
        origin: TransporterId,
        scheme: Scheme,
        type_name: impl Into<Arc<str>>,
        group: Group,
        relay: F,
    ) -> Self
    where
        F: Fn(&Envelope) + Send + Sync + 'static,
    {
        Self {
            id: SubscriptionId::next(),
            origin,
            scheme,
            type_name: type_name.into(),
            group,
            relay: Arc::new(relay),
        }
    }

    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    pub fn scheme(&self) -> Scheme {
        self.scheme
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn group(&self) -> &Group {
        &self.group
    }

    pub(crate) fn wants(
        &self,
        route: &Route<'_>,
    ) -> bool {
        !route.is_from(self.origin)
            && route.scheme == self.scheme
            && route.type_name == &*self.type_name
            && route.group == &self.group
    }
}

impl fmt::Debug for SubscriptionDescriptor {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("SubscriptionDescriptor")
            .field("id", &self.id)
            .field("origin", &self.origin)
            .field("scheme", &self.scheme)
            .field("type", &self.type_name)
            .field("group", &self.group)
            .finish()
    }
}

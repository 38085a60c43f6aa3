//! Pattern subscriptions.
//!
//! A regex subscriber sees raw bytes of every publication whose scheme is
//! in its set and whose type name and group name fully match its patterns.
//! Nothing is parsed on its behalf.

use std::{collections::BTreeSet, fmt, sync::Arc};

use once_cell::sync::Lazy;
use plexus_error::TransportError;
use regex::Regex;

use super::{envelope::Route, Envelope, SubscriptionId, TransporterId};
use crate::{group::Group, marshalling::Scheme};

/// Handler for pattern subscriptions: bytes, scheme, type name, group.
pub type RegexHandler = Arc<dyn Fn(&[u8], Scheme, &str, &Group) + Send + Sync>;

static MATCH_ALL: Lazy<Regex> =
    Lazy::new(|| Regex::new("^(?:.*)$").expect("literal pattern compiles"));

#[derive(Clone)]
pub struct RegexFilter {
    /// Empty means every scheme.
    schemes: BTreeSet<Scheme>,
    type_source: Arc<str>,
    group_source: Arc<str>,
    type_regex: Regex,
    group_regex: Regex,
}

fn compile(pattern: &str) -> Result<Regex, TransportError> {
    Regex::new(&format!("^(?:{pattern})$")).map_err(|e| TransportError::InvalidPattern {
        pattern: pattern.to_owned(),
        reason: e.to_string(),
    })
}

impl RegexFilter {
    /// Both patterns must match the whole name.
    pub fn new<I>(
        schemes: I,
        type_pattern: &str,
        group_pattern: &str,
    ) -> Result<Self, TransportError>
    where
        I: IntoIterator<Item = Scheme>,
    {
        Ok(Self {
            schemes: schemes.into_iter().collect(),
            type_source: Arc::from(type_pattern),
            group_source: Arc::from(group_pattern),
            type_regex: compile(type_pattern)?,
            group_regex: compile(group_pattern)?,
        })
    }

    /// Matches every publication.
    pub fn any() -> Self {
        Self {
            schemes: BTreeSet::new(),
            type_source: Arc::from(".*"),
            group_source: Arc::from(".*"),
            type_regex: MATCH_ALL.clone(),
            group_regex: MATCH_ALL.clone(),
        }
    }

    pub fn schemes(&self) -> &BTreeSet<Scheme> {
        &self.schemes
    }

    pub fn type_pattern(&self) -> &str {
        &self.type_source
    }

    pub fn group_pattern(&self) -> &str {
        &self.group_source
    }

    pub fn matches(
        &self,
        scheme: Scheme,
        type_name: &str,
        group: &Group,
    ) -> bool {
        (self.schemes.is_empty() || self.schemes.contains(&scheme))
            && self.type_regex.is_match(type_name)
            && self.group_regex.is_match(group.name())
    }

    pub fn matches_envelope(
        &self,
        envelope: &Envelope,
    ) -> bool {
        self.matches(envelope.scheme(), envelope.type_name(), envelope.group())
    }

    pub(crate) fn matches_route(
        &self,
        route: &Route<'_>,
    ) -> bool {
        self.matches(route.scheme, route.type_name, route.group)
    }
}

impl fmt::Debug for RegexFilter {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("RegexFilter")
            .field("schemes", &self.schemes)
            .field("type", &self.type_source)
            .field("group", &self.group_source)
            .finish()
    }
}

/// A local pattern subscriber.
pub struct RegexSubscription {
    pub(crate) id: SubscriptionId,
    pub(crate) filter: RegexFilter,
    pub(crate) handler: RegexHandler,
}

impl RegexSubscription {
    pub fn new<F>(
        filter: RegexFilter,
        handler: F,
    ) -> Self
    where
        F: Fn(&[u8], Scheme, &str, &Group) + Send + Sync + 'static,
    {
        Self::with_handler(filter, Arc::new(handler))
    }

    /// Variant for a handler that is already shared.
    pub fn with_handler(
        filter: RegexFilter,
        handler: RegexHandler,
    ) -> Self {
        Self {
            id: SubscriptionId::next(),
            filter,
            handler,
        }
    }

    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    pub(crate) fn deliver(
        &self,
        envelope: &Envelope,
    ) {
        (self.handler)(
            envelope.bytes(),
            envelope.scheme(),
            envelope.type_name(),
            envelope.group(),
        );
    }
}

/// Pattern interest registered by another layer on this one.
///
/// `relay` receives matching envelopes and passes them back across the
/// boundary. Envelopes injected by `origin` are never relayed back.
pub struct RegexDescriptor {
    pub(crate) id: SubscriptionId,
    pub(crate) origin: TransporterId,
    pub(crate) filter: RegexFilter,
    pub(crate) relay: Arc<dyn Fn(&Envelope) + Send + Sync>,
}

impl RegexDescriptor {
    pub fn new<F>(
        origin: TransporterId,
        filter: RegexFilter,
        relay: F,
    ) -> Self
    where
        F: Fn(&Envelope) + Send + Sync + 'static,
    {
        Self {
            id: SubscriptionId::next(),
            origin,
            filter,
            relay: Arc::new(relay),
        }
    }

    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    pub fn filter(&self) -> &RegexFilter {
        &self.filter
    }

    pub(crate) fn wants(
        &self,
        route: &Route<'_>,
    ) -> bool {
        !route.is_from(self.origin) && self.filter.matches_route(route)
    }
}

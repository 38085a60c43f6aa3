//! Partitioned subscription store.
//!
//! Subscriptions are grouped by [`BoundaryId`]. Each partition sits behind
//! its own reader/writer lock: publications take it shared, subscription
//! changes take it exclusive. Handlers always run after the lock is
//! released, so a handler may publish or subscribe again without
//! deadlocking.
//!
//! Lock acquisition is bounded by [`StoreConfig::lock_timeout`]. Running out
//! of time is the one failure that propagates to the caller as
//! [`TransportError::LockTimeout`]; everything that concerns a single
//! message is logged and skipped.

use std::{
    any::{Any, TypeId},
    collections::HashMap,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};

use bytes::Bytes;
use dashmap::DashMap;
use once_cell::unsync::OnceCell;
use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use plexus_error::TransportError;
use tracing::{debug, error, trace, warn};

use super::{
    envelope::Route,
    subscription::{ErasedSubscription, Subscription},
    BoundaryId, DeliveryConfig, Envelope, RegexDescriptor, RegexSubscription,
    SubscriptionDescriptor, SubscriptionId, TransporterId,
};
use crate::{
    group::Group,
    marshalling::{MarshallingScheme, Scheme, SerializerParser},
};

pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreConfig {
    pub lock_timeout: Duration,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
        }
    }
}

/// Observer of everything that should leave a partition: envelopes
/// injected through [`SubscriptionStore::publish_envelope`] and changes of
/// forwarded interest.
///
/// Portals attach one of these to reach a message bus.
pub trait EnvelopeTap: Send + Sync {
    fn on_envelope(
        &self,
        envelope: &Envelope,
    );

    fn on_subscription(
        &self,
        _descriptor: &SubscriptionDescriptor,
    ) {
    }

    fn on_regex(
        &self,
        _descriptor: &RegexDescriptor,
    ) {
    }

    fn on_withdraw(
        &self,
        _id: SubscriptionId,
    ) {
    }
}

struct TapEntry {
    id: SubscriptionId,
    origin: TransporterId,
    tap: Arc<dyn EnvelopeTap>,
}

type TypedTable = HashMap<Scheme, HashMap<Arc<str>, Vec<Arc<dyn ErasedSubscription>>>>;

#[derive(Default)]
struct PartitionState {
    typed: TypedTable,
    descriptors: Vec<Arc<SubscriptionDescriptor>>,
    regex: Vec<Arc<RegexSubscription>>,
    regex_descriptors: Vec<Arc<RegexDescriptor>>,
    taps: Vec<Arc<TapEntry>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Removed {
    Nothing,
    Local,
    Forwarded,
}

impl PartitionState {
    fn len(&self) -> usize {
        let typed: usize = self
            .typed
            .values()
            .flat_map(|by_type| by_type.values())
            .map(Vec::len)
            .sum();
        typed + self.descriptors.len() + self.regex.len() + self.regex_descriptors.len()
    }

    fn remove(
        &mut self,
        id: SubscriptionId,
    ) -> Removed {
        let mut found = false;
        for by_type in self.typed.values_mut() {
            for subs in by_type.values_mut() {
                let before = subs.len();
                subs.retain(|s| s.id() != id);
                found |= subs.len() != before;
            }
            by_type.retain(|_, subs| !subs.is_empty());
        }
        self.typed.retain(|_, by_type| !by_type.is_empty());
        if found {
            return Removed::Local;
        }

        if let Some(pos) = self.regex.iter().position(|r| r.id == id) {
            self.regex.remove(pos);
            return Removed::Local;
        }
        if let Some(pos) = self.taps.iter().position(|t| t.id == id) {
            self.taps.remove(pos);
            return Removed::Local;
        }
        if let Some(pos) = self.descriptors.iter().position(|d| d.id == id) {
            self.descriptors.remove(pos);
            return Removed::Forwarded;
        }
        if let Some(pos) = self.regex_descriptors.iter().position(|d| d.id == id) {
            self.regex_descriptors.remove(pos);
            return Removed::Forwarded;
        }
        Removed::Nothing
    }

    fn taps_except(
        &self,
        origin: TransporterId,
    ) -> Vec<Arc<TapEntry>> {
        self.taps
            .iter()
            .filter(|t| t.origin != origin)
            .cloned()
            .collect()
    }

    fn targets(
        &self,
        route: &Route<'_>,
        scope: Scope,
    ) -> Targets {
        let mut targets = Targets::default();

        if scope != Scope::RegexOnly {
            if let Some(subs) = self
                .typed
                .get(&route.scheme)
                .and_then(|by_type| by_type.get(route.type_name))
            {
                targets.typed = subs.clone();
            }
        }
        if scope == Scope::TypedOnly {
            return targets;
        }

        if scope != Scope::RegexOnly {
            targets.descriptors = self
                .descriptors
                .iter()
                .filter(|d| d.wants(route))
                .cloned()
                .collect();
        }
        targets.regex = self
            .regex
            .iter()
            .filter(|r| r.filter.matches_route(route))
            .cloned()
            .collect();
        targets.regex_descriptors = self
            .regex_descriptors
            .iter()
            .filter(|d| d.wants(route))
            .cloned()
            .collect();
        if scope == Scope::Envelope {
            targets.taps = self
                .taps
                .iter()
                .filter(|t| !route.is_from(t.origin))
                .cloned()
                .collect();
        }
        targets
    }
}

/// Which consumers a dispatch may reach.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Scope {
    /// A typed publication made inside the partition.
    Local,
    /// A value that was already parsed on the way in.
    TypedOnly,
    /// An envelope entering the partition from another layer.
    Envelope,
    /// Regex-group traffic.
    RegexOnly,
}

/// Consumers selected under the read lock, invoked after it is released.
#[derive(Default)]
struct Targets {
    typed: Vec<Arc<dyn ErasedSubscription>>,
    descriptors: Vec<Arc<SubscriptionDescriptor>>,
    regex: Vec<Arc<RegexSubscription>>,
    regex_descriptors: Vec<Arc<RegexDescriptor>>,
    taps: Vec<Arc<TapEntry>>,
}

impl Targets {
    fn wants_bytes(&self) -> bool {
        !self.descriptors.is_empty() || !self.regex.is_empty() || !self.regex_descriptors.is_empty()
    }

    fn deliver_envelope(
        &self,
        envelope: &Envelope,
    ) -> usize {
        for descriptor in &self.descriptors {
            (descriptor.relay)(envelope);
        }
        for sub in &self.regex {
            sub.deliver(envelope);
        }
        for descriptor in &self.regex_descriptors {
            (descriptor.relay)(envelope);
        }
        self.descriptors.len() + self.regex.len() + self.regex_descriptors.len()
    }

    /// Parses once per distinct value type and hands the value to every
    /// typed subscriber of that type.
    fn deliver_parsed(
        &self,
        envelope: &Envelope,
    ) -> usize {
        let mut parsed: Vec<(TypeId, Option<Box<dyn Any + Send + Sync>>)> = Vec::new();
        let mut matched = 0;

        for sub in &self.typed {
            let value_type = sub.value_type();
            let slot = match parsed.iter().position(|(t, _)| *t == value_type) {
                Some(slot) => slot,
                None => {
                    let value = match sub.parse(envelope) {
                        Ok(value) => Some(value),
                        Err(err) => {
                            warn!(
                                scheme = %envelope.scheme(),
                                type_name = envelope.type_name(),
                                group = %envelope.group(),
                                %err,
                                "dropping publication that failed to parse"
                            );
                            None
                        }
                    };
                    parsed.push((value_type, value));
                    parsed.len() - 1
                }
            };
            if let Some(value) = &parsed[slot].1 {
                let value: &dyn Any = &**value;
                if sub.deliver(value, envelope.group()) {
                    matched += 1;
                }
            }
        }
        matched
    }
}

struct Partition {
    state: RwLock<PartitionState>,
    delivered: AtomicUsize,
}

impl Partition {
    fn new() -> Self {
        Self {
            state: RwLock::new(PartitionState::default()),
            delivered: AtomicUsize::new(0),
        }
    }
}

/// Subscriptions of every boundary in the process.
pub struct SubscriptionStore {
    partitions: DashMap<BoundaryId, Arc<Partition>>,
    config: StoreConfig,
}

impl Default for SubscriptionStore {
    fn default() -> Self {
        Self::new()
    }
}

////////////////////////////////////////////////////////////////////////////////
// Internals
////////////////////////////////////////////////////////////////////////////////

impl SubscriptionStore {
    pub fn new() -> Self {
        Self::with_config(StoreConfig::default())
    }

    pub fn with_config(config: StoreConfig) -> Self {
        Self {
            partitions: DashMap::new(),
            config,
        }
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    fn partition(
        &self,
        boundary: BoundaryId,
    ) -> Arc<Partition> {
        if let Some(partition) = self.partitions.get(&boundary) {
            return partition.clone();
        }
        self.partitions
            .entry(boundary)
            .or_insert_with(|| Arc::new(Partition::new()))
            .clone()
    }

    fn existing(
        &self,
        boundary: BoundaryId,
    ) -> Option<Arc<Partition>> {
        self.partitions.get(&boundary).map(|p| p.value().clone())
    }

    /// Runs `f` while another party holds the partition's write lock.
    #[cfg(test)]
    pub(crate) fn while_locked<R>(
        &self,
        boundary: BoundaryId,
        f: impl FnOnce() -> R,
    ) -> R {
        let partition = self.partition(boundary);
        let _held = partition.state.write();
        f()
    }

    fn timeout_error(
        &self,
        boundary: BoundaryId,
        mode: &'static str,
    ) -> TransportError {
        let waited_ms = self.config.lock_timeout.as_millis() as u64;
        error!(%boundary, mode, waited_ms, "subscription store lock timed out");
        TransportError::LockTimeout { waited_ms }
    }

    fn read<'a>(
        &self,
        boundary: BoundaryId,
        partition: &'a Partition,
    ) -> Result<RwLockReadGuard<'a, PartitionState>, TransportError> {
        partition
            .state
            .try_read_for(self.config.lock_timeout)
            .ok_or_else(|| self.timeout_error(boundary, "read"))
    }

    fn write<'a>(
        &self,
        boundary: BoundaryId,
        partition: &'a Partition,
    ) -> Result<RwLockWriteGuard<'a, PartitionState>, TransportError> {
        partition
            .state
            .try_write_for(self.config.lock_timeout)
            .ok_or_else(|| self.timeout_error(boundary, "write"))
    }

    fn reject_reserved(group: &Group) -> Result<(), TransportError> {
        if group.is_reserved() {
            return Err(TransportError::ReservedGroup {
                group: group.to_string(),
            });
        }
        Ok(())
    }

    ////////////////////////////////////////////////////////////////////////////
    // Registration
    ////////////////////////////////////////////////////////////////////////////

    pub fn subscribe<S, T>(
        &self,
        boundary: BoundaryId,
        subscription: Subscription<T, S>,
    ) -> Result<SubscriptionId, TransportError>
    where
        S: MarshallingScheme,
        T: SerializerParser<S>,
    {
        Self::reject_reserved(subscription.group())?;
        let id = subscription.id();
        let type_name: Arc<str> = T::type_name().into();
        let partition = self.partition(boundary);
        {
            let mut state = self.write(boundary, &partition)?;
            state
                .typed
                .entry(S::SCHEME)
                .or_default()
                .entry(type_name.clone())
                .or_default()
                .push(Arc::new(subscription));
        }
        debug!(%boundary, %id, scheme = %S::SCHEME, %type_name, "typed subscription added");
        Ok(id)
    }

    pub fn subscribe_regex(
        &self,
        boundary: BoundaryId,
        subscription: RegexSubscription,
    ) -> Result<SubscriptionId, TransportError> {
        let id = subscription.id;
        let partition = self.partition(boundary);
        {
            let mut state = self.write(boundary, &partition)?;
            debug!(%boundary, %id, filter = ?subscription.filter, "regex subscription added");
            state.regex.push(Arc::new(subscription));
        }
        Ok(id)
    }

    /// Registers typed interest of another layer.
    pub fn register_descriptor(
        &self,
        boundary: BoundaryId,
        descriptor: SubscriptionDescriptor,
    ) -> Result<SubscriptionId, TransportError> {
        Self::reject_reserved(&descriptor.group)?;
        let descriptor = Arc::new(descriptor);
        let partition = self.partition(boundary);
        let taps = {
            let mut state = self.write(boundary, &partition)?;
            state.descriptors.push(descriptor.clone());
            state.taps_except(descriptor.origin)
        };
        debug!(%boundary, ?descriptor, "forwarded subscription registered");
        for entry in taps {
            entry.tap.on_subscription(&descriptor);
        }
        Ok(descriptor.id)
    }

    /// Registers pattern interest of another layer.
    pub fn register_regex_descriptor(
        &self,
        boundary: BoundaryId,
        descriptor: RegexDescriptor,
    ) -> Result<SubscriptionId, TransportError> {
        let descriptor = Arc::new(descriptor);
        let partition = self.partition(boundary);
        let taps = {
            let mut state = self.write(boundary, &partition)?;
            state.regex_descriptors.push(descriptor.clone());
            state.taps_except(descriptor.origin)
        };
        debug!(%boundary, id = %descriptor.id, filter = ?descriptor.filter, "forwarded regex subscription registered");
        for entry in taps {
            entry.tap.on_regex(&descriptor);
        }
        Ok(descriptor.id)
    }

    /// Attaches a tap and replays the forwarded interest already present.
    pub fn attach_tap(
        &self,
        boundary: BoundaryId,
        origin: TransporterId,
        tap: Arc<dyn EnvelopeTap>,
    ) -> Result<SubscriptionId, TransportError> {
        let entry = Arc::new(TapEntry {
            id: SubscriptionId::next(),
            origin,
            tap,
        });
        let partition = self.partition(boundary);
        let (descriptors, regex_descriptors) = {
            let mut state = self.write(boundary, &partition)?;
            state.taps.push(entry.clone());
            let descriptors: Vec<_> = state
                .descriptors
                .iter()
                .filter(|d| d.origin != origin)
                .cloned()
                .collect();
            let regex_descriptors: Vec<_> = state
                .regex_descriptors
                .iter()
                .filter(|d| d.origin != origin)
                .cloned()
                .collect();
            (descriptors, regex_descriptors)
        };
        for descriptor in &descriptors {
            entry.tap.on_subscription(descriptor);
        }
        for descriptor in &regex_descriptors {
            entry.tap.on_regex(descriptor);
        }
        debug!(%boundary, id = %entry.id, "tap attached");
        Ok(entry.id)
    }

    /// Removes any kind of subscription, descriptor or tap by id.
    pub fn unsubscribe(
        &self,
        boundary: BoundaryId,
        id: SubscriptionId,
    ) -> Result<bool, TransportError> {
        let Some(partition) = self.existing(boundary) else {
            return Ok(false);
        };
        let (removed, taps) = {
            let mut state = self.write(boundary, &partition)?;
            let removed = state.remove(id);
            let taps = match removed {
                Removed::Forwarded => state.taps.clone(),
                _ => Vec::new(),
            };
            (removed, taps)
        };
        for entry in taps {
            entry.tap.on_withdraw(id);
        }
        if removed != Removed::Nothing {
            debug!(%boundary, %id, "subscription removed");
        }
        Ok(removed != Removed::Nothing)
    }

    ////////////////////////////////////////////////////////////////////////////
    // Publication
    ////////////////////////////////////////////////////////////////////////////

    /// Delivers `value` to the typed subscribers of `boundary` and, if any
    /// envelope consumer matches, serializes it once for all of them.
    ///
    /// Returns the number of consumers reached.
    pub fn publish<S, T>(
        &self,
        boundary: BoundaryId,
        value: &T,
        group: &Group,
        config: Option<&DeliveryConfig>,
    ) -> Result<usize, TransportError>
    where
        S: MarshallingScheme,
        T: SerializerParser<S>,
    {
        self.publish_cached::<S, T>(boundary, value, group, config, None, &OnceCell::new())
    }

    /// [`publish`](Self::publish) with the serialized form shared through
    /// `cache`, so a caller that also needs the bytes serializes only once.
    pub(crate) fn publish_cached<S, T>(
        &self,
        boundary: BoundaryId,
        value: &T,
        group: &Group,
        config: Option<&DeliveryConfig>,
        origin: Option<TransporterId>,
        cache: &OnceCell<Bytes>,
    ) -> Result<usize, TransportError>
    where
        S: MarshallingScheme,
        T: SerializerParser<S>,
    {
        Self::reject_reserved(group)?;
        let Some(partition) = self.existing(boundary) else {
            return Ok(0);
        };
        let type_name = value.type_name_of();
        let route = Route {
            scheme: S::SCHEME,
            type_name: &type_name,
            group,
            origin,
        };
        let targets = self.read(boundary, &partition)?.targets(&route, Scope::Local);

        let mut matched = 0;
        for sub in &targets.typed {
            if sub.deliver(value, group) {
                matched += 1;
            }
        }

        if targets.wants_bytes() {
            match cache.get_or_try_init(|| value.serialize().map(Bytes::from)) {
                Ok(bytes) => {
                    let mut envelope =
                        Envelope::new(S::SCHEME, type_name.clone(), group.clone(), bytes.clone())
                            .with_config(config.cloned());
                    if let Some(origin) = origin {
                        envelope = envelope.with_origin(origin);
                    }
                    matched += targets.deliver_envelope(&envelope);
                }
                Err(err) => {
                    warn!(scheme = %S::SCHEME, %type_name, %group, %err, "serialization failed, skipping envelope consumers");
                }
            }
        }

        partition.delivered.fetch_add(matched, Ordering::Relaxed);
        trace!(%boundary, scheme = %S::SCHEME, %type_name, %group, matched, "published");
        Ok(matched)
    }

    /// Delivers an already parsed value to typed subscribers only.
    pub(crate) fn deliver_parsed<S, T>(
        &self,
        boundary: BoundaryId,
        value: &T,
        group: &Group,
    ) -> Result<usize, TransportError>
    where
        S: MarshallingScheme,
        T: SerializerParser<S>,
    {
        let Some(partition) = self.existing(boundary) else {
            return Ok(0);
        };
        let type_name = value.type_name_of();
        let route = Route {
            scheme: S::SCHEME,
            type_name: &type_name,
            group,
            origin: None,
        };
        let targets = self
            .read(boundary, &partition)?
            .targets(&route, Scope::TypedOnly);
        let matched = targets
            .typed
            .iter()
            .filter(|sub| sub.deliver(value, group))
            .count();
        partition.delivered.fetch_add(matched, Ordering::Relaxed);
        Ok(matched)
    }

    /// Injects an envelope from another layer: typed subscribers get a value
    /// parsed once per type, envelope consumers and taps get the bytes.
    pub fn publish_envelope(
        &self,
        boundary: BoundaryId,
        envelope: &Envelope,
    ) -> Result<usize, TransportError> {
        Self::reject_reserved(envelope.group())?;
        let Some(partition) = self.existing(boundary) else {
            return Ok(0);
        };
        let targets = self
            .read(boundary, &partition)?
            .targets(&envelope.route(), Scope::Envelope);

        let mut matched = targets.deliver_parsed(envelope);
        matched += targets.deliver_envelope(envelope);
        for entry in &targets.taps {
            entry.tap.on_envelope(envelope);
        }

        partition.delivered.fetch_add(matched, Ordering::Relaxed);
        trace!(
            %boundary,
            scheme = %envelope.scheme(),
            type_name = envelope.type_name(),
            group = %envelope.group(),
            matched,
            taps = targets.taps.len(),
            "envelope published"
        );
        Ok(matched)
    }

    /// Regex-group traffic: reaches pattern subscribers and nothing else.
    pub fn publish_regex_envelope(
        &self,
        boundary: BoundaryId,
        envelope: &Envelope,
    ) -> Result<usize, TransportError> {
        let Some(partition) = self.existing(boundary) else {
            return Ok(0);
        };
        let targets = self
            .read(boundary, &partition)?
            .targets(&envelope.route(), Scope::RegexOnly);
        let matched = targets.deliver_envelope(envelope);
        partition.delivered.fetch_add(matched, Ordering::Relaxed);
        Ok(matched)
    }

    ////////////////////////////////////////////////////////////////////////////
    // State
    ////////////////////////////////////////////////////////////////////////////

    /// Subscriptions and descriptors held for `boundary` (taps excluded).
    pub fn subscription_count(
        &self,
        boundary: BoundaryId,
    ) -> Result<usize, TransportError> {
        match self.existing(boundary) {
            Some(partition) => Ok(self.read(boundary, &partition)?.len()),
            None => Ok(0),
        }
    }

    /// Deliveries made in `boundary` since the previous call.
    pub fn take_delivered(
        &self,
        boundary: BoundaryId,
    ) -> usize {
        self.existing(boundary)
            .map_or(0, |p| p.delivered.swap(0, Ordering::AcqRel))
    }

    /// Counts deliveries made on behalf of `boundary` outside the store.
    pub(crate) fn record_delivered(
        &self,
        boundary: BoundaryId,
        count: usize,
    ) {
        if let Some(partition) = self.existing(boundary) {
            partition.delivered.fetch_add(count, Ordering::Relaxed);
        }
    }

    pub fn partition_count(&self) -> usize {
        self.partitions.len()
    }

    /// Drops every subscription of `boundary`. Returns whether it existed.
    pub fn remove_partition(
        &self,
        boundary: BoundaryId,
    ) -> bool {
        let removed = self.partitions.remove(&boundary).is_some();
        if removed {
            debug!(%boundary, "partition removed");
        }
        removed
    }
}

////////////////////////////////////////////////////////////////////////////////
// Tests
////////////////////////////////////////////////////////////////////////////////

use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};

use bytes::Bytes;
use dashmap::DashMap;
use globset::{Glob, GlobMatcher};
use plexus_error::TransportError;
use tokio::sync::broadcast;
use tracing::trace;

use super::{ChannelSubscription, Message, PatternSubscription};

pub const DEFAULT_BUS_CAPACITY: usize = 1024;

type ChannelKey = Arc<str>;

struct PatternChannel {
    matcher: GlobMatcher,
    tx: broadcast::Sender<Message>,
}

/// Message broker with exact and glob-pattern channels.
///
/// - exact channels are created on first subscribe and removed once a
///   publish finds no receivers left;
/// - pattern subscribers see every publication whose channel name matches.
pub struct Broker {
    channels: DashMap<ChannelKey, broadcast::Sender<Message>>,
    patterns: DashMap<Glob, PatternChannel>,
    capacity: usize,
    /// Total `publish` calls.
    publish_count: AtomicUsize,
    /// Sends that found no receivers.
    send_error_count: AtomicUsize,
}

impl Default for Broker {
    fn default() -> Self {
        Self::new(DEFAULT_BUS_CAPACITY)
    }
}

impl Broker {
    /// `capacity` bounds the backlog of every channel; slower receivers
    /// observe a lag instead of blocking publishers.
    pub fn new(capacity: usize) -> Self {
        Self {
            channels: DashMap::new(),
            patterns: DashMap::new(),
            capacity: capacity.max(1),
            publish_count: AtomicUsize::new(0),
            send_error_count: AtomicUsize::new(0),
        }
    }

    /// Subscribes to every channel matching `pattern`, e.g. `"news.*"`.
    /// Subscribers of the same pattern share one sender.
    pub fn psubscribe(
        &self,
        pattern: &str,
    ) -> Result<PatternSubscription, TransportError> {
        let glob = Glob::new(pattern).map_err(|e| TransportError::InvalidPattern {
            pattern: pattern.to_owned(),
            reason: e.to_string(),
        })?;
        let rx = self
            .patterns
            .entry(glob.clone())
            .or_insert_with(|| PatternChannel {
                matcher: glob.compile_matcher(),
                tx: broadcast::channel(self.capacity).0,
            })
            .tx
            .subscribe();
        Ok(PatternSubscription {
            pattern: glob,
            inner: rx,
        })
    }

    /// Drops the pattern channel; its subscribers observe `Closed`.
    pub fn punsubscribe(
        &self,
        pattern: &str,
    ) -> bool {
        match Glob::new(pattern) {
            Ok(glob) => self.patterns.remove(&glob).is_some(),
            Err(_) => false,
        }
    }

    pub fn subscribe(
        &self,
        channel: &str,
    ) -> ChannelSubscription {
        let key: ChannelKey = Arc::from(channel);
        let rx = self
            .channels
            .entry(key.clone())
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .subscribe();
        ChannelSubscription {
            channel: key,
            inner: rx,
        }
    }

    /// Publishes `payload` on `channel`: first to the exact channel, then to
    /// every matching pattern. Returns the number of receivers reached.
    pub fn publish(
        &self,
        channel: &str,
        payload: Bytes,
    ) -> usize {
        self.publish_count.fetch_add(1, Ordering::Relaxed);
        let mut reached = 0;

        let exact = self.channels.get(channel).map(|entry| {
            (entry.key().clone(), entry.value().clone())
        });
        if let Some((key, tx)) = exact {
            match tx.send(Message::new(key.clone(), payload.clone())) {
                Ok(n) => reached += n,
                Err(_) => {
                    self.send_error_count.fetch_add(1, Ordering::Relaxed);
                }
            }
            if tx.receiver_count() == 0 {
                self.channels
                    .remove_if(&key, |_, tx| tx.receiver_count() == 0);
            }
        }

        let mut name: Option<ChannelKey> = None;
        for entry in self.patterns.iter() {
            if entry.matcher.is_match(channel) {
                let name = name.get_or_insert_with(|| Arc::from(channel)).clone();
                if let Ok(n) = entry.tx.send(Message::new(name, payload.clone())) {
                    reached += n;
                }
            }
        }

        trace!(channel, reached, "bus publish");
        reached
    }

    /// Removes the channel; existing subscribers observe `Closed`.
    pub fn unsubscribe_all(
        &self,
        channel: &str,
    ) {
        self.channels.remove(channel);
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    pub fn pattern_count(&self) -> usize {
        self.patterns.len()
    }

    pub fn publish_count(&self) -> usize {
        self.publish_count.load(Ordering::Relaxed)
    }

    pub fn send_error_count(&self) -> usize {
        self.send_error_count.load(Ordering::Relaxed)
    }
}

impl std::fmt::Debug for Broker {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("Broker")
            .field("channels", &self.channels.len())
            .field("patterns", &self.patterns.len())
            .field("capacity", &self.capacity)
            .finish()
    }
}

use std::{
    sync::Arc,
    thread,
    time::{Duration, Instant},
};

use plexus_error::TransportError;
use tracing::trace;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// A source of deliveries a [`Poller`] can wait on.
pub trait Pollable: Send + Sync {
    /// Performs any pending work and returns how many deliveries happened
    /// since the previous call. Must not block.
    fn poll_pending(&self) -> Result<usize, TransportError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollerConfig {
    /// Sleep between two rounds over the sources.
    pub interval: Duration,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

/// Waits on any number of transporters at once.
pub struct Poller {
    sources: Vec<Arc<dyn Pollable>>,
    config: PollerConfig,
}

impl Default for Poller {
    fn default() -> Self {
        Self::new(PollerConfig::default())
    }
}

impl Poller {
    pub fn new(config: PollerConfig) -> Self {
        Self {
            sources: Vec::new(),
            config,
        }
    }

    pub fn add(
        &mut self,
        source: Arc<dyn Pollable>,
    ) -> &mut Self {
        self.sources.push(source);
        self
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    pub fn config(&self) -> &PollerConfig {
        &self.config
    }

    /// One round over every source without waiting.
    pub fn poll_once(&mut self) -> Result<usize, TransportError> {
        let mut total = 0;
        for source in &self.sources {
            total += source.poll_pending()?;
        }
        Ok(total)
    }

    /// Returns as soon as a round reports deliveries, or `Ok(0)` once
    /// `timeout` elapsed. A zero timeout performs exactly one round.
    pub fn poll(
        &mut self,
        timeout: Duration,
    ) -> Result<usize, TransportError> {
        // `None`: the timeout is past what `Instant` can represent.
        let deadline = Instant::now().checked_add(timeout);
        let mut rounds = 0u64;
        loop {
            rounds += 1;
            let delivered = self.poll_once()?;
            if delivered > 0 {
                trace!(delivered, rounds, "poll satisfied");
                return Ok(delivered);
            }
            let pause = match deadline {
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        trace!(rounds, "poll timed out");
                        return Ok(0);
                    }
                    self.config.interval.min(deadline - now)
                }
                None => self.config.interval,
            };
            thread::sleep(pause);
        }
    }
}

impl std::fmt::Debug for Poller {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("Poller")
            .field("sources", &self.sources.len())
            .field("config", &self.config)
            .finish()
    }
}

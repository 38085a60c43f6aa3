use std::{
    fmt,
    sync::atomic::{AtomicU64, Ordering},
};

static NEXT_SUBSCRIPTION: AtomicU64 = AtomicU64::new(1);
static NEXT_TRANSPORTER: AtomicU64 = AtomicU64::new(1);

/// Handle returned by every subscribe call, used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

impl SubscriptionId {
    pub(crate) fn next() -> Self {
        Self(NEXT_SUBSCRIPTION.fetch_add(1, Ordering::Relaxed))
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

/// Process-local identity of a transporter.
///
/// Envelopes carry the id of the transporter that injected them, so a
/// layer never hands its own publications back to itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TransporterId(u64);

impl TransporterId {
    pub(crate) fn next() -> Self {
        Self(NEXT_TRANSPORTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for TransporterId {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        write!(f, "transporter-{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_are_unique() {
        let a = SubscriptionId::next();
        let b = SubscriptionId::next();
        assert_ne!(a, b);
        assert!(b > a);
        assert_ne!(TransporterId::next(), TransporterId::next());
    }
}

use std::sync::Arc;

use globset::Glob;
use tokio::sync::broadcast;

use super::{Message, RecvError, TryRecvError};

/// Subscription to one channel by exact name.
///
/// Dropping it unsubscribes; the broker removes the channel on the next
/// publish that finds no receivers.
pub struct ChannelSubscription {
    pub(crate) channel: Arc<str>,
    pub(crate) inner: broadcast::Receiver<Message>,
}

/// Subscription to every channel whose name matches a glob.
pub struct PatternSubscription {
    pub(crate) pattern: Glob,
    pub(crate) inner: broadcast::Receiver<Message>,
}

impl ChannelSubscription {
    /// Returns the next message, or [`TryRecvError::Empty`] without
    /// blocking.
    pub fn try_recv(&mut self) -> Result<Message, TryRecvError> {
        self.inner.try_recv().map_err(Into::into)
    }

    /// Blocks the calling thread until a message arrives. Must not be
    /// called from inside an async runtime.
    pub fn blocking_recv(&mut self) -> Result<Message, RecvError> {
        self.inner.blocking_recv().map_err(Into::into)
    }

    pub fn channel_name(&self) -> &Arc<str> {
        &self.channel
    }

    /// Queued messages not yet received.
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

impl PatternSubscription {
    pub fn try_recv(&mut self) -> Result<Message, TryRecvError> {
        self.inner.try_recv().map_err(Into::into)
    }

    pub fn blocking_recv(&mut self) -> Result<Message, RecvError> {
        self.inner.blocking_recv().map_err(Into::into)
    }

    pub fn pattern(&self) -> &Glob {
        &self.pattern
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;

    use super::*;

    fn channel_pair() -> (broadcast::Sender<Message>, ChannelSubscription) {
        let (tx, rx) = broadcast::channel(2);
        (
            tx,
            ChannelSubscription {
                channel: Arc::from("test"),
                inner: rx,
            },
        )
    }

    /// try_recv returns queued messages, then Empty.
    #[test]
    fn test_try_recv_returns_message() {
        let (tx, mut sub) = channel_pair();
        tx.send(Message::new("test", Bytes::from_static(b"a"))).unwrap();

        assert_eq!(sub.len(), 1);
        let msg = sub.try_recv().unwrap();
        assert_eq!(msg.payload, Bytes::from_static(b"a"));
        assert!(sub.is_empty());
    }

    #[test]
    fn test_try_recv_empty_and_closed() {
        let (tx, mut sub) = channel_pair();
        assert_eq!(sub.try_recv().unwrap_err(), TryRecvError::Empty);
        drop(tx);
        assert_eq!(sub.try_recv().unwrap_err(), TryRecvError::Closed);
    }

    /// A subscriber that fell behind the queue sees Lagged.
    #[test]
    fn test_lagged_receiver() {
        let (tx, mut sub) = channel_pair();
        for i in 0..4u8 {
            tx.send(Message::new("test", vec![i])).unwrap();
        }
        assert_eq!(sub.try_recv().unwrap_err(), TryRecvError::Lagged(2));
        assert_eq!(sub.try_recv().unwrap().payload, Bytes::from(vec![2u8]));
    }

    #[test]
    fn test_blocking_recv_across_threads() {
        let (tx, mut sub) = channel_pair();
        let sender = std::thread::spawn(move || {
            tx.send(Message::new("test", Bytes::from_static(b"x"))).unwrap();
        });
        let msg = sub.blocking_recv().unwrap();
        sender.join().unwrap();
        assert_eq!(&*msg.channel, "test");
        assert_eq!(sub.channel_name().as_ref(), "test");
    }

    #[test]
    fn test_pattern_subscription_accessors() {
        let (tx, rx) = broadcast::channel(2);
        let mut sub = PatternSubscription {
            pattern: Glob::new("news.*").unwrap(),
            inner: rx,
        };
        assert_eq!(sub.pattern().glob(), "news.*");
        tx.send(Message::new("news.sport", Bytes::new())).unwrap();
        assert_eq!(&*sub.try_recv().unwrap().channel, "news.sport");
    }
}

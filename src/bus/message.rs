use std::sync::Arc;

use bytes::Bytes;

/// A payload as seen by bus subscribers. Cloning is cheap.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub channel: Arc<str>,
    pub payload: Bytes,
}

impl Message {
    pub fn new(
        channel: impl Into<Arc<str>>,
        payload: impl Into<Bytes>,
    ) -> Self {
        Self {
            channel: channel.into(),
            payload: payload.into(),
        }
    }
}

use std::{sync::Arc, time::Duration};

use bincode::Options;
use bytes::Bytes;
use plexus_error::TransportError;
use serde::{Deserialize, Serialize};

use super::TransporterId;
use crate::{
    group::Group,
    marshalling::{bounded_bincode, Scheme},
};

/// Per-publication delivery hints, passed through untouched to whichever
/// layer understands them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryConfig {
    pub ack_required: bool,
    pub ttl_ms: Option<u64>,
}

impl DeliveryConfig {
    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            ack_required: false,
            ttl_ms: Some(ttl.as_millis() as u64),
        }
    }
}

/// Routing key of a publication, available before anything is serialized.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Route<'a> {
    pub scheme: Scheme,
    pub type_name: &'a str,
    pub group: &'a Group,
    pub origin: Option<TransporterId>,
}

impl Route<'_> {
    pub fn is_from(
        &self,
        id: TransporterId,
    ) -> bool {
        self.origin == Some(id)
    }
}

/// A serialized publication as it crosses a boundary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    scheme: Scheme,
    type_name: Arc<str>,
    group: Group,
    bytes: Bytes,
    config: Option<DeliveryConfig>,
    /// Who injected the envelope in this process. Never on the wire.
    #[serde(skip)]
    origin: Option<TransporterId>,
}

impl Envelope {
    pub fn new(
        scheme: Scheme,
        type_name: impl Into<Arc<str>>,
        group: Group,
        bytes: impl Into<Bytes>,
    ) -> Self {
        Self {
            scheme,
            type_name: type_name.into(),
            group,
            bytes: bytes.into(),
            config: None,
            origin: None,
        }
    }

    pub fn with_config(
        mut self,
        config: Option<DeliveryConfig>,
    ) -> Self {
        self.config = config;
        self
    }

    pub fn with_origin(
        mut self,
        origin: TransporterId,
    ) -> Self {
        self.origin = Some(origin);
        self
    }

    #[inline]
    pub fn scheme(&self) -> Scheme {
        self.scheme
    }

    #[inline]
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub(crate) fn type_name_arc(&self) -> &Arc<str> {
        &self.type_name
    }

    #[inline]
    pub fn group(&self) -> &Group {
        &self.group
    }

    #[inline]
    pub fn bytes(&self) -> &Bytes {
        &self.bytes
    }

    pub fn config(&self) -> Option<&DeliveryConfig> {
        self.config.as_ref()
    }

    pub fn origin(&self) -> Option<TransporterId> {
        self.origin
    }

    /// True when `id` injected this envelope.
    pub(crate) fn is_from(
        &self,
        id: TransporterId,
    ) -> bool {
        self.origin == Some(id)
    }

    pub(crate) fn route(&self) -> Route<'_> {
        Route {
            scheme: self.scheme,
            type_name: &self.type_name,
            group: &self.group,
            origin: self.origin,
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>, TransportError> {
        bincode::serialize(self).map_err(|e| TransportError::EnvelopeCodec {
            reason: e.to_string(),
        })
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, TransportError> {
        bounded_bincode(bytes.len()).deserialize(bytes).map_err(|e| TransportError::EnvelopeCodec {
            reason: e.to_string(),
        })
    }
}

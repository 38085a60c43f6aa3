/// In-process message bus: exact and glob channels over broadcast queues.
pub mod bus;
/// Settings loaded from defaults, files and the environment.
pub mod config;
/// Publication groups and the reserved forwarding groups.
pub mod group;
/// Subscriber initialisation (filters, console and file sinks).
pub mod logging;
/// Marshalling schemes: static serializer/parser pairs and the dynamic path.
pub mod marshalling;
/// Transporters: subscription store, inter-thread, forwarder, portal, poller.
pub mod transport;

/// Error types shared by every layer.
pub use plexus_error as error;

// -----------------------------------------------------------------------------
//  Frequently used public types
// -----------------------------------------------------------------------------

pub use bus::{Broker, Message};
pub use config::Settings;
pub use group::{Group, FORWARD_GROUP, REGEX_GROUP};
pub use logging::{init_logging, LoggingConfig, LoggingHandle};
pub use marshalling::{
    Bincode, Cbor, Cstr, DynamicParser, Framed, FramedMessage, Json, MarshallingScheme, MsgPack,
    Named, Parsed, Scheme, SchemeRegistry, SerializerParser,
};
pub use plexus_error::{
    ConfigError, MarshallingError, PlexusResult, StackError, StatusCode, TransportError,
};
pub use transport::{
    BoundaryId, DeliveryConfig, Envelope, InnerTransport, InterProcessForwarder,
    InterProcessPortal, InterThreadTransporter, Pollable, Poller, PollerConfig, RegexFilter,
    StreamGateway, SubscriptionId, SubscriptionStore, Transporter,
};

//! In-process message bus.
//!
//! - `broker`: exact and glob-pattern channels over `tokio::sync::broadcast`.
//! - `message`: a payload and the channel it was published on.
//! - `subscriber`: receiving ends of exact and pattern subscriptions.
//! - `error`: receive errors.
//!
//! The portal uses the bus as the substrate between processes; it knows
//! nothing about schemes or groups.

pub mod broker;
pub mod error;
pub mod message;
pub mod subscriber;

pub use broker::{Broker, DEFAULT_BUS_CAPACITY};
pub use error::{RecvError, TryRecvError};
pub use message::Message;
pub use subscriber::{ChannelSubscription, PatternSubscription};

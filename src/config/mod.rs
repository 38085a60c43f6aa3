pub mod settings;

pub use settings::{PollerSettings, Settings, TransportSettings};

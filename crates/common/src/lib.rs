pub mod broker;
pub mod config;
pub mod error;
pub mod types;

pub use broker::{
    BarSource, BrokerAuth, FeedTransport, InstrumentSource, PositionStore, SessionTokens,
    TransportEvent,
};
pub use config::Config;
pub use error::{Error, Result};
pub use types::*;

pub mod auth;
pub mod candles;
pub mod master;
pub mod registry;
pub mod session;
pub mod transport;
pub mod watchlist;

pub use auth::StaticAuth;
pub use candles::HttpBarSource;
pub use master::HttpInstrumentSource;
pub use registry::InstrumentRegistry;
pub use session::FeedSession;
pub use transport::WsTransport;
pub use watchlist::Watchlist;

pub mod book;
pub mod store;

pub use book::{PositionManager, RiskParams, STOPLOSS_HIT, TARGET_REACHED};
pub use store::{MemoryStore, SqliteStore};

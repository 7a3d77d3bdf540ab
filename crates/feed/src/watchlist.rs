use serde::Deserialize;
use tracing::warn;

use common::{Error, ExchangeSegment, InstrumentRecord, Result};

use crate::registry::InstrumentRegistry;

/// Watched instruments, loaded from a TOML file at startup.
#[derive(Debug, Deserialize)]
pub struct Watchlist {
    #[serde(default)]
    pub instrument: Vec<WatchEntry>,
}

#[derive(Debug, Deserialize)]
pub struct WatchEntry {
    pub symbol: String,
    pub segment: ExchangeSegment,
    /// Explicit token override; resolved through the registry when absent.
    pub token: Option<String>,
}

impl Watchlist {
    pub fn load(path: &str) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("watchlist '{path}': {e}")))?;
        toml::from_str(&text).map_err(|e| Error::Config(format!("watchlist '{path}': {e}")))
    }

    /// Resolve entries to instrument records. Entries the registry cannot
    /// resolve are logged and skipped, not fatal.
    pub fn resolve(&self, registry: &InstrumentRegistry) -> Vec<InstrumentRecord> {
        self.instrument
            .iter()
            .filter_map(|entry| {
                let token = entry
                    .token
                    .clone()
                    .or_else(|| {
                        registry
                            .resolve_token(entry.segment, &entry.symbol)
                            .map(str::to_string)
                    });
                match token {
                    Some(token) => Some(InstrumentRecord {
                        token,
                        trading_symbol: entry.symbol.clone(),
                        segment: entry.segment,
                    }),
                    None => {
                        warn!(symbol = %entry.symbol, segment = %entry.segment, "Watchlist symbol not in instrument master — skipping");
                        None
                    }
                }
            })
            .collect()
    }
}

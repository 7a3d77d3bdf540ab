use std::collections::{BTreeSet, HashMap};

use common::{ExchangeSegment, InstrumentRecord};

/// Symbol fallback for ticks on tokens the instrument master cannot resolve.
pub const UNKNOWN_SYMBOL: &str = "UNKNOWN";

/// Instrument lookup plus the active subscription book.
///
/// The lookup side is immutable after construction. The subscription book
/// tracks which tokens are live per exchange segment and enforces that a
/// token belongs to at most one segment at a time.
pub struct InstrumentRegistry {
    by_token: HashMap<String, InstrumentRecord>,
    by_symbol: HashMap<(ExchangeSegment, String), String>,
    active: HashMap<ExchangeSegment, BTreeSet<String>>,
}

impl InstrumentRegistry {
    pub fn new(records: Vec<InstrumentRecord>) -> Self {
        let mut by_token = HashMap::with_capacity(records.len());
        let mut by_symbol = HashMap::with_capacity(records.len());
        for record in records {
            by_symbol.insert(
                (record.segment, record.trading_symbol.clone()),
                record.token.clone(),
            );
            by_token.insert(record.token.clone(), record);
        }
        Self {
            by_token,
            by_symbol,
            active: HashMap::new(),
        }
    }

    /// Registry with no instrument master loaded. Every tick resolves to
    /// `UNKNOWN`; subscriptions still work on raw tokens.
    pub fn empty() -> Self {
        Self::new(Vec::new())
    }

    pub fn symbol_for(&self, token: &str) -> String {
        self.by_token
            .get(token)
            .map(|r| r.trading_symbol.clone())
            .unwrap_or_else(|| UNKNOWN_SYMBOL.to_string())
    }

    pub fn resolve_token(&self, segment: ExchangeSegment, symbol: &str) -> Option<&str> {
        self.by_symbol
            .get(&(segment, symbol.to_string()))
            .map(String::as_str)
    }

    pub fn record(&self, token: &str) -> Option<&InstrumentRecord> {
        self.by_token.get(token)
    }

    /// Add tokens to the segment's subscription set and return the ones that
    /// are newly active there. A token already live under a different
    /// segment is moved, never duplicated.
    pub fn subscribe(&mut self, segment: ExchangeSegment, tokens: &[String]) -> Vec<String> {
        let mut added = Vec::new();
        for token in tokens {
            for (seg, set) in self.active.iter_mut() {
                if *seg != segment {
                    set.remove(token);
                }
            }
            self.active.retain(|_, set| !set.is_empty());
            if self.active.entry(segment).or_default().insert(token.clone()) {
                added.push(token.clone());
            }
        }
        added
    }

    /// Remove tokens from the segment's subscription set and return the ones
    /// that were actually active. An emptied segment disappears entirely.
    pub fn unsubscribe(&mut self, segment: ExchangeSegment, tokens: &[String]) -> Vec<String> {
        let mut removed = Vec::new();
        if let Some(set) = self.active.get_mut(&segment) {
            for token in tokens {
                if set.remove(token) {
                    removed.push(token.clone());
                }
            }
            if set.is_empty() {
                self.active.remove(&segment);
            }
        }
        removed
    }

    /// Snapshot of the live subscription book, used to replay subscriptions
    /// after a reconnect.
    pub fn active(&self) -> Vec<(ExchangeSegment, Vec<String>)> {
        let mut out: Vec<_> = self
            .active
            .iter()
            .map(|(seg, set)| (*seg, set.iter().cloned().collect()))
            .collect();
        out.sort_by_key(|(seg, _)| seg.wire_code());
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(token: &str, symbol: &str, segment: ExchangeSegment) -> InstrumentRecord {
        InstrumentRecord {
            token: token.into(),
            trading_symbol: symbol.into(),
            segment,
        }
    }

    fn registry() -> InstrumentRegistry {
        InstrumentRegistry::new(vec![
            record("3045", "SBIN-EQ", ExchangeSegment::NseCash),
            record("26009", "BANKNIFTY", ExchangeSegment::NseFo),
        ])
    }

    #[test]
    fn resolves_symbols_with_unknown_fallback() {
        let reg = registry();
        assert_eq!(reg.symbol_for("3045"), "SBIN-EQ");
        assert_eq!(reg.symbol_for("99999"), UNKNOWN_SYMBOL);
        assert_eq!(
            reg.resolve_token(ExchangeSegment::NseCash, "SBIN-EQ"),
            Some("3045")
        );
        assert_eq!(reg.resolve_token(ExchangeSegment::NseFo, "SBIN-EQ"), None);
    }

    #[test]
    fn subscribe_reports_only_new_tokens() {
        let mut reg = registry();
        let added = reg.subscribe(ExchangeSegment::NseCash, &["3045".into(), "1333".into()]);
        assert_eq!(added, vec!["3045".to_string(), "1333".to_string()]);

        let again = reg.subscribe(ExchangeSegment::NseCash, &["3045".into()]);
        assert!(again.is_empty());
    }

    #[test]
    fn token_lives_in_at_most_one_segment() {
        let mut reg = registry();
        reg.subscribe(ExchangeSegment::NseCash, &["3045".into()]);
        reg.subscribe(ExchangeSegment::NseFo, &["3045".into()]);

        let active = reg.active();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].0, ExchangeSegment::NseFo);
        assert_eq!(active[0].1, vec!["3045".to_string()]);
    }

    #[test]
    fn unsubscribe_drops_empty_segments() {
        let mut reg = registry();
        reg.subscribe(ExchangeSegment::NseCash, &["3045".into()]);
        let removed = reg.unsubscribe(ExchangeSegment::NseCash, &["3045".into(), "1333".into()]);
        assert_eq!(removed, vec!["3045".to_string()]);
        assert!(reg.active().is_empty());
    }
}

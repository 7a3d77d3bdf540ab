pub mod adx;
pub mod macd;
pub mod rsi;

pub use adx::AdxIndicator;
pub use macd::MacdIndicator;
pub use rsi::RsiIndicator;

use common::{Bar, IndicatorSnapshot};

pub const RSI_PERIOD: usize = 14;
pub const MACD_FAST: usize = 12;
pub const MACD_SLOW: usize = 26;
pub const MACD_SIGNAL: usize = 9;
pub const ADX_PERIOD: usize = 14;

/// Compute the full indicator snapshot for one instrument with the default
/// periods. Indicators without enough bars come back as `None`.
pub fn snapshot(bars: &[Bar]) -> IndicatorSnapshot {
    let closes: Vec<f64> = bars.iter().map(|b| b.close).collect();

    IndicatorSnapshot {
        rsi: RsiIndicator::new(RSI_PERIOD).compute(&closes),
        macd: MacdIndicator::new(MACD_FAST, MACD_SLOW, MACD_SIGNAL).compute(&closes),
        adx: AdxIndicator::new(ADX_PERIOD).compute(bars),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn flat_bars(n: usize) -> Vec<Bar> {
        (0..n)
            .map(|i| Bar {
                timestamp: Utc::now() + chrono::Duration::minutes(i as i64),
                open: 100.0,
                high: 101.0,
                low: 99.0,
                close: 100.0,
                volume: 10.0,
            })
            .collect()
    }

    #[test]
    fn snapshot_is_all_unavailable_on_short_series() {
        let snap = snapshot(&flat_bars(5));
        assert!(snap.rsi.is_none());
        assert!(snap.macd.is_none());
        assert!(snap.adx.is_none());
    }

    #[test]
    fn snapshot_fills_in_as_history_grows() {
        // 15 bars: RSI available, MACD (needs 26) and ADX (needs 28) not yet
        let snap = snapshot(&flat_bars(15));
        assert!(snap.rsi.is_some());
        assert!(snap.macd.is_none());
        assert!(snap.adx.is_none());

        let snap = snapshot(&flat_bars(30));
        assert!(snap.rsi.is_some());
        assert!(snap.macd.is_some());
        assert!(snap.adx.is_some());
    }
}

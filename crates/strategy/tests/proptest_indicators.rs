use chrono::{Duration, Utc};
use proptest::prelude::*;

use common::Bar;
use strategy::indicators::{self, AdxIndicator, MacdIndicator, RsiIndicator};

fn bars_from_closes(closes: &[f64]) -> Vec<Bar> {
    let start = Utc::now();
    closes
        .iter()
        .enumerate()
        .map(|(i, &close)| Bar {
            timestamp: start + Duration::minutes(5 * i as i64),
            open: close,
            high: close * 1.01,
            low: close * 0.99,
            close,
            volume: 100.0,
        })
        .collect()
}

proptest! {
    /// RSI on arbitrary positive price series is always within [0, 100].
    #[test]
    fn rsi_stays_bounded(closes in prop::collection::vec(0.01f64..100_000.0f64, 15..80)) {
        if let Some(rsi) = RsiIndicator::new(14).compute(&closes) {
            prop_assert!((0.0..=100.0).contains(&rsi));
            prop_assert!(rsi.is_finite());
        }
    }

    /// The MACD histogram is the line minus the signal, whatever the input.
    #[test]
    fn macd_histogram_is_line_minus_signal(
        closes in prop::collection::vec(0.01f64..100_000.0f64, 26..80),
    ) {
        if let Some(macd) = MacdIndicator::new(12, 26, 9).compute(&closes) {
            prop_assert!((macd.histogram - (macd.line - macd.signal)).abs() < 1e-6);
        }
    }

    /// ADX and both directional indicators stay within [0, 100] and finite
    /// on any series with real price movement.
    #[test]
    fn adx_stays_bounded(closes in prop::collection::vec(1.0f64..10_000.0f64, 28..80)) {
        let bars = bars_from_closes(&closes);
        if let Some(adx) = AdxIndicator::new(14).compute(&bars) {
            for value in [adx.adx, adx.di_plus, adx.di_minus] {
                prop_assert!(value.is_finite());
                prop_assert!((0.0..=100.0).contains(&value));
            }
        }
    }

    /// The combined snapshot never panics regardless of history length.
    #[test]
    fn snapshot_handles_any_history_length(
        closes in prop::collection::vec(0.01f64..100_000.0f64, 0..60),
    ) {
        let bars = bars_from_closes(&closes);
        let snap = indicators::snapshot(&bars);
        if bars.len() < 15 {
            prop_assert!(snap.rsi.is_none());
        }
    }
}

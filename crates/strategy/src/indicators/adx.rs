use common::{AdxValue, Bar};

/// Average Directional Index (ADX) with its +DI/−DI components.
///
/// True Range and directional movement follow the standard Wilder method;
/// +DI/−DI come from period-window simple moving averages of TR/+DM/−DM,
/// and ADX is the simple moving average of the last `period` DX values.
/// Returns `None` with fewer than `2 * period` bars.
#[derive(Debug, Clone)]
pub struct AdxIndicator {
    pub period: usize,
}

impl AdxIndicator {
    pub fn new(period: usize) -> Self {
        assert!(period >= 2, "ADX period must be >= 2");
        Self { period }
    }

    /// Compute the latest ADX, +DI and −DI from a chronological bar series.
    pub fn compute(&self, bars: &[Bar]) -> Option<AdxValue> {
        let period = self.period;
        if bars.len() < 2 * period {
            return None;
        }

        // TR and directional movement per bar, from the second bar on
        let mut tr = Vec::with_capacity(bars.len() - 1);
        let mut plus_dm = Vec::with_capacity(bars.len() - 1);
        let mut minus_dm = Vec::with_capacity(bars.len() - 1);

        for w in bars.windows(2) {
            let (prev, cur) = (&w[0], &w[1]);

            let range = (cur.high - cur.low)
                .max((cur.high - prev.close).abs())
                .max((cur.low - prev.close).abs());
            tr.push(range);

            let up_move = cur.high - prev.high;
            let down_move = prev.low - cur.low;
            plus_dm.push(if up_move > down_move && up_move > 0.0 {
                up_move
            } else {
                0.0
            });
            minus_dm.push(if down_move > up_move && down_move > 0.0 {
                down_move
            } else {
                0.0
            });
        }

        let window_avg = |values: &[f64], end: usize| -> f64 {
            values[end + 1 - period..=end].iter().sum::<f64>() / period as f64
        };

        // DI and DX per bar once a full window is available
        let mut dx = Vec::with_capacity(tr.len() - period + 1);
        let mut latest_di = (0.0, 0.0);
        for i in period - 1..tr.len() {
            let avg_tr = window_avg(&tr, i);
            let (di_plus, di_minus) = if avg_tr > 0.0 {
                (
                    100.0 * window_avg(&plus_dm, i) / avg_tr,
                    100.0 * window_avg(&minus_dm, i) / avg_tr,
                )
            } else {
                (0.0, 0.0)
            };

            let di_sum = di_plus + di_minus;
            dx.push(if di_sum > 0.0 {
                100.0 * (di_plus - di_minus).abs() / di_sum
            } else {
                0.0
            });
            latest_di = (di_plus, di_minus);
        }

        // bars.len() >= 2*period guarantees at least `period` DX values
        let adx = dx[dx.len() - period..].iter().sum::<f64>() / period as f64;

        Some(AdxValue {
            adx,
            di_plus: latest_di.0,
            di_minus: latest_di.1,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn bars_from(prices: &[(f64, f64, f64, f64)]) -> Vec<Bar> {
        prices
            .iter()
            .enumerate()
            .map(|(i, &(open, high, low, close))| Bar {
                timestamp: Utc::now() + chrono::Duration::minutes(i as i64),
                open,
                high,
                low,
                close,
                volume: 1000.0,
            })
            .collect()
    }

    fn uptrend(n: usize) -> Vec<Bar> {
        bars_from(
            &(0..n)
                .map(|i| {
                    let base = 100.0 + i as f64 * 3.0;
                    (base, base + 2.0, base - 1.0, base + 1.0)
                })
                .collect::<Vec<_>>(),
        )
    }

    fn choppy(n: usize) -> Vec<Bar> {
        bars_from(
            &(0..n)
                .map(|i| {
                    let wiggle = if i % 2 == 0 { 1.0 } else { -1.0 };
                    (100.0, 102.0 + wiggle, 98.0 - wiggle, 100.0 + wiggle)
                })
                .collect::<Vec<_>>(),
        )
    }

    #[test]
    fn adx_returns_none_with_insufficient_data() {
        let adx = AdxIndicator::new(14);
        // needs at least 28 bars
        assert!(adx.compute(&uptrend(27)).is_none());
    }

    #[test]
    fn adx_returns_some_at_minimum_window() {
        let adx = AdxIndicator::new(14);
        assert!(adx.compute(&uptrend(28)).is_some());
    }

    #[test]
    fn uptrend_has_di_plus_dominant() {
        let adx = AdxIndicator::new(14);
        let v = adx.compute(&uptrend(40)).unwrap();
        assert!(
            v.di_plus > v.di_minus,
            "+DI {} should exceed -DI {} in an uptrend",
            v.di_plus,
            v.di_minus
        );
        assert!(v.adx > 25.0, "ADX should be strong in a clean trend, got {}", v.adx);
    }

    #[test]
    fn choppy_market_has_weak_adx() {
        let adx = AdxIndicator::new(14);
        let v = adx.compute(&choppy(40)).unwrap();
        assert!(v.adx < 40.0, "ADX should be weak in a range, got {}", v.adx);
    }

    #[test]
    fn adx_values_are_bounded() {
        let adx = AdxIndicator::new(5);
        for bars in [uptrend(30), choppy(30)] {
            let v = adx.compute(&bars).unwrap();
            for x in [v.adx, v.di_plus, v.di_minus] {
                assert!((0.0..=100.0).contains(&x), "out of range: {x}");
            }
        }
    }

    #[test]
    fn adx_is_deterministic() {
        let adx = AdxIndicator::new(14);
        let bars = uptrend(35);
        let a = adx.compute(&bars).unwrap();
        let b = adx.compute(&bars).unwrap();
        assert_eq!(a.adx.to_bits(), b.adx.to_bits());
        assert_eq!(a.di_plus.to_bits(), b.di_plus.to_bits());
        assert_eq!(a.di_minus.to_bits(), b.di_minus.to_bits());
    }
}

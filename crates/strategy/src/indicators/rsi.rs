/// RSI (Relative Strength Index) indicator.
///
/// Uses Wilder's smoothed moving average (same as TradingView / standard RSI).
/// Returns `None` until at least `period + 1` close values are available.
#[derive(Debug, Clone)]
pub struct RsiIndicator {
    pub period: usize,
}

impl RsiIndicator {
    pub fn new(period: usize) -> Self {
        assert!(period >= 2, "RSI period must be >= 2");
        Self { period }
    }

    /// Compute the RSI of the latest sample from a slice of close prices
    /// (oldest first). Returns `None` if there are fewer than `period + 1`
    /// values.
    pub fn compute(&self, closes: &[f64]) -> Option<f64> {
        if closes.len() < self.period + 1 {
            return None;
        }

        // Seed average gain/loss from the initial `period` changes
        let changes: Vec<f64> = closes.windows(2).map(|w| w[1] - w[0]).collect();
        let initial = &changes[..self.period];

        let mut avg_gain = initial.iter().filter(|&&c| c > 0.0).sum::<f64>() / self.period as f64;
        let mut avg_loss = initial.iter().filter(|&&c| c < 0.0).map(|c| c.abs()).sum::<f64>()
            / self.period as f64;

        // Wilder smoothing over the remaining changes
        for &change in &changes[self.period..] {
            let gain = if change > 0.0 { change } else { 0.0 };
            let loss = if change < 0.0 { change.abs() } else { 0.0 };
            avg_gain = (avg_gain * (self.period - 1) as f64 + gain) / self.period as f64;
            avg_loss = (avg_loss * (self.period - 1) as f64 + loss) / self.period as f64;
        }

        // avg_loss == 0 means RS = +inf, RSI = 100
        if avg_loss == 0.0 {
            return Some(100.0);
        }

        let rs = avg_gain / avg_loss;
        Some(100.0 - 100.0 / (1.0 + rs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rsi_returns_none_when_insufficient_data() {
        let rsi = RsiIndicator::new(14);
        // Need at least period+1 = 15 values
        let prices = vec![100.0; 14];
        assert!(rsi.compute(&prices).is_none());
    }

    #[test]
    fn rsi_unavailable_on_short_reference_sequence() {
        // 11 closes < the 15 a 14-period RSI needs
        let rsi = RsiIndicator::new(14);
        let closes = vec![
            44.0, 44.25, 44.5, 43.75, 44.5, 44.3, 44.4, 45.15, 46.25, 47.2, 48.2,
        ];
        assert!(rsi.compute(&closes).is_none());
    }

    #[test]
    fn rsi_returns_some_with_sufficient_data() {
        let rsi = RsiIndicator::new(14);
        let prices: Vec<f64> = (0..15).map(|i| 100.0 + i as f64).collect();
        assert!(rsi.compute(&prices).is_some());
    }

    #[test]
    fn rsi_all_gains_returns_100() {
        let rsi = RsiIndicator::new(3);
        let prices = vec![10.0, 11.0, 12.0, 13.0, 14.0];
        let value = rsi.compute(&prices).unwrap();
        assert!((value - 100.0).abs() < 1e-6, "Expected ~100, got {value}");
    }

    #[test]
    fn rsi_all_losses_returns_0() {
        let rsi = RsiIndicator::new(3);
        let prices = vec![14.0, 13.0, 12.0, 11.0, 10.0];
        let value = rsi.compute(&prices).unwrap();
        assert!((value - 0.0).abs() < 1e-6, "Expected ~0, got {value}");
    }

    #[test]
    fn rsi_matches_hand_computed_reference() {
        // period 3 over [1,2,3,2,3,4,5]:
        // seed avg_gain = 2/3, avg_loss = 1/3, then three +1 deltas
        // -> avg_gain = 73/81, avg_loss = 8/81, RS = 9.125
        // -> RSI = 100 - 100/10.125 = 90.123456...
        let rsi = RsiIndicator::new(3);
        let closes = vec![1.0, 2.0, 3.0, 2.0, 3.0, 4.0, 5.0];
        let value = rsi.compute(&closes).unwrap();
        assert!(
            (value - 90.12345679).abs() < 0.01,
            "Expected ~90.1235, got {value}"
        );
    }

    #[test]
    fn rsi_is_bounded() {
        let rsi = RsiIndicator::new(14);
        let closes = vec![
            44.34, 44.09, 44.15, 43.61, 44.33, 44.83, 45.10, 45.15, 43.61, 44.33, 44.83, 45.10,
            45.15, 44.34, 44.09, 44.5, 43.9, 44.2,
        ];
        let v = rsi.compute(&closes).unwrap();
        assert!((0.0..=100.0).contains(&v), "RSI out of range: {v}");
    }

    #[test]
    fn rsi_is_deterministic() {
        let rsi = RsiIndicator::new(14);
        let closes: Vec<f64> = (0..40).map(|i| 100.0 + ((i * 7) % 13) as f64 * 0.3).collect();
        let a = rsi.compute(&closes).unwrap();
        let b = rsi.compute(&closes).unwrap();
        assert_eq!(a.to_bits(), b.to_bits());
    }
}

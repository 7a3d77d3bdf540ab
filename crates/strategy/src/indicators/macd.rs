use common::MacdValue;

/// MACD (Moving Average Convergence/Divergence) indicator.
///
/// MACD line = EMA(fast) − EMA(slow) over closes; signal = EMA of the MACD
/// line; histogram = line − signal. EMAs use the standard recurrence seeded
/// with the first value (no bias adjustment). Returns the latest values only.
#[derive(Debug, Clone)]
pub struct MacdIndicator {
    pub fast: usize,
    pub slow: usize,
    pub signal: usize,
}

impl MacdIndicator {
    pub fn new(fast: usize, slow: usize, signal: usize) -> Self {
        assert!(fast < slow, "MACD fast period must be less than slow period");
        Self { fast, slow, signal }
    }

    /// Compute the latest MACD values from a slice of close prices (oldest
    /// first). Returns `None` with fewer than `slow` values.
    pub fn compute(&self, closes: &[f64]) -> Option<MacdValue> {
        if closes.len() < self.slow {
            return None;
        }

        let fast = ema_series(closes, self.fast);
        let slow = ema_series(closes, self.slow);
        let macd_line: Vec<f64> = fast.iter().zip(&slow).map(|(f, s)| f - s).collect();
        let signal_line = ema_series(&macd_line, self.signal);

        let line = *macd_line.last()?;
        let signal = *signal_line.last()?;
        Some(MacdValue {
            line,
            signal,
            histogram: line - signal,
        })
    }
}

/// Full EMA series over `values`, seeded with the first value.
fn ema_series(values: &[f64], span: usize) -> Vec<f64> {
    let mut out = Vec::with_capacity(values.len());
    let Some(&first) = values.first() else {
        return out;
    };
    let k = 2.0 / (span as f64 + 1.0);
    let mut ema = first;
    out.push(ema);
    for &v in &values[1..] {
        ema = v * k + ema * (1.0 - k);
        out.push(ema);
    }
    out
}

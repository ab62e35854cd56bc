/// MACD (Moving Average Convergence/Divergence) indicator.
///
/// MACD line = EMA(fast) − EMA(slow), signal = EMA(macd_line, signal
/// period). Exposes the latest value pair; the caller compares them.
#[derive(Debug, Clone)]
pub struct MacdIndicator {
    pub fast: usize,
    pub slow: usize,
    pub signal: usize,
}

impl MacdIndicator {
    pub fn new(fast: usize, slow: usize, signal: usize) -> Self {
        assert!(
            fast < slow,
            "MACD fast period must be less than slow period"
        );
        Self { fast, slow, signal }
    }

    /// Latest `(macd, signal)` pair from a slice of close prices (oldest
    /// first). Returns `None` if there isn't enough data.
    /// Needs at least `slow + signal` prices.
    pub fn latest(&self, closes: &[f64]) -> Option<(f64, f64)> {
        if closes.len() < self.slow + self.signal {
            return None;
        }

        let macd_line: Vec<f64> = (self.slow - 1..closes.len())
            .map(|i| {
                let slice = &closes[..=i];
                ema(slice, self.fast) - ema(slice, self.slow)
            })
            .collect();
        if macd_line.len() < self.signal {
            return None;
        }

        let macd = *macd_line.last()?;
        let signal = ema(&macd_line, self.signal);
        Some((macd, signal))
    }
}

/// Exponential Moving Average of the last `period` values in `data`.
fn ema(data: &[f64], period: usize) -> f64 {
    if data.is_empty() || period == 0 {
        return 0.0;
    }
    let k = 2.0 / (period as f64 + 1.0);
    let start = data.len().saturating_sub(period * 3); // enough history
    let slice = &data[start..];

    // Seed with SMA of first `period` values
    let seed_len = period.min(slice.len());
    let mut ema_val: f64 = slice[..seed_len].iter().sum::<f64>() / seed_len as f64;

    for &price in &slice[seed_len..] {
        ema_val = price * k + ema_val * (1.0 - k);
    }
    ema_val
}

/// Streaming Relative Strength Index with Wilder smoothing
///
/// RSI measures the magnitude of recent price changes to evaluate
/// overbought or oversold conditions.
///
/// Values:
/// - RSI > 70: Overbought
/// - RSI < 30: Oversold
///
/// The first `period` price changes seed the averages; every close after
/// that yields one RSI value.
#[derive(Debug, Clone)]
pub struct WilderRsi {
    period: usize,
    prev_close: Option<f64>,
    // Warm-up accumulators
    seed_gain: f64,
    seed_loss: f64,
    seen_changes: usize,
    avg_gain: f64,
    avg_loss: f64,
}

impl WilderRsi {
    pub fn new(period: usize) -> Self {
        Self {
            period,
            prev_close: None,
            seed_gain: 0.0,
            seed_loss: 0.0,
            seen_changes: 0,
            avg_gain: 0.0,
            avg_loss: 0.0,
        }
    }

    pub fn period(&self) -> usize {
        self.period
    }

    /// True once the averages are seeded and `push` produces values
    pub fn is_ready(&self) -> bool {
        self.period > 0 && self.seen_changes >= self.period
    }

    /// Feed the next close
    ///
    /// Returns `None` during warm-up, for a zero period, and for non-finite
    /// closes (which are ignored and do not advance the state).
    pub fn push(&mut self, close: f64) -> Option<f64> {
        if self.period == 0 || !close.is_finite() {
            return None;
        }

        let prev = match self.prev_close.replace(close) {
            Some(prev) => prev,
            None => return None,
        };

        let change = close - prev;
        let gain = change.max(0.0);
        let loss = (-change).max(0.0);
        let period = self.period as f64;

        self.seen_changes += 1;

        if self.seen_changes < self.period {
            self.seed_gain += gain;
            self.seed_loss += loss;
            return None;
        }

        if self.seen_changes == self.period {
            self.avg_gain = (self.seed_gain + gain) / period;
            self.avg_loss = (self.seed_loss + loss) / period;
        } else {
            self.avg_gain = (self.avg_gain * (period - 1.0) + gain) / period;
            self.avg_loss = (self.avg_loss * (period - 1.0) + loss) / period;
        }

        Some(rsi_from_averages(self.avg_gain, self.avg_loss))
    }
}

/// RSI from smoothed averages; no losses means RSI 100
fn rsi_from_averages(avg_gain: f64, avg_loss: f64) -> f64 {
    if avg_loss == 0.0 {
        return 100.0;
    }

    let rs = avg_gain / avg_loss;
    let rsi = 100.0 - (100.0 / (1.0 + rs));

    if rsi.is_finite() {
        rsi.clamp(0.0, 100.0)
    } else {
        100.0
    }
}

/// Calculate the RSI series over a sequence of closes
///
/// Returns `prices.len() - period` values, the first one covering the
/// changes between closes 0 and `period`. Series shorter than
/// `period + 1`, a zero period, or any non-finite close yield an empty
/// vector rather than approximate values.
pub fn calculate_rsi(prices: &[f64], period: usize) -> Vec<f64> {
    if period == 0 || prices.len() < period + 1 {
        return Vec::new();
    }
    if prices.iter().any(|p| !p.is_finite()) {
        return Vec::new();
    }

    let mut rsi = WilderRsi::new(period);
    prices.iter().filter_map(|&p| rsi.push(p)).collect()
}

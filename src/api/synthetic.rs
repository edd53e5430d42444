use super::{interval_secs, MarketBatch, MarketDataSource};
use crate::models::RawTick;
use crate::Result;
use chrono::Utc;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::VecDeque;
use std::sync::Mutex;

const MAX_HISTORY: usize = 1_000;

/// Offline market data: a seeded random walk
///
/// Each open drifts up to ±0.25% from the previous close, wicks reach up
/// to 0.2% beyond the open, and the close lands somewhere inside the
/// wicks. Calls made later in time extend the same history, so a polling
/// consumer sees a continuous series.
pub struct SyntheticMarketData {
    state: Mutex<GeneratorState>,
    drift_pct: f64,
}

struct GeneratorState {
    rng: StdRng,
    last_close: Option<f64>,
    history: VecDeque<RawTick>,
}

impl SyntheticMarketData {
    /// Create a new generator with a seed for reproducibility
    pub fn new(seed: u64) -> Self {
        Self {
            state: Mutex::new(GeneratorState {
                rng: StdRng::seed_from_u64(seed),
                last_close: None,
                history: VecDeque::new(),
            }),
            drift_pct: 0.0,
        }
    }

    /// Add a constant trend per candle (e.g. -0.5 = -0.5% per candle)
    pub fn with_drift(mut self, drift_pct: f64) -> Self {
        self.drift_pct = drift_pct;
        self
    }

    /// Starting price by symbol
    pub fn base_price(symbol: &str) -> f64 {
        let symbol = symbol.to_uppercase();
        if symbol.starts_with("BTC") {
            60_000.0
        } else if symbol.starts_with("ETH") {
            3_000.0
        } else if symbol.starts_with("XRP") {
            0.5
        } else {
            100.0
        }
    }

    /// Generate every candle up to `now_secs` and return the latest ones
    ///
    /// # Arguments
    /// * `now_secs` - Current time; the candle containing it is in progress
    /// * `step_secs` - Candle interval
    /// * `limit` - Maximum closed candles to return
    pub fn generate_until(
        &self,
        symbol: &str,
        now_secs: i64,
        step_secs: i64,
        limit: usize,
    ) -> Result<MarketBatch> {
        if step_secs <= 0 {
            return Err(format!("invalid candle interval {}s", step_secs).into());
        }

        let mut state = self
            .state
            .lock()
            .map_err(|e| format!("synthetic generator poisoned: {}", e))?;

        let current_open = now_secs - now_secs.rem_euclid(step_secs);
        let mut next_time = match state.history.back() {
            Some(last) => last.time as i64 + step_secs,
            None => current_open - step_secs * limit as i64,
        };

        let mut last_close = state
            .last_close
            .unwrap_or_else(|| Self::base_price(symbol));

        while next_time < current_open {
            let tick = Self::next_tick(&mut state.rng, next_time, last_close, self.drift_pct);
            last_close = tick.close;
            state.history.push_back(tick);
            next_time += step_secs;
        }
        while state.history.len() > MAX_HISTORY {
            state.history.pop_front();
        }
        state.last_close = Some(last_close);

        // The in-progress candle is re-rolled on every call
        let live = Self::next_tick(&mut state.rng, current_open, last_close, self.drift_pct);

        let skip = state.history.len().saturating_sub(limit);
        Ok(MarketBatch {
            closed: state.history.iter().skip(skip).copied().collect(),
            live: Some(live),
        })
    }

    fn next_tick(rng: &mut StdRng, time: i64, last_close: f64, drift_pct: f64) -> RawTick {
        let fluctuation = (rng.gen::<f64>() - 0.5) * (last_close * 0.005);
        let open = last_close * (1.0 + drift_pct / 100.0) + fluctuation;
        let high = open + rng.gen::<f64>() * (last_close * 0.002);
        let low = open - rng.gen::<f64>() * (last_close * 0.002);
        let close = low + rng.gen::<f64>() * (high - low);
        let volume = rng.gen_range(100_000.0..1_100_000.0_f64).floor();

        RawTick {
            time: time as f64,
            open,
            high,
            low,
            close,
            volume,
        }
    }
}

impl MarketDataSource for SyntheticMarketData {
    async fn fetch_recent(&self, symbol: &str, interval: &str, limit: usize) -> Result<MarketBatch> {
        let step = interval_secs(interval)
            .ok_or_else(|| format!("unsupported interval '{}'", interval))?;
        self.generate_until(symbol, Utc::now().timestamp(), step, limit)
    }

    fn name(&self) -> &str {
        "synthetic"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Candle;

    const NOW: i64 = 1_700_000_010; // 30s into the minute opening at 1_699_999_980

    #[test]
    fn test_initial_backfill() {
        let source = SyntheticMarketData::new(42);
        let batch = source.generate_until("BTCUSDT", NOW, 60, 50).unwrap();

        assert_eq!(batch.closed.len(), 50);
        assert_eq!(batch.closed.last().unwrap().time, 1_699_999_920.0);
        assert_eq!(batch.live.unwrap().time, 1_699_999_980.0);
        assert!(batch
            .closed
            .windows(2)
            .all(|w| w[1].time - w[0].time == 60.0));
    }

    #[test]
    fn test_candles_are_valid() {
        let source = SyntheticMarketData::new(7);
        let batch = source.generate_until("ETHUSDT", NOW, 60, 200).unwrap();

        for tick in &batch.closed {
            assert!(Candle::try_from(*tick).is_ok(), "invalid tick {:?}", tick);
        }
        // Random walk stays near the ETH base price
        let first = batch.closed[0].close;
        assert!(first > 2_900.0 && first < 3_100.0);
    }

    #[test]
    fn test_deterministic_per_seed() {
        let a = SyntheticMarketData::new(42).generate_until("BTCUSDT", NOW, 60, 20).unwrap();
        let b = SyntheticMarketData::new(42).generate_until("BTCUSDT", NOW, 60, 20).unwrap();
        let c = SyntheticMarketData::new(43).generate_until("BTCUSDT", NOW, 60, 20).unwrap();

        assert_eq!(a, b);
        assert_ne!(a.closed, c.closed);
    }

    #[test]
    fn test_later_calls_extend_history() {
        let source = SyntheticMarketData::new(1);
        let first = source.generate_until("BTCUSDT", NOW, 60, 10).unwrap();
        let second = source.generate_until("BTCUSDT", NOW + 180, 60, 10).unwrap();

        // Three more candles closed in the meantime
        assert_eq!(second.closed[6], first.closed[9]);
        assert_eq!(
            second.closed.last().unwrap().time,
            first.closed.last().unwrap().time + 180.0
        );
    }

    #[test]
    fn test_negative_drift_trends_down() {
        let source = SyntheticMarketData::new(3).with_drift(-1.0);
        let batch = source.generate_until("SOLUSDT", NOW, 60, 30).unwrap();
        let first = batch.closed.first().unwrap().close;
        let last = batch.closed.last().unwrap().close;
        assert!(last < first * 0.85);
    }

    #[test]
    fn test_fetch_recent_via_trait() {
        let source = SyntheticMarketData::new(5);
        let batch = tokio_test::block_on(source.fetch_recent("BTCUSDT", "1m", 25)).unwrap();
        assert_eq!(batch.closed.len(), 25);
        assert!(batch.live.is_some());

        let err = tokio_test::block_on(source.fetch_recent("BTCUSDT", "1M", 25));
        assert!(err.is_err());
    }
}

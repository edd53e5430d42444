use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::EngineError;

/// Latest accepted candle open (3000-01-01T00:00:00Z)
///
/// Anything later is a unit mix-up (milliseconds sent as seconds) or
/// garbage, and would pin the window so no later candle could follow it.
pub const MAX_CANDLE_TIME: i64 = 32_503_680_000;

/// OHLCV candlestick data
///
/// `time` is seconds since the Unix epoch and marks the candle open.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Candle {
    pub time: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Candle {
    /// Check the candle against the OHLCV invariants
    ///
    /// A candle is valid when its timestamp is positive, every value is
    /// finite, prices are positive, volume is non-negative and the wicks
    /// enclose the body.
    pub fn validate(&self) -> Result<(), EngineError> {
        let malformed = |reason: String| EngineError::MalformedInput {
            time: self.time as f64,
            reason,
        };

        if self.time <= 0 {
            return Err(malformed(format!("non-positive timestamp {}", self.time)));
        }
        if self.time > MAX_CANDLE_TIME {
            return Err(malformed(format!("timestamp {} is too far in the future", self.time)));
        }

        for (name, value) in [
            ("open", self.open),
            ("high", self.high),
            ("low", self.low),
            ("close", self.close),
            ("volume", self.volume),
        ] {
            if !value.is_finite() {
                return Err(malformed(format!("{} is not finite", name)));
            }
        }

        if self.open <= 0.0 || self.high <= 0.0 || self.low <= 0.0 || self.close <= 0.0 {
            return Err(malformed("prices must be positive".to_string()));
        }
        if self.volume < 0.0 {
            return Err(malformed(format!("negative volume {}", self.volume)));
        }
        if self.low > self.open.min(self.close) {
            return Err(malformed(format!(
                "low ({}) is above the candle body",
                self.low
            )));
        }
        if self.high < self.open.max(self.close) {
            return Err(malformed(format!(
                "high ({}) is below the candle body",
                self.high
            )));
        }

        Ok(())
    }
}

/// Candle as delivered by a market-data collaborator, before normalization
///
/// Upstream timestamps arrive as plain JSON numbers, so `time` is kept as
/// `f64` (seconds) until it has been checked.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct RawTick {
    pub time: f64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl TryFrom<RawTick> for Candle {
    type Error = EngineError;

    fn try_from(tick: RawTick) -> Result<Self, Self::Error> {
        if !tick.time.is_finite() || tick.time <= 0.0 {
            return Err(EngineError::MalformedInput {
                time: tick.time,
                reason: "timestamp must be finite and positive".to_string(),
            });
        }
        // Checked before the cast, which would saturate at i64::MAX
        if tick.time >= (MAX_CANDLE_TIME + 1) as f64 {
            return Err(EngineError::MalformedInput {
                time: tick.time,
                reason: "timestamp is too far in the future".to_string(),
            });
        }

        let candle = Candle {
            time: tick.time.floor() as i64,
            open: tick.open,
            high: tick.high,
            low: tick.low,
            close: tick.close,
            volume: tick.volume,
        };
        candle.validate()?;
        Ok(candle)
    }
}

/// Normalized shapes a market-data collaborator can deliver
#[derive(Debug, Clone, PartialEq)]
pub enum MarketUpdate {
    /// Periodic REST poll: a batch of recent finished candles
    Batch(Vec<RawTick>),
    /// Push message for a finished candle
    Closed(RawTick),
    /// Push message for the latest in-progress candle
    InProgress(RawTick),
}

/// Indicator value that may not exist yet
///
/// Replaces the dashboard's "N/A" string: a missing indicator is never
/// rendered as a default number.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Default)]
#[serde(untagged)]
pub enum Metric {
    Available(f64),
    #[default]
    Unavailable,
}

impl Metric {
    /// `Available` for finite values, `Unavailable` otherwise
    pub fn from_value(value: f64) -> Self {
        if value.is_finite() {
            Metric::Available(value)
        } else {
            Metric::Unavailable
        }
    }

    pub fn value(&self) -> Option<f64> {
        match self {
            Metric::Available(v) => Some(*v),
            Metric::Unavailable => None,
        }
    }

    pub fn is_available(&self) -> bool {
        matches!(self, Metric::Available(_))
    }
}

impl From<Option<f64>> for Metric {
    fn from(value: Option<f64>) -> Self {
        value.map(Metric::from_value).unwrap_or(Metric::Unavailable)
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Metric::Available(v) => write!(f, "{:.2}", v),
            Metric::Unavailable => write!(f, "N/A"),
        }
    }
}

/// One Bollinger Band entry, aligned to the end of its window
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct BollingerBand {
    pub middle: f64,
    pub upper: f64,
    pub lower: f64,
}

/// Trade signal derived from the latest indicators
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Signal {
    pub rsi: Metric,
    pub bb_width_pct: Metric,
    pub is_active: bool,
    pub suggested_stop_loss: f64,
    pub suggested_take_profit: f64,
    /// Oversold or squeezed market, shown as a highlight next to the chart
    pub is_highlighted: bool,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum TradeSide {
    Buy,
    Sell,
}

/// User-supplied risk settings
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RiskParameters {
    pub capital: f64,
    pub risk_per_trade_pct: f64,
    pub stop_loss_pct: f64,
    pub take_profit_pct: f64,
}

impl Default for RiskParameters {
    fn default() -> Self {
        Self {
            capital: 10_000.0,
            risk_per_trade_pct: 1.0,
            stop_loss_pct: 2.0,
            take_profit_pct: 4.0,
        }
    }
}

/// Output of the position sizer
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Default)]
pub struct PositionSizing {
    pub risk_amount: f64,
    pub stop_loss_price: f64,
    pub take_profit_price: f64,
    pub position_size: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tick(time: f64, close: f64) -> RawTick {
        RawTick {
            time,
            open: close,
            high: close + 1.0,
            low: close - 1.0,
            close,
            volume: 10.0,
        }
    }

    #[test]
    fn test_raw_tick_normalizes() {
        let candle = Candle::try_from(tick(1_700_000_000.0, 100.0)).unwrap();
        assert_eq!(candle.time, 1_700_000_000);
        assert_eq!(candle.close, 100.0);
    }

    #[test]
    fn test_raw_tick_rejects_bad_time() {
        assert!(Candle::try_from(tick(f64::NAN, 100.0)).is_err());
        assert!(Candle::try_from(tick(f64::INFINITY, 100.0)).is_err());
        assert!(Candle::try_from(tick(0.0, 100.0)).is_err());
        assert!(Candle::try_from(tick(-60.0, 100.0)).is_err());
    }

    #[test]
    fn test_raw_tick_rejects_out_of_range_time() {
        // Would saturate to i64::MAX and block every later candle
        let err = Candle::try_from(tick(1e300, 100.0)).unwrap_err();
        assert!(err.is_malformed());

        // Milliseconds passed as seconds
        assert!(Candle::try_from(tick(1_700_000_000_000.0, 100.0)).is_err());

        let candle = Candle::try_from(tick(MAX_CANDLE_TIME as f64 + 0.5, 100.0)).unwrap();
        assert_eq!(candle.time, MAX_CANDLE_TIME);
    }

    #[test]
    fn test_candle_rejects_far_future_time() {
        let mut candle = Candle::try_from(tick(60.0, 100.0)).unwrap();
        candle.time = i64::MAX;
        assert!(candle.validate().unwrap_err().is_malformed());
    }

    #[test]
    fn test_candle_rejects_inverted_wicks() {
        let mut raw = tick(60.0, 100.0);
        raw.high = 99.0;
        assert!(Candle::try_from(raw).is_err());

        let mut raw = tick(60.0, 100.0);
        raw.low = 100.5;
        assert!(Candle::try_from(raw).is_err());
    }

    #[test]
    fn test_candle_rejects_non_finite_values() {
        let mut raw = tick(60.0, 100.0);
        raw.volume = f64::NAN;
        assert!(Candle::try_from(raw).is_err());

        let mut raw = tick(60.0, 100.0);
        raw.volume = -1.0;
        assert!(Candle::try_from(raw).is_err());
    }

    #[test]
    fn test_metric_display_and_json() {
        assert_eq!(Metric::Available(42.126).to_string(), "42.13");
        assert_eq!(Metric::Unavailable.to_string(), "N/A");

        assert_eq!(serde_json::to_string(&Metric::Unavailable).unwrap(), "null");
        assert_eq!(serde_json::to_string(&Metric::Available(1.5)).unwrap(), "1.5");
    }

    #[test]
    fn test_metric_from_non_finite() {
        assert_eq!(Metric::from_value(f64::NAN), Metric::Unavailable);
        assert_eq!(Metric::from(None), Metric::Unavailable);
        assert_eq!(Metric::from(Some(3.0)).value(), Some(3.0));
    }
}

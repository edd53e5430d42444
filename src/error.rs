use thiserror::Error;

/// Failures the indicator core can report
///
/// Indicator and sizing functions never return these; they answer with
/// empty series or sentinel values instead. Only the candle store append
/// path and the feed layers produce errors.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum EngineError {
    /// Candle with a bad timestamp or a non-finite / inconsistent OHLCV value
    #[error("malformed candle at t={time}: {reason}")]
    MalformedInput { time: f64, reason: String },

    /// Candle that does not advance the series
    #[error("stale candle: time {time} is not after last stored time {last}")]
    StaleCandle { time: i64, last: i64 },

    /// Market data fetch or stream failure
    #[error("market data unavailable: {0}")]
    UpstreamUnavailable(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl EngineError {
    pub fn is_malformed(&self) -> bool {
        matches!(self, EngineError::MalformedInput { .. })
    }
}

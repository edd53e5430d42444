use crate::error::EngineError;
use crate::execution::candle_buffer::{gap_between, CandleBuffer, Gap};
use crate::indicators::{calculate_bollinger_bands, calculate_rsi};
use crate::models::{
    BollingerBand, Candle, MarketUpdate, Metric, PositionSizing, RawTick, RiskParameters, Signal,
    TradeSide,
};
use crate::risk::size_position;
use crate::strategy::{evaluate_signal, SignalConfig};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Indicator and window settings for the engine
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EngineSettings {
    pub capacity: usize,
    pub rsi_period: usize,
    pub bb_period: usize,
    pub bb_multiplier: f64,
    /// Expected spacing between candles; 0 disables gap detection
    #[serde(skip)]
    pub interval_secs: i64,
    #[serde(skip)]
    pub signal: SignalConfig,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            capacity: 100,
            rsi_period: 14,
            bb_period: 20,
            bb_multiplier: 2.0,
            interval_secs: 60,
            signal: SignalConfig::default(),
        }
    }
}

impl EngineSettings {
    /// Closes needed before both indicators produce a value
    pub fn min_candles_required(&self) -> usize {
        (self.rsi_period + 1).max(self.bb_period)
    }

    pub fn validate(&self) -> Result<(), EngineError> {
        if self.rsi_period == 0 || self.bb_period == 0 {
            return Err(EngineError::InvalidConfig(
                "indicator periods must be positive".to_string(),
            ));
        }
        if !self.bb_multiplier.is_finite() || self.bb_multiplier < 0.0 {
            return Err(EngineError::InvalidConfig(format!(
                "bollinger multiplier must be a non-negative number, got {}",
                self.bb_multiplier
            )));
        }
        if self.capacity < self.min_candles_required() {
            return Err(EngineError::InvalidConfig(format!(
                "window capacity {} cannot hold the {} candles the indicators need",
                self.capacity,
                self.min_candles_required()
            )));
        }
        Ok(())
    }
}

/// State of the upstream market-data connection
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "state", rename_all = "lowercase")]
pub enum FeedStatus {
    Connecting,
    Live,
    Unavailable {
        reason: String,
        since: DateTime<Utc>,
    },
}

/// Read-only view handed to consumers after every recomputation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DashboardSnapshot {
    pub symbol: String,
    pub closes: Vec<f64>,
    pub rsi_series: Vec<f64>,
    pub bollinger_series: Vec<BollingerBand>,
    pub signal: Signal,
    pub current_price: Metric,
    pub feed_status: FeedStatus,
    pub rejected_candles: u64,
    pub gaps_detected: u64,
}

/// Streaming indicator controller for one symbol
///
/// Owns the candle window and every derived series. All mutation goes
/// through `ingest` / `apply`, which recompute the indicators and the
/// signal before returning, so readers never see a half-updated window.
pub struct IndicatorEngine {
    symbol: String,
    settings: EngineSettings,
    buffer: CandleBuffer,
    rsi: Vec<f64>,
    bands: Vec<BollingerBand>,
    signal: Signal,
    live_price: Option<LivePrice>,
    feed_status: FeedStatus,
    rejected_candles: u64,
    last_rejection: Option<EngineError>,
    gaps: Vec<Gap>,
}

#[derive(Debug, Clone, Copy)]
struct LivePrice {
    time: i64,
    price: f64,
}

const MAX_TRACKED_GAPS: usize = 32;

impl IndicatorEngine {
    pub fn new(symbol: impl Into<String>, settings: EngineSettings) -> Self {
        let buffer = CandleBuffer::new(settings.capacity);
        Self {
            symbol: symbol.into(),
            settings,
            buffer,
            rsi: Vec::new(),
            bands: Vec::new(),
            signal: Signal::default(),
            live_price: None,
            feed_status: FeedStatus::Connecting,
            rejected_candles: 0,
            last_rejection: None,
            gaps: Vec::new(),
        }
    }

    /// Append a finished candle and recompute
    ///
    /// Returns `true` when the candle entered the window. Malformed candles
    /// are logged and counted; stale ones (already seen in an earlier poll)
    /// are skipped quietly.
    pub fn ingest(&mut self, candle: Candle) -> bool {
        if !self.push_candle(candle) {
            return false;
        }
        self.recompute();
        true
    }

    /// Normalize an upstream tick and append it
    pub fn ingest_raw(&mut self, tick: RawTick) -> bool {
        match Candle::try_from(tick) {
            Ok(candle) => self.ingest(candle),
            Err(e) => {
                self.record_rejection(e);
                false
            }
        }
    }

    /// Apply one normalized market update
    ///
    /// # Returns
    /// Number of candles appended to the window
    pub fn apply(&mut self, update: MarketUpdate) -> usize {
        match update {
            MarketUpdate::Batch(ticks) => {
                let mut appended = 0;
                for tick in ticks {
                    let pushed = match Candle::try_from(tick) {
                        Ok(candle) => self.push_candle(candle),
                        Err(e) => {
                            self.record_rejection(e);
                            false
                        }
                    };
                    if pushed {
                        appended += 1;
                    }
                }
                // One recompute per batch
                self.recompute();
                appended
            }
            MarketUpdate::Closed(tick) => usize::from(self.ingest_raw(tick)),
            MarketUpdate::InProgress(tick) => {
                if tick.time.is_finite() && tick.time > 0.0 {
                    self.set_live_price(tick.time.floor() as i64, tick.close);
                } else {
                    self.record_rejection(EngineError::MalformedInput {
                        time: tick.time,
                        reason: "in-progress tick without a usable timestamp".to_string(),
                    });
                }
                0
            }
        }
    }

    /// Update the in-progress price without touching the window
    pub fn set_live_price(&mut self, time: i64, price: f64) {
        if !price.is_finite() || price <= 0.0 {
            self.record_rejection(EngineError::MalformedInput {
                time: time as f64,
                reason: format!("live price {} is not a positive number", price),
            });
            return;
        }

        self.live_price = Some(LivePrice { time, price });
        self.evaluate();
    }

    /// Latest known price
    ///
    /// The in-progress price wins while it belongs to a candle newer than
    /// the last closed one; otherwise the last close is used.
    pub fn current_price(&self) -> Option<f64> {
        let last = self.buffer.last();
        match (self.live_price, last) {
            (Some(live), Some(last)) if live.time > last.time => Some(live.price),
            (Some(live), None) => Some(live.price),
            (_, Some(last)) => Some(last.close),
            (None, None) => None,
        }
    }

    pub fn mark_live(&mut self) {
        if self.feed_status != FeedStatus::Live {
            tracing::info!(symbol = %self.symbol, "Market data feed live");
        }
        self.feed_status = FeedStatus::Live;
    }

    /// Record an upstream failure as a distinct state
    pub fn mark_unavailable(&mut self, reason: impl Into<String>) {
        let reason = reason.into();
        tracing::warn!(symbol = %self.symbol, reason = %reason, "Market data unavailable");

        // Keep the first outage start across repeated failures
        let since = match &self.feed_status {
            FeedStatus::Unavailable { since, .. } => *since,
            _ => Utc::now(),
        };
        self.feed_status = FeedStatus::Unavailable { reason, since };
    }

    pub fn mark_connecting(&mut self) {
        if !matches!(self.feed_status, FeedStatus::Unavailable { .. }) {
            self.feed_status = FeedStatus::Connecting;
        }
    }

    /// Position size against the current price
    pub fn size_position(&self, params: &RiskParameters, side: TradeSide) -> PositionSizing {
        match self.current_price() {
            Some(price) => size_position(params, price, side),
            None => PositionSizing::default(),
        }
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    pub fn closes(&self) -> Vec<f64> {
        self.buffer.closes_since(0)
    }

    pub fn candles(&self) -> &CandleBuffer {
        &self.buffer
    }

    pub fn rsi_series(&self) -> &[f64] {
        &self.rsi
    }

    pub fn bollinger_series(&self) -> &[BollingerBand] {
        &self.bands
    }

    pub fn signal(&self) -> &Signal {
        &self.signal
    }

    pub fn feed_status(&self) -> &FeedStatus {
        &self.feed_status
    }

    pub fn rejected_candles(&self) -> u64 {
        self.rejected_candles
    }

    pub fn last_rejection(&self) -> Option<&EngineError> {
        self.last_rejection.as_ref()
    }

    /// Most recent continuity breaks, oldest first
    pub fn gaps(&self) -> &[Gap] {
        &self.gaps
    }

    /// True once both indicators have values
    pub fn is_warmed_up(&self) -> bool {
        !self.rsi.is_empty() && !self.bands.is_empty()
    }

    pub fn snapshot(&self) -> DashboardSnapshot {
        DashboardSnapshot {
            symbol: self.symbol.clone(),
            closes: self.closes(),
            rsi_series: self.rsi.clone(),
            bollinger_series: self.bands.clone(),
            signal: self.signal.clone(),
            current_price: Metric::from(self.current_price()),
            feed_status: self.feed_status.clone(),
            rejected_candles: self.rejected_candles,
            gaps_detected: self.gaps.len() as u64,
        }
    }

    /// Append without recomputing
    fn push_candle(&mut self, candle: Candle) -> bool {
        let prev = self.buffer.last().copied();

        if let Err(e) = self.buffer.append(candle) {
            self.record_rejection(e);
            return false;
        }

        if let Some(prev) = prev {
            if let Some(gap) = gap_between(&prev, &candle, self.settings.interval_secs) {
                tracing::warn!(
                    symbol = %self.symbol,
                    from = gap.from,
                    to = gap.to,
                    missing_secs = gap.missing_secs,
                    "Candle gap detected, continuing without interpolation"
                );
                if self.gaps.len() == MAX_TRACKED_GAPS {
                    self.gaps.remove(0);
                }
                self.gaps.push(gap);
            }
        }

        true
    }

    fn record_rejection(&mut self, error: EngineError) {
        match &error {
            EngineError::StaleCandle { .. } => {
                tracing::debug!(symbol = %self.symbol, error = %error, "Skipping already-seen candle");
            }
            _ => {
                tracing::warn!(symbol = %self.symbol, error = %error, "Dropping malformed market data");
                self.rejected_candles += 1;
                self.last_rejection = Some(error);
            }
        }
    }

    fn recompute(&mut self) {
        let closes = self.buffer.closes_since(0);
        self.rsi = calculate_rsi(&closes, self.settings.rsi_period);
        self.bands =
            calculate_bollinger_bands(&closes, self.settings.bb_period, self.settings.bb_multiplier);
        self.evaluate();
    }

    fn evaluate(&mut self) {
        self.signal = evaluate_signal(
            &self.rsi,
            &self.bands,
            self.current_price(),
            &self.settings.signal,
        );

        tracing::debug!(
            symbol = %self.symbol,
            candles = self.buffer.len(),
            rsi = %self.signal.rsi,
            bb_width_pct = %self.signal.bb_width_pct,
            active = self.signal.is_active,
            "Indicators updated"
        );
    }
}

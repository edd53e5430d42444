use crate::api::interval_secs;
use crate::engine::EngineSettings;
use crate::error::EngineError;
use crate::models::RiskParameters;
use crate::strategy::SignalConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;

const ENV_PREFIX: &str = "SIGNALBOT";
const DEFAULT_CONFIG_FILE: &str = "signalbot";

/// Where market data comes from
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum FeedMode {
    /// Poll the REST kline endpoint on an interval
    Poll,
    /// Subscribe to the kline WebSocket stream
    Stream,
    /// Seeded synthetic candles, no network
    Mock,
}

/// Market data feed settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct FeedConfig {
    pub poll_interval_ms: u64,
    pub kline_limit: usize,
    pub rest_base_url: String,
    pub ws_url: String,
    pub requests_per_minute: u32,
    pub reconnect_initial_ms: u64,
    pub reconnect_max_ms: u64,
    pub mock_seed: u64,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 15_000,
            kline_limit: 100,
            rest_base_url: "https://api.binance.com".to_string(),
            ws_url: "wss://stream.binance.com:9443/ws".to_string(),
            requests_per_minute: 60,
            reconnect_initial_ms: 1_000,
            reconnect_max_ms: 60_000,
            mock_seed: 42,
        }
    }
}

/// Top-level application configuration
///
/// Layered as: built-in defaults, then `signalbot.toml` (or an explicit
/// file), then `SIGNALBOT__*` environment variables, e.g.
/// `SIGNALBOT__FEED__POLL_INTERVAL_MS=5000` or `SIGNALBOT__ENGINE__RSI_PERIOD=9`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    pub symbol: String,
    pub interval: String,
    pub mode: FeedMode,
    pub engine: EngineSettings,
    pub signal: SignalConfig,
    pub feed: FeedConfig,
    pub risk: RiskParameters,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            symbol: "BTCUSDT".to_string(),
            interval: "1m".to_string(),
            mode: FeedMode::Poll,
            engine: EngineSettings::default(),
            signal: SignalConfig::default(),
            feed: FeedConfig::default(),
            risk: RiskParameters::default(),
        }
    }
}

impl AppConfig {
    /// Load configuration from file and environment
    ///
    /// # Arguments
    /// * `path` - Explicit config file (required to exist). When `None`,
    ///   `signalbot.toml` in the working directory is used if present.
    pub fn load(path: Option<&Path>) -> crate::Result<Self> {
        let file = match path {
            Some(p) => ::config::File::from(p).required(true),
            None => ::config::File::with_name(DEFAULT_CONFIG_FILE).required(false),
        };

        let settings = ::config::Config::builder()
            .add_source(file)
            .add_source(
                ::config::Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let app: AppConfig = settings.try_deserialize()?;
        app.validate()?;
        Ok(app)
    }

    /// Reject settings that would leave the engine unable to ever warm up
    pub fn validate(&self) -> Result<(), EngineError> {
        let invalid = |msg: String| Err(EngineError::InvalidConfig(msg));

        if self.symbol.trim().is_empty() {
            return invalid("symbol must not be empty".to_string());
        }
        if interval_secs(&self.interval).is_none() {
            return invalid(format!("unsupported interval '{}'", self.interval));
        }
        if self.feed.poll_interval_ms == 0 {
            return invalid("feed.poll_interval_ms must be positive".to_string());
        }
        if self.feed.kline_limit == 0 {
            return invalid("feed.kline_limit must be positive".to_string());
        }
        if self.feed.requests_per_minute == 0 {
            return invalid("feed.requests_per_minute must be positive".to_string());
        }
        if !self.signal.rsi_threshold.is_finite() {
            return invalid("signal.rsi_threshold must be finite".to_string());
        }

        self.engine.validate()
    }

    /// Engine settings with gap detection tied to the candle interval
    pub fn engine_settings(&self) -> EngineSettings {
        EngineSettings {
            interval_secs: interval_secs(&self.interval).unwrap_or(0),
            signal: self.signal.clone(),
            ..self.engine.clone()
        }
    }
}

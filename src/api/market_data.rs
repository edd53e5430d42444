use super::{MarketBatch, MarketDataSource};
use crate::models::RawTick;
use crate::Result;
use chrono::Utc;
use governor::{Quota, RateLimiter};
use reqwest::Client;
use serde_json::Value;
use std::num::NonZeroU32;
use std::sync::Arc;
use tokio::time::{sleep, Duration};

const MAX_RETRIES: u32 = 3;
const INITIAL_BACKOFF_MS: u64 = 500;
const REQUEST_TIMEOUT_SECS: u64 = 15;

type KlineRateLimiter = RateLimiter<
    governor::state::direct::NotKeyed,
    governor::state::InMemoryState,
    governor::clock::DefaultClock,
>;

/// Client for Binance-compatible kline REST endpoints
///
/// `GET {base}/api/v3/klines?symbol=BTCUSDT&interval=1m&limit=100` answers
/// with rows of `[openTime, open, high, low, close, volume, closeTime, ...]`
/// where prices arrive as JSON strings. MEXC serves the same shape.
///
/// Cloneable; all clones share the same rate limiter.
#[derive(Clone)]
pub struct MarketDataClient {
    client: Client,
    base_url: String,
    rate_limiter: Arc<KlineRateLimiter>,
    max_retries: u32,
    initial_backoff_ms: u64,
}

impl MarketDataClient {
    /// Create a new client
    ///
    /// # Arguments
    /// * `base_url` - Exchange REST root, e.g. `https://api.binance.com`
    /// * `requests_per_minute` - Client-side rate limit
    pub fn new(base_url: impl Into<String>, requests_per_minute: u32) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;

        let quota = Quota::per_minute(NonZeroU32::new(requests_per_minute).unwrap_or(NonZeroU32::MIN));

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            rate_limiter: Arc::new(RateLimiter::direct(quota)),
            max_retries: MAX_RETRIES,
            initial_backoff_ms: INITIAL_BACKOFF_MS,
        })
    }

    /// Override the retry policy
    pub fn with_retries(mut self, max_retries: u32, initial_backoff_ms: u64) -> Self {
        self.max_retries = max_retries.max(1);
        self.initial_backoff_ms = initial_backoff_ms;
        self
    }

    /// Fetch recent klines
    /// Includes retry logic with exponential backoff for transient failures
    pub async fn get_klines(
        &self,
        symbol: &str,
        interval: &str,
        limit: usize,
    ) -> Result<MarketBatch> {
        let mut last_error = None;

        for attempt in 1..=self.max_retries {
            match self.fetch_klines_once(symbol, interval, limit).await {
                Ok(batch) => {
                    if attempt > 1 {
                        tracing::info!(
                            symbol = %symbol,
                            attempt,
                            "Fetched klines after retry"
                        );
                    }
                    return Ok(batch);
                }
                Err(e) => {
                    if attempt < self.max_retries {
                        let backoff_ms = self.initial_backoff_ms * 2_u64.pow(attempt - 1);
                        tracing::warn!(
                            "Attempt {}/{} failed for {}: {}. Retrying in {}ms...",
                            attempt,
                            self.max_retries,
                            symbol,
                            e,
                            backoff_ms
                        );
                        sleep(Duration::from_millis(backoff_ms)).await;
                    }
                    last_error = Some(e);
                }
            }
        }

        // All retries exhausted
        Err(last_error.unwrap_or_else(|| "All retry attempts failed".into()))
    }

    /// Internal method to fetch klines once (without retry logic)
    async fn fetch_klines_once(
        &self,
        symbol: &str,
        interval: &str,
        limit: usize,
    ) -> Result<MarketBatch> {
        self.rate_limiter.until_ready().await;

        let url = format!("{}/api/v3/klines", self.base_url);
        let limit = limit.to_string();

        let response = self
            .client
            .get(&url)
            .query(&[("symbol", symbol), ("interval", interval), ("limit", limit.as_str())])
            .send()
            .await?
            .error_for_status()?;

        let rows: Vec<Vec<Value>> = response.json().await?;
        parse_kline_rows(&rows, Utc::now().timestamp_millis())
    }
}

impl MarketDataSource for MarketDataClient {
    async fn fetch_recent(&self, symbol: &str, interval: &str, limit: usize) -> Result<MarketBatch> {
        self.get_klines(symbol, interval, limit).await
    }

    fn name(&self) -> &str {
        "rest"
    }
}

/// Turn kline rows into closed candles plus the in-progress one
///
/// A row whose close time has not passed yet (`now_ms`) is the candle
/// still being traded. The exchange always ends the list with its open
/// candle, so the last row also counts as live while its close time is
/// within one interval of `now_ms`; a local clock running ahead of the
/// exchange would otherwise append a partial candle.
fn parse_kline_rows(rows: &[Vec<Value>], now_ms: i64) -> Result<MarketBatch> {
    let mut batch = MarketBatch::default();
    let now_ms = now_ms as f64;

    for (i, row) in rows.iter().enumerate() {
        if row.len() < 7 {
            return Err(format!("kline row has {} fields, expected at least 7", row.len()).into());
        }

        let open_time_ms = number_field(&row[0], "openTime")?;
        let close_time_ms = number_field(&row[6], "closeTime")?;

        let tick = RawTick {
            time: open_time_ms / 1000.0,
            open: number_field(&row[1], "open")?,
            high: number_field(&row[2], "high")?,
            low: number_field(&row[3], "low")?,
            close: number_field(&row[4], "close")?,
            volume: number_field(&row[5], "volume")?,
        };

        let is_last = i + 1 == rows.len();
        let span_ms = close_time_ms - open_time_ms + 1.0;
        let in_progress =
            close_time_ms >= now_ms || (is_last && close_time_ms + span_ms >= now_ms);

        if in_progress {
            batch.live = Some(tick);
        } else {
            batch.closed.push(tick);
        }
    }

    Ok(batch)
}

/// Exchanges send prices as JSON strings and times as numbers
fn number_field(value: &Value, name: &str) -> Result<f64> {
    match value {
        Value::Number(n) => n
            .as_f64()
            .ok_or_else(|| format!("field {} is not a valid number", name).into()),
        Value::String(s) => s
            .parse::<f64>()
            .map_err(|e| format!("failed to parse {} '{}': {}", name, s, e).into()),
        _ => Err(format!("field {} has unexpected JSON type", name).into()),
    }
}

/// Seconds per candle for an exchange interval string
///
/// Accepts `<n><unit>` with unit `s`, `m`, `h`, `d` or `w`/`W`
/// (`1m`, `15m`, `4h`, `1d`, `1W`). Month intervals have no fixed length
/// and return `None`.
pub fn interval_secs(interval: &str) -> Option<i64> {
    let unit = interval.chars().last()?;
    let count: i64 = interval[..interval.len() - unit.len_utf8()].parse().ok()?;
    if count <= 0 {
        return None;
    }

    let unit_secs = match unit {
        's' => 1,
        'm' => 60,
        'h' => 3_600,
        'd' => 86_400,
        'w' | 'W' => 604_800,
        _ => return None,
    };

    count.checked_mul(unit_secs)
}

use crate::api::MarketDataSource;
use crate::engine::{DashboardSnapshot, IndicatorEngine};
use crate::error::EngineError;
use crate::Result;
use tokio::sync::watch;
use tokio::time::{interval, Duration, MissedTickBehavior};

/// Polls a market-data source on a fixed interval and feeds the engine
///
/// The feed is the only writer of the engine it drives. Consumers read
/// snapshots from the watch channel passed to `run`.
pub struct PriceFeed<S> {
    source: S,
    symbol: String,
    interval: String,
    limit: usize,
    poll_interval: Duration,
}

impl<S: MarketDataSource> PriceFeed<S> {
    /// Create a new price feed
    ///
    /// # Arguments
    /// * `interval` - Candle interval requested from the source (`1m`, `5m`, ...)
    /// * `limit` - Candles requested per poll
    /// * `poll_interval` - Time between polls
    pub fn new(
        source: S,
        symbol: impl Into<String>,
        interval: impl Into<String>,
        limit: usize,
        poll_interval: Duration,
    ) -> Self {
        Self {
            source,
            symbol: symbol.into(),
            interval: interval.into(),
            limit,
            poll_interval,
        }
    }

    /// Fetch once and apply the result
    ///
    /// On failure the engine is marked unavailable and the error is
    /// returned; the window is left as it was.
    ///
    /// # Returns
    /// Number of new candles appended
    pub async fn poll_once(&self, engine: &mut IndicatorEngine) -> Result<usize> {
        let batch = match self
            .source
            .fetch_recent(&self.symbol, &self.interval, self.limit)
            .await
        {
            Ok(batch) => batch,
            Err(e) => {
                let reason = e.to_string();
                engine.mark_unavailable(reason.clone());
                return Err(EngineError::UpstreamUnavailable(reason).into());
            }
        };

        engine.mark_live();

        let mut appended = 0;
        for update in batch.into_updates() {
            appended += engine.apply(update);
        }

        tracing::info!(
            symbol = %self.symbol,
            source = self.source.name(),
            appended,
            candles = engine.candles().len(),
            rsi = %engine.signal().rsi,
            bb_width_pct = %engine.signal().bb_width_pct,
            active = engine.signal().is_active,
            "Polled market data"
        );

        Ok(appended)
    }

    /// Poll until `shutdown` flips to true or its sender is dropped
    ///
    /// A snapshot is published after every poll, successful or not, so
    /// consumers see outages as they happen. Failed polls are retried on
    /// the next tick.
    pub async fn run(
        &self,
        engine: &mut IndicatorEngine,
        snapshots: &watch::Sender<DashboardSnapshot>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        let mut ticker = interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tracing::info!(
            symbol = %self.symbol,
            source = self.source.name(),
            every_ms = self.poll_interval.as_millis() as u64,
            "Starting price feed"
        );

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.poll_once(engine).await {
                        tracing::error!(symbol = %self.symbol, error = %e, "Poll failed");
                    }
                    snapshots.send_replace(engine.snapshot());
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        tracing::info!(symbol = %self.symbol, "Price feed stopped");
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }
}

use crate::engine::{DashboardSnapshot, IndicatorEngine};
use crate::models::{MarketUpdate, RawTick};
use anyhow::{Context, Result};
use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::sync::watch;
use tokio::time::{sleep, Duration};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

/// Exponential reconnect delay with a ceiling
#[derive(Debug, Clone)]
pub struct ReconnectBackoff {
    initial: Duration,
    max: Duration,
    current: Duration,
}

impl ReconnectBackoff {
    pub fn new(initial: Duration, max: Duration) -> Self {
        let initial = initial.max(Duration::from_millis(1));
        let max = max.max(initial);
        Self {
            initial,
            max,
            current: initial,
        }
    }

    /// Delay before the next attempt; doubles up to the ceiling
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        self.current = (self.current * 2).min(self.max);
        delay
    }

    /// Call once a connection is healthy again
    pub fn reset(&mut self) {
        self.current = self.initial;
    }
}

/// Push-based kline feed over a Binance-compatible WebSocket
///
/// Subscribes to `<symbol>@kline_<interval>` on every (re)connect. Closed
/// klines extend the engine's window; in-progress klines only move the
/// live price.
pub struct KlineStream {
    url: String,
    symbol: String,
    interval: String,
    backoff: ReconnectBackoff,
    next_request_id: u64,
}

impl KlineStream {
    pub fn new(
        url: impl Into<String>,
        symbol: impl Into<String>,
        interval: impl Into<String>,
        backoff: ReconnectBackoff,
    ) -> Self {
        Self {
            url: url.into(),
            symbol: symbol.into(),
            interval: interval.into(),
            backoff,
            next_request_id: 1,
        }
    }

    /// Stream until `shutdown` flips to true or its sender is dropped
    ///
    /// Connection failures never end the loop: the engine is marked
    /// unavailable, a snapshot is published and the stream reconnects
    /// after the backoff delay.
    pub async fn run(
        &mut self,
        engine: &mut IndicatorEngine,
        snapshots: &watch::Sender<DashboardSnapshot>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        loop {
            if *shutdown.borrow() {
                break;
            }

            engine.mark_connecting();
            let reason = tokio::select! {
                result = self.stream_once(engine, snapshots) => match result {
                    Ok(()) => "stream closed by server".to_string(),
                    Err(e) => format!("{:#}", e),
                },
                _ = shutdown.changed() => break,
            };

            engine.mark_unavailable(reason);
            snapshots.send_replace(engine.snapshot());

            let delay = self.backoff.next_delay();
            tracing::info!(
                symbol = %self.symbol,
                delay_ms = delay.as_millis() as u64,
                "Reconnecting kline stream"
            );

            tokio::select! {
                _ = sleep(delay) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        tracing::info!(symbol = %self.symbol, "Kline stream stopped");
    }

    /// One connection lifetime
    async fn stream_once(
        &mut self,
        engine: &mut IndicatorEngine,
        snapshots: &watch::Sender<DashboardSnapshot>,
    ) -> Result<()> {
        tracing::info!(url = %self.url, symbol = %self.symbol, "Connecting to kline WebSocket");

        let (ws_stream, _response) = connect_async(self.url.as_str())
            .await
            .context("failed to connect to kline WebSocket")?;
        let (mut write, mut read) = ws_stream.split();

        let subscribe = subscribe_message(&self.symbol, &self.interval, self.next_request_id);
        self.next_request_id += 1;
        write
            .send(Message::Text(subscribe.to_string()))
            .await
            .context("failed to send kline subscription")?;

        tracing::info!(symbol = %self.symbol, interval = %self.interval, "Kline stream subscribed");
        self.backoff.reset();
        engine.mark_live();
        snapshots.send_replace(engine.snapshot());

        while let Some(msg) = read.next().await {
            let text = match msg.context("kline WebSocket read error")? {
                Message::Text(text) => text,
                Message::Close(frame) => {
                    tracing::warn!(symbol = %self.symbol, ?frame, "Kline WebSocket closed");
                    return Ok(());
                }
                _ => continue,
            };

            match parse_kline_message(&text) {
                Ok(Some(update)) => {
                    engine.apply(update);
                    snapshots.send_replace(engine.snapshot());
                }
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!(error = %e, "Failed to parse kline message");
                }
            }
        }

        tracing::warn!(symbol = %self.symbol, "Kline WebSocket stream ended");
        Ok(())
    }
}

/// `{"method":"SUBSCRIBE","params":["btcusdt@kline_1m"],"id":1}`
pub fn subscribe_message(symbol: &str, interval: &str, id: u64) -> Value {
    json!({
        "method": "SUBSCRIBE",
        "params": [format!("{}@kline_{}", symbol.to_lowercase(), interval)],
        "id": id,
    })
}

/// Parse a kline event
///
/// Expected shape:
/// ```json
/// { "e": "kline", "s": "BTCUSDT",
///   "k": { "t": 1700000000000, "o": "1.0", "h": "1.1", "l": "0.9", "c": "1.05", "v": "10", "x": false } }
/// ```
/// Subscription acks and other non-kline events yield `None`.
pub fn parse_kline_message(text: &str) -> Result<Option<MarketUpdate>> {
    let root: Value = serde_json::from_str(text).context("failed to parse kline JSON")?;

    if root.get("e").and_then(Value::as_str) != Some("kline") {
        return Ok(None);
    }

    let k = root.get("k").context("missing field k")?;
    let open_time_ms = k["t"].as_f64().context("missing field t")?;

    let tick = RawTick {
        time: open_time_ms / 1000.0,
        open: parse_string_f64(&k["o"]).context("failed to parse open")?,
        high: parse_string_f64(&k["h"]).context("failed to parse high")?,
        low: parse_string_f64(&k["l"]).context("failed to parse low")?,
        close: parse_string_f64(&k["c"]).context("failed to parse close")?,
        volume: parse_string_f64(&k["v"]).context("failed to parse volume")?,
    };

    let closed = k["x"].as_bool().context("missing field x")?;
    Ok(Some(if closed {
        MarketUpdate::Closed(tick)
    } else {
        MarketUpdate::InProgress(tick)
    }))
}

fn parse_string_f64(value: &Value) -> Result<f64> {
    value
        .as_str()
        .context("expected a string number")?
        .parse::<f64>()
        .context("not a number")
}

use signalbot::api::{MarketDataClient, SyntheticMarketData};
use signalbot::execution::PriceFeed;
use signalbot::indicators::{calculate_bollinger_bands, calculate_rsi, WilderRsi};
use signalbot::risk::size_position;
use signalbot::*;
use tokio::time::Duration;

fn candle(time: i64, close: f64) -> Candle {
    Candle {
        time,
        open: close,
        high: close + 1.0,
        low: close - 1.0,
        close,
        volume: 1_000.0,
    }
}

#[tokio::test]
async fn test_synthetic_feed_warms_up_engine() {
    let _ = tracing_subscriber::fmt::try_init();

    let feed = PriceFeed::new(
        SyntheticMarketData::new(42),
        "BTCUSDT",
        "1m",
        100,
        Duration::from_secs(15),
    );
    let mut engine = IndicatorEngine::new("BTCUSDT", EngineSettings::default());

    let appended = feed.poll_once(&mut engine).await.unwrap();
    assert_eq!(appended, 100);

    let snapshot = engine.snapshot();
    assert_eq!(snapshot.closes.len(), 100);
    assert_eq!(snapshot.rsi_series.len(), 100 - 14);
    assert_eq!(snapshot.bollinger_series.len(), 100 - 20 + 1);
    assert!(snapshot.rsi_series.iter().all(|v| (0.0..=100.0).contains(v)));
    assert!(snapshot
        .bollinger_series
        .iter()
        .all(|b| b.lower <= b.middle && b.middle <= b.upper));
    assert!(snapshot.signal.rsi.is_available());
    assert!(snapshot.signal.bb_width_pct.is_available());
    assert_eq!(snapshot.feed_status, FeedStatus::Live);

    // Indicators match a direct computation over the same window
    assert_eq!(snapshot.rsi_series, calculate_rsi(&snapshot.closes, 14));
    assert_eq!(
        snapshot.bollinger_series,
        calculate_bollinger_bands(&snapshot.closes, 20, 2.0)
    );
}

#[test]
fn test_streaming_rsi_matches_batch() {
    let closes: Vec<f64> = (0..60)
        .map(|i| 100.0 + (i as f64 * 0.7).sin() * 5.0 + i as f64 * 0.1)
        .collect();

    let mut rsi = WilderRsi::new(14);
    let streamed: Vec<f64> = closes.iter().filter_map(|c| rsi.push(*c)).collect();

    assert_eq!(streamed, calculate_rsi(&closes, 14));
}

#[test]
fn test_position_sizing_scenario() {
    let params = RiskParameters {
        capital: 10_000.0,
        risk_per_trade_pct: 1.0,
        stop_loss_pct: 2.0,
        take_profit_pct: 4.0,
    };

    let sizing = size_position(&params, 50_000.0, TradeSide::Buy);
    assert!((sizing.risk_amount - 100.0).abs() < 1e-9);
    assert!((sizing.stop_loss_price - 49_000.0).abs() < 1e-6);
    assert!((sizing.take_profit_price - 52_000.0).abs() < 1e-6);
    assert!((sizing.position_size - 0.1).abs() < 1e-9);

    let zero_stop = RiskParameters {
        stop_loss_pct: 0.0,
        ..params
    };
    assert_eq!(size_position(&zero_stop, 50_000.0, TradeSide::Buy).position_size, 0.0);
}

#[test]
fn test_stale_and_malformed_candles_leave_window_intact() {
    let mut engine = IndicatorEngine::new("ETHUSDT", EngineSettings::default());
    for i in 1..=30 {
        assert!(engine.ingest(candle(60 * i, 3_000.0 + i as f64)));
    }
    let before = engine.snapshot();

    assert!(!engine.ingest(candle(60 * 30, 10.0)));
    assert!(!engine.ingest(candle(60, 10.0)));
    assert!(!engine.ingest_raw(RawTick {
        time: f64::NAN,
        open: 1.0,
        high: 1.0,
        low: 1.0,
        close: 1.0,
        volume: 1.0,
    }));

    let after = engine.snapshot();
    assert_eq!(after.closes, before.closes);
    assert_eq!(after.rsi_series, before.rsi_series);
    assert_eq!(after.rejected_candles, 1);
}

#[tokio::test]
async fn test_rest_feed_against_mock_exchange() {
    let mut server = mockito::Server::new_async().await;

    // 25 closed one-minute candles trending down, then one far-future live row
    let mut rows: Vec<String> = (0..25)
        .map(|i| {
            let open_ms = 1_700_000_000_000_i64 + i * 60_000;
            let close = 100.0 - i as f64;
            format!(
                r#"[{}, "{}", "{}", "{}", "{}", "5.0", {}, "0", 1, "0", "0", "0"]"#,
                open_ms,
                close + 0.5,
                close + 1.0,
                close - 1.0,
                close,
                open_ms + 59_999
            )
        })
        .collect();
    rows.push(
        r#"[4102444800000, "70", "71", "60", "60", "1.0", 4102444859999, "0", 1, "0", "0", "0"]"#
            .to_string(),
    );
    let body = format!("[{}]", rows.join(","));

    let mock = server
        .mock("GET", "/api/v3/klines")
        .match_query(mockito::Matcher::Any)
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(body)
        .create_async()
        .await;

    let client = MarketDataClient::new(server.url(), 600).unwrap();
    let feed = PriceFeed::new(client, "BTCUSDT", "1m", 26, Duration::from_secs(15));
    let mut engine = IndicatorEngine::new("BTCUSDT", EngineSettings::default());

    let appended = feed.poll_once(&mut engine).await.unwrap();
    mock.assert_async().await;

    assert_eq!(appended, 25);
    assert_eq!(engine.closes().len(), 25);
    assert_eq!(engine.current_price(), Some(60.0));

    // Steady decline: RSI pinned at 0 and the live price far below the band
    let signal = engine.signal();
    assert_eq!(signal.rsi, Metric::Available(0.0));
    assert!(signal.is_active);
    assert!(signal.is_highlighted);
    assert!((signal.suggested_stop_loss - 60.0 * 0.98).abs() < 1e-9);
}

#[tokio::test]
async fn test_rest_outage_is_reported() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("GET", "/api/v3/klines")
        .match_query(mockito::Matcher::Any)
        .with_status(500)
        .create_async()
        .await;

    let client = MarketDataClient::new(server.url(), 600)
        .unwrap()
        .with_retries(1, 1);
    let feed = PriceFeed::new(client, "BTCUSDT", "1m", 10, Duration::from_secs(15));
    let mut engine = IndicatorEngine::new("BTCUSDT", EngineSettings::default());

    assert!(feed.poll_once(&mut engine).await.is_err());
    assert!(matches!(
        engine.snapshot().feed_status,
        FeedStatus::Unavailable { .. }
    ));
    assert_eq!(engine.snapshot().current_price, Metric::Unavailable);
}

use anyhow::{anyhow, Context};
use clap::{Parser, Subcommand};
use signalbot::api::{MarketDataClient, SyntheticMarketData};
use signalbot::config::{AppConfig, FeedMode};
use signalbot::execution::{KlineStream, PriceFeed, ReconnectBackoff};
use signalbot::risk::size_position;
use signalbot::{DashboardSnapshot, FeedStatus, IndicatorEngine, TradeSide};
use std::path::PathBuf;
use tokio::sync::watch;
use tokio::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "signalbot", version, about = "Streaming RSI / Bollinger Band signal engine")]
struct Cli {
    /// Config file (defaults to ./signalbot.toml when present)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Follow a symbol and print indicator snapshots until Ctrl+C
    Watch {
        #[arg(long)]
        symbol: Option<String>,
        /// Candle interval, e.g. 1m, 5m, 1h
        #[arg(long)]
        interval: Option<String>,
        #[arg(long, value_enum)]
        mode: Option<FeedMode>,
        /// Print every snapshot as a JSON line
        #[arg(long)]
        json: bool,
    },
    /// Size a position from risk settings
    Size {
        #[arg(long)]
        capital: Option<f64>,
        /// Risk per trade, in percent of capital
        #[arg(long)]
        risk: Option<f64>,
        /// Stop-loss distance, in percent of price
        #[arg(long)]
        stop_loss: Option<f64>,
        /// Take-profit distance, in percent of price
        #[arg(long)]
        take_profit: Option<f64>,
        /// Reference price; fetched from the configured feed when omitted
        #[arg(long)]
        price: Option<f64>,
        #[arg(long, value_enum, default_value = "buy")]
        side: TradeSide,
        #[arg(long)]
        symbol: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    setup_logging();

    let cli = Cli::parse();
    let mut config = AppConfig::load(cli.config.as_deref())
        .map_err(|e| anyhow!(e))
        .context("failed to load configuration")?;

    match cli.command {
        Command::Watch {
            symbol,
            interval,
            mode,
            json,
        } => {
            if let Some(symbol) = symbol {
                config.symbol = symbol.to_uppercase();
            }
            if let Some(interval) = interval {
                config.interval = interval;
            }
            if let Some(mode) = mode {
                config.mode = mode;
            }
            config.validate()?;
            watch_symbol(config, json).await
        }
        Command::Size {
            capital,
            risk,
            stop_loss,
            take_profit,
            price,
            side,
            symbol,
        } => {
            let params = &mut config.risk;
            if let Some(capital) = capital {
                params.capital = capital;
            }
            if let Some(risk) = risk {
                params.risk_per_trade_pct = risk;
            }
            if let Some(stop_loss) = stop_loss {
                params.stop_loss_pct = stop_loss;
            }
            if let Some(take_profit) = take_profit {
                params.take_profit_pct = take_profit;
            }
            if let Some(symbol) = symbol {
                config.symbol = symbol.to_uppercase();
            }
            size_command(&config, price, side).await
        }
    }
}

fn setup_logging() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("signalbot=info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

async fn watch_symbol(config: AppConfig, json: bool) -> anyhow::Result<()> {
    tracing::info!("🚀 signalbot starting");
    tracing::info!("\n📊 Configuration:");
    tracing::info!("  Symbol: {} ({})", config.symbol, config.interval);
    tracing::info!("  Feed: {:?}", config.mode);
    tracing::info!(
        "  RSI({}) < {} and price at BB({}, {})",
        config.engine.rsi_period,
        config.signal.rsi_threshold,
        config.engine.bb_period,
        config.engine.bb_multiplier
    );

    let engine = IndicatorEngine::new(config.symbol.clone(), config.engine_settings());
    let (snapshot_tx, mut snapshot_rx) = watch::channel(engine.snapshot());
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let runner = tokio::spawn(run_feed(config, engine, snapshot_tx, shutdown_rx));

    let printer = tokio::spawn(async move {
        let mut was_active = false;
        while snapshot_rx.changed().await.is_ok() {
            let snapshot = snapshot_rx.borrow_and_update().clone();
            if json {
                match serde_json::to_string(&snapshot) {
                    Ok(line) => println!("{}", line),
                    Err(e) => tracing::error!("Failed to serialize snapshot: {}", e),
                }
            } else {
                print_snapshot(&snapshot);
            }

            if snapshot.signal.is_active && !was_active {
                tracing::info!(
                    "🟢 BUY signal for {}: RSI {} at lower band, stop {:.4}, target {:.4}",
                    snapshot.symbol,
                    snapshot.signal.rsi,
                    snapshot.signal.suggested_stop_loss,
                    snapshot.signal.suggested_take_profit
                );
            }
            was_active = snapshot.signal.is_active;
        }
    });

    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            result.context("failed to listen for Ctrl+C")?;
            tracing::info!("\n🛑 Shutdown signal received");
        }
        _ = shutdown_tx.closed() => {}
    }

    shutdown_tx.send(true).ok();
    let result = runner.await.context("feed task panicked")?;
    printer.await.ok();

    tracing::info!("👋 signalbot stopped");
    result
}

/// Own the engine for the lifetime of the feed
async fn run_feed(
    config: AppConfig,
    mut engine: IndicatorEngine,
    snapshots: watch::Sender<DashboardSnapshot>,
    shutdown: watch::Receiver<bool>,
) -> anyhow::Result<()> {
    let poll_interval = Duration::from_millis(config.feed.poll_interval_ms);

    match config.mode {
        FeedMode::Poll => {
            let client =
                MarketDataClient::new(config.feed.rest_base_url.clone(), config.feed.requests_per_minute)
                    .map_err(|e| anyhow!(e))?;
            PriceFeed::new(
                client,
                config.symbol.clone(),
                config.interval.clone(),
                config.feed.kline_limit,
                poll_interval,
            )
            .run(&mut engine, &snapshots, shutdown)
            .await;
        }
        FeedMode::Mock => {
            PriceFeed::new(
                SyntheticMarketData::new(config.feed.mock_seed),
                config.symbol.clone(),
                config.interval.clone(),
                config.feed.kline_limit,
                poll_interval,
            )
            .run(&mut engine, &snapshots, shutdown)
            .await;
        }
        FeedMode::Stream => {
            // Seed the window over REST so indicators are ready before the first push
            let client =
                MarketDataClient::new(config.feed.rest_base_url.clone(), config.feed.requests_per_minute)
                    .map_err(|e| anyhow!(e))?;
            let backfill = PriceFeed::new(
                client,
                config.symbol.clone(),
                config.interval.clone(),
                config.feed.kline_limit,
                poll_interval,
            );
            if let Err(e) = backfill.poll_once(&mut engine).await {
                tracing::warn!("Backfill failed, waiting for stream candles: {}", e);
            }
            snapshots.send_replace(engine.snapshot());

            let backoff = ReconnectBackoff::new(
                Duration::from_millis(config.feed.reconnect_initial_ms),
                Duration::from_millis(config.feed.reconnect_max_ms),
            );
            KlineStream::new(
                config.feed.ws_url.clone(),
                config.symbol.clone(),
                config.interval.clone(),
                backoff,
            )
            .run(&mut engine, &snapshots, shutdown)
            .await;
        }
    }

    Ok(())
}

fn print_snapshot(snapshot: &DashboardSnapshot) {
    let status = match &snapshot.feed_status {
        FeedStatus::Connecting => "connecting".to_string(),
        FeedStatus::Live => "live".to_string(),
        FeedStatus::Unavailable { reason, since } => {
            format!("UNAVAILABLE since {} ({})", since.format("%H:%M:%S"), reason)
        }
    };

    let marker = if snapshot.signal.is_active {
        "🟢 ACTIVE"
    } else if snapshot.signal.is_highlighted {
        "🟡 watch"
    } else {
        "-"
    };

    println!(
        "{} | price {} | RSI {} | BB width % {} | candles {} | {} | {}",
        snapshot.symbol,
        snapshot.current_price,
        snapshot.signal.rsi,
        snapshot.signal.bb_width_pct,
        snapshot.closes.len(),
        status,
        marker
    );
}

async fn size_command(
    config: &AppConfig,
    price: Option<f64>,
    side: TradeSide,
) -> anyhow::Result<()> {
    let reference_price = match price {
        Some(price) => price,
        None => fetch_current_price(config).await?,
    };

    let sizing = size_position(&config.risk, reference_price, side);

    println!("Position sizing for {} ({:?})", config.symbol, side);
    println!("  Reference price: {:.4}", reference_price);
    println!("  Risk amount:     {:.2}", sizing.risk_amount);
    println!("  Stop loss:       {:.4}", sizing.stop_loss_price);
    println!("  Take profit:     {:.4}", sizing.take_profit_price);
    println!("  Position size:   {:.6}", sizing.position_size);
    Ok(())
}

async fn fetch_current_price(config: &AppConfig) -> anyhow::Result<f64> {
    let mut engine = IndicatorEngine::new(config.symbol.clone(), config.engine_settings());
    let poll_interval = Duration::from_millis(config.feed.poll_interval_ms);

    match config.mode {
        FeedMode::Mock => {
            PriceFeed::new(
                SyntheticMarketData::new(config.feed.mock_seed),
                config.symbol.clone(),
                config.interval.clone(),
                config.feed.kline_limit,
                poll_interval,
            )
            .poll_once(&mut engine)
            .await
            .map_err(|e| anyhow!(e))?;
        }
        FeedMode::Poll | FeedMode::Stream => {
            let client =
                MarketDataClient::new(config.feed.rest_base_url.clone(), config.feed.requests_per_minute)
                    .map_err(|e| anyhow!(e))?;
            PriceFeed::new(
                client,
                config.symbol.clone(),
                config.interval.clone(),
                config.feed.kline_limit,
                poll_interval,
            )
            .poll_once(&mut engine)
            .await
            .map_err(|e| anyhow!(e))?;
        }
    }

    engine
        .current_price()
        .ok_or_else(|| anyhow!("no price available for {}", config.symbol))
}

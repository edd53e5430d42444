pub mod market_data;
pub mod synthetic;

pub use market_data::{interval_secs, MarketDataClient};
pub use synthetic::SyntheticMarketData;

use crate::models::{MarketUpdate, RawTick};
use crate::Result;
use std::future::Future;

/// Recent candles for one symbol as returned by a market-data source
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MarketBatch {
    /// Finished candles, oldest first
    pub closed: Vec<RawTick>,
    /// The candle still being traded, if the source reports one
    pub live: Option<RawTick>,
}

impl MarketBatch {
    /// Split into the updates the engine understands
    pub fn into_updates(self) -> Vec<MarketUpdate> {
        let mut updates = vec![MarketUpdate::Batch(self.closed)];
        if let Some(live) = self.live {
            updates.push(MarketUpdate::InProgress(live));
        }
        updates
    }
}

/// Anything that can answer "give me the latest candles"
pub trait MarketDataSource: Send + Sync {
    fn fetch_recent(
        &self,
        symbol: &str,
        interval: &str,
        limit: usize,
    ) -> impl Future<Output = Result<MarketBatch>> + Send;

    /// Source name for logs
    fn name(&self) -> &str;
}

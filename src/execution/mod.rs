// Candle window and market-data runners
pub mod candle_buffer;
pub mod kline_stream;
pub mod price_feed;

pub use candle_buffer::{detect_gaps, CandleBuffer, Gap};
pub use kline_stream::{KlineStream, ReconnectBackoff};
pub use price_feed::PriceFeed;

// Technical indicators module
// Implements RSI and Bollinger Bands over a window of closes

pub mod bollinger;
pub mod moving_average;
pub mod rsi;

pub use bollinger::{bandwidth_pct, calculate_bollinger_bands};
pub use moving_average::{calculate_sma, calculate_std_dev};
pub use rsi::{calculate_rsi, WilderRsi};

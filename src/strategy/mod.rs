// Signal generation module
pub mod signals;

pub use signals::{evaluate_signal, SignalConfig};

use crate::indicators::bandwidth_pct;
use crate::models::{BollingerBand, Metric, Signal};
use serde::{Deserialize, Serialize};

/// Configuration for signal generation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SignalConfig {
    /// Oversold level that arms the signal
    pub rsi_threshold: f64,
    /// Suggested stop as a multiple of price
    pub stop_loss_factor: f64,
    /// Suggested target as a multiple of price when no band is available
    pub fallback_take_profit_factor: f64,
    /// Band width % under which the market is "squeezed"
    pub squeeze_width_pct: f64,
}

impl Default for SignalConfig {
    fn default() -> Self {
        Self {
            rsi_threshold: 30.0,
            stop_loss_factor: 0.98,            // 2% below entry
            fallback_take_profit_factor: 1.04, // 4% above entry
            squeeze_width_pct: 5.0,
        }
    }
}

/// Combine the latest indicators with the current price into a signal
///
/// The signal is active when the latest RSI is below the threshold AND the
/// price has touched or crossed the latest lower band. It is re-evaluated
/// from scratch on every tick; nothing carries over between calls.
///
/// Missing indicators are reported as `Metric::Unavailable` and keep the
/// signal inactive. Suggested levels are filled in whenever the price is
/// usable so they can be shown next to an inactive signal; `is_active`
/// decides whether they should be acted on.
pub fn evaluate_signal(
    rsi_series: &[f64],
    bands: &[BollingerBand],
    current_price: Option<f64>,
    config: &SignalConfig,
) -> Signal {
    let latest_rsi = rsi_series.last().copied();
    let latest_band = bands.last();

    let rsi = Metric::from(latest_rsi);
    let bb_width_pct = latest_band.map(bandwidth_pct).unwrap_or_default();

    let oversold = matches!(rsi, Metric::Available(v) if v < config.rsi_threshold);
    let squeezed = matches!(bb_width_pct, Metric::Available(w) if w < config.squeeze_width_pct);

    let price = match current_price {
        Some(p) if p.is_finite() && p > 0.0 => p,
        _ => {
            return Signal {
                rsi,
                bb_width_pct,
                is_highlighted: oversold || squeezed,
                ..Signal::default()
            }
        }
    };

    let at_lower_band = latest_band.map_or(false, |band| price <= band.lower);
    let is_active = oversold && at_lower_band;

    let suggested_take_profit = latest_band
        .map(|band| band.middle)
        .filter(|m| m.is_finite())
        .unwrap_or(price * config.fallback_take_profit_factor);

    if is_active {
        tracing::info!(
            rsi = %rsi,
            price = price,
            lower_band = latest_band.map(|b| b.lower),
            "Oversold at lower band, signal active"
        );
    }

    Signal {
        rsi,
        bb_width_pct,
        is_active,
        suggested_stop_loss: price * config.stop_loss_factor,
        suggested_take_profit,
        is_highlighted: oversold || squeezed,
    }
}

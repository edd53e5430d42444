use crate::models::{PositionSizing, RiskParameters, TradeSide};

/// Convert risk settings into a position size
///
/// * `risk_amount` = capital x risk% / 100
/// * stop and target prices sit `stop_loss_pct` / `take_profit_pct` away
///   from the reference price, below/above for a buy and mirrored for a sell
/// * `position_size` = risk_amount / (price x stop_loss% / 100), or 0 when
///   the stop distance is zero
///
/// Negative or non-finite capital and a non-positive or non-finite
/// reference price produce the all-zero result. Nothing in the output is
/// ever NaN or infinite.
pub fn size_position(
    params: &RiskParameters,
    reference_price: f64,
    side: TradeSide,
) -> PositionSizing {
    if !params.capital.is_finite() || params.capital < 0.0 {
        return PositionSizing::default();
    }
    if !reference_price.is_finite() || reference_price <= 0.0 {
        return PositionSizing::default();
    }

    let risk_pct = sanitize_pct(params.risk_per_trade_pct).min(100.0);
    let stop_loss_pct = sanitize_pct(params.stop_loss_pct);
    let take_profit_pct = sanitize_pct(params.take_profit_pct);

    let risk_amount = params.capital * risk_pct / 100.0;

    let (stop_loss_price, take_profit_price) = match side {
        TradeSide::Buy => (
            reference_price * (1.0 - stop_loss_pct / 100.0),
            reference_price * (1.0 + take_profit_pct / 100.0),
        ),
        TradeSide::Sell => (
            reference_price * (1.0 + stop_loss_pct / 100.0),
            reference_price * (1.0 - take_profit_pct / 100.0),
        ),
    };

    let position_size = if stop_loss_pct > 0.0 {
        risk_amount / (reference_price * stop_loss_pct / 100.0)
    } else {
        0.0
    };

    let result = PositionSizing {
        risk_amount,
        stop_loss_price,
        take_profit_price,
        position_size,
    };

    let all_finite = [
        result.risk_amount,
        result.stop_loss_price,
        result.take_profit_price,
        result.position_size,
    ]
    .iter()
    .all(|v| v.is_finite());

    if all_finite {
        result
    } else {
        tracing::warn!(?params, reference_price, "Position sizing overflowed, returning zero");
        PositionSizing::default()
    }
}

/// Negative and non-finite percentages count as 0
fn sanitize_pct(pct: f64) -> f64 {
    if pct.is_finite() && pct > 0.0 {
        pct
    } else {
        0.0
    }
}

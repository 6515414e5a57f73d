use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use thiserror::Error;

use super::scorer::regret_score;
use crate::models::{DiamondHandsWin, TokenRegret, Transfer};

/// A USD valuation does not fit in a `Decimal`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("USD value out of range")]
pub struct ValueOverflow;

/// Compare a closed round trip with having held until today.
///
/// Both transfers must already carry a USD value.
pub fn build_regret(
    buy: &Transfer,
    sell: &Transfer,
    current_price: Decimal,
) -> Result<TokenRegret, ValueOverflow> {
    let cost = buy.value_usd.unwrap_or_default();
    let proceeds = sell.value_usd.unwrap_or_default();

    let profit_made = proceeds.checked_sub(cost).ok_or(ValueOverflow)?;
    let would_be_worth = buy.amount.checked_mul(current_price).ok_or(ValueOverflow)?;
    let missed_profit = would_be_worth.checked_sub(proceeds).ok_or(ValueOverflow)?;
    let hold_duration = (sell.timestamp - buy.timestamp).num_days();
    let score = regret_score(missed_profit, hold_duration, profit_made);

    let narrative = if missed_profit > Decimal::ZERO {
        format!(
            "Sold {} {} after {} days for {}. Holding would be worth {} today: {} left on the table.",
            buy.amount.normalize(),
            buy.token.symbol,
            hold_duration,
            format_usd(proceeds),
            format_usd(would_be_worth),
            format_usd(missed_profit),
        )
    } else {
        format!(
            "Sold {} after {} days for {}. Good call: holding would only be worth {} today.",
            buy.token.symbol,
            hold_duration,
            format_usd(proceeds),
            format_usd(would_be_worth),
        )
    };

    Ok(TokenRegret {
        token: buy.token.clone(),
        buy: buy.clone(),
        sell: sell.clone(),
        current_price,
        profit_made,
        would_be_worth,
        missed_profit,
        hold_duration,
        regret_score: score,
        narrative,
    })
}

/// Unrealized outcome of a buy that was never sold. `Ok(None)` unless the
/// position is worth strictly more than it cost.
pub fn build_win(
    buy: &Transfer,
    current_price: Decimal,
    now: DateTime<Utc>,
) -> Result<Option<DiamondHandsWin>, ValueOverflow> {
    let cost = buy.value_usd.unwrap_or_default();
    let current_value = buy.amount.checked_mul(current_price).ok_or(ValueOverflow)?;
    let unrealized_gain = current_value.checked_sub(cost).ok_or(ValueOverflow)?;

    if unrealized_gain <= Decimal::ZERO {
        return Ok(None);
    }

    // A near-zero cost saturates the percentage instead of overflowing.
    let unrealized_gain_percent = if cost > Decimal::ZERO {
        unrealized_gain
            .checked_div(cost)
            .and_then(|ratio| ratio.checked_mul(Decimal::ONE_HUNDRED))
            .unwrap_or(Decimal::MAX)
            .round_dp(4)
    } else {
        Decimal::ZERO
    };
    let hold_duration = (now - buy.timestamp).num_days().max(0);

    let narrative = format!(
        "Held {} for {} days: {} is now worth {} (+{}%).",
        buy.token.symbol,
        hold_duration,
        format_usd(cost),
        format_usd(current_value),
        unrealized_gain_percent.round_dp(2).normalize(),
    );

    Ok(Some(DiamondHandsWin {
        token: buy.token.clone(),
        buy: buy.clone(),
        current_price,
        current_value,
        unrealized_gain,
        unrealized_gain_percent,
        hold_duration,
        narrative,
    }))
}

/// `$1234.50`, `-$12.00`
pub fn format_usd(value: Decimal) -> String {
    let rounded = value.round_dp(2);
    if rounded.is_sign_negative() && !rounded.is_zero() {
        format!("-${:.2}", rounded.abs())
    } else {
        format!("${:.2}", rounded.abs())
    }
}

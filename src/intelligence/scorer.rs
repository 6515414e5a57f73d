use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};

use crate::models::{DamageRank, EmotionalDamageScore, TokenRegret, PATIENCE_FLOOR};

const MAX_SCORE: u32 = 100;
/// Each half of the emotional damage score is capped at this.
const COMPONENT_CAP: i64 = 50;
/// Total missed profit (USD) at which the timing component saturates.
const TIMING_SATURATION_USD: i64 = 10_000;
/// Ratio used when nothing was realized, so the ratio term stays finite.
const DEFAULT_MISSED_RATIO: i64 = 10;

// ---------------------------------------------------------------------------
// Per round trip
// ---------------------------------------------------------------------------

/// Additive 0–100 regret score for one round trip.
///
/// - missed profit > $10k / $5k / $1k / $100: +40 / +30 / +20 / +10
/// - hold < 7 / 30 / 90 days: +30 / +20 / +10
/// - missed / realized > 10 / 5 / 2: +30 / +20 / +10 (ratio is 10 when
///   realized profit ≤ 0; a ratio too large to represent takes the top band)
pub fn regret_score(missed_profit: Decimal, hold_days: i64, profit_made: Decimal) -> u32 {
    let missed_points = if missed_profit > Decimal::from(10_000) {
        40
    } else if missed_profit > Decimal::from(5_000) {
        30
    } else if missed_profit > Decimal::from(1_000) {
        20
    } else if missed_profit > Decimal::from(100) {
        10
    } else {
        0
    };

    let hold_points = if hold_days < 7 {
        30
    } else if hold_days < 30 {
        20
    } else if hold_days < 90 {
        10
    } else {
        0
    };

    let ratio = if profit_made <= Decimal::ZERO {
        Decimal::from(DEFAULT_MISSED_RATIO)
    } else {
        match missed_profit.checked_div(profit_made) {
            Some(ratio) => ratio,
            None if missed_profit > Decimal::ZERO => Decimal::MAX,
            None => Decimal::MIN,
        }
    };
    let ratio_points = if ratio > Decimal::from(10) {
        30
    } else if ratio > Decimal::from(5) {
        20
    } else if ratio > Decimal::from(2) {
        10
    } else {
        0
    };

    (missed_points + hold_points + ratio_points).min(MAX_SCORE)
}

// ---------------------------------------------------------------------------
// Emotional damage
// ---------------------------------------------------------------------------

/// Composite 0–100 score: half from average regret severity, half from total
/// dollars missed. The airdrop component is always zero.
pub fn emotional_damage(regrets: &[TokenRegret]) -> EmotionalDamageScore {
    if regrets.is_empty() {
        return EmotionalDamageScore::zero();
    }

    let cap = Decimal::from(COMPONENT_CAP);
    let score_total: u64 = regrets.iter().map(|r| u64::from(r.regret_score)).sum();
    let avg_score = Decimal::from(score_total) / Decimal::from(regrets.len() as u64);
    let total_missed = saturating_total(regrets.iter().map(|r| r.missed_profit));

    let pain = (cap * avg_score / Decimal::ONE_HUNDRED).min(cap);
    let timing = match cap.checked_mul(total_missed) {
        Some(scaled) => (scaled / Decimal::from(TIMING_SATURATION_USD)).min(cap),
        None if total_missed > Decimal::ZERO => cap,
        None => Decimal::ZERO,
    };

    let paper_hands_pain = to_score(pain);
    let timing_fails = to_score(timing);
    let airdrop_regret = 0;
    let overall = (paper_hands_pain + timing_fails + airdrop_regret).min(MAX_SCORE);
    let rank = DamageRank::from_score(overall);

    EmotionalDamageScore {
        overall,
        paper_hands_pain,
        timing_fails,
        airdrop_regret,
        rank,
        label: rank.label().into(),
        glyph: rank.glyph().into(),
    }
}

/// Sum that pins at `Decimal::MAX` / `Decimal::MIN` instead of overflowing.
pub fn saturating_total(values: impl Iterator<Item = Decimal>) -> Decimal {
    values.fold(Decimal::ZERO, Decimal::saturating_add)
}

/// Round half away from zero and clamp to `0..=100`.
fn to_score(value: Decimal) -> u32 {
    value
        .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
        .max(Decimal::ZERO)
        .min(Decimal::from(MAX_SCORE))
        .to_u32()
        .unwrap_or(0)
}

// ---------------------------------------------------------------------------
// Patience
// ---------------------------------------------------------------------------

/// Mean hold duration in days across round trips, 0 when there are none.
pub fn average_hold_time(regrets: &[TokenRegret]) -> Decimal {
    if regrets.is_empty() {
        return Decimal::ZERO;
    }
    let total: i64 = regrets.iter().map(|r| r.hold_duration).sum();
    (Decimal::from(total) / Decimal::from(regrets.len() as i64)).round_dp(2)
}

/// Step function rewarding longer average holds.
pub fn patience_score(average_hold_days: Decimal) -> u32 {
    if average_hold_days > Decimal::from(90) {
        100
    } else if average_hold_days > Decimal::from(60) {
        80
    } else if average_hold_days > Decimal::from(30) {
        60
    } else if average_hold_days > Decimal::from(14) {
        40
    } else {
        PATIENCE_FLOOR
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

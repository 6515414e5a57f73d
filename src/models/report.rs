use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

use super::{TokenInfo, Transfer};

/// A closed buy → sell round trip, compared with holding until today.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenRegret {
    pub token: TokenInfo,
    pub buy: Transfer,
    pub sell: Transfer,
    pub current_price: Decimal,
    pub profit_made: Decimal,
    pub would_be_worth: Decimal,
    /// Negative when selling was the right call.
    pub missed_profit: Decimal,
    /// Whole days between buy and sell.
    pub hold_duration: i64,
    pub regret_score: u32,
    pub narrative: String,
}

/// A buy never matched by a sell that is worth more today than it cost.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiamondHandsWin {
    pub token: TokenInfo,
    pub buy: Transfer,
    pub current_price: Decimal,
    pub current_value: Decimal,
    pub unrealized_gain: Decimal,
    pub unrealized_gain_percent: Decimal,
    pub hold_duration: i64,
    pub narrative: String,
}

/// Five-band rank derived from the overall emotional damage score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DamageRank {
    Legend,
    PanicSeller,
    WeakHands,
    Shaky,
    Rookie,
}

impl DamageRank {
    pub fn from_score(overall: u32) -> Self {
        match overall {
            80.. => DamageRank::Legend,
            60..=79 => DamageRank::PanicSeller,
            40..=59 => DamageRank::WeakHands,
            20..=39 => DamageRank::Shaky,
            _ => DamageRank::Rookie,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            DamageRank::Legend => "Paper Hands Legend",
            DamageRank::PanicSeller => "Certified Panic Seller",
            DamageRank::WeakHands => "Weak Hands",
            DamageRank::Shaky => "Slightly Shaky",
            DamageRank::Rookie => "Diamond Rookie",
        }
    }

    pub fn glyph(&self) -> &'static str {
        match self {
            DamageRank::Legend => "🧻",
            DamageRank::PanicSeller => "😱",
            DamageRank::WeakHands => "😰",
            DamageRank::Shaky => "😅",
            DamageRank::Rookie => "💎",
        }
    }
}

impl fmt::Display for DamageRank {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.glyph(), self.label())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmotionalDamageScore {
    pub overall: u32,
    pub paper_hands_pain: u32,
    pub timing_fails: u32,
    /// Always zero: airdrop tracking is not implemented.
    pub airdrop_regret: u32,
    pub rank: DamageRank,
    pub label: String,
    pub glyph: String,
}

impl EmotionalDamageScore {
    pub fn zero() -> Self {
        let rank = DamageRank::Rookie;
        Self {
            overall: 0,
            paper_hands_pain: 0,
            timing_fails: 0,
            airdrop_regret: 0,
            rank,
            label: rank.label().into(),
            glyph: rank.glyph().into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegretStats {
    pub total_transactions: usize,
    pub total_buys: usize,
    pub total_sells: usize,
    pub tokens_analyzed: usize,
    pub tokens_skipped: usize,
    pub total_regrets: usize,
    pub total_wins: usize,
    /// Mean hold duration of closed round trips, in days.
    pub average_hold_time: Decimal,
    pub patience_score: u32,
}

/// Lowest patience score, given to wallets without a closed round trip.
pub const PATIENCE_FLOOR: u32 = 20;

impl RegretStats {
    pub fn empty() -> Self {
        Self {
            total_transactions: 0,
            total_buys: 0,
            total_sells: 0,
            tokens_analyzed: 0,
            tokens_skipped: 0,
            total_regrets: 0,
            total_wins: 0,
            average_hold_time: Decimal::ZERO,
            patience_score: PATIENCE_FLOOR,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisPeriod {
    #[serde(with = "chrono::serde::ts_seconds")]
    pub from: DateTime<Utc>,
    #[serde(with = "chrono::serde::ts_seconds")]
    pub to: DateTime<Utc>,
    pub days: u32,
}

/// Distinguishes "nothing happened" from "could not look".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisStatus {
    Complete,
    NoActivity,
    UpstreamUnavailable,
    UnsupportedChain,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub code: String,
    pub message: String,
}

impl Diagnostic {
    pub fn new(code: &str, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }
}

/// Final, read-only result of one wallet analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegretReport {
    pub wallet_address: String,
    pub chain_id: u64,
    pub period: AnalysisPeriod,
    pub biggest_regret: Option<TokenRegret>,
    pub all_regrets: Vec<TokenRegret>,
    pub total_missed_profit: Decimal,
    pub best_hold: Option<DiamondHandsWin>,
    pub all_wins: Vec<DiamondHandsWin>,
    pub total_unrealized_gain: Decimal,
    pub emotional_damage: EmotionalDamageScore,
    pub stats: RegretStats,
    pub share_text: String,
    pub status: AnalysisStatus,
    pub diagnostics: Vec<Diagnostic>,
    #[serde(with = "chrono::serde::ts_seconds")]
    pub generated_at: DateTime<Utc>,
}

impl RegretReport {
    /// Regrets ordered by missed profit, largest first. The canonical
    /// `all_regrets` order is left untouched.
    pub fn regrets_by_missed_profit(&self) -> Vec<&TokenRegret> {
        let mut sorted: Vec<&TokenRegret> = self.all_regrets.iter().collect();
        sorted.sort_by(|a, b| b.missed_profit.cmp(&a.missed_profit));
        sorted
    }

    /// Wins ordered by unrealized gain, largest first.
    pub fn wins_by_gain(&self) -> Vec<&DiamondHandsWin> {
        let mut sorted: Vec<&DiamondHandsWin> = self.all_wins.iter().collect();
        sorted.sort_by(|a, b| b.unrealized_gain.cmp(&a.unrealized_gain));
        sorted
    }

    pub fn has_diagnostic(&self, code: &str) -> bool {
        self.diagnostics.iter().any(|d| d.code == code)
    }
}

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use super::analysis::format_usd;
use super::scorer::{average_hold_time, emotional_damage, patience_score, saturating_total};
use crate::models::{
    AnalysisPeriod, AnalysisStatus, Diagnostic, DiamondHandsWin, Direction, EmotionalDamageScore,
    RegretReport, RegretStats, TokenRegret, Transfer,
};

/// Everything the engine gathered for one analysis.
#[derive(Debug, Clone)]
pub struct ReportParts {
    pub wallet_address: String,
    pub chain_id: u64,
    pub period: AnalysisPeriod,
    pub transfers: Vec<Transfer>,
    pub regrets: Vec<TokenRegret>,
    pub wins: Vec<DiamondHandsWin>,
    pub tokens_analyzed: usize,
    pub tokens_skipped: usize,
    pub diagnostics: Vec<Diagnostic>,
    pub generated_at: DateTime<Utc>,
}

/// Build the final report. Regrets are ordered by sell time and wins by buy
/// time; "biggest" selections do not reorder them.
pub fn assemble_report(parts: ReportParts) -> RegretReport {
    let ReportParts {
        wallet_address,
        chain_id,
        period,
        transfers,
        mut regrets,
        mut wins,
        tokens_analyzed,
        tokens_skipped,
        diagnostics,
        generated_at,
    } = parts;

    regrets.sort_by(|a, b| {
        a.sell
            .timestamp
            .cmp(&b.sell.timestamp)
            .then_with(|| a.buy.timestamp.cmp(&b.buy.timestamp))
            .then_with(|| a.token.address.cmp(&b.token.address))
            .then_with(|| a.sell.hash.cmp(&b.sell.hash))
    });
    wins.sort_by(|a, b| {
        a.buy
            .timestamp
            .cmp(&b.buy.timestamp)
            .then_with(|| a.token.address.cmp(&b.token.address))
            .then_with(|| a.buy.hash.cmp(&b.buy.hash))
    });

    let biggest_regret = first_max_by(&regrets, |r| r.missed_profit).cloned();
    let best_hold = first_max_by(&wins, |w| w.unrealized_gain).cloned();
    let total_missed_profit = saturating_total(regrets.iter().map(|r| r.missed_profit));
    let total_unrealized_gain = saturating_total(wins.iter().map(|w| w.unrealized_gain));

    let emotional_damage = emotional_damage(&regrets);
    let average_hold_time = average_hold_time(&regrets);

    let stats = RegretStats {
        total_transactions: transfers.len(),
        total_buys: transfers.iter().filter(|t| t.direction == Direction::Buy).count(),
        total_sells: transfers.iter().filter(|t| t.direction == Direction::Sell).count(),
        tokens_analyzed,
        tokens_skipped,
        total_regrets: regrets.len(),
        total_wins: wins.len(),
        average_hold_time,
        patience_score: patience_score(average_hold_time),
    };

    let share_text = share_text(biggest_regret.as_ref(), &emotional_damage);

    RegretReport {
        wallet_address,
        chain_id,
        period,
        biggest_regret,
        all_regrets: regrets,
        total_missed_profit,
        best_hold,
        all_wins: wins,
        total_unrealized_gain,
        emotional_damage,
        stats,
        share_text,
        status: AnalysisStatus::Complete,
        diagnostics,
        generated_at,
    }
}

/// Report for an analysis that stopped before matching.
pub fn empty_report(
    wallet_address: String,
    chain_id: u64,
    period: AnalysisPeriod,
    status: AnalysisStatus,
    diagnostics: Vec<Diagnostic>,
    generated_at: DateTime<Utc>,
) -> RegretReport {
    let emotional_damage = EmotionalDamageScore::zero();
    let share_text = share_text(None, &emotional_damage);

    RegretReport {
        wallet_address,
        chain_id,
        period,
        biggest_regret: None,
        all_regrets: Vec::new(),
        total_missed_profit: Decimal::ZERO,
        best_hold: None,
        all_wins: Vec::new(),
        total_unrealized_gain: Decimal::ZERO,
        emotional_damage,
        stats: RegretStats::empty(),
        share_text,
        status,
        diagnostics,
        generated_at,
    }
}

/// Shareable one-paragraph summary built around the biggest regret.
pub fn share_text(biggest: Option<&TokenRegret>, damage: &EmotionalDamageScore) -> String {
    match biggest {
        Some(r) if r.missed_profit > Decimal::ZERO => format!(
            "I sold ${} after {} days for {} ({} profit). If I'd held, it would be worth {} today. \
             That's {} I left on the table. Emotional damage: {}/100 {} {}",
            r.token.symbol,
            r.hold_duration,
            format_usd(r.sell.value_usd.unwrap_or_default()),
            format_usd(r.profit_made),
            format_usd(r.would_be_worth),
            format_usd(r.missed_profit),
            damage.overall,
            damage.glyph,
            damage.label,
        ),
        _ => format!(
            "No paper-hands regrets here. Every sale held up against today's prices. {} {}",
            damage.glyph, damage.label,
        ),
    }
}

/// First element with the greatest key, so ties resolve to canonical order.
fn first_max_by<T>(items: &[T], key: impl Fn(&T) -> Decimal) -> Option<&T> {
    items.iter().fold(None, |best: Option<&T>, item| match best {
        Some(b) if key(item) <= key(b) => Some(b),
        _ => Some(item),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::intelligence::analysis::build_regret;
    use crate::models::{Direction, TokenInfo};
    use chrono::Duration;

    fn at(days: i64) -> DateTime<Utc> {
        DateTime::<Utc>::from_timestamp(1_767_225_600, 0).unwrap() + Duration::days(days)
    }

    fn transfer(token: &str, direction: Direction, value: i64, day: i64) -> Transfer {
        Transfer {
            hash: format!("0x{token}{day}"),
            direction,
            token: TokenInfo::new(token, token.to_uppercase(), token),
            amount: Decimal::from(100),
            timestamp: at(day),
            value_usd: Some(Decimal::from(value)),
        }
    }

    fn period() -> AnalysisPeriod {
        AnalysisPeriod {
            from: at(0),
            to: at(90),
            days: 90,
        }
    }

    fn parts(regrets: Vec<TokenRegret>) -> ReportParts {
        ReportParts {
            wallet_address: "0xwallet".into(),
            chain_id: 1,
            period: period(),
            transfers: Vec::new(),
            regrets,
            wins: Vec::new(),
            tokens_analyzed: 1,
            tokens_skipped: 0,
            diagnostics: Vec::new(),
            generated_at: at(90),
        }
    }

    #[test]
    fn test_biggest_regret_is_max_missed_profit() {
        let small = build_regret(
            &transfer("aaa", Direction::Buy, 100, 0),
            &transfer("aaa", Direction::Sell, 120, 3),
            Decimal::from(2),
        )
        .unwrap();
        let big = build_regret(
            &transfer("bbb", Direction::Buy, 100, 1),
            &transfer("bbb", Direction::Sell, 100, 2),
            Decimal::from(50),
        )
        .unwrap();

        let report = assemble_report(parts(vec![big.clone(), small.clone()]));

        assert_eq!(report.all_regrets[0], small);
        assert_eq!(report.biggest_regret.as_ref(), Some(&big));
        assert_eq!(
            report.total_missed_profit,
            small.missed_profit + big.missed_profit
        );
        assert!(report.share_text.contains("$BBB"));
        assert_eq!(report.regrets_by_missed_profit()[0], &big);
    }

    #[test]
    fn test_biggest_regret_when_all_negative() {
        let bad = build_regret(
            &transfer("aaa", Direction::Buy, 100, 0),
            &transfer("aaa", Direction::Sell, 500, 3),
            Decimal::ONE,
        )
        .unwrap();
        let worse = build_regret(
            &transfer("bbb", Direction::Buy, 100, 1),
            &transfer("bbb", Direction::Sell, 900, 2),
            Decimal::ONE,
        )
        .unwrap();

        let report = assemble_report(parts(vec![bad.clone(), worse]));

        assert_eq!(report.biggest_regret.as_ref(), Some(&bad));
        assert!(report.share_text.starts_with("No paper-hands regrets"));
    }

    #[test]
    fn test_empty_report_shape() {
        let report = empty_report(
            "0xwallet".into(),
            1,
            period(),
            AnalysisStatus::NoActivity,
            Vec::new(),
            at(90),
        );
        assert_eq!(report.stats.total_transactions, 0);
        assert_eq!(report.emotional_damage.overall, 0);
        // Same floor as a report whose round trips all got dropped.
        assert_eq!(
            report.stats.patience_score,
            assemble_report(parts(Vec::new())).stats.patience_score
        );
        assert!(report.biggest_regret.is_none());
        assert!(report.best_hold.is_none());
        assert_eq!(report.status, AnalysisStatus::NoActivity);
    }
}

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use futures_util::stream::{self, StreamExt};
use metrics::{counter, histogram};
use reqwest::Client;

use super::analysis::{build_regret, build_win};
use super::matcher::match_fifo;
use super::report::{assemble_report, empty_report, ReportParts};
use crate::config::AppConfig;
use crate::history::TransferFetcher;
use crate::models::{
    address_key, AnalysisPeriod, AnalysisStatus, Chain, Diagnostic, DiamondHandsWin,
    RegretReport, TokenRegret, Transfer,
};
use crate::pricing::PriceResolver;

#[derive(Debug, Clone)]
pub struct EngineSettings {
    /// Token groups priced and matched at the same time.
    pub max_concurrency: usize,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self { max_concurrency: 4 }
    }
}

/// Result of pricing and matching one token group.
#[derive(Debug, Default)]
struct TokenOutcome {
    token: String,
    regrets: Vec<TokenRegret>,
    wins: Vec<DiamondHandsWin>,
    diagnostics: Vec<Diagnostic>,
    skipped: bool,
    /// Skipped because no price service could be reached.
    price_unavailable: bool,
}

/// Turns a wallet's transfer history into a [`RegretReport`].
///
/// Holds no per-wallet state. The only state shared between calls is the
/// resolver's price cache.
pub struct RegretEngine {
    fetcher: Arc<TransferFetcher>,
    resolver: Arc<PriceResolver>,
    settings: EngineSettings,
}

impl RegretEngine {
    pub fn new(
        fetcher: Arc<TransferFetcher>,
        resolver: Arc<PriceResolver>,
        settings: EngineSettings,
    ) -> Self {
        Self {
            fetcher,
            resolver,
            settings,
        }
    }

    pub fn from_config(config: &AppConfig, http: Client) -> Self {
        let fetcher = Arc::new(TransferFetcher::from_config(config, http.clone()));
        let resolver = Arc::new(PriceResolver::from_config(config, http));
        let settings = EngineSettings {
            max_concurrency: config.max_concurrent_lookups,
        };
        Self::new(fetcher, resolver, settings)
    }

    /// Shared price resolver, for cache maintenance.
    pub fn resolver(&self) -> Arc<PriceResolver> {
        self.resolver.clone()
    }

    pub async fn analyze_wallet_regrets(
        &self,
        address: &str,
        chain_id: u64,
        days_back: u32,
    ) -> RegretReport {
        self.analyze_wallet_regrets_at(address, chain_id, days_back, Utc::now())
            .await
    }

    /// Analyze with an explicit analysis time. Never fails: data absence and
    /// upstream outages are reported through `status` and `diagnostics`.
    pub async fn analyze_wallet_regrets_at(
        &self,
        address: &str,
        chain_id: u64,
        days_back: u32,
        now: DateTime<Utc>,
    ) -> RegretReport {
        let started = Instant::now();
        let report = self.run(address, chain_id, days_back, now).await;

        counter!("regret_reports_total").increment(1);
        histogram!("analysis_latency_seconds").record(started.elapsed().as_secs_f64());
        tracing::info!(
            wallet = %report.wallet_address,
            chain_id,
            status = ?report.status,
            regrets = report.all_regrets.len(),
            wins = report.all_wins.len(),
            damage = report.emotional_damage.overall,
            "Regret report generated"
        );

        report
    }

    async fn run(
        &self,
        address: &str,
        chain_id: u64,
        days_back: u32,
        now: DateTime<Utc>,
    ) -> RegretReport {
        let wallet = address_key(address);
        let period = AnalysisPeriod {
            from: now - chrono::Duration::days(i64::from(days_back)),
            to: now,
            days: days_back,
        };

        let Some(chain) = Chain::from_id(chain_id) else {
            tracing::warn!(chain_id, "Unsupported chain requested");
            return empty_report(
                wallet,
                chain_id,
                period,
                AnalysisStatus::UnsupportedChain,
                vec![Diagnostic::new(
                    "unsupported_chain",
                    format!("chain id {chain_id} is not supported"),
                )],
                now,
            );
        };

        let batch = self
            .fetcher
            .fetch_wallet_transfers_at(&wallet, chain, days_back, now)
            .await;
        let mut diagnostics = batch.diagnostics;

        if batch.transfers.is_empty() {
            let status = if batch.fetch_failed {
                diagnostics.push(Diagnostic::new(
                    "transfer_sources_unavailable",
                    "every transfer history source failed",
                ));
                AnalysisStatus::UpstreamUnavailable
            } else {
                AnalysisStatus::NoActivity
            };
            return empty_report(wallet, chain_id, period, status, diagnostics, now);
        }

        let mut groups: BTreeMap<String, Vec<Transfer>> = BTreeMap::new();
        for transfer in &batch.transfers {
            groups
                .entry(address_key(&transfer.token.address))
                .or_default()
                .push(transfer.clone());
        }

        // Warm the current-price cache in rate-limited chunks before the
        // per-token pass.
        let tokens: Vec<String> = groups.keys().cloned().collect();
        let warmed = self.resolver.get_batch_current_prices(&tokens, chain).await;
        tracing::debug!(tokens = tokens.len(), warmed = warmed.len(), "Current prices prefetched");

        let mut outcomes: Vec<TokenOutcome> = stream::iter(groups)
            .map(|(token, transfers)| self.analyze_token(token, transfers, chain, now))
            .buffer_unordered(self.settings.max_concurrency.max(1))
            .collect()
            .await;
        outcomes.sort_by(|a, b| a.token.cmp(&b.token));

        let mut regrets = Vec::new();
        let mut wins = Vec::new();
        let mut tokens_analyzed = 0;
        let mut tokens_skipped = 0;
        let mut tokens_unavailable = 0;

        for outcome in outcomes {
            if outcome.skipped {
                tokens_skipped += 1;
                if outcome.price_unavailable {
                    tokens_unavailable += 1;
                }
            } else {
                tokens_analyzed += 1;
            }
            regrets.extend(outcome.regrets);
            wins.extend(outcome.wins);
            diagnostics.extend(outcome.diagnostics);
        }

        let mut report = assemble_report(ReportParts {
            wallet_address: wallet,
            chain_id,
            period,
            transfers: batch.transfers,
            regrets,
            wins,
            tokens_analyzed,
            tokens_skipped,
            diagnostics,
            generated_at: now,
        });
        // Every token was skipped: either the price services were down for
        // all of them or nothing priceable happened.
        if tokens_analyzed == 0 {
            report.status = if tokens_unavailable == tokens_skipped {
                AnalysisStatus::UpstreamUnavailable
            } else {
                AnalysisStatus::NoActivity
            };
        }
        report
    }

    /// Price one token group and match it. A token without a current price is
    /// skipped whole; a transfer without any USD value is dropped from the group.
    async fn analyze_token(
        &self,
        token: String,
        transfers: Vec<Transfer>,
        chain: Chain,
        now: DateTime<Utc>,
    ) -> TokenOutcome {
        let current = match self.resolver.try_current_price(&token, chain).await {
            Ok(Some(point)) => point,
            Ok(None) => {
                tracing::info!(token = %token, "No current price, token skipped");
                let diagnostic =
                    Diagnostic::new("token_unpriced", format!("no current price for {token}"));
                return TokenOutcome {
                    token,
                    diagnostics: vec![diagnostic],
                    skipped: true,
                    ..TokenOutcome::default()
                };
            }
            Err(e) => {
                tracing::warn!(token = %token, error = %e, "Price services unreachable, token skipped");
                let diagnostic = Diagnostic::new(
                    "price_source_unavailable",
                    format!("current price for {token} unavailable: {e}"),
                );
                return TokenOutcome {
                    token,
                    diagnostics: vec![diagnostic],
                    skipped: true,
                    price_unavailable: true,
                    ..TokenOutcome::default()
                };
            }
        };

        let mut diagnostics = Vec::new();
        let mut priced = Vec::with_capacity(transfers.len());
        let mut unpriced = 0usize;
        let mut overflowed = 0usize;
        for mut transfer in transfers {
            if transfer.value_usd.is_none() {
                let Some(point) = self
                    .resolver
                    .get_historical_price(&token, transfer.timestamp, chain)
                    .await
                else {
                    unpriced += 1;
                    continue;
                };
                match transfer.amount.checked_mul(point.price_usd) {
                    Some(value) => transfer.value_usd = Some(value),
                    None => {
                        overflowed += 1;
                        continue;
                    }
                }
            }
            priced.push(transfer);
        }

        if unpriced > 0 {
            tracing::debug!(token = %token, dropped = unpriced, "Transfers without historical price");
            diagnostics.push(Diagnostic::new(
                "transfer_unpriced",
                format!("{unpriced} transfer(s) of {token} dropped: no historical price"),
            ));
        }

        let matched = match_fifo(&priced);
        let mut regrets = Vec::with_capacity(matched.round_trips.len());
        for (buy, sell) in &matched.round_trips {
            match build_regret(buy, sell, current.price_usd) {
                Ok(regret) => regrets.push(regret),
                Err(_) => overflowed += 1,
            }
        }
        let mut wins = Vec::new();
        for buy in &matched.open_buys {
            match build_win(buy, current.price_usd, now) {
                Ok(Some(win)) => wins.push(win),
                Ok(None) => {}
                Err(_) => overflowed += 1,
            }
        }

        if overflowed > 0 {
            tracing::warn!(token = %token, dropped = overflowed, "USD values out of range");
            diagnostics.push(Diagnostic::new(
                "value_overflow",
                format!("{overflowed} transfer(s) or trade(s) of {token} dropped: USD value out of range"),
            ));
        }

        TokenOutcome {
            token,
            regrets,
            wins,
            diagnostics,
            skipped: false,
            price_unavailable: false,
        }
    }
}

impl std::fmt::Debug for RegretEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegretEngine")
            .field("resolver", &self.resolver)
            .field("settings", &self.settings)
            .finish()
    }
}

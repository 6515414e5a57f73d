use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures_util::stream::{self, StreamExt};
use metrics::counter;
use reqwest::Client;

use crate::config::AppConfig;
use crate::models::{Chain, Diagnostic, Direction, RawTransfer, Transfer};
use crate::upstream::{
    AlchemyClient, EtherscanClient, TokenMetadata, TokenMetadataSource, TransferSource,
};

/// What to do with an upstream record whose timestamp is missing or unparsable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MissingTimestampPolicy {
    /// Drop the record and report it in the batch diagnostics.
    Drop,
    /// Keep the record, stamped with the fetch time.
    AssumeNow,
}

#[derive(Debug, Clone)]
pub struct FetcherSettings {
    pub call_timeout: Duration,
    pub metadata_timeout: Duration,
    pub max_concurrency: usize,
    pub missing_timestamp: MissingTimestampPolicy,
}

impl Default for FetcherSettings {
    fn default() -> Self {
        Self {
            call_timeout: Duration::from_secs(15),
            metadata_timeout: Duration::from_secs(5),
            max_concurrency: 4,
            missing_timestamp: MissingTimestampPolicy::Drop,
        }
    }
}

/// Normalized transfers plus how they were obtained.
#[derive(Debug, Clone, Default)]
pub struct TransferBatch {
    /// Sorted ascending by timestamp.
    pub transfers: Vec<Transfer>,
    /// Source that produced `transfers`, if any did.
    pub source: Option<&'static str>,
    pub diagnostics: Vec<Diagnostic>,
    /// Every source tried for the chain failed outright.
    pub fetch_failed: bool,
}

/// Fetches a wallet's ERC-20 history from an ordered list of sources,
/// falling through on error or empty result.
pub struct TransferFetcher {
    sources: Vec<Arc<dyn TransferSource>>,
    metadata: Option<Arc<dyn TokenMetadataSource>>,
    settings: FetcherSettings,
}

impl TransferFetcher {
    pub fn new(
        sources: Vec<Arc<dyn TransferSource>>,
        metadata: Option<Arc<dyn TokenMetadataSource>>,
        settings: FetcherSettings,
    ) -> Self {
        Self {
            sources,
            metadata,
            settings,
        }
    }

    /// Indexer first when an API key is configured, explorer second.
    pub fn from_config(config: &AppConfig, http: Client) -> Self {
        let mut sources: Vec<Arc<dyn TransferSource>> = Vec::new();
        let mut metadata: Option<Arc<dyn TokenMetadataSource>> = None;

        if let Some(key) = &config.alchemy_api_key {
            let alchemy = Arc::new(AlchemyClient::new(
                http.clone(),
                &config.alchemy_url_template,
                key,
                config.transfer_timeout(),
                config.metadata_timeout(),
            ));
            sources.push(alchemy.clone());
            metadata = Some(alchemy);
        } else {
            tracing::warn!("ALCHEMY_API_KEY not set, transfer history uses the explorer only");
        }

        sources.push(Arc::new(
            EtherscanClient::new(http, &config.etherscan_api_url, config.transfer_timeout())
                .with_api_key(config.etherscan_api_key.clone()),
        ));

        let settings = FetcherSettings {
            call_timeout: config.transfer_timeout(),
            metadata_timeout: config.metadata_timeout(),
            max_concurrency: config.max_concurrent_lookups,
            missing_timestamp: if config.assume_now_for_missing_timestamp {
                MissingTimestampPolicy::AssumeNow
            } else {
                MissingTimestampPolicy::Drop
            },
        };

        Self::new(sources, metadata, settings)
    }

    pub async fn fetch_wallet_transfers(
        &self,
        wallet: &str,
        chain: Chain,
        days_back: u32,
    ) -> TransferBatch {
        self.fetch_wallet_transfers_at(wallet, chain, days_back, Utc::now())
            .await
    }

    /// Same as [`fetch_wallet_transfers`](Self::fetch_wallet_transfers) with
    /// an explicit "now".
    pub async fn fetch_wallet_transfers_at(
        &self,
        wallet: &str,
        chain: Chain,
        days_back: u32,
        now: DateTime<Utc>,
    ) -> TransferBatch {
        let since = now - chrono::Duration::days(i64::from(days_back));
        let mut batch = TransferBatch::default();
        let mut attempted = 0usize;
        let mut failed = 0usize;

        for source in self.sources.iter().filter(|s| s.supports(chain)) {
            attempted += 1;
            let name = source.name();

            let raw = match tokio::time::timeout(
                self.settings.call_timeout,
                source.fetch_transfers(wallet, chain, since),
            )
            .await
            {
                Ok(Ok(raw)) => raw,
                Ok(Err(e)) => {
                    failed += 1;
                    counter!("transfer_source_failures_total").increment(1);
                    tracing::warn!(source = name, wallet = %wallet, error = %e, "Transfer source failed");
                    batch.diagnostics.push(Diagnostic::new(
                        "transfer_source_failed",
                        format!("{name}: {e}"),
                    ));
                    continue;
                }
                Err(_) => {
                    failed += 1;
                    counter!("transfer_source_failures_total").increment(1);
                    tracing::warn!(source = name, wallet = %wallet, "Transfer source timed out");
                    batch.diagnostics.push(Diagnostic::new(
                        "transfer_source_failed",
                        format!("{name}: timed out"),
                    ));
                    continue;
                }
            };

            let fetched = raw.len();
            let (transfers, diagnostics) =
                normalize_transfers(wallet, raw, since, now, self.settings.missing_timestamp);
            batch.diagnostics.extend(diagnostics);

            if transfers.is_empty() {
                tracing::debug!(source = name, wallet = %wallet, fetched, "No usable transfers, trying next source");
                continue;
            }

            tracing::info!(
                source = name,
                wallet = %wallet,
                chain = %chain,
                fetched,
                kept = transfers.len(),
                "Fetched wallet transfers"
            );

            batch.transfers = transfers;
            batch.source = Some(name);
            self.enrich_metadata(&mut batch, chain).await;
            return batch;
        }

        if attempted == 0 {
            tracing::info!(chain = %chain, "No transfer source supports chain");
            batch.diagnostics.push(Diagnostic::new(
                "no_transfer_source",
                format!("no transfer source supports {chain}"),
            ));
        }
        batch.fetch_failed = attempted > 0 && failed == attempted;
        batch
    }

    /// Best-effort symbol/name refresh; misses keep what the source gave.
    async fn enrich_metadata(&self, batch: &mut TransferBatch, chain: Chain) {
        let Some(source) = &self.metadata else {
            return;
        };

        let addresses: BTreeSet<String> = batch
            .transfers
            .iter()
            .map(|t| t.token.address.clone())
            .collect();
        let total = addresses.len();
        let timeout = self.settings.metadata_timeout;

        let found: HashMap<String, TokenMetadata> = stream::iter(addresses)
            .map(|address| async move {
                let result =
                    tokio::time::timeout(timeout, source.token_metadata(&address, chain)).await;
                match result {
                    Ok(Ok(Some(meta))) => Some((address, meta)),
                    Ok(Ok(None)) => None,
                    Ok(Err(e)) => {
                        tracing::debug!(token = %address, error = %e, "Token metadata lookup failed");
                        None
                    }
                    Err(_) => {
                        tracing::debug!(token = %address, "Token metadata lookup timed out");
                        None
                    }
                }
            })
            .buffer_unordered(self.settings.max_concurrency.max(1))
            .filter_map(|entry| async move { entry })
            .collect()
            .await;

        if found.len() < total {
            batch.diagnostics.push(Diagnostic::new(
                "token_metadata_missing",
                format!("metadata unavailable for {} of {} tokens", total - found.len(), total),
            ));
        }

        for transfer in &mut batch.transfers {
            let Some(meta) = found.get(&transfer.token.address) else {
                continue;
            };
            if let Some(symbol) = meta.symbol.as_deref().filter(|s| !s.trim().is_empty()) {
                transfer.token.symbol = symbol.to_string();
            }
            if let Some(name) = meta.name.as_deref().filter(|s| !s.trim().is_empty()) {
                transfer.token.name = name.to_string();
            }
        }
    }
}

/// Place raw records relative to `wallet`, drop out-of-window and duplicate
/// records, and sort ascending by time.
///
/// Records where the wallet is neither sender nor recipient, or both, are
/// ignored. Duplicates share a transaction hash and token address.
pub fn normalize_transfers(
    wallet: &str,
    raw: Vec<RawTransfer>,
    since: DateTime<Utc>,
    now: DateTime<Utc>,
    policy: MissingTimestampPolicy,
) -> (Vec<Transfer>, Vec<Diagnostic>) {
    let mut seen = HashSet::new();
    let mut transfers = Vec::with_capacity(raw.len());
    let mut missing_timestamp = 0usize;

    for record in raw {
        let Some(direction) = Direction::for_wallet(wallet, &record.from, &record.to) else {
            continue;
        };
        if record.amount.is_sign_negative() {
            continue;
        }

        let timestamp = match (record.timestamp, policy) {
            (Some(ts), _) => ts,
            (None, MissingTimestampPolicy::AssumeNow) => now,
            (None, MissingTimestampPolicy::Drop) => {
                missing_timestamp += 1;
                continue;
            }
        };
        if timestamp < since {
            continue;
        }

        let transfer = Transfer {
            hash: record.hash,
            direction,
            token: record.token,
            amount: record.amount,
            timestamp,
            value_usd: record.value_usd,
        };
        if seen.insert(transfer.dedup_key()) {
            transfers.push(transfer);
        }
    }

    transfers.sort_by(|a, b| {
        a.timestamp
            .cmp(&b.timestamp)
            .then_with(|| a.hash.cmp(&b.hash))
            .then_with(|| a.token.address.cmp(&b.token.address))
    });

    let mut diagnostics = Vec::new();
    if missing_timestamp > 0 {
        tracing::warn!(wallet = %wallet, dropped = missing_timestamp, "Dropped transfers without a usable timestamp");
        diagnostics.push(Diagnostic::new(
            "transfer_missing_timestamp",
            format!("{missing_timestamp} transfer(s) dropped: missing or unparsable timestamp"),
        ));
    }

    (transfers, diagnostics)
}

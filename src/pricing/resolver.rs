use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use metrics::counter;
use reqwest::Client;
use rust_decimal::Decimal;

use super::cache::TimedCache;
use crate::config::AppConfig;
use crate::errors::UpstreamError;
use crate::models::{address_key, Chain, PricePoint, PriceProvenance, PriceSample};
use crate::upstream::{CoinGeckoClient, DexScreenerClient, PriceIndex, PriceStrategy};

/// Width of a historical cache bucket.
const HISTORY_BUCKET_SECS: i64 = 3_600;
/// Extra time fetched on each side of a bucket so the closest sample to any
/// timestamp inside it is always in the window.
const HISTORY_PADDING_SECS: i64 = 3_600;

#[derive(Debug, Clone)]
pub struct ResolverSettings {
    pub current_ttl: Duration,
    pub batch_size: usize,
    pub batch_delay: Duration,
    pub call_timeout: Duration,
}

impl Default for ResolverSettings {
    fn default() -> Self {
        Self {
            current_ttl: Duration::from_secs(300),
            batch_size: 10,
            batch_delay: Duration::from_millis(1_100),
            call_timeout: Duration::from_secs(10),
        }
    }
}

type CurrentKey = (String, Chain);
type HistoryKey = (String, i64, Chain);

/// Resolves current and historical USD prices.
///
/// Current prices walk an ordered list of strategies and stop at the first
/// hit; historical prices come from the index's time-series endpoint. Both
/// are cached, current prices for `current_ttl`, historical series forever.
/// The caches are the only state carried between analyses, so one resolver
/// is built per process and shared behind an `Arc`.
pub struct PriceResolver {
    strategies: Vec<Arc<dyn PriceStrategy>>,
    index: Arc<dyn PriceIndex>,
    current_cache: TimedCache<CurrentKey, PricePoint>,
    /// Tokens a successful batch request came back without.
    index_misses: TimedCache<CurrentKey, ()>,
    history_cache: TimedCache<HistoryKey, Arc<Vec<PriceSample>>>,
    settings: ResolverSettings,
}

impl PriceResolver {
    pub fn new(
        strategies: Vec<Arc<dyn PriceStrategy>>,
        index: Arc<dyn PriceIndex>,
        settings: ResolverSettings,
    ) -> Self {
        Self {
            strategies,
            index,
            current_cache: TimedCache::with_ttl(settings.current_ttl),
            index_misses: TimedCache::with_ttl(settings.current_ttl),
            history_cache: TimedCache::permanent(),
            settings: ResolverSettings {
                batch_size: settings.batch_size.max(1),
                ..settings
            },
        }
    }

    /// Price index first, DEX aggregator second.
    pub fn from_config(config: &AppConfig, http: Client) -> Self {
        let index = Arc::new(
            CoinGeckoClient::new(http.clone(), &config.coingecko_api_url, config.price_timeout())
                .with_api_key(config.coingecko_api_key.clone()),
        );
        let dex = Arc::new(DexScreenerClient::new(
            http,
            &config.dexscreener_api_url,
            config.price_timeout(),
        ));

        let settings = ResolverSettings {
            current_ttl: config.price_cache_ttl(),
            batch_size: config.price_batch_size,
            batch_delay: config.price_batch_delay(),
            call_timeout: config.price_timeout(),
        };

        let strategies: Vec<Arc<dyn PriceStrategy>> =
            vec![index.clone() as Arc<dyn PriceStrategy>, dex as Arc<dyn PriceStrategy>];

        Self::new(strategies, index, settings)
    }

    /// Current USD price of `token`, or `None` when no strategy knows it or
    /// none could be reached.
    pub async fn get_current_price(&self, token: &str, chain: Chain) -> Option<PricePoint> {
        self.try_current_price(token, chain).await.ok().flatten()
    }

    /// Like [`get_current_price`](Self::get_current_price), but fails when
    /// every strategy that was asked failed at the transport level, so an
    /// outage is not mistaken for an unpriced token.
    ///
    /// The primary index is not asked again for a token that a recent batch
    /// request already came back without.
    pub async fn try_current_price(
        &self,
        token: &str,
        chain: Chain,
    ) -> Result<Option<PricePoint>, UpstreamError> {
        let key = (address_key(token), chain);

        if let Some(point) = self.current_cache.get(&key).await {
            counter!("price_cache_hits_total").increment(1);
            tracing::trace!(token = %key.0, chain = %chain, "Current price cache hit");
            return Ok(Some(point.cached()));
        }
        counter!("price_cache_misses_total").increment(1);

        let index_missed = self.index_misses.get(&key).await.is_some();
        let mut answered = index_missed;
        let mut last_error = None;

        for (attempt, strategy) in self.strategies.iter().enumerate() {
            let provenance = strategy.provenance();
            if index_missed && provenance == PriceProvenance::PrimaryIndex {
                tracing::trace!(token = %key.0, "Index already missed this token in batch");
                continue;
            }
            if attempt > 0 {
                counter!("price_fallbacks_total").increment(1);
            }

            match self.bounded(strategy.current_price(&key.0, chain)).await {
                Ok(Some(price)) => {
                    let point = PricePoint {
                        token_address: key.0.clone(),
                        chain,
                        timestamp: Utc::now(),
                        price_usd: price,
                        provenance,
                    };
                    self.current_cache.insert(key, point.clone()).await;
                    return Ok(Some(point));
                }
                Ok(None) => {
                    answered = true;
                    tracing::debug!(token = %key.0, source = %provenance, "No current price from source");
                }
                Err(e) => {
                    tracing::warn!(token = %key.0, source = %provenance, error = %e, "Current price lookup failed");
                    last_error = Some(e);
                }
            }
        }

        match last_error {
            Some(e) if !answered => Err(e),
            _ => Ok(None),
        }
    }

    /// USD price of `token` closest to `timestamp`, or `None` when the index
    /// has no samples around it.
    pub async fn get_historical_price(
        &self,
        token: &str,
        timestamp: DateTime<Utc>,
        chain: Chain,
    ) -> Option<PricePoint> {
        let token = address_key(token);
        let target_secs = timestamp.timestamp();
        let bucket = target_secs.div_euclid(HISTORY_BUCKET_SECS);
        let key = (token.clone(), bucket, chain);

        let (samples, provenance) = match self.history_cache.get(&key).await {
            Some(samples) => {
                counter!("price_cache_hits_total").increment(1);
                (samples, PriceProvenance::Cache)
            }
            None => {
                counter!("price_cache_misses_total").increment(1);
                let from = bucket * HISTORY_BUCKET_SECS - HISTORY_PADDING_SECS;
                let to = (bucket + 1) * HISTORY_BUCKET_SECS + HISTORY_PADDING_SECS;

                match self
                    .bounded(self.index.price_range(&token, chain, from, to))
                    .await
                {
                    Ok(samples) if !samples.is_empty() => {
                        let samples = Arc::new(samples);
                        self.history_cache.insert(key, samples.clone()).await;
                        (samples, PriceProvenance::PrimaryIndex)
                    }
                    Ok(_) => {
                        tracing::debug!(token = %token, at = target_secs, "No historical samples");
                        return None;
                    }
                    Err(e) => {
                        tracing::warn!(token = %token, at = target_secs, error = %e, "Historical price lookup failed");
                        return None;
                    }
                }
            }
        };

        let sample = closest_sample(&samples, target_secs * 1_000)?;
        Some(PricePoint {
            token_address: token,
            chain,
            timestamp: DateTime::from_timestamp_millis(sample.timestamp_ms).unwrap_or(timestamp),
            price_usd: sample.price_usd,
            provenance,
        })
    }

    /// Current prices for many tokens, one index request per chunk of
    /// `batch_size`, chunks issued one after another with `batch_delay`
    /// between them. Unknown tokens are absent from the result.
    pub async fn get_batch_current_prices(
        &self,
        tokens: &[String],
        chain: Chain,
    ) -> HashMap<String, Decimal> {
        let mut prices = HashMap::new();
        let mut seen = HashSet::new();
        let mut pending = Vec::new();

        for token in tokens {
            let key = address_key(token);
            if !seen.insert(key.clone()) {
                continue;
            }
            match self.current_cache.get(&(key.clone(), chain)).await {
                Some(point) => {
                    counter!("price_cache_hits_total").increment(1);
                    prices.insert(key, point.price_usd);
                }
                None => pending.push(key),
            }
        }

        for (i, chunk) in pending.chunks(self.settings.batch_size).enumerate() {
            if i > 0 {
                tokio::time::sleep(self.settings.batch_delay).await;
            }

            match self.bounded(self.index.current_prices(chunk, chain)).await {
                Ok(found) => {
                    let found: HashMap<String, Decimal> = found
                        .into_iter()
                        .map(|(address, price)| (address_key(&address), price))
                        .collect();
                    for address in chunk {
                        if !found.contains_key(address) {
                            self.index_misses.insert((address.clone(), chain), ()).await;
                        }
                    }
                    for (address, price) in found {
                        if !chunk.contains(&address) {
                            continue;
                        }
                        let point = PricePoint {
                            token_address: address.clone(),
                            chain,
                            timestamp: Utc::now(),
                            price_usd: price,
                            provenance: PriceProvenance::PrimaryIndex,
                        };
                        self.current_cache.insert((address.clone(), chain), point).await;
                        prices.insert(address, price);
                    }
                }
                Err(e) => {
                    tracing::warn!(chunk = i, size = chunk.len(), error = %e, "Batch price chunk failed");
                }
            }
        }

        prices
    }

    /// Drop expired current prices and batch misses. Historical series are
    /// kept.
    pub async fn purge_expired(&self) -> usize {
        self.current_cache.purge_expired().await + self.index_misses.purge_expired().await
    }

    /// `(current, historical)` entry counts.
    pub async fn cache_sizes(&self) -> (usize, usize) {
        (self.current_cache.len().await, self.history_cache.len().await)
    }

    /// Run one upstream call under the configured deadline.
    async fn bounded<T>(
        &self,
        call: impl Future<Output = Result<T, UpstreamError>>,
    ) -> Result<T, UpstreamError> {
        tokio::time::timeout(self.settings.call_timeout, call)
            .await
            .map_err(|_| UpstreamError::Timeout("price lookup"))?
    }
}

impl std::fmt::Debug for PriceResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PriceResolver")
            .field("strategies", &self.strategies.len())
            .field("settings", &self.settings)
            .finish()
    }
}

/// Periodically evict expired current prices so the cache stays bounded by
/// the set of recently analyzed tokens.
pub async fn run_cache_sweeper(resolver: Arc<PriceResolver>, every: Duration) {
    let mut ticker = tokio::time::interval(every.max(Duration::from_secs(1)));
    // The first tick completes immediately.
    ticker.tick().await;

    loop {
        ticker.tick().await;
        let purged = resolver.purge_expired().await;
        let (current, historical) = resolver.cache_sizes().await;
        tracing::debug!(purged, current, historical, "Price cache swept");
    }
}

/// Sample nearest to `target_ms`; on a tie the earlier sample wins.
pub fn closest_sample(samples: &[PriceSample], target_ms: i64) -> Option<PriceSample> {
    samples
        .iter()
        .min_by_key(|s| ((s.timestamp_ms - target_ms).abs(), s.timestamp_ms))
        .copied()
}

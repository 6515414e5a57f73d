use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use rust_decimal::Decimal;

use paperhands::errors::UpstreamError;
use paperhands::history::{FetcherSettings, TransferFetcher};
use paperhands::intelligence::{EngineSettings, RegretEngine};
use paperhands::models::{Chain, PriceProvenance, PriceSample, RawTransfer, TokenInfo};
use paperhands::pricing::{PriceResolver, ResolverSettings};
use paperhands::upstream::{
    PriceIndex, PriceStrategy, TokenMetadata, TokenMetadataSource, TransferSource,
};

#[allow(dead_code)]
pub const WALLET: &str = "0x00000000000000000000000000000000000000aa";
#[allow(dead_code)]
pub const COUNTERPARTY: &str = "0x00000000000000000000000000000000000000bb";
#[allow(dead_code)]
pub const TOKEN_A: &str = "0x000000000000000000000000000000000000a001";
#[allow(dead_code)]
pub const TOKEN_B: &str = "0x000000000000000000000000000000000000b002";

/// Fixed analysis time shared by every engine test.
#[allow(dead_code)]
pub fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 6, 1, 12, 0, 0).unwrap()
}

#[allow(dead_code)]
pub fn days_ago(days: i64) -> DateTime<Utc> {
    now() - chrono::Duration::days(days)
}

#[allow(dead_code)]
pub fn usd(value: i64) -> Decimal {
    Decimal::from(value)
}

/// Transfer of `amount` units of `token` into the test wallet.
#[allow(dead_code)]
pub fn buy(hash: &str, token: &str, amount: i64, value: Option<i64>, at: DateTime<Utc>) -> RawTransfer {
    raw(hash, COUNTERPARTY, WALLET, token, amount, value, Some(at))
}

/// Transfer of `amount` units of `token` out of the test wallet.
#[allow(dead_code)]
pub fn sell(hash: &str, token: &str, amount: i64, value: Option<i64>, at: DateTime<Utc>) -> RawTransfer {
    raw(hash, WALLET, COUNTERPARTY, token, amount, value, Some(at))
}

#[allow(dead_code)]
pub fn raw(
    hash: &str,
    from: &str,
    to: &str,
    token: &str,
    amount: i64,
    value: Option<i64>,
    at: Option<DateTime<Utc>>,
) -> RawTransfer {
    RawTransfer {
        hash: hash.into(),
        from: from.into(),
        to: to.into(),
        token: TokenInfo::new(token, symbol_for(token), "Test Token"),
        amount: Decimal::from(amount),
        timestamp: at,
        value_usd: value.map(Decimal::from),
    }
}

#[allow(dead_code)]
fn symbol_for(token: &str) -> &'static str {
    match token {
        TOKEN_A => "AAA",
        TOKEN_B => "BBB",
        _ => "UNK",
    }
}

// ---------------------------------------------------------------------------
// Price stubs
// ---------------------------------------------------------------------------

/// Price index stub: fixed current prices and time series, counting calls.
#[derive(Default)]
pub struct StubIndex {
    pub current: Mutex<HashMap<String, Decimal>>,
    pub series: Mutex<HashMap<String, Vec<PriceSample>>>,
    pub failing: bool,
    pub single_calls: AtomicUsize,
    pub batch_calls: AtomicUsize,
    pub range_calls: AtomicUsize,
    pub batch_sizes: Mutex<Vec<usize>>,
    pub batch_times: Mutex<Vec<tokio::time::Instant>>,
}

#[allow(dead_code)]
impl StubIndex {
    pub fn with_prices(prices: &[(&str, i64)]) -> Self {
        let stub = Self::default();
        {
            let mut current = stub.current.lock().unwrap();
            for (token, price) in prices {
                current.insert(token.to_lowercase(), Decimal::from(*price));
            }
        }
        stub
    }

    pub fn failing() -> Self {
        Self {
            failing: true,
            ..Self::default()
        }
    }

    pub fn set_price(&self, token: &str, price: Decimal) {
        self.current.lock().unwrap().insert(token.to_lowercase(), price);
    }

    pub fn set_series(&self, token: &str, samples: Vec<(DateTime<Utc>, Decimal)>) {
        let samples = samples
            .into_iter()
            .map(|(at, price_usd)| PriceSample {
                timestamp_ms: at.timestamp_millis(),
                price_usd,
            })
            .collect();
        self.series.lock().unwrap().insert(token.to_lowercase(), samples);
    }

    pub fn single_calls(&self) -> usize {
        self.single_calls.load(Ordering::SeqCst)
    }

    pub fn batch_calls(&self) -> usize {
        self.batch_calls.load(Ordering::SeqCst)
    }

    pub fn range_calls(&self) -> usize {
        self.range_calls.load(Ordering::SeqCst)
    }

    fn check(&self) -> Result<(), UpstreamError> {
        if self.failing {
            Err(UpstreamError::Status {
                source_name: "stub-index",
                status: 503,
            })
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl PriceStrategy for StubIndex {
    fn provenance(&self) -> PriceProvenance {
        PriceProvenance::PrimaryIndex
    }

    async fn current_price(
        &self,
        token: &str,
        _chain: Chain,
    ) -> Result<Option<Decimal>, UpstreamError> {
        self.single_calls.fetch_add(1, Ordering::SeqCst);
        self.check()?;
        Ok(self.current.lock().unwrap().get(&token.to_lowercase()).copied())
    }
}

#[async_trait]
impl PriceIndex for StubIndex {
    async fn current_prices(
        &self,
        tokens: &[String],
        _chain: Chain,
    ) -> Result<HashMap<String, Decimal>, UpstreamError> {
        self.batch_calls.fetch_add(1, Ordering::SeqCst);
        self.batch_sizes.lock().unwrap().push(tokens.len());
        self.batch_times.lock().unwrap().push(tokio::time::Instant::now());
        self.check()?;
        let current = self.current.lock().unwrap();
        Ok(tokens
            .iter()
            .filter_map(|t| current.get(&t.to_lowercase()).map(|p| (t.to_lowercase(), *p)))
            .collect())
    }

    async fn price_range(
        &self,
        token: &str,
        _chain: Chain,
        from_secs: i64,
        to_secs: i64,
    ) -> Result<Vec<PriceSample>, UpstreamError> {
        self.range_calls.fetch_add(1, Ordering::SeqCst);
        self.check()?;
        let series = self.series.lock().unwrap();
        Ok(series
            .get(&token.to_lowercase())
            .map(|samples| {
                samples
                    .iter()
                    .filter(|s| s.timestamp_ms >= from_secs * 1_000 && s.timestamp_ms <= to_secs * 1_000)
                    .copied()
                    .collect()
            })
            .unwrap_or_default())
    }
}

/// DEX fallback stub. Tracks how many lookups run at once.
#[derive(Default)]
pub struct StubDex {
    pub prices: HashMap<String, Decimal>,
    pub failing: bool,
    pub delay: Option<Duration>,
    pub calls: AtomicUsize,
    pub in_flight: AtomicUsize,
    pub peak_in_flight: AtomicUsize,
}

#[allow(dead_code)]
impl StubDex {
    pub fn with_prices(prices: &[(&str, i64)]) -> Self {
        Self {
            prices: prices
                .iter()
                .map(|(t, p)| (t.to_lowercase(), Decimal::from(*p)))
                .collect(),
            ..Self::default()
        }
    }

    pub fn failing() -> Self {
        Self {
            failing: true,
            ..Self::default()
        }
    }

    pub fn slow(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PriceStrategy for StubDex {
    fn provenance(&self) -> PriceProvenance {
        PriceProvenance::DexFallback
    }

    async fn current_price(
        &self,
        token: &str,
        _chain: Chain,
    ) -> Result<Option<Decimal>, UpstreamError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(running, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if self.failing {
            return Err(UpstreamError::Timeout("stub-dex"));
        }
        Ok(self.prices.get(&token.to_lowercase()).copied())
    }
}

// ---------------------------------------------------------------------------
// Transfer stubs
// ---------------------------------------------------------------------------

/// Transfer source returning a fixed result.
pub struct StubSource {
    pub name: &'static str,
    pub result: Result<Vec<RawTransfer>, String>,
    pub chains: Option<Vec<Chain>>,
    pub delay: Option<Duration>,
    pub calls: AtomicUsize,
}

#[allow(dead_code)]
impl StubSource {
    pub fn ok(name: &'static str, transfers: Vec<RawTransfer>) -> Self {
        Self {
            name,
            result: Ok(transfers),
            chains: None,
            delay: None,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing(name: &'static str) -> Self {
        Self {
            result: Err(format!("{name} is down")),
            ..Self::ok(name, Vec::new())
        }
    }

    pub fn only_on(mut self, chains: Vec<Chain>) -> Self {
        self.chains = Some(chains);
        self
    }

    pub fn slow(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TransferSource for StubSource {
    fn name(&self) -> &'static str {
        self.name
    }

    fn supports(&self, chain: Chain) -> bool {
        self.chains.as_ref().map_or(true, |chains| chains.contains(&chain))
    }

    async fn fetch_transfers(
        &self,
        _wallet: &str,
        _chain: Chain,
        _since: DateTime<Utc>,
    ) -> Result<Vec<RawTransfer>, UpstreamError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.result.clone().map_err(UpstreamError::Unexpected)
    }
}

/// Metadata stub keyed by lowercase token address.
#[derive(Default)]
pub struct StubMetadata {
    pub entries: HashMap<String, TokenMetadata>,
}

#[allow(dead_code)]
impl StubMetadata {
    pub fn with_symbol(token: &str, symbol: &str, name: &str) -> Self {
        let mut entries = HashMap::new();
        entries.insert(
            token.to_lowercase(),
            TokenMetadata {
                symbol: Some(symbol.into()),
                name: Some(name.into()),
                decimals: Some(18),
                logo: None,
            },
        );
        Self { entries }
    }
}

#[async_trait]
impl TokenMetadataSource for StubMetadata {
    async fn token_metadata(
        &self,
        token: &str,
        _chain: Chain,
    ) -> Result<Option<TokenMetadata>, UpstreamError> {
        Ok(self.entries.get(&token.to_lowercase()).cloned())
    }
}

// ---------------------------------------------------------------------------
// Builders
// ---------------------------------------------------------------------------

#[allow(dead_code)]
pub fn resolver_settings() -> ResolverSettings {
    ResolverSettings {
        current_ttl: Duration::from_secs(300),
        batch_size: 10,
        batch_delay: Duration::from_millis(10),
        call_timeout: Duration::from_secs(5),
    }
}

#[allow(dead_code)]
pub fn resolver(index: Arc<StubIndex>, dex: Arc<StubDex>) -> PriceResolver {
    let strategies: Vec<Arc<dyn PriceStrategy>> =
        vec![index.clone() as Arc<dyn PriceStrategy>, dex as Arc<dyn PriceStrategy>];
    PriceResolver::new(strategies, index, resolver_settings())
}

#[allow(dead_code)]
pub fn fetcher(sources: Vec<Arc<StubSource>>) -> TransferFetcher {
    let sources = sources
        .into_iter()
        .map(|s| s as Arc<dyn TransferSource>)
        .collect();
    TransferFetcher::new(sources, None, FetcherSettings::default())
}

#[allow(dead_code)]
pub fn engine(sources: Vec<Arc<StubSource>>, index: Arc<StubIndex>, dex: Arc<StubDex>) -> RegretEngine {
    engine_with(sources, index, dex, EngineSettings::default())
}

#[allow(dead_code)]
pub fn engine_with(
    sources: Vec<Arc<StubSource>>,
    index: Arc<StubIndex>,
    dex: Arc<StubDex>,
    settings: EngineSettings,
) -> RegretEngine {
    RegretEngine::new(Arc::new(fetcher(sources)), Arc::new(resolver(index, dex)), settings)
}

//! External price, transfer-history and token-metadata services.
//!
//! The resolver, fetcher and engine only talk to the traits defined here,
//! so tests swap in stubs and the HTTP clients stay independent of each other.

pub mod alchemy;
pub mod coingecko;
pub mod dexscreener;
pub mod explorer;
pub mod types;

pub use alchemy::AlchemyClient;
pub use coingecko::CoinGeckoClient;
pub use dexscreener::DexScreenerClient;
pub use explorer::EtherscanClient;
pub use types::TokenMetadata;

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use crate::errors::UpstreamError;
use crate::models::{Chain, PriceProvenance, PriceSample, RawTransfer};

/// One step of the current-price fallback chain.
#[async_trait]
pub trait PriceStrategy: Send + Sync {
    fn provenance(&self) -> PriceProvenance;

    /// `Ok(None)` when the source has no entry for the token.
    async fn current_price(
        &self,
        token: &str,
        chain: Chain,
    ) -> Result<Option<Decimal>, UpstreamError>;
}

/// Price index with batch and time-series endpoints.
#[async_trait]
pub trait PriceIndex: Send + Sync {
    /// Current USD prices keyed by lowercase token address. Tokens the index
    /// does not know are absent from the map.
    async fn current_prices(
        &self,
        tokens: &[String],
        chain: Chain,
    ) -> Result<HashMap<String, Decimal>, UpstreamError>;

    /// Samples between `from_secs` and `to_secs`, ordered by timestamp.
    async fn price_range(
        &self,
        token: &str,
        chain: Chain,
        from_secs: i64,
        to_secs: i64,
    ) -> Result<Vec<PriceSample>, UpstreamError>;
}

/// A transfer-history indexer for ERC-20 movements of one wallet.
#[async_trait]
pub trait TransferSource: Send + Sync {
    fn name(&self) -> &'static str;

    fn supports(&self, chain: Chain) -> bool;

    /// Transfers in or out of `wallet`, newest first where the source allows.
    /// Sources may stop paging once records are older than `since`.
    async fn fetch_transfers(
        &self,
        wallet: &str,
        chain: Chain,
        since: DateTime<Utc>,
    ) -> Result<Vec<RawTransfer>, UpstreamError>;
}

#[async_trait]
pub trait TokenMetadataSource: Send + Sync {
    async fn token_metadata(
        &self,
        token: &str,
        chain: Chain,
    ) -> Result<Option<TokenMetadata>, UpstreamError>;
}

/// Map a reqwest failure into the upstream taxonomy, keeping timeouts distinct.
pub(crate) fn transport_error(source_name: &'static str, err: reqwest::Error) -> UpstreamError {
    if err.is_timeout() {
        UpstreamError::Timeout(source_name)
    } else if let Some(status) = err.status() {
        UpstreamError::Status {
            source_name,
            status: status.as_u16(),
        }
    } else {
        UpstreamError::Http(err)
    }
}

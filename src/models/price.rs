use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

use super::Chain;

/// Where a resolved price came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PriceProvenance {
    PrimaryIndex,
    DexFallback,
    Cache,
}

impl PriceProvenance {
    pub fn as_str(&self) -> &'static str {
        match self {
            PriceProvenance::PrimaryIndex => "primary-index",
            PriceProvenance::DexFallback => "dex-fallback",
            PriceProvenance::Cache => "cache",
        }
    }
}

impl fmt::Display for PriceProvenance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A USD price for one token at one moment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PricePoint {
    pub token_address: String,
    pub chain: Chain,
    #[serde(with = "chrono::serde::ts_seconds")]
    pub timestamp: DateTime<Utc>,
    pub price_usd: Decimal,
    pub provenance: PriceProvenance,
}

impl PricePoint {
    /// Copy of this point as served from cache.
    pub fn cached(&self) -> Self {
        Self {
            provenance: PriceProvenance::Cache,
            ..self.clone()
        }
    }
}

/// One `[timestamp, price]` sample of a price time series.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PriceSample {
    pub timestamp_ms: i64,
    pub price_usd: Decimal,
}

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use rust_decimal::Decimal;
use serde_json::Value;

use super::types::{MarketChart, SimplePrice};
use super::{transport_error, PriceIndex, PriceStrategy};
use crate::errors::UpstreamError;
use crate::models::{address_key, Chain, PriceProvenance, PriceSample};

const SOURCE: &str = "coingecko";

/// Primary price index: batch current prices and time-series ranges.
#[derive(Debug, Clone)]
pub struct CoinGeckoClient {
    http: Client,
    base_url: String,
    api_key: Option<String>,
    timeout: Duration,
}

impl CoinGeckoClient {
    pub fn new(http: Client, base_url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: None,
            timeout,
        }
    }

    #[must_use]
    pub fn with_api_key(mut self, api_key: Option<String>) -> Self {
        self.api_key = api_key;
        self
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        url: &str,
    ) -> Result<Option<T>, UpstreamError> {
        tracing::debug!(url = %url, "Price index request");

        let mut req = self.http.get(url).timeout(self.timeout);
        if let Some(key) = &self.api_key {
            req = req.header("x-cg-demo-api-key", key);
        }

        let resp = req.send().await.map_err(|e| transport_error(SOURCE, e))?;
        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let resp = resp
            .error_for_status()
            .map_err(|e| transport_error(SOURCE, e))?;

        let body = resp.json::<T>().await.map_err(|e| {
            UpstreamError::Unexpected(format!("{SOURCE}: malformed body: {e}"))
        })?;
        Ok(Some(body))
    }
}

#[async_trait]
impl PriceIndex for CoinGeckoClient {
    async fn current_prices(
        &self,
        tokens: &[String],
        chain: Chain,
    ) -> Result<HashMap<String, Decimal>, UpstreamError> {
        if tokens.is_empty() {
            return Ok(HashMap::new());
        }

        let url = format!(
            "{}/simple/token_price/{}?contract_addresses={}&vs_currencies=usd",
            self.base_url,
            chain.price_platform(),
            tokens.join(","),
        );

        let body: HashMap<String, SimplePrice> = self.get_json(&url).await?.unwrap_or_default();

        Ok(body
            .into_iter()
            .filter_map(|(address, price)| price.usd.map(|usd| (address_key(&address), usd)))
            .collect())
    }

    async fn price_range(
        &self,
        token: &str,
        chain: Chain,
        from_secs: i64,
        to_secs: i64,
    ) -> Result<Vec<PriceSample>, UpstreamError> {
        let url = format!(
            "{}/coins/{}/contract/{}/market_chart/range?vs_currency=usd&from={}&to={}",
            self.base_url,
            chain.price_platform(),
            address_key(token),
            from_secs,
            to_secs,
        );

        let chart: Option<MarketChart> = self.get_json(&url).await?;
        let mut samples: Vec<PriceSample> = chart
            .map(|c| c.prices.iter().filter_map(|pair| parse_sample(pair)).collect())
            .unwrap_or_default();
        samples.sort_by_key(|s| s.timestamp_ms);
        Ok(samples)
    }
}

#[async_trait]
impl PriceStrategy for CoinGeckoClient {
    fn provenance(&self) -> PriceProvenance {
        PriceProvenance::PrimaryIndex
    }

    async fn current_price(
        &self,
        token: &str,
        chain: Chain,
    ) -> Result<Option<Decimal>, UpstreamError> {
        let key = address_key(token);
        let prices = self.current_prices(std::slice::from_ref(&key), chain).await?;
        Ok(prices.get(&key).copied())
    }
}

/// Parse one `[timestamp_ms, price]` pair, skipping anything malformed.
fn parse_sample(pair: &[Value]) -> Option<PriceSample> {
    let [ts, price] = pair else {
        return None;
    };
    let timestamp_ms = ts.as_i64().or_else(|| ts.as_f64().map(|f| f as i64))?;
    let price_usd = match price {
        Value::Number(n) => n.to_string().parse::<Decimal>().ok().or_else(|| {
            n.as_f64().and_then(|f| Decimal::try_from(f).ok())
        })?,
        Value::String(s) => s.parse::<Decimal>().ok()?,
        _ => return None,
    };
    Some(PriceSample {
        timestamp_ms,
        price_usd,
    })
}

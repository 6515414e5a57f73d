use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use rust_decimal::Decimal;

use super::types::{DexPair, DexTokenPairs};
use super::{transport_error, PriceStrategy};
use crate::errors::UpstreamError;
use crate::models::{address_key, Chain, PriceProvenance};

const SOURCE: &str = "dexscreener";

/// DEX-pair based price lookup, used when the price index has no entry.
#[derive(Debug, Clone)]
pub struct DexScreenerClient {
    http: Client,
    base_url: String,
    timeout: Duration,
}

impl DexScreenerClient {
    pub fn new(http: Client, base_url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            timeout,
        }
    }

    /// Fetch every pair the aggregator lists for a token.
    pub async fn token_pairs(&self, token: &str) -> Result<Vec<DexPair>, UpstreamError> {
        let url = format!("{}/latest/dex/tokens/{}", self.base_url, address_key(token));
        tracing::debug!(url = %url, "DEX pair request");

        let resp = self
            .http
            .get(&url)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| transport_error(SOURCE, e))?
            .error_for_status()
            .map_err(|e| transport_error(SOURCE, e))?;

        let body: DexTokenPairs = resp.json().await.map_err(|e| {
            UpstreamError::Unexpected(format!("{SOURCE}: malformed body: {e}"))
        })?;
        Ok(body.pairs.unwrap_or_default())
    }
}

/// Price of `token` on `chain` from its deepest pair where it is the base token.
pub fn best_pair_price(pairs: &[DexPair], token: &str, chain: Chain) -> Option<Decimal> {
    pairs
        .iter()
        .filter(|p| p.chain_id.eq_ignore_ascii_case(chain.dex_slug()))
        .filter(|p| p.base_token.address.eq_ignore_ascii_case(token))
        .filter_map(|p| {
            let price = p.price_usd.as_deref()?.parse::<Decimal>().ok()?;
            let liquidity = p
                .liquidity
                .as_ref()
                .and_then(|l| l.usd)
                .unwrap_or(Decimal::ZERO);
            Some((liquidity, price))
        })
        .filter(|(_, price)| *price > Decimal::ZERO)
        .max_by(|a, b| a.0.cmp(&b.0))
        .map(|(_, price)| price)
}

#[async_trait]
impl PriceStrategy for DexScreenerClient {
    fn provenance(&self) -> PriceProvenance {
        PriceProvenance::DexFallback
    }

    async fn current_price(
        &self,
        token: &str,
        chain: Chain,
    ) -> Result<Option<Decimal>, UpstreamError> {
        let pairs = self.token_pairs(token).await?;
        Ok(best_pair_price(&pairs, token, chain))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const TOKEN: &str = "0x6982508145454ce325ddbe47a25d4ec3d2311933";

    #[tokio::test]
    async fn test_picks_deepest_pair_on_chain() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path(format!("/latest/dex/tokens/{TOKEN}")))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "pairs": [
                    {
                        "chainId": "ethereum",
                        "baseToken": { "address": TOKEN, "symbol": "PEPE" },
                        "priceUsd": "0.0000011",
                        "liquidity": { "usd": 5000 }
                    },
                    {
                        "chainId": "ethereum",
                        "baseToken": { "address": TOKEN, "symbol": "PEPE" },
                        "priceUsd": "0.0000012",
                        "liquidity": { "usd": 900000 }
                    },
                    {
                        "chainId": "bsc",
                        "baseToken": { "address": TOKEN, "symbol": "PEPE" },
                        "priceUsd": "9.99",
                        "liquidity": { "usd": 99999999 }
                    }
                ]
            })))
            .mount(&server)
            .await;

        let client = DexScreenerClient::new(Client::new(), server.uri(), Duration::from_secs(5));
        let price = client.current_price(TOKEN, Chain::Ethereum).await.unwrap();

        assert_eq!(price, Some(Decimal::new(12, 7)));
    }

    #[tokio::test]
    async fn test_null_pairs_is_absence() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "pairs": null })))
            .mount(&server)
            .await;

        let client = DexScreenerClient::new(Client::new(), server.uri(), Duration::from_secs(5));
        assert_eq!(client.current_price(TOKEN, Chain::Base).await.unwrap(), None);
    }
}

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};

use super::types::{AssetTransfer, AssetTransfersPage, RpcResponse, TokenMetadata};
use super::{transport_error, TokenMetadataSource, TransferSource};
use crate::errors::UpstreamError;
use crate::models::transfer::{hex_to_decimal_string, scale_raw_amount};
use crate::models::{Chain, RawTransfer, TokenInfo};

const SOURCE: &str = "alchemy";
/// Pages fetched per direction before giving up on older history.
const MAX_PAGES: usize = 5;
const PAGE_SIZE_HEX: &str = "0x3e8";

/// Primary transfer indexer (JSON-RPC `alchemy_getAssetTransfers`) and
/// token-metadata lookup.
#[derive(Debug, Clone)]
pub struct AlchemyClient {
    http: Client,
    url_template: String,
    api_key: String,
    timeout: Duration,
    metadata_timeout: Duration,
}

impl AlchemyClient {
    /// `url_template` must contain `{network}` and `{key}` placeholders.
    pub fn new(
        http: Client,
        url_template: impl Into<String>,
        api_key: impl Into<String>,
        timeout: Duration,
        metadata_timeout: Duration,
    ) -> Self {
        Self {
            http,
            url_template: url_template.into(),
            api_key: api_key.into(),
            timeout,
            metadata_timeout,
        }
    }

    fn endpoint(&self, chain: Chain) -> Result<String, UpstreamError> {
        let network = chain
            .indexer_network()
            .ok_or_else(|| UpstreamError::UnsupportedChain {
                source_name: SOURCE,
                chain: chain.to_string(),
            })?;
        Ok(self
            .url_template
            .replace("{network}", network)
            .replace("{key}", &self.api_key))
    }

    async fn rpc<T: DeserializeOwned>(
        &self,
        chain: Chain,
        method: &str,
        params: Value,
        timeout: Duration,
    ) -> Result<Option<T>, UpstreamError> {
        let url = self.endpoint(chain)?;
        let body = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": method,
            "params": params,
        });

        let resp = self
            .http
            .post(&url)
            .timeout(timeout)
            .json(&body)
            .send()
            .await
            .map_err(|e| transport_error(SOURCE, e))?
            .error_for_status()
            .map_err(|e| transport_error(SOURCE, e))?;

        let parsed: RpcResponse<T> = resp.json().await.map_err(|e| {
            UpstreamError::Unexpected(format!("{SOURCE}: malformed body: {e}"))
        })?;

        if let Some(err) = parsed.error {
            return Err(UpstreamError::Unexpected(format!(
                "{SOURCE} {method} failed ({}): {}",
                err.code, err.message
            )));
        }
        Ok(parsed.result)
    }

    /// Walk one direction (`fromAddress` or `toAddress`) newest-first until
    /// pages run out or records predate `since`.
    async fn fetch_direction(
        &self,
        wallet: &str,
        chain: Chain,
        direction_field: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<RawTransfer>, UpstreamError> {
        let mut out = Vec::new();
        let mut page_key: Option<String> = None;

        for _ in 0..MAX_PAGES {
            let mut params = json!({
                "fromBlock": "0x0",
                "toBlock": "latest",
                "category": ["erc20"],
                "withMetadata": true,
                "excludeZeroValue": true,
                "maxCount": PAGE_SIZE_HEX,
                "order": "desc",
            });
            params[direction_field] = json!(wallet);
            if let Some(key) = &page_key {
                params["pageKey"] = json!(key);
            }

            let page: AssetTransfersPage = self
                .rpc(chain, "alchemy_getAssetTransfers", json!([params]), self.timeout)
                .await?
                .ok_or_else(|| {
                    UpstreamError::Unexpected(format!("{SOURCE}: empty result"))
                })?;

            let converted: Vec<RawTransfer> =
                page.transfers.iter().filter_map(to_raw_transfer).collect();
            let reached_window_start = converted
                .iter()
                .filter_map(|t| t.timestamp)
                .min()
                .is_some_and(|oldest| oldest < since);
            out.extend(converted);

            match page.page_key {
                Some(next) if !reached_window_start => page_key = Some(next),
                _ => break,
            }
        }

        Ok(out)
    }
}

fn to_raw_transfer(t: &AssetTransfer) -> Option<RawTransfer> {
    let raw = t.raw_contract.as_ref()?;
    let token_address = raw.address.as_deref()?;

    let amount = raw
        .value
        .as_deref()
        .and_then(hex_to_decimal_string)
        .and_then(|digits| {
            let decimals = raw
                .decimal
                .as_deref()
                .and_then(hex_to_decimal_string)
                .and_then(|d| d.parse::<u32>().ok())?;
            scale_raw_amount(&digits, decimals)
        })
        .or_else(|| t.value.and_then(|v| Decimal::try_from(v).ok()));

    let Some(amount) = amount else {
        tracing::debug!(hash = %t.hash, "Skipping indexer transfer with unusable amount");
        return None;
    };

    let timestamp = t
        .metadata
        .as_ref()
        .and_then(|m| m.block_timestamp.as_deref())
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.with_timezone(&Utc));

    let symbol = t.asset.clone().unwrap_or_else(|| "UNKNOWN".into());

    Some(RawTransfer {
        hash: t.hash.clone(),
        from: t.from.clone().unwrap_or_default(),
        to: t.to.clone().unwrap_or_default(),
        token: TokenInfo::new(token_address, symbol.clone(), symbol),
        amount,
        timestamp,
        value_usd: None,
    })
}

#[async_trait]
impl TransferSource for AlchemyClient {
    fn name(&self) -> &'static str {
        SOURCE
    }

    fn supports(&self, chain: Chain) -> bool {
        chain.indexer_network().is_some()
    }

    async fn fetch_transfers(
        &self,
        wallet: &str,
        chain: Chain,
        since: DateTime<Utc>,
    ) -> Result<Vec<RawTransfer>, UpstreamError> {
        let (incoming, outgoing) = tokio::try_join!(
            self.fetch_direction(wallet, chain, "toAddress", since),
            self.fetch_direction(wallet, chain, "fromAddress", since),
        )?;

        let mut all = incoming;
        all.extend(outgoing);
        Ok(all)
    }
}

#[async_trait]
impl TokenMetadataSource for AlchemyClient {
    async fn token_metadata(
        &self,
        token: &str,
        chain: Chain,
    ) -> Result<Option<TokenMetadata>, UpstreamError> {
        self.rpc(
            chain,
            "alchemy_getTokenMetadata",
            json!([token]),
            self.metadata_timeout,
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const WALLET: &str = "0x00000000000000000000000000000000000000aa";
    const TOKEN: &str = "0x00000000000000000000000000000000000000cc";

    fn client(server: &MockServer) -> AlchemyClient {
        AlchemyClient::new(
            Client::new(),
            format!("{}/{{network}}/v2/{{key}}", server.uri()),
            "test-key",
            Duration::from_secs(5),
            Duration::from_secs(2),
        )
    }

    fn transfer_json(hash: &str, from: &str, to: &str, raw_value: &str) -> Value {
        json!({
            "hash": hash,
            "from": from,
            "to": to,
            "value": 1.5,
            "asset": "TKN",
            "rawContract": { "value": raw_value, "address": TOKEN, "decimal": "0x12" },
            "metadata": { "blockTimestamp": "2026-09-01T12:00:00.000Z" }
        })
    }

    #[tokio::test]
    async fn test_fetch_transfers_merges_both_directions() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/eth-mainnet/v2/test-key"))
            .and(body_string_contains("toAddress"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "jsonrpc": "2.0", "id": 1,
                "result": { "transfers": [transfer_json("0xin", "0xdex", WALLET, "0x14d1120d7b160000")] }
            })))
            .mount(&server)
            .await;

        Mock::given(method("POST"))
            .and(path("/eth-mainnet/v2/test-key"))
            .and(body_string_contains("fromAddress"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "jsonrpc": "2.0", "id": 1,
                "result": { "transfers": [transfer_json("0xout", WALLET, "0xdex", "0xde0b6b3a7640000")] }
            })))
            .mount(&server)
            .await;

        let since = DateTime::parse_from_rfc3339("2026-01-01T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let transfers = client(&server)
            .fetch_transfers(WALLET, Chain::Ethereum, since)
            .await
            .unwrap();

        assert_eq!(transfers.len(), 2);
        let incoming = transfers.iter().find(|t| t.hash == "0xin").unwrap();
        assert_eq!(incoming.amount, Decimal::new(15, 1));
        assert_eq!(incoming.token.address, TOKEN);
        assert!(incoming.timestamp.is_some());
        let outgoing = transfers.iter().find(|t| t.hash == "0xout").unwrap();
        assert_eq!(outgoing.amount, Decimal::ONE);
    }

    #[tokio::test]
    async fn test_unsupported_chain_is_error() {
        let server = MockServer::start().await;
        let result = client(&server)
            .fetch_transfers(WALLET, Chain::Bsc, Utc::now())
            .await;
        assert!(matches!(result, Err(UpstreamError::UnsupportedChain { .. })));
    }

    #[tokio::test]
    async fn test_rpc_error_is_surfaced() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "jsonrpc": "2.0", "id": 1,
                "error": { "code": -32600, "message": "invalid key" }
            })))
            .mount(&server)
            .await;

        let result = client(&server)
            .fetch_transfers(WALLET, Chain::Polygon, Utc::now())
            .await;
        assert!(matches!(result, Err(UpstreamError::Unexpected(_))));
    }

    #[tokio::test]
    async fn test_token_metadata() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(body_string_contains("alchemy_getTokenMetadata"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "jsonrpc": "2.0", "id": 1,
                "result": { "symbol": "UNI", "name": "Uniswap", "decimals": 18, "logo": null }
            })))
            .mount(&server)
            .await;

        let meta = client(&server)
            .token_metadata(TOKEN, Chain::Ethereum)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(meta.symbol.as_deref(), Some("UNI"));
        assert_eq!(meta.name.as_deref(), Some("Uniswap"));
        assert_eq!(meta.decimals, Some(18));
    }

    #[test]
    fn test_to_raw_transfer_falls_back_to_float_value() {
        let t: AssetTransfer = serde_json::from_value(json!({
            "hash": "0x1",
            "from": "0xa",
            "to": "0xb",
            "value": 2.5,
            "asset": "X",
            "rawContract": { "value": null, "address": TOKEN, "decimal": null },
            "metadata": { "blockTimestamp": "not-a-date" }
        }))
        .unwrap();

        let raw = to_raw_transfer(&t).unwrap();
        assert_eq!(raw.amount, Decimal::new(25, 1));
        assert!(raw.timestamp.is_none());
    }
}

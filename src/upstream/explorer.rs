use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;

use super::types::{ExplorerResponse, ExplorerTransfer};
use super::{transport_error, TransferSource};
use crate::errors::UpstreamError;
use crate::models::transfer::scale_raw_amount;
use crate::models::{Chain, RawTransfer, TokenInfo};

const SOURCE: &str = "etherscan";
const PAGE_SIZE: u32 = 1000;
const NO_RESULTS_MESSAGE: &str = "No transactions found";

/// Explorer-style fallback (`module=account&action=tokentx`) on the
/// multichain endpoint, selected by `chainid`.
#[derive(Debug, Clone)]
pub struct EtherscanClient {
    http: Client,
    base_url: String,
    api_key: Option<String>,
    timeout: Duration,
}

impl EtherscanClient {
    pub fn new(http: Client, base_url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            http,
            base_url: base_url.into(),
            api_key: None,
            timeout,
        }
    }

    #[must_use]
    pub fn with_api_key(mut self, api_key: Option<String>) -> Self {
        self.api_key = api_key;
        self
    }
}

/// Unpack the `{status, message, result}` envelope. A `"0"` status with the
/// no-results message is an empty history, anything else is a failure.
pub fn parse_explorer_response(
    resp: ExplorerResponse,
) -> Result<Vec<ExplorerTransfer>, UpstreamError> {
    if resp.status == "1" {
        return serde_json::from_value(resp.result).map_err(|e| {
            UpstreamError::Unexpected(format!("{SOURCE}: malformed result: {e}"))
        });
    }

    if resp.message.starts_with(NO_RESULTS_MESSAGE) {
        return Ok(Vec::new());
    }

    let detail = resp
        .result
        .as_str()
        .map(str::to_string)
        .unwrap_or_else(|| resp.message.clone());
    Err(UpstreamError::Unexpected(format!("{SOURCE}: {detail}")))
}

fn to_raw_transfer(t: &ExplorerTransfer) -> Option<RawTransfer> {
    let decimals = t
        .token_decimal
        .as_deref()
        .and_then(|d| d.trim().parse::<u32>().ok())
        .unwrap_or(18);

    let Some(amount) = scale_raw_amount(&t.value, decimals) else {
        tracing::debug!(hash = %t.hash, value = %t.value, "Skipping explorer transfer with unusable amount");
        return None;
    };

    let timestamp = t
        .time_stamp
        .as_deref()
        .and_then(|s| s.trim().parse::<i64>().ok())
        .and_then(|secs| DateTime::from_timestamp(secs, 0));

    let symbol = t.token_symbol.clone().unwrap_or_else(|| "UNKNOWN".into());
    let name = t.token_name.clone().unwrap_or_else(|| symbol.clone());

    Some(RawTransfer {
        hash: t.hash.clone(),
        from: t.from.clone(),
        to: t.to.clone(),
        token: TokenInfo::new(&t.contract_address, symbol, name),
        amount,
        timestamp,
        value_usd: None,
    })
}

#[async_trait]
impl TransferSource for EtherscanClient {
    fn name(&self) -> &'static str {
        SOURCE
    }

    fn supports(&self, _chain: Chain) -> bool {
        true
    }

    async fn fetch_transfers(
        &self,
        wallet: &str,
        chain: Chain,
        _since: DateTime<Utc>,
    ) -> Result<Vec<RawTransfer>, UpstreamError> {
        let mut url = format!(
            "{}?chainid={}&module=account&action=tokentx&address={}&page=1&offset={}&sort=desc",
            self.base_url,
            chain.id(),
            wallet,
            PAGE_SIZE,
        );
        if let Some(key) = &self.api_key {
            url.push_str("&apikey=");
            url.push_str(key);
        }

        tracing::debug!(chain = %chain, wallet = %wallet, "Explorer transfer request");

        let resp = self
            .http
            .get(&url)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| transport_error(SOURCE, e))?
            .error_for_status()
            .map_err(|e| transport_error(SOURCE, e))?;

        let envelope: ExplorerResponse = resp.json().await.map_err(|e| {
            UpstreamError::Unexpected(format!("{SOURCE}: malformed body: {e}"))
        })?;

        let records = parse_explorer_response(envelope)?;
        Ok(records.iter().filter_map(to_raw_transfer).collect())
    }
}

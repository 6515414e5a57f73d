use axum::extract::{Path, Query, State};
use axum::Json;
use serde::Deserialize;

use super::ApiResponse;
use crate::errors::AppError;
use crate::models::{is_evm_address, Chain, RegretReport};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct RegretQuery {
    pub chain_id: Option<u64>,
    pub days: Option<u32>,
}

/// `GET /api/wallets/:address/regrets?chain_id=&days=`
///
/// Upstream outages and unsupported chains still answer 200; the report's
/// `status` says what happened. Only a malformed address is rejected.
pub async fn wallet_regrets(
    State(state): State<AppState>,
    Path(address): Path<String>,
    Query(query): Query<RegretQuery>,
) -> Result<Json<ApiResponse<RegretReport>>, AppError> {
    if !is_evm_address(&address) {
        return Err(AppError::BadRequest(format!(
            "invalid wallet address: {address}"
        )));
    }

    let chain_id = query.chain_id.unwrap_or(Chain::Ethereum.id());
    let days = state.config.clamp_days_back(query.days);

    // A panic inside the analysis surfaces as a 500 instead of a dropped connection.
    let engine = state.engine.clone();
    let report = tokio::spawn(async move {
        engine
            .analyze_wallet_regrets(&address, chain_id, days)
            .await
    })
    .await
    .map_err(|e| anyhow::anyhow!("analysis task failed: {e}"))?;

    Ok(Json(ApiResponse::ok(report)))
}

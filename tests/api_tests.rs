mod common;

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use chrono::{Duration, Utc};
use tower::ServiceExt;

use common::*;
use paperhands::api::router::create_router;
use paperhands::config::AppConfig;
use paperhands::AppState;

const TOKEN: &str = "test-token";

fn build_test_app(api_token: Option<&str>) -> axum::Router {
    let recent = Utc::now() - Duration::days(10);
    let history = vec![
        raw("0xb1", COUNTERPARTY, WALLET, TOKEN_A, 100, Some(100), Some(recent)),
        raw("0xs1", WALLET, COUNTERPARTY, TOKEN_A, 100, Some(120), Some(recent + Duration::days(5))),
    ];
    let engine = engine(
        vec![Arc::new(StubSource::ok("primary", history))],
        Arc::new(StubIndex::with_prices(&[(TOKEN_A, 10)])),
        Arc::new(StubDex::default()),
    );

    let config = AppConfig {
        api_token: api_token.map(String::from),
        ..AppConfig::default()
    };

    let state = AppState {
        config,
        engine: Arc::new(engine),
        metrics_handle: paperhands::metrics::detached_handle(),
    };

    create_router(state)
}

async fn body_json(response: axum::response::Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn authed(uri: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .header("authorization", format!("Bearer {TOKEN}"))
        .body(Body::empty())
        .unwrap()
}

#[tokio::test]
async fn test_health_is_public() {
    let app = build_test_app(Some(TOKEN));

    let response = app
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["status"], "healthy");
}

#[tokio::test]
async fn test_metrics_endpoint() {
    let app = build_test_app(Some(TOKEN));

    let response = app
        .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_regrets_require_token() {
    let app = build_test_app(Some(TOKEN));
    let uri = format!("/api/wallets/{WALLET}/regrets");

    let missing = app
        .clone()
        .oneshot(Request::builder().uri(&uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(missing.status(), StatusCode::UNAUTHORIZED);

    let wrong = app
        .oneshot(
            Request::builder()
                .uri(&uri)
                .header("authorization", "Bearer nope")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(wrong.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_invalid_address_is_bad_request() {
    let app = build_test_app(Some(TOKEN));

    let response = app
        .oneshot(authed("/api/wallets/not-a-wallet/regrets"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = body_json(response).await;
    assert_eq!(json["success"], false);
}

#[tokio::test]
async fn test_regret_report_returned() {
    let app = build_test_app(Some(TOKEN));
    let uri = format!("/api/wallets/{}/regrets?chain_id=1&days=30", WALLET.to_uppercase().replace("0X", "0x"));

    let response = app.oneshot(authed(&uri)).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["success"], true);
    let data = &json["data"];
    assert_eq!(data["walletAddress"], WALLET);
    assert_eq!(data["chainId"], 1);
    assert_eq!(data["status"], "complete");
    assert_eq!(data["period"]["days"], 30);
    assert_eq!(data["allRegrets"].as_array().unwrap().len(), 1);
    assert_eq!(data["biggestRegret"]["regretScore"], 70);
}

#[tokio::test]
async fn test_days_clamped_and_auth_disabled_without_token() {
    let app = build_test_app(None);
    let uri = format!("/api/wallets/{WALLET}/regrets?days=5000");

    let response = app
        .oneshot(Request::builder().uri(&uri).body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["data"]["period"]["days"], 365);
}

#[tokio::test]
async fn test_unsupported_chain_still_answers() {
    let app = build_test_app(Some(TOKEN));
    let uri = format!("/api/wallets/{WALLET}/regrets?chain_id=424242");

    let response = app.oneshot(authed(&uri)).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["data"]["status"], "unsupported_chain");
}

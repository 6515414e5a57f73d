use std::sync::Arc;

use paperhands::api::router::create_router;
use paperhands::config::AppConfig;
use paperhands::intelligence::RegretEngine;
use paperhands::pricing::run_cache_sweeper;
use paperhands::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let config = AppConfig::from_env()?;
    let addr = format!("{}:{}", config.host, config.port);

    let metrics_handle = paperhands::metrics::init_metrics();

    // One client for every upstream; per-request timeouts are set by each source.
    let http = reqwest::Client::builder()
        .user_agent(concat!("paperhands/", env!("CARGO_PKG_VERSION")))
        .build()?;
    let engine = Arc::new(RegretEngine::from_config(&config, http));
    tracing::info!(
        price_ttl_secs = config.price_cache_ttl_secs,
        batch_size = config.price_batch_size,
        indexer = config.alchemy_api_key.is_some(),
        auth = config.api_token.is_some(),
        "Regret engine ready"
    );

    tokio::spawn(run_cache_sweeper(engine.resolver(), config.price_cache_ttl()));

    let state = AppState {
        config,
        engine,
        metrics_handle,
    };
    let router = create_router(state);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on {addr}");
    axum::serve(listener, router).await?;

    Ok(())
}

fn init_tracing() {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let json = std::env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(fmt::layer().json()).init();
    } else {
        registry.with(fmt::layer()).init();
    }
}

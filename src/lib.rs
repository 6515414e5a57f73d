pub mod api;
pub mod config;
pub mod errors;
pub mod history;
pub mod intelligence;
pub mod metrics;
pub mod models;
pub mod pricing;
pub mod upstream;

use std::sync::Arc;

use crate::config::AppConfig;
use crate::intelligence::RegretEngine;

#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub engine: Arc<RegretEngine>,
    pub metrics_handle: metrics_exporter_prometheus::PrometheusHandle,
}

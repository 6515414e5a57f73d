use metrics::{counter, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

/// Install the Prometheus exporter and register all application metrics.
/// Returns a `PrometheusHandle` whose `render()` method produces the
/// text/plain Prometheus scrape payload.
pub fn init_metrics() -> PrometheusHandle {
    let builder = PrometheusBuilder::new();
    let handle = builder
        .install_recorder()
        .expect("failed to install Prometheus recorder");

    // Pre-register counters so they appear even before the first increment.
    counter!("price_cache_hits_total").absolute(0);
    counter!("price_cache_misses_total").absolute(0);
    counter!("price_fallbacks_total").absolute(0);
    counter!("transfer_source_failures_total").absolute(0);
    counter!("regret_reports_total").absolute(0);

    histogram!("analysis_latency_seconds").record(0.0);

    handle
}

/// Build a recorder handle without installing it globally. Used where a
/// process-wide recorder may already exist, such as tests.
pub fn detached_handle() -> PrometheusHandle {
    PrometheusBuilder::new().build_recorder().handle()
}

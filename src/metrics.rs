use axum::{routing::get, Router};
use metrics::{describe_counter, describe_histogram, gauge};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;

static HANDLE: OnceCell<PrometheusHandle> = OnceCell::new();

#[derive(Clone)]
pub struct Metrics {
    pub handle: PrometheusHandle,
}

impl Metrics {
    /// Install the Prometheus recorder (once per process) and publish static config gauges.
    pub fn init(generate_cache_ttl_ms: u64) -> anyhow::Result<Self> {
        let handle = HANDLE
            .get_or_try_init(|| {
                let handle = PrometheusBuilder::new().install_recorder()?;
                describe();
                Ok::<_, anyhow::Error>(handle)
            })?
            .clone();

        // Absolute TTL, no sliding refresh.
        gauge!("generate_cache_ttl_ms").set(generate_cache_ttl_ms as f64);

        Ok(Self { handle })
    }

    /// Returns a router exposing `/metrics` with the Prometheus exposition format.
    pub fn router(&self) -> Router {
        let handle = self.handle.clone();
        Router::new().route(
            "/metrics",
            get(move || {
                let h = handle.clone();
                async move { h.render() }
            }),
        )
    }
}

fn describe() {
    describe_counter!("reviews_generated_total", "Reviews returned by /api/generate");
    describe_counter!(
        "review_regenerations_total",
        "Extra generator calls caused by near-duplicates"
    );
    describe_counter!(
        "review_duplicates_total",
        "Reviews returned while still over the similarity threshold"
    );
    describe_counter!("generate_cache_hits_total", "Generate responses served from cache");
    describe_counter!("quota_rejections_total", "Requests rejected by the daily quota");
    describe_counter!("llm_errors_total", "Failed text generation calls");
    describe_histogram!("llm_latency_ms", "Generator latency per generate request");
    describe_counter!("webhook_failures_total", "Failed webhook deliveries");
}

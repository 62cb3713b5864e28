// src/metrics.rs
use axum::{routing::get, Router};
use metrics::{describe_counter, describe_gauge};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;

/// One-time metrics registration (so series show up on /metrics).
pub fn ensure_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("trend_fetched_total", "Raw items fetched across all sources.");
        describe_counter!("trend_ingested_total", "Raw items accepted by the deduplicator.");
        describe_counter!("trend_merges_total", "Ingests that merged into an existing trend.");
        describe_counter!("trend_invalid_total", "Malformed raw items rejected.");
        describe_counter!("source_errors_total", "Per-source fetch/parse errors.");
        describe_counter!("source_timeouts_total", "Per-source fetch timeouts.");
        describe_counter!("posts_published_total", "Entries that reached POSTED.");
        describe_counter!("posts_failed_total", "Per-entry generation/publish failures.");
        describe_counter!("posts_skipped_total", "Entries parked in SKIPPED at the retry ceiling.");
        describe_gauge!("queue_depth", "Queue entries currently not terminal.");
        describe_gauge!("scheduler_last_tick_ts", "Unix ts of the last completed tick.");
    });
}

pub struct Metrics {
    pub handle: PrometheusHandle,
}

impl Metrics {
    /// Install the Prometheus recorder and register series descriptions.
    pub fn init() -> Self {
        let handle = PrometheusBuilder::new()
            .install_recorder()
            .expect("prometheus: install recorder");
        ensure_described();
        Self { handle }
    }

    /// Router exposing `/metrics` in Prometheus exposition format.
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

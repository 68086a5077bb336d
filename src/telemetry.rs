// src/telemetry.rs
use axum::{routing::get, Router};
use metrics::{describe_counter, describe_gauge, describe_histogram, Unit};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;

/// Register descriptions for every pipeline metric. Safe to call repeatedly.
pub fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("curator_runs_total", "Pipeline runs started");
        describe_counter!(
            "curator_discovered_total",
            "Documents advertised by sources before any filtering"
        );
        describe_counter!(
            "curator_rejected_total",
            "Documents rejected by validation, labeled by reason"
        );
        describe_counter!(
            "curator_deduplicated_total",
            "Documents dropped as duplicates (url or fingerprint)"
        );
        describe_counter!("curator_scored_total", "Items scored and stored");
        describe_counter!("curator_submitted_total", "Items accepted by the generation platform");
        describe_counter!(
            "curator_dispatch_failures_total",
            "Dispatch attempts that failed after the item was claimed"
        );
        describe_counter!("curator_fetch_errors_total", "Source or document fetch failures");
        describe_counter!("curator_fetch_retries_total", "HTTP fetch retries");
        describe_histogram!(
            "curator_run_duration_ms",
            Unit::Milliseconds,
            "Wall time of one pipeline run"
        );
        describe_histogram!(
            "curator_feed_parse_ms",
            Unit::Milliseconds,
            "Time to parse one feed document"
        );
        describe_gauge!("curator_quota_remaining", "Submissions left for the current UTC day");
        describe_gauge!("curator_last_run_ts", Unit::Seconds, "Unix time of the last finished run");
    });
}

pub struct Telemetry {
    pub handle: PrometheusHandle,
}

impl Telemetry {
    /// Install the global Prometheus recorder.
    pub fn init() -> anyhow::Result<Self> {
        let handle = PrometheusBuilder::new()
            .install_recorder()
            .map_err(|e| anyhow::anyhow!("prometheus: install recorder: {e}"))?;
        ensure_metrics_described();
        Ok(Self { handle })
    }

    /// Router exposing `/metrics` in the Prometheus exposition format.
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

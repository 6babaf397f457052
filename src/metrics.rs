use axum::{routing::get, Router};
use metrics::{describe_counter, describe_gauge, describe_histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;

pub struct Metrics {
    pub handle: PrometheusHandle,
}

impl Metrics {
    /// Install the Prometheus recorder and register series descriptions.
    pub fn init() -> anyhow::Result<Self> {
        let handle = PrometheusBuilder::new()
            .install_recorder()
            .map_err(|e| anyhow::anyhow!("prometheus: install recorder: {e}"))?;
        ensure_metrics_described();
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

/// One-time metrics registration (so series show up on /metrics).
pub fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("poller_polls_total", "Completed process cycles.");
        describe_counter!(
            "poller_poll_failures_total",
            "Process cycles that returned an error."
        );
        describe_counter!(
            "poller_adjustments_total",
            "Interval changes, labelled by direction."
        );
        describe_gauge!(
            "poller_interval_minutes",
            "Current polling interval in minutes."
        );
        describe_histogram!("poller_cycle_ms", "Process cycle duration in milliseconds.");
        describe_counter!("monitor_sessions_total", "Completed monitoring sessions.");
        describe_counter!(
            "monitor_fetch_errors_total",
            "Item fetch failures during monitoring snapshots."
        );
        describe_counter!("store_errors_total", "Persistence failures (non-fatal).");
    });
}

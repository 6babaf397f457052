// tests/metrics.rs
#![cfg(feature = "strict-metrics")]

mod common;

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::Lazy;
use std::sync::Arc;

use adaptive_poller::frequency::ControllerSettings;
use adaptive_poller::metrics::ensure_metrics_described;
use adaptive_poller::model::Source;
use adaptive_poller::monitor::{SessionPlan, SessionRunner};
use adaptive_poller::store::MemoryStore;
use adaptive_poller::ControllerHandle;
use tokio_util::sync::CancellationToken;

// One global recorder per test binary, shared by every test below.
static HANDLE: Lazy<PrometheusHandle> = Lazy::new(|| {
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .expect("recorder");
    ensure_metrics_described();
    handle
});

#[tokio::test(start_paused = true)]
async fn monitor_series_exposed_after_session() {
    let handle = &*HANDLE;

    let fetcher = Arc::new(common::FlakyFetcher::new(
        common::ChurnFetcher::default(),
        vec![1],
    ));
    let runner = SessionRunner::new(fetcher, Arc::new(MemoryStore::new()), vec![Source::Gcx]);
    runner
        .run("quick", SessionPlan::QUICK, &CancellationToken::new())
        .await
        .expect("completed");

    // Scrape metrics text and check series presence by substring
    let out = handle.render();
    assert!(out.contains("monitor_sessions_total"));
    assert!(out.contains("monitor_fetch_errors_total"));
}

#[tokio::test]
async fn interval_gauge_set_on_restore() {
    let handle = &*HANDLE;

    let settings = ControllerSettings {
        initial_interval_minutes: 45,
        ..ControllerSettings::default()
    };
    let _ctl = ControllerHandle::restore(settings, Arc::new(MemoryStore::new()), false).await;

    let out = handle.render();
    assert!(
        out.lines().any(|l| l == "poller_interval_minutes 45"),
        "gauge missing:\n{out}"
    );
}

//! Adaptive Poller: Binary Entrypoint
//! Loads config, starts the scheduler, serves `/status` + `/metrics`, and
//! stops cleanly on Ctrl-C.

use std::path::PathBuf;
use std::sync::Arc;

use adaptive_poller::{
    api::{self, AppState},
    build_scheduler,
    catalog::{CatalogFetcher, FetchAndLogCycle, DEFAULT_CATALOG_PATH},
    metrics::Metrics,
    store::JsonFileStore,
    types::ItemFetcher,
    PollerConfig, StopOutcome,
};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Compact logs by default; `POLLER_LOG_FORMAT=json` for structured output.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("adaptive_poller=info,warn"));

    let json = std::env::var("POLLER_LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().compact())
            .init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env in local/dev; no-op when absent.
    let _ = dotenvy::dotenv();
    init_tracing();

    let cfg = PollerConfig::load_default();
    tracing::info!(
        initial = cfg.initial_interval_minutes,
        min = cfg.min_interval_minutes,
        max = cfg.max_interval_minutes,
        threshold = cfg.adjustment_threshold,
        state_dir = %cfg.state_dir.display(),
        "starting adaptive poller"
    );

    // Recorder first, so the startup interval gauge is not lost.
    let metrics = match Metrics::init() {
        Ok(m) => Some(m),
        Err(e) => {
            tracing::warn!("metrics disabled: {e:#}");
            None
        }
    };

    let catalog_path = std::env::var("POLLER_CATALOG_PATH")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(DEFAULT_CATALOG_PATH));
    let fetcher: Arc<dyn ItemFetcher> = Arc::new(CatalogFetcher::from_path(catalog_path));
    let cycle = Arc::new(FetchAndLogCycle::new(fetcher.clone(), cfg.sources.clone()));
    let store = Arc::new(JsonFileStore::new(cfg.state_dir.clone()));

    let scheduler = Arc::new(build_scheduler(&cfg, fetcher, cycle, store).await);

    let mut app = api::router(AppState {
        scheduler: scheduler.clone(),
    });
    if let Some(m) = &metrics {
        app = app.merge(m.router());
    }

    let listener = tokio::net::TcpListener::bind(&cfg.http_addr).await?;
    tracing::info!(addr = %cfg.http_addr, "status server listening");

    scheduler.start();
    let served = axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await;

    if scheduler.stop().await == StopOutcome::TimedOut {
        tracing::warn!("scheduler did not shut down cleanly");
    }
    served?;
    Ok(())
}

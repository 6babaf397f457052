// tests/common/mod.rs
// Fakes shared by the integration tests.
#![allow(dead_code)]

use anyhow::{anyhow, Result};
use chrono::Utc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use adaptive_poller::model::{
    AdjustmentHistory, AdjustmentRecord, Item, SessionId, SessionMeta, Snapshot, Source,
};
use adaptive_poller::store::Persistence;
use adaptive_poller::types::{ItemFetcher, ProcessCycle};
use adaptive_poller::PollerConfig;

pub fn item(source: Source, merchant: &str, price: f64) -> Item {
    Item {
        source,
        merchant: merchant.to_string(),
        face_value: 100.0,
        price,
        url: None,
        observed_at: Utc::now(),
    }
}

/// Every fetch returns brand-new items: maximal turnover.
#[derive(Default)]
pub struct ChurnFetcher {
    next: AtomicU64,
    pub fetches: AtomicUsize,
}

#[async_trait::async_trait]
impl ItemFetcher for ChurnFetcher {
    async fn fetch_all(&self, sources: &[Source]) -> Result<Vec<Item>> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        let mut out = Vec::new();
        for src in sources {
            for _ in 0..2 {
                let n = self.next.fetch_add(1, Ordering::SeqCst);
                out.push(item(*src, &format!("merchant-{n}"), 80.0));
            }
        }
        Ok(out)
    }

    fn name(&self) -> &'static str {
        "churn"
    }
}

/// Same items every time: no turnover.
pub struct StableFetcher {
    pub items: Vec<Item>,
}

#[async_trait::async_trait]
impl ItemFetcher for StableFetcher {
    async fn fetch_all(&self, sources: &[Source]) -> Result<Vec<Item>> {
        Ok(self
            .items
            .iter()
            .filter(|it| sources.contains(&it.source))
            .cloned()
            .collect())
    }

    fn name(&self) -> &'static str {
        "stable"
    }
}

/// Fails on the listed (1-based) calls, otherwise behaves like `inner`.
pub struct FlakyFetcher<F> {
    pub inner: F,
    pub fail_on: Vec<usize>,
    calls: AtomicUsize,
}

impl<F> FlakyFetcher<F> {
    pub fn new(inner: F, fail_on: Vec<usize>) -> Self {
        Self {
            inner,
            fail_on,
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait::async_trait]
impl<F: ItemFetcher> ItemFetcher for FlakyFetcher<F> {
    async fn fetch_all(&self, sources: &[Source]) -> Result<Vec<Item>> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if self.fail_on.contains(&n) {
            return Err(anyhow!("scrape timed out"));
        }
        self.inner.fetch_all(sources).await
    }

    fn name(&self) -> &'static str {
        "flaky"
    }
}

/// Panics on every fetch.
#[derive(Default)]
pub struct PanickingFetcher {
    pub fetches: AtomicUsize,
}

#[async_trait::async_trait]
impl ItemFetcher for PanickingFetcher {
    async fn fetch_all(&self, _sources: &[Source]) -> Result<Vec<Item>> {
        let n = self.fetches.fetch_add(1, Ordering::SeqCst) + 1;
        panic!("scraper crashed on fetch {n}");
    }

    fn name(&self) -> &'static str {
        "panicking"
    }
}

#[derive(Default)]
pub struct CountingCycle {
    pub calls: AtomicUsize,
    pub fail_first: usize,
    pub panic_first: usize,
}

#[async_trait::async_trait]
impl ProcessCycle for CountingCycle {
    async fn run_cycle(&self) -> Result<()> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if n <= self.panic_first {
            panic!("cycle {n} blew up");
        }
        if n <= self.fail_first {
            return Err(anyhow!("scrape {n} failed"));
        }
        Ok(())
    }
}

/// Never finishes and ignores cancellation.
pub struct HangingCycle;

#[async_trait::async_trait]
impl ProcessCycle for HangingCycle {
    async fn run_cycle(&self) -> Result<()> {
        std::future::pending::<()>().await;
        Ok(())
    }
}

/// Every call fails, as if the database were down.
pub struct FailingStore;

#[async_trait::async_trait]
impl Persistence for FailingStore {
    async fn record_snapshot(&self, _: &SessionMeta, _: &Snapshot) -> Result<()> {
        Err(anyhow!("db unavailable"))
    }
    async fn load_snapshots(&self, _: &SessionId) -> Result<Vec<Snapshot>> {
        Err(anyhow!("db unavailable"))
    }
    async fn append_adjustment(&self, _: &AdjustmentRecord) -> Result<()> {
        Err(anyhow!("db unavailable"))
    }
    async fn save_adjustment_history(&self, _: &AdjustmentHistory) -> Result<()> {
        Err(anyhow!("db unavailable"))
    }
    async fn load_adjustment_history(&self) -> Result<AdjustmentHistory> {
        Err(anyhow!("db unavailable"))
    }
}

pub fn test_config(initial: u32) -> PollerConfig {
    let mut cfg = PollerConfig {
        initial_interval_minutes: initial,
        min_interval_minutes: 5,
        max_interval_minutes: 360,
        shutdown_timeout_secs: 5,
        ..PollerConfig::default()
    };
    cfg.sanitize();
    cfg
}

pub fn arc<T>(v: T) -> Arc<T> {
    Arc::new(v)
}

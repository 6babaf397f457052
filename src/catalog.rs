// src/catalog.rs
//! JSON catalog fetcher and a logging process cycle, used by the binary.
//! Real scrapers plug in through the same `ItemFetcher` / `ProcessCycle`
//! traits.
use anyhow::{Context, Result};
use std::path::PathBuf;
use std::sync::Arc;

use crate::model::{Item, Source};
use crate::types::{ItemFetcher, ProcessCycle};

pub const DEFAULT_CATALOG_PATH: &str = "config/catalog.json";

#[derive(Debug, Clone)]
enum Origin {
    /// Re-read on every fetch so external edits show up as turnover.
    File(PathBuf),
    Fixture(String),
}

/// Reads a JSON array of items.
#[derive(Debug, Clone)]
pub struct CatalogFetcher {
    origin: Origin,
}

impl CatalogFetcher {
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        Self {
            origin: Origin::File(path.into()),
        }
    }

    pub fn from_fixture(json: &str) -> Self {
        Self {
            origin: Origin::Fixture(json.to_string()),
        }
    }

    async fn raw(&self) -> Result<String> {
        match &self.origin {
            Origin::File(p) => tokio::fs::read_to_string(p)
                .await
                .with_context(|| format!("reading catalog {}", p.display())),
            Origin::Fixture(s) => Ok(s.clone()),
        }
    }
}

#[async_trait::async_trait]
impl ItemFetcher for CatalogFetcher {
    async fn fetch_all(&self, sources: &[Source]) -> Result<Vec<Item>> {
        let body = self.raw().await?;
        let items: Vec<Item> = serde_json::from_str(&body).context("parsing catalog JSON")?;
        Ok(items
            .into_iter()
            .filter(|it| sources.contains(&it.source))
            .collect())
    }

    fn name(&self) -> &'static str {
        "catalog"
    }
}

/// Fetches the catalog and logs per-source counts. Fetch errors fail the cycle.
pub struct FetchAndLogCycle {
    fetcher: Arc<dyn ItemFetcher>,
    sources: Vec<Source>,
}

impl FetchAndLogCycle {
    pub fn new(fetcher: Arc<dyn ItemFetcher>, sources: Vec<Source>) -> Self {
        Self { fetcher, sources }
    }
}

#[async_trait::async_trait]
impl ProcessCycle for FetchAndLogCycle {
    async fn run_cycle(&self) -> Result<()> {
        let items = self
            .fetcher
            .fetch_all(&self.sources)
            .await
            .with_context(|| format!("fetcher {}", self.fetcher.name()))?;
        for src in &self.sources {
            let n = items.iter().filter(|it| it.source == *src).count();
            tracing::info!(target: "scheduler", source = %src, items = n, "catalog poll");
        }
        Ok(())
    }
}

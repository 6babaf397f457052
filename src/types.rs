// src/types.rs
//! Seams to the outside world: catalog fetching and the opaque
//! "scrape → filter → notify" cycle.
use anyhow::Result;

use crate::model::{Item, Source};

#[async_trait::async_trait]
pub trait ItemFetcher: Send + Sync {
    /// Current items for the requested sources. Stateless w.r.t. the caller.
    async fn fetch_all(&self, sources: &[Source]) -> Result<Vec<Item>>;
    fn name(&self) -> &'static str;
}

/// One full processing cycle. The scheduler only cares whether it failed.
#[async_trait::async_trait]
pub trait ProcessCycle: Send + Sync {
    async fn run_cycle(&self) -> Result<()>;
}

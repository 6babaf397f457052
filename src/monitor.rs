//! # Monitoring Sessions
//! A short burst of snapshots at a fixed interval, persisted as it goes and
//! then fed to the turnover analyzer.
//!
//! Fetch failures become empty snapshots; persistence failures fall back to
//! the snapshots kept in memory. Only cancellation ends a session early.

use chrono::Utc;
use metrics::counter;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::frequency::{recommend, Recommendation};
use crate::model::{SessionId, SessionMeta, Snapshot, Source, SourceStats};
use crate::store::Persistence;
use crate::turnover::TurnoverAnalyzer;
use crate::types::ItemFetcher;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionPlan {
    pub duration_minutes: u32,
    pub check_interval_minutes: u32,
}

impl SessionPlan {
    /// Three checks ten minutes apart.
    pub const QUICK: SessionPlan = SessionPlan {
        duration_minutes: 30,
        check_interval_minutes: 10,
    };
    /// Four checks fifteen minutes apart.
    pub const COMPREHENSIVE: SessionPlan = SessionPlan {
        duration_minutes: 60,
        check_interval_minutes: 15,
    };

    pub fn snapshot_count(&self) -> u32 {
        (self.duration_minutes / self.check_interval_minutes.max(1)).max(1)
    }

    pub fn check_interval(&self) -> Duration {
        Duration::from_secs(u64::from(self.check_interval_minutes) * 60)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionReport {
    pub meta: SessionMeta,
    pub snapshots_taken: usize,
    pub stats: SourceStats,
    pub recommendation: Recommendation,
}

#[derive(Clone)]
pub struct SessionRunner {
    fetcher: Arc<dyn ItemFetcher>,
    store: Arc<dyn Persistence>,
    sources: Vec<Source>,
    analyzer: TurnoverAnalyzer,
}

impl SessionRunner {
    pub fn new(
        fetcher: Arc<dyn ItemFetcher>,
        store: Arc<dyn Persistence>,
        sources: Vec<Source>,
    ) -> Self {
        Self {
            fetcher,
            store,
            sources,
            analyzer: TurnoverAnalyzer,
        }
    }

    /// Run a full session. Returns `None` if `cancel` fired before the last
    /// snapshot was taken.
    pub async fn run(
        &self,
        label: &str,
        plan: SessionPlan,
        cancel: &CancellationToken,
    ) -> Option<SessionReport> {
        let started_at = Utc::now();
        let meta = SessionMeta {
            id: SessionId::new(label, started_at),
            check_interval_minutes: plan.check_interval_minutes,
            sources: self.sources.clone(),
            started_at,
        };
        let total = plan.snapshot_count();
        tracing::info!(
            target: "monitor",
            session = %meta.id,
            snapshots = total,
            interval_min = plan.check_interval_minutes,
            "starting monitoring session"
        );

        let mut taken = Vec::with_capacity(total as usize);
        for seq in 1..=total {
            if cancel.is_cancelled() {
                return None;
            }
            let snap = self.take_snapshot(&meta, seq).await;
            taken.push(snap);

            if seq < total {
                tokio::select! {
                    _ = tokio::time::sleep(plan.check_interval()) => {}
                    _ = cancel.cancelled() => {
                        tracing::info!(target: "monitor", session = %meta.id, "session cancelled");
                        return None;
                    }
                }
            }
        }

        let snapshots = self.load_or_fallback(&meta, taken).await;
        let stats = self.analyzer.analyze(&meta, &snapshots);
        let recommendation = recommend(&stats);
        counter!("monitor_sessions_total").increment(1);
        tracing::info!(
            target: "monitor",
            session = %meta.id,
            recommended = ?recommendation.interval_minutes,
            confidence = ?recommendation.confidence,
            "monitoring session analysed"
        );

        Some(SessionReport {
            snapshots_taken: snapshots.len(),
            meta,
            stats,
            recommendation,
        })
    }

    async fn take_snapshot(&self, meta: &SessionMeta, seq: u32) -> Snapshot {
        let items = match self.fetcher.fetch_all(&meta.sources).await {
            Ok(items) => items,
            Err(e) => {
                tracing::error!(
                    target: "monitor",
                    fetcher = self.fetcher.name(),
                    session = %meta.id,
                    seq,
                    "fetch failed, recording empty snapshot: {e:#}"
                );
                counter!("monitor_fetch_errors_total").increment(1);
                Vec::new()
            }
        };
        let snap = Snapshot::from_items(meta.id.clone(), seq, Utc::now(), &items);
        tracing::info!(
            target: "monitor",
            session = %meta.id,
            seq,
            gcx = snap.count_for(Source::Gcx),
            cardcash = snap.count_for(Source::CardCash),
            "snapshot taken"
        );

        if let Err(e) = self.store.record_snapshot(meta, &snap).await {
            tracing::warn!(target: "store", session = %meta.id, seq, "snapshot kept in memory only: {e:#}");
            counter!("store_errors_total").increment(1);
        }
        snap
    }

    /// Prefer the persisted snapshots; fall back to what we hold in memory
    /// when the store is unreachable or incomplete.
    async fn load_or_fallback(&self, meta: &SessionMeta, taken: Vec<Snapshot>) -> Vec<Snapshot> {
        match self.store.load_snapshots(&meta.id).await {
            Ok(stored) if stored.len() >= taken.len() => stored,
            Ok(stored) => {
                tracing::warn!(
                    target: "store",
                    session = %meta.id,
                    stored = stored.len(),
                    taken = taken.len(),
                    "store returned fewer snapshots than taken; using memory copy"
                );
                taken
            }
            Err(e) => {
                tracing::warn!(target: "store", session = %meta.id, "loading snapshots failed, using memory copy: {e:#}");
                counter!("store_errors_total").increment(1);
                taken
            }
        }
    }
}

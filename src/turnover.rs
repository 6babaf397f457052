//! # Turnover Analysis
//! Builds per-item presence timelines from the snapshots of one monitoring
//! session and derives per-source lifetime/turnover statistics.
//!
//! Pure functions only: no I/O, no shared state. Safe to call from any task.
//!
//! Known noise: an item missed by a flaky fetch looks exactly like an item
//! that expired. Both count as "disappeared".

use std::collections::BTreeMap;

use crate::model::{Fingerprint, SessionMeta, Snapshot, Source, SourceStats, TurnoverStats};

/// Ordered sequence numbers at which one item was observed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PresenceTimeline {
    sequences: Vec<u32>,
}

impl PresenceTimeline {
    fn observe(&mut self, seq: u32) {
        // Snapshots are scanned in order; a repeated sequence is ignored.
        if self.sequences.last() != Some(&seq) {
            self.sequences.push(seq);
        }
    }

    pub fn sequences(&self) -> &[u32] {
        &self.sequences
    }

    pub fn first(&self) -> Option<u32> {
        self.sequences.first().copied()
    }

    pub fn last(&self) -> Option<u32> {
        self.sequences.last().copied()
    }

    /// `(last - first + 1) * interval`, or `None` with fewer than two observations.
    pub fn lifetime_minutes(&self, check_interval_minutes: u32) -> Option<f64> {
        if self.sequences.len() < 2 {
            return None;
        }
        let (first, last) = (self.first()?, self.last()?);
        Some(f64::from(last - first + 1) * f64::from(check_interval_minutes))
    }

    /// Present earlier but absent from the final snapshot.
    pub fn disappeared_before(&self, final_seq: u32) -> bool {
        self.last().is_some_and(|l| l < final_seq)
    }
}

pub type Timelines = BTreeMap<Source, BTreeMap<Fingerprint, PresenceTimeline>>;

/// Scan snapshots in sequence order and record where each fingerprint shows up.
pub fn build_timelines(snapshots: &[Snapshot]) -> Timelines {
    let mut ordered: Vec<&Snapshot> = snapshots.iter().collect();
    ordered.sort_by_key(|s| s.sequence);

    let mut out: Timelines = BTreeMap::new();
    for snap in ordered {
        for key in &snap.items {
            out.entry(key.source)
                .or_default()
                .entry(key.fingerprint.clone())
                .or_default()
                .observe(snap.sequence);
        }
    }
    out
}

/// Collapse one source's timelines into aggregate statistics.
pub fn stats_for(
    timelines: &BTreeMap<Fingerprint, PresenceTimeline>,
    final_seq: u32,
    check_interval_minutes: u32,
) -> TurnoverStats {
    let total = timelines.len();
    if total == 0 {
        return TurnoverStats::default();
    }

    let mut disappeared = 0usize;
    let mut lifetimes = Vec::new();
    for tl in timelines.values() {
        if tl.disappeared_before(final_seq) {
            disappeared += 1;
        }
        if let Some(l) = tl.lifetime_minutes(check_interval_minutes) {
            lifetimes.push(l);
        }
    }

    let avg_lifetime = if lifetimes.is_empty() {
        0.0
    } else {
        lifetimes.iter().sum::<f64>() / lifetimes.len() as f64
    };

    TurnoverStats {
        total_items_seen: total,
        disappeared_count: disappeared,
        turnover_rate: disappeared as f64 / total as f64,
        avg_lifetime_minutes: avg_lifetime,
        lifetime_samples: lifetimes.len(),
    }
}

/// Stateless analyzer; a unit struct so it can sit behind the same seams as
/// the other collaborators.
#[derive(Debug, Clone, Copy, Default)]
pub struct TurnoverAnalyzer;

impl TurnoverAnalyzer {
    /// Per-source statistics for one session. Every source the session was
    /// polling gets an entry, even when nothing was seen for it.
    pub fn analyze(&self, meta: &SessionMeta, snapshots: &[Snapshot]) -> SourceStats {
        let final_seq = snapshots.iter().map(|s| s.sequence).max().unwrap_or(0);
        let timelines = build_timelines(snapshots);

        let mut out = SourceStats::new();
        for src in &meta.sources {
            out.insert(*src, TurnoverStats::default());
        }
        for (src, tls) in &timelines {
            let stats = stats_for(tls, final_seq, meta.check_interval_minutes);
            tracing::debug!(
                target: "monitor",
                session = %meta.id,
                source = %src,
                total = stats.total_items_seen,
                disappeared = stats.disappeared_count,
                avg_lifetime = stats.avg_lifetime_minutes,
                turnover = stats.turnover_rate,
                "turnover stats"
            );
            out.insert(*src, stats);
        }
        out
    }
}

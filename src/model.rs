//! # Data Model
//! Items, snapshots, per-session turnover statistics and adjustment records.
//!
//! Everything here is plain data (serde-friendly); behaviour lives in
//! `turnover`, `frequency` and `scheduler`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Catalog origin an item was scraped from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    Gcx,
    CardCash,
}

impl Source {
    pub const ALL: [Source; 2] = [Source::Gcx, Source::CardCash];

    pub fn as_str(&self) -> &'static str {
        match self {
            Source::Gcx => "gcx",
            Source::CardCash => "cardcash",
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Stable identity of an item across polls (12 hex chars).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(pub String);

impl Fingerprint {
    /// Hash of the near-invariant attributes only; the URL is deliberately
    /// left out because it drifts between polls.
    pub fn compute(source: Source, merchant: &str, face_value: f64, price: f64) -> Self {
        use sha2::{Digest, Sha256};
        let key = format!(
            "{}-{}-{:.2}-{:.2}",
            source.as_str(),
            merchant.trim().to_lowercase(),
            face_value,
            price
        );
        let digest = Sha256::digest(key.as_bytes());
        let mut out = String::with_capacity(12);
        for b in digest.iter().take(6) {
            use std::fmt::Write as _;
            let _ = write!(&mut out, "{:02x}", b);
        }
        Fingerprint(out)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One listing as returned by an `ItemFetcher`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    pub source: Source,
    pub merchant: String,
    pub face_value: f64,
    pub price: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default = "Utc::now")]
    pub observed_at: DateTime<Utc>,
}

impl Item {
    pub fn fingerprint(&self) -> Fingerprint {
        Fingerprint::compute(self.source, &self.merchant, self.face_value, self.price)
    }

    pub fn key(&self) -> ItemKey {
        ItemKey {
            source: self.source,
            fingerprint: self.fingerprint(),
        }
    }
}

/// What a snapshot remembers about an item: where it came from and who it is.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ItemKey {
    pub source: Source,
    pub fingerprint: Fingerprint,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(pub String);

impl SessionId {
    /// `<label>-<UTC timestamp>`, unique enough for one process.
    pub fn new(label: &str, at: DateTime<Utc>) -> Self {
        SessionId(format!("{label}-{}", at.format("%Y%m%dT%H%M%S%.3fZ")))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Fixed parameters of one monitoring session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionMeta {
    pub id: SessionId,
    pub check_interval_minutes: u32,
    pub sources: Vec<Source>,
    pub started_at: DateTime<Utc>,
}

/// One poll of the catalog inside a session. `sequence` starts at 1.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub session_id: SessionId,
    pub sequence: u32,
    pub timestamp: DateTime<Utc>,
    pub items: BTreeSet<ItemKey>,
}

impl Snapshot {
    pub fn from_items(
        session_id: SessionId,
        sequence: u32,
        timestamp: DateTime<Utc>,
        items: &[Item],
    ) -> Self {
        Self {
            session_id,
            sequence,
            timestamp,
            items: items.iter().map(Item::key).collect(),
        }
    }

    pub fn count_for(&self, source: Source) -> usize {
        self.items.iter().filter(|k| k.source == source).count()
    }
}

/// Aggregate turnover over one session for one source.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct TurnoverStats {
    pub total_items_seen: usize,
    pub disappeared_count: usize,
    /// `disappeared_count / total_items_seen`, 0 when nothing was seen.
    pub turnover_rate: f64,
    /// Mean lifetime over items observed at least twice; 0 without samples.
    pub avg_lifetime_minutes: f64,
    /// Number of items that contributed to `avg_lifetime_minutes`.
    pub lifetime_samples: usize,
}

impl TurnoverStats {
    pub fn has_lifetime(&self) -> bool {
        self.lifetime_samples > 0
    }
}

pub type SourceStats = BTreeMap<Source, TurnoverStats>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    Low,
    Medium,
    High,
}

/// Why the controller chose (or declined) an interval change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReasonCode {
    VeryHighTurnover,
    HighTurnover,
    VeryLowTurnoverLongLifetime,
    LowTurnover,
    VeryShortLifetime,
    WithinNormalRange,
}

impl ReasonCode {
    pub fn describe(&self) -> &'static str {
        match self {
            ReasonCode::VeryHighTurnover => "very high turnover",
            ReasonCode::HighTurnover => "high turnover",
            ReasonCode::VeryLowTurnoverLongLifetime => "very low turnover and long lifetime",
            ReasonCode::LowTurnover => "low turnover",
            ReasonCode::VeryShortLifetime => "very short lifetime",
            ReasonCode::WithinNormalRange => "within normal range",
        }
    }
}

impl fmt::Display for ReasonCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.describe())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Increase,
    Decrease,
}

/// Metrics the controller looked at when it made a change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub per_source: SourceStats,
    pub avg_turnover_rate: f64,
    #[serde(default)]
    pub avg_lifetime_minutes: Option<f64>,
    pub poll_count: u64,
}

/// Immutable entry of the adjustment log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdjustmentRecord {
    pub timestamp: DateTime<Utc>,
    pub old_interval_minutes: u32,
    pub new_interval_minutes: u32,
    pub reason: ReasonCode,
    pub confidence: Confidence,
    pub metrics: MetricsSnapshot,
}

impl AdjustmentRecord {
    pub fn direction(&self) -> Direction {
        if self.new_interval_minutes > self.old_interval_minutes {
            Direction::Increase
        } else {
            Direction::Decrease
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryStats {
    pub total_adjustments: u64,
    pub increases: u64,
    pub decreases: u64,
    pub last_updated: DateTime<Utc>,
}

impl Default for HistoryStats {
    fn default() -> Self {
        Self {
            total_adjustments: 0,
            increases: 0,
            decreases: 0,
            last_updated: Utc::now(),
        }
    }
}

/// Persisted adjustment log: append-only records plus summary counters.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct AdjustmentHistory {
    #[serde(default)]
    pub adjustments: Vec<AdjustmentRecord>,
    #[serde(default)]
    pub stats: HistoryStats,
}

impl AdjustmentHistory {
    pub fn record(&mut self, rec: AdjustmentRecord) {
        self.stats.total_adjustments += 1;
        match rec.direction() {
            Direction::Increase => self.stats.increases += 1,
            Direction::Decrease => self.stats.decreases += 1,
        }
        self.stats.last_updated = rec.timestamp;
        self.adjustments.push(rec);
    }

    pub fn last(&self) -> Option<&AdjustmentRecord> {
        self.adjustments.last()
    }
}

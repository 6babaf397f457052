//! # Frequency Controller
//! Owns the bounded polling interval and adjusts it from turnover statistics.
//!
//! - `FrequencyController` is plain state + policy (sync, testable).
//! - `ControllerHandle` shares one controller between the scheduler tasks and
//!   serializes every adjustment, including the history append, behind one
//!   async lock.

pub mod recommend;
pub mod rules;

use chrono::{DateTime, Utc};
use metrics::{counter, gauge};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::model::{
    AdjustmentHistory, AdjustmentRecord, Confidence, Direction, MetricsSnapshot, ReasonCode,
    SourceStats,
};
use crate::store::Persistence;
pub use recommend::{recommend, Cadence, Recommendation};
use rules::{PolicyInput, Rule, RULES};

pub const ABSOLUTE_MIN_INTERVAL: u32 = 5;
pub const ABSOLUTE_MAX_INTERVAL: u32 = 360;

/// Interval bounds, always inside `[ABSOLUTE_MIN_INTERVAL, ABSOLUTE_MAX_INTERVAL]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Bounds {
    pub min: u32,
    pub max: u32,
}

impl Bounds {
    pub fn new(min: u32, max: u32) -> Self {
        let mut min = min.clamp(ABSOLUTE_MIN_INTERVAL, ABSOLUTE_MAX_INTERVAL);
        let mut max = max.clamp(ABSOLUTE_MIN_INTERVAL, ABSOLUTE_MAX_INTERVAL);
        if min > max {
            std::mem::swap(&mut min, &mut max);
        }
        Self { min, max }
    }

    pub fn clamp(&self, minutes: i64) -> u32 {
        let v = minutes.clamp(i64::from(self.min), i64::from(self.max));
        // Inside [min, max] ⊂ [5, 360] after the clamp above.
        u32::try_from(v).unwrap_or(self.min)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ControllerSettings {
    pub initial_interval_minutes: u32,
    pub min_interval_minutes: u32,
    pub max_interval_minutes: u32,
    pub adjustment_threshold: u64,
}

impl Default for ControllerSettings {
    fn default() -> Self {
        Self {
            initial_interval_minutes: 60,
            min_interval_minutes: 10,
            max_interval_minutes: 240,
            adjustment_threshold: 5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FrequencyState {
    pub current_interval_minutes: u32,
    pub min_interval_minutes: u32,
    pub max_interval_minutes: u32,
    pub poll_count: u64,
    pub last_adjustment_at: Option<DateTime<Utc>>,
}

/// Why `adjust` declined to evaluate the policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SkipReason {
    InsufficientPolls { poll_count: u64, threshold: u64 },
    /// No source reported a single item.
    NoMetrics,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum AdjustOutcome {
    Skipped(SkipReason),
    Unchanged {
        interval_minutes: u32,
        reason: ReasonCode,
        confidence: Confidence,
    },
    Adjusted(AdjustmentRecord),
}

impl AdjustOutcome {
    pub fn record(&self) -> Option<&AdjustmentRecord> {
        match self {
            AdjustOutcome::Adjusted(r) => Some(r),
            _ => None,
        }
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self, AdjustOutcome::Skipped(_))
    }
}

/// Cross-source averages. Sources with no items are left out of both means;
/// sources without a lifetime sample are left out of the lifetime mean.
pub fn policy_input(stats: &SourceStats) -> Option<PolicyInput> {
    let seen: Vec<_> = stats.values().filter(|s| s.total_items_seen > 0).collect();
    if seen.is_empty() {
        return None;
    }
    let avg_turnover = seen.iter().map(|s| s.turnover_rate).sum::<f64>() / seen.len() as f64;

    let lifetimes: Vec<f64> = seen
        .iter()
        .filter(|s| s.has_lifetime())
        .map(|s| s.avg_lifetime_minutes)
        .collect();
    let avg_lifetime_minutes =
        (!lifetimes.is_empty()).then(|| lifetimes.iter().sum::<f64>() / lifetimes.len() as f64);

    Some(PolicyInput {
        avg_turnover,
        avg_lifetime_minutes,
    })
}

#[derive(Debug, Clone)]
pub struct FrequencyController {
    state: FrequencyState,
    bounds: Bounds,
    adjustment_threshold: u64,
    rules: &'static [Rule],
    history: AdjustmentHistory,
}

impl FrequencyController {
    pub fn new(settings: ControllerSettings) -> Self {
        Self::with_history(settings, AdjustmentHistory::default(), false)
    }

    /// Build from settings plus previously persisted history. With `resume`,
    /// the interval continues from the last recorded change.
    pub fn with_history(
        settings: ControllerSettings,
        history: AdjustmentHistory,
        resume: bool,
    ) -> Self {
        let bounds = Bounds::new(settings.min_interval_minutes, settings.max_interval_minutes);
        let start = match history.last() {
            Some(last) if resume => last.new_interval_minutes,
            _ => settings.initial_interval_minutes,
        };
        let current = bounds.clamp(i64::from(start));
        Self {
            state: FrequencyState {
                current_interval_minutes: current,
                min_interval_minutes: bounds.min,
                max_interval_minutes: bounds.max,
                poll_count: 0,
                last_adjustment_at: None,
            },
            bounds,
            adjustment_threshold: settings.adjustment_threshold,
            rules: &RULES,
            history,
        }
    }

    /// Swap in a different ordered policy table.
    pub fn with_rules(mut self, rules: &'static [Rule]) -> Self {
        self.rules = rules;
        self
    }

    pub fn state(&self) -> &FrequencyState {
        &self.state
    }

    pub fn bounds(&self) -> Bounds {
        self.bounds
    }

    pub fn adjustment_threshold(&self) -> u64 {
        self.adjustment_threshold
    }

    pub fn history(&self) -> &AdjustmentHistory {
        &self.history
    }

    pub fn current_interval(&self) -> u32 {
        self.state.current_interval_minutes
    }

    pub fn record_poll(&mut self) -> u64 {
        self.state.poll_count += 1;
        self.state.poll_count
    }

    /// Re-bound the interval; the current value is pulled inside the new range.
    pub fn set_bounds(&mut self, min: u32, max: u32) {
        self.bounds = Bounds::new(min, max);
        self.state.min_interval_minutes = self.bounds.min;
        self.state.max_interval_minutes = self.bounds.max;
        self.state.current_interval_minutes =
            self.bounds.clamp(i64::from(self.state.current_interval_minutes));
        tracing::info!(
            target: "frequency",
            min = self.bounds.min,
            max = self.bounds.max,
            "frequency bounds set"
        );
    }

    pub fn recommend(&self, stats: &SourceStats) -> Recommendation {
        recommend(stats)
    }

    pub fn adjust(&mut self, stats: &SourceStats, now: DateTime<Utc>) -> AdjustOutcome {
        if self.state.poll_count < self.adjustment_threshold {
            tracing::info!(
                target: "frequency",
                polls = self.state.poll_count,
                threshold = self.adjustment_threshold,
                "not enough polls for adjustment yet"
            );
            return AdjustOutcome::Skipped(SkipReason::InsufficientPolls {
                poll_count: self.state.poll_count,
                threshold: self.adjustment_threshold,
            });
        }

        let Some(input) = policy_input(stats) else {
            tracing::info!(target: "frequency", "no items seen in any source; skipping adjustment");
            return AdjustOutcome::Skipped(SkipReason::NoMetrics);
        };

        let rule = rules::evaluate(self.rules, &input);
        let old = self.state.current_interval_minutes;
        let new = self.bounds.clamp((rule.target)(i64::from(old)));
        debug_assert!(
            (self.bounds.min..=self.bounds.max).contains(&new),
            "interval {new} escaped bounds {:?}",
            self.bounds
        );

        self.state.last_adjustment_at = Some(now);

        if new == old {
            tracing::info!(
                target: "frequency",
                interval = old,
                reason = %rule.reason,
                "frequency unchanged"
            );
            return AdjustOutcome::Unchanged {
                interval_minutes: old,
                reason: rule.reason,
                confidence: rule.confidence,
            };
        }

        self.state.current_interval_minutes = new;
        let record = AdjustmentRecord {
            timestamp: now,
            old_interval_minutes: old,
            new_interval_minutes: new,
            reason: rule.reason,
            confidence: rule.confidence,
            metrics: MetricsSnapshot {
                per_source: stats.clone(),
                avg_turnover_rate: input.avg_turnover,
                avg_lifetime_minutes: input.avg_lifetime_minutes,
                poll_count: self.state.poll_count,
            },
        };
        self.history.record(record.clone());

        tracing::info!(
            target: "frequency",
            old,
            new,
            reason = %rule.reason,
            confidence = ?rule.confidence,
            "adjusted frequency"
        );
        AdjustOutcome::Adjusted(record)
    }
}

/// Shared, lock-guarded controller plus the store its history goes to.
#[derive(Clone)]
pub struct ControllerHandle {
    inner: Arc<Mutex<FrequencyController>>,
    store: Arc<dyn Persistence>,
}

impl ControllerHandle {
    pub fn new(controller: FrequencyController, store: Arc<dyn Persistence>) -> Self {
        gauge!("poller_interval_minutes").set(f64::from(controller.current_interval()));
        Self {
            inner: Arc::new(Mutex::new(controller)),
            store,
        }
    }

    /// Load persisted history and build the controller. An unreadable history
    /// degrades to an empty one.
    pub async fn restore(
        settings: ControllerSettings,
        store: Arc<dyn Persistence>,
        resume: bool,
    ) -> Self {
        let history = match store.load_adjustment_history().await {
            Ok(h) => {
                tracing::info!(
                    target: "frequency",
                    adjustments = h.stats.total_adjustments,
                    "loaded adjustment history"
                );
                h
            }
            Err(e) => {
                tracing::warn!(target: "frequency", "adjustment history unavailable, starting empty: {e:#}");
                counter!("store_errors_total").increment(1);
                AdjustmentHistory::default()
            }
        };
        Self::new(
            FrequencyController::with_history(settings, history, resume),
            store,
        )
    }

    /// Run one adjustment. The lock is held until the history is persisted so
    /// concurrent callers cannot interleave writes.
    pub async fn adjust(&self, stats: &SourceStats) -> AdjustOutcome {
        let mut ctl = self.inner.lock().await;
        let outcome = ctl.adjust(stats, Utc::now());
        if let AdjustOutcome::Adjusted(rec) = &outcome {
            let direction = match rec.direction() {
                Direction::Increase => "increase",
                Direction::Decrease => "decrease",
            };
            counter!("poller_adjustments_total", "direction" => direction).increment(1);
            gauge!("poller_interval_minutes").set(f64::from(rec.new_interval_minutes));
            // Full history, so a missed or corrupt earlier write is healed.
            if let Err(e) = self.store.save_adjustment_history(ctl.history()).await {
                tracing::warn!(target: "store", "adjustment kept in memory only: {e:#}");
                counter!("store_errors_total").increment(1);
            }
        }
        outcome
    }

    pub async fn record_poll(&self) -> u64 {
        self.inner.lock().await.record_poll()
    }

    pub async fn current_interval(&self) -> u32 {
        self.inner.lock().await.current_interval()
    }

    pub async fn state(&self) -> FrequencyState {
        self.inner.lock().await.state().clone()
    }

    pub async fn adjustment_threshold(&self) -> u64 {
        self.inner.lock().await.adjustment_threshold()
    }

    pub async fn last_adjustment_at(&self) -> Option<DateTime<Utc>> {
        self.inner.lock().await.state().last_adjustment_at
    }

    /// In-memory copy of the history (survives persistence outages).
    pub async fn history(&self) -> AdjustmentHistory {
        self.inner.lock().await.history().clone()
    }

    pub async fn recommend(&self, stats: &SourceStats) -> Recommendation {
        self.inner.lock().await.recommend(stats)
    }

    pub async fn set_bounds(&self, min: u32, max: u32) {
        let mut ctl = self.inner.lock().await;
        ctl.set_bounds(min, max);
        gauge!("poller_interval_minutes").set(f64::from(ctl.current_interval()));
    }

    pub fn store(&self) -> &Arc<dyn Persistence> {
        &self.store
    }
}

// tests/frequency_controller.rs
// Controller behaviour through the shared handle: persistence, degraded
// mode, restarts and concurrent adjustments.

mod common;

use std::sync::Arc;

use adaptive_poller::frequency::{ControllerSettings, FrequencyController};
use adaptive_poller::model::{Confidence, ReasonCode, Source, SourceStats, TurnoverStats};
use adaptive_poller::store::{MemoryStore, Persistence};
use adaptive_poller::{AdjustOutcome, ControllerHandle, SkipReason};

fn settings() -> ControllerSettings {
    ControllerSettings {
        initial_interval_minutes: 60,
        min_interval_minutes: 10,
        max_interval_minutes: 240,
        adjustment_threshold: 5,
    }
}

fn two_sources(t_gcx: f64, t_cc: f64, lifetime: f64) -> SourceStats {
    let mk = |t: f64| TurnoverStats {
        total_items_seen: 20,
        disappeared_count: (t * 20.0).round() as usize,
        turnover_rate: t,
        avg_lifetime_minutes: lifetime,
        lifetime_samples: 10,
    };
    let mut m = SourceStats::new();
    m.insert(Source::Gcx, mk(t_gcx));
    m.insert(Source::CardCash, mk(t_cc));
    m
}

async fn eligible_handle(store: Arc<dyn Persistence>) -> ControllerHandle {
    let h = ControllerHandle::restore(settings(), store, false).await;
    for _ in 0..5 {
        h.record_poll().await;
    }
    h
}

#[tokio::test]
async fn skip_is_observable_before_threshold() {
    let store = Arc::new(MemoryStore::new());
    let h = ControllerHandle::restore(settings(), store.clone(), false).await;
    h.record_poll().await;
    let out = h.adjust(&two_sources(0.9, 0.9, 10.0)).await;
    assert!(matches!(
        out,
        AdjustOutcome::Skipped(SkipReason::InsufficientPolls { poll_count: 1, threshold: 5 })
    ));
    assert!(store.load_adjustment_history().await.unwrap().adjustments.is_empty());
}

#[tokio::test]
async fn averages_across_sources_drive_the_rule() {
    let store = Arc::new(MemoryStore::new());
    let h = eligible_handle(store.clone()).await;
    // mean(0.7, 0.5) = 0.6 → very high turnover.
    let out = h.adjust(&two_sources(0.7, 0.5, 45.0)).await;
    let rec = out.record().expect("adjusted");
    assert_eq!(rec.new_interval_minutes, 15);
    assert_eq!(rec.reason, ReasonCode::VeryHighTurnover);
    assert!((rec.metrics.avg_turnover_rate - 0.6).abs() < 1e-9);

    let persisted = store.load_adjustment_history().await.unwrap();
    assert_eq!(persisted.adjustments.len(), 1);
    assert_eq!(persisted.stats.decreases, 1);
}

#[tokio::test]
async fn low_turnover_long_lifetime_raises_interval() {
    let h = eligible_handle(Arc::new(MemoryStore::new())).await;
    let out = h.adjust(&two_sources(0.03, 0.03, 200.0)).await;
    let rec = out.record().expect("adjusted");
    assert_eq!(rec.old_interval_minutes, 60);
    assert_eq!(rec.new_interval_minutes, 120);
    assert_eq!(rec.confidence, Confidence::High);
}

#[tokio::test]
async fn unchanged_metrics_do_not_duplicate_records() {
    let store = Arc::new(MemoryStore::new());
    let h = eligible_handle(store.clone()).await;
    let stats = two_sources(0.35, 0.35, 90.0);
    // 60 → 30, then 30 → min(30, 20) = 20, then 10, then floor holds.
    for _ in 0..6 {
        h.adjust(&stats).await;
    }
    let hist = store.load_adjustment_history().await.unwrap();
    let trail: Vec<u32> = hist.adjustments.iter().map(|r| r.new_interval_minutes).collect();
    assert_eq!(trail, vec![30, 20, 10]);
    assert_eq!(h.current_interval().await, 10);
    assert!(h.last_adjustment_at().await.is_some());
}

#[tokio::test]
async fn failing_store_degrades_to_memory() {
    let h = ControllerHandle::restore(settings(), Arc::new(common::FailingStore), false).await;
    for _ in 0..5 {
        h.record_poll().await;
    }
    let out = h.adjust(&two_sources(0.6, 0.6, 20.0)).await;
    assert!(out.record().is_some());
    assert_eq!(h.current_interval().await, 15);
    assert_eq!(h.history().await.stats.total_adjustments, 1);
}

#[tokio::test]
async fn restart_keeps_prior_history() {
    let store = Arc::new(MemoryStore::new());
    {
        let h = eligible_handle(store.clone()).await;
        h.adjust(&two_sources(0.6, 0.6, 20.0)).await;
    }
    let resumed = ControllerHandle::restore(settings(), store.clone(), true).await;
    assert_eq!(resumed.history().await.stats.total_adjustments, 1);
    assert_eq!(resumed.current_interval().await, 15);
    assert_eq!(resumed.state().await.poll_count, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_adjustments_are_serialized() {
    let store = Arc::new(MemoryStore::new());
    let h = eligible_handle(store.clone()).await;
    let stats = two_sources(0.08, 0.08, 100.0);

    let mut tasks = Vec::new();
    for _ in 0..8 {
        let h = h.clone();
        let stats = stats.clone();
        tasks.push(tokio::spawn(async move { h.adjust(&stats).await }));
    }
    for t in tasks {
        t.await.unwrap();
    }

    // +10 per call from 60, capped at 240: no lost updates.
    assert_eq!(h.current_interval().await, 140);
    let hist = store.load_adjustment_history().await.unwrap();
    assert_eq!(hist.adjustments.len(), 8);
    for pair in hist.adjustments.windows(2) {
        assert_eq!(pair[0].new_interval_minutes, pair[1].old_interval_minutes);
    }
}

#[test]
fn custom_rule_table_is_swappable() {
    use adaptive_poller::frequency::rules::{PolicyInput, Rule};
    use chrono::Utc;

    fn any(_: &PolicyInput) -> bool {
        true
    }
    fn double(cur: i64) -> i64 {
        cur * 2
    }
    static DOUBLING: [Rule; 1] = [Rule {
        reason: ReasonCode::LowTurnover,
        confidence: Confidence::Medium,
        when: any,
        target: double,
    }];

    let mut c = FrequencyController::new(settings()).with_rules(&DOUBLING);
    for _ in 0..5 {
        c.record_poll();
    }
    let out = c.adjust(&two_sources(0.9, 0.9, 5.0), Utc::now());
    assert_eq!(out.record().map(|r| r.new_interval_minutes), Some(120));
}

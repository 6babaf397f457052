//! # Scheduler Loop
//! `Stopped ⇄ Running` state machine driving two independent tasks:
//!
//! - **poll activity**: run one process cycle, record it, every few polls run
//!   a quick monitoring session and adjust, then wait out the interval.
//! - **monitoring activity**: after a warm-up, run a comprehensive session
//!   whenever the last adjustment is old enough, then recheck later.
//!
//! Both share only the `ControllerHandle` and the poll history. Every wait
//! races the cancellation token, so `stop()` is prompt even mid-sleep. Each
//! cycle runs in its own task; an error or panic there is logged, backed off
//! and retried.

use chrono::{DateTime, Utc};
use metrics::{counter, histogram};
use serde::Serialize;
use std::sync::{Arc, Mutex};
use tokio::task::{AbortHandle, JoinHandle};
use tokio::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

use crate::config::{MonitorConfig, PollerConfig};
use crate::frequency::{AdjustOutcome, ControllerHandle};
use crate::history::{PollEvent, PollHistory};
use crate::monitor::{SessionPlan, SessionRunner};
use crate::types::ProcessCycle;

#[derive(Debug, Clone, PartialEq)]
pub struct SchedulerSettings {
    pub adjust_every_polls: u64,
    pub poll_failure_backoff: Duration,
    pub shutdown_timeout: Duration,
    pub poll_history_len: usize,
    pub monitor: MonitorConfig,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self::from(&PollerConfig::default())
    }
}

impl From<&PollerConfig> for SchedulerSettings {
    fn from(cfg: &PollerConfig) -> Self {
        Self {
            adjust_every_polls: cfg.adjust_every_polls.max(1),
            poll_failure_backoff: Duration::from_secs(cfg.poll_failure_backoff_secs),
            shutdown_timeout: Duration::from_secs(cfg.shutdown_timeout_secs),
            poll_history_len: cfg.poll_history_len,
            monitor: cfg.monitor.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    Started,
    AlreadyRunning,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    Stopped,
    NotRunning,
    /// Activities did not acknowledge in time and were aborted.
    TimedOut,
}

/// Read-only view for status endpoints and the CLI.
#[derive(Debug, Clone, Serialize)]
pub struct Status {
    pub running: bool,
    pub current_interval_minutes: u32,
    pub min_interval_minutes: u32,
    pub max_interval_minutes: u32,
    pub adjustment_threshold: u64,
    pub poll_count: u64,
    pub last_adjustment_at: Option<DateTime<Utc>>,
    pub recent_polls: Vec<PollEvent>,
    pub total_adjustments: u64,
    pub increases: u64,
    pub decreases: u64,
}

struct Running {
    cancel: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

/// Everything an activity task needs; cheap to clone.
#[derive(Clone)]
struct Activity {
    controller: ControllerHandle,
    cycle: Arc<dyn ProcessCycle>,
    runner: SessionRunner,
    polls: Arc<PollHistory>,
    settings: SchedulerSettings,
    cancel: CancellationToken,
}

pub struct Scheduler {
    controller: ControllerHandle,
    cycle: Arc<dyn ProcessCycle>,
    runner: SessionRunner,
    polls: Arc<PollHistory>,
    settings: SchedulerSettings,
    running: Mutex<Option<Running>>,
}

impl Scheduler {
    pub fn new(
        controller: ControllerHandle,
        cycle: Arc<dyn ProcessCycle>,
        runner: SessionRunner,
        settings: SchedulerSettings,
    ) -> Self {
        Self {
            polls: Arc::new(PollHistory::with_capacity(settings.poll_history_len)),
            controller,
            cycle,
            runner,
            settings,
            running: Mutex::new(None),
        }
    }

    pub fn controller(&self) -> &ControllerHandle {
        &self.controller
    }

    pub fn is_running(&self) -> bool {
        self.running.lock().expect("scheduler mutex poisoned").is_some()
    }

    /// Spawn both activities. Starting twice is a logged no-op.
    pub fn start(&self) -> StartOutcome {
        let mut guard = self.running.lock().expect("scheduler mutex poisoned");
        if guard.is_some() {
            tracing::warn!(target: "scheduler", "scheduler is already running");
            return StartOutcome::AlreadyRunning;
        }

        let cancel = CancellationToken::new();
        let ctx = Activity {
            controller: self.controller.clone(),
            cycle: self.cycle.clone(),
            runner: self.runner.clone(),
            polls: self.polls.clone(),
            settings: self.settings.clone(),
            cancel: cancel.clone(),
        };
        let tasks = vec![
            tokio::spawn(poll_activity(ctx.clone())),
            tokio::spawn(monitor_activity(ctx)),
        ];
        *guard = Some(Running { cancel, tasks });
        tracing::info!(target: "scheduler", "scheduler started");
        StartOutcome::Started
    }

    /// Signal both activities and wait for them up to the shutdown timeout.
    pub async fn stop(&self) -> StopOutcome {
        let Some(running) = self
            .running
            .lock()
            .expect("scheduler mutex poisoned")
            .take()
        else {
            return StopOutcome::NotRunning;
        };

        tracing::info!(target: "scheduler", "stopping scheduler");
        running.cancel.cancel();

        let tasks = running.tasks;
        let aborts: Vec<AbortHandle> = tasks.iter().map(|t| t.abort_handle()).collect();
        let join_all = async move {
            for t in tasks {
                if let Err(e) = t.await {
                    tracing::warn!(target: "scheduler", "activity ended abnormally: {e}");
                }
            }
        };

        match tokio::time::timeout(self.settings.shutdown_timeout, join_all).await {
            Ok(()) => {
                tracing::info!(target: "scheduler", "scheduler stopped");
                StopOutcome::Stopped
            }
            Err(_) => {
                tracing::warn!(
                    target: "scheduler",
                    timeout_secs = self.settings.shutdown_timeout.as_secs(),
                    "activities did not stop in time; aborting"
                );
                for a in aborts {
                    a.abort();
                }
                StopOutcome::TimedOut
            }
        }
    }

    pub async fn status(&self) -> Status {
        let state = self.controller.state().await;
        let history = self.controller.history().await;
        Status {
            running: self.is_running(),
            current_interval_minutes: state.current_interval_minutes,
            min_interval_minutes: state.min_interval_minutes,
            max_interval_minutes: state.max_interval_minutes,
            adjustment_threshold: self.controller.adjustment_threshold().await,
            poll_count: state.poll_count,
            last_adjustment_at: state.last_adjustment_at,
            recent_polls: self.polls.snapshot_last_n(self.settings.poll_history_len),
            total_adjustments: history.stats.total_adjustments,
            increases: history.stats.increases,
            decreases: history.stats.decreases,
        }
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        if let Ok(mut guard) = self.running.lock() {
            if let Some(r) = guard.take() {
                r.cancel.cancel();
            }
        }
    }
}

/// Sleep for `d` unless cancelled first. Returns `false` on cancellation.
pub async fn sleep_or_cancel(d: Duration, cancel: &CancellationToken) -> bool {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => false,
        _ = tokio::time::sleep(d) => true,
    }
}

fn minutes(m: u64) -> Duration {
    Duration::from_secs(m.saturating_mul(60))
}

fn log_outcome(kind: &str, out: &AdjustOutcome) {
    match out {
        AdjustOutcome::Skipped(reason) => {
            tracing::info!(target: "scheduler", kind, ?reason, "adjustment skipped")
        }
        AdjustOutcome::Unchanged {
            interval_minutes, ..
        } => tracing::info!(target: "scheduler", kind, interval = interval_minutes, "interval kept"),
        AdjustOutcome::Adjusted(rec) => tracing::info!(
            target: "scheduler",
            kind,
            old = rec.old_interval_minutes,
            new = rec.new_interval_minutes,
            "interval adjusted"
        ),
    }
}

impl Activity {
    /// Run a session and feed it to the controller. `None` when cancelled.
    async fn session_and_adjust(&self, label: &str, plan: SessionPlan) -> Option<AdjustOutcome> {
        let report = self.runner.run(label, plan, &self.cancel).await?;
        let out = self.controller.adjust(&report.stats).await;
        log_outcome(label, &out);
        Some(out)
    }
}

async fn poll_activity(ctx: Activity) {
    let every = ctx.settings.adjust_every_polls.max(1);
    loop {
        if ctx.cancel.is_cancelled() {
            break;
        }
        let started = Instant::now();
        let ts = Utc::now();
        let interval = ctx.controller.current_interval().await;
        tracing::info!(target: "scheduler", interval, "starting scheduled poll");

        let cycle = ctx.cycle.clone();
        let result = match tokio::spawn(async move { cycle.run_cycle().await }).await {
            Ok(r) => r,
            Err(e) => Err(anyhow::anyhow!("process cycle panicked: {e}")),
        };
        if let Err(e) = result {
            tracing::error!(target: "scheduler", "poll cycle failed: {e:#}");
            counter!("poller_poll_failures_total").increment(1);
            if !sleep_or_cancel(ctx.settings.poll_failure_backoff, &ctx.cancel).await {
                break;
            }
            continue;
        }

        let took = started.elapsed();
        histogram!("poller_cycle_ms").record(took.as_secs_f64() * 1000.0);
        counter!("poller_polls_total").increment(1);
        let polls = ctx.controller.record_poll().await;
        ctx.polls.push(PollEvent {
            timestamp: ts,
            duration_secs: took.as_secs_f64(),
            interval_minutes: interval,
        });

        let threshold = ctx.controller.adjustment_threshold().await;
        if polls >= threshold && polls % every == 0 {
            tracing::info!(target: "scheduler", polls, "running quick turnover analysis");
            let job = ctx.clone();
            let plan = ctx.settings.monitor.quick;
            match tokio::spawn(async move { job.session_and_adjust("quick", plan).await }).await {
                Ok(Some(_)) => {}
                Ok(None) => break,
                Err(e) => {
                    tracing::error!(target: "scheduler", "quick analysis failed: {e}");
                }
            }
        }

        let interval = ctx.controller.current_interval().await;
        let wait = minutes(u64::from(interval)).saturating_sub(started.elapsed());
        tracing::info!(
            target: "scheduler",
            polls,
            next_in_min = wait.as_secs_f64() / 60.0,
            "poll completed"
        );
        if !sleep_or_cancel(wait, &ctx.cancel).await {
            break;
        }
    }
    tracing::info!(target: "scheduler", "poll activity stopped");
}

async fn monitor_activity(ctx: Activity) {
    let mcfg = ctx.settings.monitor.clone();
    let interval = ctx.controller.current_interval().await;
    let warmup = minutes(u64::from(interval) * u64::from(mcfg.warmup_multiplier));
    if !sleep_or_cancel(warmup, &ctx.cancel).await {
        tracing::info!(target: "scheduler", "monitoring activity stopped during warm-up");
        return;
    }

    let gate = chrono::Duration::hours(mcfg.min_hours_between_adjustments as i64);
    loop {
        if ctx.cancel.is_cancelled() {
            break;
        }
        let due = match ctx.controller.last_adjustment_at().await {
            None => true,
            Some(at) => Utc::now() - at >= gate,
        };

        if due {
            tracing::info!(target: "scheduler", "running comprehensive monitoring session");
            let job = ctx.clone();
            let plan = mcfg.comprehensive;
            match tokio::spawn(async move { job.session_and_adjust("comprehensive", plan).await })
                .await
            {
                Ok(Some(_)) => {}
                Ok(None) => break,
                Err(e) => {
                    tracing::error!(target: "scheduler", "monitoring cycle failed: {e}");
                    if !sleep_or_cancel(minutes(mcfg.failure_backoff_minutes), &ctx.cancel).await {
                        break;
                    }
                    continue;
                }
            }
        }

        if !sleep_or_cancel(minutes(mcfg.recheck_hours * 60), &ctx.cancel).await {
            break;
        }
    }
    tracing::info!(target: "scheduler", "monitoring activity stopped");
}

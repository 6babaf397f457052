// src/config/poller.rs
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{env, fs, path::Path, path::PathBuf};

use crate::frequency::{Bounds, ControllerSettings};
use crate::model::Source;
use crate::monitor::SessionPlan;

pub const DEFAULT_CONFIG_PATH: &str = "config/poller.toml";
pub const ENV_CONFIG_PATH: &str = "POLLER_CONFIG_PATH";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Warm-up before the first check, as a multiple of the current interval.
    pub warmup_multiplier: u32,
    pub min_hours_between_adjustments: u64,
    pub recheck_hours: u64,
    pub failure_backoff_minutes: u64,
    /// Session run by the poll activity every few polls.
    pub quick: SessionPlan,
    /// Longer session run by the monitoring activity.
    pub comprehensive: SessionPlan,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            warmup_multiplier: 2,
            min_hours_between_adjustments: 6,
            recheck_hours: 3,
            failure_backoff_minutes: 30,
            quick: SessionPlan::QUICK,
            comprehensive: SessionPlan::COMPREHENSIVE,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollerConfig {
    pub initial_interval_minutes: u32,
    pub min_interval_minutes: u32,
    pub max_interval_minutes: u32,
    /// Polls required before the first adjustment.
    pub adjustment_threshold: u64,
    pub adjust_every_polls: u64,
    pub poll_history_len: usize,
    pub poll_failure_backoff_secs: u64,
    pub shutdown_timeout_secs: u64,
    pub resume_from_history: bool,
    pub state_dir: PathBuf,
    pub http_addr: String,
    pub sources: Vec<Source>,
    pub monitor: MonitorConfig,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            initial_interval_minutes: 60,
            min_interval_minutes: 10,
            max_interval_minutes: 240,
            adjustment_threshold: 5,
            adjust_every_polls: 4,
            poll_history_len: 5,
            poll_failure_backoff_secs: 60,
            shutdown_timeout_secs: 60,
            resume_from_history: false,
            state_dir: PathBuf::from("state"),
            http_addr: "127.0.0.1:8080".to_string(),
            sources: Source::ALL.to_vec(),
            monitor: MonitorConfig::default(),
        }
    }
}

impl PollerConfig {
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let s = fs::read_to_string(path)
            .with_context(|| format!("reading poller config from {}", path.display()))?;
        let mut cfg: PollerConfig =
            toml::from_str(&s).with_context(|| format!("parsing {}", path.display()))?;
        cfg.sanitize();
        Ok(cfg)
    }

    /// Load using env var + fallbacks, then apply env overrides:
    /// 1) $POLLER_CONFIG_PATH
    /// 2) config/poller.toml
    /// 3) built-in defaults
    ///
    /// Never fails: a broken file is logged and replaced by defaults.
    pub fn load_default() -> Self {
        let path = env::var(ENV_CONFIG_PATH)
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH));

        let mut cfg = if path.exists() {
            match Self::load_from_path(&path) {
                Ok(c) => c,
                Err(e) => {
                    tracing::warn!("poller config unusable, using defaults: {e:#}");
                    Self::default()
                }
            }
        } else {
            Self::default()
        };
        cfg.apply_env_overrides();
        cfg.sanitize();
        cfg
    }

    pub fn apply_env_overrides(&mut self) {
        if let Some(v) = env_parse("POLLER_INITIAL_INTERVAL") {
            self.initial_interval_minutes = v;
        }
        if let Some(v) = env_parse("POLLER_MIN_INTERVAL") {
            self.min_interval_minutes = v;
        }
        if let Some(v) = env_parse("POLLER_MAX_INTERVAL") {
            self.max_interval_minutes = v;
        }
        if let Some(v) = env_parse("POLLER_ADJUSTMENT_THRESHOLD") {
            self.adjustment_threshold = v;
        }
        if let Ok(v) = env::var("POLLER_STATE_DIR") {
            if !v.trim().is_empty() {
                self.state_dir = PathBuf::from(v.trim());
            }
        }
        if let Ok(v) = env::var("POLLER_HTTP_ADDR") {
            if !v.trim().is_empty() {
                self.http_addr = v.trim().to_string();
            }
        }
    }

    /// Pull every knob into a usable range.
    pub fn sanitize(&mut self) {
        let b = Bounds::new(self.min_interval_minutes, self.max_interval_minutes);
        self.min_interval_minutes = b.min;
        self.max_interval_minutes = b.max;
        self.initial_interval_minutes = b.clamp(i64::from(self.initial_interval_minutes));
        self.adjust_every_polls = self.adjust_every_polls.max(1);
        self.poll_history_len = self.poll_history_len.max(1);
        self.monitor.warmup_multiplier = self.monitor.warmup_multiplier.max(1);
        for plan in [&mut self.monitor.quick, &mut self.monitor.comprehensive] {
            plan.check_interval_minutes = plan.check_interval_minutes.max(1);
        }
        self.sources.sort();
        self.sources.dedup();
        if self.sources.is_empty() {
            self.sources = Source::ALL.to_vec();
        }
    }

    pub fn controller_settings(&self) -> ControllerSettings {
        ControllerSettings {
            initial_interval_minutes: self.initial_interval_minutes,
            min_interval_minutes: self.min_interval_minutes,
            max_interval_minutes: self.max_interval_minutes,
            adjustment_threshold: self.adjustment_threshold,
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    env::var(key).ok().and_then(|v| v.trim().parse().ok())
}

//! history.rs: bounded in-memory log of recent polls for status reporting.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::Mutex;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PollEvent {
    pub timestamp: DateTime<Utc>,
    pub duration_secs: f64,
    /// Interval in force when the poll ran.
    pub interval_minutes: u32,
}

#[derive(Debug)]
pub struct PollHistory {
    inner: Mutex<VecDeque<PollEvent>>,
    cap: usize,
}

impl PollHistory {
    pub fn with_capacity(cap: usize) -> Self {
        let cap = cap.clamp(1, 10_000);
        Self {
            inner: Mutex::new(VecDeque::with_capacity(cap)),
            cap,
        }
    }

    pub fn push(&self, ev: PollEvent) {
        let mut v = self.inner.lock().expect("history mutex poisoned");
        v.push_back(ev);
        while v.len() > self.cap {
            v.pop_front();
        }
    }

    pub fn snapshot_last_n(&self, n: usize) -> Vec<PollEvent> {
        let v = self.inner.lock().expect("history mutex poisoned");
        let start = v.len().saturating_sub(n);
        v.iter().skip(start).cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().expect("history mutex poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.cap
    }
}

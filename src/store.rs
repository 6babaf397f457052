//! # Persistence
//! Snapshot and adjustment-history storage behind one async trait.
//!
//! - `MemoryStore`: process-local, used by tests and as a fallback.
//! - `JsonFileStore`: `sessions/<id>.jsonl` (one snapshot per line) and
//!   `adjustments.json` (records + summary counters) under a state dir.
//!
//! Callers treat every error here as non-fatal.

use anyhow::{Context, Result};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tokio::{fs, io::AsyncWriteExt};

use crate::model::{AdjustmentHistory, AdjustmentRecord, SessionId, SessionMeta, Snapshot};

#[async_trait::async_trait]
pub trait Persistence: Send + Sync {
    async fn record_snapshot(&self, session: &SessionMeta, snapshot: &Snapshot) -> Result<()>;
    /// Snapshots of a session ordered by sequence number.
    async fn load_snapshots(&self, session: &SessionId) -> Result<Vec<Snapshot>>;
    async fn append_adjustment(&self, record: &AdjustmentRecord) -> Result<()>;
    /// Replace the stored history with `history`, records and counters.
    async fn save_adjustment_history(&self, history: &AdjustmentHistory) -> Result<()>;
    async fn load_adjustment_history(&self) -> Result<AdjustmentHistory>;
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    sessions: Mutex<HashMap<SessionId, Vec<Snapshot>>>,
    history: Mutex<AdjustmentHistory>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_history(history: AdjustmentHistory) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            history: Mutex::new(history),
        }
    }

    pub fn session_count(&self) -> usize {
        self.sessions.lock().expect("store mutex poisoned").len()
    }
}

#[async_trait::async_trait]
impl Persistence for MemoryStore {
    async fn record_snapshot(&self, _session: &SessionMeta, snapshot: &Snapshot) -> Result<()> {
        let mut map = self.sessions.lock().expect("store mutex poisoned");
        map.entry(snapshot.session_id.clone())
            .or_default()
            .push(snapshot.clone());
        Ok(())
    }

    async fn load_snapshots(&self, session: &SessionId) -> Result<Vec<Snapshot>> {
        let map = self.sessions.lock().expect("store mutex poisoned");
        let mut v = map.get(session).cloned().unwrap_or_default();
        v.sort_by_key(|s| s.sequence);
        Ok(v)
    }

    async fn append_adjustment(&self, record: &AdjustmentRecord) -> Result<()> {
        self.history
            .lock()
            .expect("store mutex poisoned")
            .record(record.clone());
        Ok(())
    }

    async fn save_adjustment_history(&self, history: &AdjustmentHistory) -> Result<()> {
        *self.history.lock().expect("store mutex poisoned") = history.clone();
        Ok(())
    }

    async fn load_adjustment_history(&self) -> Result<AdjustmentHistory> {
        Ok(self.history.lock().expect("store mutex poisoned").clone())
    }
}

const ADJUSTMENTS_FILE: &str = "adjustments.json";
const SESSIONS_DIR: &str = "sessions";

#[derive(Debug, Clone)]
pub struct JsonFileStore {
    root: PathBuf,
    // Serializes read-modify-write of the adjustments file within this process.
    write_lock: std::sync::Arc<tokio::sync::Mutex<()>>,
}

impl JsonFileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            write_lock: Default::default(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn session_path(&self, id: &SessionId) -> PathBuf {
        // Session ids contain ':'-free timestamps; still keep the name filesystem-safe.
        let safe: String = id
            .as_str()
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '.' { c } else { '_' })
            .collect();
        self.root.join(SESSIONS_DIR).join(format!("{safe}.jsonl"))
    }

    fn adjustments_path(&self) -> PathBuf {
        self.root.join(ADJUSTMENTS_FILE)
    }

    async fn read_history(&self) -> Result<AdjustmentHistory> {
        let path = self.adjustments_path();
        match fs::read_to_string(&path).await {
            Ok(s) => serde_json::from_str(&s)
                .with_context(|| format!("parsing adjustment history {}", path.display())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(AdjustmentHistory::default()),
            Err(e) => {
                Err(e).with_context(|| format!("reading adjustment history {}", path.display()))
            }
        }
    }

    async fn write_history(&self, history: &AdjustmentHistory) -> Result<()> {
        fs::create_dir_all(&self.root)
            .await
            .with_context(|| format!("creating state dir {}", self.root.display()))?;
        let path = self.adjustments_path();
        let tmp = path.with_extension("json.tmp");
        let body = serde_json::to_vec_pretty(history).context("encoding adjustment history")?;
        fs::write(&tmp, body)
            .await
            .with_context(|| format!("writing {}", tmp.display()))?;
        fs::rename(&tmp, &path)
            .await
            .with_context(|| format!("replacing {}", path.display()))?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl Persistence for JsonFileStore {
    async fn record_snapshot(&self, _session: &SessionMeta, snapshot: &Snapshot) -> Result<()> {
        let path = self.session_path(&snapshot.session_id);
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)
                .await
                .with_context(|| format!("creating {}", dir.display()))?;
        }
        let mut line = serde_json::to_vec(snapshot).context("encoding snapshot")?;
        line.push(b'\n');
        let mut f = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .with_context(|| format!("opening {}", path.display()))?;
        f.write_all(&line)
            .await
            .with_context(|| format!("appending to {}", path.display()))?;
        f.flush().await?;
        Ok(())
    }

    async fn load_snapshots(&self, session: &SessionId) -> Result<Vec<Snapshot>> {
        let path = self.session_path(session);
        let body = fs::read_to_string(&path)
            .await
            .with_context(|| format!("reading {}", path.display()))?;
        let mut out = Vec::new();
        for (n, line) in body.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            let snap: Snapshot = serde_json::from_str(line)
                .with_context(|| format!("{}:{}: bad snapshot line", path.display(), n + 1))?;
            out.push(snap);
        }
        out.sort_by_key(|s| s.sequence);
        Ok(out)
    }

    /// Read-modify-write of the history file. An unparsable file is
    /// replaced rather than blocking every later append.
    async fn append_adjustment(&self, record: &AdjustmentRecord) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let mut history = match self.read_history().await {
            Ok(h) => h,
            Err(e) => {
                tracing::warn!(target: "store", "discarding unreadable adjustment history: {e:#}");
                AdjustmentHistory::default()
            }
        };
        history.record(record.clone());
        self.write_history(&history).await
    }

    async fn save_adjustment_history(&self, history: &AdjustmentHistory) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        self.write_history(history).await
    }

    async fn load_adjustment_history(&self) -> Result<AdjustmentHistory> {
        self.read_history().await
    }
}

//! Engagement metrics: login counts and session minutes per user email,
//! independent of the progress ledger.
//!
//! The backing store only needs read/write-whole-value semantics under one
//! well-known key; the whole metrics map is (de)serialized as a single JSON
//! blob on every login/logout, mirroring how a browser-storage frontend
//! would keep it.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;

use chrono::{DateTime, Duration, Utc};
use tracing::{error, info, instrument};

use crate::domain::ActivityMetric;

pub const METRICS_KEY: &str = "activity_metrics";
/// A user counts as online when their last login is at most this old.
pub const ONLINE_WINDOW_MINUTES: i64 = 15;

/// Whole-value key-value storage. Failures are logged, never propagated:
/// losing a metrics write must not break a login.
pub trait BlobStore: Send + Sync {
    fn read(&self, key: &str) -> Option<String>;
    fn write(&self, key: &str, value: &str);
}

/// Default store: process-local, lost on restart.
#[derive(Default)]
pub struct MemoryStore {
    blobs: Mutex<HashMap<String, String>>,
}

impl BlobStore for MemoryStore {
    fn read(&self, key: &str) -> Option<String> {
        self.blobs.lock().expect("metrics store poisoned").get(key).cloned()
    }

    fn write(&self, key: &str, value: &str) {
        self.blobs
            .lock()
            .expect("metrics store poisoned")
            .insert(key.to_string(), value.to_string());
    }
}

/// One JSON file per key inside a directory, for persistence across runs.
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }
}

impl BlobStore for FileStore {
    fn read(&self, key: &str) -> Option<String> {
        std::fs::read_to_string(self.path_for(key)).ok()
    }

    fn write(&self, key: &str, value: &str) {
        if let Err(e) = std::fs::create_dir_all(&self.dir)
            .and_then(|_| std::fs::write(self.path_for(key), value))
        {
            error!(target: "metrics", key, error = %e, "Failed to persist metrics blob");
        }
    }
}

pub struct EngagementRecorder {
    store: Box<dyn BlobStore>,
}

impl EngagementRecorder {
    pub fn new(store: Box<dyn BlobStore>) -> Self {
        Self { store }
    }

    /// METRICS_PATH selects the file-backed store; default is in-memory.
    pub fn from_env() -> Self {
        match std::env::var("METRICS_PATH") {
            Ok(dir) => {
                info!(target: "metrics", %dir, "Using file-backed metrics store");
                Self::new(Box::new(FileStore::new(PathBuf::from(dir))))
            }
            Err(_) => Self::new(Box::new(MemoryStore::default())),
        }
    }

    fn load(&self) -> HashMap<String, ActivityMetric> {
        let Some(blob) = self.store.read(METRICS_KEY) else {
            return HashMap::new();
        };
        match serde_json::from_str(&blob) {
            Ok(map) => map,
            Err(e) => {
                error!(target: "metrics", error = %e, "Corrupt metrics blob; starting fresh");
                HashMap::new()
            }
        }
    }

    fn save(&self, metrics: &HashMap<String, ActivityMetric>) {
        match serde_json::to_string(metrics) {
            Ok(blob) => self.store.write(METRICS_KEY, &blob),
            Err(e) => error!(target: "metrics", error = %e, "Failed to serialize metrics"),
        }
    }

    /// Record a login and hand the session start back to the caller; the
    /// start time lives with the session, not in the metric record.
    #[instrument(level = "info", skip(self))]
    pub fn on_login(&self, email: &str) -> DateTime<Utc> {
        let now = Utc::now();
        let mut metrics = self.load();
        let metric = metrics
            .entry(email.to_string())
            .or_insert_with(|| ActivityMetric {
                email: email.to_string(),
                login_count: 0,
                total_minutes: 0.0,
                last_login: now,
            });
        metric.login_count += 1;
        metric.last_login = now;
        self.save(&metrics);
        now
    }

    /// Fold the session duration into the user's total. A logout without a
    /// matching record is a no-op; clock skew clamps to zero minutes.
    #[instrument(level = "info", skip(self))]
    pub fn on_logout(&self, email: &str, session_start: DateTime<Utc>) {
        let mut metrics = self.load();
        let Some(metric) = metrics.get_mut(email) else {
            return;
        };
        let elapsed_ms = (Utc::now() - session_start).num_milliseconds();
        let minutes = (elapsed_ms as f64 / 60_000.0).max(0.0);
        metric.total_minutes += minutes;
        self.save(&metrics);
    }

    pub fn all(&self) -> Vec<ActivityMetric> {
        let mut rows: Vec<_> = self.load().into_values().collect();
        rows.sort_by(|a, b| a.email.cmp(&b.email));
        rows
    }
}

/// Teacher-view "online" dot: logged in within the last 15 minutes.
pub fn is_online(metric: &ActivityMetric, now: DateTime<Utc>) -> bool {
    now - metric.last_login <= Duration::minutes(ONLINE_WINDOW_MINUTES)
}

// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Persistence of the last completed analysis
//!
//! A single slot keyed `latest`, overwritten on every save and expired after
//! a fixed age. Every operation is fail-soft: storage errors are logged and
//! the caller sees "nothing saved" or "nothing to restore".

pub mod sqlite;

use chrono::Utc;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::SessionConfig;
use crate::model::{AnalysisState, StoredSession, LATEST_SESSION_ID};
use crate::{HarvesterError, Result};

pub use sqlite::SqliteStore;

/// Narrow key-value interface over durable local storage
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>>;
    fn put(&self, key: &str, value: &str) -> Result<()>;
    fn delete(&self, key: &str) -> Result<()>;
}

/// Process-local store, used when persistence is disabled and in tests
#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, String>>> {
        self.entries
            .lock()
            .map_err(|_| HarvesterError::Storage("Memory store lock poisoned".to_string()))
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.lock()?.get(key).cloned())
    }

    fn put(&self, key: &str, value: &str) -> Result<()> {
        self.lock()?.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<()> {
        self.lock()?.remove(key);
        Ok(())
    }
}

/// Async, fail-soft wrapper around the session slot
#[derive(Clone)]
pub struct SessionStore {
    store: Arc<dyn KeyValueStore>,
    ttl: Duration,
}

impl SessionStore {
    pub fn new(store: Arc<dyn KeyValueStore>, ttl: Duration) -> Self {
        Self { store, ttl }
    }

    /// SQLite store at the configured path
    pub fn open(config: &SessionConfig) -> Result<Self> {
        let store = SqliteStore::open(&config.path)?;
        Ok(Self::new(Arc::new(store), config.ttl()))
    }

    /// Non-durable store
    pub fn in_memory(ttl: Duration) -> Self {
        Self::new(Arc::new(MemoryStore::new()), ttl)
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Persist `state`, overwriting any previous session
    pub async fn save(&self, state: &AnalysisState) {
        self.save_at(state, Utc::now().timestamp_millis()).await
    }

    /// [`save`](Self::save) with an explicit creation time (epoch ms)
    pub async fn save_at(&self, state: &AnalysisState, timestamp: i64) {
        if !state.is_persistable() {
            return;
        }

        let mut state = state.clone();
        state.is_loading = false;
        let record = StoredSession::latest(state, timestamp);
        let json = match serde_json::to_string(&record) {
            Ok(json) => json,
            Err(e) => {
                warn!("Failed to save session: {}", e);
                return;
            }
        };

        match self.run(move |store| store.put(LATEST_SESSION_ID, &json)).await {
            Ok(()) => debug!("Session saved"),
            Err(e) => warn!("Failed to save session: {}", e),
        }
    }

    /// Restore the last session if it exists and has not expired
    pub async fn load(&self) -> Option<AnalysisState> {
        self.load_at(Utc::now().timestamp_millis()).await
    }

    /// [`load`](Self::load) as of `now` (epoch ms)
    pub async fn load_at(&self, now: i64) -> Option<AnalysisState> {
        let raw = match self.run(|store| store.get(LATEST_SESSION_ID)).await {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(e) => {
                warn!("Failed to load session: {}", e);
                return None;
            }
        };

        let session: StoredSession = match serde_json::from_str(&raw) {
            Ok(session) => session,
            Err(e) => {
                warn!("Discarding unreadable session: {}", e);
                self.clear().await;
                return None;
            }
        };

        let ttl_ms = i64::try_from(self.ttl.as_millis()).unwrap_or(i64::MAX);
        let age = now.saturating_sub(session.timestamp);
        if age > ttl_ms {
            info!("Session expired ({} s old), clearing", age / 1000);
            self.clear().await;
            return None;
        }

        let mut state = session.state;
        state.is_loading = false;
        Some(state)
    }

    /// Delete the stored session, if any
    pub async fn clear(&self) {
        match self.run(|store| store.delete(LATEST_SESSION_ID)).await {
            Ok(()) => debug!("Session cleared"),
            Err(e) => warn!("Failed to clear session: {}", e),
        }
    }

    async fn run<T, F>(&self, op: F) -> Result<T>
    where
        F: FnOnce(&dyn KeyValueStore) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let store = Arc::clone(&self.store);
        tokio::task::spawn_blocking(move || op(store.as_ref()))
            .await
            .map_err(|e| HarvesterError::Storage(format!("Storage task failed: {}", e)))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{AnalysisResult, Harvestability, Part};

    const HOUR_MS: i64 = 60 * 60 * 1000;

    struct BrokenStore;

    impl KeyValueStore for BrokenStore {
        fn get(&self, _key: &str) -> Result<Option<String>> {
            Err(HarvesterError::Storage("quota exceeded".into()))
        }
        fn put(&self, _key: &str, _value: &str) -> Result<()> {
            Err(HarvesterError::Storage("quota exceeded".into()))
        }
        fn delete(&self, _key: &str) -> Result<()> {
            Err(HarvesterError::Storage("quota exceeded".into()))
        }
    }

    fn completed_state() -> AnalysisState {
        AnalysisState {
            is_loading: false,
            error: None,
            image: Some("data:image/jpeg;base64,/9j/AA==".to_string()),
            result: Some(AnalysisResult {
                device_name: "Test Router".into(),
                device_function: "Routes packets".into(),
                estimated_age: Some("Modern".into()),
                safety_warnings: vec!["Disconnect power".into()],
                parts: vec![Part {
                    name: "CPU".into(),
                    kind: "Processor".into(),
                    description: "Main SoC".into(),
                    harvestability: Harvestability::Medium,
                    project_ideas: vec!["Home automation".into()],
                    box_2d: None,
                }],
            }),
        }
    }

    fn store_pair() -> (Arc<MemoryStore>, SessionStore) {
        let backing = Arc::new(MemoryStore::new());
        let sessions = SessionStore::new(backing.clone(), Duration::from_secs(3600));
        (backing, sessions)
    }

    #[tokio::test]
    async fn round_trip_within_window() {
        let (_, sessions) = store_pair();
        let state = completed_state();
        sessions.save_at(&state, 1_000).await;
        assert_eq!(sessions.load_at(1_000 + HOUR_MS).await, Some(state));
    }

    #[tokio::test]
    async fn expired_session_is_removed() {
        let (backing, sessions) = store_pair();
        sessions.save_at(&completed_state(), 1_000).await;

        assert_eq!(sessions.load_at(1_000 + HOUR_MS + 1).await, None);
        assert_eq!(backing.get(LATEST_SESSION_ID).unwrap(), None);
    }

    #[tokio::test]
    async fn empty_state_is_not_saved() {
        let (backing, sessions) = store_pair();
        sessions.save(&AnalysisState::default()).await;
        assert_eq!(backing.get(LATEST_SESSION_ID).unwrap(), None);
    }

    #[tokio::test]
    async fn save_overwrites_single_slot() {
        let (_, sessions) = store_pair();
        let first = completed_state();
        let mut second = completed_state();
        second.result.as_mut().unwrap().device_name = "Old VCR".into();

        sessions.save(&first).await;
        sessions.save(&second).await;
        let loaded = sessions.load().await.unwrap();
        assert_eq!(loaded.result.unwrap().device_name, "Old VCR");
    }

    #[tokio::test]
    async fn stored_record_has_latest_id() {
        let (backing, sessions) = store_pair();
        sessions.save_at(&completed_state(), 42).await;
        let raw = backing.get(LATEST_SESSION_ID).unwrap().unwrap();
        let record: StoredSession = serde_json::from_str(&raw).unwrap();
        assert_eq!(record.id, "latest");
        assert_eq!(record.timestamp, 42);
    }

    #[tokio::test]
    async fn loading_flag_is_never_restored() {
        let (_, sessions) = store_pair();
        let mut state = completed_state();
        state.is_loading = true;
        sessions.save(&state).await;
        assert!(!sessions.load().await.unwrap().is_loading);
    }

    #[tokio::test]
    async fn clear_removes_session() {
        let (_, sessions) = store_pair();
        sessions.save(&completed_state()).await;
        sessions.clear().await;
        assert_eq!(sessions.load().await, None);
    }

    #[tokio::test]
    async fn corrupt_record_is_treated_as_absent() {
        let (backing, sessions) = store_pair();
        backing.put(LATEST_SESSION_ID, "{not json").unwrap();
        assert_eq!(sessions.load().await, None);
        assert_eq!(backing.get(LATEST_SESSION_ID).unwrap(), None);
    }

    #[tokio::test]
    async fn storage_failures_degrade_silently() {
        let sessions = SessionStore::new(Arc::new(BrokenStore), Duration::from_secs(3600));
        sessions.save(&completed_state()).await;
        assert_eq!(sessions.load().await, None);
        sessions.clear().await;
    }

    #[tokio::test]
    async fn sqlite_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let config = SessionConfig {
            path: dir.path().join("sessions.db").to_string_lossy().to_string(),
            ttl_secs: 3600,
        };
        let state = completed_state();
        SessionStore::open(&config).unwrap().save(&state).await;

        let reopened = SessionStore::open(&config).unwrap();
        assert_eq!(reopened.load().await, Some(state));
    }
}

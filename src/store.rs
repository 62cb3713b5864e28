// src/store.rs
//! Durable state: queue entries and the posting-window counters, persisted
//! as one JSON snapshot, written atomically (tmp + rename) and reloaded at
//! startup. Storage failure is fatal to the control loop; everything else in
//! the system degrades per-entry or per-cycle.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::fs;

use crate::policy::PostingWindowState;
use crate::queue::QueueEntry;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("state io error at {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("state (de)serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

/// Everything that must survive a restart.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PersistedState {
    pub entries: Vec<QueueEntry>,
    pub window: PostingWindowState,
}

#[derive(Debug, Clone)]
pub struct FileStore {
    path: PathBuf,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the snapshot; a missing file is a fresh start, not an error.
    pub async fn load(&self) -> Result<PersistedState, StoreError> {
        match fs::read_to_string(&self.path).await {
            Ok(raw) => Ok(serde_json::from_str(&raw)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(target: "store", path = %self.path.display(), "no prior state, starting fresh");
                Ok(PersistedState::default())
            }
            Err(e) => Err(self.io_err(e)),
        }
    }

    /// Write the snapshot atomically: serialize, write to `<path>.tmp`,
    /// rename over the old file.
    pub async fn save(&self, state: &PersistedState) -> Result<(), StoreError> {
        if let Some(dir) = self.path.parent() {
            fs::create_dir_all(dir).await.map_err(|e| self.io_err(e))?;
        }
        let raw = serde_json::to_string_pretty(state)?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, raw.as_bytes())
            .await
            .map_err(|e| self.io_err(e))?;
        fs::rename(&tmp, &self.path)
            .await
            .map_err(|e| self.io_err(e))?;
        Ok(())
    }

    fn io_err(&self, source: std::io::Error) -> StoreError {
        StoreError::Io {
            path: self.path.display().to_string(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn temp_store(tag: &str) -> FileStore {
        static SEQ: AtomicU32 = AtomicU32::new(0);
        let n = SEQ.fetch_add(1, Ordering::Relaxed);
        let path = std::env::temp_dir().join(format!(
            "trendcast-store-{}-{}-{}.json",
            tag,
            std::process::id(),
            n
        ));
        FileStore::new(path)
    }

    #[tokio::test]
    async fn missing_file_loads_as_fresh_state() {
        let store = temp_store("fresh");
        let state = store.load().await.unwrap();
        assert!(state.entries.is_empty());
        assert_eq!(state.window.posts_in_window, 0);
    }

    #[tokio::test]
    async fn save_then_load_round_trips() {
        let store = temp_store("roundtrip");
        let mut state = PersistedState::default();
        state.window.posts_in_window = 3;
        state.window.window_started_at = Some(chrono::Utc::now());
        store.save(&state).await.unwrap();

        let loaded = store.load().await.unwrap();
        assert_eq!(loaded.window.posts_in_window, 3);
        assert!(loaded.window.window_started_at.is_some());

        let _ = tokio::fs::remove_file(store.path()).await;
    }

    #[tokio::test]
    async fn save_is_atomic_no_tmp_left_behind() {
        let store = temp_store("atomic");
        store.save(&PersistedState::default()).await.unwrap();
        let tmp = store.path().with_extension("json.tmp");
        assert!(!tmp.exists());
        assert!(store.path().exists());
        let _ = tokio::fs::remove_file(store.path()).await;
    }
}

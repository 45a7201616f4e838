use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::error::DiscoveryError;
use crate::ledger::models::{EventCursor, ObjectId};

/// Persisted incremental-discovery state
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CursorState {
    /// Last creation event merged into `known_ids`
    pub cursor: Option<EventCursor>,
    /// Identifiers seen so far and not yet known to be terminal
    pub known_ids: BTreeSet<ObjectId>,
}

/// JSON file holding [`CursorState`], replaced atomically on save
#[derive(Debug, Clone)]
pub struct FileCursorStore {
    path: PathBuf,
}

impl FileCursorStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Missing file means a fresh start
    pub async fn load(&self) -> Result<CursorState, DiscoveryError> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) => serde_json::from_slice(&bytes).map_err(|e| {
                DiscoveryError::CursorStore(format!(
                    "corrupt cursor file {}: {}",
                    self.path.display(),
                    e
                ))
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No cursor file at {}, starting fresh", self.path.display());
                Ok(CursorState::default())
            }
            Err(e) => Err(DiscoveryError::CursorStore(format!(
                "failed to read {}: {}",
                self.path.display(),
                e
            ))),
        }
    }

    pub async fn save(&self, state: &CursorState) -> Result<(), DiscoveryError> {
        let bytes = serde_json::to_vec_pretty(state)
            .map_err(|e| DiscoveryError::CursorStore(e.to_string()))?;

        let tmp = self.path.with_extension("tmp");
        tokio::fs::write(&tmp, bytes)
            .await
            .map_err(|e| DiscoveryError::CursorStore(format!("failed to write {}: {}", tmp.display(), e)))?;
        tokio::fs::rename(&tmp, &self.path).await.map_err(|e| {
            DiscoveryError::CursorStore(format!("failed to replace {}: {}", self.path.display(), e))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_file_is_fresh_state() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCursorStore::new(dir.path().join("cursor.json"));
        assert_eq!(store.load().await.unwrap(), CursorState::default());
    }

    #[tokio::test]
    async fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCursorStore::new(dir.path().join("cursor.json"));

        let state = CursorState {
            cursor: Some(EventCursor {
                tx_digest: "tx9".to_string(),
                event_seq: "0".to_string(),
            }),
            known_ids: [ObjectId::new("0x1"), ObjectId::new("0x2")].into_iter().collect(),
        };
        store.save(&state).await.unwrap();

        assert_eq!(store.load().await.unwrap(), state);
        assert!(!dir.path().join("cursor.tmp").exists());
    }

    #[tokio::test]
    async fn test_corrupt_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cursor.json");
        std::fs::write(&path, b"{not json").unwrap();

        let result = FileCursorStore::new(path).load().await;
        assert!(matches!(result, Err(DiscoveryError::CursorStore(_))));
    }
}

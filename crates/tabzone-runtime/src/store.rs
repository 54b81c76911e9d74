//! JSON persistence for engine state, surviving process teardown.

use std::io::Write;
use std::path::{Path, PathBuf};

use tabzone_core::persist::{self, PersistedState};
use tabzone_core::CoreError;
use tempfile::NamedTempFile;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("state io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("state json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("state schema error: {0}")]
    Schema(#[from] CoreError),

    #[error("atomic replace failed: {0}")]
    Persist(#[from] tempfile::PersistError),
}

/// Whole-state persistence: read in full at pass start, written in full at
/// pass end.
pub trait StateStore: Send + Sync {
    fn load(&self) -> Result<PersistedState, StoreError>;
    fn save(&self, state: &PersistedState) -> Result<(), StoreError>;

    /// Move unreadable state out of the way so the next save does not
    /// replace it. Returns where it went, if anywhere.
    fn quarantine(&self) -> Result<Option<PathBuf>, StoreError> {
        Ok(None)
    }
}

/// JSON file written atomically (temp file in the same directory, then rename).
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn open(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl StateStore for JsonFileStore {
    fn load(&self) -> Result<PersistedState, StoreError> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(PersistedState::default());
            }
            Err(e) => return Err(e.into()),
        };
        let raw: serde_json::Value = serde_json::from_str(&content)?;
        let decoded = persist::decode(&raw)?;

        if decoded.source_version != tabzone_core::SCHEMA_VERSION {
            tracing::info!(
                "migrated state {} from schema v{}",
                self.path.display(),
                decoded.source_version
            );
        }
        for issue in &decoded.issues {
            tracing::warn!("dropped persisted record {}: {}", issue.key, issue.reason);
        }
        Ok(decoded.state)
    }

    fn save(&self, state: &PersistedState) -> Result<(), StoreError> {
        let dir = self
            .path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or(Path::new("."));
        std::fs::create_dir_all(dir)?;

        let mut tmp = NamedTempFile::new_in(dir)?;
        tmp.write_all(state.to_json()?.as_bytes())?;
        tmp.as_file().sync_all()?;
        tmp.persist(&self.path)?;
        Ok(())
    }

    fn quarantine(&self) -> Result<Option<PathBuf>, StoreError> {
        let mut aside = self.path.clone().into_os_string();
        aside.push(format!(".bad-{}", chrono::Utc::now().timestamp()));
        let aside = PathBuf::from(aside);
        match std::fs::rename(&self.path, &aside) {
            Ok(()) => Ok(Some(aside)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

/// In-memory store counting its saves.
#[cfg(test)]
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: std::sync::Mutex<PersistedState>,
    saves: std::sync::Mutex<usize>,
}

#[cfg(test)]
impl MemoryStore {
    pub fn new(state: PersistedState) -> Self {
        Self {
            state: std::sync::Mutex::new(state),
            saves: std::sync::Mutex::new(0),
        }
    }

    pub fn snapshot(&self) -> PersistedState {
        self.state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }

    pub fn saves(&self) -> usize {
        *self
            .saves
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

#[cfg(test)]
impl StateStore for MemoryStore {
    fn load(&self) -> Result<PersistedState, StoreError> {
        Ok(self.snapshot())
    }

    fn save(&self, state: &PersistedState) -> Result<(), StoreError> {
        *self
            .state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner) = state.clone();
        *self
            .saves
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner) += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use tabzone_core::{ItemId, ItemRecord, Status, WindowId};

    fn sample() -> PersistedState {
        let mut state = PersistedState::default();
        state.runtime_nonce = Some("42-1".into());
        state.items.insert(
            ItemId(1),
            ItemRecord {
                id: ItemId(1),
                window_id: WindowId(1),
                refreshed_activity_ms: 10,
                refreshed_at: Utc::now(),
                status: Some(Status::Fresh),
                group_id: None,
                in_state_group: false,
                pinned: false,
                url: "https://a.test/".into(),
            },
        );
        state
    }

    #[test]
    fn missing_file_loads_empty() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = JsonFileStore::open(dir.path().join("state.json"));
        assert_eq!(store.load().expect("load"), PersistedState::default());
    }

    #[test]
    fn save_then_load() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = JsonFileStore::open(dir.path().join("nested/state.json"));
        let state = sample();
        store.save(&state).expect("save");
        assert_eq!(store.load().expect("load"), state);
    }

    #[test]
    fn future_version_is_an_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("state.json");
        std::fs::write(&path, r#"{"version": 7}"#).expect("write");
        let err = JsonFileStore::open(&path).load().expect_err("refused");
        assert!(matches!(err, StoreError::Schema(_)));
    }

    #[test]
    fn garbage_is_an_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("state.json");
        std::fs::write(&path, "not json").expect("write");
        assert!(matches!(
            JsonFileStore::open(&path).load(),
            Err(StoreError::Json(_))
        ));
    }

    #[test]
    fn quarantine_moves_the_file_aside() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("state.json");
        std::fs::write(&path, "not json").expect("write");
        let store = JsonFileStore::open(&path);

        let aside = store.quarantine().expect("quarantine").expect("moved");
        assert!(!path.exists());
        assert_eq!(std::fs::read_to_string(&aside).expect("read"), "not json");
        assert!(store.quarantine().expect("nothing left").is_none());
    }

    #[test]
    fn memory_store_counts_saves() {
        let store = MemoryStore::default();
        store.save(&sample()).expect("save");
        assert_eq!(store.saves(), 1);
        assert_eq!(store.load().expect("load").items.len(), 1);
    }
}

//! Engine context: everything a pass needs, injected at construction.

use std::sync::{Arc, Mutex, PoisonError};

use tabzone_core::{ActivityClock, PersistedState};
use tabzone_host::TabHost;

use crate::collab::{EvictionSink, GroupNamer};
use crate::settings_source::SettingsProvider;
use crate::store::{StateStore, StoreError};

/// Single writer over the state store. Every read-modify-write runs under
/// one async lock.
pub struct StateCell {
    store: Arc<dyn StateStore>,
    lock: tokio::sync::Mutex<()>,
}

impl StateCell {
    pub fn new(store: Arc<dyn StateStore>) -> Self {
        Self {
            store,
            lock: tokio::sync::Mutex::new(()),
        }
    }

    /// Unreadable state is logged and treated as empty.
    fn load_or_empty(&self) -> PersistedState {
        match self.store.load() {
            Ok(state) => state,
            Err(e) => {
                tracing::warn!("persisted state unusable, starting empty: {e}");
                PersistedState::default()
            }
        }
    }

    pub async fn read(&self) -> PersistedState {
        let _lock = self.lock.lock().await;
        self.load_or_empty()
    }

    /// State to build a write on. Undecodable state is moved aside before
    /// it is replaced; an IO failure aborts the write.
    fn load_for_write(&self) -> Result<PersistedState, StoreError> {
        match self.store.load() {
            Ok(state) => Ok(state),
            Err(e @ (StoreError::Io(_) | StoreError::Persist(_))) => Err(e),
            Err(e) => {
                match self.store.quarantine()? {
                    Some(aside) => tracing::warn!(
                        "persisted state unusable ({e}), kept at {}, starting empty",
                        aside.display()
                    ),
                    None => tracing::warn!("persisted state unusable ({e}), starting empty"),
                }
                Ok(PersistedState::default())
            }
        }
    }

    /// Load, apply `f`, save.
    pub async fn update<R>(
        &self,
        f: impl FnOnce(&mut PersistedState) -> R,
    ) -> Result<R, StoreError> {
        let _lock = self.lock.lock().await;
        let mut state = self.load_for_write()?;
        let out = f(&mut state);
        self.store.save(&state)?;
        Ok(out)
    }
}

pub struct EngineContext {
    pub host: Arc<dyn TabHost>,
    pub state: StateCell,
    pub settings: Arc<dyn SettingsProvider>,
    pub eviction: Option<Arc<dyn EvictionSink>>,
    pub namer: Option<Arc<dyn GroupNamer>>,
    clock: Mutex<ActivityClock>,
    /// Identifies this process in persisted state; a different value on
    /// load means the state was written by an earlier process.
    pub nonce: String,
}

impl EngineContext {
    pub fn new(
        host: Arc<dyn TabHost>,
        store: Arc<dyn StateStore>,
        settings: Arc<dyn SettingsProvider>,
    ) -> Self {
        Self {
            host,
            state: StateCell::new(store),
            settings,
            eviction: None,
            namer: None,
            clock: Mutex::new(ActivityClock::new()),
            nonce: runtime_nonce(),
        }
    }

    pub fn with_eviction(mut self, sink: Arc<dyn EvictionSink>) -> Self {
        self.eviction = Some(sink);
        self
    }

    #[cfg(test)]
    pub fn with_namer(mut self, namer: Arc<dyn GroupNamer>) -> Self {
        self.namer = Some(namer);
        self
    }

    #[cfg(test)]
    pub fn with_nonce(mut self, nonce: impl Into<String>) -> Self {
        self.nonce = nonce.into();
        self
    }

    pub fn with_clock<R>(&self, f: impl FnOnce(&mut ActivityClock) -> R) -> R {
        let mut clock = self.clock.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut clock)
    }
}

/// PID + wall-clock nanoseconds.
pub fn runtime_nonce() -> String {
    format!(
        "{}-{}",
        std::process::id(),
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or(0)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{JsonFileStore, MemoryStore};
    use tabzone_core::ItemId;

    struct Broken;

    impl StateStore for Broken {
        fn load(&self) -> Result<PersistedState, StoreError> {
            Err(StoreError::Io(std::io::Error::other("disk gone")))
        }
        fn save(&self, _: &PersistedState) -> Result<(), StoreError> {
            Err(StoreError::Io(std::io::Error::other("disk gone")))
        }
    }

    #[tokio::test]
    async fn update_is_read_modify_write() {
        let store = Arc::new(MemoryStore::default());
        let cell = StateCell::new(store.clone());
        cell.update(|s| s.runtime_nonce = Some("a".into()))
            .await
            .expect("update");
        let seen = cell
            .update(|s| s.runtime_nonce.clone())
            .await
            .expect("update");
        assert_eq!(seen.as_deref(), Some("a"));
        assert_eq!(store.saves(), 2);
    }

    #[tokio::test]
    async fn io_failure_reads_empty_but_aborts_writes() {
        let cell = StateCell::new(Arc::new(Broken));
        assert!(cell.read().await.items.is_empty());
        assert!(matches!(
            cell.update(|s| s.items.remove(&ItemId(1))).await,
            Err(StoreError::Io(_))
        ));
    }

    #[tokio::test]
    async fn newer_schema_is_kept_aside_not_overwritten() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("state.json");
        let future = r#"{"version": 3, "items": {"1": {}}, "future_field": 42}"#;
        std::fs::write(&path, future).expect("write");
        let cell = StateCell::new(Arc::new(JsonFileStore::open(&path)));

        cell.update(|s| s.runtime_nonce = Some("x".into()))
            .await
            .expect("update");

        let kept: Vec<_> = std::fs::read_dir(dir.path())
            .expect("read dir")
            .filter_map(Result::ok)
            .map(|e| e.path())
            .filter(|p| p != &path)
            .collect();
        assert_eq!(kept.len(), 1);
        assert_eq!(std::fs::read_to_string(&kept[0]).expect("read"), future);
        let fresh = JsonFileStore::open(&path).load().expect("load");
        assert_eq!(fresh.runtime_nonce.as_deref(), Some("x"));
    }

    #[test]
    fn nonce_has_pid_prefix() {
        let nonce = runtime_nonce();
        assert!(nonce.starts_with(&format!("{}-", std::process::id())));
    }
}

use crate::domain::errors::TravisError;
use crate::domain::external_apis::host::SessionStorage;
use crate::domain::models::entity::RepoSlug;
use crate::domain::models::settings::{CiDomain, Settings, SettingsState};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::watch;

/// Id of the API this plugin registers with the host; storage keys derive from it.
pub const PLUGIN_API_ID: &str = "plugin.travisci.service";

pub fn storage_key() -> String {
    format!("{PLUGIN_API_ID}.settings")
}

/// Settings shared by every view of one mounted plugin instance.
///
/// Writes are published through a `watch` channel, so every subscriber sees a
/// save as soon as `save_settings` returns.
pub struct SettingsStore {
    state: watch::Sender<SettingsState>,
    storage: Arc<dyn SessionStorage>,
    key: String,
    rehydrate_failures: AtomicU64,
}

impl SettingsStore {
    pub fn new(storage: Arc<dyn SessionStorage>) -> Self {
        let (state, _) = watch::channel(SettingsState::default());
        Self {
            state,
            storage,
            key: storage_key(),
            rehydrate_failures: AtomicU64::new(0),
        }
    }

    pub fn get_settings(&self) -> SettingsState {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<SettingsState> {
        self.state.subscribe()
    }

    /// Persists `update`, then replaces the in-memory settings. Nothing changes
    /// in memory when the write fails.
    #[tracing::instrument(name = "SettingsStore::save_settings", skip_all, fields(owner = %update.owner, repo = %update.repo))]
    pub fn save_settings(&self, update: Settings) -> Result<(), TravisError> {
        let blob =
            serde_json::to_string(&update).map_err(|e| TravisError::Storage(e.to_string()))?;
        self.storage.set_item(&self.key, &blob)?;
        self.state.send_modify(|state| state.settings = update);
        tracing::info!("Settings saved");
        Ok(())
    }

    pub fn show_settings_dialog(&self) {
        self.state
            .send_if_modified(|state| !std::mem::replace(&mut state.show_settings_dialog, true));
    }

    pub fn hide_settings_dialog(&self) {
        self.state
            .send_if_modified(|state| std::mem::replace(&mut state.show_settings_dialog, false));
    }

    /// Restores settings from session storage. Absent or unreadable blobs are
    /// ignored; unreadable ones are logged and counted.
    pub fn rehydrate(&self) {
        let Some(blob) = self.storage.get_item(&self.key) else {
            tracing::debug!("No persisted settings under {}", self.key);
            return;
        };
        match serde_json::from_str::<Settings>(&blob) {
            Ok(stored) => {
                let changed = self.state.send_if_modified(|state| {
                    if state.settings == stored {
                        false
                    } else {
                        state.settings = stored;
                        true
                    }
                });
                if changed {
                    tracing::debug!("Settings rehydrated from session storage");
                }
            }
            Err(e) => {
                self.rehydrate_failures.fetch_add(1, Ordering::Relaxed);
                tracing::warn!("Ignoring unreadable persisted settings: {}", e);
            }
        }
    }

    pub fn rehydrate_failures(&self) -> u64 {
        self.rehydrate_failures.load(Ordering::Relaxed)
    }

    /// Repository and CI domain to poll, read from one snapshot so the two
    /// always belong to the same save.
    pub fn ready_repo(&self) -> Result<(RepoSlug, CiDomain), TravisError> {
        let state = self.state.borrow();
        Ok((state.settings.repo_slug()?, state.settings.ci_domain))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructures::adapters::secondary::host::storage::MemorySessionStorage;

    fn sample() -> Settings {
        Settings {
            owner: "RoadieHQ".into(),
            repo: "sample-service".into(),
            token: "xyz123".into(),
            ci_domain: CiDomain::TravisCiOrg,
        }
    }

    struct FailingStorage;

    impl SessionStorage for FailingStorage {
        fn get_item(&self, _key: &str) -> Option<String> {
            None
        }
        fn set_item(&self, _key: &str, _value: &str) -> Result<(), TravisError> {
            Err(TravisError::Storage("quota exceeded".into()))
        }
    }

    #[test]
    fn starts_empty_and_not_ready() {
        let store = SettingsStore::new(Arc::new(MemorySessionStorage::default()));
        assert_eq!(store.get_settings(), SettingsState::default());
        assert_eq!(store.ready_repo(), Err(TravisError::MissingCredentials));
    }

    #[test]
    fn saved_settings_are_read_back_and_persisted() {
        let storage = Arc::new(MemorySessionStorage::default());
        let store = SettingsStore::new(storage.clone());

        store.save_settings(sample()).unwrap();

        assert_eq!(store.get_settings().settings, sample());
        let blob = storage.get_item("plugin.travisci.service.settings").unwrap();
        let decoded: Settings = serde_json::from_str(&blob).unwrap();
        assert_eq!(decoded, sample());
        assert_eq!(serde_json::to_string(&decoded).unwrap(), blob);
        let (slug, ci_domain) = store.ready_repo().unwrap();
        assert_eq!(slug.to_string(), "RoadieHQ/sample-service");
        assert_eq!(ci_domain, CiDomain::TravisCiOrg);
    }

    #[test]
    fn subscribers_see_saves_immediately() {
        let store = SettingsStore::new(Arc::new(MemorySessionStorage::default()));
        let mut first = store.subscribe();
        let second = store.subscribe();

        store.save_settings(sample()).unwrap();

        assert!(first.has_changed().unwrap());
        assert_eq!(first.borrow_and_update().settings, sample());
        assert_eq!(second.borrow().settings.owner, "RoadieHQ");
    }

    #[test]
    fn failed_persist_leaves_memory_untouched() {
        let store = SettingsStore::new(Arc::new(FailingStorage));
        let err = store.save_settings(sample()).unwrap_err();
        assert!(matches!(err, TravisError::Storage(_)));
        assert_eq!(store.get_settings(), SettingsState::default());
    }

    #[test]
    fn dialog_flag_toggles_without_persisting() {
        let storage = Arc::new(MemorySessionStorage::default());
        let store = SettingsStore::new(storage.clone());

        store.show_settings_dialog();
        assert!(store.get_settings().show_settings_dialog);
        store.hide_settings_dialog();
        assert!(!store.get_settings().show_settings_dialog);
        assert!(storage.get_item(&storage_key()).is_none());
    }

    #[test]
    fn rehydrate_restores_a_previous_session() {
        let storage = Arc::new(MemorySessionStorage::default());
        SettingsStore::new(storage.clone())
            .save_settings(sample())
            .unwrap();

        let remounted = SettingsStore::new(storage);
        remounted.rehydrate();
        assert_eq!(remounted.get_settings().settings, sample());
    }

    #[test]
    fn corrupt_blob_is_ignored_but_counted() {
        let storage = Arc::new(MemorySessionStorage::default());
        storage.set_item(&storage_key(), "{not json").unwrap();

        let store = SettingsStore::new(storage);
        store.rehydrate();

        assert_eq!(store.get_settings(), SettingsState::default());
        assert_eq!(store.rehydrate_failures(), 1);
    }

    #[test]
    fn absent_blob_is_not_a_failure() {
        let store = SettingsStore::new(Arc::new(MemorySessionStorage::default()));
        store.rehydrate();
        assert_eq!(store.rehydrate_failures(), 0);
    }
}

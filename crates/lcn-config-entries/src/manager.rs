//! Config entries manager
//!
//! Keeps every host entry indexed by entry_id and host name, persists them
//! in `.storage/lcn.config_entries` and guards lifecycle transitions.

use std::sync::Arc;

use chrono::Utc;
use dashmap::DashMap;
use lcn_devices::StoreSnapshot;
use lcn_registries::{Storable, Storage, StorageError, StorageResult};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, info};

use crate::entry::{ConfigEntry, ConfigEntryState, ConfigEntryUpdate};
use crate::state_machine::InvalidTransition;

/// Storage key for config entries
pub const STORAGE_KEY: &str = "lcn.config_entries";
/// Current storage version
pub const STORAGE_VERSION: u32 = 1;
/// Current minor version
pub const STORAGE_MINOR_VERSION: u32 = 1;

#[derive(Debug, Error)]
pub enum ConfigEntriesError {
    #[error("Entry not found: {0}")]
    NotFound(String),

    #[error("Entry already exists for host {0}")]
    AlreadyExists(String),

    #[error("Cannot unload entry in state {0:?}")]
    CannotUnload(ConfigEntryState),

    #[error(transparent)]
    InvalidTransition(#[from] InvalidTransition),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

pub type ConfigEntriesResult<T> = Result<T, ConfigEntriesError>;

/// Config entries data for storage
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConfigEntriesData {
    pub entries: Vec<ConfigEntry>,
}

impl Storable for ConfigEntriesData {
    const KEY: &'static str = STORAGE_KEY;
    const VERSION: u32 = STORAGE_VERSION;
    const MINOR_VERSION: u32 = STORAGE_MINOR_VERSION;
}

pub struct ConfigEntries {
    storage: Arc<Storage>,

    /// Primary index: entry_id -> ConfigEntry
    entries: DashMap<String, ConfigEntry>,

    /// Index: host name -> entry_id
    by_host: DashMap<String, String>,

    /// Serializes setup and unload
    setup_lock: Mutex<()>,
}

impl ConfigEntries {
    pub fn new(storage: Arc<Storage>) -> Self {
        Self {
            storage,
            entries: DashMap::new(),
            by_host: DashMap::new(),
            setup_lock: Mutex::new(()),
        }
    }

    pub async fn load(&self) -> StorageResult<()> {
        if let Some(data) = self.storage.load_data::<ConfigEntriesData>().await? {
            info!("Loading {} config entries from storage", data.entries.len());
            for entry in data.entries {
                self.index_entry(entry);
            }
        }
        Ok(())
    }

    pub async fn save(&self) -> StorageResult<()> {
        let data = ConfigEntriesData {
            entries: self.iter(),
        };
        self.storage.save(&data.to_storage_file()).await?;
        debug!("Saved {} config entries to storage", data.entries.len());
        Ok(())
    }

    fn index_entry(&self, entry: ConfigEntry) {
        self.by_host
            .insert(entry.unique_id.clone(), entry.entry_id.clone());
        self.entries.insert(entry.entry_id.clone(), entry);
    }

    fn unindex_entry(&self, entry: &ConfigEntry) {
        self.by_host.remove(&entry.unique_id);
        self.entries.remove(&entry.entry_id);
    }

    pub fn get(&self, entry_id: &str) -> Option<ConfigEntry> {
        self.entries.get(entry_id).map(|r| r.value().clone())
    }

    pub fn get_by_host(&self, host_name: &str) -> Option<ConfigEntry> {
        let entry_id = self.by_host.get(host_name).map(|r| r.value().clone())?;
        self.get(&entry_id)
    }

    pub async fn add(&self, entry: ConfigEntry) -> ConfigEntriesResult<ConfigEntry> {
        if self.by_host.contains_key(&entry.unique_id) {
            return Err(ConfigEntriesError::AlreadyExists(entry.unique_id));
        }

        self.index_entry(entry.clone());
        self.save().await?;

        info!("Added config entry: {} [{}]", entry.title, entry.entry_id);
        Ok(entry)
    }

    /// Apply an update; runtime state is kept, the host name is not changed
    pub async fn update(
        &self,
        entry_id: &str,
        update: ConfigEntryUpdate,
    ) -> ConfigEntriesResult<ConfigEntry> {
        let updated = {
            let mut entry = self
                .entries
                .get_mut(entry_id)
                .ok_or_else(|| ConfigEntriesError::NotFound(entry_id.to_string()))?;

            if let Some(title) = update.title {
                entry.title = title;
            }
            if let Some(mut connection) = update.connection {
                connection.name = entry.unique_id.clone();
                entry.data.connection = connection;
            }
            if let Some(store) = update.store {
                entry.data.store = store;
            }
            entry.modified_at = Utc::now();
            entry.clone()
        };

        self.save().await?;
        debug!("Updated config entry: {}", entry_id);
        Ok(updated)
    }

    /// Replace the device and entity lists of an entry
    pub async fn update_store(
        &self,
        entry_id: &str,
        store: StoreSnapshot,
    ) -> ConfigEntriesResult<ConfigEntry> {
        self.update(entry_id, ConfigEntryUpdate::new().store(store))
            .await
    }

    pub async fn remove(&self, entry_id: &str) -> ConfigEntriesResult<ConfigEntry> {
        let entry = self
            .get(entry_id)
            .ok_or_else(|| ConfigEntriesError::NotFound(entry_id.to_string()))?;

        self.unindex_entry(&entry);
        self.save().await?;

        info!("Removed config entry: {} [{}]", entry.title, entry_id);
        Ok(entry)
    }

    /// Move an entry to `state`, rejecting transitions the lifecycle forbids
    pub fn set_state(
        &self,
        entry_id: &str,
        state: ConfigEntryState,
        reason: Option<String>,
    ) -> ConfigEntriesResult<()> {
        let mut entry = self
            .entries
            .get_mut(entry_id)
            .ok_or_else(|| ConfigEntriesError::NotFound(entry_id.to_string()))?;
        entry.try_set_state(state, reason)?;
        debug!("Entry {} state changed to {:?}", entry_id, state);
        Ok(())
    }

    /// Hold while setting up or unloading an entry
    pub async fn setup_lock(&self) -> MutexGuard<'_, ()> {
        self.setup_lock.lock().await
    }

    pub fn entry_ids(&self) -> Vec<String> {
        self.entries.iter().map(|r| r.key().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// All entries ordered by title
    pub fn iter(&self) -> Vec<ConfigEntry> {
        let mut entries: Vec<ConfigEntry> =
            self.entries.iter().map(|r| r.value().clone()).collect();
        entries.sort_by(|a, b| a.title.cmp(&b.title));
        entries
    }
}

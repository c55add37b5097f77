//! Device Registry
//!
//! Tracks registered devices by internal id, identifier, config entry and
//! parent device.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::storage::{Storable, Storage, StorageResult};

/// Storage key for device registry
pub const STORAGE_KEY: &str = "core.device_registry";
/// Current storage version
pub const STORAGE_VERSION: u32 = 1;
/// Current minor version
pub const STORAGE_MINOR_VERSION: u32 = 1;

/// A device identifier (domain, id) pair
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeviceIdentifier(pub String, pub String);

impl DeviceIdentifier {
    pub fn new(domain: impl Into<String>, id: impl Into<String>) -> Self {
        Self(domain.into(), id.into())
    }

    pub fn domain(&self) -> &str {
        &self.0
    }

    pub fn id(&self) -> &str {
        &self.1
    }

    /// Create a key for indexing
    pub fn key(&self) -> String {
        format!("{}:{}", self.0, self.1)
    }
}

/// A registered device entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceEntry {
    /// Internal UUID
    pub id: String,

    /// Unique identifiers by domain (e.g., [["lcn", "3f2a..."]])
    #[serde(default)]
    pub identifiers: Vec<DeviceIdentifier>,

    /// Associated config entries
    #[serde(default)]
    pub config_entries: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manufacturer: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hw_version: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sw_version: Option<String>,

    /// Parent device (entity devices hang below their module)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub via_device_id: Option<String>,

    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,

    #[serde(default = "Utc::now")]
    pub modified_at: DateTime<Utc>,
}

impl DeviceEntry {
    pub fn new(name: Option<&str>) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().simple().to_string(),
            identifiers: Vec::new(),
            config_entries: Vec::new(),
            name: name.map(|s| s.to_string()),
            manufacturer: None,
            model: None,
            hw_version: None,
            sw_version: None,
            via_device_id: None,
            created_at: now,
            modified_at: now,
        }
    }

    pub fn has_identifier(&self, domain: &str, id: &str) -> bool {
        self.identifiers
            .iter()
            .any(|i| i.domain() == domain && i.id() == id)
    }
}

/// Device registry data for storage
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeviceRegistryData {
    pub devices: Vec<DeviceEntry>,
}

impl Storable for DeviceRegistryData {
    const KEY: &'static str = STORAGE_KEY;
    const VERSION: u32 = STORAGE_VERSION;
    const MINOR_VERSION: u32 = STORAGE_MINOR_VERSION;
}

/// Device Registry with multi-index support
///
/// Entries are stored as `Arc<DeviceEntry>` to avoid cloning on reads.
pub struct DeviceRegistry {
    storage: Arc<Storage>,

    /// Primary index: device_id -> DeviceEntry
    by_id: DashMap<String, Arc<DeviceEntry>>,

    /// Index: identifier key -> device_id
    by_identifier: DashMap<String, String>,

    /// Index: config_entry_id -> set of device_ids
    by_config_entry_id: DashMap<String, HashSet<String>>,

    /// Index: via_device_id -> set of device_ids (child devices)
    by_via_device_id: DashMap<String, HashSet<String>>,
}

impl DeviceRegistry {
    pub fn new(storage: Arc<Storage>) -> Self {
        Self {
            storage,
            by_id: DashMap::new(),
            by_identifier: DashMap::new(),
            by_config_entry_id: DashMap::new(),
            by_via_device_id: DashMap::new(),
        }
    }

    /// Load from storage
    pub async fn load(&self) -> StorageResult<()> {
        if let Some(data) = self.storage.load_data::<DeviceRegistryData>().await? {
            info!("Loading {} devices from storage", data.devices.len());
            for entry in data.devices {
                self.index_entry(Arc::new(entry));
            }
        }
        Ok(())
    }

    /// Save to storage
    pub async fn save(&self) -> StorageResult<()> {
        let mut devices: Vec<DeviceEntry> =
            self.by_id.iter().map(|r| (**r.value()).clone()).collect();
        devices.sort_by_key(|d| d.created_at);

        let data = DeviceRegistryData { devices };
        self.storage.save(&data.to_storage_file()).await?;
        debug!("Saved {} devices to storage", self.by_id.len());
        Ok(())
    }

    fn index_entry(&self, entry: Arc<DeviceEntry>) {
        let device_id = entry.id.clone();

        for identifier in &entry.identifiers {
            self.by_identifier
                .insert(identifier.key(), device_id.clone());
        }

        for config_entry_id in &entry.config_entries {
            self.by_config_entry_id
                .entry(config_entry_id.clone())
                .or_default()
                .insert(device_id.clone());
        }

        if let Some(ref via_device_id) = entry.via_device_id {
            self.by_via_device_id
                .entry(via_device_id.clone())
                .or_default()
                .insert(device_id.clone());
        }

        self.by_id.insert(device_id, entry);
    }

    /// Remove an entry from the secondary indexes
    fn unindex_entry(&self, entry: &DeviceEntry) {
        let device_id = &entry.id;

        for identifier in &entry.identifiers {
            self.by_identifier.remove(&identifier.key());
        }

        for config_entry_id in &entry.config_entries {
            if let Some(mut ids) = self.by_config_entry_id.get_mut(config_entry_id) {
                ids.remove(device_id);
            }
        }

        if let Some(ref via_device_id) = entry.via_device_id {
            if let Some(mut ids) = self.by_via_device_id.get_mut(via_device_id) {
                ids.remove(device_id);
            }
        }
    }

    pub fn get(&self, device_id: &str) -> Option<Arc<DeviceEntry>> {
        self.by_id.get(device_id).map(|r| Arc::clone(r.value()))
    }

    pub fn get_by_identifier(&self, domain: &str, id: &str) -> Option<Arc<DeviceEntry>> {
        let key = format!("{}:{}", domain, id);
        self.by_identifier
            .get(&key)
            .map(|r| r.value().clone())
            .and_then(|device_id| self.get(&device_id))
    }

    pub fn get_by_config_entry_id(&self, config_entry_id: &str) -> Vec<Arc<DeviceEntry>> {
        let ids: Vec<String> = self
            .by_config_entry_id
            .get(config_entry_id)
            .map(|ids| ids.iter().cloned().collect())
            .unwrap_or_default();
        ids.iter().filter_map(|id| self.get(id)).collect()
    }

    /// Devices connected via `device_id`
    pub fn get_children(&self, device_id: &str) -> Vec<Arc<DeviceEntry>> {
        let ids: Vec<String> = self
            .by_via_device_id
            .get(device_id)
            .map(|ids| ids.iter().cloned().collect())
            .unwrap_or_default();
        ids.iter().filter_map(|id| self.get(id)).collect()
    }

    /// Get or create a device
    ///
    /// Looks up by identifiers; a found device gets the config entry and any
    /// missing identifiers merged in. Name and metadata are left to
    /// [`update`](Self::update).
    pub fn get_or_create(
        &self,
        identifiers: &[DeviceIdentifier],
        config_entry_id: Option<&str>,
        name: Option<&str>,
    ) -> Arc<DeviceEntry> {
        let existing = identifiers
            .iter()
            .find_map(|i| self.get_by_identifier(i.domain(), i.id()));

        if let Some(existing) = existing {
            let needs_entry = config_entry_id
                .map(|ce| !existing.config_entries.iter().any(|e| e == ce))
                .unwrap_or(false);
            let missing: Vec<DeviceIdentifier> = identifiers
                .iter()
                .filter(|i| !existing.identifiers.contains(i))
                .cloned()
                .collect();

            if !needs_entry && missing.is_empty() {
                return existing;
            }

            debug!("Merging into existing device {}", existing.id);
            return self
                .update(&existing.id, |e| {
                    if let Some(ce) = config_entry_id {
                        if needs_entry {
                            e.config_entries.push(ce.to_string());
                        }
                    }
                    e.identifiers.extend(missing);
                })
                .unwrap_or(existing);
        }

        let mut entry = DeviceEntry::new(name);
        entry.identifiers = identifiers.to_vec();
        if let Some(config_id) = config_entry_id {
            entry.config_entries.push(config_id.to_string());
        }

        let arc_entry = Arc::new(entry);
        self.index_entry(Arc::clone(&arc_entry));
        info!("Registered new device: {:?} ({})", name, arc_entry.id);
        arc_entry
    }

    /// Update a device entry
    ///
    /// `modified_at` is bumped only when the closure changed something.
    pub fn update<F>(&self, device_id: &str, f: F) -> Option<Arc<DeviceEntry>>
    where
        F: FnOnce(&mut DeviceEntry),
    {
        // Remove first so no shard lock is held while re-indexing
        let (_, arc_entry) = self.by_id.remove(device_id)?;
        self.unindex_entry(&arc_entry);

        let old = (*arc_entry).clone();
        let mut entry = old.clone();
        f(&mut entry);

        let changed = old.identifiers != entry.identifiers
            || old.config_entries != entry.config_entries
            || old.name != entry.name
            || old.manufacturer != entry.manufacturer
            || old.model != entry.model
            || old.hw_version != entry.hw_version
            || old.sw_version != entry.sw_version
            || old.via_device_id != entry.via_device_id;
        if changed {
            entry.modified_at = Utc::now();
        }

        let new_arc = Arc::new(entry);
        self.index_entry(Arc::clone(&new_arc));
        Some(new_arc)
    }

    /// Remove a device; children keep existing with `via_device_id` cleared
    pub fn remove(&self, device_id: &str) -> Option<Arc<DeviceEntry>> {
        let (_, arc_entry) = self.by_id.remove(device_id)?;
        self.unindex_entry(&arc_entry);

        for child in self.get_children(device_id) {
            self.update(&child.id, |e| e.via_device_id = None);
        }
        self.by_via_device_id.remove(device_id);

        info!("Removed device: {}", device_id);
        Some(arc_entry)
    }

    /// Detach a config entry from all devices, removing devices left without one.
    ///
    /// Returns the ids of removed devices.
    pub fn clear_config_entry(&self, config_entry_id: &str) -> Vec<String> {
        let mut removed = Vec::new();

        for device in self.get_by_config_entry_id(config_entry_id) {
            if device.config_entries.len() <= 1 {
                self.remove(&device.id);
                removed.push(device.id.clone());
            } else {
                self.update(&device.id, |e| {
                    e.config_entries.retain(|id| id != config_entry_id);
                });
            }
        }

        removed
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = Arc<DeviceEntry>> + '_ {
        self.by_id.iter().map(|r| Arc::clone(r.value()))
    }
}

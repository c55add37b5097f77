//! Entity Registry
//!
//! Tracks registered entities with unique_id tracking and device linking.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::storage::{Storable, Storage, StorageResult};

/// Errors that can occur in the entity registry
#[derive(Debug, Error, Clone)]
pub enum EntityRegistryError {
    #[error("Entity not found: {0}")]
    NotFound(String),
}

/// Storage key for entity registry
pub const STORAGE_KEY: &str = "core.entity_registry";
/// Current storage version
pub const STORAGE_VERSION: u32 = 1;
/// Current minor version
pub const STORAGE_MINOR_VERSION: u32 = 1;

/// A registered entity entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityEntry {
    /// Internal id
    pub id: String,
    /// Full entity ID (domain.object_id)
    pub entity_id: String,
    /// Platform-specific unique identifier
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unique_id: Option<String>,
    /// Integration that provides this entity
    pub platform: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config_entry_id: Option<String>,
    /// User-set name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Name the integration suggested
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_name: Option<String>,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    #[serde(default = "Utc::now")]
    pub modified_at: DateTime<Utc>,
}

impl EntityEntry {
    pub fn new(
        entity_id: impl Into<String>,
        platform: impl Into<String>,
        unique_id: Option<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: ulid::Ulid::new().to_string().to_lowercase(),
            entity_id: entity_id.into(),
            unique_id,
            platform: platform.into(),
            device_id: None,
            config_entry_id: None,
            name: None,
            original_name: None,
            created_at: now,
            modified_at: now,
        }
    }

    /// Domain part of the entity_id
    pub fn domain(&self) -> &str {
        self.entity_id.split('.').next().unwrap_or(&self.entity_id)
    }
}

/// Entity registry data for storage
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EntityRegistryData {
    pub entities: Vec<EntityEntry>,
}

impl Storable for EntityRegistryData {
    const KEY: &'static str = STORAGE_KEY;
    const VERSION: u32 = STORAGE_VERSION;
    const MINOR_VERSION: u32 = STORAGE_MINOR_VERSION;
}

/// Entity Registry
///
/// Lookups by entity_id (primary), unique_id, device_id and config entry.
pub struct EntityRegistry {
    storage: Arc<Storage>,

    /// Primary index: entity_id -> EntityEntry
    by_entity_id: DashMap<String, Arc<EntityEntry>>,

    /// Index: (platform, unique_id) -> entity_id
    by_unique_id: DashMap<(String, String), String>,

    /// Index: device_id -> set of entity_ids
    by_device_id: DashMap<String, HashSet<String>>,

    /// Index: config_entry_id -> set of entity_ids
    by_config_entry_id: DashMap<String, HashSet<String>>,
}

impl EntityRegistry {
    pub fn new(storage: Arc<Storage>) -> Self {
        Self {
            storage,
            by_entity_id: DashMap::new(),
            by_unique_id: DashMap::new(),
            by_device_id: DashMap::new(),
            by_config_entry_id: DashMap::new(),
        }
    }

    /// Load from storage
    pub async fn load(&self) -> StorageResult<()> {
        if let Some(data) = self.storage.load_data::<EntityRegistryData>().await? {
            info!("Loading {} entities from storage", data.entities.len());
            for entry in data.entities {
                self.index_entry(Arc::new(entry));
            }
        }
        Ok(())
    }

    /// Save to storage
    pub async fn save(&self) -> StorageResult<()> {
        let mut entities: Vec<EntityEntry> = self
            .by_entity_id
            .iter()
            .map(|r| (**r.value()).clone())
            .collect();
        entities.sort_by(|a, b| a.entity_id.cmp(&b.entity_id));

        let data = EntityRegistryData { entities };
        self.storage.save(&data.to_storage_file()).await?;
        debug!("Saved {} entities to storage", self.by_entity_id.len());
        Ok(())
    }

    fn index_entry(&self, entry: Arc<EntityEntry>) {
        let entity_id = entry.entity_id.clone();

        if let Some(ref unique_id) = entry.unique_id {
            self.by_unique_id
                .insert((entry.platform.clone(), unique_id.clone()), entity_id.clone());
        }

        if let Some(ref device_id) = entry.device_id {
            self.by_device_id
                .entry(device_id.clone())
                .or_default()
                .insert(entity_id.clone());
        }

        if let Some(ref config_entry_id) = entry.config_entry_id {
            self.by_config_entry_id
                .entry(config_entry_id.clone())
                .or_default()
                .insert(entity_id.clone());
        }

        self.by_entity_id.insert(entity_id, entry);
    }

    fn unindex_entry(&self, entry: &EntityEntry) {
        let entity_id = &entry.entity_id;

        if let Some(ref unique_id) = entry.unique_id {
            self.by_unique_id
                .remove(&(entry.platform.clone(), unique_id.clone()));
        }

        if let Some(ref device_id) = entry.device_id {
            if let Some(mut ids) = self.by_device_id.get_mut(device_id) {
                ids.remove(entity_id);
            }
        }

        if let Some(ref config_entry_id) = entry.config_entry_id {
            if let Some(mut ids) = self.by_config_entry_id.get_mut(config_entry_id) {
                ids.remove(entity_id);
            }
        }
    }

    pub fn get(&self, entity_id: &str) -> Option<Arc<EntityEntry>> {
        self.by_entity_id.get(entity_id).map(|r| Arc::clone(r.value()))
    }

    pub fn get_by_unique_id(&self, platform: &str, unique_id: &str) -> Option<Arc<EntityEntry>> {
        let entity_id = self
            .by_unique_id
            .get(&(platform.to_string(), unique_id.to_string()))
            .map(|r| r.value().clone())?;
        self.get(&entity_id)
    }

    pub fn get_by_device_id(&self, device_id: &str) -> Vec<Arc<EntityEntry>> {
        let ids: Vec<String> = self
            .by_device_id
            .get(device_id)
            .map(|ids| ids.iter().cloned().collect())
            .unwrap_or_default();
        ids.iter().filter_map(|id| self.get(id)).collect()
    }

    pub fn get_by_config_entry_id(&self, config_entry_id: &str) -> Vec<Arc<EntityEntry>> {
        let ids: Vec<String> = self
            .by_config_entry_id
            .get(config_entry_id)
            .map(|ids| ids.iter().cloned().collect())
            .unwrap_or_default();
        ids.iter().filter_map(|id| self.get(id)).collect()
    }

    /// Get or create an entity entry
    ///
    /// An existing entry with the same `(platform, unique_id)` is returned
    /// unchanged. New entries get an entity_id derived from `domain` and
    /// `suggested_object_id`, suffixed when taken.
    pub fn get_or_create(
        &self,
        domain: &str,
        platform: &str,
        unique_id: &str,
        suggested_object_id: &str,
        config_entry_id: Option<&str>,
        device_id: Option<&str>,
    ) -> Arc<EntityEntry> {
        if let Some(existing) = self.get_by_unique_id(platform, unique_id) {
            debug!("Found existing entity by unique_id: {}", existing.entity_id);
            return existing;
        }

        let entity_id = self.generate_entity_id(domain, suggested_object_id);
        let mut entry = EntityEntry::new(&entity_id, platform, Some(unique_id.to_string()));
        entry.config_entry_id = config_entry_id.map(String::from);
        entry.device_id = device_id.map(String::from);

        let arc_entry = Arc::new(entry);
        self.index_entry(Arc::clone(&arc_entry));
        info!("Registered new entity: {}", entity_id);
        arc_entry
    }

    /// Update an entity entry
    pub fn update<F>(&self, entity_id: &str, f: F) -> Result<Arc<EntityEntry>, EntityRegistryError>
    where
        F: FnOnce(&mut EntityEntry),
    {
        let (_, arc_entry) = self
            .by_entity_id
            .remove(entity_id)
            .ok_or_else(|| EntityRegistryError::NotFound(entity_id.to_string()))?;
        self.unindex_entry(&arc_entry);

        let mut entry = (*arc_entry).clone();
        f(&mut entry);
        entry.modified_at = Utc::now();

        let new_arc = Arc::new(entry);
        self.index_entry(Arc::clone(&new_arc));
        Ok(new_arc)
    }

    pub fn remove(&self, entity_id: &str) -> Option<Arc<EntityEntry>> {
        let (_, arc_entry) = self.by_entity_id.remove(entity_id)?;
        self.unindex_entry(&arc_entry);
        info!("Removed entity: {}", entity_id);
        Some(arc_entry)
    }

    /// Remove every entity attached to `device_id`, returning their entity_ids
    pub fn remove_for_device(&self, device_id: &str) -> Vec<String> {
        let removed: Vec<String> = self
            .get_by_device_id(device_id)
            .into_iter()
            .filter_map(|e| self.remove(&e.entity_id))
            .map(|e| e.entity_id.clone())
            .collect();
        self.by_device_id.remove(device_id);
        removed
    }

    pub fn is_registered(&self, entity_id: &str) -> bool {
        self.by_entity_id.contains_key(entity_id)
    }

    /// Pick a free `{domain}.{object_id}`, appending `_2`, `_3`, ... when taken
    pub fn generate_entity_id(&self, domain: &str, suggested_object_id: &str) -> String {
        let object_id = slugify(suggested_object_id);
        let preferred = format!("{}.{}", domain, object_id);
        if !self.is_registered(&preferred) {
            return preferred;
        }

        (2..)
            .map(|n| format!("{}_{}", preferred, n))
            .find(|candidate| !self.is_registered(candidate))
            .unwrap_or(preferred)
    }

    pub fn len(&self) -> usize {
        self.by_entity_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_entity_id.is_empty()
    }

    pub fn iter(&self) -> Vec<Arc<EntityEntry>> {
        self.by_entity_id.iter().map(|r| Arc::clone(r.value())).collect()
    }
}

/// Lower-case, underscore-separated object id
fn slugify(text: &str) -> String {
    let mut slug = String::with_capacity(text.len());
    for c in text.chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
        } else if !slug.ends_with('_') {
            slug.push('_');
        }
    }
    let slug = slug.trim_matches('_');
    if slug.is_empty() {
        "unnamed".to_string()
    } else {
        slug.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn registry() -> (TempDir, EntityRegistry) {
        let temp_dir = TempDir::new().unwrap();
        let storage = Arc::new(Storage::new(temp_dir.path()));
        (temp_dir, EntityRegistry::new(storage))
    }

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("Kitchen Output 1"), "kitchen_output_1");
        assert_eq!(slugify("--Relay--"), "relay");
        assert_eq!(slugify("!!!"), "unnamed");
    }

    #[test]
    fn test_get_or_create_by_unique_id() {
        let (_dir, registry) = registry();

        let first = registry.get_or_create("light", "lcn", "u1", "Kitchen", Some("e1"), Some("d1"));
        let again = registry.get_or_create("light", "lcn", "u1", "Other", Some("e1"), Some("d1"));

        assert_eq!(first.entity_id, "light.kitchen");
        assert_eq!(again.entity_id, first.entity_id);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_entity_id_conflicts_get_suffix() {
        let (_dir, registry) = registry();

        let a = registry.get_or_create("light", "lcn", "u1", "Kitchen", None, None);
        let b = registry.get_or_create("light", "lcn", "u2", "Kitchen", None, None);
        let c = registry.get_or_create("light", "lcn", "u3", "Kitchen", None, None);

        assert_eq!(a.entity_id, "light.kitchen");
        assert_eq!(b.entity_id, "light.kitchen_2");
        assert_eq!(c.entity_id, "light.kitchen_3");
    }

    #[test]
    fn test_remove_for_device() {
        let (_dir, registry) = registry();
        registry.get_or_create("light", "lcn", "u1", "a", None, Some("d1"));
        registry.get_or_create("switch", "lcn", "u2", "b", None, Some("d1"));
        registry.get_or_create("switch", "lcn", "u3", "c", None, Some("d2"));

        let mut removed = registry.remove_for_device("d1");
        removed.sort();

        assert_eq!(removed, vec!["light.a", "switch.b"]);
        assert_eq!(registry.len(), 1);
        assert!(registry.get_by_unique_id("lcn", "u1").is_none());
    }

    #[test]
    fn test_update_reindexes_device() {
        let (_dir, registry) = registry();
        let entry = registry.get_or_create("light", "lcn", "u1", "a", None, Some("d1"));

        registry
            .update(&entry.entity_id, |e| e.device_id = Some("d2".to_string()))
            .unwrap();

        assert!(registry.get_by_device_id("d1").is_empty());
        assert_eq!(registry.get_by_device_id("d2").len(), 1);
        assert!(matches!(
            registry.update("light.missing", |_| {}),
            Err(EntityRegistryError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_save_and_load() {
        let temp_dir = TempDir::new().unwrap();
        let storage = Arc::new(Storage::new(temp_dir.path()));

        let registry = EntityRegistry::new(storage.clone());
        registry.get_or_create("light", "lcn", "u1", "Kitchen", Some("e1"), Some("d1"));
        registry.save().await.unwrap();

        let loaded = EntityRegistry::new(storage);
        loaded.load().await.unwrap();
        assert_eq!(loaded.get_by_config_entry_id("e1").len(), 1);
        assert_eq!(loaded.get_by_device_id("d1").len(), 1);
    }
}

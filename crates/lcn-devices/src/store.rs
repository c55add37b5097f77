//! Per-host device and entity lists
//!
//! All access goes through one async mutex. Mutators hold it for their
//! whole unit of work; readers get sorted clones taken under it.

use std::sync::atomic::{AtomicBool, Ordering};

use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, info, warn};

use crate::error::{StoreError, StoreResult};
use crate::records::{sort_devices, sort_entities, DeviceRecord, EntityRecord};

/// Owned copy of a store's lists, as persisted in the host's config entry
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StoreSnapshot {
    #[serde(default)]
    pub devices: Vec<DeviceRecord>,
    #[serde(default)]
    pub entities: Vec<EntityRecord>,
}

pub(crate) struct StoreInner {
    pub(crate) devices: Vec<DeviceRecord>,
    pub(crate) entities: Vec<EntityRecord>,
    pub(crate) closed: bool,
}

impl StoreInner {
    pub(crate) fn device_position(&self, unique_id: &str) -> Option<usize> {
        self.devices.iter().position(|d| d.unique_id == unique_id)
    }

    pub(crate) fn entity_position(&self, unique_id: &str) -> Option<usize> {
        self.entities.iter().position(|e| e.unique_id == unique_id)
    }

    pub(crate) fn device_by_key(&mut self, key: (u8, u8, bool)) -> Option<&mut DeviceRecord> {
        self.devices.iter_mut().find(|d| d.identity_key() == key)
    }
}

/// Device and entity lists of one connection host
pub struct ConfigStore {
    host: String,
    inner: Mutex<StoreInner>,
    dirty: AtomicBool,
}

impl ConfigStore {
    pub fn new(host: impl Into<String>) -> Self {
        Self::from_snapshot(host, StoreSnapshot::default())
    }

    /// Store seeded from persisted lists; both are re-sorted.
    ///
    /// Entities whose device is missing are dropped and the store is
    /// marked dirty so the cleaned lists get written back.
    pub fn from_snapshot(host: impl Into<String>, snapshot: StoreSnapshot) -> Self {
        let host = host.into();
        let StoreSnapshot {
            mut devices,
            mut entities,
        } = snapshot;
        sort_devices(&mut devices);

        let loaded = entities.len();
        entities.retain(|entity| {
            let known = devices
                .iter()
                .any(|d| d.unique_id == entity.unique_device_id);
            if !known {
                warn!(
                    "{}: dropping entity {} of unknown device {}",
                    host, entity.unique_id, entity.unique_device_id
                );
            }
            known
        });
        sort_entities(&mut entities);
        let dirty = loaded != entities.len();

        Self {
            host,
            inner: Mutex::new(StoreInner {
                devices,
                entities,
                closed: false,
            }),
            dirty: AtomicBool::new(dirty),
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub(crate) async fn guard(&self) -> MutexGuard<'_, StoreInner> {
        self.inner.lock().await
    }

    /// Guard for a mutation, failing once the store is closed
    pub(crate) async fn guard_open(&self) -> StoreResult<MutexGuard<'_, StoreInner>> {
        let inner = self.inner.lock().await;
        if inner.closed {
            return Err(StoreError::StoreClosed(self.host.clone()));
        }
        Ok(inner)
    }

    pub(crate) fn closed_error(&self) -> StoreError {
        StoreError::StoreClosed(self.host.clone())
    }

    pub async fn devices(&self) -> Vec<DeviceRecord> {
        self.guard().await.devices.clone()
    }

    pub async fn entities(&self) -> Vec<EntityRecord> {
        self.guard().await.entities.clone()
    }

    pub async fn device(&self, unique_id: &str) -> Option<DeviceRecord> {
        self.guard()
            .await
            .devices
            .iter()
            .find(|d| d.unique_id == unique_id)
            .cloned()
    }

    /// Run `f` on a device while holding the store guard; `None` if it is gone
    pub async fn with_device<T>(
        &self,
        unique_id: &str,
        f: impl FnOnce(&DeviceRecord) -> T,
    ) -> Option<T> {
        let inner = self.guard().await;
        inner.devices.iter().find(|d| d.unique_id == unique_id).map(f)
    }

    pub async fn entities_for_device(&self, unique_device_id: &str) -> Vec<EntityRecord> {
        self.guard()
            .await
            .entities
            .iter()
            .filter(|e| e.unique_device_id == unique_device_id)
            .cloned()
            .collect()
    }

    pub async fn snapshot(&self) -> StoreSnapshot {
        let inner = self.guard().await;
        StoreSnapshot {
            devices: inner.devices.clone(),
            entities: inner.entities.clone(),
        }
    }

    /// Add an entity to an existing device
    pub async fn add_entity(&self, record: EntityRecord) -> StoreResult<EntityRecord> {
        let mut inner = self.guard_open().await?;

        if inner.device_position(&record.unique_device_id).is_none() {
            return Err(StoreError::UnknownDevice(record.unique_device_id));
        }
        let duplicate = inner.entities.iter().any(|e| {
            e.unique_id == record.unique_id
                || (e.unique_device_id == record.unique_device_id
                    && e.platform == record.platform
                    && e.resource == record.resource)
        });
        if duplicate {
            return Err(StoreError::DuplicateEntity {
                unique_device_id: record.unique_device_id,
                platform: record.platform.to_string(),
                resource: record.resource,
            });
        }

        debug!(
            "{}: adding {} entity {} on {}",
            self.host, record.platform, record.resource, record.unique_device_id
        );
        inner.entities.push(record.clone());
        sort_entities(&mut inner.entities);
        self.mark_dirty();
        Ok(record)
    }

    /// Stop accepting mutations; late scan results are dropped
    pub async fn close(&self) {
        let mut inner = self.guard().await;
        if !inner.closed {
            inner.closed = true;
            info!("Closed device store for host {}", self.host);
        }
    }

    pub async fn is_closed(&self) -> bool {
        self.guard().await.closed
    }

    pub fn mark_dirty(&self) {
        self.dirty.store(true, Ordering::SeqCst);
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::SeqCst)
    }

    /// Clear the dirty flag, returning whether it was set
    pub fn take_dirty(&self) -> bool {
        self.dirty.swap(false, Ordering::SeqCst)
    }
}

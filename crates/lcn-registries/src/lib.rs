//! Registries
//!
//! Persistent registries for tracking:
//! - Devices (DeviceRegistry)
//! - Entities (EntityRegistry)
//!
//! Both use JSON persistence in the `.storage/` directory with versioning
//! for migrations.

pub mod storage;

pub mod device_registry;
pub mod entity_registry;

pub use storage::{Storable, Storage, StorageError, StorageFile, StorageResult};

pub use device_registry::{DeviceEntry, DeviceIdentifier, DeviceRegistry, DeviceRegistryData};

pub use entity_registry::{EntityEntry, EntityRegistry, EntityRegistryData, EntityRegistryError};

use std::sync::Arc;

use tracing::debug;

/// All registries bundled together
pub struct Registries {
    pub storage: Arc<Storage>,
    pub devices: DeviceRegistry,
    pub entities: EntityRegistry,
}

impl Registries {
    /// Create new registries with the given config directory
    pub fn new(config_dir: impl AsRef<std::path::Path>) -> Self {
        let storage = Arc::new(Storage::new(config_dir));

        Self {
            devices: DeviceRegistry::new(storage.clone()),
            entities: EntityRegistry::new(storage.clone()),
            storage,
        }
    }

    /// Load all registries from storage
    pub async fn load_all(&self) -> StorageResult<()> {
        self.devices.load().await?;
        self.entities.load().await?;
        Ok(())
    }

    /// Save all registries to storage
    pub async fn save_all(&self) -> StorageResult<()> {
        self.devices.save().await?;
        self.entities.save().await?;
        Ok(())
    }

    /// Remove a device together with its child devices and every entity
    /// registered on any of them.
    ///
    /// Returns false if the device was not registered.
    pub fn remove_device(&self, device_id: &str) -> bool {
        if self.devices.get(device_id).is_none() {
            return false;
        }

        let mut pending = vec![device_id.to_string()];
        while let Some(id) = pending.pop() {
            pending.extend(self.devices.get_children(&id).into_iter().map(|c| c.id.clone()));
            let entities = self.entities.remove_for_device(&id);
            debug!("Removing device {} with {} entities", id, entities.len());
            self.devices.remove(&id);
        }
        true
    }
}

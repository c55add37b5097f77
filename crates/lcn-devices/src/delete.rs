//! Deletion cascade
//!
//! Removing a device first removes every entity that references it. Both
//! operations hold the store guard for their whole duration.

use tracing::{debug, info};

use crate::error::{StoreError, StoreResult};
use crate::registry::{DeviceRegistryHandle, DOMAIN};
use crate::store::{ConfigStore, StoreInner};

/// Remove a device, its entities and their registry entries.
pub async fn delete_device<R>(store: &ConfigStore, unique_id: &str, registry: &R) -> StoreResult<()>
where
    R: DeviceRegistryHandle + ?Sized,
{
    let mut inner = store.guard_open().await?;

    let position = inner
        .device_position(unique_id)
        .ok_or_else(|| StoreError::DeviceNotFound(unique_id.to_string()))?;

    let dependents: Vec<String> = inner
        .entities
        .iter()
        .filter(|e| e.unique_device_id == unique_id)
        .map(|e| e.unique_id.clone())
        .collect();
    for entity_id in &dependents {
        remove_entity(&mut inner, entity_id, registry)?;
    }

    remove_from_registry(registry, unique_id);
    let device = inner.devices.remove(position);
    store.mark_dirty();

    info!(
        "{}: deleted device {} ({}) with {} entities",
        store.host(),
        device.address(),
        device.name,
        dependents.len()
    );
    Ok(())
}

/// Remove one entity and its registry entry.
pub async fn delete_entity<R>(store: &ConfigStore, unique_id: &str, registry: &R) -> StoreResult<()>
where
    R: DeviceRegistryHandle + ?Sized,
{
    let mut inner = store.guard_open().await?;
    remove_entity(&mut inner, unique_id, registry)?;
    store.mark_dirty();
    Ok(())
}

fn remove_entity<R>(inner: &mut StoreInner, unique_id: &str, registry: &R) -> StoreResult<()>
where
    R: DeviceRegistryHandle + ?Sized,
{
    let position = inner
        .entity_position(unique_id)
        .ok_or_else(|| StoreError::EntityNotFound(unique_id.to_string()))?;

    remove_from_registry(registry, unique_id);
    let entity = inner.entities.remove(position);
    debug!("Deleted {} entity {}", entity.platform, entity.resource);
    Ok(())
}

fn remove_from_registry<R>(registry: &R, unique_id: &str)
where
    R: DeviceRegistryHandle + ?Sized,
{
    match registry.find_by_identifier(DOMAIN, unique_id) {
        Some(id) => {
            registry.remove_by_id(&id);
        }
        None => debug!("{} not in registry, skipping", unique_id),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::{DeviceRecord, EntityRecord, Platform};
    use crate::store::StoreSnapshot;
    use lcn_bus::{ModuleAddress, ModuleIdentity};
    use std::sync::Mutex;

    /// Registry double recording removals
    #[derive(Default)]
    struct RecordingRegistry {
        known: Mutex<Vec<String>>,
        removed: Mutex<Vec<String>>,
    }

    impl RecordingRegistry {
        fn with(ids: &[&str]) -> Self {
            Self {
                known: Mutex::new(ids.iter().map(|s| s.to_string()).collect()),
                removed: Mutex::default(),
            }
        }
    }

    impl DeviceRegistryHandle for RecordingRegistry {
        fn find_by_identifier(&self, _domain: &str, id: &str) -> Option<String> {
            let known = self.known.lock().unwrap();
            known.iter().find(|k| *k == id).map(|k| format!("reg-{}", k))
        }

        fn remove_by_id(&self, id: &str) -> bool {
            let key = id.trim_start_matches("reg-");
            self.known.lock().unwrap().retain(|k| k != key);
            self.removed.lock().unwrap().push(id.to_string());
            true
        }
    }

    fn device(addr: u8, name: &str) -> DeviceRecord {
        DeviceRecord::from_identity(
            "pchk",
            &ModuleIdentity::unknown(ModuleAddress::module(0, addr), name),
        )
    }

    #[tokio::test]
    async fn test_delete_entity_not_found() {
        let store = ConfigStore::new("pchk");
        let registry = RecordingRegistry::default();
        let result = delete_entity(&store, "missing", &registry).await;
        assert_eq!(result, Err(StoreError::EntityNotFound("missing".to_string())));
        assert!(!store.is_dirty());
    }

    #[tokio::test]
    async fn test_delete_device_skips_unregistered() {
        let d = device(7, "A");
        let e = EntityRecord::new(&d.unique_id, Platform::Light, "output1", "Lamp");
        let store = ConfigStore::from_snapshot(
            "pchk",
            StoreSnapshot {
                devices: vec![d.clone()],
                entities: vec![e.clone()],
            },
        );
        // only the entity is registered
        let registry = RecordingRegistry::with(&[&e.unique_id]);

        delete_device(&store, &d.unique_id, &registry).await.unwrap();

        assert_eq!(
            *registry.removed.lock().unwrap(),
            vec![format!("reg-{}", e.unique_id)]
        );
        assert!(store.devices().await.is_empty());
        assert!(store.entities().await.is_empty());
        assert!(store.is_dirty());
    }

    #[tokio::test]
    async fn test_delete_entity_leaves_device() {
        let d = device(7, "A");
        let e1 = EntityRecord::new(&d.unique_id, Platform::Light, "output1", "Lamp");
        let e2 = EntityRecord::new(&d.unique_id, Platform::Switch, "relay1", "Fan");
        let store = ConfigStore::from_snapshot(
            "pchk",
            StoreSnapshot {
                devices: vec![d.clone()],
                entities: vec![e1.clone(), e2.clone()],
            },
        );
        let registry = RecordingRegistry::with(&[&d.unique_id, &e1.unique_id]);

        delete_entity(&store, &e1.unique_id, &registry).await.unwrap();

        assert_eq!(store.entities().await, vec![e2]);
        assert_eq!(store.devices().await, vec![d]);
        assert_eq!(registry.removed.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_delete_on_closed_store() {
        let d = device(7, "A");
        let store = ConfigStore::from_snapshot(
            "pchk",
            StoreSnapshot {
                devices: vec![d.clone()],
                entities: vec![],
            },
        );
        store.close().await;

        let result = delete_device(&store, &d.unique_id, &RecordingRegistry::default()).await;
        assert_eq!(result, Err(StoreError::StoreClosed("pchk".to_string())));
        assert_eq!(store.devices().await.len(), 1);
    }
}

//! Mirror a host's records into the device and entity registries
//!
//! Every DeviceRecord becomes a registry device identified by
//! `("lcn", unique_id)`. Every EntityRecord becomes its own registry
//! device, linked to its module via `via_device_id`, plus an entity
//! registry entry attached to that device.

use std::collections::HashSet;
use std::sync::Arc;

use lcn_devices::{DeviceRecord, EntityRecord, StoreSnapshot, DOMAIN};
use lcn_registries::{DeviceEntry, DeviceIdentifier, EntityEntry, Registries};
use tracing::{debug, info};

pub fn register_device(
    registries: &Registries,
    config_entry_id: &str,
    record: &DeviceRecord,
) -> Arc<DeviceEntry> {
    let entry = registries.devices.get_or_create(
        &[DeviceIdentifier::new(DOMAIN, &record.unique_id)],
        Some(config_entry_id),
        Some(&record.name),
    );

    let model = if record.is_group {
        "LCN group".to_string()
    } else {
        format!("LCN module (type {})", record.hardware_type)
    };
    let sw_version = (record.software_serial >= 0).then(|| format!("{:X}", record.software_serial));
    let hw_version = (record.hardware_serial >= 0).then(|| format!("{:X}", record.hardware_serial));

    registries
        .devices
        .update(&entry.id, |d| {
            d.name = Some(record.name.clone());
            d.manufacturer = Some("Issendorff".to_string());
            d.model = Some(model);
            d.sw_version = sw_version;
            d.hw_version = hw_version;
        })
        .unwrap_or(entry)
}

pub fn register_entity(
    registries: &Registries,
    config_entry_id: &str,
    record: &EntityRecord,
    parent_device_id: &str,
) -> Arc<EntityEntry> {
    let device = registries.devices.get_or_create(
        &[DeviceIdentifier::new(DOMAIN, &record.unique_id)],
        Some(config_entry_id),
        Some(&record.name),
    );
    registries.devices.update(&device.id, |d| {
        d.name = Some(record.name.clone());
        d.via_device_id = Some(parent_device_id.to_string());
    });

    let entity = registries.entities.get_or_create(
        record.platform.as_str(),
        DOMAIN,
        &record.unique_id,
        &record.name,
        Some(config_entry_id),
        Some(&device.id),
    );
    if entity.device_id.as_deref() != Some(device.id.as_str()) {
        if let Ok(updated) = registries
            .entities
            .update(&entity.entity_id, |e| e.device_id = Some(device.id.clone()))
        {
            return updated;
        }
    }
    entity
}

/// Register every device and entity of a host
pub fn register_all(registries: &Registries, config_entry_id: &str, snapshot: &StoreSnapshot) {
    for record in &snapshot.devices {
        let device = register_device(registries, config_entry_id, record);
        for entity in snapshot
            .entities
            .iter()
            .filter(|e| e.unique_device_id == record.unique_id)
        {
            register_entity(registries, config_entry_id, entity, &device.id);
        }
    }
    debug!(
        "Registered {} devices and {} entities for {}",
        snapshot.devices.len(),
        snapshot.entities.len(),
        config_entry_id
    );
}

/// Remove registry entries of a config entry that no longer have a record.
///
/// Returns the number of removed entities and devices.
pub fn purge_orphans(
    registries: &Registries,
    config_entry_id: &str,
    snapshot: &StoreSnapshot,
) -> usize {
    let known: HashSet<&str> = snapshot
        .devices
        .iter()
        .map(|d| d.unique_id.as_str())
        .chain(snapshot.entities.iter().map(|e| e.unique_id.as_str()))
        .collect();

    let mut removed = 0;
    for entity in registries.entities.get_by_config_entry_id(config_entry_id) {
        let orphaned = entity.platform != DOMAIN
            || entity
                .unique_id
                .as_deref()
                .map_or(true, |id| !known.contains(id));
        if orphaned && registries.entities.remove(&entity.entity_id).is_some() {
            removed += 1;
        }
    }
    for device in registries.devices.get_by_config_entry_id(config_entry_id) {
        let orphaned = !device
            .identifiers
            .iter()
            .any(|i| i.domain() == DOMAIN && known.contains(i.id()));
        if orphaned && registries.remove_device(&device.id) {
            removed += 1;
        }
    }

    if removed > 0 {
        info!("Removed {} orphaned registry entries for {}", removed, config_entry_id);
    }
    removed
}

#[cfg(test)]
mod tests {
    use super::*;
    use lcn_bus::{ModuleAddress, ModuleIdentity};
    use lcn_devices::Platform;
    use tempfile::TempDir;

    fn snapshot() -> StoreSnapshot {
        let device = DeviceRecord::from_identity(
            "pchk",
            &ModuleIdentity {
                address: ModuleAddress::module(0, 7),
                name: "Kitchen".to_string(),
                hardware_serial: 0x1a2b,
                software_serial: 0x170206,
                hardware_type: 11,
            },
        );
        let entity = EntityRecord::new(&device.unique_id, Platform::Light, "output1", "Ceiling");
        StoreSnapshot {
            devices: vec![device],
            entities: vec![entity],
        }
    }

    #[test]
    fn test_register_all() {
        let temp_dir = TempDir::new().unwrap();
        let registries = Registries::new(temp_dir.path());
        let snapshot = snapshot();

        register_all(&registries, "entry1", &snapshot);
        register_all(&registries, "entry1", &snapshot);

        let module = registries
            .devices
            .get_by_identifier(DOMAIN, &snapshot.devices[0].unique_id)
            .unwrap();
        assert_eq!(module.sw_version.as_deref(), Some("170206"));
        assert_eq!(module.model.as_deref(), Some("LCN module (type 11)"));

        let entity_device = registries
            .devices
            .get_by_identifier(DOMAIN, &snapshot.entities[0].unique_id)
            .unwrap();
        assert_eq!(entity_device.via_device_id.as_deref(), Some(module.id.as_str()));

        let entity = registries
            .entities
            .get_by_unique_id(DOMAIN, &snapshot.entities[0].unique_id)
            .unwrap();
        assert_eq!(entity.entity_id, "light.ceiling");
        assert_eq!(entity.device_id.as_deref(), Some(entity_device.id.as_str()));
        assert_eq!(registries.devices.len(), 2);
        assert_eq!(registries.entities.len(), 1);
    }

    #[test]
    fn test_purge_orphans() {
        let temp_dir = TempDir::new().unwrap();
        let registries = Registries::new(temp_dir.path());
        let snapshot = snapshot();
        register_all(&registries, "entry1", &snapshot);

        registries
            .entities
            .get_or_create("switch", DOMAIN, "dummy", "dummy", Some("entry1"), None);
        registries
            .devices
            .get_or_create(&[DeviceIdentifier::new(DOMAIN, "gone")], Some("entry1"), None);
        let foreign = registries
            .entities
            .get_or_create("switch", DOMAIN, "other", "other", Some("entry2"), None);

        assert_eq!(purge_orphans(&registries, "entry1", &snapshot), 2);
        assert!(registries.entities.get_by_unique_id(DOMAIN, "dummy").is_none());
        assert!(registries.devices.get_by_identifier(DOMAIN, "gone").is_none());
        assert!(registries.entities.get(&foreign.entity_id).is_some());
        assert_eq!(registries.devices.len(), 2);
    }
}

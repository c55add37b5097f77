//! The hub: one runtime per loaded host
//!
//! Owns the bus connections and device stores of every loaded config
//! entry and keeps registries and persisted entries in step with them.

use std::sync::Arc;

use dashmap::DashMap;
use lcn_bus::{BusConnection, BusConnector, ConnectionSettings};
use lcn_config::LcnConfig;
use lcn_config_entries::{
    ConfigEntries, ConfigEntriesError, ConfigEntry, ConfigEntrySource, ConfigEntryState,
    ConfigEntryUpdate, HostData,
};
use lcn_devices::{
    delete_device, delete_entity, reconcile, ConfigStore, DeviceRecord, EntityRecord,
    ScanReport, StoreError, StoreSnapshot, DOMAIN,
};
use lcn_registries::Registries;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::{HubError, HubResult, SetupError};
use crate::sync;

/// A loaded host
pub struct HostRuntime {
    entry_id: String,
    settings: ConnectionSettings,
    connection: Arc<dyn BusConnection>,
    store: Arc<ConfigStore>,
}

impl HostRuntime {
    pub fn entry_id(&self) -> &str {
        &self.entry_id
    }

    pub fn host_name(&self) -> &str {
        &self.settings.name
    }

    pub fn settings(&self) -> &ConnectionSettings {
        &self.settings
    }

    pub fn connection(&self) -> &Arc<dyn BusConnection> {
        &self.connection
    }

    pub fn store(&self) -> &Arc<ConfigStore> {
        &self.store
    }
}

/// Host summary for the control surface
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HostInfo {
    pub name: String,
    pub ip_address: String,
    pub port: u16,
}

pub struct Hub {
    registries: Arc<Registries>,
    entries: Arc<ConfigEntries>,
    connector: Arc<dyn BusConnector>,
    /// host name -> runtime
    runtimes: DashMap<String, Arc<HostRuntime>>,
}

impl Hub {
    pub fn new(
        registries: Arc<Registries>,
        entries: Arc<ConfigEntries>,
        connector: Arc<dyn BusConnector>,
    ) -> Self {
        Self {
            registries,
            entries,
            connector,
            runtimes: DashMap::new(),
        }
    }

    pub fn registries(&self) -> &Arc<Registries> {
        &self.registries
    }

    pub fn entries(&self) -> &Arc<ConfigEntries> {
        &self.entries
    }

    // ==================== Entries ====================

    /// Create a config entry for a new host
    pub async fn add_host(
        &self,
        settings: ConnectionSettings,
        store: StoreSnapshot,
        source: ConfigEntrySource,
    ) -> HubResult<ConfigEntry> {
        let entry = ConfigEntry::new(HostData::new(settings).with_store(store)).with_source(source);
        Ok(self.entries.add(entry).await?)
    }

    /// Import the `lcn:` section.
    ///
    /// New hosts get an entry; known hosts get their connection settings
    /// replaced and any declared devices or entities they lack added.
    /// Returns the entry ids of all imported hosts.
    pub async fn import_config(&self, config: &LcnConfig) -> HubResult<Vec<String>> {
        let mut entry_ids = Vec::with_capacity(config.connections.len());

        for conn in &config.connections {
            let declared = conn.snapshot();
            let entry_id = match self.entries.get_by_host(&conn.name) {
                Some(existing) => {
                    let merged = merge_snapshot(existing.data.store.clone(), declared);
                    self.entries
                        .update(
                            &existing.entry_id,
                            ConfigEntryUpdate::new()
                                .connection(conn.settings())
                                .store(merged),
                        )
                        .await?;
                    debug!("Updated imported host {}", conn.name);
                    existing.entry_id
                }
                None => {
                    let entry = self
                        .add_host(conn.settings(), declared, ConfigEntrySource::Import)
                        .await?;
                    info!("Imported host {} from configuration", conn.name);
                    entry.entry_id
                }
            };
            entry_ids.push(entry_id);
        }
        Ok(entry_ids)
    }

    /// Retitle an entry; a loaded host's connection is renamed with it.
    ///
    /// The host name, and with it every unique id, stays unchanged.
    pub async fn update_title(&self, entry_id: &str, title: &str) -> HubResult<ConfigEntry> {
        let entry = self
            .entries
            .update(entry_id, ConfigEntryUpdate::new().title(title))
            .await?;
        if let Some(runtime) = self.runtimes.get(entry.host_name()) {
            runtime.connection.set_connection_id(&entry.title);
            info!("Renamed connection {} to {}", entry.host_name(), entry.title);
        }
        Ok(entry)
    }

    /// Unload (if needed) and delete an entry with its registry entries
    pub async fn remove_entry(&self, entry_id: &str) -> HubResult<()> {
        let entry = self
            .entries
            .get(entry_id)
            .ok_or_else(|| ConfigEntriesError::NotFound(entry_id.to_string()))?;
        if entry.state != ConfigEntryState::NotLoaded {
            self.unload_entry(entry_id).await?;
        }

        for entity in self.registries.entities.get_by_config_entry_id(entry_id) {
            self.registries.entities.remove(&entity.entity_id);
        }
        let removed = self.registries.devices.clear_config_entry(entry_id);
        for device_id in &removed {
            self.registries.entities.remove_for_device(device_id);
        }
        self.registries.save_all().await?;
        self.entries.remove(entry_id).await?;
        Ok(())
    }

    // ==================== Lifecycle ====================

    /// Connect to the host of an entry and load its records.
    ///
    /// Connection failures put the entry into `SetupError` and are
    /// returned as [`HubError::Setup`]; they are not retried.
    pub async fn setup_entry(&self, entry_id: &str) -> HubResult<()> {
        let _lock = self.entries.setup_lock().await;

        let entry = self
            .entries
            .get(entry_id)
            .ok_or_else(|| ConfigEntriesError::NotFound(entry_id.to_string()))?;
        self.entries
            .set_state(entry_id, ConfigEntryState::SetupInProgress, None)?;

        let settings = entry.data.connection.clone();
        let connection = match self.connector.connect(&settings).await {
            Ok(connection) => connection,
            Err(e) => {
                let error = SetupError::from(e);
                warn!("Setup of {} failed: {}", settings.name, error);
                self.entries.set_state(
                    entry_id,
                    ConfigEntryState::SetupError,
                    Some(error.to_string()),
                )?;
                return Err(error.into());
            }
        };

        if connection.connection_id() != entry.title {
            connection.set_connection_id(&entry.title);
        }

        let store = Arc::new(ConfigStore::from_snapshot(
            &settings.name,
            entry.data.store.clone(),
        ));
        let snapshot = store.snapshot().await;
        sync::purge_orphans(&self.registries, entry_id, &snapshot);
        sync::register_all(&self.registries, entry_id, &snapshot);
        if let Err(e) = self.registries.save_all().await {
            connection.close().await;
            self.entries.set_state(
                entry_id,
                ConfigEntryState::SetupError,
                Some(e.to_string()),
            )?;
            return Err(e.into());
        }

        let runtime = Arc::new(HostRuntime {
            entry_id: entry_id.to_string(),
            store,
            settings,
            connection,
        });
        self.runtimes
            .insert(runtime.host_name().to_string(), runtime.clone());
        self.entries
            .set_state(entry_id, ConfigEntryState::Loaded, None)?;
        if let Err(e) = self.persist(&runtime).await {
            warn!("Failed to persist {} after setup: {}", runtime.host_name(), e);
        }

        info!(
            "Set up host {} ({}:{})",
            runtime.host_name(),
            runtime.settings.host,
            runtime.settings.port
        );
        Ok(())
    }

    /// Set up every entry that is not loaded yet
    pub async fn setup_all(&self) -> Vec<(String, HubResult<()>)> {
        let mut results = Vec::new();
        for entry in self.entries.iter() {
            if entry.state == ConfigEntryState::Loaded {
                continue;
            }
            let result = self.setup_entry(&entry.entry_id).await;
            results.push((entry.entry_id, result));
        }
        results
    }

    /// Stop a host: drop late scan results, persist, close the connection
    pub async fn unload_entry(&self, entry_id: &str) -> HubResult<()> {
        let _lock = self.entries.setup_lock().await;

        let entry = self
            .entries
            .get(entry_id)
            .ok_or_else(|| ConfigEntriesError::NotFound(entry_id.to_string()))?;
        if !entry.state.is_recoverable() {
            return Err(ConfigEntriesError::CannotUnload(entry.state).into());
        }
        if entry.state == ConfigEntryState::NotLoaded {
            return Ok(());
        }
        self.entries
            .set_state(entry_id, ConfigEntryState::UnloadInProgress, None)?;

        if let Some((_, runtime)) = self.runtimes.remove(entry.host_name()) {
            runtime.store.close().await;
            let persisted = self.persist(&runtime).await;
            runtime.connection.close().await;
            if let Err(e) = persisted {
                warn!("Failed to persist {} on unload: {}", runtime.host_name(), e);
            }
        }

        self.entries
            .set_state(entry_id, ConfigEntryState::NotLoaded, None)?;
        info!("Unloaded host {}", entry.host_name());
        Ok(())
    }

    /// Unload every loaded entry
    pub async fn shutdown(&self) {
        for entry in self.entries.iter() {
            if entry.state == ConfigEntryState::NotLoaded {
                continue;
            }
            if let Err(e) = self.unload_entry(&entry.entry_id).await {
                warn!("Failed to unload {}: {}", entry.title, e);
            }
        }
    }

    // ==================== Control surface ====================

    /// Runtime of a loaded host
    pub fn host(&self, host_name: &str) -> HubResult<Arc<HostRuntime>> {
        self.runtimes
            .get(host_name)
            .map(|r| r.value().clone())
            .ok_or_else(|| HubError::HostNotFound(host_name.to_string()))
    }

    /// Every configured host, loaded or not
    pub fn list_hosts(&self) -> Vec<HostInfo> {
        self.entries
            .iter()
            .into_iter()
            .filter(|e| e.domain == DOMAIN)
            .map(|e| HostInfo {
                name: e.data.connection.name.clone(),
                ip_address: e.data.connection.host.clone(),
                port: e.data.connection.port,
            })
            .collect()
    }

    pub async fn devices(&self, host_name: &str) -> HubResult<Vec<DeviceRecord>> {
        Ok(self.host(host_name)?.store.devices().await)
    }

    /// Entities of one device; an unknown device is `DeviceNotFound`
    pub async fn entities(
        &self,
        host_name: &str,
        unique_device_id: &str,
    ) -> HubResult<Vec<EntityRecord>> {
        let runtime = self.host(host_name)?;
        if runtime.store.device(unique_device_id).await.is_none() {
            return Err(StoreError::DeviceNotFound(unique_device_id.to_string()).into());
        }
        Ok(runtime.store.entities_for_device(unique_device_id).await)
    }

    /// Scan the bus of a host and merge the result into its device list
    pub async fn scan_devices(&self, host_name: &str) -> HubResult<ScanReport> {
        let runtime = self.host(host_name)?;

        let addresses = runtime.connection.scan_modules().await?;
        let report = reconcile(runtime.connection.as_ref(), &addresses, &runtime.store).await?;

        for device in &report.devices {
            runtime
                .store
                .with_device(&device.unique_id, |current| {
                    sync::register_device(&self.registries, &runtime.entry_id, current)
                })
                .await;
        }
        self.persist(&runtime).await?;
        Ok(report)
    }

    pub async fn delete_device(&self, host_name: &str, unique_id: &str) -> HubResult<()> {
        let runtime = self.host(host_name)?;
        delete_device(&runtime.store, unique_id, self.registries.as_ref()).await?;
        self.persist(&runtime).await
    }

    pub async fn delete_entity(&self, host_name: &str, unique_id: &str) -> HubResult<()> {
        let runtime = self.host(host_name)?;
        delete_entity(&runtime.store, unique_id, self.registries.as_ref()).await?;
        self.persist(&runtime).await
    }

    pub async fn add_entity(&self, host_name: &str, record: EntityRecord) -> HubResult<EntityRecord> {
        let runtime = self.host(host_name)?;
        let record = runtime.store.add_entity(record).await?;

        let parent = self
            .registries
            .devices
            .get_by_identifier(DOMAIN, &record.unique_device_id)
            .map(|d| d.id.clone());
        match parent {
            Some(parent) => {
                sync::register_entity(&self.registries, &runtime.entry_id, &record, &parent);
            }
            None => {
                runtime
                    .store
                    .with_device(&record.unique_device_id, |device| {
                        let entry_id = runtime.entry_id.as_str();
                        let parent = sync::register_device(&self.registries, entry_id, device);
                        sync::register_entity(&self.registries, entry_id, &record, &parent.id);
                    })
                    .await;
            }
        }

        self.persist(&runtime).await?;
        Ok(record)
    }

    /// Write a dirty store back into its config entry and save the registries
    pub async fn persist(&self, runtime: &HostRuntime) -> HubResult<()> {
        if !runtime.store.take_dirty() {
            return Ok(());
        }
        let snapshot = runtime.store.snapshot().await;
        let saved = async {
            self.entries.update_store(&runtime.entry_id, snapshot).await?;
            self.registries.save_all().await?;
            Ok::<_, HubError>(())
        }
        .await;

        match &saved {
            Ok(()) => debug!("Persisted host {}", runtime.host_name()),
            Err(_) => runtime.store.mark_dirty(),
        }
        saved
    }
}

/// Add declared records the current lists lack, keeping existing ones
fn merge_snapshot(mut current: StoreSnapshot, declared: StoreSnapshot) -> StoreSnapshot {
    for device in declared.devices {
        if !current
            .devices
            .iter()
            .any(|d| d.identity_key() == device.identity_key())
        {
            current.devices.push(device);
        }
    }
    for entity in declared.entities {
        if !current.entities.iter().any(|e| e.unique_id == entity.unique_id) {
            current.entities.push(entity);
        }
    }
    current
}

#[cfg(test)]
mod tests {
    use super::*;
    use lcn_bus::{ModuleAddress, ModuleIdentity};
    use lcn_devices::Platform;

    fn device(addr: u8, name: &str) -> DeviceRecord {
        DeviceRecord::from_identity(
            "pchk",
            &ModuleIdentity::unknown(ModuleAddress::module(0, addr), name),
        )
    }

    #[test]
    fn test_host_info_layout() {
        let info = HostInfo {
            name: "pchk".to_string(),
            ip_address: "192.168.2.41".to_string(),
            port: 4114,
        };
        assert_eq!(
            serde_json::to_value(&info).unwrap(),
            serde_json::json!({"name": "pchk", "ip_address": "192.168.2.41", "port": 4114})
        );
    }

    #[test]
    fn test_merge_snapshot_keeps_existing() {
        let kitchen = device(7, "Kitchen");
        let renamed = device(7, "Declared");
        let hall = device(8, "Hall");
        let lamp = EntityRecord::new(&kitchen.unique_id, Platform::Light, "output1", "Lamp");

        let merged = merge_snapshot(
            StoreSnapshot {
                devices: vec![kitchen.clone()],
                entities: vec![lamp.clone()],
            },
            StoreSnapshot {
                devices: vec![renamed, hall.clone()],
                entities: vec![lamp.clone()],
            },
        );

        assert_eq!(merged.devices, vec![kitchen, hall]);
        assert_eq!(merged.entities, vec![lamp]);
    }
}

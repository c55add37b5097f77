//! Config entry types
//!
//! One ConfigEntry exists per PCHK host. Its data holds the connection
//! settings together with the host's device and entity lists.

use chrono::{DateTime, Utc};
use lcn_bus::ConnectionSettings;
use lcn_devices::StoreSnapshot;
use serde::{Deserialize, Serialize};

use crate::state_machine::InvalidTransition;

/// Integration domain of every entry
pub const DOMAIN: &str = "lcn";

/// Config entry lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ConfigEntryState {
    /// Initial state, not yet set up
    #[default]
    NotLoaded,
    SetupInProgress,
    Loaded,
    /// Setup failed; stays here until set up again or unloaded
    SetupError,
    UnloadInProgress,
}

impl ConfigEntryState {
    /// Check if the entry can be unloaded from this state
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            ConfigEntryState::Loaded | ConfigEntryState::SetupError | ConfigEntryState::NotLoaded
        )
    }
}

/// Source of the config entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ConfigEntrySource {
    /// Created through the API
    #[default]
    User,
    /// Imported from configuration.yaml
    Import,
}

/// Persisted data of a host entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HostData {
    #[serde(flatten)]
    pub connection: ConnectionSettings,

    #[serde(flatten)]
    pub store: StoreSnapshot,
}

impl HostData {
    pub fn new(connection: ConnectionSettings) -> Self {
        Self {
            connection,
            store: StoreSnapshot::default(),
        }
    }

    pub fn with_store(mut self, store: StoreSnapshot) -> Self {
        self.store = store;
        self
    }

    pub fn host_name(&self) -> &str {
        &self.connection.name
    }
}

/// A configuration entry for one bus host
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigEntry {
    /// Unique identifier (ULID)
    pub entry_id: String,

    #[serde(default = "default_domain")]
    pub domain: String,

    /// Display name, the host name
    pub title: String,

    pub data: HostData,

    #[serde(default = "default_version")]
    pub version: u32,

    #[serde(default = "default_minor_version")]
    pub minor_version: u32,

    /// Host name; at most one entry per host
    pub unique_id: String,

    #[serde(default)]
    pub source: ConfigEntrySource,

    /// Current lifecycle state (not persisted)
    #[serde(skip, default)]
    pub state: ConfigEntryState,

    /// Human-readable explanation for failed states
    #[serde(skip, default)]
    pub reason: Option<String>,

    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,

    #[serde(default = "Utc::now")]
    pub modified_at: DateTime<Utc>,
}

fn default_domain() -> String {
    DOMAIN.to_string()
}

fn default_version() -> u32 {
    1
}

fn default_minor_version() -> u32 {
    1
}

impl ConfigEntry {
    pub fn new(data: HostData) -> Self {
        let now = Utc::now();
        let host = data.host_name().to_string();
        Self {
            entry_id: ulid::Ulid::new().to_string(),
            domain: default_domain(),
            title: host.clone(),
            data,
            version: default_version(),
            minor_version: default_minor_version(),
            unique_id: host,
            source: ConfigEntrySource::User,
            state: ConfigEntryState::NotLoaded,
            reason: None,
            created_at: now,
            modified_at: now,
        }
    }

    pub fn with_source(mut self, source: ConfigEntrySource) -> Self {
        self.source = source;
        self
    }

    pub fn host_name(&self) -> &str {
        self.data.host_name()
    }

    pub fn is_loaded(&self) -> bool {
        self.state == ConfigEntryState::Loaded
    }

    /// Transition to a new state, validated against the lifecycle rules.
    pub fn try_set_state(
        &mut self,
        new_state: ConfigEntryState,
        reason: Option<String>,
    ) -> Result<(), InvalidTransition> {
        self.state.try_transition(new_state)?;
        self.state = new_state;
        self.reason = reason;
        Ok(())
    }
}

/// Partial update of an entry
#[derive(Debug, Default)]
pub struct ConfigEntryUpdate {
    pub title: Option<String>,
    pub connection: Option<ConnectionSettings>,
    pub store: Option<StoreSnapshot>,
}

impl ConfigEntryUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn connection(mut self, connection: ConnectionSettings) -> Self {
        self.connection = Some(connection);
        self
    }

    pub fn store(mut self, store: StoreSnapshot) -> Self {
        self.store = Some(store);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lcn_bus::DimMode;
    use lcn_devices::{DeviceRecord, EntityRecord, Platform};

    fn settings(name: &str) -> ConnectionSettings {
        ConnectionSettings {
            name: name.to_string(),
            host: "192.168.2.41".to_string(),
            port: 4114,
            username: "lcn".to_string(),
            password: "lcn".to_string(),
            sk_num_tries: 0,
            dim_mode: DimMode::Steps200,
        }
    }

    #[test]
    fn test_config_entry_new() {
        let entry = ConfigEntry::new(HostData::new(settings("pchk")));
        assert_eq!(entry.domain, "lcn");
        assert_eq!(entry.title, "pchk");
        assert_eq!(entry.unique_id, "pchk");
        assert_eq!(entry.state, ConfigEntryState::NotLoaded);
        assert!(!entry.entry_id.is_empty());
    }

    #[test]
    fn test_host_data_layout() {
        let device = DeviceRecord::from_identity(
            "pchk",
            &lcn_bus::ModuleIdentity::unknown(lcn_bus::ModuleAddress::module(0, 7), "Kitchen"),
        );
        let entity = EntityRecord::new(&device.unique_id, Platform::Light, "output1", "Lamp");
        let data = HostData::new(settings("pchk")).with_store(StoreSnapshot {
            devices: vec![device],
            entities: vec![entity],
        });

        let json = serde_json::to_value(&data).unwrap();
        assert_eq!(json["host"], "192.168.2.41");
        assert_eq!(json["dim_mode"], "steps200");
        assert_eq!(json["devices"][0]["name"], "Kitchen");
        assert_eq!(json["entities"][0]["resource"], "output1");

        let parsed: HostData = serde_json::from_value(json).unwrap();
        assert_eq!(parsed, data);
    }

    #[test]
    fn test_try_set_state() {
        let mut entry = ConfigEntry::new(HostData::new(settings("pchk")));
        assert!(entry
            .try_set_state(ConfigEntryState::Loaded, None)
            .is_err());

        entry
            .try_set_state(ConfigEntryState::SetupInProgress, None)
            .unwrap();
        entry
            .try_set_state(ConfigEntryState::SetupError, Some("auth".to_string()))
            .unwrap();
        assert_eq!(entry.reason.as_deref(), Some("auth"));
    }

    #[test]
    fn test_state_not_persisted() {
        let mut entry = ConfigEntry::new(HostData::new(settings("pchk")))
            .with_source(ConfigEntrySource::Import);
        entry.state = ConfigEntryState::Loaded;

        let json = serde_json::to_string(&entry).unwrap();
        let parsed: ConfigEntry = serde_json::from_str(&json).unwrap();

        assert_eq!(parsed.state, ConfigEntryState::NotLoaded);
        assert_eq!(parsed.source, ConfigEntrySource::Import);
        assert_eq!(parsed.data.connection.password, "lcn");
    }
}

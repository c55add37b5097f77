//! Hub configuration
//!
//! Parses the `api:` and `lcn:` sections from configuration.yaml

use std::collections::HashSet;
use std::path::Path;

use lcn_bus::{ConnectionSettings, DimMode, ModuleAddress, ModuleIdentity};
use lcn_devices::{DeviceRecord, EntityRecord, Platform, StoreSnapshot};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};
use serde_yaml::Value;

use crate::error::{ConfigError, ConfigResult};
use crate::loader::load_yaml;

/// File read from the config directory
pub const CONFIG_FILE: &str = "configuration.yaml";

/// `api:` section
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_bind")]
    pub bind: String,

    /// Tokens accepted by the websocket `auth` message
    #[serde(default)]
    pub access_tokens: Vec<String>,

    /// Tokens that authenticate without admin rights
    #[serde(default)]
    pub read_only_tokens: Vec<String>,
}

fn default_bind() -> String {
    "0.0.0.0:8123".to_string()
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            access_tokens: Vec::new(),
            read_only_tokens: Vec::new(),
        }
    }
}

/// `lcn:` section
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LcnConfig {
    #[serde(default)]
    pub connections: Vec<ConnectionConfig>,
}

/// One PCHK host
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionConfig {
    pub name: String,
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_credential")]
    pub username: String,
    #[serde(default = "default_credential")]
    pub password: String,
    #[serde(default)]
    pub sk_num_tries: u32,
    #[serde(default)]
    pub dim_mode: DimMode,

    /// Modules known up front; imported into the host's device list
    #[serde(default)]
    pub modules: Vec<ModuleConfig>,
}

fn default_port() -> u16 {
    4114
}

fn default_credential() -> String {
    "lcn".to_string()
}

impl ConnectionConfig {
    pub fn settings(&self) -> ConnectionSettings {
        ConnectionSettings {
            name: self.name.clone(),
            host: self.host.clone(),
            port: self.port,
            username: self.username.clone(),
            password: self.password.clone(),
            sk_num_tries: self.sk_num_tries,
            dim_mode: self.dim_mode,
        }
    }

    /// Device and entity records described by `modules`
    pub fn snapshot(&self) -> StoreSnapshot {
        let mut snapshot = StoreSnapshot::default();
        for module in &self.modules {
            let device = DeviceRecord::from_identity(&self.name, &module.identity());
            for entity in &module.entities {
                snapshot.entities.push(
                    EntityRecord::new(
                        &device.unique_id,
                        entity.platform,
                        &entity.resource,
                        &entity.name,
                    )
                    .with_platform_data(entity.platform_data.clone()),
                );
            }
            snapshot.devices.push(device);
        }
        snapshot
    }
}

/// A module or group declared in YAML
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModuleConfig {
    pub segment_id: u8,
    pub address_id: u8,
    #[serde(default)]
    pub is_group: bool,
    #[serde(default)]
    pub name: String,
    #[serde(default = "unknown_serial")]
    pub hardware_serial: i64,
    #[serde(default = "unknown_serial")]
    pub software_serial: i64,
    #[serde(default = "unknown_type")]
    pub hardware_type: i32,
    #[serde(default)]
    pub entities: Vec<EntityConfig>,
}

fn unknown_serial() -> i64 {
    -1
}

fn unknown_type() -> i32 {
    -1
}

impl ModuleConfig {
    pub fn address(&self) -> ModuleAddress {
        ModuleAddress {
            segment_id: self.segment_id,
            address_id: self.address_id,
            is_group: self.is_group,
        }
    }

    pub fn identity(&self) -> ModuleIdentity {
        ModuleIdentity {
            address: self.address(),
            name: self.name.clone(),
            hardware_serial: self.hardware_serial,
            software_serial: self.software_serial,
            hardware_type: self.hardware_type,
        }
    }
}

/// An entity on a declared module
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityConfig {
    pub platform: Platform,
    pub resource: String,
    pub name: String,
    #[serde(default)]
    pub platform_data: Map<String, JsonValue>,
}

/// Everything the hub reads from configuration.yaml
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HubConfig {
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub lcn: LcnConfig,
}

impl HubConfig {
    /// Load `configuration.yaml` from a config directory.
    ///
    /// A missing file yields the default configuration.
    pub fn load(config_dir: impl AsRef<Path>) -> ConfigResult<Self> {
        let config_dir = config_dir.as_ref();
        if !config_dir.join(CONFIG_FILE).exists() {
            tracing::warn!("No {} in {:?}, using defaults", CONFIG_FILE, config_dir);
            return Ok(Self::default());
        }
        let yaml = load_yaml(config_dir, CONFIG_FILE)?;
        Self::from_yaml(&yaml)
    }

    pub fn from_yaml(yaml: &Value) -> ConfigResult<Self> {
        let mapping = match yaml {
            Value::Null => return Ok(Self::default()),
            Value::Mapping(mapping) => mapping,
            _ => {
                return Err(ConfigError::InvalidValue {
                    key: "root".to_string(),
                    reason: "configuration must be a mapping".to_string(),
                })
            }
        };

        let config = Self {
            api: section(mapping, "api")?,
            lcn: section(mapping, "lcn")?,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> ConfigResult<()> {
        let mut names = HashSet::new();
        for conn in &self.lcn.connections {
            if conn.name.trim().is_empty() {
                return Err(invalid("connection name must not be empty"));
            }
            if !names.insert(conn.name.as_str()) {
                return Err(invalid(format!("duplicate connection name '{}'", conn.name)));
            }
            if conn.host.trim().is_empty() {
                return Err(invalid(format!("connection '{}' has no host", conn.name)));
            }
            if conn.port == 0 {
                return Err(invalid(format!("connection '{}' has port 0", conn.name)));
            }

            let mut addresses = HashSet::new();
            for module in &conn.modules {
                if !addresses.insert(module.address()) {
                    return Err(invalid(format!(
                        "connection '{}' declares {} twice",
                        conn.name,
                        module.address()
                    )));
                }
                let mut resources = HashSet::new();
                for entity in &module.entities {
                    if !resources.insert((entity.platform, entity.resource.to_lowercase())) {
                        return Err(invalid(format!(
                            "{} on {} declares {} {} twice",
                            conn.name,
                            module.address(),
                            entity.platform,
                            entity.resource
                        )));
                    }
                }
            }
        }
        Ok(())
    }
}

fn section<T>(mapping: &serde_yaml::Mapping, key: &str) -> ConfigResult<T>
where
    T: Default + serde::de::DeserializeOwned,
{
    match mapping.get(key) {
        None | Some(Value::Null) => Ok(T::default()),
        Some(value) => serde_yaml::from_value(value.clone()).map_err(|source| ConfigError::Schema {
            section: key.to_string(),
            source,
        }),
    }
}

fn invalid(message: impl Into<String>) -> ConfigError {
    ConfigError::ValidationFailed {
        message: message.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn parse(yaml: &str) -> ConfigResult<HubConfig> {
        HubConfig::from_yaml(&serde_yaml::from_str(yaml).unwrap())
    }

    #[test]
    fn test_defaults() {
        let config = parse("{}").unwrap();
        assert_eq!(config.api.bind, "0.0.0.0:8123");
        assert!(config.lcn.connections.is_empty());
    }

    #[test]
    fn test_parse_connections() {
        let config = parse(
            r#"
api:
  access_tokens: [abc]
lcn:
  connections:
    - name: pchk
      host: 192.168.2.41
      password: secret
      dim_mode: steps50
      modules:
        - segment_id: 0
          address_id: 7
          name: Kitchen
          entities:
            - platform: light
              resource: OUTPUT1
              name: Ceiling
              platform_data: { transition: 5 }
        - { segment_id: 0, address_id: 9, is_group: true, name: Groupies }
"#,
        )
        .unwrap();

        assert_eq!(config.api.access_tokens, vec!["abc"]);
        let conn = &config.lcn.connections[0];
        assert_eq!(conn.port, 4114);
        assert_eq!(conn.username, "lcn");
        assert_eq!(conn.dim_mode, DimMode::Steps50);
        assert_eq!(conn.settings().password, "secret");

        let snapshot = conn.snapshot();
        assert_eq!(snapshot.devices.len(), 2);
        assert_eq!(snapshot.entities.len(), 1);
        assert_eq!(snapshot.entities[0].resource, "output1");
        assert_eq!(snapshot.entities[0].unique_device_id, snapshot.devices[0].unique_id);
        assert_eq!(snapshot.entities[0].platform_data["transition"], 5);
        assert!(snapshot.devices[1].is_group);
    }

    #[test]
    fn test_invalid_dim_mode() {
        let result = parse(
            "lcn:\n  connections:\n    - { name: pchk, host: h, dim_mode: steps100 }\n",
        );
        assert!(matches!(result, Err(ConfigError::Schema { .. })));
    }

    #[test]
    fn test_duplicate_names_rejected() {
        let result = parse(
            "lcn:\n  connections:\n    - { name: a, host: h1 }\n    - { name: a, host: h2 }\n",
        );
        assert!(matches!(result, Err(ConfigError::ValidationFailed { .. })));
    }

    #[test]
    fn test_zero_port_rejected() {
        let result = parse("lcn:\n  connections:\n    - { name: a, host: h, port: 0 }\n");
        assert!(matches!(result, Err(ConfigError::ValidationFailed { .. })));
    }

    #[test]
    fn test_duplicate_module_rejected() {
        let result = parse(
            r#"
lcn:
  connections:
    - name: a
      host: h
      modules:
        - { segment_id: 0, address_id: 7 }
        - { segment_id: 0, address_id: 7 }
"#,
        );
        assert!(matches!(result, Err(ConfigError::ValidationFailed { .. })));
    }

    #[test]
    fn test_load_with_secret() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("secrets.yaml"), "lcn_password: hunter2\n").unwrap();
        std::fs::write(
            dir.path().join(CONFIG_FILE),
            "lcn:\n  connections:\n    - { name: pchk, host: h, password: !secret lcn_password }\n",
        )
        .unwrap();

        let config = HubConfig::load(dir.path()).unwrap();
        assert_eq!(config.lcn.connections[0].password, "hunter2");
    }

    #[test]
    fn test_missing_file_is_default() {
        let dir = TempDir::new().unwrap();
        let config = HubConfig::load(dir.path()).unwrap();
        assert!(config.lcn.connections.is_empty());
    }
}

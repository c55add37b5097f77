//! Device and entity records kept per host

use std::fmt;

use lcn_bus::{ModuleAddress, ModuleIdentity};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// Namespace for all LCN unique ids
pub const LCN_NAMESPACE: Uuid = Uuid::from_u128(0x4c43_4e00_7a3e_5b1d_9e07_2d4f_6b8e_1c05);

/// Stable unique id for a module or group seen through `host_name`.
///
/// Repeated scans of the same physical address always yield the same id.
pub fn generate_unique_id(host_name: &str, address: &ModuleAddress) -> String {
    let kind = if address.is_group { 'g' } else { 'm' };
    let name = format!(
        "{}:{}:{}:{}",
        host_name, address.segment_id, address.address_id, kind
    );
    Uuid::new_v5(&LCN_NAMESPACE, name.as_bytes())
        .simple()
        .to_string()
}

/// Stable unique id for an entity on a device resource
pub fn entity_unique_id(unique_device_id: &str, platform: Platform, resource: &str) -> String {
    let name = format!("{}:{}:{}", unique_device_id, platform.as_str(), resource);
    Uuid::new_v5(&LCN_NAMESPACE, name.as_bytes())
        .simple()
        .to_string()
}

/// A module or group as persisted in a host's config entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceRecord {
    pub unique_id: String,
    pub segment_id: u8,
    pub address_id: u8,
    pub is_group: bool,
    pub name: String,
    pub hardware_serial: i64,
    pub software_serial: i64,
    pub hardware_type: i32,
}

impl DeviceRecord {
    /// New record for a freshly discovered address
    pub fn from_identity(host_name: &str, identity: &ModuleIdentity) -> Self {
        Self {
            unique_id: generate_unique_id(host_name, &identity.address),
            segment_id: identity.address.segment_id,
            address_id: identity.address.address_id,
            is_group: identity.address.is_group,
            name: identity.name.clone(),
            hardware_serial: identity.hardware_serial,
            software_serial: identity.software_serial,
            hardware_type: identity.hardware_type,
        }
    }

    pub fn address(&self) -> ModuleAddress {
        ModuleAddress {
            segment_id: self.segment_id,
            address_id: self.address_id,
            is_group: self.is_group,
        }
    }

    pub fn identity_key(&self) -> (u8, u8, bool) {
        (self.segment_id, self.address_id, self.is_group)
    }

    pub fn sort_key(&self) -> (bool, u8, u8) {
        (self.is_group, self.segment_id, self.address_id)
    }

    /// Copy the mutable fields from a fresh identity.
    ///
    /// Identity fields and `unique_id` are left alone. Returns true if
    /// anything changed.
    pub fn refresh(&mut self, identity: &ModuleIdentity) -> bool {
        let changed = self.name != identity.name
            || self.hardware_serial != identity.hardware_serial
            || self.software_serial != identity.software_serial
            || self.hardware_type != identity.hardware_type;

        self.name = identity.name.clone();
        self.hardware_serial = identity.hardware_serial;
        self.software_serial = identity.software_serial;
        self.hardware_type = identity.hardware_type;
        changed
    }
}

/// Entity platform an [`EntityRecord`] is exposed through
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Platform {
    BinarySensor,
    Climate,
    Cover,
    Light,
    Scene,
    Sensor,
    Switch,
}

impl Platform {
    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::BinarySensor => "binary_sensor",
            Platform::Climate => "climate",
            Platform::Cover => "cover",
            Platform::Light => "light",
            Platform::Scene => "scene",
            Platform::Sensor => "sensor",
            Platform::Switch => "switch",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An entity configured on a device
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityRecord {
    pub unique_id: String,
    pub unique_device_id: String,
    pub platform: Platform,
    /// Lower-case port or variable name, e.g. `output1`, `relay3`
    pub resource: String,
    pub name: String,
    #[serde(default)]
    pub platform_data: Map<String, Value>,
}

impl EntityRecord {
    pub fn new(
        unique_device_id: impl Into<String>,
        platform: Platform,
        resource: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        let unique_device_id = unique_device_id.into();
        let resource = resource.into().to_lowercase();
        Self {
            unique_id: entity_unique_id(&unique_device_id, platform, &resource),
            unique_device_id,
            platform,
            resource,
            name: name.into(),
            platform_data: Map::new(),
        }
    }

    pub fn with_platform_data(mut self, platform_data: Map<String, Value>) -> Self {
        self.platform_data = platform_data;
        self
    }

    pub fn sort_key(&self) -> (&str, &str) {
        (self.platform.as_str(), self.resource.as_str())
    }
}

pub fn sort_devices(devices: &mut [DeviceRecord]) {
    devices.sort_by_key(|d| d.sort_key());
}

pub fn sort_entities(entities: &mut [EntityRecord]) {
    entities.sort_by(|a, b| a.sort_key().cmp(&b.sort_key()));
}

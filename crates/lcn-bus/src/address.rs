//! Module and group addresses

use std::fmt;

use serde::{Deserialize, Serialize};

/// Address of a module or group on the bus.
///
/// A segment id of 0 means "the local segment".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ModuleAddress {
    pub segment_id: u8,
    pub address_id: u8,
    #[serde(default)]
    pub is_group: bool,
}

impl ModuleAddress {
    pub fn module(segment_id: u8, address_id: u8) -> Self {
        Self {
            segment_id,
            address_id,
            is_group: false,
        }
    }

    pub fn group(segment_id: u8, address_id: u8) -> Self {
        Self {
            segment_id,
            address_id,
            is_group: true,
        }
    }

    /// Identity key used for matching persisted device records
    pub fn key(&self) -> (u8, u8, bool) {
        (self.segment_id, self.address_id, self.is_group)
    }

    /// Display order: modules before groups, then segment, then address
    pub fn sort_key(&self) -> (bool, u8, u8) {
        (self.is_group, self.segment_id, self.address_id)
    }
}

impl fmt::Display for ModuleAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = if self.is_group { 'G' } else { 'M' };
        write!(f, "S{:03}{}{:03}", self.segment_id, kind, self.address_id)
    }
}

/// What a module reports about itself when queried.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleIdentity {
    pub address: ModuleAddress,
    pub name: String,
    pub hardware_serial: i64,
    pub software_serial: i64,
    pub hardware_type: i32,
}

impl ModuleIdentity {
    /// Identity for an address that has not reported serial information
    pub fn unknown(address: ModuleAddress, name: impl Into<String>) -> Self {
        Self {
            address,
            name: name.into(),
            hardware_serial: -1,
            software_serial: -1,
            hardware_type: -1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        assert_eq!(ModuleAddress::module(0, 7).to_string(), "S000M007");
        assert_eq!(ModuleAddress::group(5, 12).to_string(), "S005G012");
    }

    #[test]
    fn test_sort_key_puts_groups_last() {
        let mut addrs = vec![
            ModuleAddress::group(0, 3),
            ModuleAddress::module(1, 5),
            ModuleAddress::module(0, 9),
        ];
        addrs.sort_by_key(|a| a.sort_key());
        assert_eq!(
            addrs,
            vec![
                ModuleAddress::module(0, 9),
                ModuleAddress::module(1, 5),
                ModuleAddress::group(0, 3),
            ]
        );
    }

    #[test]
    fn test_is_group_defaults_to_false() {
        let addr: ModuleAddress =
            serde_json::from_str(r#"{"segment_id": 0, "address_id": 7}"#).unwrap();
        assert!(!addr.is_group);
    }
}

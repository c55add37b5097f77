//! Registry seen by the deletion cascade

use lcn_registries::Registries;

/// Identifier domain of every LCN registry device
pub const DOMAIN: &str = "lcn";

/// Device registry operations used when removing records.
pub trait DeviceRegistryHandle: Send + Sync {
    /// Internal registry id of the device carrying `(domain, id)`
    fn find_by_identifier(&self, domain: &str, id: &str) -> Option<String>;

    /// Remove a device by internal id; false if it was not registered
    fn remove_by_id(&self, id: &str) -> bool;
}

impl DeviceRegistryHandle for Registries {
    fn find_by_identifier(&self, domain: &str, id: &str) -> Option<String> {
        self.devices
            .get_by_identifier(domain, id)
            .map(|device| device.id.clone())
    }

    fn remove_by_id(&self, id: &str) -> bool {
        self.remove_device(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lcn_registries::DeviceIdentifier;
    use tempfile::TempDir;

    #[test]
    fn test_registries_handle() {
        let temp_dir = TempDir::new().unwrap();
        let registries = Registries::new(temp_dir.path());
        let device = registries
            .devices
            .get_or_create(&[DeviceIdentifier::new(DOMAIN, "abc")], None, None);

        let handle: &dyn DeviceRegistryHandle = &registries;
        assert_eq!(handle.find_by_identifier(DOMAIN, "abc"), Some(device.id.clone()));
        assert!(handle.remove_by_id(&device.id));
        assert!(!handle.remove_by_id(&device.id));
        assert_eq!(handle.find_by_identifier(DOMAIN, "abc"), None);
    }
}

//! Store errors

use lcn_bus::{BusError, ModuleAddress};
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("device not found: {0}")]
    DeviceNotFound(String),

    #[error("entity not found: {0}")]
    EntityNotFound(String),

    /// Entity references a device that is not in the store
    #[error("unknown device: {0}")]
    UnknownDevice(String),

    #[error("entity {platform}/{resource} already exists on device {unique_device_id}")]
    DuplicateEntity {
        unique_device_id: String,
        platform: String,
        resource: String,
    },

    /// Two records for the same address; prevented by the store guard
    #[error("duplicate device record for address {0}")]
    DuplicateAddress(ModuleAddress),

    #[error("store for host {0} is closed")]
    StoreClosed(String),

    /// Identity query for one address failed
    #[error("query failed: {0}")]
    Query(#[from] BusError),
}

pub type StoreResult<T> = Result<T, StoreError>;

//! LCN device store
//!
//! Each bus host owns a [`ConfigStore`] with its device and entity
//! records. This crate provides:
//!
//! - [`reconcile`] - merge a scan sweep into the store without dropping
//!   devices that were not rediscovered
//! - [`delete_device`] / [`delete_entity`] - the deletion cascade, kept
//!   consistent with a [`DeviceRegistryHandle`]
//! - [`ConfigStore::add_entity`] and snapshot reads for the control surface

pub mod delete;
pub mod error;
pub mod records;
pub mod reconcile;
pub mod registry;
pub mod store;

pub use delete::{delete_device, delete_entity};
pub use error::{StoreError, StoreResult};
pub use records::{
    entity_unique_id, generate_unique_id, DeviceRecord, EntityRecord, Platform, LCN_NAMESPACE,
};
pub use reconcile::{reconcile, ScanFailure, ScanReport};
pub use registry::{DeviceRegistryHandle, DOMAIN};
pub use store::{ConfigStore, StoreSnapshot};

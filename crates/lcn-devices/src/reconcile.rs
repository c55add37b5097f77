//! Scan reconciliation
//!
//! One identity query per discovered address runs concurrently. Each
//! result is matched against the device list under the store guard, so
//! the find-or-create step is atomic per address. Devices that were not
//! rediscovered stay in the store.

use futures::future::join_all;
use lcn_bus::{BusConnection, ModuleAddress, ModuleIdentity};
use tracing::{debug, info, warn};

use crate::error::{StoreError, StoreResult};
use crate::records::{generate_unique_id, sort_devices, DeviceRecord};
use crate::store::ConfigStore;

/// An address whose result could not be applied
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanFailure {
    pub address: ModuleAddress,
    pub error: StoreError,
}

/// Outcome of one reconciliation sweep
#[derive(Debug, Clone, Default)]
pub struct ScanReport {
    /// Sorted device list after the sweep
    pub devices: Vec<DeviceRecord>,
    /// Unique ids of records created by this sweep
    pub created: Vec<String>,
    /// Unique ids of existing records refreshed by this sweep
    pub updated: Vec<String>,
    pub failures: Vec<ScanFailure>,
}

impl ScanReport {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

enum Applied {
    Created(String),
    Updated(String),
}

/// Reconcile `addresses` into `store`, querying each through `connection`.
///
/// Per-address failures are collected in the report and do not stop the
/// sweep. Fails only if the store is already closed.
pub async fn reconcile<C>(
    connection: &C,
    addresses: &[ModuleAddress],
    store: &ConfigStore,
) -> StoreResult<ScanReport>
where
    C: BusConnection + ?Sized,
{
    if store.is_closed().await {
        return Err(store.closed_error());
    }
    debug!(
        "{}: reconciling {} addresses",
        store.host(),
        addresses.len()
    );

    let outcomes = join_all(addresses.iter().map(|&address| async move {
        let result = match connection.resolve_identity(address).await {
            Ok(identity) => apply_identity(store, identity).await,
            Err(e) => Err(StoreError::from(e)),
        };
        (address, result)
    }))
    .await;

    let mut report = ScanReport::default();
    for (address, outcome) in outcomes {
        match outcome {
            Ok(Applied::Created(id)) => report.created.push(id),
            Ok(Applied::Updated(id)) => report.updated.push(id),
            Err(error) => {
                warn!("{}: skipping {}: {}", store.host(), address, error);
                report.failures.push(ScanFailure { address, error });
            }
        }
    }

    {
        let mut inner = store.guard().await;
        sort_devices(&mut inner.devices);
        report.devices = inner.devices.clone();
    }
    if !report.created.is_empty() || !report.updated.is_empty() {
        store.mark_dirty();
    }

    info!(
        "{}: scan reconciled {} created, {} updated, {} failed",
        store.host(),
        report.created.len(),
        report.updated.len(),
        report.failures.len()
    );
    Ok(report)
}

/// Find-or-create one resolved identity under the store guard
async fn apply_identity(store: &ConfigStore, identity: ModuleIdentity) -> StoreResult<Applied> {
    let mut inner = store.guard_open().await?;

    if let Some(existing) = inner.device_by_key(identity.address.key()) {
        if existing.refresh(&identity) {
            debug!(
                "{}: refreshed {} ({})",
                store.host(),
                identity.address,
                existing.name
            );
        }
        return Ok(Applied::Updated(existing.unique_id.clone()));
    }

    let unique_id = generate_unique_id(store.host(), &identity.address);
    if inner.device_position(&unique_id).is_some() {
        return Err(StoreError::DuplicateAddress(identity.address));
    }

    let record = DeviceRecord::from_identity(store.host(), &identity);
    debug!(
        "{}: new device {} ({})",
        store.host(),
        identity.address,
        record.name
    );
    inner.devices.push(record);
    sort_devices(&mut inner.devices);
    Ok(Applied::Created(unique_id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use lcn_bus::{BusConnector, BusError, ConnectionSettings, DimMode, MemoryConnector};

    fn settings() -> ConnectionSettings {
        ConnectionSettings {
            name: "pchk".to_string(),
            host: "127.0.0.1".to_string(),
            port: 4114,
            username: "lcn".to_string(),
            password: "lcn".to_string(),
            sk_num_tries: 0,
            dim_mode: DimMode::Steps200,
        }
    }

    #[tokio::test]
    async fn test_unknown_address_is_a_failure() {
        let connector = MemoryConnector::new();
        connector.bus("pchk").add_named(ModuleAddress::module(0, 7), "Kitchen");
        let conn = connector.connect(&settings()).await.unwrap();
        let store = ConfigStore::new("pchk");

        let report = reconcile(
            conn.as_ref(),
            &[ModuleAddress::module(0, 7), ModuleAddress::module(0, 8)],
            &store,
        )
        .await
        .unwrap();

        assert_eq!(report.created.len(), 1);
        assert!(!report.is_complete());
        assert_eq!(
            report.failures,
            vec![ScanFailure {
                address: ModuleAddress::module(0, 8),
                error: StoreError::Query(BusError::UnknownAddress(ModuleAddress::module(0, 8))),
            }]
        );
        assert!(store.is_dirty());
    }

    #[tokio::test]
    async fn test_closed_store_is_rejected() {
        let connector = MemoryConnector::new();
        let conn = connector.connect(&settings()).await.unwrap();
        let store = ConfigStore::new("pchk");
        store.close().await;

        let result = reconcile(conn.as_ref(), &[ModuleAddress::module(0, 7)], &store).await;
        assert_eq!(result.unwrap_err(), StoreError::StoreClosed("pchk".to_string()));
    }

    #[tokio::test]
    async fn test_empty_sweep_leaves_store_clean() {
        let connector = MemoryConnector::new();
        let conn = connector.connect(&settings()).await.unwrap();
        let store = ConfigStore::new("pchk");

        let report = reconcile(conn.as_ref(), &[], &store).await.unwrap();
        assert!(report.devices.is_empty());
        assert!(!store.is_dirty());
    }
}

//! In-memory bus
//!
//! Behaves like a PCHK host whose modules are declared up front. Failures
//! and query latency can be scripted per address, which is what the
//! reconciliation tests rely on.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use tracing::{debug, info};

use crate::address::{ModuleAddress, ModuleIdentity};
use crate::connection::{BusConnection, BusConnector, ConnectionSettings};
use crate::error::{BusError, BusResult};

/// Simulated bus segment set behind one host
pub struct MemoryBus {
    name: String,
    modules: DashMap<ModuleAddress, ModuleIdentity>,
    failures: DashMap<ModuleAddress, BusError>,
    scan_failure: Mutex<Option<BusError>>,
    latency_ms: AtomicU64,
    resolve_calls: AtomicUsize,
}

impl MemoryBus {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            modules: DashMap::new(),
            failures: DashMap::new(),
            scan_failure: Mutex::new(None),
            latency_ms: AtomicU64::new(0),
            resolve_calls: AtomicUsize::new(0),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Add or replace a module/group
    pub fn add_module(&self, identity: ModuleIdentity) {
        debug!("{}: module {} present", self.name, identity.address);
        self.modules.insert(identity.address, identity);
    }

    /// Add a module with a name and placeholder serials
    pub fn add_named(&self, address: ModuleAddress, name: impl Into<String>) {
        self.add_module(ModuleIdentity::unknown(address, name));
    }

    pub fn remove_module(&self, address: &ModuleAddress) -> Option<ModuleIdentity> {
        self.modules.remove(address).map(|(_, identity)| identity)
    }

    /// Rename a module in place, as if reprogrammed with the LCN-PRO tool
    pub fn rename(&self, address: &ModuleAddress, name: impl Into<String>) -> bool {
        match self.modules.get_mut(address) {
            Some(mut identity) => {
                identity.name = name.into();
                true
            }
            None => false,
        }
    }

    /// Make every identity query for `address` fail with `error`
    pub fn fail_address(&self, address: ModuleAddress, error: BusError) {
        self.failures.insert(address, error);
    }

    pub fn clear_failure(&self, address: &ModuleAddress) {
        self.failures.remove(address);
    }

    /// Make the next scans fail (or succeed again with `None`)
    pub fn fail_scan(&self, error: Option<BusError>) {
        if let Ok(mut slot) = self.scan_failure.lock() {
            *slot = error;
        }
    }

    /// Delay applied to every identity query
    pub fn set_latency(&self, latency: Duration) {
        self.latency_ms
            .store(latency.as_millis() as u64, Ordering::Relaxed);
    }

    /// Number of identity queries answered or failed so far
    pub fn resolve_calls(&self) -> usize {
        self.resolve_calls.load(Ordering::Relaxed)
    }

    fn addresses(&self) -> Vec<ModuleAddress> {
        let mut addresses: Vec<_> = self.modules.iter().map(|r| *r.key()).collect();
        addresses.sort_by_key(|a| a.sort_key());
        addresses
    }

    fn scan_failure(&self) -> Option<BusError> {
        self.scan_failure.lock().ok().and_then(|slot| slot.clone())
    }
}

/// Connector handing out [`MemoryConnection`]s, one bus per host name
#[derive(Default)]
pub struct MemoryConnector {
    buses: DashMap<String, Arc<MemoryBus>>,
    connect_failures: DashMap<String, BusError>,
}

impl MemoryConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bus for a host name, created empty on first use
    pub fn bus(&self, name: &str) -> Arc<MemoryBus> {
        self.buses
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(MemoryBus::new(name)))
            .clone()
    }

    /// Make connecting to `name` fail with `error`
    pub fn fail_connect(&self, name: &str, error: BusError) {
        self.connect_failures.insert(name.to_string(), error);
    }

    pub fn clear_connect_failure(&self, name: &str) {
        self.connect_failures.remove(name);
    }
}

#[async_trait]
impl BusConnector for MemoryConnector {
    async fn connect(&self, settings: &ConnectionSettings) -> BusResult<Arc<dyn BusConnection>> {
        if let Some(error) = self.connect_failures.get(&settings.name) {
            return Err(error.clone());
        }

        let bus = self.bus(&settings.name);
        info!(
            "Connected to in-memory bus {} ({}:{})",
            settings.name, settings.host, settings.port
        );
        Ok(Arc::new(MemoryConnection {
            id: Mutex::new(settings.name.clone()),
            bus,
            closed: AtomicBool::new(false),
        }))
    }
}

/// Connection to a [`MemoryBus`]
pub struct MemoryConnection {
    id: Mutex<String>,
    bus: Arc<MemoryBus>,
    closed: AtomicBool,
}

impl MemoryConnection {
    pub fn bus(&self) -> &Arc<MemoryBus> {
        &self.bus
    }

    fn id(&self) -> String {
        self.id.lock().map(|id| id.clone()).unwrap_or_default()
    }

    fn ensure_open(&self) -> BusResult<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(BusError::Closed(self.id()));
        }
        Ok(())
    }
}

#[async_trait]
impl BusConnection for MemoryConnection {
    fn connection_id(&self) -> String {
        self.id()
    }

    fn set_connection_id(&self, connection_id: &str) {
        if let Ok(mut id) = self.id.lock() {
            debug!("Renamed in-memory connection {} to {}", id, connection_id);
            *id = connection_id.to_string();
        }
    }

    async fn scan_modules(&self) -> BusResult<Vec<ModuleAddress>> {
        self.ensure_open()?;
        if let Some(error) = self.bus.scan_failure() {
            return Err(error);
        }
        let addresses = self.bus.addresses();
        debug!("{}: scan found {} addresses", self.id(), addresses.len());
        Ok(addresses)
    }

    async fn resolve_identity(&self, address: ModuleAddress) -> BusResult<ModuleIdentity> {
        self.ensure_open()?;
        self.bus.resolve_calls.fetch_add(1, Ordering::Relaxed);

        let latency = self.bus.latency_ms.load(Ordering::Relaxed);
        if latency > 0 {
            tokio::time::sleep(Duration::from_millis(latency)).await;
        }
        self.ensure_open()?;

        if let Some(error) = self.bus.failures.get(&address) {
            return Err(error.clone());
        }
        self.bus
            .modules
            .get(&address)
            .map(|r| r.value().clone())
            .ok_or(BusError::UnknownAddress(address))
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        debug!("Closed in-memory connection {}", self.id());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::DimMode;

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

    #[tokio::test]
    async fn test_scan_and_resolve() {
        let connector = MemoryConnector::new();
        let bus = connector.bus("pchk");
        bus.add_named(ModuleAddress::module(0, 7), "Kitchen");
        bus.add_named(ModuleAddress::group(0, 9), "Groupies");

        let conn = connector.connect(&settings("pchk")).await.unwrap();
        let found = conn.scan_modules().await.unwrap();
        assert_eq!(
            found,
            vec![ModuleAddress::module(0, 7), ModuleAddress::group(0, 9)]
        );

        let identity = conn
            .resolve_identity(ModuleAddress::module(0, 7))
            .await
            .unwrap();
        assert_eq!(identity.name, "Kitchen");
        assert_eq!(bus.resolve_calls(), 1);
    }

    #[tokio::test]
    async fn test_scripted_failures() {
        let connector = MemoryConnector::new();
        let bus = connector.bus("pchk");
        bus.add_named(ModuleAddress::module(0, 7), "Kitchen");
        bus.fail_address(
            ModuleAddress::module(0, 7),
            BusError::Timeout("name request".into()),
        );

        let conn = connector.connect(&settings("pchk")).await.unwrap();
        let result = conn.resolve_identity(ModuleAddress::module(0, 7)).await;
        assert!(matches!(result, Err(BusError::Timeout(_))));

        let result = conn.resolve_identity(ModuleAddress::module(0, 8)).await;
        assert!(matches!(result, Err(BusError::UnknownAddress(_))));
    }

    #[tokio::test]
    async fn test_connect_failure() {
        let connector = MemoryConnector::new();
        connector.fail_connect("pchk", BusError::License("pchk".into()));
        let result = connector.connect(&settings("pchk")).await;
        assert!(matches!(result, Err(BusError::License(_))));

        connector.clear_connect_failure("pchk");
        assert!(connector.connect(&settings("pchk")).await.is_ok());
    }

    #[tokio::test]
    async fn test_closed_connection_rejects_requests() {
        let connector = MemoryConnector::new();
        let conn = connector.connect(&settings("pchk")).await.unwrap();
        conn.close().await;
        assert!(matches!(
            conn.scan_modules().await,
            Err(BusError::Closed(_))
        ));
    }

    #[tokio::test]
    async fn test_rename_connection() {
        let connector = MemoryConnector::new();
        connector.bus("pchk").add_named(ModuleAddress::module(0, 7), "Kitchen");
        let conn = connector.connect(&settings("pchk")).await.unwrap();
        assert_eq!(conn.connection_id(), "pchk");

        conn.set_connection_id("foobar");
        assert_eq!(conn.connection_id(), "foobar");
        assert_eq!(conn.scan_modules().await.unwrap().len(), 1);

        conn.close().await;
        assert_eq!(
            conn.scan_modules().await,
            Err(BusError::Closed("foobar".to_string()))
        );
    }

    #[test]
    fn test_settings_debug_hides_password() {
        let rendered = format!("{:?}", settings("pchk"));
        assert!(!rendered.contains("password: \"lcn\""));
        assert!(rendered.contains("********"));
    }
}

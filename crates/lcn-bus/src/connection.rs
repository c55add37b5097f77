//! Connection traits implemented by bus clients

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::address::{ModuleAddress, ModuleIdentity};
use crate::error::BusResult;

/// Dimming resolution of the output ports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DimMode {
    Steps50,
    #[default]
    Steps200,
}

impl DimMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            DimMode::Steps50 => "steps50",
            DimMode::Steps200 => "steps200",
        }
    }
}

/// Settings needed to open a PCHK connection
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionSettings {
    /// Connection name, also the host name used in unique ids
    pub name: String,
    /// IP address or hostname of the PCHK server
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    /// Segment coupler scan attempts (0 disables segment scanning)
    #[serde(default)]
    pub sk_num_tries: u32,
    #[serde(default)]
    pub dim_mode: DimMode,
}

impl fmt::Debug for ConnectionSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionSettings")
            .field("name", &self.name)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &"********")
            .field("sk_num_tries", &self.sk_num_tries)
            .field("dim_mode", &self.dim_mode)
            .finish()
    }
}

/// Opens connections to a bus host
#[async_trait]
pub trait BusConnector: Send + Sync {
    /// Connect and authenticate.
    ///
    /// Fails with `Authentication`, `License` or `Timeout` when the host
    /// refuses the session.
    async fn connect(&self, settings: &ConnectionSettings) -> BusResult<Arc<dyn BusConnection>>;
}

/// An established connection to one bus host
#[async_trait]
pub trait BusConnection: Send + Sync {
    /// Display name of this connection, the title of its config entry
    fn connection_id(&self) -> String;

    /// Rename a live connection; unique ids keep using the host name
    fn set_connection_id(&self, connection_id: &str);

    /// Broadcast a scan and return every address that answered
    async fn scan_modules(&self) -> BusResult<Vec<ModuleAddress>>;

    /// Wait for serial information and request the name of one address
    async fn resolve_identity(&self, address: ModuleAddress) -> BusResult<ModuleIdentity>;

    /// Close the connection; outstanding requests fail with `Closed`
    async fn close(&self);
}

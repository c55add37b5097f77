//! Hub errors

use lcn_bus::BusError;
use lcn_config_entries::ConfigEntriesError;
use lcn_devices::StoreError;
use lcn_registries::StorageError;
use thiserror::Error;

/// Why a host could not be set up
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SetupError {
    #[error("authentication failed: {0}")]
    Authentication(String),

    #[error("no free license on PCHK: {0}")]
    License(String),

    #[error("connection timed out: {0}")]
    Timeout(String),

    #[error("connection failed: {0}")]
    Connection(String),
}

impl From<BusError> for SetupError {
    fn from(error: BusError) -> Self {
        match error {
            BusError::Authentication(msg) => SetupError::Authentication(msg),
            BusError::License(msg) => SetupError::License(msg),
            BusError::Timeout(msg) => SetupError::Timeout(msg),
            other => SetupError::Connection(other.to_string()),
        }
    }
}

#[derive(Debug, Error)]
pub enum HubError {
    /// No loaded host with this name
    #[error("host not found: {0}")]
    HostNotFound(String),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("bus error: {0}")]
    Bus(#[from] BusError),

    #[error("setup failed: {0}")]
    Setup(#[from] SetupError),

    #[error(transparent)]
    ConfigEntries(#[from] ConfigEntriesError),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
}

pub type HubResult<T> = Result<T, HubError>;

//! Bus client errors

use thiserror::Error;

use crate::address::ModuleAddress;

/// Errors surfaced by the bus client
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BusError {
    /// PCHK rejected the username/password
    #[error("authentication failed for connection {0}")]
    Authentication(String),

    /// PCHK has no free license slot
    #[error("license error on connection {0}")]
    License(String),

    /// Connection or request timed out
    #[error("timeout: {0}")]
    Timeout(String),

    /// Transport failure
    #[error("connection error: {0}")]
    Connection(String),

    /// No module answered at this address
    #[error("no module at {0}")]
    UnknownAddress(ModuleAddress),

    /// Connection was closed locally
    #[error("connection {0} is closed")]
    Closed(String),
}

pub type BusResult<T> = Result<T, BusError>;

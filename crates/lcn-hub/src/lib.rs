//! LCN hub runtime
//!
//! The [`Hub`] sets up one runtime per configured PCHK host: it connects
//! through a [`lcn_bus::BusConnector`], loads the host's device store from
//! its config entry, mirrors the records into the registries and keeps
//! everything persisted as scans and deletions change it.

mod error;
mod hub;
pub mod sync;

pub use error::{HubError, HubResult, SetupError};
pub use hub::{HostInfo, HostRuntime, Hub};

//! LCN bus client boundary
//!
//! The bus protocol itself (PCK framing, acknowledgements, segment
//! coupler handling) lives in an external client. This crate only
//! describes what the rest of the workspace needs from it:
//!
//! - [`ModuleAddress`] / [`ModuleIdentity`] - who is on the bus
//! - [`BusConnector`] / [`BusConnection`] - how to reach it
//! - [`BusError`] - how it fails
//!
//! [`MemoryConnector`] is an in-memory bus used by tests and by the
//! server when no hardware transport is linked in.

pub mod address;
pub mod connection;
pub mod error;
pub mod memory;

pub use address::{ModuleAddress, ModuleIdentity};
pub use connection::{BusConnection, BusConnector, ConnectionSettings, DimMode};
pub use error::{BusError, BusResult};
pub use memory::{MemoryBus, MemoryConnection, MemoryConnector};

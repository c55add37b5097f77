//! Config Entries
//!
//! One config entry per PCHK host. An entry carries the connection
//! settings plus the host's device and entity lists, and tracks the
//! host's setup/unload lifecycle.
//!
//! # Key Types
//!
//! - [`ConfigEntry`] / [`HostData`] - a host and its persisted lists
//! - [`ConfigEntryState`] - lifecycle state of an entry
//! - [`ConfigEntries`] - manager for all entries
//!
//! # Storage
//!
//! Entries are persisted in `.storage/lcn.config_entries`.

pub mod entry;
pub mod manager;
pub mod state_machine;

pub use entry::{
    ConfigEntry, ConfigEntrySource, ConfigEntryState, ConfigEntryUpdate, HostData, DOMAIN,
};
pub use manager::{
    ConfigEntries, ConfigEntriesData, ConfigEntriesError, ConfigEntriesResult, STORAGE_KEY,
    STORAGE_MINOR_VERSION, STORAGE_VERSION,
};
pub use state_machine::InvalidTransition;

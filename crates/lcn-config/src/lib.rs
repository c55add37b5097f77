//! YAML configuration for the LCN hub
//!
//! `configuration.yaml` is loaded with support for:
//!
//! - `!include path` - include another YAML file
//! - `!secret key` - substitute from secrets.yaml
//! - `!env_var VAR` - environment variable substitution
//!
//! and parsed into [`HubConfig`] (`api:` and `lcn:` sections).
//!
//! # Example
//!
//! ```ignore
//! use lcn_config::HubConfig;
//!
//! let config = HubConfig::load("/config")?;
//! for conn in &config.lcn.connections {
//!     println!("{} -> {}:{}", conn.name, conn.host, conn.port);
//! }
//! ```

mod error;
mod hub_config;
mod loader;
mod secrets;

pub use error::{ConfigError, ConfigResult};
pub use hub_config::{
    ApiConfig, ConnectionConfig, EntityConfig, HubConfig, LcnConfig, ModuleConfig, CONFIG_FILE,
};
pub use loader::{load_yaml, YamlLoader};
pub use secrets::Secrets;

pub use serde_yaml::Value;

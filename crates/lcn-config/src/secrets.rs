//! `secrets.yaml` lookup

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde_yaml::Value;
use tracing::debug;

use crate::error::{ConfigError, ConfigResult};

/// Secrets loaded from `<config_dir>/secrets.yaml`
///
/// Scalars keep their YAML type, so `port: !secret pchk_port` still
/// deserializes as a number.
#[derive(Debug, Clone, Default)]
pub struct Secrets {
    values: HashMap<String, Value>,
    path: PathBuf,
}

impl Secrets {
    /// Load secrets; a missing file yields an empty store
    pub fn load(config_dir: &Path) -> ConfigResult<Self> {
        let path = config_dir.join("secrets.yaml");

        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No secrets.yaml at {:?}", path);
                return Ok(Self {
                    values: HashMap::new(),
                    path,
                });
            }
            Err(source) => return Err(ConfigError::ReadFile { path, source }),
        };

        let values: HashMap<String, Value> = if content.trim().is_empty() {
            HashMap::new()
        } else {
            serde_yaml::from_str(&content).map_err(|source| ConfigError::ParseYaml {
                path: path.clone(),
                source,
            })?
        };

        debug!("Loaded {} secrets from {:?}", values.len(), path);
        Ok(Self { values, path })
    }

    pub fn get(&self, key: &str) -> ConfigResult<&Value> {
        self.values
            .get(key)
            .ok_or_else(|| ConfigError::SecretNotFound {
                key: key.to_string(),
            })
    }

    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_load_secrets() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("secrets.yaml"),
            "lcn_password: hunter2\npchk_port: 4114\n",
        )
        .unwrap();

        let secrets = Secrets::load(dir.path()).unwrap();
        assert_eq!(
            secrets.get("lcn_password").unwrap(),
            &Value::String("hunter2".to_string())
        );
        assert_eq!(secrets.get("pchk_port").unwrap().as_u64(), Some(4114));
        assert_eq!(secrets.len(), 2);
        assert!(matches!(
            secrets.get("missing"),
            Err(ConfigError::SecretNotFound { .. })
        ));
    }

    #[test]
    fn test_no_secrets_file() {
        let dir = TempDir::new().unwrap();
        let secrets = Secrets::load(dir.path()).unwrap();
        assert!(secrets.is_empty());
        assert!(!secrets.contains("anything"));
    }

    #[test]
    fn test_empty_secrets_file() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("secrets.yaml"), "").unwrap();
        assert!(Secrets::load(dir.path()).unwrap().is_empty());
    }
}

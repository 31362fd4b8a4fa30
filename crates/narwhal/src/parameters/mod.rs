//! Parameter-store lookups and reference resolution.
//!
//! Configuration values beginning with `/` are keys into a key-value
//! parameter store. [`ParameterResolver`] resolves them through a
//! [`ParameterStore`] backend:
//! - [`SsmParameterStore`]: AWS Systems Manager Parameter Store
//! - [`StaticParameterStore`]: an in-memory map for local runs and tests

mod resolver;
mod ssm;

use std::collections::HashMap;
use std::path::Path;

use async_trait::async_trait;

use narwhal_core::error::ConfigError;
use narwhal_core::load_definitions_file;

use crate::error::LookupError;

pub use resolver::ParameterResolver;
pub use ssm::SsmParameterStore;

/// A key-value lookup service holding secrets and parameters.
#[async_trait]
pub trait ParameterStore: Send + Sync {
    /// Look up a key, decrypting secret values.
    async fn get_parameter(&self, key: &str) -> Result<String, LookupError>;
}

/// Parameter store backed by a fixed map.
#[derive(Debug, Clone, Default)]
pub struct StaticParameterStore {
    values: HashMap<String, String>,
}

impl StaticParameterStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_parameter(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.values.insert(key.into(), value.into());
        self
    }

    /// Load a flat `key: value` map from a YAML or JSON file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let values: HashMap<String, String> = load_definitions_file(path)?;
        Ok(Self { values })
    }
}

impl FromIterator<(String, String)> for StaticParameterStore {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Self {
            values: iter.into_iter().collect(),
        }
    }
}

#[async_trait]
impl ParameterStore for StaticParameterStore {
    async fn get_parameter(&self, key: &str) -> Result<String, LookupError> {
        self.values
            .get(key)
            .cloned()
            .ok_or_else(|| LookupError::NotFound {
                key: key.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_static_store_lookup() {
        let store = StaticParameterStore::new().with_parameter("/dev/db", "lake_dev");

        assert_eq!(store.get_parameter("/dev/db").await.unwrap(), "lake_dev");
        let err = store.get_parameter("/dev/other").await.unwrap_err();
        assert!(matches!(err, LookupError::NotFound { .. }));
    }

    #[test]
    fn test_static_store_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("params.yaml");
        std::fs::write(&path, "/dev/db: lake_dev\n/dev/tables/orders: orders\n").unwrap();

        let store = StaticParameterStore::from_file(&path).unwrap();
        assert_eq!(store.values.len(), 2);
    }
}

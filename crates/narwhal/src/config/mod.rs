//! Configuration for the narwhal ingestion pipeline.
//!
//! Two layers:
//! - [`Settings`]: process-level settings (region, environment, database
//!   reference, catalog location, run options), loaded once from CLI flags or
//!   the environment.
//! - [`TableConfig`]: one entry of the table definitions, whose values may be
//!   parameter-store references. [`ResolvedTableConfig`] is its resolved form.

mod cli;
mod table_key;
mod value;

use std::collections::HashMap;
use std::time::Duration;

use indexmap::IndexMap;
use serde::Deserialize;
use url::Url;

pub use cli::CliArgs;
pub use table_key::TableKey;
pub use value::{ConfigValue, REFERENCE_SENTINEL, ResolvedValue, is_reference};

/// Placeholder substituted with the deployment environment inside references.
pub const ENV_PLACEHOLDER: &str = "{env}";

/// Setting holding the physical table name.
pub const TABLE_NAME_KEY: &str = "TABLE_NAME";

/// Setting holding the join columns used to match existing rows on upsert.
pub const UPSERT_KEYS_KEY: &str = "UPSERT_KEYS";

/// Default per-table timeout for connect, assemble and upsert.
pub const DEFAULT_TABLE_TIMEOUT: Duration = Duration::from_secs(300);

/// Options controlling how the per-table loop executes.
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Timeout applied around one table's connect, assemble and upsert.
    pub table_timeout: Duration,
    /// Maximum number of tables processed at once. 1 means sequential.
    pub max_concurrent_tables: usize,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            table_timeout: DEFAULT_TABLE_TIMEOUT,
            max_concurrent_tables: 1,
        }
    }
}

/// Process-level settings.
#[derive(Debug, Clone)]
pub struct Settings {
    /// AWS region for the parameter store and table storage.
    pub region: Option<String>,
    /// Deployment environment name, substituted for `{env}` in references.
    pub environment: String,
    /// Data-lake database name, or a reference to it.
    pub database: String,
    /// Name of the catalog, used for logging.
    pub catalog_name: String,
    /// Root URI under which the catalog's tables live.
    pub warehouse: Url,
    /// Extra storage options passed to the table format.
    pub storage_options: HashMap<String, String>,
    pub run: RunOptions,
}

impl Settings {
    /// Storage options including the region, when one is configured.
    pub fn effective_storage_options(&self) -> HashMap<String, String> {
        let mut options = self.storage_options.clone();
        if let Some(region) = &self.region {
            options
                .entry("AWS_REGION".to_string())
                .or_insert_with(|| region.clone());
        }
        options
    }
}

/// Settings for one logical table, possibly containing references.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(transparent)]
pub struct TableConfig {
    settings: IndexMap<String, ConfigValue>,
}

impl TableConfig {
    pub fn new(settings: IndexMap<String, ConfigValue>) -> Self {
        Self { settings }
    }

    /// Add a setting, builder style.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<ConfigValue>) -> Self {
        self.settings.insert(key.into(), value.into());
        self
    }

    pub fn settings(&self) -> &IndexMap<String, ConfigValue> {
        &self.settings
    }
}

/// Settings for one logical table with every reference resolved.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResolvedTableConfig {
    settings: IndexMap<String, ResolvedValue>,
}

impl ResolvedTableConfig {
    pub fn new(settings: IndexMap<String, ResolvedValue>) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &IndexMap<String, ResolvedValue> {
        &self.settings
    }

    pub fn get(&self, key: &str) -> Option<&ResolvedValue> {
        self.settings.get(key)
    }

    /// The physical table name.
    ///
    /// `None` when the setting is absent, null (unresolved) or blank.
    pub fn table_name(&self) -> Option<&str> {
        self.get(TABLE_NAME_KEY)
            .and_then(ResolvedValue::as_str)
            .filter(|name| !name.trim().is_empty())
    }

    /// Join columns for upserts.
    ///
    /// Accepts a sequence of names or a single comma-separated string.
    /// Null and non-text entries are skipped.
    pub fn upsert_keys(&self) -> Vec<String> {
        match self.get(UPSERT_KEYS_KEY) {
            Some(ResolvedValue::Sequence(items)) => items
                .iter()
                .filter_map(ResolvedValue::as_str)
                .map(str::to_string)
                .collect(),
            Some(ResolvedValue::Text(s)) => s
                .split(',')
                .map(str::trim)
                .filter(|k| !k.is_empty())
                .map(str::to_string)
                .collect(),
            _ => Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn resolved(pairs: Vec<(&str, ResolvedValue)>) -> ResolvedTableConfig {
        ResolvedTableConfig::new(pairs.into_iter().map(|(k, v)| (k.to_string(), v)).collect())
    }

    #[test]
    fn test_table_config_deserialize_preserves_order() {
        let config: TableConfig = serde_json::from_value(json!({
            "TABLE_NAME": "/{env}/orders/name",
            "UPSERT_KEYS": ["order_id"],
            "comment": "raw orders"
        }))
        .unwrap();

        let keys: Vec<_> = config.settings().keys().cloned().collect();
        assert_eq!(keys, vec!["TABLE_NAME", "UPSERT_KEYS", "comment"]);
    }

    #[test]
    fn test_table_config_rejects_non_mapping() {
        let result: Result<TableConfig, _> = serde_json::from_value(json!(["a", "b"]));
        assert!(result.is_err());
    }

    #[test]
    fn test_table_name() {
        let config = resolved(vec![(TABLE_NAME_KEY, ResolvedValue::Text("orders".into()))]);
        assert_eq!(config.table_name(), Some("orders"));
    }

    #[test]
    fn test_table_name_null_or_blank() {
        let config = resolved(vec![(TABLE_NAME_KEY, ResolvedValue::Null)]);
        assert_eq!(config.table_name(), None);

        let config = resolved(vec![(TABLE_NAME_KEY, ResolvedValue::Text("  ".into()))]);
        assert_eq!(config.table_name(), None);

        assert_eq!(ResolvedTableConfig::default().table_name(), None);
    }

    #[test]
    fn test_upsert_keys_forms() {
        let config = resolved(vec![(
            UPSERT_KEYS_KEY,
            ResolvedValue::Sequence(vec![
                ResolvedValue::Text("id".into()),
                ResolvedValue::Null,
                ResolvedValue::Text("region".into()),
            ]),
        )]);
        assert_eq!(config.upsert_keys(), vec!["id", "region"]);

        let config = resolved(vec![(UPSERT_KEYS_KEY, ResolvedValue::Text("id, region".into()))]);
        assert_eq!(config.upsert_keys(), vec!["id", "region"]);

        assert!(ResolvedTableConfig::default().upsert_keys().is_empty());
    }

    #[test]
    fn test_storage_options_include_region() {
        let settings = Settings {
            region: Some("eu-west-1".to_string()),
            environment: "dev".to_string(),
            database: "lake".to_string(),
            catalog_name: "default".to_string(),
            warehouse: Url::parse("s3://bucket/warehouse").unwrap(),
            storage_options: HashMap::new(),
            run: RunOptions::default(),
        };

        let options = settings.effective_storage_options();
        assert_eq!(options.get("AWS_REGION").map(String::as_str), Some("eu-west-1"));
    }
}

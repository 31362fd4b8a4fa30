//! Table definitions registry.
//!
//! Holds the mapping from [`TableKey`] to [`TableConfig`] for the process.
//! It is loaded once, from exactly one of two sources:
//! - an inline JSON mapping of every table identifier, or
//! - a definitions collection file plus the one identifier to select from it.
//!
//! Before a run uses it, the registry is resolved into a
//! [`ResolvedRegistry`], which is read-only and shared by all table workers.

use std::path::Path;

use indexmap::IndexMap;
use snafu::prelude::*;
use tracing::debug;

use narwhal_core::error::{ConfigError, MissingTableDefinitionsSnafu, UnknownTableSnafu};
use narwhal_core::{load_definitions_file, parse_definitions};

use crate::config::{ResolvedTableConfig, TableConfig, TableKey};
use crate::parameters::ParameterResolver;

/// The unresolved table definitions of the process.
#[derive(Debug, Clone, Default)]
pub struct TableConfigRegistry {
    tables: IndexMap<TableKey, TableConfig>,
}

impl TableConfigRegistry {
    /// Build a registry from an already parsed mapping.
    pub fn new(tables: IndexMap<TableKey, TableConfig>) -> Self {
        Self { tables }
    }

    /// Parse an inline JSON mapping of table identifiers to definitions.
    pub fn from_json(contents: &str) -> Result<Self, ConfigError> {
        let tables: IndexMap<TableKey, TableConfig> = parse_definitions(contents)?;
        Ok(Self::new(tables))
    }

    /// Load a definitions collection and keep only `table_id`.
    pub fn from_definitions_file(path: &Path, table_id: &str) -> Result<Self, ConfigError> {
        let mut all: IndexMap<TableKey, TableConfig> = load_definitions_file(path)?;
        let key = TableKey::new(table_id);
        let config = all
            .shift_remove(&key)
            .context(UnknownTableSnafu { table: table_id, path })?;

        let mut tables = IndexMap::with_capacity(1);
        tables.insert(key, config);
        Ok(Self::new(tables))
    }

    /// Select the definitions source.
    ///
    /// A definitions file with a table identifier takes precedence over the
    /// inline mapping.
    pub fn load(
        inline: Option<&str>,
        file: Option<&Path>,
        table_id: Option<&str>,
    ) -> Result<Self, ConfigError> {
        match (file, table_id, inline) {
            (Some(path), Some(id), _) => Self::from_definitions_file(path, id),
            (_, _, Some(json)) => Self::from_json(json),
            _ => MissingTableDefinitionsSnafu.fail(),
        }
    }

    /// Tables in source order.
    pub fn for_each_table(&self) -> impl Iterator<Item = (&TableKey, &TableConfig)> {
        self.tables.iter()
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    /// Resolve every reference in every table definition.
    pub async fn resolve(&self, resolver: &ParameterResolver) -> ResolvedRegistry {
        let mut tables = IndexMap::with_capacity(self.tables.len());
        for (key, config) in &self.tables {
            let resolved = resolver.resolve_deep(config.settings()).await;
            debug!(target = %key, "Resolved table definition");
            tables.insert(key.clone(), ResolvedTableConfig::new(resolved));
        }
        ResolvedRegistry { tables }
    }
}

/// Table definitions with every reference resolved.
#[derive(Debug, Clone, Default)]
pub struct ResolvedRegistry {
    tables: IndexMap<TableKey, ResolvedTableConfig>,
}

impl ResolvedRegistry {
    /// Tables in source order.
    pub fn for_each_table(&self) -> impl Iterator<Item = (&TableKey, &ResolvedTableConfig)> {
        self.tables.iter()
    }

    pub fn get(&self, key: &TableKey) -> Option<&ResolvedTableConfig> {
        self.tables.get(key)
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}

//! Connects a resolved table definition to a physical table in the catalog.

use std::sync::Arc;

use snafu::prelude::*;
use tracing::debug;

use crate::catalog::{Catalog, TableHandle, TableIdent};
use crate::config::{ResolvedTableConfig, TABLE_NAME_KEY};
use crate::error::{ConnectionError, MissingTableNameSnafu};

/// Opens [`TableHandle`]s for resolved table definitions.
#[derive(Clone)]
pub struct TableConnector {
    catalog: Arc<dyn Catalog>,
}

impl TableConnector {
    pub fn new(catalog: Arc<dyn Catalog>) -> Self {
        Self { catalog }
    }

    /// Open `{database}.{TABLE_NAME}`.
    ///
    /// Fails when the definition has no table name (absent, blank, or a
    /// reference that did not resolve), or when the catalog cannot load it.
    pub async fn connect(
        &self,
        database: &str,
        config: &ResolvedTableConfig,
    ) -> Result<Box<dyn TableHandle>, ConnectionError> {
        let table_name = config
            .table_name()
            .context(MissingTableNameSnafu {
                key: TABLE_NAME_KEY,
            })?;

        let ident = TableIdent::new(database, table_name);
        debug!(catalog = self.catalog.name(), table = %ident, "Loading table");

        self.catalog.load_table(&ident).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use async_trait::async_trait;
    use deltalake::arrow::array::RecordBatch;
    use deltalake::arrow::datatypes::{Schema, SchemaRef};
    use indexmap::IndexMap;
    use std::sync::Mutex;

    use crate::catalog::UpsertSummary;
    use crate::config::ResolvedValue;
    use crate::error::UpsertError;

    struct NullHandle {
        ident: TableIdent,
    }

    #[async_trait]
    impl TableHandle for NullHandle {
        fn ident(&self) -> &TableIdent {
            &self.ident
        }

        fn schema(&self) -> SchemaRef {
            Arc::new(Schema::empty())
        }

        async fn upsert(
            &mut self,
            _batch: RecordBatch,
            _join_columns: &[String],
        ) -> Result<UpsertSummary, UpsertError> {
            Ok(UpsertSummary::default())
        }
    }

    #[derive(Default)]
    struct RecordingCatalog {
        loaded: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl Catalog for RecordingCatalog {
        fn name(&self) -> &str {
            "test"
        }

        async fn load_table(
            &self,
            ident: &TableIdent,
        ) -> Result<Box<dyn TableHandle>, ConnectionError> {
            self.loaded.lock().unwrap().push(ident.to_string());
            if ident.table() == "missing" {
                return Err(ConnectionError::TableNotFound {
                    table: ident.to_string(),
                });
            }
            Ok(Box::new(NullHandle {
                ident: ident.clone(),
            }))
        }
    }

    fn config_with_name(name: ResolvedValue) -> ResolvedTableConfig {
        let mut settings = IndexMap::new();
        settings.insert(TABLE_NAME_KEY.to_string(), name);
        ResolvedTableConfig::new(settings)
    }

    #[tokio::test]
    async fn test_connect_qualifies_name() {
        let catalog = Arc::new(RecordingCatalog::default());
        let connector = TableConnector::new(catalog.clone());

        let handle = connector
            .connect("lake_prod", &config_with_name(ResolvedValue::Text("orders".into())))
            .await
            .unwrap();

        assert_eq!(handle.ident().to_string(), "lake_prod.orders");
        assert_eq!(*catalog.loaded.lock().unwrap(), vec!["lake_prod.orders"]);
    }

    #[tokio::test]
    async fn test_connect_null_name_skips_catalog() {
        let catalog = Arc::new(RecordingCatalog::default());
        let connector = TableConnector::new(catalog.clone());

        let err = connector
            .connect("lake", &config_with_name(ResolvedValue::Null))
            .await
            .err()
            .unwrap();

        assert!(matches!(err, ConnectionError::MissingTableName { key } if key == TABLE_NAME_KEY));
        assert!(catalog.loaded.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_connect_missing_table() {
        let connector = TableConnector::new(Arc::new(RecordingCatalog::default()));

        let err = connector
            .connect("lake", &config_with_name(ResolvedValue::Text("missing".into())))
            .await
            .err()
            .unwrap();

        assert!(matches!(err, ConnectionError::TableNotFound { table } if table == "lake.missing"));
    }
}

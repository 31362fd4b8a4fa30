//! Catalog and table handle abstractions.
//!
//! A [`Catalog`] maps qualified `{database}.{table}` names to tables and hands
//! out [`TableHandle`]s. The pipeline only needs a handle's schema and an
//! upsert operation, so the table format stays behind these traits.

mod delta;

use std::fmt;

use async_trait::async_trait;
use deltalake::arrow::array::RecordBatch;
use deltalake::arrow::datatypes::SchemaRef;

use crate::error::{ConnectionError, UpsertError};

pub use delta::{
    DeltaCatalog, DeltaTableHandle, UPSERT_KEYS_PROPERTY, ensure_handlers_registered,
};

/// Qualified name of a physical table.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TableIdent {
    database: String,
    table: String,
}

impl TableIdent {
    pub fn new(database: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            database: database.into(),
            table: table.into(),
        }
    }

    pub fn database(&self) -> &str {
        &self.database
    }

    pub fn table(&self) -> &str {
        &self.table
    }
}

impl fmt::Display for TableIdent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.database, self.table)
    }
}

/// Row counts reported by an upsert.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpsertSummary {
    pub rows_inserted: usize,
    pub rows_updated: usize,
}

/// A registry of tables.
#[async_trait]
pub trait Catalog: Send + Sync {
    /// Name of the catalog, for logging.
    fn name(&self) -> &str;

    /// Open a table.
    ///
    /// Fails with [`ConnectionError::TableNotFound`] when no table exists
    /// under the qualified name and [`ConnectionError::CatalogUnavailable`]
    /// when the catalog cannot be queried.
    async fn load_table(&self, ident: &TableIdent) -> Result<Box<dyn TableHandle>, ConnectionError>;
}

/// An open connection to one physical table.
///
/// Owned by a single processing pass and never shared between tables.
#[async_trait]
pub trait TableHandle: Send {
    fn ident(&self) -> &TableIdent;

    /// The table's columns, as an Arrow schema.
    fn schema(&self) -> SchemaRef;

    /// Insert new rows and update rows matched on `join_columns`.
    ///
    /// The batch must conform to [`TableHandle::schema`]. When several rows
    /// share a key, the last one wins. An empty `join_columns` asks the table
    /// to use its own declared key columns; a table without any fails with
    /// [`UpsertError::MissingUpsertKeys`].
    async fn upsert(
        &mut self,
        batch: RecordBatch,
        join_columns: &[String],
    ) -> Result<UpsertSummary, UpsertError>;
}

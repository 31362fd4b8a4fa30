//! Delta Lake warehouse catalog.
//!
//! Tables live at `{warehouse}/{database}.db/{table}`. Upserts are Delta
//! MERGE operations planned through DataFusion: rows matching on the join
//! columns are updated in full, all other rows are inserted. When a batch
//! holds several rows for one key, only the last of them is merged.
//!
//! A table may declare its own join columns in the `narwhal.upsertKeys`
//! table property (comma-separated). These are used when the caller passes
//! none.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use deltalake::arrow::array::{Array, RecordBatch, UInt32Array};
use deltalake::arrow::compute::take_record_batch;
use deltalake::arrow::datatypes::{Schema, SchemaRef};
use deltalake::arrow::error::ArrowError;
use deltalake::arrow::row::{RowConverter, SortField};
use deltalake::datafusion::prelude::SessionContext;
use deltalake::kernel::engine::arrow_conversion::TryIntoArrow;
use deltalake::{DeltaOps, DeltaTable, DeltaTableError};
use snafu::prelude::*;
use tracing::{debug, info};
use url::Url;

use narwhal_core::emit;

use crate::error::{
    CatalogUnavailableSnafu, ConnectionError, DataFusionSnafu, DeduplicateSnafu,
    DeltaMergeSnafu, MissingUpsertKeysSnafu, SchemaUnavailableSnafu, TableNotFoundSnafu,
    UnknownKeyColumnSnafu, UpsertError,
};
use crate::metrics::events::UpsertCompleted;

use super::{Catalog, TableHandle, TableIdent, UpsertSummary};

const SOURCE_ALIAS: &str = "source";
const TARGET_ALIAS: &str = "target";

/// Table property naming the table's own upsert key columns.
pub const UPSERT_KEYS_PROPERTY: &str = "narwhal.upsertKeys";

/// Ensure Delta Lake cloud storage handlers are registered.
///
/// Idempotent.
pub fn ensure_handlers_registered() {
    deltalake::aws::register_handlers(None);
}

/// Catalog of Delta tables under one warehouse root.
#[derive(Debug, Clone)]
pub struct DeltaCatalog {
    name: String,
    warehouse: Url,
    storage_options: HashMap<String, String>,
}

impl DeltaCatalog {
    pub fn new(
        name: impl Into<String>,
        warehouse: Url,
        storage_options: HashMap<String, String>,
    ) -> Self {
        ensure_handlers_registered();
        Self {
            name: name.into(),
            warehouse,
            storage_options,
        }
    }

    /// Location of a table under the warehouse.
    pub fn table_url(&self, ident: &TableIdent) -> Result<Url, ConnectionError> {
        let base = self.warehouse.as_str().trim_end_matches('/');
        let location = format!("{base}/{}.db/{}", ident.database(), ident.table());
        Url::parse(&location).map_err(|e| {
            CatalogUnavailableSnafu {
                table: ident.to_string(),
                message: format!("invalid table location '{location}': {e}"),
            }
            .build()
        })
    }
}

#[async_trait]
impl Catalog for DeltaCatalog {
    fn name(&self) -> &str {
        &self.name
    }

    async fn load_table(
        &self,
        ident: &TableIdent,
    ) -> Result<Box<dyn TableHandle>, ConnectionError> {
        let url = self.table_url(ident)?;

        let table =
            deltalake::open_table_with_storage_options(url.clone(), self.storage_options.clone())
                .await
                .map_err(|e| classify_open_error(ident, e))?;

        info!(
            catalog = %self.name,
            table = %ident,
            location = %url,
            version = table.version().unwrap_or(-1),
            "Opened Delta table"
        );

        Ok(Box::new(DeltaTableHandle::new(ident.clone(), table)?))
    }
}

fn classify_open_error(ident: &TableIdent, err: DeltaTableError) -> ConnectionError {
    match err {
        DeltaTableError::NotATable(_)
        | DeltaTableError::InvalidTableLocation(_)
        | DeltaTableError::ObjectStore {
            source: deltalake::ObjectStoreError::NotFound { .. },
        } => TableNotFoundSnafu {
            table: ident.to_string(),
        }
        .build(),
        other => CatalogUnavailableSnafu {
            table: ident.to_string(),
            message: other.to_string(),
        }
        .build(),
    }
}

/// An open Delta table.
pub struct DeltaTableHandle {
    ident: TableIdent,
    table: DeltaTable,
    schema: SchemaRef,
    default_keys: Vec<String>,
}

impl DeltaTableHandle {
    /// Wrap an opened table, reading its schema and declared upsert keys
    /// from the current snapshot.
    pub fn new(ident: TableIdent, table: DeltaTable) -> Result<Self, ConnectionError> {
        let snapshot = table.snapshot().map_err(|e| {
            SchemaUnavailableSnafu {
                table: ident.to_string(),
                message: e.to_string(),
            }
            .build()
        })?;
        let schema: Schema = snapshot.schema().as_ref().try_into_arrow().map_err(|e| {
            SchemaUnavailableSnafu {
                table: ident.to_string(),
                message: e.to_string(),
            }
            .build()
        })?;
        let default_keys = snapshot
            .metadata()
            .configuration()
            .get(UPSERT_KEYS_PROPERTY)
            .map(|value| parse_key_list(value))
            .unwrap_or_default();

        Ok(Self {
            ident,
            table,
            schema: Arc::new(schema),
            default_keys,
        })
    }

    /// The underlying Delta table.
    pub fn table(&self) -> &DeltaTable {
        &self.table
    }

    pub fn version(&self) -> Option<i64> {
        self.table.version()
    }

    /// Join columns declared by the table itself.
    pub fn default_keys(&self) -> &[String] {
        &self.default_keys
    }

    /// The join columns to merge on: the caller's, else the table's own.
    fn join_columns<'a>(&'a self, requested: &'a [String]) -> Result<&'a [String], UpsertError> {
        let join_columns = if requested.is_empty() {
            self.default_keys.as_slice()
        } else {
            requested
        };
        ensure!(
            !join_columns.is_empty(),
            MissingUpsertKeysSnafu {
                table: self.ident.to_string()
            }
        );
        for column in join_columns {
            ensure!(
                self.schema.field_with_name(column).is_ok(),
                UnknownKeyColumnSnafu {
                    table: self.ident.to_string(),
                    column: column.as_str(),
                }
            );
        }
        Ok(join_columns)
    }
}

#[async_trait]
impl TableHandle for DeltaTableHandle {
    fn ident(&self) -> &TableIdent {
        &self.ident
    }

    fn schema(&self) -> SchemaRef {
        Arc::clone(&self.schema)
    }

    async fn upsert(
        &mut self,
        batch: RecordBatch,
        join_columns: &[String],
    ) -> Result<UpsertSummary, UpsertError> {
        let join_columns = self.join_columns(join_columns)?.to_vec();

        let start = Instant::now();
        let received = batch.num_rows();
        let batch = dedup_last_by_keys(&batch, &join_columns).context(DeduplicateSnafu)?;
        let rows = batch.num_rows();
        if rows < received {
            debug!(
                table = %self.ident,
                received,
                kept = rows,
                "Collapsed rows sharing an upsert key"
            );
        }

        let ctx = SessionContext::new();
        let source = ctx.read_batch(batch).context(DataFusionSnafu)?;

        let columns: Vec<String> = self
            .schema
            .fields()
            .iter()
            .map(|field| field.name().clone())
            .collect();

        let (table, metrics) = DeltaOps(self.table.clone())
            .merge(source, merge_predicate(&join_columns))
            .with_source_alias(SOURCE_ALIAS)
            .with_target_alias(TARGET_ALIAS)
            .when_matched_update(|update| {
                columns.iter().fold(update, |update, column| {
                    update.update(column.as_str(), source_column(column))
                })
            })
            .context(DeltaMergeSnafu)?
            .when_not_matched_insert(|insert| {
                columns.iter().fold(insert, |insert, column| {
                    insert.set(column.as_str(), source_column(column))
                })
            })
            .context(DeltaMergeSnafu)?
            .await
            .context(DeltaMergeSnafu)?;

        self.table = table;

        let summary = UpsertSummary {
            rows_inserted: metrics.num_target_rows_inserted,
            rows_updated: metrics.num_target_rows_updated,
        };

        emit!(UpsertCompleted {
            table: self.ident.to_string(),
            duration: start.elapsed(),
        });
        debug!(
            table = %self.ident,
            rows,
            inserted = summary.rows_inserted,
            updated = summary.rows_updated,
            version = self.table.version().unwrap_or(-1),
            "Merged batch into Delta table"
        );

        Ok(summary)
    }
}

/// Parse a comma-separated column list, dropping blanks.
fn parse_key_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|column| !column.is_empty())
        .map(str::to_string)
        .collect()
}

/// Keep only the last row for each distinct key, preserving row order.
///
/// MERGE rejects a source with several rows matching one target row, so the
/// latest record wins. Rows with a null key cannot match anything and are
/// always kept.
fn dedup_last_by_keys(
    batch: &RecordBatch,
    join_columns: &[String],
) -> Result<RecordBatch, ArrowError> {
    let schema = batch.schema();
    let mut keys = Vec::with_capacity(join_columns.len());
    for column in join_columns {
        keys.push(Arc::clone(batch.column(schema.index_of(column)?)));
    }

    let converter = RowConverter::new(
        keys.iter()
            .map(|array| SortField::new(array.data_type().clone()))
            .collect(),
    )?;
    let rows = converter.convert_columns(&keys)?;

    let mut seen = HashSet::with_capacity(batch.num_rows());
    let mut kept: Vec<u32> = Vec::with_capacity(batch.num_rows());
    for index in (0..batch.num_rows()).rev() {
        let has_null_key = keys.iter().any(|array| array.is_null(index));
        if has_null_key || seen.insert(rows.row(index)) {
            kept.push(index as u32);
        }
    }

    if kept.len() == batch.num_rows() {
        return Ok(batch.clone());
    }
    kept.reverse();
    take_record_batch(batch, &UInt32Array::from(kept))
}

/// Quote a column name for use in a SQL expression.
fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn source_column(column: &str) -> String {
    format!("{SOURCE_ALIAS}.{}", quote_ident(column))
}

/// `target."a" = source."a" AND ...` over the join columns.
fn merge_predicate(join_columns: &[String]) -> String {
    join_columns
        .iter()
        .map(|column| {
            let quoted = quote_ident(column);
            format!("{TARGET_ALIAS}.{quoted} = {SOURCE_ALIAS}.{quoted}")
        })
        .collect::<Vec<_>>()
        .join(" AND ")
}

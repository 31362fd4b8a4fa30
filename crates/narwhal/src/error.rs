//! Error types for the narwhal ingestion pipeline.
//!
//! Only [`RunError`] and [`EnvelopeError`] abort an invocation. Everything
//! else is recovered at the granularity of a single value or a single table
//! and surfaces as a failed [`crate::pipeline::IngestionResult`].

use std::time::Duration;

use snafu::prelude::*;

pub use narwhal_core::error::{ConfigError, MetricsError};

/// Failure to look up one parameter-store key.
///
/// Recovered locally: the configuration value becomes null.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum LookupError {
    /// The key does not exist.
    #[snafu(display("Parameter '{key}' not found"))]
    NotFound { key: String },

    /// The key exists but cannot be decrypted with its KMS key.
    #[snafu(display("Parameter '{key}' has an invalid KMS key: {message}"))]
    InvalidKey { key: String, message: String },

    /// Any other backend failure.
    #[snafu(display("Unexpected error retrieving parameter '{key}': {message}"))]
    Backend { key: String, message: String },
}

impl LookupError {
    /// Short label for the failure category, used in logs and metrics.
    pub fn category(&self) -> &'static str {
        match self {
            LookupError::NotFound { .. } => "not_found",
            LookupError::InvalidKey { .. } => "invalid_key",
            LookupError::Backend { .. } => "backend",
        }
    }
}

/// Failure to obtain a handle to a table.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum ConnectionError {
    /// The table definition has no usable physical table name.
    #[snafu(display("Table definition has no {key} (missing or unresolved)"))]
    MissingTableName { key: &'static str },

    /// The catalog has no table under the qualified name.
    #[snafu(display("Table '{table}' does not exist"))]
    TableNotFound { table: String },

    /// The catalog could not be reached or refused the request.
    #[snafu(display("Catalog unavailable while loading '{table}': {message}"))]
    CatalogUnavailable { table: String, message: String },

    /// The table exists but its schema could not be read.
    #[snafu(display("Failed to read schema of '{table}': {message}"))]
    SchemaUnavailable { table: String, message: String },
}

/// Failure to build a batch from raw records.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum AssembleError {
    /// Nothing to write, or nothing to write into.
    #[snafu(display("Empty batch"))]
    EmptyBatch,

    /// A record payload is not valid JSON.
    #[snafu(display("Failed to decode payload of record {index}: {source}"))]
    PayloadDecode {
        index: usize,
        source: serde_json::Error,
    },

    /// The decoded records cannot be coerced into the table schema.
    #[snafu(display("Records do not match table schema: {message}"))]
    SchemaMismatch { message: String },
}

/// Failure of the storage engine to apply an upsert.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum UpsertError {
    /// No join columns to match existing rows on.
    #[snafu(display("No upsert key columns configured for '{table}'"))]
    MissingUpsertKeys { table: String },

    /// A join column does not exist in the table schema.
    #[snafu(display("Upsert key column '{column}' not found in '{table}'"))]
    UnknownKeyColumn { table: String, column: String },

    /// Rows sharing a key could not be collapsed before the merge.
    #[snafu(display("Failed to deduplicate batch on upsert keys: {source}"))]
    Deduplicate {
        source: deltalake::arrow::error::ArrowError,
    },

    /// The query engine rejected the batch.
    #[snafu(display("Failed to plan upsert: {source}"))]
    DataFusion {
        source: deltalake::datafusion::error::DataFusionError,
    },

    /// Delta Lake operation failed.
    #[snafu(display("Delta Lake merge failed: {source}"))]
    DeltaMerge { source: deltalake::DeltaTableError },

    /// Generic write failure reported by a table implementation.
    #[snafu(display("Write failed: {message}"))]
    Write { message: String },
}

/// Failure of one table's connect, assemble and upsert pass.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum TableError {
    #[snafu(display("Failed to connect: {source}"))]
    Connect { source: ConnectionError },

    #[snafu(display("Failed to assemble batch: {source}"))]
    Assemble { source: AssembleError },

    #[snafu(display("Failed to upsert batch: {source}"))]
    Upsert { source: UpsertError },

    #[snafu(display("Timed out after {timeout:?}"))]
    Timeout { timeout: Duration },
}

impl From<ConnectionError> for TableError {
    fn from(source: ConnectionError) -> Self {
        TableError::Connect { source }
    }
}

impl From<AssembleError> for TableError {
    fn from(source: AssembleError) -> Self {
        TableError::Assemble { source }
    }
}

impl From<UpsertError> for TableError {
    fn from(source: UpsertError) -> Self {
        TableError::Upsert { source }
    }
}

/// Malformed trigger input. Fatal for the invocation.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum EnvelopeError {
    /// Failed to read the envelope.
    #[snafu(display("Failed to read record envelope: {source}"))]
    Read { source: std::io::Error },

    /// The envelope is not valid JSON or has the wrong shape.
    #[snafu(display("Failed to parse record envelope: {source}"))]
    Parse { source: serde_json::Error },

    /// A record has no usable arrival timestamp.
    #[snafu(display("Record {index} has invalid SentTimestamp: {value:?}"))]
    InvalidTimestamp { index: usize, value: Option<String> },
}

/// Errors that abort a whole invocation.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum RunError {
    /// The data-lake database name did not resolve.
    #[snafu(display("Failed to resolve data-lake database name from '{reference}'"))]
    DatabaseUnresolved { reference: String },

    /// A table task panicked.
    #[snafu(display("Table task join error: {source}"))]
    TaskJoin { source: tokio::task::JoinError },
}

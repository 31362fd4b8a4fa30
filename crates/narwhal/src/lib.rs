//! narwhal: ingests queue record batches into lakehouse tables as upserts.
//!
//! This crate handles:
//! - Resolving table definitions whose values may be parameter-store references
//! - Connecting each logical table to its physical table in the catalog
//! - Ordering records by send time and coercing them into the table schema
//! - Upserting the batch and reporting a per-table result

pub mod batch;
pub mod catalog;
pub mod config;
pub mod connector;
pub mod error;
pub mod metrics;
pub mod parameters;
pub mod pipeline;
pub mod record;
pub mod registry;

// Re-export commonly used items
pub use batch::{Batch, BatchAssembler, sort_by_arrival};
pub use catalog::{Catalog, DeltaCatalog, DeltaTableHandle, TableHandle, TableIdent, UpsertSummary};
pub use config::{
    CliArgs, ConfigValue, ResolvedTableConfig, ResolvedValue, RunOptions, Settings, TableConfig,
    TableKey,
};
pub use connector::TableConnector;
pub use error::{
    AssembleError, ConnectionError, EnvelopeError, LookupError, RunError, TableError, UpsertError,
};
pub use parameters::{ParameterResolver, ParameterStore, SsmParameterStore, StaticParameterStore};
pub use pipeline::{IngestionOrchestrator, IngestionResult, Response, RunOutcome};
pub use record::{RawRecord, RecordEnvelope};
pub use registry::{ResolvedRegistry, TableConfigRegistry};

// Re-export from narwhal-core
pub use narwhal_core::{LogFormat, MetricsController, init_recorder, init_tracing};

//! Ingestion pipeline.
//!
//! [`IngestionOrchestrator::run`] takes the record set of one invocation and,
//! for every configured table in registry order, connects to the table,
//! assembles the full record set into a batch and upserts it. Every table
//! receives every record. A table failure is recorded in its
//! [`IngestionResult`] and never stops the other tables.
//!
//! Tables run as tasks on a [`JoinSet`], started in registry order and
//! bounded by a semaphore of `max_concurrent_tables` permits. Each table's
//! connect, assemble and upsert shares one timeout.

mod result;

use std::sync::Arc;
use std::time::{Duration, Instant};

use indexmap::IndexMap;
use snafu::prelude::*;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use narwhal_core::emit;

use crate::batch::BatchAssembler;
use crate::catalog::Catalog;
use crate::config::{ResolvedTableConfig, RunOptions, TableKey};
use crate::connector::TableConnector;
use crate::error::{DatabaseUnresolvedSnafu, RunError, TableError, TaskJoinSnafu};
use crate::metrics::events::{
    FailureStage, InvocationCompleted, RecordsUpserted, TableFailed,
};
use crate::parameters::ParameterResolver;
use crate::record::RawRecord;
use crate::registry::{ResolvedRegistry, TableConfigRegistry};

pub use result::{
    IngestionResult, NO_RECORDS_MESSAGE, Response, RunOutcome, STATUS_FAILED, STATUS_OK,
};

/// Top-level entry point of the pipeline.
///
/// Built once per process. Each [`run`](Self::run) resolves the database
/// name and the table definitions afresh, so nothing resolved leaks from one
/// invocation into the next.
pub struct IngestionOrchestrator {
    resolver: ParameterResolver,
    connector: TableConnector,
    registry: TableConfigRegistry,
    database: String,
    options: RunOptions,
}

impl IngestionOrchestrator {
    /// `database` is the data-lake database name or a reference to it.
    pub fn new(
        resolver: ParameterResolver,
        catalog: Arc<dyn Catalog>,
        registry: TableConfigRegistry,
        database: impl Into<String>,
    ) -> Self {
        Self {
            resolver,
            connector: TableConnector::new(catalog),
            registry,
            database: database.into(),
            options: RunOptions::default(),
        }
    }

    pub fn with_options(mut self, options: RunOptions) -> Self {
        self.options = options;
        self
    }

    pub fn options(&self) -> &RunOptions {
        &self.options
    }

    /// Ingest one record set into every configured table.
    ///
    /// An empty record set returns immediately without touching the
    /// parameter store or the catalog. Fails only when the database name
    /// does not resolve or a table task panics.
    pub async fn run(&self, records: Vec<RawRecord>) -> Result<RunOutcome, RunError> {
        let start = Instant::now();
        debug!(records = records.len(), "Received records from stream");

        if records.is_empty() {
            warn!("No records to process");
            let outcome = RunOutcome::no_records();
            emit!(InvocationCompleted {
                status_code: outcome.status_code(),
                tables: 0,
                duration: start.elapsed(),
            });
            return Ok(outcome);
        }

        let database = self
            .resolver
            .resolve(&self.database)
            .await
            .context(DatabaseUnresolvedSnafu {
                reference: self.database.as_str(),
            })?;

        let registry = self.registry.resolve(&self.resolver).await;

        info!(
            database = %database,
            tables = registry.len(),
            records = records.len(),
            "Processing batch"
        );

        let results = self
            .process_tables(Arc::from(database), registry, Arc::from(records))
            .await?;
        let outcome = RunOutcome::from_results(results);

        emit!(InvocationCompleted {
            status_code: outcome.status_code(),
            tables: outcome.results().len(),
            duration: start.elapsed(),
        });
        info!(
            status_code = outcome.status_code(),
            tables = outcome.results().len(),
            elapsed_ms = start.elapsed().as_millis(),
            "Invocation complete"
        );

        Ok(outcome)
    }

    async fn process_tables(
        &self,
        database: Arc<str>,
        registry: ResolvedRegistry,
        records: Arc<[RawRecord]>,
    ) -> Result<IndexMap<TableKey, IngestionResult>, RunError> {
        let semaphore = Arc::new(Semaphore::new(self.options.max_concurrent_tables.max(1)));
        let timeout = self.options.table_timeout;
        let mut handles: JoinSet<(usize, TableKey, IngestionResult)> = JoinSet::new();

        for (index, (key, config)) in registry.for_each_table().enumerate() {
            // Taken before spawning so tables start in registry order.
            // The semaphore is never closed.
            let permit = Arc::clone(&semaphore).acquire_owned().await.ok();

            let key = key.clone();
            let config = config.clone();
            let connector = self.connector.clone();
            let database = Arc::clone(&database);
            let records = Arc::clone(&records);

            handles.spawn(async move {
                let result =
                    process_table(&key, &connector, &database, &config, &records, timeout).await;
                drop(permit);
                (index, key, result)
            });
        }

        debug!(tasks = handles.len(), "Spawned table tasks");

        let mut slots: Vec<Option<(TableKey, IngestionResult)>> = vec![None; registry.len()];
        while let Some(joined) = handles.join_next().await {
            let (index, key, result) = joined.context(TaskJoinSnafu)?;
            slots[index] = Some((key, result));
        }

        Ok(slots.into_iter().flatten().collect())
    }
}

/// Run one table's pass and turn the outcome into a result.
async fn process_table(
    key: &TableKey,
    connector: &TableConnector,
    database: &str,
    config: &ResolvedTableConfig,
    records: &[RawRecord],
    timeout: Duration,
) -> IngestionResult {
    let start = Instant::now();
    let attempted = records.len();

    let outcome = tokio::time::timeout(timeout, ingest_table(connector, database, config, records))
        .await
        .unwrap_or(Err(TableError::Timeout { timeout }));

    match outcome {
        Ok(rows) => {
            emit!(RecordsUpserted {
                table: key.to_string(),
                count: rows as u64,
            });
            info!(
                target = %key,
                records = rows,
                elapsed_ms = start.elapsed().as_millis(),
                "Successfully processed batch"
            );
            IngestionResult::succeeded(attempted)
        }
        Err(e) => {
            emit!(TableFailed {
                table: key.to_string(),
                stage: failure_stage(&e),
            });
            error!(target = %key, records = attempted, error = %e, "Failed to process batch");
            IngestionResult::failed(attempted, &e)
        }
    }
}

/// Connect, assemble and upsert. Returns the number of rows written.
async fn ingest_table(
    connector: &TableConnector,
    database: &str,
    config: &ResolvedTableConfig,
    records: &[RawRecord],
) -> Result<usize, TableError> {
    let mut handle = connector.connect(database, config).await?;

    let batch = BatchAssembler::new(handle.schema()).assemble(records)?;
    let rows = batch.num_rows();

    let summary = handle
        .upsert(batch.into_record_batch(), &config.upsert_keys())
        .await?;

    debug!(
        table = %handle.ident(),
        inserted = summary.rows_inserted,
        updated = summary.rows_updated,
        "Upsert applied"
    );

    Ok(rows)
}

fn failure_stage(err: &TableError) -> FailureStage {
    match err {
        TableError::Connect { .. } => FailureStage::Connect,
        TableError::Assemble { .. } => FailureStage::Assemble,
        TableError::Upsert { .. } => FailureStage::Upsert,
        TableError::Timeout { .. } => FailureStage::Timeout,
    }
}

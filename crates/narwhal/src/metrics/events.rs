//! Internal events for narwhal metrics emission.

use metrics::{counter, gauge, histogram};
use std::time::Duration;
use tracing::trace;

use narwhal_core::metrics::InternalEvent;

/// Stage at which a table's processing failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureStage {
    Connect,
    Assemble,
    Upsert,
    Timeout,
}

impl FailureStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureStage::Connect => "connect",
            FailureStage::Assemble => "assemble",
            FailureStage::Upsert => "upsert",
            FailureStage::Timeout => "timeout",
        }
    }
}

/// Event emitted when a batch has been upserted into a table.
pub struct RecordsUpserted {
    pub table: String,
    pub count: u64,
}

impl InternalEvent for RecordsUpserted {
    fn emit(self) {
        trace!(table = %self.table, count = self.count, "Records upserted");
        counter!("narwhal_records_upserted_total", "table" => self.table).increment(self.count);
    }
}

/// Event emitted when an upsert completes.
pub struct UpsertCompleted {
    pub table: String,
    pub duration: Duration,
}

impl InternalEvent for UpsertCompleted {
    fn emit(self) {
        trace!(
            table = %self.table,
            duration_ms = self.duration.as_millis(),
            "Upsert completed"
        );
        histogram!("narwhal_upsert_duration_seconds", "table" => self.table)
            .record(self.duration.as_secs_f64());
    }
}

/// Event emitted when a table's processing fails.
pub struct TableFailed {
    pub table: String,
    pub stage: FailureStage,
}

impl InternalEvent for TableFailed {
    fn emit(self) {
        trace!(table = %self.table, stage = self.stage.as_str(), "Table failed");
        counter!(
            "narwhal_tables_failed_total",
            "table" => self.table,
            "stage" => self.stage.as_str()
        )
        .increment(1);
    }
}

/// Event emitted when a parameter lookup fails.
pub struct ParameterLookupFailed {
    pub category: &'static str,
}

impl InternalEvent for ParameterLookupFailed {
    fn emit(self) {
        trace!(category = self.category, "Parameter lookup failed");
        counter!("narwhal_parameter_lookups_failed_total", "category" => self.category)
            .increment(1);
    }
}

/// Event emitted when an invocation completes.
pub struct InvocationCompleted {
    pub status_code: u16,
    pub tables: usize,
    pub duration: Duration,
}

impl InternalEvent for InvocationCompleted {
    fn emit(self) {
        trace!(
            status_code = self.status_code,
            tables = self.tables,
            duration_ms = self.duration.as_millis(),
            "Invocation completed"
        );
        counter!("narwhal_invocations_total", "status" => self.status_code.to_string())
            .increment(1);
        gauge!("narwhal_last_invocation_tables").set(self.tables as f64);
        histogram!("narwhal_invocation_duration_seconds").record(self.duration.as_secs_f64());
    }
}

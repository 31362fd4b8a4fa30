//! Per-table results and the invocation response.

use indexmap::IndexMap;
use serde::Serialize;
use serde_json::{Map, Value, json};

use crate::config::TableKey;
use crate::error::TableError;

/// Status for success, partial success and no-op invocations.
pub const STATUS_OK: u16 = 200;

/// Status when the last processed table failed.
pub const STATUS_FAILED: u16 = 500;

/// Body message when the record set is empty.
pub const NO_RECORDS_MESSAGE: &str = "No records to process.";

/// Outcome of one table's pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestionResult {
    success: bool,
    message: String,
    records_attempted: usize,
    error: Option<String>,
}

impl IngestionResult {
    pub fn succeeded(records_attempted: usize) -> Self {
        Self {
            success: true,
            message: format!("Successfully processed batch of {records_attempted} record(s)."),
            records_attempted,
            error: None,
        }
    }

    pub fn failed(records_attempted: usize, error: &TableError) -> Self {
        Self {
            success: false,
            message: format!("Failed to process batch of {records_attempted} record(s)."),
            records_attempted,
            error: Some(error.to_string()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.success
    }

    /// Human-readable summary reported in the response body.
    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn records_attempted(&self) -> usize {
        self.records_attempted
    }

    /// The underlying failure, for logs. Never part of the response body.
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }
}

/// Result of one invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOutcome {
    status_code: u16,
    results: IndexMap<TableKey, IngestionResult>,
    no_records: bool,
}

impl RunOutcome {
    /// Outcome of an invocation with no records.
    pub fn no_records() -> Self {
        Self {
            status_code: STATUS_OK,
            results: IndexMap::new(),
            no_records: true,
        }
    }

    /// Build an outcome from results in processing order.
    ///
    /// The status reflects only the last table: 200 if it succeeded, 500 if
    /// it failed, whatever happened to the tables before it. With no tables
    /// at all the status is 200.
    pub fn from_results(results: IndexMap<TableKey, IngestionResult>) -> Self {
        let status_code = match results.last() {
            Some((_, result)) if !result.is_success() => STATUS_FAILED,
            _ => STATUS_OK,
        };
        Self {
            status_code,
            results,
            no_records: false,
        }
    }

    pub fn status_code(&self) -> u16 {
        self.status_code
    }

    pub fn results(&self) -> &IndexMap<TableKey, IngestionResult> {
        &self.results
    }

    pub fn get(&self, key: &TableKey) -> Option<&IngestionResult> {
        self.results.get(key)
    }

    /// Whether the record set was empty and no table was attempted.
    pub fn is_no_op(&self) -> bool {
        self.no_records
    }

    /// Response body: table identifier to message, in processing order.
    pub fn body(&self) -> Value {
        if self.no_records {
            return json!({ "message": NO_RECORDS_MESSAGE });
        }
        let map: Map<String, Value> = self
            .results
            .iter()
            .map(|(key, result)| (key.id().to_string(), Value::String(result.message.clone())))
            .collect();
        Value::Object(map)
    }

    pub fn into_response(self) -> Response {
        Response {
            status_code: self.status_code,
            body: self.body().to_string(),
        }
    }
}

/// The structured result returned to the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Response {
    #[serde(rename = "statusCode")]
    pub status_code: u16,
    /// JSON document serialized as a string.
    pub body: String,
}

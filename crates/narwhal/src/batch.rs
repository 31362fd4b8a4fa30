//! Batch assembly: raw records to an Arrow batch conforming to a table schema.
//!
//! Records are ordered by arrival, each payload is decoded into a JSON object,
//! values are coerced toward the column types, and Arrow's JSON decoder builds
//! the final [`RecordBatch`]. Fields absent from the schema are ignored.
//!
//! Numbers and booleans are widened into string columns. Objects and arrays
//! are not: a structured value in a string column is a schema mismatch.

use deltalake::arrow::array::RecordBatch;
use deltalake::arrow::datatypes::{DataType, SchemaRef};
use deltalake::arrow::json::ReaderBuilder;
use serde_json::{Map, Value};
use snafu::prelude::*;
use tracing::debug;

use crate::error::{AssembleError, EmptyBatchSnafu, PayloadDecodeSnafu, SchemaMismatchSnafu};
use crate::record::RawRecord;

/// Records ordered ascending by send time, ties kept in arrival order.
///
/// Each record is paired with its position in `records`.
pub fn sort_by_arrival(records: &[RawRecord]) -> Vec<(usize, &RawRecord)> {
    let mut ordered: Vec<(usize, &RawRecord)> = records.iter().enumerate().collect();
    ordered.sort_by_key(|(_, record)| record.sent_timestamp());
    ordered
}

/// A batch of records in table schema, consumed once by an upsert.
#[derive(Debug, Clone)]
pub struct Batch {
    record_batch: RecordBatch,
}

impl Batch {
    pub fn num_rows(&self) -> usize {
        self.record_batch.num_rows()
    }

    pub fn schema(&self) -> SchemaRef {
        self.record_batch.schema()
    }

    pub fn record_batch(&self) -> &RecordBatch {
        &self.record_batch
    }

    pub fn into_record_batch(self) -> RecordBatch {
        self.record_batch
    }
}

/// Builds [`Batch`]es for one table schema.
#[derive(Debug, Clone)]
pub struct BatchAssembler {
    schema: SchemaRef,
}

impl BatchAssembler {
    pub fn new(schema: SchemaRef) -> Self {
        Self { schema }
    }

    pub fn schema(&self) -> &SchemaRef {
        &self.schema
    }

    /// Assemble every record into one batch.
    ///
    /// Fails with [`AssembleError::EmptyBatch`] when there are no records or
    /// the schema has no columns. Any record that cannot be decoded or
    /// coerced fails the whole batch.
    pub fn assemble(&self, records: &[RawRecord]) -> Result<Batch, AssembleError> {
        ensure!(
            !records.is_empty() && !self.schema.fields().is_empty(),
            EmptyBatchSnafu
        );

        let ordered = sort_by_arrival(records);

        let mut rows = Vec::with_capacity(ordered.len());
        for (index, record) in ordered {
            let mut row = self.decode_row(index, record)?;
            coerce_object_fields(index, &mut row, &self.schema)?;
            rows.push(row);
        }

        let mut decoder = ReaderBuilder::new(self.schema.clone())
            .with_batch_size(rows.len().max(1))
            .with_strict_mode(false)
            .build_decoder()
            .map_err(|e| {
                SchemaMismatchSnafu {
                    message: e.to_string(),
                }
                .build()
            })?;

        decoder.serialize(&rows).map_err(|e| {
            SchemaMismatchSnafu {
                message: e.to_string(),
            }
            .build()
        })?;

        let record_batch = decoder
            .flush()
            .map_err(|e| {
                SchemaMismatchSnafu {
                    message: e.to_string(),
                }
                .build()
            })?
            .context(EmptyBatchSnafu)?;

        debug!(
            rows = record_batch.num_rows(),
            columns = record_batch.num_columns(),
            "Assembled batch"
        );

        Ok(Batch { record_batch })
    }

    /// Decode one payload into a JSON object with every required column set.
    fn decode_row(
        &self,
        index: usize,
        record: &RawRecord,
    ) -> Result<Map<String, Value>, AssembleError> {
        let value: Value =
            serde_json::from_str(record.body()).context(PayloadDecodeSnafu { index })?;

        let Value::Object(row) = value else {
            return SchemaMismatchSnafu {
                message: format!("record {index} is not a JSON object"),
            }
            .fail();
        };

        for field in self.schema.fields() {
            let present = row.get(field.name()).is_some_and(|v| !v.is_null());
            ensure!(
                field.is_nullable() || present,
                SchemaMismatchSnafu {
                    message: format!(
                        "record {index} has no value for required column '{}'",
                        field.name()
                    ),
                }
            );
        }

        Ok(row)
    }
}

/// Coerce values of string-typed columns to strings.
///
/// Numbers and booleans are formatted. Struct and list columns are walked so
/// nested string fields get the same treatment. An object or array where a
/// string is expected fails the record.
fn coerce_object_fields(
    index: usize,
    row: &mut Map<String, Value>,
    schema: &SchemaRef,
) -> Result<(), AssembleError> {
    for field in schema.fields() {
        if let Some(value) = row.get_mut(field.name()) {
            coerce_value_for_field(value, field.data_type()).map_err(|found| {
                SchemaMismatchSnafu {
                    message: format!(
                        "record {index} has {found} in string column '{}'",
                        field.name()
                    ),
                }
                .build()
            })?;
        }
    }
    Ok(())
}

/// Returns what was found when a structured value sits in a string slot.
fn coerce_value_for_field(value: &mut Value, data_type: &DataType) -> Result<(), &'static str> {
    match data_type {
        DataType::Utf8 | DataType::LargeUtf8 | DataType::Utf8View => match value {
            Value::String(_) | Value::Null => {}
            Value::Number(n) => *value = Value::String(n.to_string()),
            Value::Bool(b) => *value = Value::String(b.to_string()),
            Value::Object(_) => return Err("an object"),
            Value::Array(_) => return Err("an array"),
        },
        DataType::Struct(fields) => {
            if let Value::Object(obj) = value {
                for field in fields.iter() {
                    if let Some(nested) = obj.get_mut(field.name()) {
                        coerce_value_for_field(nested, field.data_type())?;
                    }
                }
            }
        }
        DataType::List(field) | DataType::LargeList(field) => {
            if let Value::Array(items) = value {
                for item in items.iter_mut() {
                    coerce_value_for_field(item, field.data_type())?;
                }
            }
        }
        _ => {}
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use deltalake::arrow::array::{Array, Int64Array, StringArray};
    use deltalake::arrow::datatypes::{Field, Schema};
    use serde_json::json;
    use std::sync::Arc;

    fn orders_schema() -> SchemaRef {
        Arc::new(Schema::new(vec![
            Field::new("id", DataType::Int64, false),
            Field::new("status", DataType::Utf8, true),
        ]))
    }

    fn record(body: Value, ts: i64) -> RawRecord {
        RawRecord::new(body.to_string(), ts)
    }

    fn ids(batch: &Batch) -> Vec<i64> {
        batch
            .record_batch()
            .column_by_name("id")
            .unwrap()
            .as_any()
            .downcast_ref::<Int64Array>()
            .unwrap()
            .values()
            .to_vec()
    }

    fn statuses(batch: &Batch) -> Vec<Option<String>> {
        let column = batch
            .record_batch()
            .column_by_name("status")
            .unwrap()
            .as_any()
            .downcast_ref::<StringArray>()
            .unwrap()
            .clone();
        (0..column.len())
            .map(|i| (!column.is_null(i)).then(|| column.value(i).to_string()))
            .collect()
    }

    #[test]
    fn test_sorts_by_sent_timestamp() {
        let records = vec![
            record(json!({"id": 3}), 300),
            record(json!({"id": 1}), 100),
            record(json!({"id": 2}), 200),
        ];

        let batch = BatchAssembler::new(orders_schema()).assemble(&records).unwrap();

        assert_eq!(batch.num_rows(), 3);
        assert_eq!(ids(&batch), vec![1, 2, 3]);
    }

    #[test]
    fn test_sort_is_stable_on_ties() {
        let records = vec![
            record(json!({"id": 10}), 5),
            record(json!({"id": 20}), 1),
            record(json!({"id": 30}), 5),
            record(json!({"id": 40}), 5),
        ];

        let batch = BatchAssembler::new(orders_schema()).assemble(&records).unwrap();
        assert_eq!(ids(&batch), vec![20, 10, 30, 40]);

        let ordered: Vec<(usize, i64)> = sort_by_arrival(&records)
            .iter()
            .map(|(index, r)| (*index, r.sent_timestamp()))
            .collect();
        assert_eq!(ordered, vec![(1, 1), (0, 5), (2, 5), (3, 5)]);
    }

    #[test]
    fn test_empty_records() {
        let err = BatchAssembler::new(orders_schema()).assemble(&[]).unwrap_err();
        assert!(matches!(err, AssembleError::EmptyBatch));
    }

    #[test]
    fn test_empty_schema() {
        let records = vec![record(json!({"id": 1}), 1)];
        let err = BatchAssembler::new(Arc::new(Schema::empty()))
            .assemble(&records)
            .unwrap_err();
        assert!(matches!(err, AssembleError::EmptyBatch));
    }

    #[test]
    fn test_invalid_payload_reports_index() {
        let records = vec![
            record(json!({"id": 1}), 1),
            RawRecord::new("{not json", 2),
        ];
        let err = BatchAssembler::new(orders_schema())
            .assemble(&records)
            .unwrap_err();
        assert!(matches!(err, AssembleError::PayloadDecode { index: 1, .. }));
    }

    #[test]
    fn test_non_object_payload() {
        let records = vec![record(json!([1, 2, 3]), 1)];
        let err = BatchAssembler::new(orders_schema())
            .assemble(&records)
            .unwrap_err();
        assert!(matches!(err, AssembleError::SchemaMismatch { .. }));
    }

    #[test]
    fn test_missing_required_column() {
        let records = vec![
            record(json!({"id": 1, "status": "new"}), 1),
            record(json!({"status": "lost"}), 2),
        ];
        let err = BatchAssembler::new(orders_schema())
            .assemble(&records)
            .unwrap_err();
        match err {
            AssembleError::SchemaMismatch { message } => {
                assert!(message.contains("'id'"), "message: {message}");
                assert!(message.contains("record 1"), "message: {message}");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_null_required_column() {
        let records = vec![record(json!({"id": null}), 1)];
        let err = BatchAssembler::new(orders_schema())
            .assemble(&records)
            .unwrap_err();
        assert!(matches!(err, AssembleError::SchemaMismatch { .. }));
    }

    #[test]
    fn test_incompatible_type() {
        let records = vec![record(json!({"id": {"nested": true}}), 1)];
        let err = BatchAssembler::new(orders_schema())
            .assemble(&records)
            .unwrap_err();
        assert!(matches!(err, AssembleError::SchemaMismatch { .. }));
    }

    #[test]
    fn test_optional_column_and_extra_fields() {
        let records = vec![
            record(json!({"id": 1, "status": "new", "unknown": 42}), 1),
            record(json!({"id": 2}), 2),
        ];

        let batch = BatchAssembler::new(orders_schema()).assemble(&records).unwrap();

        assert_eq!(batch.schema().fields().len(), 2);
        assert_eq!(statuses(&batch), vec![Some("new".to_string()), None]);
    }

    #[test]
    fn test_widens_scalars_into_string_columns() {
        let records = vec![
            record(json!({"id": 1, "status": 0.5}), 1),
            record(json!({"id": 2, "status": true}), 2),
            record(json!({"id": 3, "status": 7}), 3),
        ];

        let batch = BatchAssembler::new(orders_schema()).assemble(&records).unwrap();

        assert_eq!(
            statuses(&batch),
            vec![
                Some("0.5".to_string()),
                Some("true".to_string()),
                Some("7".to_string()),
            ]
        );
    }

    #[test]
    fn test_rejects_structured_values_in_string_columns() {
        let records = vec![
            record(json!({"id": 1, "status": "new"}), 1),
            record(json!({"id": 2, "status": {"code": 7}}), 2),
        ];
        let err = BatchAssembler::new(orders_schema())
            .assemble(&records)
            .unwrap_err();
        match err {
            AssembleError::SchemaMismatch { message } => {
                assert!(message.contains("record 1"), "message: {message}");
                assert!(message.contains("an object"), "message: {message}");
                assert!(message.contains("'status'"), "message: {message}");
            }
            other => panic!("unexpected error: {other}"),
        }

        let records = vec![record(json!({"id": 1, "status": ["a", "b"]}), 1)];
        let err = BatchAssembler::new(orders_schema())
            .assemble(&records)
            .unwrap_err();
        assert!(
            matches!(
                &err,
                AssembleError::SchemaMismatch { message } if message.contains("an array")
            ),
            "unexpected error: {err}"
        );
    }

    #[test]
    fn test_coerce_recurses_into_structs_and_lists() {
        let item = Field::new("item", DataType::Utf8, true);
        let schema = Arc::new(Schema::new(vec![
            Field::new(
                "meta",
                DataType::Struct(vec![Field::new("label", DataType::Utf8, true)].into()),
                true,
            ),
            Field::new("tags", DataType::List(Arc::new(item)), true),
        ]));

        let mut row = json!({"meta": {"label": 12}, "tags": [1, "two", false]})
            .as_object()
            .unwrap()
            .clone();
        coerce_object_fields(0, &mut row, &schema).unwrap();

        assert_eq!(row["meta"]["label"], json!("12"));
        assert_eq!(row["tags"], json!(["1", "two", "false"]));

        let mut row = json!({"meta": {"label": {"deep": 1}}})
            .as_object()
            .unwrap()
            .clone();
        let err = coerce_object_fields(4, &mut row, &schema).unwrap_err();
        assert!(err.to_string().contains("record 4"), "error: {err}");
    }
}

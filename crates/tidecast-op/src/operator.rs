//! Shared accumulate/finalize machinery for the group operators.
//!
//! Operators run in three phases: bind (schema and parameter validation,
//! before any row), update (bucket incoming rows per group), finalize
//! (drain per-group output in batches of at most [`VECTOR_SIZE`] rows).

use std::collections::HashMap;

use tidecast_core::error::{ForecastError, Result};
use tidecast_core::frequency::DateAxisKind;

use crate::types::{RowBatch, ScalarValue, Schema};

/// Result of one finalize call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinalizeResult {
    /// More output remains; call finalize again.
    HaveMoreOutput,
    /// All groups are drained.
    Finished,
}

/// What to do when a single group fails at finalize.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ErrorPolicy {
    /// Abort the whole operator on the first failing group.
    #[default]
    Abort,
    /// Emit zero data rows for the failing group and carry the message in
    /// an error column.
    EmitMessage,
}

/// Accumulated rows for one group.
#[derive(Debug, Default)]
pub struct GroupBuffer {
    /// Original group-key value, emitted unchanged.
    pub group_value: ScalarValue,
    /// Date-axis values in native units, input order.
    pub dates: Vec<i64>,
    /// Values with NaN as the NULL sentinel, aligned with `dates`.
    pub values: Vec<f64>,
    /// Preserved passthrough columns, aligned with `dates`.
    pub other_rows: Vec<Vec<ScalarValue>>,
    /// Date -> position of the (last) row carrying it.
    pub date_to_index: HashMap<i64, usize>,
}

impl GroupBuffer {
    /// Rows sorted by date with duplicate dates collapsed to the last
    /// occurrence; the value slot is `None` where the sentinel was stored.
    pub fn sorted_series(&self) -> (Vec<i64>, Vec<Option<f64>>) {
        let mut order: Vec<usize> = (0..self.dates.len()).collect();
        order.sort_by_key(|&i| (self.dates[i], i));

        let mut dates = Vec::with_capacity(order.len());
        let mut values: Vec<Option<f64>> = Vec::with_capacity(order.len());
        for i in order {
            let date = self.dates[i];
            let value = if self.values[i].is_nan() {
                None
            } else {
                Some(self.values[i])
            };
            if dates.last() == Some(&date) {
                *values.last_mut().expect("dates non-empty here") = value;
            } else {
                dates.push(date);
                values.push(value);
            }
        }
        (dates, values)
    }
}

/// Buckets rows by canonical group key, preserving first-seen order.
#[derive(Debug, Default)]
pub struct GroupAccumulator {
    pub order: Vec<String>,
    pub groups: HashMap<String, GroupBuffer>,
}

/// Bound positions of the key columns in the input schema.
#[derive(Debug, Clone, Copy)]
pub struct BoundColumns {
    pub group_idx: usize,
    pub date_idx: usize,
    pub value_idx: usize,
    pub axis: DateAxisKind,
}

/// Resolve the group/date/value columns and the date axis at bind time.
pub fn bind_columns(
    schema: &Schema,
    group_col: &str,
    date_col: &str,
    value_col: &str,
) -> Result<BoundColumns> {
    let group_idx = schema.index_of(group_col)?;
    let date_idx = schema.index_of(date_col)?;
    let value_idx = schema.index_of(value_col)?;

    let axis = schema.columns[date_idx].data_type.date_axis().ok_or_else(|| {
        ForecastError::InvalidInput(format!(
            "column '{}' has type {:?}, which cannot carry the date axis",
            date_col, schema.columns[date_idx].data_type
        ))
    })?;

    Ok(BoundColumns {
        group_idx,
        date_idx,
        value_idx,
        axis,
    })
}

impl GroupAccumulator {
    /// Bucket one input batch. Rows with a NULL date are skipped; NULL
    /// values are stored as the NaN sentinel; all other columns are
    /// preserved for re-emission.
    pub fn accumulate(&mut self, batch: &RowBatch, bound: &BoundColumns) -> Result<()> {
        for row in 0..batch.num_rows() {
            let date_value = batch.value(bound.date_idx, row);
            let Some(date) = date_value.date_value(bound.axis)? else {
                continue;
            };

            let group_value = batch.value(bound.group_idx, row);
            let key = group_value.canonical_string();

            let buffer = match self.groups.get_mut(&key) {
                Some(buffer) => buffer,
                None => {
                    self.order.push(key.clone());
                    let buffer = self.groups.entry(key).or_default();
                    buffer.group_value = group_value.clone();
                    buffer
                }
            };

            let value = batch
                .value(bound.value_idx, row)
                .as_f64()
                .unwrap_or(f64::NAN);

            let mut other = Vec::with_capacity(batch.num_columns().saturating_sub(3));
            for col in 0..batch.num_columns() {
                if col != bound.group_idx && col != bound.date_idx && col != bound.value_idx {
                    other.push(batch.value(col, row).clone());
                }
            }

            buffer.date_to_index.insert(date, buffer.dates.len());
            buffer.dates.push(date);
            buffer.values.push(value);
            buffer.other_rows.push(other);
        }
        Ok(())
    }
}

/// Materialized output rows drained in batches of [`crate::types::VECTOR_SIZE`].
#[derive(Debug, Default)]
pub struct DrainQueue {
    rows: std::collections::VecDeque<Vec<ScalarValue>>,
    n_columns: usize,
}

impl DrainQueue {
    pub fn new(n_columns: usize) -> Self {
        Self {
            rows: std::collections::VecDeque::new(),
            n_columns,
        }
    }

    pub fn push(&mut self, row: Vec<ScalarValue>) {
        debug_assert_eq!(row.len(), self.n_columns);
        self.rows.push_back(row);
    }

    pub fn drain(&mut self) -> (RowBatch, FinalizeResult) {
        let mut batch = RowBatch::with_columns(self.n_columns);
        while batch.num_rows() < crate::types::VECTOR_SIZE {
            match self.rows.pop_front() {
                Some(row) => batch.push_row(row),
                None => break,
            }
        }
        let state = if self.rows.is_empty() {
            FinalizeResult::Finished
        } else {
            FinalizeResult::HaveMoreOutput
        };
        (batch, state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Column, DataType};

    fn schema() -> Schema {
        Schema::new(vec![
            Column::new("id", DataType::Varchar),
            Column::new("ds", DataType::Integer),
            Column::new("y", DataType::Double),
            Column::new("note", DataType::Varchar),
        ])
    }

    fn batch(rows: &[(&str, Option<i64>, Option<f64>, &str)]) -> RowBatch {
        let mut out = RowBatch::with_columns(4);
        for (id, ds, y, note) in rows {
            out.push_row(vec![
                ScalarValue::Varchar(id.to_string()),
                ds.map(ScalarValue::Int).unwrap_or(ScalarValue::Null),
                y.map(ScalarValue::Double).unwrap_or(ScalarValue::Null),
                ScalarValue::Varchar(note.to_string()),
            ]);
        }
        out
    }

    #[test]
    fn test_groups_in_first_seen_order() {
        let schema = schema();
        let bound = bind_columns(&schema, "id", "ds", "y").unwrap();
        let mut acc = GroupAccumulator::default();
        acc.accumulate(
            &batch(&[
                ("b", Some(1), Some(1.0), "x"),
                ("a", Some(1), Some(2.0), "y"),
                ("b", Some(2), Some(3.0), "z"),
            ]),
            &bound,
        )
        .unwrap();

        assert_eq!(acc.order, vec!["b", "a"]);
        assert_eq!(acc.groups["b"].dates, vec![1, 2]);
        assert_eq!(acc.groups["a"].other_rows[0], vec![ScalarValue::Varchar("y".to_string())]);
    }

    #[test]
    fn test_null_dates_skipped_null_values_sentineled() {
        let schema = schema();
        let bound = bind_columns(&schema, "id", "ds", "y").unwrap();
        let mut acc = GroupAccumulator::default();
        acc.accumulate(
            &batch(&[
                ("a", None, Some(1.0), ""),
                ("a", Some(5), None, ""),
            ]),
            &bound,
        )
        .unwrap();

        let buffer = &acc.groups["a"];
        assert_eq!(buffer.dates, vec![5]);
        assert!(buffer.values[0].is_nan());
    }

    #[test]
    fn test_sorted_series_dedupes_dates() {
        let mut buffer = GroupBuffer::default();
        buffer.dates = vec![3, 1, 3];
        buffer.values = vec![30.0, 10.0, 31.0];
        buffer.other_rows = vec![vec![], vec![], vec![]];
        let (dates, values) = buffer.sorted_series();
        assert_eq!(dates, vec![1, 3]);
        assert_eq!(values, vec![Some(10.0), Some(31.0)]);
    }

    #[test]
    fn test_bind_rejects_missing_and_undateable_columns() {
        let schema = schema();
        assert!(bind_columns(&schema, "nope", "ds", "y").is_err());
        assert!(bind_columns(&schema, "id", "note", "y").is_err());
    }
}

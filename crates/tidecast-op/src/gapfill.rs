//! Gap-fill and fill-forward streaming operators.
//!
//! Both densify each group's date axis and re-emit every input column:
//! rows whose date existed keep their original value and passthrough
//! columns, generated rows carry NULLs. Output preserves the input schema
//! column-for-column.

use tidecast_core::error::Result;
use tidecast_core::frequency::{generate_range, Frequency};

use crate::operator::{bind_columns, BoundColumns, FinalizeResult, GroupAccumulator};
use crate::types::{RowBatch, ScalarValue, Schema, VECTOR_SIZE};

/// How far a group's dense range extends.
#[derive(Debug, Clone, Copy)]
enum RangeEnd {
    /// The group's own maximum (gap fill).
    GroupMax,
    /// A fixed target date; groups ending earlier are extended with NULL
    /// rows (fill forward). Targets before a group's maximum are clamped
    /// to the maximum, which makes the operator idempotent.
    Target(i64),
}

#[derive(Debug)]
struct DenseEmitState {
    /// Generated dense dates per group, in group order.
    ranges: Vec<Vec<i64>>,
    group_cursor: usize,
    date_cursor: usize,
}

/// Shared implementation of the two densifying operators.
#[derive(Debug)]
pub struct DenseFillOperator {
    schema: Schema,
    bound: BoundColumns,
    step: i64,
    range_end: RangeEnd,
    accumulator: GroupAccumulator,
    emit: Option<DenseEmitState>,
}

impl DenseFillOperator {
    fn bind(
        schema: Schema,
        group_col: &str,
        date_col: &str,
        value_col: &str,
        frequency: &str,
        range_end: RangeEnd,
    ) -> Result<Self> {
        let bound = bind_columns(&schema, group_col, date_col, value_col)?;
        let frequency = Frequency::parse(frequency)?;
        frequency.validate_for_axis(bound.axis)?;

        Ok(Self {
            step: frequency.step_for_axis(bound.axis),
            schema,
            bound,
            range_end,
            accumulator: GroupAccumulator::default(),
            emit: None,
        })
    }

    /// Feed one input batch. May be called any number of times before the
    /// first finalize.
    pub fn update(&mut self, batch: &RowBatch) -> Result<()> {
        self.accumulator.accumulate(batch, &self.bound)
    }

    /// Drain up to [`VECTOR_SIZE`] output rows. Returns `HaveMoreOutput`
    /// until every group is exhausted.
    pub fn finalize(&mut self) -> Result<(RowBatch, FinalizeResult)> {
        if self.emit.is_none() {
            let ranges = self
                .accumulator
                .order
                .iter()
                .map(|key| {
                    let buffer = &self.accumulator.groups[key];
                    let min = *buffer.dates.iter().min().expect("group has at least one row");
                    let max = *buffer.dates.iter().max().expect("group has at least one row");
                    let end = match self.range_end {
                        RangeEnd::GroupMax => max,
                        RangeEnd::Target(target) => target.max(max),
                    };
                    generate_range(min, end, self.step)
                })
                .collect();
            self.emit = Some(DenseEmitState {
                ranges,
                group_cursor: 0,
                date_cursor: 0,
            });
        }

        let emit = self.emit.as_mut().expect("initialized above");
        let mut output = RowBatch::with_columns(self.schema.len());
        let n_columns = self.schema.len();

        while output.num_rows() < VECTOR_SIZE && emit.group_cursor < self.accumulator.order.len() {
            let range = &emit.ranges[emit.group_cursor];
            if emit.date_cursor >= range.len() {
                emit.group_cursor += 1;
                emit.date_cursor = 0;
                continue;
            }

            let key = &self.accumulator.order[emit.group_cursor];
            let buffer = &self.accumulator.groups[key];
            let date = range[emit.date_cursor];
            let original = buffer.date_to_index.get(&date).copied();

            let mut row = Vec::with_capacity(n_columns);
            let mut other_cursor = 0usize;
            for col in 0..n_columns {
                if col == self.bound.group_idx {
                    row.push(buffer.group_value.clone());
                } else if col == self.bound.date_idx {
                    row.push(ScalarValue::from_date_value(date, self.bound.axis));
                } else if col == self.bound.value_idx {
                    match original {
                        Some(idx) if !buffer.values[idx].is_nan() => {
                            row.push(ScalarValue::Double(buffer.values[idx]));
                        }
                        _ => row.push(ScalarValue::Null),
                    }
                } else {
                    match original {
                        Some(idx) => {
                            row.push(buffer.other_rows[idx][other_cursor].clone());
                        }
                        None => row.push(ScalarValue::Null),
                    }
                    other_cursor += 1;
                }
            }
            output.push_row(row);
            emit.date_cursor += 1;
        }

        let state = if emit.group_cursor >= self.accumulator.order.len() {
            FinalizeResult::Finished
        } else {
            FinalizeResult::HaveMoreOutput
        };
        Ok((output, state))
    }

    /// Output schema: identical to the input schema.
    pub fn output_schema(&self) -> &Schema {
        &self.schema
    }
}

/// Densify each group between its own min and max date.
pub struct GapFillOperator(DenseFillOperator);

impl GapFillOperator {
    pub fn bind(
        schema: Schema,
        group_col: &str,
        date_col: &str,
        value_col: &str,
        frequency: &str,
    ) -> Result<Self> {
        Ok(Self(DenseFillOperator::bind(
            schema,
            group_col,
            date_col,
            value_col,
            frequency,
            RangeEnd::GroupMax,
        )?))
    }

    pub fn update(&mut self, batch: &RowBatch) -> Result<()> {
        self.0.update(batch)
    }

    pub fn finalize(&mut self) -> Result<(RowBatch, FinalizeResult)> {
        self.0.finalize()
    }

    pub fn output_schema(&self) -> &Schema {
        self.0.output_schema()
    }
}

/// Densify each group from its min date out to a caller-provided target.
pub struct FillForwardOperator(DenseFillOperator);

impl FillForwardOperator {
    pub fn bind(
        schema: Schema,
        group_col: &str,
        date_col: &str,
        value_col: &str,
        frequency: &str,
        target_date: i64,
    ) -> Result<Self> {
        Ok(Self(DenseFillOperator::bind(
            schema,
            group_col,
            date_col,
            value_col,
            frequency,
            RangeEnd::Target(target_date),
        )?))
    }

    pub fn update(&mut self, batch: &RowBatch) -> Result<()> {
        self.0.update(batch)
    }

    pub fn finalize(&mut self) -> Result<(RowBatch, FinalizeResult)> {
        self.0.finalize()
    }

    pub fn output_schema(&self) -> &Schema {
        self.0.output_schema()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Column, DataType};

    fn int_schema() -> Schema {
        Schema::new(vec![
            Column::new("id", DataType::Varchar),
            Column::new("ds", DataType::Bigint),
            Column::new("y", DataType::Double),
        ])
    }

    fn int_batch(rows: &[(&str, i64, f64)]) -> RowBatch {
        let mut batch = RowBatch::with_columns(3);
        for (id, ds, y) in rows {
            batch.push_row(vec![
                ScalarValue::Varchar(id.to_string()),
                ScalarValue::Int(*ds),
                ScalarValue::Double(*y),
            ]);
        }
        batch
    }

    fn drain(op: &mut GapFillOperator) -> RowBatch {
        let mut all = RowBatch::with_columns(op.output_schema().len());
        loop {
            let (batch, state) = op.finalize().unwrap();
            for row in 0..batch.num_rows() {
                let mut r = Vec::new();
                for col in 0..batch.num_columns() {
                    r.push(batch.value(col, row).clone());
                }
                all.push_row(r);
            }
            if state == FinalizeResult::Finished {
                return all;
            }
        }
    }

    #[test]
    fn test_integer_axis_step_two_is_identity() {
        let mut op = GapFillOperator::bind(int_schema(), "id", "ds", "y", "2").unwrap();
        op.update(&int_batch(&[("A", 1, 10.0), ("A", 3, 30.0), ("A", 5, 50.0)]))
            .unwrap();
        let out = drain(&mut op);
        assert_eq!(out.num_rows(), 3);
        assert_eq!(out.value(1, 0), &ScalarValue::Int(1));
        assert_eq!(out.value(2, 1), &ScalarValue::Double(30.0));
        assert_eq!(out.value(1, 2), &ScalarValue::Int(5));
    }

    #[test]
    fn test_integer_axis_step_one_inserts_nulls() {
        let mut op = GapFillOperator::bind(int_schema(), "id", "ds", "y", "1").unwrap();
        op.update(&int_batch(&[("A", 1, 10.0), ("A", 3, 30.0), ("A", 5, 50.0)]))
            .unwrap();
        let out = drain(&mut op);
        assert_eq!(out.num_rows(), 5);
        let expected = [
            (1, Some(10.0)),
            (2, None),
            (3, Some(30.0)),
            (4, None),
            (5, Some(50.0)),
        ];
        for (row, (ds, y)) in expected.iter().enumerate() {
            assert_eq!(out.value(0, row), &ScalarValue::Varchar("A".to_string()));
            assert_eq!(out.value(1, row), &ScalarValue::Int(*ds));
            match y {
                Some(v) => assert_eq!(out.value(2, row), &ScalarValue::Double(*v)),
                None => assert!(out.value(2, row).is_null()),
            }
        }
    }

    #[test]
    fn test_gapless_series_round_trips() {
        let mut op = GapFillOperator::bind(int_schema(), "id", "ds", "y", "1").unwrap();
        op.update(&int_batch(&[("A", 1, 1.0), ("A", 2, 2.0), ("A", 3, 3.0)]))
            .unwrap();
        let out = drain(&mut op);
        assert_eq!(out.num_rows(), 3);
        for row in 0..3 {
            assert_eq!(
                out.value(2, row),
                &ScalarValue::Double((row + 1) as f64)
            );
        }
    }

    #[test]
    fn test_groups_emitted_in_first_seen_order() {
        let mut op = GapFillOperator::bind(int_schema(), "id", "ds", "y", "1").unwrap();
        op.update(&int_batch(&[("B", 1, 1.0), ("A", 1, 2.0), ("B", 2, 3.0)]))
            .unwrap();
        let out = drain(&mut op);
        assert_eq!(out.value(0, 0), &ScalarValue::Varchar("B".to_string()));
        assert_eq!(out.value(0, 1), &ScalarValue::Varchar("B".to_string()));
        assert_eq!(out.value(0, 2), &ScalarValue::Varchar("A".to_string()));
    }

    #[test]
    fn test_passthrough_columns_preserved_and_nulled() {
        let schema = Schema::new(vec![
            Column::new("id", DataType::Varchar),
            Column::new("ds", DataType::Bigint),
            Column::new("y", DataType::Double),
            Column::new("tag", DataType::Varchar),
        ]);
        let mut batch = RowBatch::with_columns(4);
        batch.push_row(vec![
            ScalarValue::Varchar("A".to_string()),
            ScalarValue::Int(1),
            ScalarValue::Double(1.0),
            ScalarValue::Varchar("t1".to_string()),
        ]);
        batch.push_row(vec![
            ScalarValue::Varchar("A".to_string()),
            ScalarValue::Int(3),
            ScalarValue::Double(3.0),
            ScalarValue::Varchar("t3".to_string()),
        ]);

        let mut op = GapFillOperator::bind(schema, "id", "ds", "y", "1").unwrap();
        op.update(&batch).unwrap();
        let out = drain(&mut op);
        assert_eq!(out.num_rows(), 3);
        assert_eq!(out.value(3, 0), &ScalarValue::Varchar("t1".to_string()));
        assert!(out.value(3, 1).is_null());
        assert_eq!(out.value(3, 2), &ScalarValue::Varchar("t3".to_string()));
    }

    #[test]
    fn test_date_column_rejects_integer_frequency_at_bind() {
        let schema = Schema::new(vec![
            Column::new("id", DataType::Varchar),
            Column::new("ds", DataType::Date),
            Column::new("y", DataType::Double),
        ]);
        assert!(GapFillOperator::bind(schema.clone(), "id", "ds", "y", "2").is_err());
        assert!(GapFillOperator::bind(schema.clone(), "id", "ds", "y", "1h").is_err());
        assert!(GapFillOperator::bind(schema, "id", "ds", "y", "1d").is_ok());
    }

    #[test]
    fn test_fill_forward_extends_to_target_and_is_idempotent_at_max() {
        let mut op =
            FillForwardOperator::bind(int_schema(), "id", "ds", "y", "1", 5).unwrap();
        op.update(&int_batch(&[("A", 1, 1.0), ("A", 2, 2.0), ("A", 3, 3.0)]))
            .unwrap();
        let (out, state) = op.finalize().unwrap();
        assert_eq!(state, FinalizeResult::Finished);
        assert_eq!(out.num_rows(), 5);
        assert!(out.value(2, 3).is_null());
        assert!(out.value(2, 4).is_null());

        // Target equal to the existing max adds nothing.
        let mut op =
            FillForwardOperator::bind(int_schema(), "id", "ds", "y", "1", 3).unwrap();
        op.update(&int_batch(&[("A", 1, 1.0), ("A", 2, 2.0), ("A", 3, 3.0)]))
            .unwrap();
        let (out, _) = op.finalize().unwrap();
        assert_eq!(out.num_rows(), 3);
        assert_eq!(out.value(2, 2), &ScalarValue::Double(3.0));
    }

    #[test]
    fn test_emission_chunked_to_vector_size() {
        let mut op = GapFillOperator::bind(int_schema(), "id", "ds", "y", "1").unwrap();
        op.update(&int_batch(&[("A", 1, 1.0), ("A", 5000, 2.0)])).unwrap();

        let (first, state) = op.finalize().unwrap();
        assert_eq!(first.num_rows(), VECTOR_SIZE);
        assert_eq!(state, FinalizeResult::HaveMoreOutput);

        let (second, state) = op.finalize().unwrap();
        assert_eq!(second.num_rows(), VECTOR_SIZE);
        assert_eq!(state, FinalizeResult::HaveMoreOutput);

        let (third, state) = op.finalize().unwrap();
        assert_eq!(third.num_rows(), 5000 - 2 * VECTOR_SIZE);
        assert_eq!(state, FinalizeResult::Finished);
    }
}

//! Host value, schema, and row-batch types.
//!
//! The host columnar engine hands the operators row batches whose column
//! positions and types are resolved at bind time from caller-supplied
//! column names. Batches are column-major vectors of null-aware scalar
//! values.

use tidecast_core::error::{ForecastError, Result};
use tidecast_core::frequency::DateAxisKind;

/// Rows emitted per output batch.
pub const VECTOR_SIZE: usize = 2048;

/// Column type as declared by the host schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataType {
    Boolean,
    Integer,
    Bigint,
    Double,
    Varchar,
    /// Whole days since epoch.
    Date,
    /// Microseconds since epoch.
    Timestamp,
    /// Homogeneous list of scalars.
    List,
}

impl DataType {
    /// Date-axis interpretation of this column type, if it can carry the
    /// date axis at all.
    pub fn date_axis(&self) -> Option<DateAxisKind> {
        match self {
            DataType::Date => Some(DateAxisKind::Date),
            DataType::Timestamp => Some(DateAxisKind::Timestamp),
            DataType::Integer | DataType::Bigint => Some(DateAxisKind::Integer),
            _ => None,
        }
    }
}

/// A single null-aware host value.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum ScalarValue {
    #[default]
    Null,
    Boolean(bool),
    Int(i64),
    Double(f64),
    Varchar(String),
    /// Days since epoch.
    Date(i32),
    /// Microseconds since epoch.
    Timestamp(i64),
    List(Vec<ScalarValue>),
}

impl ScalarValue {
    pub fn is_null(&self) -> bool {
        matches!(self, ScalarValue::Null)
    }

    /// Stable textual form used as the canonical group key.
    pub fn canonical_string(&self) -> String {
        use chrono::DateTime;

        match self {
            ScalarValue::Null => "__NULL__".to_string(),
            ScalarValue::Boolean(v) => v.to_string(),
            ScalarValue::Int(v) => v.to_string(),
            ScalarValue::Double(v) => v.to_string(),
            ScalarValue::Varchar(v) => v.clone(),
            ScalarValue::Date(v) => match DateTime::from_timestamp(*v as i64 * 86_400, 0) {
                Some(dt) => dt.date_naive().to_string(),
                None => v.to_string(),
            },
            ScalarValue::Timestamp(v) => match DateTime::from_timestamp_micros(*v) {
                Some(dt) => dt.naive_utc().to_string(),
                None => v.to_string(),
            },
            ScalarValue::List(items) => {
                let parts: Vec<String> = items.iter().map(|i| i.canonical_string()).collect();
                format!("[{}]", parts.join(","))
            }
        }
    }

    /// The date-axis value in its native unit, per the bound axis kind.
    pub fn date_value(&self, axis: DateAxisKind) -> Result<Option<i64>> {
        match (self, axis) {
            (ScalarValue::Null, _) => Ok(None),
            (ScalarValue::Date(d), DateAxisKind::Date) => Ok(Some(*d as i64)),
            (ScalarValue::Timestamp(ts), DateAxisKind::Timestamp) => Ok(Some(*ts)),
            (ScalarValue::Int(v), DateAxisKind::Integer) => Ok(Some(*v)),
            (other, _) => Err(ForecastError::InvalidInput(format!(
                "value {:?} does not match the bound date axis {:?}",
                other, axis
            ))),
        }
    }

    /// Render the date-axis value back into a scalar of the bound kind.
    pub fn from_date_value(value: i64, axis: DateAxisKind) -> ScalarValue {
        match axis {
            DateAxisKind::Date => ScalarValue::Date(value as i32),
            DateAxisKind::Timestamp => ScalarValue::Timestamp(value),
            DateAxisKind::Integer => ScalarValue::Int(value),
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ScalarValue::Double(v) => Some(*v),
            ScalarValue::Int(v) => Some(*v as f64),
            _ => None,
        }
    }
}

/// A named, typed column.
#[derive(Debug, Clone)]
pub struct Column {
    pub name: String,
    pub data_type: DataType,
}

impl Column {
    pub fn new(name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            data_type,
        }
    }
}

/// An ordered set of columns.
#[derive(Debug, Clone, Default)]
pub struct Schema {
    pub columns: Vec<Column>,
}

impl Schema {
    pub fn new(columns: Vec<Column>) -> Self {
        Self { columns }
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Resolve a column by name; bind-time errors name the column.
    pub fn index_of(&self, name: &str) -> Result<usize> {
        self.columns
            .iter()
            .position(|c| c.name == name)
            .ok_or_else(|| {
                ForecastError::InvalidInput(format!("column '{}' not found in input table", name))
            })
    }
}

/// Column-major batch of rows.
#[derive(Debug, Clone, Default)]
pub struct RowBatch {
    pub columns: Vec<Vec<ScalarValue>>,
}

impl RowBatch {
    pub fn with_columns(n_columns: usize) -> Self {
        Self {
            columns: vec![Vec::new(); n_columns],
        }
    }

    pub fn num_rows(&self) -> usize {
        self.columns.first().map(|c| c.len()).unwrap_or(0)
    }

    pub fn num_columns(&self) -> usize {
        self.columns.len()
    }

    pub fn value(&self, column: usize, row: usize) -> &ScalarValue {
        &self.columns[column][row]
    }

    /// Append one row. The row length must match the column count.
    pub fn push_row(&mut self, row: Vec<ScalarValue>) {
        debug_assert_eq!(row.len(), self.columns.len());
        for (column, value) in self.columns.iter_mut().zip(row) {
            column.push(value);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonical_group_keys() {
        assert_eq!(ScalarValue::Null.canonical_string(), "__NULL__");
        assert_eq!(ScalarValue::Int(42).canonical_string(), "42");
        assert_eq!(
            ScalarValue::Varchar("store_a".to_string()).canonical_string(),
            "store_a"
        );
    }

    #[test]
    fn test_date_value_per_axis() {
        use tidecast_core::frequency::DateAxisKind;

        let date = ScalarValue::Date(19_000);
        assert_eq!(date.date_value(DateAxisKind::Date).unwrap(), Some(19_000));
        assert!(date.date_value(DateAxisKind::Timestamp).is_err());
        assert_eq!(ScalarValue::Null.date_value(DateAxisKind::Date).unwrap(), None);
    }

    #[test]
    fn test_schema_lookup() {
        let schema = Schema::new(vec![
            Column::new("id", DataType::Varchar),
            Column::new("ds", DataType::Date),
            Column::new("y", DataType::Double),
        ]);
        assert_eq!(schema.index_of("ds").unwrap(), 1);
        assert!(schema.index_of("missing").is_err());
    }

    #[test]
    fn test_row_batch_round_trip() {
        let mut batch = RowBatch::with_columns(2);
        batch.push_row(vec![ScalarValue::Int(1), ScalarValue::Double(10.0)]);
        batch.push_row(vec![ScalarValue::Int(2), ScalarValue::Null]);
        assert_eq!(batch.num_rows(), 2);
        assert_eq!(batch.value(0, 1), &ScalarValue::Int(2));
        assert!(batch.value(1, 1).is_null());
    }
}

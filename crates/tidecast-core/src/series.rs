//! Time series container and validating builder.

use crate::error::{ForecastError, Result};

/// Interpretation of the timestamp axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AxisKind {
    /// Microseconds since epoch.
    #[default]
    Timestamp,
    /// Plain integer index.
    Index,
}

/// An immutable, validated time series.
///
/// Timestamps are strictly increasing and values are finite. Construct via
/// [`TimeSeriesBuilder`].
#[derive(Debug, Clone)]
pub struct TimeSeries {
    timestamps: Vec<i64>,
    values: Vec<f64>,
    axis: AxisKind,
}

impl TimeSeries {
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn timestamps(&self) -> &[i64] {
        &self.timestamps
    }

    pub fn axis(&self) -> AxisKind {
        self.axis
    }

    /// Slice out `[start, end)` as a new series.
    pub fn slice(&self, start: usize, end: usize) -> Result<TimeSeries> {
        if start >= end || end > self.len() {
            return Err(ForecastError::InvalidInput(format!(
                "invalid slice [{}, {}) of series with {} points",
                start,
                end,
                self.len()
            )));
        }
        Ok(TimeSeries {
            timestamps: self.timestamps[start..end].to_vec(),
            values: self.values[start..end].to_vec(),
            axis: self.axis,
        })
    }

    /// Modal spacing of the timestamp axis, used to extrapolate forecast
    /// timestamps past the end of the series.
    pub fn typical_spacing(&self) -> Option<i64> {
        if self.len() < 2 {
            return None;
        }
        let mut counts = std::collections::HashMap::new();
        for w in self.timestamps.windows(2) {
            *counts.entry(w[1] - w[0]).or_insert(0usize) += 1;
        }
        counts.into_iter().max_by_key(|(_, c)| *c).map(|(d, _)| d)
    }
}

/// Builder enforcing the series invariants.
#[derive(Debug, Default)]
pub struct TimeSeriesBuilder {
    timestamps: Option<Vec<i64>>,
    values: Option<Vec<f64>>,
    axis: AxisKind,
}

impl TimeSeriesBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn timestamps(mut self, timestamps: Vec<i64>) -> Self {
        self.timestamps = Some(timestamps);
        self
    }

    pub fn values(mut self, values: Vec<f64>) -> Self {
        self.values = Some(values);
        self
    }

    pub fn axis(mut self, axis: AxisKind) -> Self {
        self.axis = axis;
        self
    }

    pub fn build(self) -> Result<TimeSeries> {
        let values = self
            .values
            .ok_or_else(|| ForecastError::InvalidInput("values are required".to_string()))?;

        if values.is_empty() {
            return Err(ForecastError::InvalidInput(
                "time series cannot be empty".to_string(),
            ));
        }
        if let Some(bad) = values.iter().position(|v| !v.is_finite()) {
            return Err(ForecastError::InvalidInput(format!(
                "non-finite value at index {}",
                bad
            )));
        }

        let timestamps_were_none = self.timestamps.is_none();

        // Default axis: 0..n index.
        let timestamps = match self.timestamps {
            Some(ts) => ts,
            None => (0..values.len() as i64).collect(),
        };

        if timestamps.len() != values.len() {
            return Err(ForecastError::InvalidInput(format!(
                "timestamps and values must have the same length: {} vs {}",
                timestamps.len(),
                values.len()
            )));
        }
        for w in timestamps.windows(2) {
            if w[1] <= w[0] {
                return Err(ForecastError::InvalidInput(format!(
                    "timestamps must be strictly increasing ({} followed by {})",
                    w[0], w[1]
                )));
            }
        }

        let axis = if timestamps_were_none {
            AxisKind::Index
        } else {
            self.axis
        };

        Ok(TimeSeries {
            timestamps,
            values,
            axis,
        })
    }
}

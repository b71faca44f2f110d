//! Per-group forecasting driver.
//!
//! Accumulates each group's series, builds a model through the factory at
//! finalize, and emits one structured row per group: step and timestamp
//! lists, point forecasts, interval bounds named after the confidence
//! percentage, the reporting model name, and optionally in-sample fitted
//! values.

use tidecast_core::error::{ForecastError, Result};
use tidecast_core::frequency::DateAxisKind;
use tidecast_core::imputation::fill_nulls_interpolate;
use tidecast_core::models::{self, ModelParams};
use tidecast_core::series::{AxisKind, TimeSeries, TimeSeriesBuilder};

use crate::operator::{
    bind_columns, BoundColumns, DrainQueue, ErrorPolicy, FinalizeResult, GroupAccumulator,
    GroupBuffer,
};
use crate::types::{Column, DataType, RowBatch, ScalarValue, Schema};

/// Forecast operator configuration fixed at bind time.
#[derive(Debug, Clone)]
pub struct ForecastOptions {
    pub model_name: String,
    pub model_params: ModelParams,
    pub horizon: usize,
    pub confidence_level: f64,
    pub include_fitted: bool,
    pub error_policy: ErrorPolicy,
}

impl Default for ForecastOptions {
    fn default() -> Self {
        Self {
            model_name: "Naive".to_string(),
            model_params: ModelParams::new(),
            horizon: 12,
            confidence_level: 0.95,
            include_fitted: false,
            error_policy: ErrorPolicy::Abort,
        }
    }
}

pub struct ForecastOperator {
    bound: BoundColumns,
    options: ForecastOptions,
    output_schema: Schema,
    accumulator: GroupAccumulator,
    queue: Option<DrainQueue>,
}

impl ForecastOperator {
    pub fn bind(
        schema: Schema,
        group_col: &str,
        date_col: &str,
        value_col: &str,
        options: ForecastOptions,
    ) -> Result<Self> {
        let bound = bind_columns(&schema, group_col, date_col, value_col)?;

        if options.horizon == 0 {
            return Err(ForecastError::InvalidInput(
                "horizon must be at least 1".to_string(),
            ));
        }
        if !(0.0 < options.confidence_level && options.confidence_level < 1.0) {
            return Err(ForecastError::InvalidInput(format!(
                "confidence_level must be in (0, 1), got {}",
                options.confidence_level
            )));
        }
        // Surface unknown models and bad parameters before any row flows.
        models::create(&options.model_name, &options.model_params)?;

        let pct = (options.confidence_level * 100.0).round() as u32;
        let group_column = schema.columns[bound.group_idx].clone();

        let mut columns = vec![
            group_column,
            Column::new("forecast_step", DataType::List),
            Column::new("forecast_timestamp", DataType::List),
            Column::new("point_forecast", DataType::List),
            Column::new(format!("lower_{}", pct), DataType::List),
            Column::new(format!("upper_{}", pct), DataType::List),
            Column::new("model_name", DataType::Varchar),
        ];
        if options.include_fitted {
            columns.push(Column::new("insample_fitted", DataType::List));
        }
        if options.error_policy == ErrorPolicy::EmitMessage {
            columns.push(Column::new("error", DataType::Varchar));
        }

        Ok(Self {
            bound,
            options,
            output_schema: Schema::new(columns),
            accumulator: GroupAccumulator::default(),
            queue: None,
        })
    }

    pub fn output_schema(&self) -> &Schema {
        &self.output_schema
    }

    pub fn update(&mut self, batch: &RowBatch) -> Result<()> {
        self.accumulator.accumulate(batch, &self.bound)
    }

    pub fn finalize(&mut self) -> Result<(RowBatch, FinalizeResult)> {
        if self.queue.is_none() {
            let mut queue = DrainQueue::new(self.output_schema.len());
            for key in self.accumulator.order.clone() {
                let buffer = &self.accumulator.groups[&key];
                match self.forecast_group(buffer) {
                    Ok(row) => queue.push(row),
                    Err(err) => match self.options.error_policy {
                        ErrorPolicy::Abort => return Err(err),
                        ErrorPolicy::EmitMessage => {
                            log::warn!("forecast failed for group '{}': {}", key, err);
                            queue.push(self.error_row(buffer, &err));
                        }
                    },
                }
            }
            self.queue = Some(queue);
        }

        Ok(self.queue.as_mut().expect("initialized above").drain())
    }

    fn series_for(&self, buffer: &GroupBuffer) -> Result<(TimeSeries, i64)> {
        let (dates, optional_values) = buffer.sorted_series();
        let values = fill_nulls_interpolate(&optional_values);
        if values.iter().any(|v| v.is_nan()) {
            return Err(ForecastError::InvalidInput(
                "group has no observed values".to_string(),
            ));
        }

        let axis = match self.bound.axis {
            DateAxisKind::Integer => AxisKind::Index,
            _ => AxisKind::Timestamp,
        };
        let ts = TimeSeriesBuilder::new()
            .timestamps(dates.clone())
            .values(values)
            .axis(axis)
            .build()?;
        let spacing = ts.typical_spacing().unwrap_or(1);
        Ok((ts, spacing))
    }

    fn forecast_group(&self, buffer: &GroupBuffer) -> Result<Vec<ScalarValue>> {
        let (ts, spacing) = self.series_for(buffer)?;

        let mut model = models::create(&self.options.model_name, &self.options.model_params)?;
        model.fit(&ts)?;
        let forecast = model.predict(self.options.horizon)?;

        let horizon = self.options.horizon;
        let last_date = *ts.timestamps().last().expect("series is non-empty");

        let steps: Vec<ScalarValue> = (1..=horizon as i64).map(ScalarValue::Int).collect();
        let timestamps: Vec<ScalarValue> = (1..=horizon as i64)
            .map(|h| ScalarValue::from_date_value(last_date + spacing * h, self.bound.axis))
            .collect();
        let point: Vec<ScalarValue> = forecast
            .point
            .iter()
            .map(|&v| ScalarValue::Double(v))
            .collect();

        let (lower, upper) = match (forecast.lower.as_ref(), forecast.upper.as_ref()) {
            (Some(lower), Some(upper)) => (lower.clone(), upper.clone()),
            _ => models::confidence_intervals(
                &forecast.point,
                ts.values(),
                self.options.confidence_level,
            ),
        };
        let lower: Vec<ScalarValue> = lower.iter().map(|&v| ScalarValue::Double(v)).collect();
        let upper: Vec<ScalarValue> = upper.iter().map(|&v| ScalarValue::Double(v)).collect();

        let mut row = vec![
            buffer.group_value.clone(),
            ScalarValue::List(steps),
            ScalarValue::List(timestamps),
            ScalarValue::List(point),
            ScalarValue::List(lower),
            ScalarValue::List(upper),
            ScalarValue::Varchar(forecast.model_name.clone()),
        ];
        if self.options.include_fitted {
            match &forecast.fitted {
                Some(fitted) => row.push(ScalarValue::List(
                    fitted.iter().map(|&v| ScalarValue::Double(v)).collect(),
                )),
                None => row.push(ScalarValue::Null),
            }
        }
        if self.options.error_policy == ErrorPolicy::EmitMessage {
            row.push(ScalarValue::Null);
        }
        Ok(row)
    }

    fn error_row(&self, buffer: &GroupBuffer, err: &ForecastError) -> Vec<ScalarValue> {
        let mut row = vec![
            buffer.group_value.clone(),
            ScalarValue::Null,
            ScalarValue::Null,
            ScalarValue::Null,
            ScalarValue::Null,
            ScalarValue::Null,
            ScalarValue::Null,
        ];
        if self.options.include_fitted {
            row.push(ScalarValue::Null);
        }
        row.push(ScalarValue::Varchar(err.to_string()));
        row
    }
}

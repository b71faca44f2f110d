//! Per-group analytics drivers: descriptive statistics, data quality,
//! changepoint detection, and MSTL decomposition.
//!
//! Stats and quality emit one row per group; changepoints and MSTL emit
//! one row per original timestamp with the augmented columns appended.

use tidecast_core::changepoint::detect_changepoints_bocpd;
use tidecast_core::decomposition::mstl_decompose;
use tidecast_core::error::{ForecastError, Result};
use tidecast_core::frequency::Frequency;
use tidecast_core::imputation::fill_nulls_interpolate;
use tidecast_core::quality::compute_data_quality;
use tidecast_core::stats::compute_ts_stats_with_dates;

use crate::operator::{
    bind_columns, BoundColumns, DrainQueue, ErrorPolicy, FinalizeResult, GroupAccumulator,
};
use crate::types::{Column, DataType, RowBatch, ScalarValue, Schema};

fn double(v: f64) -> ScalarValue {
    if v.is_nan() {
        ScalarValue::Null
    } else {
        ScalarValue::Double(v)
    }
}

/// Per-group 34-field statistics record plus the two date-aware fields.
pub struct StatsOperator {
    bound: BoundColumns,
    frequency: Option<Frequency>,
    output_schema: Schema,
    accumulator: GroupAccumulator,
    queue: Option<DrainQueue>,
}

impl StatsOperator {
    pub fn bind(
        schema: Schema,
        group_col: &str,
        date_col: &str,
        value_col: &str,
        frequency: Option<&str>,
    ) -> Result<Self> {
        let bound = bind_columns(&schema, group_col, date_col, value_col)?;
        let frequency = match frequency {
            Some(raw) => {
                let freq = Frequency::parse(raw)?;
                freq.validate_for_axis(bound.axis)?;
                Some(freq)
            }
            None => None,
        };

        let group_column = schema.columns[bound.group_idx].clone();
        let mut columns = vec![group_column];
        let ubigint = [
            "length",
            "n_nulls",
            "n_nan",
            "n_zeros",
            "n_positive",
            "n_negative",
            "n_unique_values",
        ];
        for name in ubigint {
            columns.push(Column::new(name, DataType::Bigint));
        }
        columns.push(Column::new("is_constant", DataType::Boolean));
        for name in [
            "n_zeros_start",
            "n_zeros_end",
            "plateau_size",
            "plateau_size_nonzero",
        ] {
            columns.push(Column::new(name, DataType::Bigint));
        }
        for name in [
            "mean",
            "median",
            "std_dev",
            "variance",
            "min",
            "max",
            "range",
            "sum",
            "skewness",
            "kurtosis",
            "tail_index",
            "bimodality_coef",
            "trimmed_mean",
            "coef_variation",
            "q1",
            "q3",
            "iqr",
            "autocorr_lag1",
            "trend_strength",
            "seasonality_strength",
            "entropy",
            "stability",
        ] {
            columns.push(Column::new(name, DataType::Double));
        }
        columns.push(Column::new("expected_length", DataType::Bigint));
        columns.push(Column::new("n_gaps", DataType::Bigint));

        Ok(Self {
            bound,
            frequency,
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
            for key in &self.accumulator.order {
                let buffer = &self.accumulator.groups[key];
                let (dates, values) = buffer.sorted_series();
                let stats = compute_ts_stats_with_dates(
                    &dates,
                    &values,
                    self.frequency.map(|f| (f, self.bound.axis)),
                )?;

                let row = vec![
                    buffer.group_value.clone(),
                    ScalarValue::Int(stats.length as i64),
                    ScalarValue::Int(stats.n_nulls as i64),
                    ScalarValue::Int(stats.n_nan as i64),
                    ScalarValue::Int(stats.n_zeros as i64),
                    ScalarValue::Int(stats.n_positive as i64),
                    ScalarValue::Int(stats.n_negative as i64),
                    ScalarValue::Int(stats.n_unique_values as i64),
                    ScalarValue::Boolean(stats.is_constant),
                    ScalarValue::Int(stats.n_zeros_start as i64),
                    ScalarValue::Int(stats.n_zeros_end as i64),
                    ScalarValue::Int(stats.plateau_size as i64),
                    ScalarValue::Int(stats.plateau_size_nonzero as i64),
                    double(stats.mean),
                    double(stats.median),
                    double(stats.std_dev),
                    double(stats.variance),
                    double(stats.min),
                    double(stats.max),
                    double(stats.range),
                    double(stats.sum),
                    double(stats.skewness),
                    double(stats.kurtosis),
                    double(stats.tail_index),
                    double(stats.bimodality_coef),
                    double(stats.trimmed_mean),
                    double(stats.coef_variation),
                    double(stats.q1),
                    double(stats.q3),
                    double(stats.iqr),
                    double(stats.autocorr_lag1),
                    double(stats.trend_strength),
                    double(stats.seasonality_strength),
                    double(stats.entropy),
                    double(stats.stability),
                    stats
                        .expected_length
                        .map(|v| ScalarValue::Int(v as i64))
                        .unwrap_or(ScalarValue::Null),
                    stats
                        .n_gaps
                        .map(|v| ScalarValue::Int(v as i64))
                        .unwrap_or(ScalarValue::Null),
                ];
                queue.push(row);
            }
            self.queue = Some(queue);
        }

        Ok(self.queue.as_mut().expect("initialized above").drain())
    }
}

/// Per-group five-score data quality record.
pub struct QualityOperator {
    bound: BoundColumns,
    output_schema: Schema,
    accumulator: GroupAccumulator,
    queue: Option<DrainQueue>,
}

impl QualityOperator {
    pub fn bind(
        schema: Schema,
        group_col: &str,
        date_col: &str,
        value_col: &str,
    ) -> Result<Self> {
        let bound = bind_columns(&schema, group_col, date_col, value_col)?;
        let group_column = schema.columns[bound.group_idx].clone();
        let columns = vec![
            group_column,
            Column::new("structural_score", DataType::Double),
            Column::new("temporal_score", DataType::Double),
            Column::new("magnitude_score", DataType::Double),
            Column::new("behavioral_score", DataType::Double),
            Column::new("overall_score", DataType::Double),
            Column::new("n_gaps", DataType::Bigint),
            Column::new("n_missing", DataType::Bigint),
            Column::new("is_constant", DataType::Boolean),
        ];
        Ok(Self {
            bound,
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
            for key in &self.accumulator.order {
                let buffer = &self.accumulator.groups[key];
                let (dates, values) = buffer.sorted_series();
                let quality = compute_data_quality(&values, Some(&dates))?;
                queue.push(vec![
                    buffer.group_value.clone(),
                    double(quality.structural_score),
                    double(quality.temporal_score),
                    double(quality.magnitude_score),
                    double(quality.behavioral_score),
                    double(quality.overall_score),
                    ScalarValue::Int(quality.n_gaps as i64),
                    ScalarValue::Int(quality.n_missing as i64),
                    ScalarValue::Boolean(quality.is_constant),
                ]);
            }
            self.queue = Some(queue);
        }

        Ok(self.queue.as_mut().expect("initialized above").drain())
    }
}

/// Per-row changepoint flags and probabilities.
pub struct ChangepointOperator {
    bound: BoundColumns,
    hazard_lambda: f64,
    error_policy: ErrorPolicy,
    output_schema: Schema,
    accumulator: GroupAccumulator,
    queue: Option<DrainQueue>,
}

impl ChangepointOperator {
    pub fn bind(
        schema: Schema,
        group_col: &str,
        date_col: &str,
        value_col: &str,
        hazard_lambda: f64,
        error_policy: ErrorPolicy,
    ) -> Result<Self> {
        let bound = bind_columns(&schema, group_col, date_col, value_col)?;
        if hazard_lambda <= 0.0 {
            return Err(ForecastError::InvalidInput(format!(
                "hazard_lambda must be positive, got {}",
                hazard_lambda
            )));
        }

        let group_column = schema.columns[bound.group_idx].clone();
        let date_column = schema.columns[bound.date_idx].clone();
        let value_column = schema.columns[bound.value_idx].clone();
        let mut columns = vec![
            group_column,
            date_column,
            value_column,
            Column::new("is_changepoint", DataType::Boolean),
            Column::new("changepoint_probability", DataType::Double),
        ];
        if error_policy == ErrorPolicy::EmitMessage {
            columns.push(Column::new("error", DataType::Varchar));
        }

        Ok(Self {
            bound,
            hazard_lambda,
            error_policy,
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
            let has_error_col = self.error_policy == ErrorPolicy::EmitMessage;

            for key in &self.accumulator.order {
                let buffer = &self.accumulator.groups[key];
                let (dates, optional_values) = buffer.sorted_series();
                let values = fill_nulls_interpolate(&optional_values);

                let result = if values.iter().any(|v| v.is_nan()) {
                    Err(ForecastError::InvalidInput(
                        "group has no observed values".to_string(),
                    ))
                } else {
                    detect_changepoints_bocpd(&values, self.hazard_lambda, true)
                };

                match result {
                    Ok(result) => {
                        for (i, &date) in dates.iter().enumerate() {
                            let mut row = vec![
                                buffer.group_value.clone(),
                                ScalarValue::from_date_value(date, self.bound.axis),
                                optional_values[i]
                                    .map(ScalarValue::Double)
                                    .unwrap_or(ScalarValue::Null),
                                ScalarValue::Boolean(result.is_changepoint[i]),
                                double(result.changepoint_probability[i]),
                            ];
                            if has_error_col {
                                row.push(ScalarValue::Null);
                            }
                            queue.push(row);
                        }
                    }
                    Err(err) => match self.error_policy {
                        ErrorPolicy::Abort => return Err(err),
                        ErrorPolicy::EmitMessage => {
                            log::warn!("changepoint detection failed for group '{}': {}", key, err);
                            let mut row = vec![
                                buffer.group_value.clone(),
                                ScalarValue::Null,
                                ScalarValue::Null,
                                ScalarValue::Null,
                                ScalarValue::Null,
                            ];
                            row.push(ScalarValue::Varchar(err.to_string()));
                            queue.push(row);
                        }
                    },
                }
            }
            self.queue = Some(queue);
        }

        Ok(self.queue.as_mut().expect("initialized above").drain())
    }
}

/// Per-row MSTL components: trend, one seasonal column per declared
/// period, and remainder.
pub struct MstlOperator {
    bound: BoundColumns,
    periods: Vec<usize>,
    output_schema: Schema,
    accumulator: GroupAccumulator,
    queue: Option<DrainQueue>,
}

impl MstlOperator {
    pub fn bind(
        schema: Schema,
        group_col: &str,
        date_col: &str,
        value_col: &str,
        periods: Vec<usize>,
    ) -> Result<Self> {
        let bound = bind_columns(&schema, group_col, date_col, value_col)?;
        if periods.is_empty() {
            return Err(ForecastError::InvalidInput(
                "at least one seasonal period is required".to_string(),
            ));
        }
        if let Some(bad) = periods.iter().find(|&&p| p < 2) {
            return Err(ForecastError::InvalidInput(format!(
                "seasonal periods must be >= 2, got {}",
                bad
            )));
        }

        let group_column = schema.columns[bound.group_idx].clone();
        let date_column = schema.columns[bound.date_idx].clone();
        let value_column = schema.columns[bound.value_idx].clone();
        let mut columns = vec![
            group_column,
            date_column,
            value_column,
            Column::new("trend", DataType::Double),
        ];
        for &p in &periods {
            columns.push(Column::new(format!("seasonal_{}", p), DataType::Double));
        }
        columns.push(Column::new("remainder", DataType::Double));

        Ok(Self {
            bound,
            periods,
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
            let periods_i32: Vec<i32> = self.periods.iter().map(|&p| p as i32).collect();

            for key in &self.accumulator.order {
                let buffer = &self.accumulator.groups[key];
                let (dates, optional_values) = buffer.sorted_series();
                let values = fill_nulls_interpolate(&optional_values);
                if values.iter().any(|v| v.is_nan()) {
                    return Err(ForecastError::InvalidInput(
                        "group has no observed values".to_string(),
                    ));
                }

                let decomposition = mstl_decompose(&values, &periods_i32)?;
                // Map each declared period to the matching extracted component.
                let component_for: Vec<Option<usize>> = self
                    .periods
                    .iter()
                    .map(|&p| {
                        decomposition
                            .periods
                            .iter()
                            .position(|&used| used as usize == p)
                    })
                    .collect();

                for (i, &date) in dates.iter().enumerate() {
                    let mut row = vec![
                        buffer.group_value.clone(),
                        ScalarValue::from_date_value(date, self.bound.axis),
                        optional_values[i]
                            .map(ScalarValue::Double)
                            .unwrap_or(ScalarValue::Null),
                        double(decomposition.trend[i]),
                    ];
                    for component in &component_for {
                        match component {
                            Some(c) => row.push(double(decomposition.seasonal[*c][i])),
                            None => row.push(ScalarValue::Null),
                        }
                    }
                    row.push(double(decomposition.remainder[i]));
                    queue.push(row);
                }
            }
            self.queue = Some(queue);
        }

        Ok(self.queue.as_mut().expect("initialized above").drain())
    }
}

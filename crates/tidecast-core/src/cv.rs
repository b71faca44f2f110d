//! Time-series cross-validation: fold generation and per-fold evaluation.

use crate::error::{ForecastError, Result};
use crate::metrics;
use crate::models::Forecaster;
use crate::series::TimeSeries;

/// Training-window strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CvStrategy {
    /// Train from the start of the series up to the fold boundary.
    #[default]
    Expanding,
    /// Train on a fixed-size trailing window.
    Rolling,
}

/// Cross-validation fold descriptor.
#[derive(Debug, Clone)]
pub struct FoldSpec {
    pub horizon: usize,
    pub initial_window: usize,
    pub step: usize,
    pub max_window: Option<usize>,
    pub strategy: CvStrategy,
}

impl FoldSpec {
    pub fn expanding(horizon: usize, initial_window: usize, step: usize) -> Self {
        Self {
            horizon,
            initial_window,
            step,
            max_window: None,
            strategy: CvStrategy::Expanding,
        }
    }

    pub fn rolling(horizon: usize, initial_window: usize, step: usize, max_window: Option<usize>) -> Self {
        Self {
            horizon,
            initial_window,
            step,
            max_window,
            strategy: CvStrategy::Rolling,
        }
    }

    fn validate(&self) -> Result<()> {
        if self.horizon == 0 || self.initial_window == 0 || self.step == 0 {
            return Err(ForecastError::InvalidInput(
                "horizon, initial_window and step must all be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// Generate `(train_start, train_end, test_start, test_end)` quadruples,
/// strictly increasing in `test_start`.
pub fn generate_folds(n_samples: usize, spec: &FoldSpec) -> Result<Vec<(usize, usize, usize, usize)>> {
    spec.validate()?;

    if n_samples < spec.initial_window + spec.horizon {
        return Err(ForecastError::InvalidInput(format!(
            "series too short for cross-validation: need at least initial_window + horizon = {} samples, got {}",
            spec.initial_window + spec.horizon,
            n_samples
        )));
    }

    let mut folds = Vec::new();
    let mut pos = spec.initial_window;

    while pos + spec.horizon <= n_samples {
        let (train_start, train_end) = match spec.strategy {
            CvStrategy::Expanding => (0, pos),
            CvStrategy::Rolling => {
                let window = spec.max_window.unwrap_or(spec.initial_window).min(pos);
                (pos - window, pos)
            }
        };
        folds.push((train_start, train_end, pos, pos + spec.horizon));
        pos += spec.step;
    }

    Ok(folds)
}

/// Outcome of one fold. Failed folds carry NaN point metrics and empty
/// forecasts.
#[derive(Debug, Clone)]
pub struct CvFold {
    pub fold_id: usize,
    pub train_start: usize,
    pub train_end: usize,
    pub test_start: usize,
    pub test_end: usize,
    pub forecasts: Vec<f64>,
    pub actuals: Vec<f64>,
    pub mae: f64,
    pub mse: f64,
    pub rmse: f64,
    pub mape: Option<f64>,
    pub smape: Option<f64>,
}

/// Cross-validation results: per-fold records plus metrics aggregated over
/// the concatenation of all successful folds.
#[derive(Debug, Clone, Default)]
pub struct CvResults {
    pub folds: Vec<CvFold>,
    pub total_forecasts: usize,
    pub mae: f64,
    pub mse: f64,
    pub rmse: f64,
    pub mape: Option<f64>,
    pub smape: Option<f64>,
}

impl CvResults {
    fn aggregate(&mut self) {
        let mut all_forecasts = Vec::new();
        let mut all_actuals = Vec::new();

        for fold in &self.folds {
            if fold.mae.is_nan() {
                continue;
            }
            all_forecasts.extend_from_slice(&fold.forecasts);
            all_actuals.extend_from_slice(&fold.actuals);
        }

        self.total_forecasts = all_forecasts.len();
        if all_forecasts.is_empty() {
            self.mae = f64::NAN;
            self.mse = f64::NAN;
            self.rmse = f64::NAN;
            self.mape = None;
            self.smape = None;
            return;
        }

        self.mae = metrics::mae(&all_actuals, &all_forecasts).unwrap_or(f64::NAN);
        self.mse = metrics::mse(&all_actuals, &all_forecasts).unwrap_or(f64::NAN);
        self.rmse = metrics::rmse(&all_actuals, &all_forecasts).unwrap_or(f64::NAN);
        self.mape = metrics::mape(&all_actuals, &all_forecasts).ok().flatten();
        self.smape = metrics::smape(&all_actuals, &all_forecasts).ok().flatten();
    }
}

/// Evaluate a model family over the fold plan. `model_factory` must return
/// a fresh unfitted model per call; a fold whose fit or predict fails is
/// recorded with NaN metrics and excluded from aggregation.
pub fn evaluate<F>(ts: &TimeSeries, mut model_factory: F, spec: &FoldSpec) -> Result<CvResults>
where
    F: FnMut() -> Box<dyn Forecaster>,
{
    let values = ts.values();
    let fold_indices = generate_folds(ts.len(), spec)?;

    let mut results = CvResults::default();
    results.folds.reserve(fold_indices.len());

    for (fold_id, (train_start, train_end, test_start, test_end)) in
        fold_indices.into_iter().enumerate()
    {
        let mut fold = CvFold {
            fold_id,
            train_start,
            train_end,
            test_start,
            test_end,
            forecasts: Vec::new(),
            actuals: Vec::new(),
            mae: f64::NAN,
            mse: f64::NAN,
            rmse: f64::NAN,
            mape: None,
            smape: None,
        };

        let outcome = (|| -> Result<()> {
            let train = ts.slice(train_start, train_end)?;
            let mut model = model_factory();
            model.fit(&train)?;

            let horizon = test_end - test_start;
            let forecast = model.predict(horizon)?;

            fold.forecasts = forecast.point;
            fold.actuals = values[test_start..test_end].to_vec();

            fold.mae = metrics::mae(&fold.actuals, &fold.forecasts)?;
            fold.mse = metrics::mse(&fold.actuals, &fold.forecasts)?;
            fold.rmse = metrics::rmse(&fold.actuals, &fold.forecasts)?;
            fold.mape = metrics::mape(&fold.actuals, &fold.forecasts)?;
            fold.smape = metrics::smape(&fold.actuals, &fold.forecasts)?;
            Ok(())
        })();

        if let Err(err) = outcome {
            log::debug!("cv fold {} failed: {}", fold_id, err);
            fold.forecasts.clear();
            fold.actuals.clear();
            fold.mae = f64::NAN;
            fold.mse = f64::NAN;
            fold.rmse = f64::NAN;
            fold.mape = None;
            fold.smape = None;
        }

        results.folds.push(fold);
    }

    results.aggregate();
    Ok(results)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::baseline::Naive;
    use crate::series::TimeSeriesBuilder;
    use approx::assert_relative_eq;

    fn series(n: usize) -> TimeSeries {
        TimeSeriesBuilder::new()
            .values((1..=n).map(|i| i as f64).collect())
            .build()
            .unwrap()
    }

    #[test]
    fn test_expanding_fold_plan() {
        let spec = FoldSpec::expanding(5, 10, 5);
        let folds = generate_folds(30, &spec).unwrap();
        assert_eq!(
            folds,
            vec![
                (0, 10, 10, 15),
                (0, 15, 15, 20),
                (0, 20, 20, 25),
                (0, 25, 25, 30),
            ]
        );
    }

    #[test]
    fn test_rolling_fold_plan_caps_window() {
        let spec = FoldSpec::rolling(5, 10, 5, Some(12));
        let folds = generate_folds(30, &spec).unwrap();
        // First fold: window limited by pos = 10; later folds use 12.
        assert_eq!(folds[0], (0, 10, 10, 15));
        assert_eq!(folds[1], (3, 15, 15, 20));
        assert_eq!(folds[2], (8, 20, 20, 25));
    }

    #[test]
    fn test_folds_strictly_ordered_and_bounded() {
        let spec = FoldSpec::expanding(3, 7, 2);
        let n = 40;
        let folds = generate_folds(n, &spec).unwrap();
        assert!(!folds.is_empty());
        let mut prev_test_start = 0;
        for (i, &(train_start, train_end, test_start, test_end)) in folds.iter().enumerate() {
            assert!(train_start <= train_end);
            assert_eq!(train_end, test_start);
            assert!(test_end <= n);
            if i > 0 {
                assert!(test_start > prev_test_start);
            }
            prev_test_start = test_start;
        }
    }

    #[test]
    fn test_too_short_series_rejected() {
        let spec = FoldSpec::expanding(5, 10, 5);
        assert!(generate_folds(14, &spec).is_err());
    }

    #[test]
    fn test_evaluate_with_naive() {
        let spec = FoldSpec::expanding(5, 10, 5);
        let results = evaluate(&series(30), || Box::new(Naive::new()), &spec).unwrap();
        assert_eq!(results.folds.len(), 4);
        assert_eq!(results.total_forecasts, 20);
        // Naive on 1..n predicts the boundary value; errors are 1..=5 per fold.
        assert_relative_eq!(results.folds[0].mae, 3.0, epsilon = 1e-9);
        assert_relative_eq!(results.mae, 3.0, epsilon = 1e-9);
    }

    #[test]
    fn test_failed_fold_recorded_as_nan() {
        #[derive(Debug)]
        struct AlwaysFails;
        impl Forecaster for AlwaysFails {
            fn fit(&mut self, _ts: &TimeSeries) -> crate::error::Result<()> {
                Err(ForecastError::InsufficientData { needed: 99, got: 1 })
            }
            fn predict(&self, _horizon: usize) -> crate::error::Result<crate::models::Forecast> {
                unreachable!("fit always fails")
            }
            fn name(&self) -> &str {
                "AlwaysFails"
            }
        }

        let spec = FoldSpec::expanding(5, 10, 5);
        let results = evaluate(&series(30), || Box::new(AlwaysFails), &spec).unwrap();
        assert_eq!(results.folds.len(), 4);
        assert!(results.folds.iter().all(|f| f.mae.is_nan()));
        assert_eq!(results.total_forecasts, 0);
        assert!(results.mae.is_nan());
    }
}

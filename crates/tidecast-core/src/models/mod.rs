//! Forecaster abstraction and model catalog.

use crate::error::{ForecastError, Result};
use crate::series::TimeSeries;

pub mod baseline;
pub mod ets;
pub mod factory;
pub mod intermittent;
pub mod multiseasonal;
pub mod smoothing;
pub mod theta;
pub mod wrapper;

#[cfg(feature = "linalg")]
pub mod arima;

pub use factory::{create, supported_models, ModelParams, ParamValue};
pub use wrapper::MethodNameWrapper;

/// A forecasting model: fit on a series, predict a horizon, report a name.
pub trait Forecaster: std::fmt::Debug {
    /// Fit internal state to the series. Fails with `InsufficientData` when
    /// the series is shorter than the model minimum, or `InvalidInput` when
    /// parameters are incompatible with the data.
    fn fit(&mut self, ts: &TimeSeries) -> Result<()>;

    /// Forecast `horizon` steps ahead. Requires `horizon >= 1` and a prior
    /// successful fit.
    fn predict(&self, horizon: usize) -> Result<Forecast>;

    /// Stable model identifier.
    fn name(&self) -> &str;
}

/// Forecast result bundle. When bounds are present, all three vectors share
/// the horizon length and `lower[i] <= point[i] <= upper[i]`.
#[derive(Debug, Clone, Default)]
pub struct Forecast {
    pub point: Vec<f64>,
    pub lower: Option<Vec<f64>>,
    pub upper: Option<Vec<f64>>,
    pub fitted: Option<Vec<f64>>,
    pub residuals: Option<Vec<f64>>,
    pub model_name: String,
}

impl Forecast {
    pub fn new(point: Vec<f64>, model_name: impl Into<String>) -> Self {
        Self {
            point,
            model_name: model_name.into(),
            ..Default::default()
        }
    }

    pub fn horizon(&self) -> usize {
        self.point.len()
    }
}

/// z-multiplier for a two-sided interval at the given confidence level.
pub fn interval_z(confidence_level: f64) -> f64 {
    use statrs::distribution::{ContinuousCDF, Normal};

    let level = confidence_level.clamp(0.5, 0.9999);
    let normal = Normal::new(0.0, 1.0).expect("standard normal parameters are valid");
    normal.inverse_cdf(0.5 + level / 2.0)
}

/// Symmetric prediction bounds from the historical residual spread.
/// Bounds always bracket the point forecast.
pub fn confidence_intervals(
    point: &[f64],
    historical: &[f64],
    confidence_level: f64,
) -> (Vec<f64>, Vec<f64>) {
    let n = historical.len();
    if n == 0 {
        return (point.to_vec(), point.to_vec());
    }
    let mean = historical.iter().sum::<f64>() / n as f64;
    let variance = historical.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n as f64;
    let sigma = variance.sqrt();
    let z = interval_z(confidence_level);

    let lower = point.iter().map(|p| p - z * sigma).collect();
    let upper = point.iter().map(|p| p + z * sigma).collect();
    (lower, upper)
}

pub(crate) fn check_horizon(horizon: usize) -> Result<()> {
    if horizon == 0 {
        return Err(ForecastError::InvalidInput(
            "horizon must be at least 1".to_string(),
        ));
    }
    Ok(())
}

pub(crate) fn check_min_length(name: &str, needed: usize, got: usize) -> Result<()> {
    if got < needed {
        log::debug!("{}: {} observations below the minimum of {}", name, got, needed);
        return Err(ForecastError::InsufficientData { needed, got });
    }
    Ok(())
}

pub(crate) fn not_fitted(name: &str) -> ForecastError {
    ForecastError::NotFitted(name.to_string())
}

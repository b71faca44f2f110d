//! Theta-method family.
//!
//! The series is split into a linear long-run component and a theta line
//! that amplifies short-run curvature; the forecast recombines an
//! extrapolated trend with an SES forecast of the theta line. Seasonal
//! series are multiplicatively deseasonalized first and reseasonalized on
//! the way out.

use crate::error::{ForecastError, Result};
use crate::numeric::minimize_scalar;
use crate::series::TimeSeries;

use super::{check_horizon, check_min_length, not_fitted, Forecast, Forecaster};

#[derive(Debug)]
struct FittedTheta {
    intercept: f64,
    slope: f64,
    ses_level: f64,
    theta: f64,
    seasonal: Option<Vec<f64>>,
    n_observed: usize,
}

fn linear_fit(values: &[f64]) -> (f64, f64) {
    let n = values.len() as f64;
    let x_mean = (n - 1.0) / 2.0;
    let y_mean = values.iter().sum::<f64>() / n;

    let mut ss_xy = 0.0;
    let mut ss_xx = 0.0;
    for (i, &y) in values.iter().enumerate() {
        let dx = i as f64 - x_mean;
        ss_xy += dx * (y - y_mean);
        ss_xx += dx * dx;
    }

    let slope = if ss_xx.abs() > f64::EPSILON {
        ss_xy / ss_xx
    } else {
        0.0
    };
    (y_mean - slope * x_mean, slope)
}

/// Multiplicative seasonal indices by position averages, normalized to mean 1.
fn seasonal_indices(values: &[f64], period: usize) -> Vec<f64> {
    let mut sums = vec![0.0; period];
    let mut counts = vec![0usize; period];
    for (i, &v) in values.iter().enumerate() {
        sums[i % period] += v;
        counts[i % period] += 1;
    }
    let overall = values.iter().sum::<f64>() / values.len() as f64;
    let mut indices: Vec<f64> = sums
        .iter()
        .zip(counts.iter())
        .map(|(s, c)| {
            if *c > 0 && overall.abs() > f64::EPSILON {
                (s / *c as f64) / overall
            } else {
                1.0
            }
        })
        .collect();
    let mean_idx = indices.iter().sum::<f64>() / period as f64;
    if mean_idx.abs() > f64::EPSILON {
        for idx in indices.iter_mut() {
            *idx /= mean_idx;
        }
    }
    indices
}

fn ses_final_level(values: &[f64], alpha: f64) -> f64 {
    let mut level = values[0];
    for &v in &values[1..] {
        level = alpha * v + (1.0 - alpha) * level;
    }
    level
}

/// One-step SSE of the recombined theta forecast, for the tuned variants.
fn theta_sse(values: &[f64], theta: f64, alpha: f64) -> f64 {
    let (intercept, slope) = linear_fit(values);
    let theta_line: Vec<f64> = values
        .iter()
        .enumerate()
        .map(|(i, &y)| theta * y + (1.0 - theta) * (intercept + slope * i as f64))
        .collect();

    let mut level = theta_line[0];
    let mut sse = 0.0;
    for (t, &z) in theta_line.iter().enumerate().skip(1) {
        let trend_part = intercept + slope * t as f64;
        let prediction = (1.0 - 1.0 / theta) * trend_part + (1.0 / theta) * level;
        let err = values[t] - prediction;
        sse += err * err;
        level = alpha * z + (1.0 - alpha) * level;
    }
    sse
}

fn fit_theta_state(
    values: &[f64],
    season_length: usize,
    theta: f64,
    alpha: f64,
) -> FittedTheta {
    let n = values.len();

    // Deseasonalize when the period is meaningful and covered twice.
    let (work, seasonal) = if season_length > 1 && n >= 2 * season_length {
        let indices = seasonal_indices(values, season_length);
        let deseasonalized: Vec<f64> = values
            .iter()
            .enumerate()
            .map(|(i, &v)| v / indices[i % season_length].max(0.001))
            .collect();
        (deseasonalized, Some(indices))
    } else {
        (values.to_vec(), None)
    };

    let (intercept, slope) = linear_fit(&work);
    let theta_line: Vec<f64> = work
        .iter()
        .enumerate()
        .map(|(i, &y)| theta * y + (1.0 - theta) * (intercept + slope * i as f64))
        .collect();
    let ses_level = ses_final_level(&theta_line, alpha);

    FittedTheta {
        intercept,
        slope,
        ses_level,
        theta,
        seasonal,
        n_observed: n,
    }
}

fn predict_theta(state: &FittedTheta, season_length: usize, horizon: usize, name: &str) -> Forecast {
    let point: Vec<f64> = (1..=horizon)
        .map(|h| {
            let t = (state.n_observed + h - 1) as f64;
            let trend_part = state.intercept + state.slope * t;
            let combined =
                (1.0 - 1.0 / state.theta) * trend_part + (1.0 / state.theta) * state.ses_level;
            match &state.seasonal {
                Some(indices) => {
                    combined * indices[(state.n_observed + h - 1) % season_length]
                }
                None => combined,
            }
        })
        .collect();
    Forecast::new(point, name)
}

fn validate_theta_params(season_length: usize, theta: f64) -> Result<()> {
    if season_length == 0 {
        return Err(ForecastError::InvalidInput(
            "seasonal_period must be positive".to_string(),
        ));
    }
    if theta <= 0.0 {
        return Err(ForecastError::InvalidInput(format!(
            "theta must be positive, got {}",
            theta
        )));
    }
    Ok(())
}

const DEFAULT_ALPHA: f64 = 0.3;
const MIN_THETA_OBS: usize = 3;

/// Standard theta method with a fixed theta parameter.
#[derive(Debug)]
pub struct Theta {
    season_length: usize,
    theta: f64,
    state: Option<FittedTheta>,
}

impl Theta {
    pub fn new(season_length: usize, theta: f64) -> Result<Self> {
        validate_theta_params(season_length, theta)?;
        Ok(Self {
            season_length,
            theta,
            state: None,
        })
    }
}

impl Forecaster for Theta {
    fn fit(&mut self, ts: &TimeSeries) -> Result<()> {
        check_min_length(self.name(), MIN_THETA_OBS, ts.len())?;
        self.state = Some(fit_theta_state(
            ts.values(),
            self.season_length,
            self.theta,
            DEFAULT_ALPHA,
        ));
        Ok(())
    }

    fn predict(&self, horizon: usize) -> Result<Forecast> {
        check_horizon(horizon)?;
        let state = self.state.as_ref().ok_or_else(|| not_fitted(self.name()))?;
        Ok(predict_theta(state, self.season_length, horizon, self.name()))
    }

    fn name(&self) -> &str {
        "Theta"
    }
}

/// Theta with the theta parameter tuned against in-sample one-step SSE.
#[derive(Debug)]
pub struct OptimizedTheta {
    season_length: usize,
    state: Option<FittedTheta>,
}

impl OptimizedTheta {
    pub fn new(season_length: usize) -> Result<Self> {
        validate_theta_params(season_length, 2.0)?;
        Ok(Self {
            season_length,
            state: None,
        })
    }
}

impl Forecaster for OptimizedTheta {
    fn fit(&mut self, ts: &TimeSeries) -> Result<()> {
        check_min_length(self.name(), MIN_THETA_OBS, ts.len())?;
        let values = ts.values();
        let theta = minimize_scalar(|t| theta_sse(values, t, DEFAULT_ALPHA), 1.0 + 1e-3, 3.0, 1e-4);
        self.state = Some(fit_theta_state(values, self.season_length, theta, DEFAULT_ALPHA));
        Ok(())
    }

    fn predict(&self, horizon: usize) -> Result<Forecast> {
        check_horizon(horizon)?;
        let state = self.state.as_ref().ok_or_else(|| not_fitted(self.name()))?;
        Ok(predict_theta(state, self.season_length, horizon, self.name()))
    }

    fn name(&self) -> &str {
        "OptimizedTheta"
    }
}

/// Theta with the short-run smoothing constant tuned per series.
#[derive(Debug)]
pub struct DynamicTheta {
    season_length: usize,
    theta: f64,
    state: Option<FittedTheta>,
}

impl DynamicTheta {
    pub fn new(season_length: usize, theta: f64) -> Result<Self> {
        validate_theta_params(season_length, theta)?;
        Ok(Self {
            season_length,
            theta,
            state: None,
        })
    }
}

impl Forecaster for DynamicTheta {
    fn fit(&mut self, ts: &TimeSeries) -> Result<()> {
        check_min_length(self.name(), MIN_THETA_OBS, ts.len())?;
        let values = ts.values();
        let theta = self.theta;
        let alpha = minimize_scalar(|a| theta_sse(values, theta, a), 0.01, 0.99, 1e-4);
        self.state = Some(fit_theta_state(values, self.season_length, theta, alpha));
        Ok(())
    }

    fn predict(&self, horizon: usize) -> Result<Forecast> {
        check_horizon(horizon)?;
        let state = self.state.as_ref().ok_or_else(|| not_fitted(self.name()))?;
        Ok(predict_theta(state, self.season_length, horizon, self.name()))
    }

    fn name(&self) -> &str {
        "DynamicTheta"
    }
}

/// Theta with both theta and the smoothing constant tuned per series.
#[derive(Debug)]
pub struct DynamicOptimizedTheta {
    season_length: usize,
    state: Option<FittedTheta>,
}

impl DynamicOptimizedTheta {
    pub fn new(season_length: usize) -> Result<Self> {
        validate_theta_params(season_length, 2.0)?;
        Ok(Self {
            season_length,
            state: None,
        })
    }
}

impl Forecaster for DynamicOptimizedTheta {
    fn fit(&mut self, ts: &TimeSeries) -> Result<()> {
        check_min_length(self.name(), MIN_THETA_OBS, ts.len())?;
        let values = ts.values();
        let theta = minimize_scalar(|t| theta_sse(values, t, DEFAULT_ALPHA), 1.0 + 1e-3, 3.0, 1e-4);
        let alpha = minimize_scalar(|a| theta_sse(values, theta, a), 0.01, 0.99, 1e-4);
        self.state = Some(fit_theta_state(values, self.season_length, theta, alpha));
        Ok(())
    }

    fn predict(&self, horizon: usize) -> Result<Forecast> {
        check_horizon(horizon)?;
        let state = self.state.as_ref().ok_or_else(|| not_fitted(self.name()))?;
        Ok(predict_theta(state, self.season_length, horizon, self.name()))
    }

    fn name(&self) -> &str {
        "DynamicOptimizedTheta"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::series::TimeSeriesBuilder;
    use approx::assert_relative_eq;

    fn series(values: Vec<f64>) -> TimeSeries {
        TimeSeriesBuilder::new().values(values).build().unwrap()
    }

    #[test]
    fn test_theta_follows_linear_trend() {
        let values: Vec<f64> = (0..40).map(|i| 3.0 + 2.0 * i as f64).collect();
        let mut model = Theta::new(1, 2.0).unwrap();
        model.fit(&series(values)).unwrap();
        let forecast = model.predict(3).unwrap();
        // A clean line should keep extending; the SES half pulls slightly back.
        assert!(forecast.point[0] > 78.0 && forecast.point[0] < 82.0);
        assert!(forecast.point[2] > forecast.point[0]);
    }

    #[test]
    fn test_theta_rejects_nonpositive_theta() {
        assert!(Theta::new(1, 0.0).is_err());
        assert!(Theta::new(1, -2.0).is_err());
    }

    #[test]
    fn test_theta_seasonal_reapplies_indices() {
        let pattern = [0.5, 1.0, 1.5, 1.0];
        let values: Vec<f64> = (0..48).map(|i| 100.0 * pattern[i % 4]).collect();
        let mut model = Theta::new(4, 2.0).unwrap();
        model.fit(&series(values)).unwrap();
        let forecast = model.predict(4).unwrap();
        // Positions should retain their relative seasonal ordering.
        assert!(forecast.point[2] > forecast.point[0]);
        assert_relative_eq!(forecast.point[1], forecast.point[3], epsilon = 5.0);
    }

    #[test]
    fn test_optimized_theta_fits_and_predicts() {
        let values: Vec<f64> = (0..30)
            .map(|i| 10.0 + 0.5 * i as f64 + ((i * 13 % 5) as f64 - 2.0) * 0.2)
            .collect();
        let mut model = DynamicOptimizedTheta::new(1).unwrap();
        model.fit(&series(values)).unwrap();
        let forecast = model.predict(5).unwrap();
        assert_eq!(forecast.point.len(), 5);
        assert_eq!(forecast.model_name, "DynamicOptimizedTheta");
    }

    #[test]
    fn test_theta_too_short() {
        let mut model = Theta::new(1, 2.0).unwrap();
        assert!(model.fit(&series(vec![1.0, 2.0])).is_err());
    }
}

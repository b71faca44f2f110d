//! Exponential smoothing models.

use crate::error::{ForecastError, Result};
use crate::numeric::minimize_scalar;
use crate::series::TimeSeries;

use super::{check_horizon, check_min_length, not_fitted, Forecast, Forecaster};

fn validate_alpha(alpha: f64, model: &str) -> Result<()> {
    if !(alpha > 0.0 && alpha <= 1.0) {
        return Err(ForecastError::InvalidInput(format!(
            "{} alpha must be in (0, 1], got {}",
            model, alpha
        )));
    }
    Ok(())
}

fn validate_unit(value: f64, key: &str, model: &str) -> Result<()> {
    if !(0.0..=1.0).contains(&value) {
        return Err(ForecastError::InvalidInput(format!(
            "{} {} must be in [0, 1], got {}",
            model, key, value
        )));
    }
    Ok(())
}

/// One-step-ahead SSE of an SES recursion, used by the optimized variant.
fn ses_sse(values: &[f64], alpha: f64) -> f64 {
    let mut level = values[0];
    let mut sse = 0.0;
    for &v in &values[1..] {
        let err = v - level;
        sse += err * err;
        level = alpha * v + (1.0 - alpha) * level;
    }
    sse
}

/// Simple exponential smoothing with a fixed smoothing constant.
#[derive(Debug)]
pub struct Ses {
    alpha: f64,
    fitted: Option<FittedSmoothing>,
}

#[derive(Debug)]
struct FittedSmoothing {
    level: f64,
    trend: f64,
    fitted: Vec<f64>,
    residuals: Vec<f64>,
}

impl Ses {
    pub fn new(alpha: f64) -> Result<Self> {
        validate_alpha(alpha, "SES")?;
        Ok(Self {
            alpha,
            fitted: None,
        })
    }
}

impl Forecaster for Ses {
    fn fit(&mut self, ts: &TimeSeries) -> Result<()> {
        check_min_length(self.name(), 1, ts.len())?;
        let values = ts.values();

        let mut level = values[0];
        let mut fitted = Vec::with_capacity(values.len());
        let mut residuals = Vec::with_capacity(values.len());
        for &v in values {
            fitted.push(level);
            residuals.push(v - level);
            level = self.alpha * v + (1.0 - self.alpha) * level;
        }

        self.fitted = Some(FittedSmoothing {
            level,
            trend: 0.0,
            fitted,
            residuals,
        });
        Ok(())
    }

    fn predict(&self, horizon: usize) -> Result<Forecast> {
        check_horizon(horizon)?;
        let state = self.fitted.as_ref().ok_or_else(|| not_fitted(self.name()))?;
        let mut forecast = Forecast::new(vec![state.level; horizon], self.name());
        forecast.fitted = Some(state.fitted.clone());
        forecast.residuals = Some(state.residuals.clone());
        Ok(forecast)
    }

    fn name(&self) -> &str {
        "SES"
    }
}

/// SES with the smoothing constant tuned to minimize one-step SSE.
#[derive(Debug, Default)]
pub struct SesOptimized {
    inner: Option<Ses>,
}

impl SesOptimized {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Forecaster for SesOptimized {
    fn fit(&mut self, ts: &TimeSeries) -> Result<()> {
        check_min_length(self.name(), 3, ts.len())?;
        let values = ts.values();
        let alpha = minimize_scalar(|a| ses_sse(values, a), 0.01, 0.99, 1e-4);
        let mut inner = Ses::new(alpha)?;
        inner.fit(ts)?;
        self.inner = Some(inner);
        Ok(())
    }

    fn predict(&self, horizon: usize) -> Result<Forecast> {
        let inner = self.inner.as_ref().ok_or_else(|| not_fitted(self.name()))?;
        let mut forecast = inner.predict(horizon)?;
        forecast.model_name = self.name().to_string();
        Ok(forecast)
    }

    fn name(&self) -> &str {
        "SESOptimized"
    }
}

/// Holt's linear trend method.
#[derive(Debug)]
pub struct Holt {
    alpha: f64,
    beta: f64,
    fitted: Option<FittedSmoothing>,
}

impl Holt {
    pub fn new(alpha: f64, beta: f64) -> Result<Self> {
        validate_alpha(alpha, "Holt")?;
        validate_unit(beta, "beta", "Holt")?;
        Ok(Self {
            alpha,
            beta,
            fitted: None,
        })
    }
}

impl Forecaster for Holt {
    fn fit(&mut self, ts: &TimeSeries) -> Result<()> {
        check_min_length(self.name(), 2, ts.len())?;
        let values = ts.values();

        let mut level = values[0];
        let mut trend = values[1] - values[0];
        let mut fitted = Vec::with_capacity(values.len());
        let mut residuals = Vec::with_capacity(values.len());

        for &v in values {
            let one_step = level + trend;
            fitted.push(one_step);
            residuals.push(v - one_step);

            let prev_level = level;
            level = self.alpha * v + (1.0 - self.alpha) * (level + trend);
            trend = self.beta * (level - prev_level) + (1.0 - self.beta) * trend;
        }

        self.fitted = Some(FittedSmoothing {
            level,
            trend,
            fitted,
            residuals,
        });
        Ok(())
    }

    fn predict(&self, horizon: usize) -> Result<Forecast> {
        check_horizon(horizon)?;
        let state = self.fitted.as_ref().ok_or_else(|| not_fitted(self.name()))?;
        let point = (1..=horizon)
            .map(|h| state.level + state.trend * h as f64)
            .collect();
        let mut forecast = Forecast::new(point, self.name());
        forecast.fitted = Some(state.fitted.clone());
        forecast.residuals = Some(state.residuals.clone());
        Ok(forecast)
    }

    fn name(&self) -> &str {
        "Holt"
    }
}

#[derive(Debug)]
struct FittedSeasonal {
    level: f64,
    trend: f64,
    seasonal: Vec<f64>,
    n_observed: usize,
    fitted: Vec<f64>,
    residuals: Vec<f64>,
}

/// Holt-Winters triple exponential smoothing, additive or multiplicative
/// seasonality.
#[derive(Debug)]
pub struct HoltWinters {
    season_length: usize,
    multiplicative: bool,
    alpha: f64,
    beta: f64,
    gamma: f64,
    fitted: Option<FittedSeasonal>,
}

impl HoltWinters {
    pub fn new(
        season_length: usize,
        multiplicative: bool,
        alpha: f64,
        beta: f64,
        gamma: f64,
    ) -> Result<Self> {
        if season_length <= 1 {
            return Err(ForecastError::InvalidInput(format!(
                "HoltWinters seasonal_period must be > 1, got {}",
                season_length
            )));
        }
        validate_alpha(alpha, "HoltWinters")?;
        validate_unit(beta, "beta", "HoltWinters")?;
        validate_unit(gamma, "gamma", "HoltWinters")?;
        Ok(Self {
            season_length,
            multiplicative,
            alpha,
            beta,
            gamma,
            fitted: None,
        })
    }

    fn one_step(&self, level: f64, trend: f64, seasonal: f64) -> f64 {
        if self.multiplicative {
            (level + trend) * seasonal
        } else {
            level + trend + seasonal
        }
    }
}

impl Forecaster for HoltWinters {
    fn fit(&mut self, ts: &TimeSeries) -> Result<()> {
        let p = self.season_length;
        check_min_length(self.name(), 2 * p, ts.len())?;
        let values = ts.values();

        // Initialize from the first two seasons.
        let first_mean: f64 = values[..p].iter().sum::<f64>() / p as f64;
        let second_mean: f64 = values[p..2 * p].iter().sum::<f64>() / p as f64;
        let mut level = first_mean;
        let mut trend = (second_mean - first_mean) / p as f64;
        let mut seasonal: Vec<f64> = if self.multiplicative {
            values[..p].iter().map(|v| v / first_mean.max(0.001)).collect()
        } else {
            values[..p].iter().map(|v| v - first_mean).collect()
        };

        let mut fitted = Vec::with_capacity(values.len());
        let mut residuals = Vec::with_capacity(values.len());

        for (i, &v) in values.iter().enumerate() {
            let s_idx = i % p;
            let one_step = self.one_step(level, trend, seasonal[s_idx]);
            fitted.push(one_step);
            residuals.push(v - one_step);

            let prev_level = level;
            if self.multiplicative {
                level = self.alpha * (v / seasonal[s_idx].max(0.001))
                    + (1.0 - self.alpha) * (level + trend);
                trend = self.beta * (level - prev_level) + (1.0 - self.beta) * trend;
                seasonal[s_idx] =
                    self.gamma * (v / level.max(0.001)) + (1.0 - self.gamma) * seasonal[s_idx];
            } else {
                level = self.alpha * (v - seasonal[s_idx]) + (1.0 - self.alpha) * (level + trend);
                trend = self.beta * (level - prev_level) + (1.0 - self.beta) * trend;
                seasonal[s_idx] =
                    self.gamma * (v - level) + (1.0 - self.gamma) * seasonal[s_idx];
            }
        }

        self.fitted = Some(FittedSeasonal {
            level,
            trend,
            seasonal,
            n_observed: values.len(),
            fitted,
            residuals,
        });
        Ok(())
    }

    fn predict(&self, horizon: usize) -> Result<Forecast> {
        check_horizon(horizon)?;
        let state = self.fitted.as_ref().ok_or_else(|| not_fitted(self.name()))?;
        let p = self.season_length;

        let point = (1..=horizon)
            .map(|h| {
                let seasonal = state.seasonal[(state.n_observed + h - 1) % p];
                if self.multiplicative {
                    (state.level + state.trend * h as f64) * seasonal
                } else {
                    state.level + state.trend * h as f64 + seasonal
                }
            })
            .collect();

        let mut forecast = Forecast::new(point, self.name());
        forecast.fitted = Some(state.fitted.clone());
        forecast.residuals = Some(state.residuals.clone());
        Ok(forecast)
    }

    fn name(&self) -> &str {
        "HoltWinters"
    }
}

/// Seasonal exponential smoothing: level plus multiplicative seasonal
/// indices, no trend.
#[derive(Debug)]
pub struct SeasonalEs {
    season_length: usize,
    alpha: f64,
    gamma: f64,
    fitted: Option<FittedSeasonal>,
}

impl SeasonalEs {
    pub fn new(season_length: usize, alpha: f64, gamma: f64) -> Result<Self> {
        if season_length <= 1 {
            return Err(ForecastError::InvalidInput(format!(
                "SeasonalES seasonal_period must be > 1, got {}",
                season_length
            )));
        }
        validate_alpha(alpha, "SeasonalES")?;
        validate_unit(gamma, "gamma", "SeasonalES")?;
        Ok(Self {
            season_length,
            alpha,
            gamma,
            fitted: None,
        })
    }

    fn fit_with(&mut self, ts: &TimeSeries, name: &str) -> Result<()> {
        let p = self.season_length;
        check_min_length(name, 2 * p, ts.len())?;
        let values = ts.values();

        let initial_level: f64 = values[..p].iter().sum::<f64>() / p as f64;
        let mut level = initial_level;
        let mut seasonal: Vec<f64> = values[..p]
            .iter()
            .map(|v| v / initial_level.max(0.001))
            .collect();

        let mut fitted = Vec::with_capacity(values.len());
        let mut residuals = Vec::with_capacity(values.len());

        for (i, &v) in values.iter().enumerate() {
            let s_idx = i % p;
            let one_step = level * seasonal[s_idx];
            fitted.push(one_step);
            residuals.push(v - one_step);

            level = self.alpha * (v / seasonal[s_idx].max(0.001)) + (1.0 - self.alpha) * level;
            seasonal[s_idx] =
                self.gamma * (v / level.max(0.001)) + (1.0 - self.gamma) * seasonal[s_idx];
        }

        self.fitted = Some(FittedSeasonal {
            level,
            trend: 0.0,
            seasonal,
            n_observed: values.len(),
            fitted,
            residuals,
        });
        Ok(())
    }

    /// One-step SSE for a given alpha, used by the optimized variant.
    fn sse_for_alpha(values: &[f64], p: usize, alpha: f64, gamma: f64) -> f64 {
        let initial_level: f64 = values[..p].iter().sum::<f64>() / p as f64;
        let mut level = initial_level;
        let mut seasonal: Vec<f64> = values[..p]
            .iter()
            .map(|v| v / initial_level.max(0.001))
            .collect();
        let mut sse = 0.0;
        for (i, &v) in values.iter().enumerate() {
            let s_idx = i % p;
            let err = v - level * seasonal[s_idx];
            sse += err * err;
            level = alpha * (v / seasonal[s_idx].max(0.001)) + (1.0 - alpha) * level;
            seasonal[s_idx] = gamma * (v / level.max(0.001)) + (1.0 - gamma) * seasonal[s_idx];
        }
        sse
    }
}

impl Forecaster for SeasonalEs {
    fn fit(&mut self, ts: &TimeSeries) -> Result<()> {
        self.fit_with(ts, "SeasonalES")
    }

    fn predict(&self, horizon: usize) -> Result<Forecast> {
        check_horizon(horizon)?;
        let state = self.fitted.as_ref().ok_or_else(|| not_fitted(self.name()))?;
        let p = self.season_length;
        let point = (1..=horizon)
            .map(|h| state.level * state.seasonal[(state.n_observed + h - 1) % p])
            .collect();
        let mut forecast = Forecast::new(point, self.name());
        forecast.fitted = Some(state.fitted.clone());
        forecast.residuals = Some(state.residuals.clone());
        Ok(forecast)
    }

    fn name(&self) -> &str {
        "SeasonalES"
    }
}

/// SeasonalES with alpha tuned to minimize one-step SSE.
#[derive(Debug)]
pub struct SeasonalEsOptimized {
    season_length: usize,
    inner: Option<SeasonalEs>,
}

impl SeasonalEsOptimized {
    pub fn new(season_length: usize) -> Result<Self> {
        if season_length <= 1 {
            return Err(ForecastError::InvalidInput(format!(
                "SeasonalESOptimized seasonal_period must be > 1, got {}",
                season_length
            )));
        }
        Ok(Self {
            season_length,
            inner: None,
        })
    }
}

impl Forecaster for SeasonalEsOptimized {
    fn fit(&mut self, ts: &TimeSeries) -> Result<()> {
        let p = self.season_length;
        check_min_length(self.name(), 2 * p, ts.len())?;
        let values = ts.values();
        let gamma = 0.1;
        let alpha = minimize_scalar(
            |a| SeasonalEs::sse_for_alpha(values, p, a, gamma),
            0.01,
            0.99,
            1e-4,
        );
        let mut inner = SeasonalEs::new(p, alpha, gamma)?;
        inner.fit_with(ts, self.name())?;
        self.inner = Some(inner);
        Ok(())
    }

    fn predict(&self, horizon: usize) -> Result<Forecast> {
        let inner = self.inner.as_ref().ok_or_else(|| not_fitted(self.name()))?;
        let mut forecast = inner.predict(horizon)?;
        forecast.model_name = self.name().to_string();
        Ok(forecast)
    }

    fn name(&self) -> &str {
        "SeasonalESOptimized"
    }
}

/// Average of the values at each seasonal position over a trailing window
/// of seasons.
#[derive(Debug)]
pub struct SeasonalWindowAverage {
    season_length: usize,
    window: usize,
    state: Option<(Vec<f64>, usize)>,
}

impl SeasonalWindowAverage {
    pub fn new(season_length: usize, window: usize) -> Result<Self> {
        if season_length == 0 {
            return Err(ForecastError::InvalidInput(
                "seasonal_period must be positive".to_string(),
            ));
        }
        if window == 0 {
            return Err(ForecastError::InvalidInput(
                "window must be positive".to_string(),
            ));
        }
        Ok(Self {
            season_length,
            window,
            state: None,
        })
    }
}

impl Forecaster for SeasonalWindowAverage {
    fn fit(&mut self, ts: &TimeSeries) -> Result<()> {
        let p = self.season_length;
        check_min_length(self.name(), p, ts.len())?;
        let values = ts.values();
        let n = values.len();

        // Average per seasonal position over at most `window` trailing seasons.
        let seasons_available = n / p;
        let seasons_used = self.window.min(seasons_available.max(1));
        let start = n.saturating_sub(seasons_used * p);

        let mut sums = vec![0.0; p];
        let mut counts = vec![0usize; p];
        for (i, &v) in values.iter().enumerate().skip(start) {
            let pos = i % p;
            sums[pos] += v;
            counts[pos] += 1;
        }
        let averages: Vec<f64> = sums
            .iter()
            .zip(counts.iter())
            .map(|(s, c)| if *c > 0 { s / *c as f64 } else { 0.0 })
            .collect();

        self.state = Some((averages, n));
        Ok(())
    }

    fn predict(&self, horizon: usize) -> Result<Forecast> {
        check_horizon(horizon)?;
        let (averages, n) = self.state.as_ref().ok_or_else(|| not_fitted(self.name()))?;
        let p = self.season_length;
        let point = (0..horizon).map(|h| averages[(n + h) % p]).collect();
        Ok(Forecast::new(point, self.name()))
    }

    fn name(&self) -> &str {
        "SeasonalWindowAverage"
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
    fn test_ses_flat_series_converges_to_level() {
        let mut model = Ses::new(0.3).unwrap();
        model.fit(&series(vec![5.0; 20])).unwrap();
        let forecast = model.predict(3).unwrap();
        for p in forecast.point {
            assert_relative_eq!(p, 5.0, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_ses_rejects_bad_alpha() {
        assert!(Ses::new(0.0).is_err());
        assert!(Ses::new(1.5).is_err());
    }

    #[test]
    fn test_ses_optimized_tracks_noisy_level() {
        let values: Vec<f64> = (0..50)
            .map(|i| 10.0 + 0.2 * ((i * 31 % 7) as f64 - 3.0))
            .collect();
        let mut model = SesOptimized::new();
        model.fit(&series(values)).unwrap();
        let forecast = model.predict(1).unwrap();
        assert_relative_eq!(forecast.point[0], 10.0, epsilon = 1.0);
        assert_eq!(forecast.model_name, "SESOptimized");
    }

    #[test]
    fn test_holt_follows_linear_trend() {
        let values: Vec<f64> = (1..=30).map(|i| i as f64).collect();
        let mut model = Holt::new(0.8, 0.5).unwrap();
        model.fit(&series(values)).unwrap();
        let forecast = model.predict(3).unwrap();
        assert_relative_eq!(forecast.point[0], 31.0, epsilon = 0.5);
        assert_relative_eq!(forecast.point[2], 33.0, epsilon = 0.7);
    }

    #[test]
    fn test_holt_winters_additive_cycle() {
        // Seasonal sawtooth with no trend.
        let pattern = [10.0, 20.0, 30.0, 20.0];
        let values: Vec<f64> = (0..32).map(|i| pattern[i % 4]).collect();
        let mut model = HoltWinters::new(4, false, 0.2, 0.05, 0.1).unwrap();
        model.fit(&series(values)).unwrap();
        let forecast = model.predict(4).unwrap();
        for (i, p) in forecast.point.iter().enumerate() {
            assert_relative_eq!(*p, pattern[i % 4], epsilon = 2.0);
        }
    }

    #[test]
    fn test_holt_winters_requires_two_seasons() {
        let mut model = HoltWinters::new(12, false, 0.2, 0.1, 0.1).unwrap();
        assert!(matches!(
            model.fit(&series(vec![1.0; 18])),
            Err(ForecastError::InsufficientData { .. })
        ));
    }

    #[test]
    fn test_holt_winters_rejects_period_one() {
        assert!(HoltWinters::new(1, false, 0.2, 0.1, 0.1).is_err());
    }

    #[test]
    fn test_seasonal_es_cycle() {
        let pattern = [8.0, 12.0, 16.0, 12.0];
        let values: Vec<f64> = (0..40).map(|i| pattern[i % 4]).collect();
        let mut model = SeasonalEs::new(4, 0.2, 0.1).unwrap();
        model.fit(&series(values)).unwrap();
        let forecast = model.predict(4).unwrap();
        for (i, p) in forecast.point.iter().enumerate() {
            assert_relative_eq!(*p, pattern[i % 4], epsilon = 1.5);
        }
    }

    #[test]
    fn test_seasonal_window_average_positions() {
        let values = vec![1.0, 2.0, 3.0, 3.0, 4.0, 5.0];
        let mut model = SeasonalWindowAverage::new(3, 2).unwrap();
        model.fit(&series(values)).unwrap();
        let forecast = model.predict(3).unwrap();
        assert_relative_eq!(forecast.point[0], 2.0);
        assert_relative_eq!(forecast.point[1], 3.0);
        assert_relative_eq!(forecast.point[2], 4.0);
    }
}

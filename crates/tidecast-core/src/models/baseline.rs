//! Baseline models: naive, seasonal naive, moving average, drift.

use crate::error::{ForecastError, Result};
use crate::series::TimeSeries;

use super::{check_horizon, check_min_length, not_fitted, Forecast, Forecaster};

/// Repeats the last observed value.
#[derive(Debug, Default)]
pub struct Naive {
    last: Option<f64>,
}

impl Naive {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Forecaster for Naive {
    fn fit(&mut self, ts: &TimeSeries) -> Result<()> {
        check_min_length(self.name(), 1, ts.len())?;
        self.last = ts.values().last().copied();
        Ok(())
    }

    fn predict(&self, horizon: usize) -> Result<Forecast> {
        check_horizon(horizon)?;
        let last = self.last.ok_or_else(|| not_fitted(self.name()))?;
        Ok(Forecast::new(vec![last; horizon], self.name()))
    }

    fn name(&self) -> &str {
        "Naive"
    }
}

/// Repeats the last full season.
#[derive(Debug)]
pub struct SeasonalNaive {
    season_length: usize,
    last_season: Option<Vec<f64>>,
}

impl SeasonalNaive {
    pub fn new(season_length: usize) -> Result<Self> {
        if season_length == 0 {
            return Err(ForecastError::InvalidInput(
                "seasonal_period must be positive".to_string(),
            ));
        }
        Ok(Self {
            season_length,
            last_season: None,
        })
    }
}

impl Forecaster for SeasonalNaive {
    fn fit(&mut self, ts: &TimeSeries) -> Result<()> {
        check_min_length(self.name(), self.season_length, ts.len())?;
        let values = ts.values();
        self.last_season = Some(values[values.len() - self.season_length..].to_vec());
        Ok(())
    }

    fn predict(&self, horizon: usize) -> Result<Forecast> {
        check_horizon(horizon)?;
        let season = self.last_season.as_ref().ok_or_else(|| not_fitted(self.name()))?;
        let point = (0..horizon).map(|i| season[i % season.len()]).collect();
        Ok(Forecast::new(point, self.name()))
    }

    fn name(&self) -> &str {
        "SeasonalNaive"
    }
}

/// Simple moving average over a trailing window.
#[derive(Debug)]
pub struct Sma {
    window: usize,
    level: Option<f64>,
}

impl Sma {
    pub fn new(window: usize) -> Result<Self> {
        if window == 0 {
            return Err(ForecastError::InvalidInput(
                "window must be positive".to_string(),
            ));
        }
        Ok(Self {
            window,
            level: None,
        })
    }
}

impl Forecaster for Sma {
    fn fit(&mut self, ts: &TimeSeries) -> Result<()> {
        check_min_length(self.name(), 1, ts.len())?;
        let values = ts.values();
        let w = self.window.min(values.len());
        let sum: f64 = values[values.len() - w..].iter().sum();
        self.level = Some(sum / w as f64);
        Ok(())
    }

    fn predict(&self, horizon: usize) -> Result<Forecast> {
        check_horizon(horizon)?;
        let level = self.level.ok_or_else(|| not_fitted(self.name()))?;
        Ok(Forecast::new(vec![level; horizon], self.name()))
    }

    fn name(&self) -> &str {
        "SMA"
    }
}

/// Random walk with drift: last value plus the mean historical step.
#[derive(Debug, Default)]
pub struct RandomWalkWithDrift {
    state: Option<(f64, f64)>,
}

impl RandomWalkWithDrift {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Forecaster for RandomWalkWithDrift {
    fn fit(&mut self, ts: &TimeSeries) -> Result<()> {
        check_min_length(self.name(), 2, ts.len())?;
        let values = ts.values();
        let n = values.len();
        let drift = (values[n - 1] - values[0]) / (n - 1) as f64;
        self.state = Some((values[n - 1], drift));
        Ok(())
    }

    fn predict(&self, horizon: usize) -> Result<Forecast> {
        check_horizon(horizon)?;
        let (last, drift) = self.state.ok_or_else(|| not_fitted(self.name()))?;
        let point = (1..=horizon).map(|h| last + drift * h as f64).collect();
        Ok(Forecast::new(point, self.name()))
    }

    fn name(&self) -> &str {
        "RandomWalkWithDrift"
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
    fn test_naive_repeats_last_value() {
        let mut model = Naive::new();
        model.fit(&series(vec![1.0, 2.0, 3.0, 4.0, 5.0])).unwrap();
        let forecast = model.predict(3).unwrap();
        assert_eq!(forecast.point, vec![5.0, 5.0, 5.0]);
    }

    #[test]
    fn test_naive_requires_fit() {
        let model = Naive::new();
        assert!(matches!(
            model.predict(3),
            Err(ForecastError::NotFitted(_))
        ));
    }

    #[test]
    fn test_seasonal_naive_cycles_last_season() {
        let mut model = SeasonalNaive::new(3).unwrap();
        model
            .fit(&series(vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]))
            .unwrap();
        let forecast = model.predict(4).unwrap();
        assert_eq!(forecast.point, vec![4.0, 5.0, 6.0, 4.0]);
    }

    #[test]
    fn test_seasonal_naive_short_series() {
        let mut model = SeasonalNaive::new(4).unwrap();
        assert!(matches!(
            model.fit(&series(vec![1.0, 2.0])),
            Err(ForecastError::InsufficientData { needed: 4, got: 2 })
        ));
    }

    #[test]
    fn test_sma_averages_window() {
        let mut model = Sma::new(3).unwrap();
        model.fit(&series(vec![1.0, 2.0, 3.0, 4.0, 5.0])).unwrap();
        let forecast = model.predict(2).unwrap();
        assert_relative_eq!(forecast.point[0], 4.0);
        assert_relative_eq!(forecast.point[1], 4.0);
    }

    #[test]
    fn test_drift_extrapolates() {
        let mut model = RandomWalkWithDrift::new();
        model.fit(&series(vec![1.0, 2.0, 3.0, 4.0, 5.0])).unwrap();
        let forecast = model.predict(2).unwrap();
        assert_relative_eq!(forecast.point[0], 6.0);
        assert_relative_eq!(forecast.point[1], 7.0);
    }

    #[test]
    fn test_zero_horizon_rejected() {
        let mut model = Naive::new();
        model.fit(&series(vec![1.0, 2.0])).unwrap();
        assert!(matches!(
            model.predict(0),
            Err(ForecastError::InvalidInput(_))
        ));
    }
}

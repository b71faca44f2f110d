//! Multi-seasonal models: MFLES boosting, MSTL-based forecasting, and a
//! damped-trend TBATS rendition.

use crate::decomposition::mstl_decompose;
use crate::error::{ForecastError, Result};
use crate::metrics;
use crate::numeric::{median, siegel_repeated_medians};
use crate::series::TimeSeries;

use super::{check_horizon, check_min_length, not_fitted, Forecast, Forecaster};

fn validate_periods(periods: &[usize], model: &str) -> Result<()> {
    if periods.is_empty() {
        return Err(ForecastError::InvalidInput(format!(
            "{} requires at least one seasonal period",
            model
        )));
    }
    if let Some(bad) = periods.iter().find(|&&p| p < 2) {
        return Err(ForecastError::InvalidInput(format!(
            "{} seasonal periods must be >= 2, got {}",
            model, bad
        )));
    }
    Ok(())
}

fn validate_rate(value: f64, key: &str, model: &str) -> Result<()> {
    if !(value > 0.0 && value <= 1.0) {
        return Err(ForecastError::InvalidInput(format!(
            "{} {} must be in (0, 1], got {}",
            model, key, value
        )));
    }
    Ok(())
}

/// Accumulated MFLES components.
#[derive(Debug, Clone)]
struct MflesState {
    level: f64,
    intercept: f64,
    slope: f64,
    seasonal: Vec<(usize, Vec<f64>)>,
    n_observed: usize,
    fitted: Vec<f64>,
    residuals: Vec<f64>,
}

fn fit_mfles(
    values: &[f64],
    periods: &[usize],
    rounds: usize,
    lr_trend: f64,
    lr_season: f64,
    lr_level: f64,
) -> Result<MflesState> {
    let n = values.len();
    let xs: Vec<f64> = (0..n).map(|i| i as f64).collect();

    let mut residual = values.to_vec();
    let mut level = 0.0;
    let mut intercept = 0.0;
    let mut slope = 0.0;
    let mut seasonal: Vec<(usize, Vec<f64>)> = periods
        .iter()
        .filter(|&&p| n >= 2 * p)
        .map(|&p| (p, vec![0.0; p]))
        .collect();

    for _ in 0..rounds {
        // Robust trend round.
        let (round_slope, round_intercept) = siegel_repeated_medians(&xs, &residual)?;
        slope += lr_trend * round_slope;
        intercept += lr_trend * round_intercept;
        for (i, r) in residual.iter_mut().enumerate() {
            *r -= lr_trend * (round_intercept + round_slope * i as f64);
        }

        // Seasonal rounds, longest period first.
        for (p, acc) in seasonal.iter_mut() {
            let mut sums = vec![0.0; *p];
            let mut counts = vec![0usize; *p];
            for (i, &r) in residual.iter().enumerate() {
                sums[i % *p] += r;
                counts[i % *p] += 1;
            }
            let mut means: Vec<f64> = sums
                .iter()
                .zip(counts.iter())
                .map(|(s, c)| if *c > 0 { s / *c as f64 } else { 0.0 })
                .collect();
            let grand = means.iter().sum::<f64>() / *p as f64;
            for m in means.iter_mut() {
                *m -= grand;
            }
            for (j, acc_j) in acc.iter_mut().enumerate() {
                *acc_j += lr_season * means[j];
            }
            for (i, r) in residual.iter_mut().enumerate() {
                *r -= lr_season * means[i % *p];
            }
        }

        // Level round on what is left.
        let mut scratch = residual.clone();
        let round_level = median(&mut scratch)?;
        level += lr_level * round_level;
        for r in residual.iter_mut() {
            *r -= lr_level * round_level;
        }
    }

    let fitted: Vec<f64> = (0..n)
        .map(|i| {
            let mut v = level + intercept + slope * i as f64;
            for (p, acc) in &seasonal {
                v += acc[i % p];
            }
            v
        })
        .collect();
    let residuals: Vec<f64> = values.iter().zip(fitted.iter()).map(|(y, f)| y - f).collect();

    Ok(MflesState {
        level,
        intercept,
        slope,
        seasonal,
        n_observed: n,
        fitted,
        residuals,
    })
}

fn predict_mfles(state: &MflesState, horizon: usize, name: &str) -> Forecast {
    let point: Vec<f64> = (0..horizon)
        .map(|h| {
            let t = state.n_observed + h;
            let mut v = state.level + state.intercept + state.slope * t as f64;
            for (p, acc) in &state.seasonal {
                v += acc[t % p];
            }
            v
        })
        .collect();
    let mut forecast = Forecast::new(point, name);
    forecast.fitted = Some(state.fitted.clone());
    forecast.residuals = Some(state.residuals.clone());
    forecast
}

/// Gradient-boosted robust decomposition over multiple seasonal periods.
#[derive(Debug)]
pub struct Mfles {
    periods: Vec<usize>,
    rounds: usize,
    lr_trend: f64,
    lr_season: f64,
    lr_level: f64,
    state: Option<MflesState>,
}

impl Mfles {
    pub fn new(
        periods: Vec<usize>,
        rounds: usize,
        lr_trend: f64,
        lr_season: f64,
        lr_level: f64,
    ) -> Result<Self> {
        validate_periods(&periods, "MFLES")?;
        if rounds == 0 {
            return Err(ForecastError::InvalidInput(
                "MFLES n_iterations must be positive".to_string(),
            ));
        }
        validate_rate(lr_trend, "lr_trend", "MFLES")?;
        validate_rate(lr_season, "lr_season", "MFLES")?;
        validate_rate(lr_level, "lr_level", "MFLES")?;
        Ok(Self {
            periods,
            rounds,
            lr_trend,
            lr_season,
            lr_level,
            state: None,
        })
    }
}

impl Forecaster for Mfles {
    fn fit(&mut self, ts: &TimeSeries) -> Result<()> {
        check_min_length(self.name(), 3, ts.len())?;
        self.state = Some(fit_mfles(
            ts.values(),
            &self.periods,
            self.rounds,
            self.lr_trend,
            self.lr_season,
            self.lr_level,
        )?);
        Ok(())
    }

    fn predict(&self, horizon: usize) -> Result<Forecast> {
        check_horizon(horizon)?;
        let state = self.state.as_ref().ok_or_else(|| not_fitted(self.name()))?;
        Ok(predict_mfles(state, horizon, self.name()))
    }

    fn name(&self) -> &str {
        "MFLES"
    }
}

/// MFLES with the round count tuned on a holdout tail.
#[derive(Debug)]
pub struct AutoMfles {
    periods: Vec<usize>,
    max_rounds: usize,
    lr_trend: f64,
    lr_season: f64,
    lr_level: f64,
    cv_horizon: Option<usize>,
    state: Option<MflesState>,
}

impl AutoMfles {
    pub fn new(
        periods: Vec<usize>,
        max_rounds: usize,
        lr_trend: f64,
        lr_season: f64,
        lr_level: f64,
        cv_horizon: Option<usize>,
    ) -> Result<Self> {
        validate_periods(&periods, "AutoMFLES")?;
        if max_rounds == 0 {
            return Err(ForecastError::InvalidInput(
                "AutoMFLES max_rounds must be positive".to_string(),
            ));
        }
        validate_rate(lr_trend, "lr_trend", "AutoMFLES")?;
        validate_rate(lr_season, "lr_season", "AutoMFLES")?;
        validate_rate(lr_level, "lr_level", "AutoMFLES")?;
        Ok(Self {
            periods,
            max_rounds,
            lr_trend,
            lr_season,
            lr_level,
            cv_horizon,
            state: None,
        })
    }
}

impl Forecaster for AutoMfles {
    fn fit(&mut self, ts: &TimeSeries) -> Result<()> {
        check_min_length(self.name(), 8, ts.len())?;
        let values = ts.values();
        let n = values.len();

        let holdout = self
            .cv_horizon
            .unwrap_or_else(|| (*self.periods.iter().min().unwrap()).min(n / 4).max(2));
        let split = n - holdout;
        let train = &values[..split];
        let test = &values[split..];

        let mut candidates: Vec<usize> = vec![1, 3, 5, self.max_rounds];
        candidates.retain(|&r| r <= self.max_rounds);
        candidates.dedup();

        let mut best_rounds = 1;
        let mut best_score = f64::INFINITY;
        for &rounds in &candidates {
            let Ok(state) = fit_mfles(
                train,
                &self.periods,
                rounds,
                self.lr_trend,
                self.lr_season,
                self.lr_level,
            ) else {
                continue;
            };
            let forecast = predict_mfles(&state, holdout, "AutoMFLES");
            if let Ok(score) = metrics::mae(test, &forecast.point) {
                if score < best_score {
                    best_score = score;
                    best_rounds = rounds;
                }
            }
        }

        self.state = Some(fit_mfles(
            values,
            &self.periods,
            best_rounds,
            self.lr_trend,
            self.lr_season,
            self.lr_level,
        )?);
        Ok(())
    }

    fn predict(&self, horizon: usize) -> Result<Forecast> {
        check_horizon(horizon)?;
        let state = self.state.as_ref().ok_or_else(|| not_fitted(self.name()))?;
        Ok(predict_mfles(state, horizon, self.name()))
    }

    fn name(&self) -> &str {
        "AutoMFLES"
    }
}

#[derive(Debug)]
struct MstlState {
    trend_intercept: f64,
    trend_slope: f64,
    seasonal: Vec<(usize, Vec<f64>)>,
    n_observed: usize,
    fitted: Vec<f64>,
    residuals: Vec<f64>,
}

/// Forecast on top of an MSTL decomposition: robust drift on the trend,
/// cycled seasonal components.
#[derive(Debug)]
pub struct Mstl {
    periods: Vec<usize>,
    state: Option<MstlState>,
}

impl Mstl {
    pub fn new(periods: Vec<usize>) -> Result<Self> {
        validate_periods(&periods, "MSTL")?;
        Ok(Self {
            periods,
            state: None,
        })
    }

    fn fit_named(&mut self, ts: &TimeSeries, name: &str) -> Result<()> {
        let min_period = *self.periods.iter().min().unwrap();
        check_min_length(name, 2 * min_period, ts.len())?;
        let values = ts.values();
        let n = values.len();

        let periods_i32: Vec<i32> = self.periods.iter().map(|&p| p as i32).collect();
        let decomposition = mstl_decompose(values, &periods_i32)?;

        let xs: Vec<f64> = (0..n).map(|i| i as f64).collect();
        let (slope, intercept) = siegel_repeated_medians(&xs, &decomposition.trend)?;

        let seasonal: Vec<(usize, Vec<f64>)> = decomposition
            .periods
            .iter()
            .zip(decomposition.seasonal.iter())
            .map(|(&p, component)| {
                let p = p as usize;
                // Last full cycle of each extracted component.
                let cycle: Vec<f64> = (0..p)
                    .map(|j| {
                        let idx = n - p + j;
                        component[idx]
                    })
                    .collect();
                (p, cycle)
            })
            .collect();

        let fitted: Vec<f64> = (0..n)
            .map(|i| {
                let mut v = decomposition.trend[i];
                for component in &decomposition.seasonal {
                    v += component[i];
                }
                v
            })
            .collect();
        let residuals: Vec<f64> = values.iter().zip(fitted.iter()).map(|(y, f)| y - f).collect();

        self.state = Some(MstlState {
            trend_intercept: intercept,
            trend_slope: slope,
            seasonal,
            n_observed: n,
            fitted,
            residuals,
        });
        Ok(())
    }

    fn predict_named(&self, horizon: usize, name: &str) -> Result<Forecast> {
        check_horizon(horizon)?;
        let state = self.state.as_ref().ok_or_else(|| not_fitted(name))?;
        let point: Vec<f64> = (0..horizon)
            .map(|h| {
                let t = state.n_observed + h;
                let mut v = state.trend_intercept + state.trend_slope * t as f64;
                for (p, cycle) in &state.seasonal {
                    v += cycle[t % p];
                }
                v
            })
            .collect();
        let mut forecast = Forecast::new(point, name);
        forecast.fitted = Some(state.fitted.clone());
        forecast.residuals = Some(state.residuals.clone());
        Ok(forecast)
    }
}

impl Forecaster for Mstl {
    fn fit(&mut self, ts: &TimeSeries) -> Result<()> {
        self.fit_named(ts, "MSTL")
    }

    fn predict(&self, horizon: usize) -> Result<Forecast> {
        self.predict_named(horizon, self.name())
    }

    fn name(&self) -> &str {
        "MSTL"
    }
}

/// MSTL with default settings; the period list is the only input.
#[derive(Debug)]
pub struct AutoMstl {
    inner: Mstl,
}

impl AutoMstl {
    pub fn new(periods: Vec<usize>) -> Result<Self> {
        Ok(Self {
            inner: Mstl::new(periods)?,
        })
    }
}

impl Forecaster for AutoMstl {
    fn fit(&mut self, ts: &TimeSeries) -> Result<()> {
        self.inner.fit_named(ts, "AutoMSTL")
    }

    fn predict(&self, horizon: usize) -> Result<Forecast> {
        self.inner.predict_named(horizon, self.name())
    }

    fn name(&self) -> &str {
        "AutoMSTL"
    }
}

#[derive(Debug)]
struct TbatsState {
    level: f64,
    trend: f64,
    seasonal: Vec<f64>,
    n_observed: usize,
    fitted: Vec<f64>,
    residuals: Vec<f64>,
    sse: f64,
}

/// Damped-trend seasonal smoothing with an optional Box-Cox transform; a
/// deliberately lean rendition of the TBATS family.
#[derive(Debug)]
pub struct Tbats {
    period: usize,
    use_box_cox: bool,
    box_cox_lambda: f64,
    use_trend: bool,
    use_damped_trend: bool,
    damping: f64,
    state: Option<TbatsState>,
}

impl Tbats {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        periods: Vec<usize>,
        use_box_cox: bool,
        box_cox_lambda: f64,
        use_trend: bool,
        use_damped_trend: bool,
        damping: f64,
    ) -> Result<Self> {
        validate_periods(&periods, "TBATS")?;
        if !(damping > 0.0 && damping <= 1.0) {
            return Err(ForecastError::InvalidInput(format!(
                "TBATS damping_param must be in (0, 1], got {}",
                damping
            )));
        }
        Ok(Self {
            period: periods[0],
            use_box_cox,
            box_cox_lambda,
            use_trend,
            use_damped_trend,
            damping,
            state: None,
        })
    }

    fn transform(&self, v: f64) -> f64 {
        if !self.use_box_cox {
            return v;
        }
        if self.box_cox_lambda.abs() < 1e-10 {
            v.max(1e-10).ln()
        } else {
            (v.max(1e-10).powf(self.box_cox_lambda) - 1.0) / self.box_cox_lambda
        }
    }

    fn inverse_transform(&self, v: f64) -> f64 {
        if !self.use_box_cox {
            return v;
        }
        if self.box_cox_lambda.abs() < 1e-10 {
            v.exp()
        } else {
            (self.box_cox_lambda * v + 1.0)
                .max(1e-10)
                .powf(1.0 / self.box_cox_lambda)
        }
    }

    fn phi(&self) -> f64 {
        if self.use_damped_trend {
            self.damping
        } else {
            1.0
        }
    }

    fn fit_state(&self, values: &[f64]) -> TbatsState {
        let p = self.period;
        let transformed: Vec<f64> = values.iter().map(|&v| self.transform(v)).collect();
        let n = transformed.len();

        let (alpha, beta, gamma) = (0.3, 0.1, 0.1);
        let phi = self.phi();

        let first_mean: f64 = transformed[..p].iter().sum::<f64>() / p as f64;
        let mut level = first_mean;
        let mut trend = if self.use_trend && n >= 2 * p {
            let second_mean: f64 = transformed[p..2 * p].iter().sum::<f64>() / p as f64;
            (second_mean - first_mean) / p as f64
        } else {
            0.0
        };
        let mut seasonal: Vec<f64> = transformed[..p].iter().map(|v| v - first_mean).collect();

        let mut fitted = Vec::with_capacity(n);
        let mut residuals = Vec::with_capacity(n);
        let mut sse = 0.0;

        for (i, &v) in transformed.iter().enumerate() {
            let s_idx = i % p;
            let one_step = level + phi * trend + seasonal[s_idx];
            let back = self.inverse_transform(one_step);
            fitted.push(back);
            let err = values[i] - back;
            residuals.push(err);
            sse += err * err;

            let prev_level = level;
            level = alpha * (v - seasonal[s_idx]) + (1.0 - alpha) * (level + phi * trend);
            if self.use_trend {
                trend = beta * (level - prev_level) + (1.0 - beta) * phi * trend;
            }
            seasonal[s_idx] = gamma * (v - level) + (1.0 - gamma) * seasonal[s_idx];
        }

        TbatsState {
            level,
            trend,
            seasonal,
            n_observed: n,
            fitted,
            residuals,
            sse,
        }
    }

    fn predict_state(&self, state: &TbatsState, horizon: usize, name: &str) -> Forecast {
        let p = self.period;
        let phi = self.phi();
        let mut phi_sum = 0.0;
        let point: Vec<f64> = (1..=horizon)
            .map(|h| {
                phi_sum += phi.powi(h as i32);
                let transformed = state.level
                    + phi_sum * state.trend
                    + state.seasonal[(state.n_observed + h - 1) % p];
                self.inverse_transform(transformed)
            })
            .collect();
        let mut forecast = Forecast::new(point, name);
        forecast.fitted = Some(state.fitted.clone());
        forecast.residuals = Some(state.residuals.clone());
        forecast
    }
}

impl Forecaster for Tbats {
    fn fit(&mut self, ts: &TimeSeries) -> Result<()> {
        check_min_length(self.name(), 2 * self.period, ts.len())?;
        self.state = Some(self.fit_state(ts.values()));
        Ok(())
    }

    fn predict(&self, horizon: usize) -> Result<Forecast> {
        check_horizon(horizon)?;
        let state = self.state.as_ref().ok_or_else(|| not_fitted(self.name()))?;
        Ok(self.predict_state(state, horizon, self.name()))
    }

    fn name(&self) -> &str {
        "TBATS"
    }
}

/// TBATS trying Box-Cox and damping variants, keeping the best in-sample fit.
#[derive(Debug)]
pub struct AutoTbats {
    periods: Vec<usize>,
    chosen: Option<Tbats>,
}

impl AutoTbats {
    pub fn new(periods: Vec<usize>) -> Result<Self> {
        validate_periods(&periods, "AutoTBATS")?;
        Ok(Self {
            periods,
            chosen: None,
        })
    }
}

impl Forecaster for AutoTbats {
    fn fit(&mut self, ts: &TimeSeries) -> Result<()> {
        let min_period = self.periods[0];
        check_min_length(self.name(), 2 * min_period, ts.len())?;
        let positive = ts.values().iter().all(|&v| v > 0.0);

        let mut best: Option<(Tbats, TbatsState)> = None;
        for &use_box_cox in &[false, true] {
            if use_box_cox && !positive {
                continue;
            }
            for &use_damped in &[false, true] {
                let candidate = Tbats::new(
                    self.periods.clone(),
                    use_box_cox,
                    0.0,
                    true,
                    use_damped,
                    0.98,
                )?;
                let state = candidate.fit_state(ts.values());
                if state.sse.is_finite()
                    && best.as_ref().map(|(_, b)| state.sse < b.sse).unwrap_or(true)
                {
                    best = Some((candidate, state));
                }
            }
        }

        let (mut model, state) = best.ok_or_else(|| {
            ForecastError::NumericFailure("no TBATS variant could be fitted".to_string())
        })?;
        model.state = Some(state);
        self.chosen = Some(model);
        Ok(())
    }

    fn predict(&self, horizon: usize) -> Result<Forecast> {
        check_horizon(horizon)?;
        let model = self.chosen.as_ref().ok_or_else(|| not_fitted(self.name()))?;
        let state = model.state.as_ref().ok_or_else(|| not_fitted(self.name()))?;
        Ok(model.predict_state(state, horizon, self.name()))
    }

    fn name(&self) -> &str {
        "AutoTBATS"
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

    fn two_season_series(n: usize) -> Vec<f64> {
        (0..n)
            .map(|t| {
                let tf = t as f64;
                50.0 + 0.2 * tf
                    + 4.0 * (2.0 * std::f64::consts::PI * tf / 12.0).sin()
                    + 1.5 * (2.0 * std::f64::consts::PI * tf / 4.0).sin()
            })
            .collect()
    }

    #[test]
    fn test_mfles_captures_trend_and_season() {
        let values = two_season_series(120);
        let mut model = Mfles::new(vec![12, 4], 10, 0.3, 0.5, 0.8).unwrap();
        model.fit(&series(values.clone())).unwrap();
        let forecast = model.predict(12).unwrap();
        assert_eq!(forecast.point.len(), 12);

        // In-sample fit should be much tighter than a flat mean.
        let fitted = forecast.fitted.as_ref().unwrap();
        let mean = values.iter().sum::<f64>() / values.len() as f64;
        let fit_sse: f64 = values
            .iter()
            .zip(fitted.iter())
            .map(|(y, f)| (y - f).powi(2))
            .sum();
        let mean_sse: f64 = values.iter().map(|y| (y - mean).powi(2)).sum();
        assert!(fit_sse < mean_sse * 0.2, "{} vs {}", fit_sse, mean_sse);
    }

    #[test]
    fn test_mfles_rejects_bad_rates() {
        assert!(Mfles::new(vec![12], 10, 0.0, 0.5, 0.8).is_err());
        assert!(Mfles::new(vec![12], 0, 0.3, 0.5, 0.8).is_err());
        assert!(Mfles::new(vec![], 10, 0.3, 0.5, 0.8).is_err());
        assert!(Mfles::new(vec![1], 10, 0.3, 0.5, 0.8).is_err());
    }

    #[test]
    fn test_auto_mfles_tunes_rounds() {
        let values = two_season_series(96);
        let mut model = AutoMfles::new(vec![12], 10, 0.3, 0.5, 0.8, None).unwrap();
        model.fit(&series(values)).unwrap();
        assert_eq!(model.predict(6).unwrap().point.len(), 6);
    }

    #[test]
    fn test_mstl_forecast_extends_trend() {
        let values: Vec<f64> = (0..96)
            .map(|t| 10.0 + 0.5 * t as f64 + 3.0 * (2.0 * std::f64::consts::PI * t as f64 / 12.0).sin())
            .collect();
        let mut model = Mstl::new(vec![12]).unwrap();
        model.fit(&series(values)).unwrap();
        let forecast = model.predict(6).unwrap();
        // Trend slope is 0.5/step; forecasts should keep climbing.
        assert!(forecast.point[5] > forecast.point[0]);
        assert_relative_eq!(forecast.point[0], 58.0, epsilon = 6.0);
    }

    #[test]
    fn test_tbats_seasonal_cycle() {
        let pattern = [10.0, 14.0, 18.0, 14.0];
        let values: Vec<f64> = (0..48).map(|i| pattern[i % 4]).collect();
        let mut model = Tbats::new(vec![4], false, 1.0, true, true, 0.98).unwrap();
        model.fit(&series(values)).unwrap();
        let forecast = model.predict(4).unwrap();
        for (i, p) in forecast.point.iter().enumerate() {
            assert_relative_eq!(*p, pattern[i % 4], epsilon = 2.5);
        }
    }

    #[test]
    fn test_auto_tbats_picks_variant() {
        let values = two_season_series(72);
        let mut model = AutoTbats::new(vec![12]).unwrap();
        model.fit(&series(values)).unwrap();
        let forecast = model.predict(6).unwrap();
        assert_eq!(forecast.point.len(), 6);
        assert_eq!(forecast.model_name, "AutoTBATS");
    }
}

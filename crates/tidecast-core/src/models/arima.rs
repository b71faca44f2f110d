//! ARIMA models, available when a linear algebra backend is compiled in.
//!
//! Estimation is two-stage Hannan-Rissanen: a long autoregression supplies
//! innovation estimates, then the AR/MA (and seasonal) coefficients come
//! from one least-squares solve over the lagged design matrix.

use faer::prelude::*;
use faer::Mat;

use crate::error::{ForecastError, Result};
use crate::series::TimeSeries;

use super::{check_horizon, check_min_length, confidence_intervals, not_fitted, Forecast, Forecaster};

/// ARIMA orders: regular (p, d, q), seasonal (P, D, Q) at period `s`.
#[derive(Debug, Clone, Copy)]
pub struct ArimaOrder {
    pub p: usize,
    pub d: usize,
    pub q: usize,
    pub sp: usize,
    pub sd: usize,
    pub sq: usize,
    pub s: usize,
    pub intercept: bool,
}

impl ArimaOrder {
    fn validate(&self) -> Result<()> {
        if (self.sp > 0 || self.sd > 0 || self.sq > 0) && self.s < 2 {
            return Err(ForecastError::InvalidInput(
                "seasonal ARIMA terms require s >= 2".to_string(),
            ));
        }
        if self.p > 5 || self.q > 5 || self.d > 2 || self.sp > 2 || self.sq > 2 || self.sd > 1 {
            return Err(ForecastError::InvalidInput(
                "ARIMA orders out of supported range (p,q <= 5, d <= 2, P,Q <= 2, D <= 1)"
                    .to_string(),
            ));
        }
        Ok(())
    }

    fn n_coefficients(&self) -> usize {
        self.p + self.q + self.sp + self.sq + self.intercept as usize
    }

    fn min_observations(&self) -> usize {
        let differencing = self.d + self.sd * self.s;
        let longest_lag = self.p.max(self.q).max(self.s * self.sp.max(self.sq));
        differencing + longest_lag + self.n_coefficients() + 5
    }
}

#[derive(Debug, Clone)]
struct FittedArima {
    intercept: f64,
    ar: Vec<f64>,
    ma: Vec<f64>,
    sar: Vec<f64>,
    sma: Vec<f64>,
    /// Differenced working series, for the forecast recursion.
    work: Vec<f64>,
    residuals: Vec<f64>,
    /// Pre-differencing history at each integration stage, innermost last.
    integration: Vec<(usize, Vec<f64>)>,
    sigma2: f64,
    aic: f64,
    original: Vec<f64>,
}

fn difference(values: &[f64], lag: usize) -> Vec<f64> {
    values.windows(lag + 1).map(|w| w[lag] - w[0]).collect()
}

/// Long-AR innovations for the Hannan-Rissanen first stage.
fn long_ar_residuals(values: &[f64], order: usize) -> Vec<f64> {
    let n = values.len();
    let k = order.min(n.saturating_sub(2)).max(1);

    let rows = n - k;
    let x = Mat::from_fn(rows, k + 1, |i, j| {
        if j == 0 {
            1.0
        } else {
            values[i + k - j]
        }
    });
    let y = Mat::from_fn(rows, 1, |i, _| values[i + k]);

    let xtx = x.transpose() * x.as_ref();
    let xty = x.transpose() * y.as_ref();
    let beta = xtx.partial_piv_lu().solve(xty.as_ref());

    let mut residuals = vec![0.0; n];
    for i in 0..rows {
        let mut pred = beta[(0, 0)];
        for j in 1..=k {
            pred += beta[(j, 0)] * values[i + k - j];
        }
        residuals[i + k] = values[i + k] - pred;
    }
    residuals
}

fn fit_arima(order: &ArimaOrder, values: &[f64]) -> Result<FittedArima> {
    // Differencing pipeline: seasonal first, then regular; inverted in
    // reverse on the way out.
    let mut integration: Vec<(usize, Vec<f64>)> = Vec::new();
    let mut work = values.to_vec();
    for _ in 0..order.sd {
        integration.push((order.s, work.clone()));
        work = difference(&work, order.s);
    }
    for _ in 0..order.d {
        integration.push((1, work.clone()));
        work = difference(&work, 1);
    }

    let n = work.len();
    let max_lag = order
        .p
        .max(order.s * order.sp)
        .max(order.q.max(order.s * order.sq));
    if n <= max_lag + order.n_coefficients() {
        return Err(ForecastError::InsufficientData {
            needed: max_lag + order.n_coefficients() + 1,
            got: n,
        });
    }

    let needs_ma = order.q > 0 || order.sq > 0;
    let innovations = if needs_ma {
        let long_order = (order.p + order.q + order.s * (order.sp + order.sq) + 3).min(n / 3);
        long_ar_residuals(&work, long_order.max(1))
    } else {
        vec![0.0; n]
    };

    let k = order.n_coefficients();
    if k == 0 {
        // Pure differencing: white-noise innovations around zero.
        let sigma2 = work.iter().map(|v| v * v).sum::<f64>() / n.max(1) as f64;
        return Ok(FittedArima {
            intercept: 0.0,
            ar: vec![],
            ma: vec![],
            sar: vec![],
            sma: vec![],
            residuals: work.clone(),
            work,
            integration,
            sigma2,
            aic: n as f64 * sigma2.max(1e-12).ln() + 2.0,
            original: values.to_vec(),
        });
    }

    let start = max_lag;
    let rows = n - start;

    let x = Mat::from_fn(rows, k, |i, j| {
        let t = i + start;
        let mut col = j;
        if order.intercept {
            if col == 0 {
                return 1.0;
            }
            col -= 1;
        }
        if col < order.p {
            return work[t - (col + 1)];
        }
        col -= order.p;
        if col < order.sp {
            return work[t - order.s * (col + 1)];
        }
        col -= order.sp;
        if col < order.q {
            return innovations[t - (col + 1)];
        }
        col -= order.q;
        innovations[t - order.s * (col + 1)]
    });
    let y = Mat::from_fn(rows, 1, |i, _| work[i + start]);

    let xtx = x.transpose() * x.as_ref();
    let xty = x.transpose() * y.as_ref();
    let beta = xtx.partial_piv_lu().solve(xty.as_ref());

    let mut idx = 0;
    let intercept = if order.intercept {
        idx += 1;
        beta[(0, 0)]
    } else {
        0.0
    };
    let ar: Vec<f64> = (0..order.p).map(|j| beta[(idx + j, 0)]).collect();
    idx += order.p;
    let sar: Vec<f64> = (0..order.sp).map(|j| beta[(idx + j, 0)]).collect();
    idx += order.sp;
    let ma: Vec<f64> = (0..order.q).map(|j| beta[(idx + j, 0)]).collect();
    idx += order.q;
    let sma: Vec<f64> = (0..order.sq).map(|j| beta[(idx + j, 0)]).collect();

    // One-step residuals over the estimation sample.
    let mut residuals = vec![0.0; n];
    let mut sse = 0.0;
    for t in start..n {
        let mut pred = intercept;
        for (j, &coef) in ar.iter().enumerate() {
            pred += coef * work[t - (j + 1)];
        }
        for (j, &coef) in sar.iter().enumerate() {
            pred += coef * work[t - order.s * (j + 1)];
        }
        for (j, &coef) in ma.iter().enumerate() {
            pred += coef * residuals[t - (j + 1)];
        }
        for (j, &coef) in sma.iter().enumerate() {
            pred += coef * residuals[t - order.s * (j + 1)];
        }
        residuals[t] = work[t] - pred;
        sse += residuals[t] * residuals[t];
    }

    let effective = rows.max(1) as f64;
    let sigma2 = (sse / effective).max(1e-12);
    if !sigma2.is_finite() {
        return Err(ForecastError::NumericFailure(
            "ARIMA residual variance is not finite".to_string(),
        ));
    }
    let aic = effective * sigma2.ln() + 2.0 * (k + 1) as f64;

    Ok(FittedArima {
        intercept,
        ar,
        ma,
        sar,
        sma,
        residuals,
        work,
        integration,
        sigma2,
        aic,
        original: values.to_vec(),
    })
}

fn predict_arima(state: &FittedArima, order: &ArimaOrder, horizon: usize) -> Vec<f64> {
    let n = state.work.len();
    let mut extended = state.work.clone();
    let mut errors = state.residuals.clone();

    for _ in 0..horizon {
        let t = extended.len();
        let mut pred = state.intercept;
        for (j, &coef) in state.ar.iter().enumerate() {
            let lag = j + 1;
            if t >= lag {
                pred += coef * extended[t - lag];
            }
        }
        for (j, &coef) in state.sar.iter().enumerate() {
            let lag = order.s * (j + 1);
            if t >= lag {
                pred += coef * extended[t - lag];
            }
        }
        for (j, &coef) in state.ma.iter().enumerate() {
            let lag = j + 1;
            if t >= lag && t - lag < errors.len() {
                pred += coef * errors[t - lag];
            }
        }
        for (j, &coef) in state.sma.iter().enumerate() {
            let lag = order.s * (j + 1);
            if t >= lag && t - lag < errors.len() {
                pred += coef * errors[t - lag];
            }
        }
        extended.push(pred);
        errors.push(0.0);
    }

    let mut forecast: Vec<f64> = extended[n..].to_vec();

    // Undo differencing, innermost stage first.
    for (lag, history) in state.integration.iter().rev() {
        let mut rebuilt = Vec::with_capacity(forecast.len());
        let hist_len = history.len();
        for (h, &diff) in forecast.iter().enumerate() {
            let idx = hist_len + h;
            let prev = if idx >= *lag {
                if idx - lag < hist_len {
                    history[idx - lag]
                } else {
                    rebuilt[idx - lag - hist_len]
                }
            } else {
                0.0
            };
            rebuilt.push(prev + diff);
        }
        forecast = rebuilt;
    }

    forecast
}

/// ARIMA with explicit orders.
#[derive(Debug)]
pub struct Arima {
    order: ArimaOrder,
    confidence_level: f64,
    state: Option<FittedArima>,
}

impl Arima {
    pub fn new(order: ArimaOrder) -> Result<Self> {
        order.validate()?;
        Ok(Self {
            order,
            confidence_level: 0.95,
            state: None,
        })
    }
}

impl Forecaster for Arima {
    fn fit(&mut self, ts: &TimeSeries) -> Result<()> {
        check_min_length(self.name(), self.order.min_observations(), ts.len())?;
        self.state = Some(fit_arima(&self.order, ts.values())?);
        Ok(())
    }

    fn predict(&self, horizon: usize) -> Result<Forecast> {
        check_horizon(horizon)?;
        let state = self.state.as_ref().ok_or_else(|| not_fitted(self.name()))?;
        let point = predict_arima(state, &self.order, horizon);
        let (lower, upper) = confidence_intervals(&point, &state.original, self.confidence_level);
        let mut forecast = Forecast::new(point, self.name());
        forecast.lower = Some(lower);
        forecast.upper = Some(upper);
        Ok(forecast)
    }

    fn name(&self) -> &str {
        "ARIMA"
    }
}

/// Automatic order selection over a small grid, scored by AIC.
#[derive(Debug)]
pub struct AutoArima {
    season_length: usize,
    confidence_level: f64,
    state: Option<(ArimaOrder, FittedArima)>,
}

impl AutoArima {
    pub fn new(season_length: usize) -> Self {
        Self {
            season_length,
            confidence_level: 0.95,
            state: None,
        }
    }
}

impl Forecaster for AutoArima {
    fn fit(&mut self, ts: &TimeSeries) -> Result<()> {
        check_min_length(self.name(), 10, ts.len())?;
        let values = ts.values();
        let seasonal = self.season_length > 1 && values.len() >= 3 * self.season_length;

        let mut best: Option<(ArimaOrder, FittedArima)> = None;
        for d in 0..=1usize {
            for p in 0..=2usize {
                for q in 0..=2usize {
                    let seasonal_grid: &[(usize, usize, usize)] = if seasonal {
                        &[(0, 0, 0), (1, 0, 0), (0, 1, 0), (1, 1, 0), (0, 1, 1)]
                    } else {
                        &[(0, 0, 0)]
                    };
                    for &(sp, sd, sq) in seasonal_grid {
                        let order = ArimaOrder {
                            p,
                            d,
                            q,
                            sp,
                            sd,
                            sq,
                            s: if seasonal { self.season_length } else { 0 },
                            intercept: d == 0 && sd == 0,
                        };
                        if order.validate().is_err() || values.len() < order.min_observations() {
                            continue;
                        }
                        match fit_arima(&order, values) {
                            Ok(fitted) => {
                                if fitted.aic.is_finite()
                                    && best
                                        .as_ref()
                                        .map(|(_, b)| fitted.aic < b.aic)
                                        .unwrap_or(true)
                                {
                                    best = Some((order, fitted));
                                }
                            }
                            Err(err) => {
                                log::debug!(
                                    "AutoARIMA ({},{},{})x({},{},{}) failed: {}",
                                    p, d, q, sp, sd, sq, err
                                );
                            }
                        }
                    }
                }
            }
        }

        self.state = Some(best.ok_or_else(|| {
            ForecastError::NumericFailure("no ARIMA order could be fitted".to_string())
        })?);
        Ok(())
    }

    fn predict(&self, horizon: usize) -> Result<Forecast> {
        check_horizon(horizon)?;
        let (order, state) = self.state.as_ref().ok_or_else(|| not_fitted(self.name()))?;
        let point = predict_arima(state, order, horizon);
        let (lower, upper) = confidence_intervals(&point, &state.original, self.confidence_level);
        let mut forecast = Forecast::new(point, self.name());
        forecast.lower = Some(lower);
        forecast.upper = Some(upper);
        Ok(forecast)
    }

    fn name(&self) -> &str {
        "AutoARIMA"
    }
}

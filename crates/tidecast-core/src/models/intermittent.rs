//! Intermittent-demand models: Croston variants, aggregation methods, TSB.

use crate::error::{ForecastError, Result};
use crate::numeric::minimize_scalar;
use crate::series::TimeSeries;

use super::{check_horizon, check_min_length, not_fitted, Forecast, Forecaster};

/// Croston decomposition: smoothed demand size and inter-demand interval.
fn croston_levels(values: &[f64], alpha: f64) -> (f64, f64) {
    let mut demand_level = 0.0;
    let mut interval_level = 1.0;
    let mut last_nonzero = 0usize;
    let mut seen_demand = false;

    for (i, &v) in values.iter().enumerate() {
        if v > 0.0 {
            if !seen_demand {
                demand_level = v;
                interval_level = 1.0;
                seen_demand = true;
            } else {
                let interval = (i - last_nonzero) as f64;
                demand_level = alpha * v + (1.0 - alpha) * demand_level;
                interval_level = alpha * interval + (1.0 - alpha) * interval_level;
            }
            last_nonzero = i;
        }
    }

    (demand_level, interval_level)
}

fn croston_rate(values: &[f64], alpha: f64) -> f64 {
    let (demand, interval) = croston_levels(values, alpha);
    if interval > 0.0 {
        demand / interval
    } else {
        demand
    }
}

/// One-step SSE of the croston rate against the observed series, used by
/// the optimized variant.
fn croston_sse(values: &[f64], alpha: f64) -> f64 {
    let mut demand_level = 0.0;
    let mut interval_level = 1.0;
    let mut last_nonzero = 0usize;
    let mut seen_demand = false;
    let mut sse = 0.0;

    for (i, &v) in values.iter().enumerate() {
        if seen_demand {
            let rate = if interval_level > 0.0 {
                demand_level / interval_level
            } else {
                demand_level
            };
            let err = v - rate;
            sse += err * err;
        }
        if v > 0.0 {
            if !seen_demand {
                demand_level = v;
                interval_level = 1.0;
                seen_demand = true;
            } else {
                let interval = (i - last_nonzero) as f64;
                demand_level = alpha * v + (1.0 - alpha) * demand_level;
                interval_level = alpha * interval + (1.0 - alpha) * interval_level;
            }
            last_nonzero = i;
        }
    }

    sse
}

fn validate_smoothing(alpha: f64, key: &str, model: &str) -> Result<()> {
    if !(alpha > 0.0 && alpha <= 1.0) {
        return Err(ForecastError::InvalidInput(format!(
            "{} {} must be in (0, 1], got {}",
            model, key, alpha
        )));
    }
    Ok(())
}

/// Croston's classic method with a fixed smoothing constant of 0.1.
#[derive(Debug, Default)]
pub struct CrostonClassic {
    rate: Option<f64>,
}

impl CrostonClassic {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Forecaster for CrostonClassic {
    fn fit(&mut self, ts: &TimeSeries) -> Result<()> {
        check_min_length(self.name(), 1, ts.len())?;
        self.rate = Some(croston_rate(ts.values(), 0.1));
        Ok(())
    }

    fn predict(&self, horizon: usize) -> Result<Forecast> {
        check_horizon(horizon)?;
        let rate = self.rate.ok_or_else(|| not_fitted(self.name()))?;
        Ok(Forecast::new(vec![rate; horizon], self.name()))
    }

    fn name(&self) -> &str {
        "CrostonClassic"
    }
}

/// Croston with the smoothing constant tuned against one-step SSE.
#[derive(Debug, Default)]
pub struct CrostonOptimized {
    rate: Option<f64>,
}

impl CrostonOptimized {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Forecaster for CrostonOptimized {
    fn fit(&mut self, ts: &TimeSeries) -> Result<()> {
        check_min_length(self.name(), 3, ts.len())?;
        let values = ts.values();
        let alpha = minimize_scalar(|a| croston_sse(values, a), 0.01, 0.99, 1e-4);
        self.rate = Some(croston_rate(values, alpha));
        Ok(())
    }

    fn predict(&self, horizon: usize) -> Result<Forecast> {
        check_horizon(horizon)?;
        let rate = self.rate.ok_or_else(|| not_fitted(self.name()))?;
        Ok(Forecast::new(vec![rate; horizon], self.name()))
    }

    fn name(&self) -> &str {
        "CrostonOptimized"
    }
}

/// Syntetos-Boylan approximation: classic rate debiased by `1 - alpha/2`.
#[derive(Debug, Default)]
pub struct CrostonSba {
    rate: Option<f64>,
}

impl CrostonSba {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Forecaster for CrostonSba {
    fn fit(&mut self, ts: &TimeSeries) -> Result<()> {
        check_min_length(self.name(), 1, ts.len())?;
        let alpha = 0.1;
        self.rate = Some(croston_rate(ts.values(), alpha) * (1.0 - alpha / 2.0));
        Ok(())
    }

    fn predict(&self, horizon: usize) -> Result<Forecast> {
        check_horizon(horizon)?;
        let rate = self.rate.ok_or_else(|| not_fitted(self.name()))?;
        Ok(Forecast::new(vec![rate; horizon], self.name()))
    }

    fn name(&self) -> &str {
        "CrostonSBA"
    }
}

fn ses_level(values: &[f64], alpha: f64) -> f64 {
    let mut level = values[0];
    for &v in &values[1..] {
        level = alpha * v + (1.0 - alpha) * level;
    }
    level
}

/// Aggregate-disaggregate intermittent demand approximation: sum demand
/// into buckets of the mean inter-demand interval, smooth, disaggregate.
#[derive(Debug, Default)]
pub struct Adida {
    rate: Option<f64>,
}

impl Adida {
    pub fn new() -> Self {
        Self::default()
    }

    fn bucket_rate(values: &[f64], bucket: usize) -> f64 {
        let sums: Vec<f64> = values
            .chunks(bucket)
            .filter(|c| c.len() == bucket)
            .map(|c| c.iter().sum())
            .collect();
        if sums.is_empty() {
            return values.iter().sum::<f64>() / values.len() as f64;
        }
        ses_level(&sums, 0.1) / bucket as f64
    }
}

fn mean_interdemand_interval(values: &[f64]) -> usize {
    let nonzero: Vec<usize> = values
        .iter()
        .enumerate()
        .filter(|(_, &v)| v > 0.0)
        .map(|(i, _)| i)
        .collect();
    if nonzero.len() < 2 {
        return 1;
    }
    let total_gap: usize = nonzero.windows(2).map(|w| w[1] - w[0]).sum();
    (total_gap / (nonzero.len() - 1)).max(1)
}

impl Forecaster for Adida {
    fn fit(&mut self, ts: &TimeSeries) -> Result<()> {
        check_min_length(self.name(), 2, ts.len())?;
        let values = ts.values();
        let bucket = mean_interdemand_interval(values).min(values.len());
        self.rate = Some(Self::bucket_rate(values, bucket));
        Ok(())
    }

    fn predict(&self, horizon: usize) -> Result<Forecast> {
        check_horizon(horizon)?;
        let rate = self.rate.ok_or_else(|| not_fitted(self.name()))?;
        Ok(Forecast::new(vec![rate; horizon], self.name()))
    }

    fn name(&self) -> &str {
        "ADIDA"
    }
}

/// Multiple-aggregation prediction: ADIDA rates over several bucket sizes,
/// averaged.
#[derive(Debug, Default)]
pub struct Imapa {
    rate: Option<f64>,
}

impl Imapa {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Forecaster for Imapa {
    fn fit(&mut self, ts: &TimeSeries) -> Result<()> {
        check_min_length(self.name(), 2, ts.len())?;
        let values = ts.values();
        let max_bucket = mean_interdemand_interval(values).min(values.len()).max(1);

        let mut total = 0.0;
        let mut count = 0usize;
        for bucket in 1..=max_bucket {
            total += Adida::bucket_rate(values, bucket);
            count += 1;
        }
        self.rate = Some(total / count as f64);
        Ok(())
    }

    fn predict(&self, horizon: usize) -> Result<Forecast> {
        check_horizon(horizon)?;
        let rate = self.rate.ok_or_else(|| not_fitted(self.name()))?;
        Ok(Forecast::new(vec![rate; horizon], self.name()))
    }

    fn name(&self) -> &str {
        "IMAPA"
    }
}

/// Teunter-Syntetos-Babai: separate smoothing of demand size and demand
/// probability.
#[derive(Debug)]
pub struct Tsb {
    alpha_d: f64,
    alpha_p: f64,
    rate: Option<f64>,
}

impl Tsb {
    pub fn new(alpha_d: f64, alpha_p: f64) -> Result<Self> {
        validate_smoothing(alpha_d, "alpha_d", "TSB")?;
        validate_smoothing(alpha_p, "alpha_p", "TSB")?;
        Ok(Self {
            alpha_d,
            alpha_p,
            rate: None,
        })
    }
}

impl Forecaster for Tsb {
    fn fit(&mut self, ts: &TimeSeries) -> Result<()> {
        check_min_length(self.name(), 1, ts.len())?;
        let values = ts.values();

        let first_nonzero = values.iter().find(|&&v| v > 0.0).copied().unwrap_or(0.0);
        let mut demand = first_nonzero;
        let mut probability = values.iter().filter(|&&v| v > 0.0).count() as f64
            / values.len() as f64;

        for &v in values {
            if v > 0.0 {
                demand = self.alpha_d * v + (1.0 - self.alpha_d) * demand;
                probability = self.alpha_p + (1.0 - self.alpha_p) * probability;
            } else {
                probability = (1.0 - self.alpha_p) * probability;
            }
        }

        self.rate = Some(probability * demand);
        Ok(())
    }

    fn predict(&self, horizon: usize) -> Result<Forecast> {
        check_horizon(horizon)?;
        let rate = self.rate.ok_or_else(|| not_fitted(self.name()))?;
        Ok(Forecast::new(vec![rate; horizon], self.name()))
    }

    fn name(&self) -> &str {
        "TSB"
    }
}

//! ETS state-space recursions with analytical gradients.
//!
//! The forward pass runs the error/trend/season recurrences and records the
//! state trajectory; the backward pass differentiates the negative
//! log-likelihood through those recurrences in reverse. `forward_step` is
//! the single authority for the state update: the eager pass, checkpoint
//! creation and checkpoint replay all call it, so the trajectories cannot
//! drift apart.

use crate::error::{ForecastError, Result};
use crate::numeric::{clamp_positive, safe_divide};
use crate::simd;

pub(crate) const ETS_EPSILON: f64 = 1e-8;
const TREND_CLAMP_LO: f64 = 0.01;
const TREND_CLAMP_HI: f64 = 10.0;
const SEASON_CLAMP_LO: f64 = 0.1;
const SEASON_CLAMP_HI: f64 = 10.0;
const INNOVATION_CLAMP_LO: f64 = -0.999;
const INNOVATION_CLAMP_HI: f64 = 1e6;

/// Error component kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EtsErrorKind {
    Additive,
    Multiplicative,
}

/// Trend component kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EtsTrendKind {
    None,
    Additive,
    Multiplicative,
    DampedAdditive,
    DampedMultiplicative,
}

impl EtsTrendKind {
    pub fn is_damped(&self) -> bool {
        matches!(
            self,
            EtsTrendKind::DampedAdditive | EtsTrendKind::DampedMultiplicative
        )
    }
}

/// Season component kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EtsSeasonKind {
    None,
    Additive,
    Multiplicative,
}

/// An ETS specification. Immutable once constructed.
#[derive(Debug, Clone)]
pub struct EtsConfig {
    pub error: EtsErrorKind,
    pub trend: EtsTrendKind,
    pub season: EtsSeasonKind,
    pub season_length: usize,
    pub alpha: f64,
    pub beta: Option<f64>,
    pub gamma: Option<f64>,
    pub phi: f64,
}

impl EtsConfig {
    pub fn validate(&self) -> Result<()> {
        if self.season_length < 1 {
            return Err(ForecastError::InvalidInput(
                "season_length must be at least 1".to_string(),
            ));
        }
        if !(self.alpha > 0.0 && self.alpha <= 1.0) {
            return Err(ForecastError::InvalidInput(format!(
                "alpha must be in (0, 1], got {}",
                self.alpha
            )));
        }
        if let Some(beta) = self.beta {
            if !(0.0..=1.0).contains(&beta) {
                return Err(ForecastError::InvalidInput(format!(
                    "beta must be in [0, 1], got {}",
                    beta
                )));
            }
        }
        if let Some(gamma) = self.gamma {
            if !(0.0..=1.0).contains(&gamma) {
                return Err(ForecastError::InvalidInput(format!(
                    "gamma must be in [0, 1], got {}",
                    gamma
                )));
            }
        }
        if !(self.phi > 0.0 && self.phi <= 1.0) {
            return Err(ForecastError::InvalidInput(format!(
                "phi must be in (0, 1], got {}",
                self.phi
            )));
        }
        if self.season != EtsSeasonKind::None && self.season_length < 2 {
            return Err(ForecastError::InvalidInput(
                "seasonal models require season_length > 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn has_trend(&self) -> bool {
        self.trend != EtsTrendKind::None
    }

    pub fn has_season(&self) -> bool {
        self.season != EtsSeasonKind::None
    }
}

/// Level-plus-trend composition used by both the forecast function and the
/// state update.
#[inline]
pub(crate) fn compose_base(config: &EtsConfig, level: f64, trend: f64) -> f64 {
    match config.trend {
        EtsTrendKind::None => level,
        EtsTrendKind::Additive => level + trend,
        EtsTrendKind::Multiplicative => level * trend.clamp(TREND_CLAMP_LO, TREND_CLAMP_HI),
        EtsTrendKind::DampedAdditive => level + config.phi * trend,
        EtsTrendKind::DampedMultiplicative => {
            level * trend.clamp(TREND_CLAMP_LO, TREND_CLAMP_HI).powf(config.phi)
        }
    }
}

/// One ETS state update. Mutates `level`, `trend`, and the seasonal slot in
/// place and returns `(fitted, innovation)`.
pub(crate) fn forward_step(
    config: &EtsConfig,
    observation: f64,
    level: &mut f64,
    trend: &mut f64,
    seasonals: &mut [f64],
    season_idx: usize,
) -> (f64, f64) {
    let error_additive = config.error == EtsErrorKind::Additive;

    let base = compose_base(config, *level, *trend);

    let seasonal = if config.has_season() {
        seasonals[season_idx]
    } else {
        0.0
    };
    let mut fitted = match config.season {
        EtsSeasonKind::None => base,
        EtsSeasonKind::Additive => base + seasonal,
        EtsSeasonKind::Multiplicative => base * seasonal,
    };
    fitted = clamp_positive(fitted);

    let innovation = if error_additive {
        observation - fitted
    } else {
        (safe_divide(observation, fitted) - 1.0).clamp(INNOVATION_CLAMP_LO, INNOVATION_CLAMP_HI)
    };

    let mut new_trend = *trend;
    let mut new_seasonal = seasonal;

    let new_level;
    if error_additive {
        new_level = base + config.alpha * innovation;

        if let Some(beta) = config.beta.filter(|_| config.has_trend()) {
            match config.trend {
                EtsTrendKind::Additive => new_trend = *trend + beta * innovation,
                EtsTrendKind::DampedAdditive => {
                    new_trend = config.phi * *trend + beta * innovation
                }
                _ => {}
            }
        }

        if let Some(gamma) = config.gamma.filter(|_| config.has_season()) {
            match config.season {
                EtsSeasonKind::Additive => new_seasonal = seasonal + gamma * innovation,
                EtsSeasonKind::Multiplicative => {
                    let update = 1.0 + gamma * safe_divide(innovation, base);
                    new_seasonal = (seasonal * update).clamp(SEASON_CLAMP_LO, SEASON_CLAMP_HI);
                }
                EtsSeasonKind::None => {}
            }
        }
    } else {
        new_level = base * (1.0 + config.alpha * innovation);
        let scale = base * innovation;

        if let Some(beta) = config.beta.filter(|_| config.has_trend()) {
            match config.trend {
                EtsTrendKind::Additive => new_trend = *trend + beta * scale,
                EtsTrendKind::DampedAdditive => new_trend = config.phi * *trend + beta * scale,
                _ => {}
            }
        }

        if let Some(gamma) = config.gamma.filter(|_| config.has_season()) {
            match config.season {
                EtsSeasonKind::Additive => new_seasonal = seasonal + gamma * scale,
                EtsSeasonKind::Multiplicative => {
                    new_seasonal = (seasonal * (1.0 + gamma * innovation))
                        .clamp(SEASON_CLAMP_LO, SEASON_CLAMP_HI);
                }
                EtsSeasonKind::None => {}
            }
        }
    }

    *level = new_level;
    if config.has_trend() {
        *trend = new_trend;
    }
    if config.has_season() {
        seasonals[season_idx] = new_seasonal;
    }

    (fitted, innovation)
}

/// Recorded trajectory of a forward pass.
///
/// Seasonal snapshots are flattened to a contiguous `(n + 1) x m` buffer
/// (row `t` is the state before processing observation `t`); the buffer is
/// empty for non-seasonal configurations.
#[derive(Debug, Clone, Default)]
pub struct ForwardPass {
    pub levels: Vec<f64>,
    pub trends: Vec<f64>,
    pub seasonal_states: Vec<f64>,
    pub fitted: Vec<f64>,
    pub innovations: Vec<f64>,
    pub innovation_sse: f64,
    pub sum_log_forecast: f64,
}

impl ForwardPass {
    /// Seasonal snapshot row `t` (state before observation `t`).
    pub fn seasonal_row(&self, t: usize, m: usize) -> &[f64] {
        &self.seasonal_states[t * m..(t + 1) * m]
    }
}

/// Run the forward recursion and record the full state trajectory.
pub fn run_forward(
    config: &EtsConfig,
    values: &[f64],
    level0: f64,
    trend0: f64,
    seasonal0: &[f64],
) -> ForwardPass {
    let n = values.len();
    let m = seasonal0.len();
    let has_season = config.has_season();

    let mut pass = ForwardPass {
        levels: Vec::with_capacity(n + 1),
        trends: Vec::with_capacity(n + 1),
        seasonal_states: if has_season {
            Vec::with_capacity((n + 1) * m)
        } else {
            Vec::new()
        },
        fitted: Vec::with_capacity(n),
        innovations: Vec::with_capacity(n),
        innovation_sse: 0.0,
        sum_log_forecast: 0.0,
    };

    let mut level = level0;
    let mut trend = trend0;
    let mut seasonals = seasonal0.to_vec();

    pass.levels.push(level);
    pass.trends.push(trend);
    if has_season {
        pass.seasonal_states.extend_from_slice(&seasonals);
    }

    for (t, &observation) in values.iter().enumerate() {
        let season_idx = if has_season { t % m } else { 0 };
        let (fitted, innovation) =
            forward_step(config, observation, &mut level, &mut trend, &mut seasonals, season_idx);

        pass.fitted.push(fitted);
        pass.innovations.push(innovation);
        pass.innovation_sse += innovation * innovation;
        if config.error == EtsErrorKind::Multiplicative {
            pass.sum_log_forecast += fitted.abs().ln();
        }

        pass.levels.push(level);
        pass.trends.push(trend);
        if has_season {
            pass.seasonal_states.extend_from_slice(&seasonals);
        }
    }

    pass
}

/// Negative log-likelihood of a recorded pass.
pub fn neg_log_likelihood(config: &EtsConfig, n: usize, pass_sse: f64, sum_log_forecast: f64) -> f64 {
    if n == 0 {
        return f64::INFINITY;
    }
    let sigma2 = pass_sse / n as f64;
    let mut nll = 0.5 * n as f64 * sigma2.max(ETS_EPSILON).ln();
    if config.error == EtsErrorKind::Multiplicative {
        nll += sum_log_forecast;
    }
    nll
}

/// Gradients of the negative log-likelihood.
#[derive(Debug, Clone, Copy, Default)]
pub struct GradientComponents {
    pub d_alpha: f64,
    pub d_beta: f64,
    pub d_gamma: f64,
    pub d_phi: f64,
    pub d_level0: f64,
    pub d_trend0: f64,
}

/// Per-step reverse-mode update shared by the eager and checkpointed
/// backward passes. `d_innovation` is the loss seed for this step;
/// `d_level_next` / `d_trend_next` / `d_seasonal_next` carry the gradients
/// of the step's *output* states and are replaced with the gradients of its
/// input states.
#[allow(clippy::too_many_arguments)]
pub(crate) fn backward_step(
    config: &EtsConfig,
    observation: f64,
    level: f64,
    trend: f64,
    seasonal: f64,
    fitted: f64,
    innovation: f64,
    d_innovation_seed: f64,
    d_level_next: &mut f64,
    d_trend_next: &mut f64,
    d_seasonal_slot: &mut f64,
    gradients: &mut GradientComponents,
) {
    let error_additive = config.error == EtsErrorKind::Additive;
    let base = compose_base(config, level, trend);

    let d_l1 = *d_level_next;
    let d_b1 = *d_trend_next;
    let d_s1 = *d_seasonal_slot;

    // Accumulators for the gradients of this step's input states.
    let mut d_e = d_innovation_seed;
    let mut d_base_accum = 0.0;
    let mut d_lev = 0.0;
    let mut d_trd = 0.0;
    let mut d_seas = 0.0;

    // State-update feedback must be folded into the innovation gradient
    // before the innovation itself is backpropagated into fitted/base.
    if error_additive {
        // level' = base + alpha * e
        d_base_accum += d_l1;
        d_e += config.alpha * d_l1;
        gradients.d_alpha += innovation * d_l1;

        if config.has_trend() {
            match (config.trend, config.beta) {
                (EtsTrendKind::Additive, Some(beta)) => {
                    d_trd += d_b1;
                    d_e += beta * d_b1;
                    gradients.d_beta += innovation * d_b1;
                }
                (EtsTrendKind::DampedAdditive, Some(beta)) => {
                    d_trd += config.phi * d_b1;
                    d_e += beta * d_b1;
                    gradients.d_beta += innovation * d_b1;
                    gradients.d_phi += trend * d_b1;
                }
                _ => d_trd += d_b1,
            }
        }

        if config.has_season() {
            match (config.season, config.gamma) {
                (EtsSeasonKind::Additive, Some(gamma)) => {
                    d_seas += d_s1;
                    d_e += gamma * d_s1;
                    gradients.d_gamma += innovation * d_s1;
                }
                (EtsSeasonKind::Multiplicative, Some(gamma)) => {
                    let ratio = safe_divide(innovation, base);
                    let update = 1.0 + gamma * ratio;
                    d_seas += update * d_s1;
                    gradients.d_gamma += seasonal * ratio * d_s1;
                    d_e += seasonal * gamma * safe_divide(1.0, base) * d_s1;
                    d_base_accum -= seasonal * gamma * safe_divide(innovation, base * base) * d_s1;
                }
                _ => d_seas += d_s1,
            }
        }
    } else {
        // level' = base * (1 + alpha * e)
        d_base_accum += (1.0 + config.alpha * innovation) * d_l1;
        d_e += base * config.alpha * d_l1;
        gradients.d_alpha += base * innovation * d_l1;

        if config.has_trend() {
            match (config.trend, config.beta) {
                (EtsTrendKind::Additive, Some(beta)) => {
                    d_trd += d_b1;
                    gradients.d_beta += base * innovation * d_b1;
                    d_base_accum += beta * innovation * d_b1;
                    d_e += beta * base * d_b1;
                }
                (EtsTrendKind::DampedAdditive, Some(beta)) => {
                    d_trd += config.phi * d_b1;
                    gradients.d_beta += base * innovation * d_b1;
                    d_base_accum += beta * innovation * d_b1;
                    d_e += beta * base * d_b1;
                    gradients.d_phi += trend * d_b1;
                }
                _ => d_trd += d_b1,
            }
        }

        if config.has_season() {
            match (config.season, config.gamma) {
                (EtsSeasonKind::Additive, Some(gamma)) => {
                    d_seas += d_s1;
                    gradients.d_gamma += base * innovation * d_s1;
                    d_base_accum += gamma * innovation * d_s1;
                    d_e += gamma * base * d_s1;
                }
                (EtsSeasonKind::Multiplicative, Some(gamma)) => {
                    d_seas += (1.0 + gamma * innovation) * d_s1;
                    gradients.d_gamma += seasonal * innovation * d_s1;
                    d_e += seasonal * gamma * d_s1;
                }
                _ => d_seas += d_s1,
            }
        }
    }

    // Innovation -> fitted, plus the log-term seed for multiplicative errors.
    // The positive floor on fitted keeps the log term on its positive branch.
    let d_fitted = if error_additive {
        -d_e
    } else {
        d_e * (-observation / (fitted * fitted)) + 1.0 / fitted
    };

    // Fitted -> base and seasonal.
    let d_base = match config.season {
        EtsSeasonKind::None => d_fitted + d_base_accum,
        EtsSeasonKind::Additive => {
            d_seas += d_fitted;
            d_fitted + d_base_accum
        }
        EtsSeasonKind::Multiplicative => {
            d_seas += d_fitted * base;
            d_fitted * seasonal + d_base_accum
        }
    };

    // Base -> level and trend.
    match config.trend {
        EtsTrendKind::None => d_lev += d_base,
        EtsTrendKind::Additive => {
            d_lev += d_base;
            d_trd += d_base;
        }
        EtsTrendKind::DampedAdditive => {
            d_lev += d_base;
            d_trd += config.phi * d_base;
            gradients.d_phi += trend * d_base;
        }
        EtsTrendKind::Multiplicative => {
            let clamped = trend.clamp(TREND_CLAMP_LO, TREND_CLAMP_HI);
            d_lev += d_base * clamped;
            d_trd += d_base * level;
        }
        EtsTrendKind::DampedMultiplicative => {
            let clamped = trend.clamp(TREND_CLAMP_LO, TREND_CLAMP_HI);
            let powed = clamped.powf(config.phi);
            d_lev += d_base * powed;
            d_trd += d_base * level * config.phi * clamped.powf(config.phi - 1.0);
            gradients.d_phi += d_base * level * powed * clamped.ln();
        }
    }

    *d_level_next = d_lev;
    *d_trend_next = d_trd;
    *d_seasonal_slot = d_seas;
}

/// Backward pass over a fully recorded forward trajectory.
pub fn run_backward(
    config: &EtsConfig,
    values: &[f64],
    forward: &ForwardPass,
    gradients: &mut GradientComponents,
) {
    let n = values.len();
    if n == 0 {
        return;
    }
    let m = config.season_length.max(1);
    let has_season = config.has_season();

    let sigma2 = (forward.innovation_sse / n as f64).max(ETS_EPSILON);

    // Loss seed: d(nll)/d(e_t) = e_t / sigma^2.
    let mut d_innovations = vec![0.0; n];
    simd::normalize(&mut d_innovations, &forward.innovations, sigma2);

    let mut d_level = 0.0;
    let mut d_trend = 0.0;
    let mut d_seasonal = vec![0.0; if has_season { m } else { 1 }];

    for t in (0..n).rev() {
        let season_idx = if has_season { t % m } else { 0 };
        let seasonal = if has_season {
            forward.seasonal_row(t, m)[season_idx]
        } else {
            0.0
        };

        backward_step(
            config,
            values[t],
            forward.levels[t],
            forward.trends[t],
            seasonal,
            forward.fitted[t],
            forward.innovations[t],
            d_innovations[t],
            &mut d_level,
            &mut d_trend,
            &mut d_seasonal[season_idx],
            gradients,
        );
    }

    gradients.d_level0 = d_level;
    gradients.d_trend0 = if config.has_trend() { d_trend } else { 0.0 };
}

/// Negative log-likelihood and its gradients. For long series this routes
/// through the checkpointed backward pass to cap memory; short series keep
/// the full trajectory.
pub fn neg_log_likelihood_with_gradients(
    config: &EtsConfig,
    values: &[f64],
    level0: f64,
    trend0: f64,
    seasonal0: &[f64],
    gradients: &mut GradientComponents,
) -> f64 {
    *gradients = GradientComponents::default();

    let n = values.len();
    if n == 0 {
        return f64::INFINITY;
    }

    let checkpoint_config = crate::ets_checkpoint::CheckpointConfig::default();
    if crate::ets_checkpoint::should_use_checkpointing(n, config, &checkpoint_config) {
        return crate::ets_checkpoint::neg_log_likelihood_with_gradients_checkpointed(
            config,
            values,
            level0,
            trend0,
            seasonal0,
            &checkpoint_config,
            gradients,
        );
    }

    let forward = run_forward(config, values, level0, trend0, seasonal0);
    let nll = neg_log_likelihood(config, n, forward.innovation_sse, forward.sum_log_forecast);
    run_backward(config, values, &forward, gradients);
    nll
}

#[cfg(test)]
mod tests {
    use super::*;

    fn synthetic_series(n: usize) -> Vec<f64> {
        // Positive, gently trending, weakly seasonal, deterministic "noise".
        (0..n)
            .map(|t| {
                let tf = t as f64;
                10.0 + 0.01 * tf
                    + 0.5 * (2.0 * std::f64::consts::PI * tf / 12.0).sin()
                    + 0.1 * ((t * 7919 % 100) as f64 / 100.0 - 0.5)
            })
            .collect()
    }

    fn config_for(error: EtsErrorKind, trend: EtsTrendKind, season: EtsSeasonKind) -> EtsConfig {
        let seasonal = season != EtsSeasonKind::None;
        EtsConfig {
            error,
            trend,
            season,
            season_length: if seasonal { 12 } else { 1 },
            alpha: 0.1,
            beta: if trend == EtsTrendKind::None {
                None
            } else {
                Some(0.05)
            },
            gamma: if seasonal { Some(0.05) } else { None },
            phi: 0.97,
        }
    }

    fn initial_state(config: &EtsConfig, values: &[f64]) -> (f64, f64, Vec<f64>) {
        let level0 = values[0];
        let trend0 = match config.trend {
            EtsTrendKind::Multiplicative | EtsTrendKind::DampedMultiplicative => 1.001,
            EtsTrendKind::None => 0.0,
            _ => 0.01,
        };
        let seasonal0 = match config.season {
            EtsSeasonKind::None => vec![],
            EtsSeasonKind::Additive => vec![0.0; config.season_length],
            EtsSeasonKind::Multiplicative => vec![1.0; config.season_length],
        };
        (level0, trend0, seasonal0)
    }

    fn nll_at(
        config: &EtsConfig,
        values: &[f64],
        level0: f64,
        trend0: f64,
        seasonal0: &[f64],
    ) -> f64 {
        let forward = run_forward(config, values, level0, trend0, seasonal0);
        neg_log_likelihood(config, values.len(), forward.innovation_sse, forward.sum_log_forecast)
    }

    fn all_kind_triples() -> Vec<(EtsErrorKind, EtsTrendKind, EtsSeasonKind)> {
        let errors = [EtsErrorKind::Additive, EtsErrorKind::Multiplicative];
        let trends = [
            EtsTrendKind::None,
            EtsTrendKind::Additive,
            EtsTrendKind::DampedAdditive,
            EtsTrendKind::Multiplicative,
            EtsTrendKind::DampedMultiplicative,
        ];
        let seasons = [
            EtsSeasonKind::None,
            EtsSeasonKind::Additive,
            EtsSeasonKind::Multiplicative,
        ];
        let mut out = Vec::new();
        for &e in &errors {
            for &t in &trends {
                for &s in &seasons {
                    out.push((e, t, s));
                }
            }
        }
        out
    }

    #[test]
    fn test_empty_series_is_infinite_with_zero_gradients() {
        let config = config_for(EtsErrorKind::Additive, EtsTrendKind::None, EtsSeasonKind::None);
        let mut grads = GradientComponents::default();
        let nll = neg_log_likelihood_with_gradients(&config, &[], 1.0, 0.0, &[], &mut grads);
        assert!(nll.is_infinite());
        assert_eq!(grads.d_alpha, 0.0);
        assert_eq!(grads.d_level0, 0.0);
    }

    #[test]
    fn test_forward_records_full_trajectory() {
        let config = config_for(
            EtsErrorKind::Additive,
            EtsTrendKind::Additive,
            EtsSeasonKind::Additive,
        );
        let values = synthetic_series(50);
        let (l0, b0, s0) = initial_state(&config, &values);
        let pass = run_forward(&config, &values, l0, b0, &s0);

        assert_eq!(pass.levels.len(), 51);
        assert_eq!(pass.trends.len(), 51);
        assert_eq!(pass.fitted.len(), 50);
        assert_eq!(pass.innovations.len(), 50);
        assert_eq!(pass.seasonal_states.len(), 51 * 12);
        assert!(pass.innovation_sse >= 0.0);
    }

    #[test]
    fn test_analytical_gradients_match_finite_differences() {
        // Central finite differences on a 1000-point series, every kind triple.
        let values = synthetic_series(1000);
        let h = 1e-6;

        for (error, trend, season) in all_kind_triples() {
            let config = config_for(error, trend, season);
            let (l0, b0, s0) = initial_state(&config, &values);

            let mut grads = GradientComponents::default();
            let forward = run_forward(&config, &values, l0, b0, &s0);
            run_backward(&config, &values, &forward, &mut grads);

            let check = |analytical: f64, numerical: f64, label: &str| {
                let denom = numerical.abs().max(1.0);
                assert!(
                    (analytical - numerical).abs() / denom <= 1e-4,
                    "{:?}/{:?}/{:?} {}: analytical {} vs numerical {}",
                    error,
                    trend,
                    season,
                    label,
                    analytical,
                    numerical
                );
            };

            // alpha
            let mut cfg = config.clone();
            cfg.alpha = config.alpha + h;
            let up = nll_at(&cfg, &values, l0, b0, &s0);
            cfg.alpha = config.alpha - h;
            let down = nll_at(&cfg, &values, l0, b0, &s0);
            check(grads.d_alpha, (up - down) / (2.0 * h), "alpha");

            // beta
            if let Some(beta) = config.beta {
                if matches!(trend, EtsTrendKind::Additive | EtsTrendKind::DampedAdditive) {
                    let mut cfg = config.clone();
                    cfg.beta = Some(beta + h);
                    let up = nll_at(&cfg, &values, l0, b0, &s0);
                    cfg.beta = Some(beta - h);
                    let down = nll_at(&cfg, &values, l0, b0, &s0);
                    check(grads.d_beta, (up - down) / (2.0 * h), "beta");
                }
            }

            // gamma
            if let Some(gamma) = config.gamma {
                let mut cfg = config.clone();
                cfg.gamma = Some(gamma + h);
                let up = nll_at(&cfg, &values, l0, b0, &s0);
                cfg.gamma = Some(gamma - h);
                let down = nll_at(&cfg, &values, l0, b0, &s0);
                check(grads.d_gamma, (up - down) / (2.0 * h), "gamma");
            }

            // phi
            if trend.is_damped() {
                let mut cfg = config.clone();
                cfg.phi = config.phi + h;
                let up = nll_at(&cfg, &values, l0, b0, &s0);
                cfg.phi = config.phi - h;
                let down = nll_at(&cfg, &values, l0, b0, &s0);
                check(grads.d_phi, (up - down) / (2.0 * h), "phi");
            }

            // initial level
            let up = nll_at(&config, &values, l0 + h, b0, &s0);
            let down = nll_at(&config, &values, l0 - h, b0, &s0);
            check(grads.d_level0, (up - down) / (2.0 * h), "level0");

            // initial trend
            if trend != EtsTrendKind::None {
                let up = nll_at(&config, &values, l0, b0 + h, &s0);
                let down = nll_at(&config, &values, l0, b0 - h, &s0);
                check(grads.d_trend0, (up - down) / (2.0 * h), "trend0");
            }
        }
    }

    #[test]
    fn test_validate_rejects_bad_parameters() {
        let mut config = config_for(EtsErrorKind::Additive, EtsTrendKind::None, EtsSeasonKind::None);
        assert!(config.validate().is_ok());
        config.alpha = 0.0;
        assert!(config.validate().is_err());
        config.alpha = 0.3;
        config.beta = Some(1.5);
        assert!(config.validate().is_err());
    }
}

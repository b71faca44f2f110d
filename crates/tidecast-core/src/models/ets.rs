//! ETS forecaster: maximum-likelihood fit through the gradient engine,
//! plus automatic specification search.

use crate::error::{ForecastError, Result};
use crate::ets::{
    neg_log_likelihood_with_gradients, run_forward, EtsConfig, EtsErrorKind, EtsSeasonKind,
    EtsTrendKind, GradientComponents,
};
use crate::lbfgs;
use crate::series::TimeSeries;

use super::{check_horizon, check_min_length, interval_z, not_fitted, Forecast, Forecaster};

#[derive(Debug, Clone)]
struct FittedEts {
    config: EtsConfig,
    level: f64,
    trend: f64,
    seasonals: Vec<f64>,
    sigma2: f64,
    n_observed: usize,
    fitted: Vec<f64>,
    residuals: Vec<f64>,
    nll: f64,
    aic: f64,
    converged: bool,
}

/// Which parameters the optimizer tunes, in vector order.
#[derive(Debug, Clone, Copy)]
struct ParamLayout {
    has_beta: bool,
    has_gamma: bool,
    has_phi: bool,
    has_trend0: bool,
}

impl ParamLayout {
    fn for_config(config: &EtsConfig) -> Self {
        let trend_updates = matches!(
            config.trend,
            EtsTrendKind::Additive | EtsTrendKind::DampedAdditive
        );
        Self {
            has_beta: trend_updates,
            has_gamma: config.has_season(),
            has_phi: config.trend.is_damped(),
            has_trend0: config.has_trend(),
        }
    }

    fn len(&self) -> usize {
        // alpha and level0 are always present.
        2 + self.has_beta as usize
            + self.has_gamma as usize
            + self.has_phi as usize
            + self.has_trend0 as usize
    }
}

fn initial_states(config: &EtsConfig, values: &[f64]) -> (f64, f64, Vec<f64>) {
    let m = config.season_length;
    let n = values.len();

    let (level0, seasonal0) = if config.has_season() && n >= m {
        let season_mean: f64 = values[..m].iter().sum::<f64>() / m as f64;
        let seasonal = match config.season {
            EtsSeasonKind::Additive => values[..m].iter().map(|v| v - season_mean).collect(),
            EtsSeasonKind::Multiplicative => values[..m]
                .iter()
                .map(|v| (v / season_mean.max(1e-3)).clamp(0.1, 10.0))
                .collect(),
            EtsSeasonKind::None => vec![],
        };
        (season_mean, seasonal)
    } else {
        (values[0], vec![])
    };

    let trend0 = match config.trend {
        EtsTrendKind::None => 0.0,
        EtsTrendKind::Multiplicative | EtsTrendKind::DampedMultiplicative => 1.0,
        _ => {
            if n >= 2 {
                (values[n - 1] - values[0]) / (n - 1) as f64
            } else {
                0.0
            }
        }
    };

    (level0, trend0, seasonal0)
}

fn pack(
    layout: &ParamLayout,
    config: &EtsConfig,
    level0: f64,
    trend0: f64,
) -> (Vec<f64>, Vec<f64>, Vec<f64>) {
    let mut x = vec![config.alpha, level0];
    let mut lower = vec![1e-4, f64::NEG_INFINITY];
    let mut upper = vec![1.0, f64::INFINITY];

    if layout.has_beta {
        x.push(config.beta.unwrap_or(0.1));
        lower.push(0.0);
        upper.push(1.0);
    }
    if layout.has_gamma {
        x.push(config.gamma.unwrap_or(0.1));
        lower.push(0.0);
        upper.push(1.0);
    }
    if layout.has_phi {
        x.push(config.phi);
        lower.push(0.8);
        upper.push(0.999);
    }
    if layout.has_trend0 {
        x.push(trend0);
        match config.trend {
            EtsTrendKind::Multiplicative | EtsTrendKind::DampedMultiplicative => {
                lower.push(0.011);
                upper.push(9.9);
            }
            _ => {
                lower.push(f64::NEG_INFINITY);
                upper.push(f64::INFINITY);
            }
        }
    }

    (x, lower, upper)
}

fn unpack(layout: &ParamLayout, template: &EtsConfig, x: &[f64]) -> (EtsConfig, f64, f64) {
    let mut config = template.clone();
    let mut idx = 0;

    config.alpha = x[idx];
    idx += 1;
    let level0 = x[idx];
    idx += 1;

    if layout.has_beta {
        config.beta = Some(x[idx]);
        idx += 1;
    }
    if layout.has_gamma {
        config.gamma = Some(x[idx]);
        idx += 1;
    }
    if layout.has_phi {
        config.phi = x[idx];
        idx += 1;
    }
    let trend0 = if layout.has_trend0 { x[idx] } else { 0.0 };

    (config, level0, trend0)
}

fn fit_ets(config: &EtsConfig, values: &[f64]) -> Result<FittedEts> {
    let n = values.len();
    let layout = ParamLayout::for_config(config);
    let (level0_init, trend0_init, seasonal0) = initial_states(config, values);
    let (x0, lower, upper) = pack(&layout, config, level0_init, trend0_init);

    let mut gradients = GradientComponents::default();
    let objective = |x: &[f64], grad: &mut [f64]| {
        let (candidate, level0, trend0) = unpack(&layout, config, x);
        let nll = neg_log_likelihood_with_gradients(
            &candidate,
            values,
            level0,
            trend0,
            &seasonal0,
            &mut gradients,
        );

        let mut idx = 0;
        grad[idx] = gradients.d_alpha;
        idx += 1;
        grad[idx] = gradients.d_level0;
        idx += 1;
        if layout.has_beta {
            grad[idx] = gradients.d_beta;
            idx += 1;
        }
        if layout.has_gamma {
            grad[idx] = gradients.d_gamma;
            idx += 1;
        }
        if layout.has_phi {
            grad[idx] = gradients.d_phi;
            idx += 1;
        }
        if layout.has_trend0 {
            grad[idx] = gradients.d_trend0;
        }

        nll
    };

    let result = lbfgs::minimize(objective, &x0, &lower, &upper, &lbfgs::Options::default())?;

    if !result.fx.is_finite() {
        return Err(ForecastError::NumericFailure(
            "ETS likelihood is not finite at the optimum".to_string(),
        ));
    }

    let (fitted_config, level0, trend0) = unpack(&layout, config, &result.x);
    let forward = run_forward(&fitted_config, values, level0, trend0, &seasonal0);

    let sigma2 = (forward.innovation_sse / n as f64).max(1e-12);
    let residuals: Vec<f64> = values
        .iter()
        .zip(forward.fitted.iter())
        .map(|(y, f)| y - f)
        .collect();

    // Free parameters plus seasonal initials plus the innovation variance.
    let k = layout.len() + if fitted_config.has_season() {
        fitted_config.season_length
    } else {
        0
    } + 1;
    let aic = 2.0 * k as f64 + 2.0 * result.fx;

    let m = fitted_config.season_length.max(1);
    let final_seasonals = if fitted_config.has_season() {
        forward.seasonal_row(n, m).to_vec()
    } else {
        vec![]
    };

    Ok(FittedEts {
        level: forward.levels[n],
        trend: forward.trends[n],
        seasonals: final_seasonals,
        sigma2,
        n_observed: n,
        fitted: forward.fitted,
        residuals,
        nll: result.fx,
        aic,
        converged: result.converged,
        config: fitted_config,
    })
}

fn predict_ets(state: &FittedEts, horizon: usize, confidence_level: f64, name: &str) -> Forecast {
    let config = &state.config;
    let m = config.season_length.max(1);

    let mut point = Vec::with_capacity(horizon);
    let mut phi_sum = 0.0;
    for h in 1..=horizon {
        let base = match config.trend {
            EtsTrendKind::None => state.level,
            EtsTrendKind::Additive => state.level + h as f64 * state.trend,
            EtsTrendKind::DampedAdditive => {
                phi_sum += config.phi.powi(h as i32);
                state.level + phi_sum * state.trend
            }
            EtsTrendKind::Multiplicative => {
                state.level * state.trend.clamp(0.01, 10.0).powi(h as i32)
            }
            EtsTrendKind::DampedMultiplicative => {
                phi_sum += config.phi.powi(h as i32);
                state.level * state.trend.clamp(0.01, 10.0).powf(phi_sum)
            }
        };
        let value = match config.season {
            EtsSeasonKind::None => base,
            EtsSeasonKind::Additive => base + state.seasonals[(state.n_observed + h - 1) % m],
            EtsSeasonKind::Multiplicative => base * state.seasonals[(state.n_observed + h - 1) % m],
        };
        point.push(value);
    }

    // Variance growth approximation for the interval width; exact class
    // formulas exist only for a subset of specifications.
    let z = interval_z(confidence_level);
    let sigma = state.sigma2.sqrt();
    let mut lower = Vec::with_capacity(horizon);
    let mut upper = Vec::with_capacity(horizon);
    for (h, p) in point.iter().enumerate() {
        let growth = (1.0 + h as f64 * config.alpha * config.alpha).sqrt();
        let width = match config.error {
            EtsErrorKind::Additive => z * sigma * growth,
            EtsErrorKind::Multiplicative => z * sigma * growth * p.abs(),
        };
        lower.push(p - width);
        upper.push(p + width);
    }

    let mut forecast = Forecast::new(point, name);
    forecast.lower = Some(lower);
    forecast.upper = Some(upper);
    forecast.fitted = Some(state.fitted.clone());
    forecast.residuals = Some(state.residuals.clone());
    forecast
}

fn min_length(config: &EtsConfig) -> usize {
    if config.has_season() {
        (2 * config.season_length).max(3)
    } else {
        3
    }
}

/// ETS model with an explicit specification.
#[derive(Debug)]
pub struct Ets {
    template: EtsConfig,
    confidence_level: f64,
    strict: bool,
    state: Option<FittedEts>,
}

impl Ets {
    pub fn new(config: EtsConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            template: config,
            confidence_level: 0.95,
            strict: false,
            state: None,
        })
    }

    /// In strict mode a fit that misses the optimizer tolerances is an
    /// error instead of a best-iterate result.
    pub fn with_strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    pub fn with_confidence_level(mut self, confidence_level: f64) -> Result<Self> {
        if !(0.0 < confidence_level && confidence_level < 1.0) {
            return Err(ForecastError::InvalidInput(format!(
                "confidence_level must be in (0, 1), got {}",
                confidence_level
            )));
        }
        self.confidence_level = confidence_level;
        Ok(self)
    }

    /// Whether the last fit met the optimizer tolerances.
    pub fn converged(&self) -> Option<bool> {
        self.state.as_ref().map(|s| s.converged)
    }

    /// AIC of the fitted model.
    pub fn aic(&self) -> Option<f64> {
        self.state.as_ref().map(|s| s.aic)
    }
}

impl Forecaster for Ets {
    fn fit(&mut self, ts: &TimeSeries) -> Result<()> {
        check_min_length(self.name(), min_length(&self.template), ts.len())?;
        let state = crate::perf::timed("ets_fit", || fit_ets(&self.template, ts.values()))?;
        if !state.converged {
            if self.strict {
                return Err(ForecastError::NotConverged(format!(
                    "ETS fit stopped at nll = {:.4} without meeting tolerances",
                    state.nll
                )));
            }
            log::debug!(
                "ETS fit did not converge (nll = {:.4}); keeping best iterate",
                state.nll
            );
        }
        self.state = Some(state);
        Ok(())
    }

    fn predict(&self, horizon: usize) -> Result<Forecast> {
        check_horizon(horizon)?;
        let state = self.state.as_ref().ok_or_else(|| not_fitted(self.name()))?;
        Ok(predict_ets(state, horizon, self.confidence_level, self.name()))
    }

    fn name(&self) -> &str {
        "ETS"
    }
}

/// Parse a 3- or 4-character specification pattern like `AAA`, `MNM`,
/// `AAdN` or `ZZZ` (Z = search that component).
fn parse_spec_pattern(pattern: &str) -> Result<(char, char, bool, char)> {
    let chars: Vec<char> = pattern.chars().collect();
    let ok = match chars.len() {
        3 => {
            matches!(chars[0], 'A' | 'M' | 'Z')
                && matches!(chars[1], 'N' | 'A' | 'M' | 'Z')
                && matches!(chars[2], 'N' | 'A' | 'M' | 'Z')
        }
        4 => {
            matches!(chars[0], 'A' | 'M' | 'Z')
                && matches!(chars[1], 'A' | 'M' | 'Z')
                && chars[2] == 'd'
                && matches!(chars[3], 'N' | 'A' | 'M' | 'Z')
        }
        _ => false,
    };
    if !ok {
        return Err(ForecastError::InvalidInput(format!(
            "invalid ETS specification '{}'; expected notation like 'AAA', 'MNM', 'AAdN' or 'ZZZ'",
            pattern
        )));
    }
    if chars.len() == 3 {
        Ok((chars[0], chars[1], false, chars[2]))
    } else {
        Ok((chars[0], chars[1], true, chars[3]))
    }
}

/// Automatic ETS: fits every admissible specification matching the pattern
/// and keeps the lowest-AIC fit.
#[derive(Debug)]
pub struct AutoEts {
    season_length: usize,
    pattern: String,
    confidence_level: f64,
    state: Option<FittedEts>,
    chosen: Option<String>,
}

impl AutoEts {
    pub fn new(season_length: usize, pattern: &str) -> Result<Self> {
        if season_length == 0 {
            return Err(ForecastError::InvalidInput(
                "season_length must be positive".to_string(),
            ));
        }
        parse_spec_pattern(pattern)?;
        Ok(Self {
            season_length,
            pattern: pattern.to_string(),
            confidence_level: 0.95,
            state: None,
            chosen: None,
        })
    }

    pub fn with_confidence_level(mut self, confidence_level: f64) -> Result<Self> {
        if !(0.0 < confidence_level && confidence_level < 1.0) {
            return Err(ForecastError::InvalidInput(format!(
                "confidence_level must be in (0, 1), got {}",
                confidence_level
            )));
        }
        self.confidence_level = confidence_level;
        Ok(self)
    }

    /// Short name of the selected specification, e.g. `AAdN`.
    pub fn chosen_spec(&self) -> Option<&str> {
        self.chosen.as_deref()
    }

    fn candidates(&self, n: usize) -> Result<Vec<EtsConfig>> {
        let (err_pat, trend_pat, damped_only, season_pat) = parse_spec_pattern(&self.pattern)?;

        let errors: Vec<EtsErrorKind> = match err_pat {
            'A' => vec![EtsErrorKind::Additive],
            'M' => vec![EtsErrorKind::Multiplicative],
            _ => vec![EtsErrorKind::Additive, EtsErrorKind::Multiplicative],
        };
        let trends: Vec<EtsTrendKind> = match (trend_pat, damped_only) {
            ('N', _) => vec![EtsTrendKind::None],
            ('A', false) => vec![EtsTrendKind::Additive],
            ('A', true) => vec![EtsTrendKind::DampedAdditive],
            ('M', false) => vec![EtsTrendKind::Multiplicative],
            ('M', true) => vec![EtsTrendKind::DampedMultiplicative],
            _ => vec![
                EtsTrendKind::None,
                EtsTrendKind::Additive,
                EtsTrendKind::DampedAdditive,
            ],
        };
        let seasonal_possible = self.season_length > 1 && n >= 2 * self.season_length;
        let seasons: Vec<EtsSeasonKind> = match season_pat {
            'N' => vec![EtsSeasonKind::None],
            'A' if seasonal_possible => vec![EtsSeasonKind::Additive],
            'M' if seasonal_possible => vec![EtsSeasonKind::Multiplicative],
            'A' | 'M' => {
                return Err(ForecastError::InvalidInput(format!(
                    "seasonal specification '{}' needs at least two full seasons ({} points)",
                    self.pattern,
                    2 * self.season_length
                )))
            }
            _ => {
                let mut s = vec![EtsSeasonKind::None];
                if seasonal_possible {
                    s.push(EtsSeasonKind::Additive);
                    s.push(EtsSeasonKind::Multiplicative);
                }
                s
            }
        };

        let mut out = Vec::new();
        for &error in &errors {
            for &trend in &trends {
                for &season in &seasons {
                    if !is_stable_combination(error, trend, season) {
                        continue;
                    }
                    out.push(EtsConfig {
                        error,
                        trend,
                        season,
                        season_length: if season == EtsSeasonKind::None {
                            1
                        } else {
                            self.season_length
                        },
                        alpha: 0.2,
                        beta: Some(0.1),
                        gamma: Some(0.1),
                        phi: 0.98,
                    });
                }
            }
        }
        Ok(out)
    }
}

/// Reject specifications the taxonomy marks unstable: multiplicative error
/// with additive trend and additive seasonality, and additive error with
/// multiplicative seasonality.
fn is_stable_combination(error: EtsErrorKind, trend: EtsTrendKind, season: EtsSeasonKind) -> bool {
    let additive_trend = matches!(
        trend,
        EtsTrendKind::Additive | EtsTrendKind::DampedAdditive
    );
    if error == EtsErrorKind::Multiplicative && additive_trend && season == EtsSeasonKind::Additive
    {
        return false;
    }
    if error == EtsErrorKind::Additive && season == EtsSeasonKind::Multiplicative {
        return false;
    }
    true
}

fn spec_short_name(config: &EtsConfig) -> String {
    let e = match config.error {
        EtsErrorKind::Additive => 'A',
        EtsErrorKind::Multiplicative => 'M',
    };
    let t = match config.trend {
        EtsTrendKind::None => "N".to_string(),
        EtsTrendKind::Additive => "A".to_string(),
        EtsTrendKind::Multiplicative => "M".to_string(),
        EtsTrendKind::DampedAdditive => "Ad".to_string(),
        EtsTrendKind::DampedMultiplicative => "Md".to_string(),
    };
    let s = match config.season {
        EtsSeasonKind::None => 'N',
        EtsSeasonKind::Additive => 'A',
        EtsSeasonKind::Multiplicative => 'M',
    };
    format!("{}{}{}", e, t, s)
}

impl Forecaster for AutoEts {
    fn fit(&mut self, ts: &TimeSeries) -> Result<()> {
        check_min_length(self.name(), 3, ts.len())?;
        let values = ts.values();

        let mut best: Option<FittedEts> = None;
        for candidate in self.candidates(ts.len())? {
            if values.len() < min_length(&candidate) {
                continue;
            }
            match fit_ets(&candidate, values) {
                Ok(fitted) => {
                    if fitted.aic.is_finite()
                        && best.as_ref().map(|b| fitted.aic < b.aic).unwrap_or(true)
                    {
                        best = Some(fitted);
                    }
                }
                Err(err) => {
                    log::debug!(
                        "AutoETS candidate {} failed: {}",
                        spec_short_name(&candidate),
                        err
                    );
                }
            }
        }

        let best = best.ok_or_else(|| {
            ForecastError::NumericFailure("no ETS specification could be fitted".to_string())
        })?;
        self.chosen = Some(spec_short_name(&best.config));
        self.state = Some(best);
        Ok(())
    }

    fn predict(&self, horizon: usize) -> Result<Forecast> {
        check_horizon(horizon)?;
        let state = self.state.as_ref().ok_or_else(|| not_fitted(self.name()))?;
        Ok(predict_ets(state, horizon, self.confidence_level, self.name()))
    }

    fn name(&self) -> &str {
        "AutoETS"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::series::TimeSeriesBuilder;

    fn series(values: Vec<f64>) -> TimeSeries {
        TimeSeriesBuilder::new().values(values).build().unwrap()
    }

    fn trending_seasonal(n: usize) -> Vec<f64> {
        (0..n)
            .map(|t| {
                let tf = t as f64;
                20.0 + 0.1 * tf + 2.0 * (2.0 * std::f64::consts::PI * tf / 12.0).sin()
            })
            .collect()
    }

    #[test]
    fn test_ets_fit_predict_horizon_and_bounds() {
        let config = EtsConfig {
            error: EtsErrorKind::Additive,
            trend: EtsTrendKind::Additive,
            season: EtsSeasonKind::None,
            season_length: 1,
            alpha: 0.2,
            beta: Some(0.1),
            gamma: None,
            phi: 0.98,
        };
        let mut model = Ets::new(config).unwrap();
        model.fit(&series(trending_seasonal(60))).unwrap();
        let forecast = model.predict(8).unwrap();

        assert_eq!(forecast.point.len(), 8);
        let lower = forecast.lower.as_ref().unwrap();
        let upper = forecast.upper.as_ref().unwrap();
        assert_eq!(lower.len(), 8);
        assert_eq!(upper.len(), 8);
        for i in 0..8 {
            assert!(lower[i] <= forecast.point[i] && forecast.point[i] <= upper[i]);
        }
    }

    #[test]
    fn test_ets_improves_on_initial_likelihood() {
        let config = EtsConfig {
            error: EtsErrorKind::Additive,
            trend: EtsTrendKind::None,
            season: EtsSeasonKind::None,
            season_length: 1,
            alpha: 0.5,
            beta: None,
            gamma: None,
            phi: 0.98,
        };
        let values = trending_seasonal(120);
        let state = fit_ets(&config, &values).unwrap();
        assert!(state.nll.is_finite());
        assert!(state.sigma2 > 0.0);
        assert_eq!(state.fitted.len(), 120);
    }

    #[test]
    fn test_ets_not_fitted() {
        let config = EtsConfig {
            error: EtsErrorKind::Additive,
            trend: EtsTrendKind::None,
            season: EtsSeasonKind::None,
            season_length: 1,
            alpha: 0.2,
            beta: None,
            gamma: None,
            phi: 0.98,
        };
        let model = Ets::new(config).unwrap();
        assert!(matches!(
            model.predict(3),
            Err(ForecastError::NotFitted(_))
        ));
    }

    #[test]
    fn test_auto_ets_selects_and_reports_spec() {
        let mut model = AutoEts::new(12, "ZZZ").unwrap();
        model.fit(&series(trending_seasonal(96))).unwrap();
        let forecast = model.predict(12).unwrap();
        assert_eq!(forecast.point.len(), 12);
        assert_eq!(forecast.model_name, "AutoETS");
        assert!(model.chosen_spec().is_some());
    }

    #[test]
    fn test_auto_ets_rejects_bad_pattern() {
        assert!(AutoEts::new(12, "QQQ").is_err());
        assert!(AutoEts::new(12, "AAAAA").is_err());
        assert!(AutoEts::new(0, "ZZZ").is_err());
    }

    #[test]
    fn test_unstable_combinations_filtered() {
        assert!(!is_stable_combination(
            EtsErrorKind::Multiplicative,
            EtsTrendKind::Additive,
            EtsSeasonKind::Additive
        ));
        assert!(!is_stable_combination(
            EtsErrorKind::Additive,
            EtsTrendKind::None,
            EtsSeasonKind::Multiplicative
        ));
        assert!(is_stable_combination(
            EtsErrorKind::Additive,
            EtsTrendKind::Additive,
            EtsSeasonKind::Additive
        ));
    }
}

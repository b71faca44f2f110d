//! Model factory: a pure function from `(name, parameters)` to a boxed
//! forecaster, with per-family parameter validation.

use std::collections::BTreeMap;

use crate::error::{ForecastError, Result};
use crate::ets::{EtsConfig, EtsErrorKind, EtsSeasonKind, EtsTrendKind};

use super::baseline::{Naive, RandomWalkWithDrift, SeasonalNaive, Sma};
use super::ets::{AutoEts, Ets};
use super::intermittent::{Adida, CrostonClassic, CrostonOptimized, CrostonSba, Imapa, Tsb};
use super::multiseasonal::{AutoMfles, AutoMstl, AutoTbats, Mfles, Mstl, Tbats};
use super::smoothing::{
    Holt, HoltWinters, SeasonalEs, SeasonalEsOptimized, SeasonalWindowAverage, Ses, SesOptimized,
};
use super::theta::{DynamicOptimizedTheta, DynamicTheta, OptimizedTheta, Theta};
use super::wrapper::MethodNameWrapper;
use super::Forecaster;

/// A heterogeneous model parameter value.
#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
    Int(i64),
    Float(f64),
    Bool(bool),
    Str(String),
    IntList(Vec<i64>),
}

/// Model parameters keyed by name. Unrecognized keys are ignored.
pub type ModelParams = BTreeMap<String, ParamValue>;

fn bad_param(key: &str, value: &ParamValue, reason: &str) -> ForecastError {
    ForecastError::InvalidInput(format!(
        "parameter '{}' = {:?}: {}",
        key, value, reason
    ))
}

fn get_int(params: &ModelParams, key: &str, default: i64) -> Result<i64> {
    match params.get(key) {
        None => Ok(default),
        Some(ParamValue::Int(v)) => Ok(*v),
        Some(other) => Err(bad_param(key, other, "expected an integer")),
    }
}

fn get_required_int(params: &ModelParams, model: &str, key: &str) -> Result<i64> {
    match params.get(key) {
        None => Err(ForecastError::InvalidInput(format!(
            "{} requires parameter '{}'",
            model, key
        ))),
        Some(ParamValue::Int(v)) => Ok(*v),
        Some(other) => Err(bad_param(key, other, "expected an integer")),
    }
}

fn get_float(params: &ModelParams, key: &str, default: f64) -> Result<f64> {
    match params.get(key) {
        None => Ok(default),
        Some(ParamValue::Float(v)) => Ok(*v),
        Some(ParamValue::Int(v)) => Ok(*v as f64),
        Some(other) => Err(bad_param(key, other, "expected a number")),
    }
}

fn get_bool(params: &ModelParams, key: &str, default: bool) -> Result<bool> {
    match params.get(key) {
        None => Ok(default),
        Some(ParamValue::Bool(v)) => Ok(*v),
        Some(ParamValue::Int(v)) => Ok(*v != 0),
        Some(other) => Err(bad_param(key, other, "expected a boolean")),
    }
}

fn get_str<'a>(params: &'a ModelParams, key: &str, default: &'a str) -> Result<&'a str> {
    match params.get(key) {
        None => Ok(default),
        Some(ParamValue::Str(v)) => Ok(v),
        Some(other) => Err(bad_param(key, other, "expected a string")),
    }
}

fn positive_period(key: &str, value: i64) -> Result<usize> {
    if value <= 0 {
        return Err(ForecastError::InvalidInput(format!(
            "parameter '{}' must be positive, got {}",
            key, value
        )));
    }
    Ok(value as usize)
}

/// Seasonal periods from either `seasonal_periods` (list) or
/// `seasonal_period` (scalar), defaulting to `[12]`.
fn get_periods(params: &ModelParams) -> Result<Vec<usize>> {
    if let Some(value) = params.get("seasonal_periods") {
        let list = match value {
            ParamValue::IntList(list) => list.clone(),
            ParamValue::Int(v) => vec![*v],
            other => return Err(bad_param("seasonal_periods", other, "expected a list of integers")),
        };
        return list
            .into_iter()
            .map(|p| positive_period("seasonal_periods", p))
            .collect();
    }
    if params.contains_key("seasonal_period") {
        let p = get_int(params, "seasonal_period", 12)?;
        return Ok(vec![positive_period("seasonal_period", p)?]);
    }
    Ok(vec![12])
}

fn ets_config_from_params(params: &ModelParams) -> Result<EtsConfig> {
    let error = match get_int(params, "error_type", 0)? {
        0 => EtsErrorKind::Additive,
        1 => EtsErrorKind::Multiplicative,
        other => {
            return Err(ForecastError::InvalidInput(format!(
                "parameter 'error_type' must be 0 (additive) or 1 (multiplicative), got {}",
                other
            )))
        }
    };
    let trend = match get_int(params, "trend_type", 0)? {
        0 => EtsTrendKind::None,
        1 => EtsTrendKind::Additive,
        2 => EtsTrendKind::Multiplicative,
        3 => EtsTrendKind::DampedAdditive,
        4 => EtsTrendKind::DampedMultiplicative,
        other => {
            return Err(ForecastError::InvalidInput(format!(
                "parameter 'trend_type' must be in 0..=4, got {}",
                other
            )))
        }
    };
    let season = match get_int(params, "season_type", 0)? {
        0 => EtsSeasonKind::None,
        1 => EtsSeasonKind::Additive,
        2 => EtsSeasonKind::Multiplicative,
        other => {
            return Err(ForecastError::InvalidInput(format!(
                "parameter 'season_type' must be in 0..=2, got {}",
                other
            )))
        }
    };

    let season_length = positive_period("season_length", season_length_param(params, 1)?)?;

    let config = EtsConfig {
        error,
        trend,
        season,
        season_length,
        alpha: get_float(params, "alpha", 0.2)?,
        beta: Some(get_float(params, "beta", 0.1)?),
        gamma: Some(get_float(params, "gamma", 0.1)?),
        phi: get_float(params, "phi", 0.98)?,
    };
    config.validate()?;
    Ok(config)
}

/// `season_length` with `seasonal_period` accepted as an alias.
fn season_length_param(params: &ModelParams, default: i64) -> Result<i64> {
    if params.contains_key("season_length") {
        get_int(params, "season_length", default)
    } else {
        get_int(params, "seasonal_period", default)
    }
}

fn check_unit_interval(key: &str, value: f64, lower_open: bool) -> Result<f64> {
    let ok = if lower_open {
        value > 0.0 && value <= 1.0
    } else {
        (0.0..=1.0).contains(&value)
    };
    if !ok {
        let range = if lower_open { "(0, 1]" } else { "[0, 1]" };
        return Err(ForecastError::InvalidInput(format!(
            "parameter '{}' must be in {}, got {}",
            key, range, value
        )));
    }
    Ok(value)
}

/// Construct a forecaster from a model name and parameter map. Unknown
/// model names and out-of-range parameters are rejected; an optional
/// `method_name` parameter wraps the product in a name override.
pub fn create(model_name: &str, params: &ModelParams) -> Result<Box<dyn Forecaster>> {
    let mut model: Box<dyn Forecaster> = match model_name {
        "Naive" => Box::new(Naive::new()),
        "SMA" => {
            let window = get_int(params, "window", 5)?;
            Box::new(Sma::new(positive_period("window", window)?)?)
        }
        "SeasonalNaive" => {
            let period = get_required_int(params, "SeasonalNaive", "seasonal_period")?;
            Box::new(SeasonalNaive::new(positive_period("seasonal_period", period)?)?)
        }
        "RandomWalkWithDrift" => Box::new(RandomWalkWithDrift::new()),
        "SES" => {
            let alpha = check_unit_interval("alpha", get_float(params, "alpha", 0.3)?, true)?;
            Box::new(Ses::new(alpha)?)
        }
        "SESOptimized" => Box::new(SesOptimized::new()),
        "Holt" => {
            let alpha = check_unit_interval("alpha", get_float(params, "alpha", 0.3)?, true)?;
            let beta = check_unit_interval("beta", get_float(params, "beta", 0.1)?, false)?;
            Box::new(Holt::new(alpha, beta)?)
        }
        "HoltWinters" => {
            let period = get_required_int(params, "HoltWinters", "seasonal_period")?;
            if period <= 1 {
                return Err(ForecastError::InvalidInput(format!(
                    "parameter 'seasonal_period' must be > 1 for HoltWinters, got {}",
                    period
                )));
            }
            let multiplicative = get_bool(params, "multiplicative", false)?;
            let alpha = check_unit_interval("alpha", get_float(params, "alpha", 0.2)?, true)?;
            let beta = check_unit_interval("beta", get_float(params, "beta", 0.1)?, false)?;
            let gamma = check_unit_interval("gamma", get_float(params, "gamma", 0.1)?, false)?;
            Box::new(HoltWinters::new(period as usize, multiplicative, alpha, beta, gamma)?)
        }
        "SeasonalES" => {
            let period = get_required_int(params, "SeasonalES", "seasonal_period")?;
            let alpha = check_unit_interval("alpha", get_float(params, "alpha", 0.2)?, true)?;
            let gamma = check_unit_interval("gamma", get_float(params, "gamma", 0.1)?, false)?;
            Box::new(SeasonalEs::new(positive_period("seasonal_period", period)?, alpha, gamma)?)
        }
        "SeasonalESOptimized" => {
            let period = get_required_int(params, "SeasonalESOptimized", "seasonal_period")?;
            Box::new(SeasonalEsOptimized::new(positive_period("seasonal_period", period)?)?)
        }
        "SeasonalWindowAverage" => {
            let period = get_required_int(params, "SeasonalWindowAverage", "seasonal_period")?;
            let window = get_int(params, "window", 5)?;
            Box::new(SeasonalWindowAverage::new(
                positive_period("seasonal_period", period)?,
                positive_period("window", window)?,
            )?)
        }
        "Theta" => {
            let period = positive_period("seasonal_period", get_int(params, "seasonal_period", 1)?)?;
            let theta = get_float(params, "theta", 2.0)?;
            Box::new(Theta::new(period, theta)?)
        }
        "OptimizedTheta" => {
            let period = positive_period("seasonal_period", get_int(params, "seasonal_period", 1)?)?;
            Box::new(OptimizedTheta::new(period)?)
        }
        "DynamicTheta" => {
            let period = positive_period("seasonal_period", get_int(params, "seasonal_period", 1)?)?;
            let theta = get_float(params, "theta", 2.0)?;
            Box::new(DynamicTheta::new(period, theta)?)
        }
        "DynamicOptimizedTheta" => {
            let period = positive_period("seasonal_period", get_int(params, "seasonal_period", 1)?)?;
            Box::new(DynamicOptimizedTheta::new(period)?)
        }
        "ETS" => {
            let config = ets_config_from_params(params)?;
            let confidence = get_float(params, "confidence_level", 0.95)?;
            let strict = get_bool(params, "strict", false)?;
            Box::new(
                Ets::new(config)?
                    .with_confidence_level(confidence)?
                    .with_strict(strict),
            )
        }
        "AutoETS" => {
            let season_length = positive_period("season_length", season_length_param(params, 1)?)?;
            let pattern = get_str(params, "model", "ZZZ")?;
            let confidence = get_float(params, "confidence_level", 0.95)?;
            Box::new(AutoEts::new(season_length, pattern)?.with_confidence_level(confidence)?)
        }
        "MFLES" => {
            let periods = get_periods(params)?;
            let rounds = positive_period("n_iterations", get_int(params, "n_iterations", 10)?)?;
            let lr_trend = get_float(params, "lr_trend", 0.3)?;
            let lr_season = get_float(params, "lr_season", 0.5)?;
            let lr_level = get_float(params, "lr_level", 0.8)?;
            Box::new(Mfles::new(periods, rounds, lr_trend, lr_season, lr_level)?)
        }
        "AutoMFLES" => {
            let periods = get_periods(params)?;
            let max_rounds = positive_period("max_rounds", get_int(params, "max_rounds", 10)?)?;
            let lr_trend = get_float(params, "lr_trend", 0.3)?;
            let lr_season = get_float(params, "lr_season", 0.5)?;
            let lr_rs = get_float(params, "lr_rs", 0.8)?;
            let cv_horizon = get_int(params, "cv_horizon", -1)?;
            let cv_horizon = if cv_horizon > 0 {
                Some(cv_horizon as usize)
            } else {
                None
            };
            Box::new(AutoMfles::new(periods, max_rounds, lr_trend, lr_season, lr_rs, cv_horizon)?)
        }
        "MSTL" => Box::new(Mstl::new(get_periods(params)?)?),
        "AutoMSTL" => Box::new(AutoMstl::new(get_periods(params)?)?),
        "TBATS" => {
            let periods = get_periods(params)?;
            let use_box_cox = get_bool(params, "use_box_cox", false)?;
            let box_cox_lambda = get_float(params, "box_cox_lambda", 1.0)?;
            let use_trend = get_bool(params, "use_trend", true)?;
            let use_damped_trend = get_bool(params, "use_damped_trend", false)?;
            let damping = get_float(params, "damping_param", 0.98)?;
            Box::new(Tbats::new(
                periods,
                use_box_cox,
                box_cox_lambda,
                use_trend,
                use_damped_trend,
                damping,
            )?)
        }
        "AutoTBATS" => Box::new(AutoTbats::new(get_periods(params)?)?),
        "CrostonClassic" => Box::new(CrostonClassic::new()),
        "CrostonOptimized" => Box::new(CrostonOptimized::new()),
        "CrostonSBA" => Box::new(CrostonSba::new()),
        "ADIDA" => Box::new(Adida::new()),
        "IMAPA" => Box::new(Imapa::new()),
        "TSB" => {
            let alpha_d = check_unit_interval("alpha_d", get_float(params, "alpha_d", 0.1)?, true)?;
            let alpha_p = check_unit_interval("alpha_p", get_float(params, "alpha_p", 0.1)?, true)?;
            Box::new(Tsb::new(alpha_d, alpha_p)?)
        }
        #[cfg(feature = "linalg")]
        "ARIMA" => {
            let order = super::arima::ArimaOrder {
                p: get_int(params, "p", 1)?.max(0) as usize,
                d: get_int(params, "d", 0)?.max(0) as usize,
                q: get_int(params, "q", 0)?.max(0) as usize,
                sp: get_int(params, "P", 0)?.max(0) as usize,
                sd: get_int(params, "D", 0)?.max(0) as usize,
                sq: get_int(params, "Q", 0)?.max(0) as usize,
                s: get_int(params, "s", 0)?.max(0) as usize,
                intercept: get_bool(params, "include_intercept", true)?,
            };
            Box::new(super::arima::Arima::new(order)?)
        }
        #[cfg(feature = "linalg")]
        "AutoARIMA" => {
            let period = get_int(params, "seasonal_period", 0)?.max(0) as usize;
            Box::new(super::arima::AutoArima::new(period.max(1)))
        }
        #[cfg(not(feature = "linalg"))]
        "ARIMA" | "AutoARIMA" => {
            return Err(ForecastError::InvalidInput(format!(
                "model '{}' requires the 'linalg' feature",
                model_name
            )))
        }
        _ => {
            return Err(ForecastError::InvalidInput(format!(
                "unknown model '{}'; supported models: {}",
                model_name,
                supported_models().join(", ")
            )))
        }
    };

    if let Some(ParamValue::Str(custom_name)) = params.get("method_name") {
        if !custom_name.is_empty() {
            model = Box::new(MethodNameWrapper::new(model, custom_name.clone())?);
        }
    }

    Ok(model)
}

/// Names accepted by [`create`].
pub fn supported_models() -> Vec<&'static str> {
    let mut models = vec![
        // Basic
        "Naive",
        "SMA",
        "SeasonalNaive",
        "SES",
        "SESOptimized",
        "RandomWalkWithDrift",
        // Holt family
        "Holt",
        "HoltWinters",
        // Theta variants
        "Theta",
        "OptimizedTheta",
        "DynamicTheta",
        "DynamicOptimizedTheta",
        // Seasonal smoothing
        "SeasonalES",
        "SeasonalESOptimized",
        "SeasonalWindowAverage",
        // State space
        "ETS",
        "AutoETS",
        // Multiple seasonality
        "MFLES",
        "AutoMFLES",
        "MSTL",
        "AutoMSTL",
        "TBATS",
        "AutoTBATS",
        // Intermittent demand
        "CrostonClassic",
        "CrostonOptimized",
        "CrostonSBA",
        "ADIDA",
        "IMAPA",
        "TSB",
    ];
    if cfg!(feature = "linalg") {
        models.push("ARIMA");
        models.push("AutoARIMA");
    }
    models
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::series::TimeSeriesBuilder;

    fn params(entries: &[(&str, ParamValue)]) -> ModelParams {
        entries
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn test_create_every_supported_model() {
        for name in supported_models() {
            let mut p = ModelParams::new();
            // Required keys per family.
            if matches!(
                name,
                "SeasonalNaive" | "HoltWinters" | "SeasonalES" | "SeasonalESOptimized"
                    | "SeasonalWindowAverage"
            ) {
                p.insert("seasonal_period".to_string(), ParamValue::Int(4));
            }
            let model = create(name, &p);
            assert!(model.is_ok(), "failed to create {}: {:?}", name, model.err());
            assert_eq!(model.unwrap().name(), name);
        }
    }

    #[test]
    fn test_unknown_model_lists_catalog() {
        let err = create("Prophet", &ModelParams::new()).unwrap_err();
        let message = err.to_string();
        assert!(message.contains("unknown model 'Prophet'"));
        assert!(message.contains("Naive"));
    }

    #[test]
    fn test_out_of_range_parameter_names_key() {
        let err = create("SES", &params(&[("alpha", ParamValue::Float(1.5))])).unwrap_err();
        assert!(err.to_string().contains("alpha"));
    }

    #[test]
    fn test_missing_required_parameter() {
        let err = create("SeasonalNaive", &ModelParams::new()).unwrap_err();
        assert!(err.to_string().contains("seasonal_period"));
    }

    #[test]
    fn test_holt_winters_rejects_period_one() {
        let err = create(
            "HoltWinters",
            &params(&[("seasonal_period", ParamValue::Int(1))]),
        )
        .unwrap_err();
        assert!(err.to_string().contains("seasonal_period"));
    }

    #[test]
    fn test_unrecognized_keys_are_ignored() {
        let model = create(
            "Naive",
            &params(&[("definitely_not_a_key", ParamValue::Int(7))]),
        );
        assert!(model.is_ok());
    }

    #[test]
    fn test_method_name_wraps_model() {
        let model = create(
            "Naive",
            &params(&[("method_name", ParamValue::Str("benchmark".to_string()))]),
        )
        .unwrap();
        assert_eq!(model.name(), "benchmark");
    }

    #[test]
    fn test_seasonal_periods_list() {
        let model = create(
            "MFLES",
            &params(&[(
                "seasonal_periods",
                ParamValue::IntList(vec![12, 4]),
            )]),
        );
        assert!(model.is_ok());
    }

    #[test]
    fn test_factory_products_forecast() {
        let ts = TimeSeriesBuilder::new()
            .values(vec![1.0, 2.0, 3.0, 4.0, 5.0])
            .build()
            .unwrap();
        let mut model = create("Naive", &ModelParams::new()).unwrap();
        model.fit(&ts).unwrap();
        assert_eq!(model.predict(2).unwrap().point, vec![5.0, 5.0]);
    }

    #[test]
    fn test_ets_kind_mapping_rejects_out_of_range() {
        let err = create("ETS", &params(&[("trend_type", ParamValue::Int(9))])).unwrap_err();
        assert!(err.to_string().contains("trend_type"));
    }
}

//! Forecast accuracy metrics.

use crate::error::{ForecastError, Result};

fn validate_inputs(actual: &[f64], forecast: &[f64]) -> Result<()> {
    if actual.len() != forecast.len() {
        return Err(ForecastError::InvalidInput(format!(
            "actual and forecast must have the same length: {} vs {}",
            actual.len(),
            forecast.len()
        )));
    }
    if actual.is_empty() {
        return Err(ForecastError::InsufficientData { needed: 1, got: 0 });
    }
    Ok(())
}

/// Mean absolute error.
pub fn mae(actual: &[f64], forecast: &[f64]) -> Result<f64> {
    validate_inputs(actual, forecast)?;
    let sum: f64 = actual
        .iter()
        .zip(forecast.iter())
        .map(|(a, f)| (a - f).abs())
        .sum();
    Ok(sum / actual.len() as f64)
}

/// Mean squared error.
pub fn mse(actual: &[f64], forecast: &[f64]) -> Result<f64> {
    validate_inputs(actual, forecast)?;
    let sum: f64 = actual
        .iter()
        .zip(forecast.iter())
        .map(|(a, f)| (a - f).powi(2))
        .sum();
    Ok(sum / actual.len() as f64)
}

/// Root mean squared error.
pub fn rmse(actual: &[f64], forecast: &[f64]) -> Result<f64> {
    Ok(mse(actual, forecast)?.sqrt())
}

/// Mean absolute percentage error, in percent. Absent when every actual is
/// (numerically) zero.
pub fn mape(actual: &[f64], forecast: &[f64]) -> Result<Option<f64>> {
    validate_inputs(actual, forecast)?;
    let mut sum = 0.0;
    let mut count = 0usize;
    for (a, f) in actual.iter().zip(forecast.iter()) {
        if a.abs() > f64::EPSILON {
            sum += ((a - f) / a).abs();
            count += 1;
        }
    }
    if count == 0 {
        return Ok(None);
    }
    Ok(Some(sum / count as f64 * 100.0))
}

/// Symmetric mean absolute percentage error, in percent. Absent when every
/// pair sums to zero magnitude.
pub fn smape(actual: &[f64], forecast: &[f64]) -> Result<Option<f64>> {
    validate_inputs(actual, forecast)?;
    let mut sum = 0.0;
    let mut count = 0usize;
    for (a, f) in actual.iter().zip(forecast.iter()) {
        let denom = a.abs() + f.abs();
        if denom > f64::EPSILON {
            sum += 2.0 * (a - f).abs() / denom;
            count += 1;
        }
    }
    if count == 0 {
        return Ok(None);
    }
    Ok(Some(sum / count as f64 * 100.0))
}

/// Mean absolute scaled error: forecast MAE over baseline MAE.
pub fn mase(actual: &[f64], forecast: &[f64], baseline: &[f64]) -> Result<f64> {
    validate_inputs(actual, forecast)?;
    if actual.len() != baseline.len() {
        return Err(ForecastError::InvalidInput(format!(
            "actual and baseline must have the same length: {} vs {}",
            actual.len(),
            baseline.len()
        )));
    }

    let forecast_mae = mae(actual, forecast)?;
    let baseline_mae = mae(actual, baseline)?;
    if baseline_mae.abs() < f64::EPSILON {
        return Ok(f64::NAN);
    }
    Ok(forecast_mae / baseline_mae)
}

/// Coefficient of determination.
pub fn r2(actual: &[f64], forecast: &[f64]) -> Result<f64> {
    validate_inputs(actual, forecast)?;

    let mean: f64 = actual.iter().sum::<f64>() / actual.len() as f64;
    let ss_res: f64 = actual
        .iter()
        .zip(forecast.iter())
        .map(|(a, f)| (a - f).powi(2))
        .sum();
    let ss_tot: f64 = actual.iter().map(|a| (a - mean).powi(2)).sum();

    if ss_tot.abs() < f64::EPSILON {
        return Ok(f64::NAN);
    }
    Ok(1.0 - ss_res / ss_tot)
}

/// Mean error (forecast minus actual).
pub fn bias(actual: &[f64], forecast: &[f64]) -> Result<f64> {
    validate_inputs(actual, forecast)?;
    let sum: f64 = actual.iter().zip(forecast.iter()).map(|(a, f)| f - a).sum();
    Ok(sum / actual.len() as f64)
}

/// Relative MAE: MAE of the first method over MAE of the second.
pub fn rmae(actual: &[f64], pred1: &[f64], pred2: &[f64]) -> Result<f64> {
    validate_inputs(actual, pred1)?;
    if actual.len() != pred2.len() {
        return Err(ForecastError::InvalidInput(format!(
            "actual and pred2 must have the same length: {} vs {}",
            actual.len(),
            pred2.len()
        )));
    }

    let mae1 = mae(actual, pred1)?;
    let mae2 = mae(actual, pred2)?;
    if mae2.abs() < f64::EPSILON {
        return Ok(f64::NAN);
    }
    Ok(mae1 / mae2)
}

/// Pinball loss at quantile `q`.
pub fn quantile_loss(actual: &[f64], forecast: &[f64], q: f64) -> Result<f64> {
    validate_inputs(actual, forecast)?;
    if !(0.0 < q && q < 1.0) {
        return Err(ForecastError::InvalidInput(format!(
            "quantile must be in (0, 1), got {}",
            q
        )));
    }

    let sum: f64 = actual
        .iter()
        .zip(forecast.iter())
        .map(|(a, f)| {
            let error = a - f;
            (q * error).max((q - 1.0) * error)
        })
        .sum();
    Ok(sum / actual.len() as f64)
}

/// Mean of pinball losses over several quantile forecasts.
pub fn mqloss(actual: &[f64], forecasts: &[Vec<f64>], quantiles: &[f64]) -> Result<f64> {
    if forecasts.len() != quantiles.len() {
        return Err(ForecastError::InvalidInput(format!(
            "number of forecasts ({}) must match number of quantiles ({})",
            forecasts.len(),
            quantiles.len()
        )));
    }
    if quantiles.is_empty() {
        return Err(ForecastError::InvalidInput(
            "at least one quantile is required".to_string(),
        ));
    }

    let mut total = 0.0;
    for (forecast, &q) in forecasts.iter().zip(quantiles.iter()) {
        total += quantile_loss(actual, forecast, q)?;
    }
    Ok(total / quantiles.len() as f64)
}

/// Fraction of actuals inside `[lower, upper]`.
pub fn coverage(actual: &[f64], lower: &[f64], upper: &[f64]) -> Result<f64> {
    if actual.len() != lower.len() || actual.len() != upper.len() {
        return Err(ForecastError::InvalidInput(
            "actual, lower and upper must have the same length".to_string(),
        ));
    }
    if actual.is_empty() {
        return Ok(f64::NAN);
    }

    let covered = actual
        .iter()
        .zip(lower.iter())
        .zip(upper.iter())
        .filter(|((a, l), u)| *a >= *l && *a <= *u)
        .count();
    Ok(covered as f64 / actual.len() as f64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_mae_basic() {
        let actual = vec![1.0, 2.0, 3.0, 4.0, 5.0];
        let forecast = vec![1.1, 2.2, 2.9, 4.1, 4.8];
        assert_relative_eq!(mae(&actual, &forecast).unwrap(), 0.14, epsilon = 0.01);
    }

    #[test]
    fn test_mse_and_rmse() {
        let actual = vec![1.0, 2.0, 3.0];
        let forecast = vec![1.0, 2.0, 4.0];
        assert_relative_eq!(mse(&actual, &forecast).unwrap(), 1.0 / 3.0, epsilon = 1e-9);
        assert_relative_eq!(
            rmse(&actual, &forecast).unwrap(),
            (1.0f64 / 3.0).sqrt(),
            epsilon = 1e-9
        );
    }

    #[test]
    fn test_mape_absent_on_all_zero_actuals() {
        let actual = vec![0.0, 0.0];
        let forecast = vec![1.0, 2.0];
        assert!(mape(&actual, &forecast).unwrap().is_none());
    }

    #[test]
    fn test_smape_absent_when_both_sides_zero() {
        assert!(smape(&[0.0, 0.0], &[0.0, 0.0]).unwrap().is_none());
        assert!(smape(&[1.0], &[1.0]).unwrap().is_some());
    }

    #[test]
    fn test_rmae_identity_is_one() {
        let actual = vec![1.0, 2.0, 3.0];
        let pred = vec![1.5, 2.5, 2.5];
        assert_relative_eq!(rmae(&actual, &pred, &pred).unwrap(), 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_quantile_loss_median_is_half_mae() {
        let actual = vec![1.0, 5.0, 3.0, 8.0];
        let forecast = vec![2.0, 4.0, 3.5, 6.0];
        let ql = quantile_loss(&actual, &forecast, 0.5).unwrap();
        let m = mae(&actual, &forecast).unwrap();
        assert_relative_eq!(ql, m / 2.0, epsilon = 1e-12);
    }

    #[test]
    fn test_quantile_loss_rejects_degenerate_q() {
        assert!(quantile_loss(&[1.0], &[1.0], 0.0).is_err());
        assert!(quantile_loss(&[1.0], &[1.0], 1.0).is_err());
    }

    #[test]
    fn test_mqloss_averages() {
        let actual = vec![1.0, 2.0];
        let forecasts = vec![vec![1.0, 2.0], vec![2.0, 3.0]];
        let quantiles = vec![0.1, 0.9];
        let result = mqloss(&actual, &forecasts, &quantiles).unwrap();
        assert!(result >= 0.0);
    }

    #[test]
    fn test_coverage_two_thirds() {
        let actual = vec![1.0, 2.0, 3.0];
        let lower = vec![0.0, 0.0, 4.0];
        let upper = vec![2.0, 3.0, 5.0];
        assert_relative_eq!(
            coverage(&actual, &lower, &upper).unwrap(),
            2.0 / 3.0,
            epsilon = 1e-12
        );
    }

    #[test]
    fn test_r2_perfect_fit() {
        let actual = vec![1.0, 2.0, 3.0, 4.0];
        assert_relative_eq!(r2(&actual, &actual).unwrap(), 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_bias_sign() {
        let actual = vec![1.0, 1.0];
        let forecast = vec![2.0, 2.0];
        assert_relative_eq!(bias(&actual, &forecast).unwrap(), 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_mase_against_baseline() {
        let actual = vec![1.0, 2.0, 3.0, 4.0];
        let forecast = vec![1.5, 2.5, 3.5, 4.5];
        let baseline = vec![0.0, 1.0, 2.0, 3.0];
        assert_relative_eq!(
            mase(&actual, &forecast, &baseline).unwrap(),
            0.5,
            epsilon = 1e-12
        );
    }

    #[test]
    fn test_empty_inputs_fail() {
        assert!(mae(&[], &[]).is_err());
        assert!(mse(&[1.0], &[1.0, 2.0]).is_err());
    }
}

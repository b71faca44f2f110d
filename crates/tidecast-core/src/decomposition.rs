//! Multi-seasonal trend decomposition (MSTL).

use crate::error::{ForecastError, Result};

/// Result of an MSTL decomposition. `seasonal[i]` corresponds to
/// `periods[i]`; all component vectors have the input length.
#[derive(Debug, Clone)]
pub struct MstlDecomposition {
    pub trend: Vec<f64>,
    pub seasonal: Vec<Vec<f64>>,
    pub periods: Vec<i32>,
    pub remainder: Vec<f64>,
}

/// Centered moving average with edge extension.
fn moving_average_trend(values: &[f64], window: usize) -> Vec<f64> {
    let n = values.len();
    let window = window.max(3).min(n);
    let half = window / 2;

    let mut trend = vec![f64::NAN; n];
    for i in half..n.saturating_sub(half) {
        let end = (i + half + 1).min(n);
        let start = i - half;
        trend[i] = values[start..end].iter().sum::<f64>() / (end - start) as f64;
    }

    let first_valid = trend.iter().position(|v| !v.is_nan()).unwrap_or(0);
    let last_valid = trend.iter().rposition(|v| !v.is_nan()).unwrap_or(n - 1);
    let first_value = trend[first_valid];
    let last_value = trend[last_valid];
    for v in trend[..first_valid].iter_mut() {
        *v = first_value;
    }
    for v in trend[last_valid + 1..].iter_mut() {
        *v = last_value;
    }
    trend
}

/// One seasonal extraction round: detrend, average by seasonal position,
/// center to zero mean.
fn extract_seasonal(values: &[f64], period: usize) -> Result<Vec<f64>> {
    let n = values.len();
    if n < 2 * period {
        return Err(ForecastError::InsufficientData {
            needed: 2 * period,
            got: n,
        });
    }

    let smoothing = if period % 2 == 0 { period + 1 } else { period };
    let trend = moving_average_trend(values, smoothing);
    let detrended: Vec<f64> = values.iter().zip(trend.iter()).map(|(v, t)| v - t).collect();

    let mut sums = vec![0.0; period];
    let mut counts = vec![0usize; period];
    for (i, &d) in detrended.iter().enumerate() {
        sums[i % period] += d;
        counts[i % period] += 1;
    }
    let mut means: Vec<f64> = sums
        .iter()
        .zip(counts.iter())
        .map(|(s, c)| if *c > 0 { s / *c as f64 } else { 0.0 })
        .collect();

    let grand = means.iter().sum::<f64>() / period as f64;
    for m in means.iter_mut() {
        *m -= grand;
    }

    Ok((0..n).map(|i| means[i % period]).collect())
}

/// Decompose a series into trend, one seasonal component per period, and a
/// remainder. Periods are processed longest first; periods the series
/// cannot support (fewer than two cycles) are skipped.
pub fn mstl_decompose(values: &[f64], periods: &[i32]) -> Result<MstlDecomposition> {
    let n = values.len();
    if n == 0 {
        return Err(ForecastError::InsufficientData { needed: 1, got: 0 });
    }

    let mut sorted_periods: Vec<i32> = periods.to_vec();
    sorted_periods.sort_unstable_by(|a, b| b.cmp(a));

    let mut current = values.to_vec();
    let mut seasonal_components: Vec<Vec<f64>> = Vec::new();
    let mut used_periods: Vec<i32> = Vec::new();

    for &period in &sorted_periods {
        let p = period as usize;
        if period < 2 || n < 2 * p {
            continue;
        }
        match extract_seasonal(&current, p) {
            Ok(seasonal) => {
                for (c, s) in current.iter_mut().zip(seasonal.iter()) {
                    *c -= s;
                }
                seasonal_components.push(seasonal);
                used_periods.push(period);
            }
            Err(_) => continue,
        }
    }

    let trend = moving_average_trend(&current, (n / 5).max(3));
    let remainder: Vec<f64> = current
        .iter()
        .zip(trend.iter())
        .map(|(c, t)| c - t)
        .collect();

    Ok(MstlDecomposition {
        trend,
        seasonal: seasonal_components,
        periods: used_periods,
        remainder,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::PI;

    #[test]
    fn test_single_period_shapes() {
        let values: Vec<f64> = (0..120)
            .map(|i| 0.1 * i as f64 + 5.0 * (2.0 * PI * i as f64 / 12.0).sin())
            .collect();
        let result = mstl_decompose(&values, &[12]).unwrap();

        assert_eq!(result.trend.len(), 120);
        assert_eq!(result.seasonal.len(), 1);
        assert_eq!(result.seasonal[0].len(), 120);
        assert_eq!(result.remainder.len(), 120);
        assert_eq!(result.periods, vec![12]);
    }

    #[test]
    fn test_components_sum_back_to_series() {
        let values: Vec<f64> = (0..96)
            .map(|i| 10.0 + 0.2 * i as f64 + 3.0 * (2.0 * PI * i as f64 / 8.0).sin())
            .collect();
        let result = mstl_decompose(&values, &[8]).unwrap();
        for i in 0..96 {
            let reconstructed = result.trend[i] + result.seasonal[0][i] + result.remainder[i];
            assert!((reconstructed - values[i]).abs() < 1e-9);
        }
    }

    #[test]
    fn test_multiple_periods_longest_first() {
        let values: Vec<f64> = (0..240)
            .map(|i| {
                let t = i as f64;
                (2.0 * PI * t / 24.0).sin() * 4.0 + (2.0 * PI * t / 6.0).sin() * 2.0
            })
            .collect();
        let result = mstl_decompose(&values, &[6, 24]).unwrap();
        assert_eq!(result.periods, vec![24, 6]);
        assert_eq!(result.seasonal.len(), 2);
    }

    #[test]
    fn test_unsupported_periods_skipped() {
        let values = vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0];
        let result = mstl_decompose(&values, &[12, 1]).unwrap();
        assert!(result.periods.is_empty());
        assert!(result.seasonal.is_empty());
        assert_eq!(result.trend.len(), 6);
    }

    #[test]
    fn test_empty_input_fails() {
        assert!(mstl_decompose(&[], &[12]).is_err());
    }
}

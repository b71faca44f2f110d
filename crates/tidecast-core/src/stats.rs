//! Descriptive statistics: the 34-metric per-series record, optionally
//! augmented with date-aware fields.

use crate::error::Result;
use crate::frequency::{DateAxisKind, Frequency};

/// Per-series descriptive statistics.
#[derive(Debug, Clone, Default)]
pub struct TsStats {
    pub length: usize,
    pub n_nulls: usize,
    pub n_nan: usize,
    pub n_zeros: usize,
    pub n_positive: usize,
    pub n_negative: usize,
    pub n_unique_values: usize,
    pub is_constant: bool,
    /// Leading run of zeros.
    pub n_zeros_start: usize,
    /// Trailing run of zeros.
    pub n_zeros_end: usize,
    /// Longest run of one repeated value.
    pub plateau_size: usize,
    /// Longest run of one repeated non-zero value.
    pub plateau_size_nonzero: usize,
    pub mean: f64,
    pub median: f64,
    pub std_dev: f64,
    pub variance: f64,
    pub min: f64,
    pub max: f64,
    pub range: f64,
    pub sum: f64,
    pub skewness: f64,
    pub kurtosis: f64,
    /// Hill estimator over the upper tail of absolute values.
    pub tail_index: f64,
    pub bimodality_coef: f64,
    /// 10% two-sided trimmed mean.
    pub trimmed_mean: f64,
    pub coef_variation: f64,
    pub q1: f64,
    pub q3: f64,
    pub iqr: f64,
    pub autocorr_lag1: f64,
    pub trend_strength: f64,
    pub seasonality_strength: f64,
    pub entropy: f64,
    pub stability: f64,
    /// Points the date range would hold at the dominant spacing; only set
    /// when dates are supplied.
    pub expected_length: Option<usize>,
    /// Spacings larger than 1.5x the dominant spacing; only set when dates
    /// are supplied.
    pub n_gaps: Option<usize>,
}

/// Compute the statistics record for a series with potential NULLs.
pub fn compute_ts_stats(series: &[Option<f64>]) -> Result<TsStats> {
    let length = series.len();
    if length == 0 {
        return Ok(TsStats::default());
    }

    let mut n_nulls = 0;
    let mut n_nan = 0;
    let mut values: Vec<f64> = Vec::with_capacity(length);
    for v in series {
        match v {
            None => n_nulls += 1,
            Some(x) if x.is_nan() => n_nan += 1,
            Some(x) => values.push(*x),
        }
    }

    let n = values.len();
    if n == 0 {
        return Ok(TsStats {
            length,
            n_nulls,
            n_nan,
            ..Default::default()
        });
    }

    let n_zeros = values.iter().filter(|&&v| v == 0.0).count();
    let n_positive = values.iter().filter(|&&v| v > 0.0).count();
    let n_negative = values.iter().filter(|&&v| v < 0.0).count();

    let mut unique: Vec<u64> = values.iter().map(|v| v.to_bits()).collect();
    unique.sort_unstable();
    unique.dedup();
    let n_unique_values = unique.len();
    let is_constant = n_unique_values <= 1;

    let n_zeros_start = values.iter().take_while(|&&v| v == 0.0).count();
    let n_zeros_end = values.iter().rev().take_while(|&&v| v == 0.0).count();
    let (plateau_size, plateau_size_nonzero) = plateau_sizes(&values);

    let sum: f64 = values.iter().sum();
    let mean = sum / n as f64;
    let min = values.iter().cloned().fold(f64::INFINITY, f64::min);
    let max = values.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    let range = max - min;

    let variance = if n > 1 {
        values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1) as f64
    } else {
        0.0
    };
    let std_dev = variance.sqrt();
    let coef_variation = if mean.abs() > f64::EPSILON {
        std_dev / mean.abs()
    } else {
        f64::NAN
    };

    let mut sorted = values.clone();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let median = percentile(&sorted, 0.5);
    let q1 = percentile(&sorted, 0.25);
    let q3 = percentile(&sorted, 0.75);
    let iqr = q3 - q1;

    let trim = n / 10;
    let trimmed = &sorted[trim..n - trim];
    let trimmed_mean = if trimmed.is_empty() {
        mean
    } else {
        trimmed.iter().sum::<f64>() / trimmed.len() as f64
    };

    let skewness = if n > 2 && std_dev > f64::EPSILON {
        let m3 = values.iter().map(|v| (v - mean).powi(3)).sum::<f64>() / n as f64;
        m3 / std_dev.powi(3)
    } else {
        f64::NAN
    };
    let kurtosis = if n > 3 && std_dev > f64::EPSILON {
        let m4 = values.iter().map(|v| (v - mean).powi(4)).sum::<f64>() / n as f64;
        (m4 / std_dev.powi(4)) - 3.0
    } else {
        f64::NAN
    };

    let bimodality_coef = if kurtosis.is_finite() && skewness.is_finite() {
        (skewness * skewness + 1.0) / (kurtosis + 3.0)
    } else {
        f64::NAN
    };

    let tail_index = hill_tail_index(&sorted);
    let autocorr_lag1 = autocorrelation(&values, 1);
    let (trend_strength, seasonality_strength) = strength_metrics(&values);
    let entropy = histogram_entropy(&values, min, max);
    let stability = rolling_mean_stability(&values);

    Ok(TsStats {
        length,
        n_nulls,
        n_nan,
        n_zeros,
        n_positive,
        n_negative,
        n_unique_values,
        is_constant,
        n_zeros_start,
        n_zeros_end,
        plateau_size,
        plateau_size_nonzero,
        mean,
        median,
        std_dev,
        variance,
        min,
        max,
        range,
        sum,
        skewness,
        kurtosis,
        tail_index,
        bimodality_coef,
        trimmed_mean,
        coef_variation,
        q1,
        q3,
        iqr,
        autocorr_lag1,
        trend_strength,
        seasonality_strength,
        entropy,
        stability,
        expected_length: None,
        n_gaps: None,
    })
}

/// Statistics plus the date-aware fields derived from the timestamp axis.
pub fn compute_ts_stats_with_dates(
    dates: &[i64],
    series: &[Option<f64>],
    frequency: Option<(Frequency, DateAxisKind)>,
) -> Result<TsStats> {
    let mut stats = compute_ts_stats(series)?;
    if dates.len() < 2 {
        return Ok(stats);
    }

    let mut sorted = dates.to_vec();
    sorted.sort_unstable();

    let spacing = match frequency {
        Some((freq, axis)) => freq.step_for_axis(axis),
        None => {
            let mut counts = std::collections::HashMap::new();
            for w in sorted.windows(2) {
                *counts.entry(w[1] - w[0]).or_insert(0usize) += 1;
            }
            counts
                .into_iter()
                .max_by_key(|(_, c)| *c)
                .map(|(d, _)| d)
                .unwrap_or(1)
        }
    };
    if spacing <= 0 {
        return Ok(stats);
    }

    let span = sorted[sorted.len() - 1] - sorted[0];
    stats.expected_length = Some((span / spacing) as usize + 1);
    stats.n_gaps = Some(
        sorted
            .windows(2)
            .filter(|w| (w[1] - w[0]) as f64 > spacing as f64 * 1.5)
            .count(),
    );
    Ok(stats)
}

fn plateau_sizes(values: &[f64]) -> (usize, usize) {
    let mut longest = 1;
    let mut longest_nonzero = 0;
    let mut run = 1;
    for w in values.windows(2) {
        if w[1] == w[0] {
            run += 1;
        } else {
            run = 1;
        }
        longest = longest.max(run);
        if w[1] != 0.0 {
            longest_nonzero = longest_nonzero.max(run);
        }
    }
    if values.first().map(|&v| v != 0.0).unwrap_or(false) {
        longest_nonzero = longest_nonzero.max(1);
    }
    (longest, longest_nonzero)
}

fn percentile(sorted: &[f64], p: f64) -> f64 {
    if sorted.is_empty() {
        return f64::NAN;
    }
    if sorted.len() == 1 {
        return sorted[0];
    }
    let idx = p * (sorted.len() - 1) as f64;
    let lower = idx.floor() as usize;
    let upper = idx.ceil() as usize;
    let frac = idx - lower as f64;
    if upper >= sorted.len() {
        sorted[sorted.len() - 1]
    } else {
        sorted[lower] * (1.0 - frac) + sorted[upper] * frac
    }
}

/// Hill estimator over the top decile of absolute values.
fn hill_tail_index(sorted: &[f64]) -> f64 {
    let n = sorted.len();
    let k = n / 10;
    if k < 2 {
        return f64::NAN;
    }
    let mut abs_sorted: Vec<f64> = sorted.iter().map(|v| v.abs()).collect();
    abs_sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let threshold = abs_sorted[n - k - 1];
    if threshold <= 0.0 {
        return f64::NAN;
    }
    let log_sum: f64 = abs_sorted[n - k..]
        .iter()
        .map(|v| (v / threshold).max(1e-300).ln())
        .sum();
    if log_sum <= 0.0 {
        return f64::NAN;
    }
    k as f64 / log_sum
}

fn autocorrelation(values: &[f64], lag: usize) -> f64 {
    if values.len() <= lag {
        return f64::NAN;
    }
    let n = values.len();
    let mean: f64 = values.iter().sum::<f64>() / n as f64;

    let mut numerator = 0.0;
    let mut denominator = 0.0;
    for (i, &v) in values.iter().enumerate() {
        denominator += (v - mean).powi(2);
        if i >= lag {
            numerator += (v - mean) * (values[i - lag] - mean);
        }
    }
    if denominator.abs() < f64::EPSILON {
        0.0
    } else {
        numerator / denominator
    }
}

fn strength_metrics(values: &[f64]) -> (f64, f64) {
    if values.len() < 4 {
        return (0.0, 0.0);
    }

    let n = values.len() as f64;
    let x_mean = (n - 1.0) / 2.0;
    let y_mean: f64 = values.iter().sum::<f64>() / n;

    let mut ss_xy = 0.0;
    let mut ss_xx = 0.0;
    let mut ss_yy = 0.0;
    for (i, &y) in values.iter().enumerate() {
        let x = i as f64;
        ss_xy += (x - x_mean) * (y - y_mean);
        ss_xx += (x - x_mean).powi(2);
        ss_yy += (y - y_mean).powi(2);
    }

    let trend_strength = if ss_xx.abs() > f64::EPSILON && ss_yy.abs() > f64::EPSILON {
        (ss_xy.powi(2) / (ss_xx * ss_yy)).sqrt().clamp(0.0, 1.0)
    } else {
        0.0
    };

    let seasonality_strength = [2usize, 4, 7, 12]
        .iter()
        .map(|&lag| autocorrelation(values, lag).abs())
        .filter(|v| v.is_finite())
        .fold(0.0_f64, f64::max)
        .clamp(0.0, 1.0);

    (trend_strength, seasonality_strength)
}

fn histogram_entropy(values: &[f64], min: f64, max: f64) -> f64 {
    if values.len() < 10 {
        return f64::NAN;
    }
    let range = max - min;
    if range.abs() < f64::EPSILON {
        return 0.0;
    }

    const N_BINS: usize = 10;
    let mut bins = [0usize; N_BINS];
    for &v in values {
        let bin = (((v - min) / range) * (N_BINS - 1) as f64).round() as usize;
        bins[bin.min(N_BINS - 1)] += 1;
    }

    let n = values.len() as f64;
    let mut entropy = 0.0;
    for &count in &bins {
        if count > 0 {
            let p = count as f64 / n;
            entropy -= p * p.ln();
        }
    }
    entropy
}

fn rolling_mean_stability(values: &[f64]) -> f64 {
    if values.len() < 10 {
        return f64::NAN;
    }
    let window = (values.len() / 5).max(3);
    let mut rolling = Vec::with_capacity(values.len() - window + 1);
    for i in 0..=(values.len() - window) {
        rolling.push(values[i..i + window].iter().sum::<f64>() / window as f64);
    }

    let rm_mean: f64 = rolling.iter().sum::<f64>() / rolling.len() as f64;
    let rm_std = (rolling.iter().map(|v| (v - rm_mean).powi(2)).sum::<f64>()
        / rolling.len() as f64)
        .sqrt();

    if rm_mean.abs() > f64::EPSILON {
        1.0 / (rm_std / rm_mean.abs() + 0.01)
    } else {
        f64::NAN
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_basic_stats() {
        let series: Vec<Option<f64>> = vec![Some(1.0), Some(2.0), Some(3.0), Some(4.0), Some(5.0)];
        let stats = compute_ts_stats(&series).unwrap();

        assert_eq!(stats.length, 5);
        assert_eq!(stats.n_nulls, 0);
        assert_eq!(stats.n_unique_values, 5);
        assert!(!stats.is_constant);
        assert_relative_eq!(stats.mean, 3.0);
        assert_relative_eq!(stats.median, 3.0);
        assert_relative_eq!(stats.min, 1.0);
        assert_relative_eq!(stats.max, 5.0);
        assert_relative_eq!(stats.sum, 15.0);
        assert_relative_eq!(stats.range, 4.0);
    }

    #[test]
    fn test_nulls_and_nans_counted_separately() {
        let series = vec![Some(1.0), None, Some(f64::NAN), Some(3.0)];
        let stats = compute_ts_stats(&series).unwrap();
        assert_eq!(stats.length, 4);
        assert_eq!(stats.n_nulls, 1);
        assert_eq!(stats.n_nan, 1);
        assert_relative_eq!(stats.mean, 2.0);
    }

    #[test]
    fn test_zero_runs_and_plateaus() {
        let series: Vec<Option<f64>> = [0.0, 0.0, 5.0, 5.0, 5.0, 2.0, 0.0]
            .iter()
            .map(|&v| Some(v))
            .collect();
        let stats = compute_ts_stats(&series).unwrap();
        assert_eq!(stats.n_zeros_start, 2);
        assert_eq!(stats.n_zeros_end, 1);
        assert_eq!(stats.plateau_size, 3);
        assert_eq!(stats.plateau_size_nonzero, 3);
        assert_eq!(stats.n_zeros, 3);
    }

    #[test]
    fn test_constant_series() {
        let series: Vec<Option<f64>> = vec![Some(7.0); 12];
        let stats = compute_ts_stats(&series).unwrap();
        assert!(stats.is_constant);
        assert_eq!(stats.n_unique_values, 1);
        assert_relative_eq!(stats.std_dev, 0.0);
        assert_relative_eq!(stats.entropy, 0.0);
    }

    #[test]
    fn test_quartiles_and_trimmed_mean() {
        let series: Vec<Option<f64>> = (1..=100).map(|i| Some(i as f64)).collect();
        let stats = compute_ts_stats(&series).unwrap();
        assert_relative_eq!(stats.q1, 25.75);
        assert_relative_eq!(stats.q3, 75.25);
        assert_relative_eq!(stats.iqr, 49.5);
        assert_relative_eq!(stats.trimmed_mean, 50.5);
    }

    #[test]
    fn test_empty_and_all_null() {
        let stats = compute_ts_stats(&[]).unwrap();
        assert_eq!(stats.length, 0);

        let stats = compute_ts_stats(&[None, None]).unwrap();
        assert_eq!(stats.length, 2);
        assert_eq!(stats.n_nulls, 2);
    }

    #[test]
    fn test_date_aware_fields() {
        // Spacing 10 with one gap of 30.
        let dates = vec![0, 10, 20, 50, 60];
        let series: Vec<Option<f64>> = vec![Some(1.0); 5];
        let stats = compute_ts_stats_with_dates(&dates, &series, None).unwrap();
        assert_eq!(stats.expected_length, Some(7));
        assert_eq!(stats.n_gaps, Some(1));
    }

    #[test]
    fn test_date_aware_with_explicit_frequency() {
        let dates = vec![0, 2, 4, 8];
        let series: Vec<Option<f64>> = vec![Some(1.0); 4];
        let freq = Frequency::parse("2").unwrap();
        let stats =
            compute_ts_stats_with_dates(&dates, &series, Some((freq, DateAxisKind::Integer)))
                .unwrap();
        assert_eq!(stats.expected_length, Some(5));
        assert_eq!(stats.n_gaps, Some(1));
    }
}

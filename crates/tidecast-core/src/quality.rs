//! Data quality scoring.
//!
//! Four dimension scores in [0, 1] plus their mean as the overall score:
//! structural (completeness), temporal (gap density), magnitude (outlier
//! share), behavioral (volatility and sign churn).

use crate::error::Result;

/// Data quality result for a single series.
#[derive(Debug, Clone, Default)]
pub struct DataQuality {
    pub structural_score: f64,
    pub temporal_score: f64,
    pub magnitude_score: f64,
    pub behavioral_score: f64,
    pub overall_score: f64,
    pub n_gaps: usize,
    pub n_missing: usize,
    pub is_constant: bool,
}

/// Score a series; `dates` enables gap detection on the temporal dimension.
pub fn compute_data_quality(values: &[Option<f64>], dates: Option<&[i64]>) -> Result<DataQuality> {
    let n = values.len();
    if n == 0 {
        return Ok(DataQuality::default());
    }

    let n_missing = values.iter().filter(|v| v.is_none()).count();
    let observed: Vec<f64> = values.iter().filter_map(|v| *v).collect();

    let n_gaps = dates.map(count_gaps).unwrap_or(0);

    let is_constant = match observed.as_slice() {
        [] | [_] => true,
        [first, rest @ ..] => rest.iter().all(|v| (v - first).abs() < f64::EPSILON),
    };

    let structural_score = structural(&observed, n_missing, n);
    let temporal_score = temporal(n_gaps, n);
    let magnitude_score = magnitude(&observed);
    let behavioral_score = behavioral(&observed);
    let overall_score =
        (structural_score + temporal_score + magnitude_score + behavioral_score) / 4.0;

    Ok(DataQuality {
        structural_score,
        temporal_score,
        magnitude_score,
        behavioral_score,
        overall_score,
        n_gaps,
        n_missing,
        is_constant,
    })
}

fn count_gaps(dates: &[i64]) -> usize {
    if dates.len() < 2 {
        return 0;
    }
    let mut sorted = dates.to_vec();
    sorted.sort_unstable();

    let diffs: Vec<i64> = sorted.windows(2).map(|w| w[1] - w[0]).collect();
    let mut counts = std::collections::HashMap::new();
    for &d in &diffs {
        *counts.entry(d).or_insert(0usize) += 1;
    }
    let mode = counts
        .into_iter()
        .max_by_key(|(_, c)| *c)
        .map(|(d, _)| d)
        .unwrap_or(1);

    diffs
        .iter()
        .filter(|&&d| d as f64 > mode as f64 * 1.5)
        .count()
}

/// Completeness and length adequacy.
fn structural(observed: &[f64], n_missing: usize, total: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }
    let completeness = 1.0 - n_missing as f64 / total as f64;
    let length_factor = (observed.len() as f64 / 10.0).min(1.0);
    (completeness * length_factor).clamp(0.0, 1.0)
}

/// Inverse gap density.
fn temporal(n_gaps: usize, total: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }
    (1.0 - n_gaps as f64 / total as f64).clamp(0.0, 1.0)
}

/// Share of points inside the 3x IQR fences.
fn magnitude(observed: &[f64]) -> f64 {
    let n = observed.len();
    if n < 4 {
        return if n == 0 { 0.0 } else { 1.0 };
    }

    let mut sorted = observed.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let q1 = sorted[n / 4];
    let q3 = sorted[3 * n / 4];
    let iqr = q3 - q1;
    if iqr.abs() < f64::EPSILON {
        return 1.0;
    }

    let lower = q1 - 3.0 * iqr;
    let upper = q3 + 3.0 * iqr;
    let inliers = observed.iter().filter(|&&v| v >= lower && v <= upper).count();
    inliers as f64 / n as f64
}

/// Penalize erratic step-to-step behaviour relative to the series scale.
fn behavioral(observed: &[f64]) -> f64 {
    let n = observed.len();
    if n < 3 {
        return if n == 0 { 0.0 } else { 0.5 };
    }

    let mean_abs = observed.iter().map(|v| v.abs()).sum::<f64>() / n as f64;
    if mean_abs < f64::EPSILON {
        return 0.5;
    }

    let mean_step = observed
        .windows(2)
        .map(|w| (w[1] - w[0]).abs())
        .sum::<f64>()
        / (n - 1) as f64;
    let volatility = (mean_step / mean_abs).min(2.0) / 2.0;
    (1.0 - volatility).clamp(0.0, 1.0)
}

//! Bayesian online changepoint detection.
//!
//! Tracks the posterior run-length distribution under a constant hazard
//! and a Normal-Gamma conjugate prior; the probability mass that collapses
//! to run length zero at each step is the changepoint probability.

use crate::error::{ForecastError, Result};

/// Per-point changepoint decisions and probabilities.
#[derive(Debug, Clone)]
pub struct BocpdResult {
    pub is_changepoint: Vec<bool>,
    pub changepoint_probability: Vec<f64>,
    /// Indices where the probability crossed the decision threshold.
    pub changepoints: Vec<usize>,
}

const CHANGEPOINT_THRESHOLD: f64 = 0.5;
/// Run lengths tracked before truncation.
const MAX_RUN_LENGTHS: usize = 500;

/// Detect changepoints online. `hazard_lambda` is the expected run length
/// between changepoints; larger values make detections rarer.
pub fn detect_changepoints_bocpd(
    values: &[f64],
    hazard_lambda: f64,
    include_probabilities: bool,
) -> Result<BocpdResult> {
    let n = values.len();
    if n < 3 {
        return Err(ForecastError::InsufficientData { needed: 3, got: n });
    }

    let hazard = 1.0 / hazard_lambda.max(1.0);

    // Prior hyperparameters.
    let mu0 = values.iter().sum::<f64>() / n as f64;
    let kappa0 = 1.0;
    let alpha0 = 1.0;
    let beta0 = 1.0;

    let mut run_length_prob = vec![1.0];
    let mut sum_x = vec![0.0];
    let mut sum_x2 = vec![0.0];
    let mut run_counts = vec![0usize];

    let mut is_changepoint = vec![false; n];
    let mut changepoint_probability = vec![0.0; n];
    let mut changepoints = Vec::new();

    for (t, &x) in values.iter().enumerate() {
        let max_run = run_length_prob.len();

        // Student-t posterior predictive per run length.
        let mut predictive = vec![0.0; max_run];
        for r in 0..max_run {
            let count = run_counts[r] as f64;
            let kappa_n = kappa0 + count;
            let alpha_n = alpha0 + count / 2.0;
            let mu_n = if run_counts[r] > 0 {
                (kappa0 * mu0 + sum_x[r]) / kappa_n
            } else {
                mu0
            };
            let ss = if run_counts[r] > 0 {
                (sum_x2[r] - sum_x[r] * sum_x[r] / count).max(0.0)
            } else {
                0.0
            };
            let beta_n = beta0 + 0.5 * ss + kappa0 * count * (mu0 - mu_n).powi(2) / (2.0 * kappa_n);

            let scale = ((beta_n * (kappa_n + 1.0)) / (alpha_n * kappa_n)).sqrt();
            let z = (x - mu_n) / scale.max(1e-10);
            let nu = 2.0 * alpha_n;
            predictive[r] = (1.0 + z * z / nu).powf(-(nu + 1.0) / 2.0);
        }

        // Grow or reset each run. The reset path scores the datum under the
        // fresh prior (run length zero has empty statistics), so a datum the
        // established runs cannot explain moves mass to run zero.
        let fresh_predictive = predictive[0];
        let mut next_prob = vec![0.0; max_run + 1];
        let mut cp_mass = 0.0;
        for r in 0..max_run {
            next_prob[r + 1] += run_length_prob[r] * predictive[r] * (1.0 - hazard);
            let reset = run_length_prob[r] * fresh_predictive * hazard;
            next_prob[0] += reset;
            cp_mass += reset;
        }

        let total: f64 = next_prob.iter().sum();
        if total > 1e-300 {
            for p in next_prob.iter_mut() {
                *p /= total;
            }
            cp_mass /= total;
        }

        changepoint_probability[t] = cp_mass;
        is_changepoint[t] = cp_mass > CHANGEPOINT_THRESHOLD && t > 0;
        if is_changepoint[t] {
            changepoints.push(t);
        }

        // Shift sufficient statistics: run r at t+1 extends run r-1 at t.
        sum_x.push(0.0);
        sum_x2.push(0.0);
        run_counts.push(0);
        for r in (1..sum_x.len()).rev() {
            sum_x[r] = sum_x[r - 1] + x;
            sum_x2[r] = sum_x2[r - 1] + x * x;
            run_counts[r] = run_counts[r - 1] + 1;
        }
        sum_x[0] = 0.0;
        sum_x2[0] = 0.0;
        run_counts[0] = 0;

        run_length_prob = next_prob;

        if run_length_prob.len() > MAX_RUN_LENGTHS {
            run_length_prob.truncate(MAX_RUN_LENGTHS);
            sum_x.truncate(MAX_RUN_LENGTHS);
            sum_x2.truncate(MAX_RUN_LENGTHS);
            run_counts.truncate(MAX_RUN_LENGTHS);
        }
    }

    if !include_probabilities {
        changepoint_probability = vec![0.0; n];
    }

    Ok(BocpdResult {
        is_changepoint,
        changepoint_probability,
        changepoints,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_shift_raises_probability() {
        let mut values = vec![0.0; 60];
        values.extend(vec![25.0; 60]);
        // Deterministic jitter so the segments are not constant.
        for (i, v) in values.iter_mut().enumerate() {
            *v += ((i * 37) % 10) as f64 * 0.05;
        }

        let result = detect_changepoints_bocpd(&values, 100.0, true).unwrap();
        assert_eq!(result.changepoint_probability.len(), 120);

        // The shift at index 60 should dominate the probability mass.
        let around_shift: f64 = result.changepoint_probability[58..63]
            .iter()
            .cloned()
            .fold(0.0, f64::max);
        let elsewhere: f64 = result.changepoint_probability[10..50]
            .iter()
            .cloned()
            .fold(0.0, f64::max);
        assert!(
            around_shift > elsewhere,
            "shift {} vs elsewhere {}",
            around_shift,
            elsewhere
        );
    }

    #[test]
    fn test_probabilities_in_unit_interval() {
        let values: Vec<f64> = (0..100).map(|i| (i % 7) as f64).collect();
        let result = detect_changepoints_bocpd(&values, 250.0, true).unwrap();
        for &p in &result.changepoint_probability {
            assert!((0.0..=1.0).contains(&p), "probability {} out of range", p);
        }
    }

    #[test]
    fn test_output_lengths_match_input() {
        let values: Vec<f64> = (0..50).map(|i| i as f64 * 0.1).collect();
        let result = detect_changepoints_bocpd(&values, 250.0, false).unwrap();
        assert_eq!(result.is_changepoint.len(), 50);
        assert_eq!(result.changepoint_probability.len(), 50);
        assert!(result.changepoint_probability.iter().all(|&p| p == 0.0));
    }

    #[test]
    fn test_too_short_series() {
        assert!(matches!(
            detect_changepoints_bocpd(&[1.0, 2.0], 250.0, true),
            Err(ForecastError::InsufficientData { needed: 3, got: 2 })
        ));
    }
}

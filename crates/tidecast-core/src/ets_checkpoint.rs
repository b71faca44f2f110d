//! Memory-saving checkpointed backward pass for the ETS gradient engine.
//!
//! Instead of recording every seasonal snapshot, the forward pass stores the
//! state only at checkpoint intervals; the backward pass rebuilds one window
//! of states at a time by replaying `forward_step` from the nearest earlier
//! checkpoint. Live memory drops from O(n * m) to O(n/k * m) checkpoints
//! plus one O(k * m) window scratch.

use crate::ets::{
    backward_step, forward_step, neg_log_likelihood, EtsConfig, EtsErrorKind, GradientComponents,
    ETS_EPSILON,
};
use crate::simd;

/// Checkpointing policy.
#[derive(Debug, Clone)]
pub struct CheckpointConfig {
    pub enabled: bool,
    /// Store every `interval`-th state.
    pub interval: usize,
    /// Only series at least this long use checkpointing.
    pub min_series_length: usize,
}

impl Default for CheckpointConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval: 50,
            min_series_length: 200,
        }
    }
}

/// A state snapshot the backward pass can replay from.
#[derive(Debug, Clone)]
pub struct Checkpoint {
    pub timestep: usize,
    pub level: f64,
    pub trend: f64,
    pub seasonals: Vec<f64>,
}

/// Per-observation quantities the backward pass needs regardless of
/// checkpointing; O(n) memory.
#[derive(Debug, Default)]
pub struct LightPass {
    pub fitted: Vec<f64>,
    pub innovations: Vec<f64>,
    pub innovation_sse: f64,
    pub sum_log_forecast: f64,
}

pub fn should_use_checkpointing(n: usize, _config: &EtsConfig, config: &CheckpointConfig) -> bool {
    config.enabled && n >= config.min_series_length
}

/// Forward pass storing checkpoints at intervals plus the O(n) residual
/// trail. Drives the same `forward_step` as the eager pass.
pub fn create_checkpoints(
    config: &EtsConfig,
    values: &[f64],
    level0: f64,
    trend0: f64,
    seasonal0: &[f64],
    checkpoint_config: &CheckpointConfig,
) -> (Vec<Checkpoint>, LightPass) {
    let n = values.len();
    let m = seasonal0.len().max(1);
    let has_season = config.has_season();

    let mut checkpoints = Vec::with_capacity(n / checkpoint_config.interval.max(1) + 2);
    checkpoints.push(Checkpoint {
        timestep: 0,
        level: level0,
        trend: trend0,
        seasonals: seasonal0.to_vec(),
    });

    let mut light = LightPass {
        fitted: Vec::with_capacity(n),
        innovations: Vec::with_capacity(n),
        innovation_sse: 0.0,
        sum_log_forecast: 0.0,
    };

    let mut level = level0;
    let mut trend = trend0;
    let mut seasonals = seasonal0.to_vec();

    for (t, &observation) in values.iter().enumerate() {
        if t > 0 && t % checkpoint_config.interval == 0 {
            checkpoints.push(Checkpoint {
                timestep: t,
                level,
                trend,
                seasonals: seasonals.clone(),
            });
        }

        let season_idx = if has_season { t % m } else { 0 };
        let (fitted, innovation) =
            forward_step(config, observation, &mut level, &mut trend, &mut seasonals, season_idx);

        light.fitted.push(fitted);
        light.innovations.push(innovation);
        light.innovation_sse += innovation * innovation;
        if config.error == EtsErrorKind::Multiplicative {
            light.sum_log_forecast += fitted.abs().ln();
        }
    }

    checkpoints.push(Checkpoint {
        timestep: n,
        level,
        trend,
        seasonals,
    });

    (checkpoints, light)
}

/// Index of the nearest checkpoint at or before `target_time`.
pub fn find_nearest_checkpoint(checkpoints: &[Checkpoint], target_time: usize) -> usize {
    let mut left = 0;
    let mut right = checkpoints.len();
    while left + 1 < right {
        let mid = (left + right) / 2;
        if checkpoints[mid].timestep <= target_time {
            left = mid;
        } else {
            right = mid;
        }
    }
    left
}

/// Reproduce the state before observation `target_time` by replaying from
/// the nearest earlier checkpoint.
pub fn recompute_state_at(
    checkpoints: &[Checkpoint],
    config: &EtsConfig,
    values: &[f64],
    target_time: usize,
) -> Checkpoint {
    let start = &checkpoints[find_nearest_checkpoint(checkpoints, target_time)];
    if start.timestep == target_time {
        return start.clone();
    }

    let m = start.seasonals.len().max(1);
    let has_season = config.has_season();

    let mut result = Checkpoint {
        timestep: target_time,
        level: start.level,
        trend: start.trend,
        seasonals: start.seasonals.clone(),
    };

    for t in start.timestep..target_time {
        let season_idx = if has_season { t % m } else { 0 };
        forward_step(
            config,
            values[t],
            &mut result.level,
            &mut result.trend,
            &mut result.seasonals,
            season_idx,
        );
    }

    result
}

/// Backward pass over checkpoint windows. Produces the same negative
/// log-likelihood and gradients as the fully recorded path.
pub fn neg_log_likelihood_with_gradients_checkpointed(
    config: &EtsConfig,
    values: &[f64],
    level0: f64,
    trend0: f64,
    seasonal0: &[f64],
    checkpoint_config: &CheckpointConfig,
    gradients: &mut GradientComponents,
) -> f64 {
    let n = values.len();
    if n == 0 {
        return f64::INFINITY;
    }
    let m = config.season_length.max(1);
    let has_season = config.has_season();

    let (checkpoints, light) =
        create_checkpoints(config, values, level0, trend0, seasonal0, checkpoint_config);

    let nll = neg_log_likelihood(config, n, light.innovation_sse, light.sum_log_forecast);
    if !nll.is_finite() {
        return nll;
    }

    let sigma2 = (light.innovation_sse / n as f64).max(ETS_EPSILON);
    let mut d_innovations = vec![0.0; n];
    simd::normalize(&mut d_innovations, &light.innovations, sigma2);

    let mut d_level = 0.0;
    let mut d_trend = 0.0;
    let mut d_seasonal = vec![0.0; if has_season { m } else { 1 }];

    // Window scratch, reused across windows: states before each step.
    let mut window_levels: Vec<f64> = Vec::new();
    let mut window_trends: Vec<f64> = Vec::new();
    let mut window_seasonals: Vec<f64> = Vec::new();

    for pair in (0..checkpoints.len() - 1).rev() {
        let start_cp = &checkpoints[pair];
        let start = start_cp.timestep;
        let end = checkpoints[pair + 1].timestep;
        if end == start {
            continue;
        }
        let window = end - start;

        window_levels.clear();
        window_trends.clear();
        window_seasonals.clear();
        window_levels.reserve(window);
        window_trends.reserve(window);
        if has_season {
            window_seasonals.reserve(window * m);
        }

        let mut level = start_cp.level;
        let mut trend = start_cp.trend;
        let mut seasonals = start_cp.seasonals.clone();

        for t in start..end {
            window_levels.push(level);
            window_trends.push(trend);
            if has_season {
                window_seasonals.extend_from_slice(&seasonals);
            }
            let season_idx = if has_season { t % m } else { 0 };
            forward_step(config, values[t], &mut level, &mut trend, &mut seasonals, season_idx);
        }

        for t in (start..end).rev() {
            let offset = t - start;
            let season_idx = if has_season { t % m } else { 0 };
            let seasonal = if has_season {
                window_seasonals[offset * m + season_idx]
            } else {
                0.0
            };

            backward_step(
                config,
                values[t],
                window_levels[offset],
                window_trends[offset],
                seasonal,
                light.fitted[t],
                light.innovations[t],
                d_innovations[t],
                &mut d_level,
                &mut d_trend,
                &mut d_seasonal[season_idx],
                gradients,
            );
        }
    }

    gradients.d_level0 = d_level;
    gradients.d_trend0 = if config.has_trend() { d_trend } else { 0.0 };

    nll
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ets::{run_backward, run_forward, EtsSeasonKind, EtsTrendKind};
    use approx::assert_relative_eq;

    fn synthetic_series(n: usize) -> Vec<f64> {
        (0..n)
            .map(|t| {
                let tf = t as f64;
                10.0 + 0.01 * tf
                    + 0.5 * (2.0 * std::f64::consts::PI * tf / 12.0).sin()
                    + 0.1 * ((t * 7919 % 100) as f64 / 100.0 - 0.5)
            })
            .collect()
    }

    fn seasonal_config() -> EtsConfig {
        EtsConfig {
            error: EtsErrorKind::Additive,
            trend: EtsTrendKind::DampedAdditive,
            season: EtsSeasonKind::Additive,
            season_length: 12,
            alpha: 0.1,
            beta: Some(0.05),
            gamma: Some(0.05),
            phi: 0.97,
        }
    }

    #[test]
    fn test_replay_reproduces_forward_states_exactly() {
        let config = seasonal_config();
        let values = synthetic_series(500);
        let seasonal0 = vec![0.0; 12];
        let (checkpoints, _) = create_checkpoints(
            &config,
            &values,
            values[0],
            0.01,
            &seasonal0,
            &CheckpointConfig::default(),
        );

        let reference = run_forward(&config, &values, values[0], 0.01, &seasonal0);

        // Bit-identical states at arbitrary timesteps, including ones far
        // from any checkpoint.
        for &t in &[0usize, 1, 49, 50, 51, 137, 250, 499, 500] {
            let replayed = recompute_state_at(&checkpoints, &config, &values, t);
            assert_eq!(replayed.level.to_bits(), reference.levels[t].to_bits());
            assert_eq!(replayed.trend.to_bits(), reference.trends[t].to_bits());
            for j in 0..12 {
                assert_eq!(
                    replayed.seasonals[j].to_bits(),
                    reference.seasonal_row(t, 12)[j].to_bits()
                );
            }
        }
    }

    #[test]
    fn test_checkpointed_gradients_match_eager() {
        let config = seasonal_config();
        let values = synthetic_series(600);
        let seasonal0 = vec![0.0; 12];

        let forward = run_forward(&config, &values, values[0], 0.01, &seasonal0);
        let eager_nll = neg_log_likelihood(
            &config,
            values.len(),
            forward.innovation_sse,
            forward.sum_log_forecast,
        );
        let mut eager = GradientComponents::default();
        run_backward(&config, &values, &forward, &mut eager);

        let mut checked = GradientComponents::default();
        let checked_nll = neg_log_likelihood_with_gradients_checkpointed(
            &config,
            &values,
            values[0],
            0.01,
            &seasonal0,
            &CheckpointConfig::default(),
            &mut checked,
        );

        assert_relative_eq!(eager_nll, checked_nll, max_relative = 1e-12);
        assert_relative_eq!(eager.d_alpha, checked.d_alpha, max_relative = 1e-10);
        assert_relative_eq!(eager.d_beta, checked.d_beta, max_relative = 1e-10);
        assert_relative_eq!(eager.d_gamma, checked.d_gamma, max_relative = 1e-10);
        assert_relative_eq!(eager.d_phi, checked.d_phi, max_relative = 1e-10);
        assert_relative_eq!(eager.d_level0, checked.d_level0, max_relative = 1e-10);
        assert_relative_eq!(eager.d_trend0, checked.d_trend0, max_relative = 1e-10);
    }

    #[test]
    fn test_short_series_skip_checkpointing() {
        let config = seasonal_config();
        assert!(!should_use_checkpointing(100, &config, &CheckpointConfig::default()));
        assert!(should_use_checkpointing(200, &config, &CheckpointConfig::default()));
        let disabled = CheckpointConfig {
            enabled: false,
            ..CheckpointConfig::default()
        };
        assert!(!should_use_checkpointing(1000, &config, &disabled));
    }

    #[test]
    fn test_checkpoint_lookup() {
        let config = seasonal_config();
        let values = synthetic_series(260);
        let (checkpoints, _) = create_checkpoints(
            &config,
            &values,
            values[0],
            0.01,
            &vec![0.0; 12],
            &CheckpointConfig::default(),
        );
        // Expect checkpoints at 0, 50, 100, 150, 200, 250 and the final 260.
        let steps: Vec<usize> = checkpoints.iter().map(|c| c.timestep).collect();
        assert_eq!(steps, vec![0, 50, 100, 150, 200, 250, 260]);

        assert_eq!(checkpoints[find_nearest_checkpoint(&checkpoints, 0)].timestep, 0);
        assert_eq!(checkpoints[find_nearest_checkpoint(&checkpoints, 49)].timestep, 0);
        assert_eq!(checkpoints[find_nearest_checkpoint(&checkpoints, 50)].timestep, 50);
        assert_eq!(checkpoints[find_nearest_checkpoint(&checkpoints, 259)].timestep, 250);
    }
}

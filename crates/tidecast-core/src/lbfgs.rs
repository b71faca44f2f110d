//! Box-constrained limited-memory BFGS.
//!
//! Minimizes a smooth objective with componentwise bounds. The iterate is
//! projected onto the box after every step; gradient components that would
//! push an at-bound coordinate outside the box are masked before the
//! convergence test and the two-loop recursion.

use crate::error::Result;

/// Optimizer options.
#[derive(Debug, Clone)]
pub struct Options {
    pub max_iterations: usize,
    /// Number of retained curvature pairs.
    pub m: usize,
    /// Parameter-step tolerance.
    pub epsilon: f64,
    /// Relative function-change tolerance.
    pub ftol: f64,
    /// Projected-gradient norm tolerance.
    pub gtol: f64,
    pub max_linesearch: usize,
    pub verbose: bool,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            max_iterations: 200,
            m: 10,
            epsilon: 1e-6,
            ftol: 1e-6,
            gtol: 1e-5,
            max_linesearch: 20,
            verbose: false,
        }
    }
}

/// Optimization outcome. `x` is always feasible.
#[derive(Debug, Clone)]
pub struct LbfgsResult {
    pub x: Vec<f64>,
    pub fx: f64,
    pub iterations: usize,
    pub converged: bool,
    pub message: String,
}

const BOUNDARY_TOL: f64 = 1e-10;
const WOLFE_C1: f64 = 1e-4;
const WOLFE_C2: f64 = 0.9;

fn project(x: &mut [f64], lower: &[f64], upper: &[f64]) {
    for i in 0..x.len() {
        x[i] = x[i].max(lower[i]).min(upper[i]);
    }
}

/// Zero out gradient components that point outside the box at an active bound.
fn mask_gradient(g: &mut [f64], x: &[f64], lower: &[f64], upper: &[f64]) {
    for i in 0..x.len() {
        let at_lower = (x[i] - lower[i]).abs() < BOUNDARY_TOL;
        let at_upper = (upper[i] - x[i]).abs() < BOUNDARY_TOL;
        if (at_lower && g[i] > 0.0) || (at_upper && g[i] < 0.0) {
            g[i] = 0.0;
        }
    }
}

fn norm(v: &[f64]) -> f64 {
    v.iter().map(|x| x * x).sum::<f64>().sqrt()
}

/// Minimize `objective` over the box `[lower, upper]` starting from `x0`.
///
/// `objective(x, grad)` fills `grad` and returns the function value. A
/// non-finite value is treated as a line-search rejection; if no finite
/// value is ever seen the result is non-converged with the initial point.
pub fn minimize<F>(
    mut objective: F,
    x0: &[f64],
    lower: &[f64],
    upper: &[f64],
    options: &Options,
) -> Result<LbfgsResult>
where
    F: FnMut(&[f64], &mut [f64]) -> f64,
{
    let n = x0.len();

    let mut x = x0.to_vec();
    project(&mut x, lower, upper);

    let mut g = vec![0.0; n];
    let mut fx = objective(&x, &mut g);

    if !fx.is_finite() {
        return Ok(LbfgsResult {
            x,
            fx,
            iterations: 0,
            converged: false,
            message: "objective not finite at the starting point".to_string(),
        });
    }

    // Curvature pair history for the two-loop recursion.
    let mut s_hist: Vec<Vec<f64>> = Vec::with_capacity(options.m);
    let mut y_hist: Vec<Vec<f64>> = Vec::with_capacity(options.m);
    let mut rho_hist: Vec<f64> = Vec::with_capacity(options.m);

    let mut iterations = 0;

    for iter in 0..options.max_iterations {
        iterations = iter + 1;

        let mut masked_g = g.clone();
        mask_gradient(&mut masked_g, &x, lower, upper);

        if norm(&masked_g) < options.gtol {
            return Ok(LbfgsResult {
                x,
                fx,
                iterations: iter,
                converged: true,
                message: "projected gradient below tolerance".to_string(),
            });
        }

        // Two-loop recursion on the masked gradient.
        let mut direction = masked_g.clone();
        let k = s_hist.len();
        let mut alpha_buf = vec![0.0; k];
        for j in (0..k).rev() {
            let a = rho_hist[j] * crate::simd::dot(&s_hist[j], &direction);
            alpha_buf[j] = a;
            crate::simd::accumulate(&mut direction, &y_hist[j], -a);
        }
        if k > 0 {
            let last = k - 1;
            let yy = crate::simd::dot(&y_hist[last], &y_hist[last]);
            if yy > 0.0 {
                let gamma = crate::simd::dot(&s_hist[last], &y_hist[last]) / yy;
                for d in direction.iter_mut() {
                    *d *= gamma;
                }
            }
        }
        for j in 0..k {
            let beta = rho_hist[j] * crate::simd::dot(&y_hist[j], &direction);
            crate::simd::accumulate(&mut direction, &s_hist[j], alpha_buf[j] - beta);
        }
        for d in direction.iter_mut() {
            *d = -*d;
        }

        // Guard against ascent directions from stale curvature.
        let dir_deriv = crate::simd::dot(&direction, &masked_g);
        if dir_deriv >= 0.0 {
            for (d, gi) in direction.iter_mut().zip(masked_g.iter()) {
                *d = -gi;
            }
        }
        let dir_deriv = crate::simd::dot(&direction, &masked_g);

        // Wolfe line search with projection at every trial point.
        let mut step = 1.0;
        let mut step_lo = 0.0;
        let mut step_hi = f64::INFINITY;
        let mut x_new = vec![0.0; n];
        let mut g_new = vec![0.0; n];
        let mut f_new = fx;
        let mut accepted = false;

        for _ in 0..options.max_linesearch {
            for i in 0..n {
                x_new[i] = x[i] + step * direction[i];
            }
            project(&mut x_new, lower, upper);

            f_new = objective(&x_new, &mut g_new);

            if !f_new.is_finite() || f_new > fx + WOLFE_C1 * step * dir_deriv {
                step_hi = step;
                step = 0.5 * (step_lo + step_hi);
                continue;
            }
            let new_deriv = crate::simd::dot(&g_new, &direction);
            if new_deriv < WOLFE_C2 * dir_deriv {
                step_lo = step;
                step = if step_hi.is_finite() {
                    0.5 * (step_lo + step_hi)
                } else {
                    2.0 * step
                };
                continue;
            }
            accepted = true;
            break;
        }

        if !accepted {
            // Accept a plain decrease if the last trial found one.
            if !(f_new.is_finite() && f_new < fx) {
                return Ok(LbfgsResult {
                    x,
                    fx,
                    iterations,
                    converged: false,
                    message: "line search failed".to_string(),
                });
            }
        }

        let mut s = vec![0.0; n];
        let mut y = vec![0.0; n];
        for i in 0..n {
            s[i] = x_new[i] - x[i];
            y[i] = g_new[i] - g[i];
        }

        let f_change = (fx - f_new).abs() / fx.abs().max(1.0);
        let step_norm = norm(&s);

        x.copy_from_slice(&x_new);
        g.copy_from_slice(&g_new);
        let f_prev = fx;
        fx = f_new;

        if options.verbose {
            log::debug!("lbfgs iter {}: f = {:.6e} (prev {:.6e})", iter, fx, f_prev);
        }

        if f_change < options.ftol {
            return Ok(LbfgsResult {
                x,
                fx,
                iterations,
                converged: true,
                message: "function change below tolerance".to_string(),
            });
        }
        if step_norm < options.epsilon {
            return Ok(LbfgsResult {
                x,
                fx,
                iterations,
                converged: true,
                message: "parameter step below tolerance".to_string(),
            });
        }

        // Store the curvature pair when it preserves positive definiteness.
        let sy = crate::simd::dot(&s, &y);
        if sy > 1e-10 {
            if s_hist.len() == options.m {
                s_hist.remove(0);
                y_hist.remove(0);
                rho_hist.remove(0);
            }
            rho_hist.push(1.0 / sy);
            s_hist.push(s);
            y_hist.push(y);
        }
    }

    Ok(LbfgsResult {
        x,
        fx,
        iterations,
        converged: false,
        message: "iteration limit reached".to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_quadratic_unconstrained_interior() {
        // f(x) = (x0 - 1)^2 + 4 (x1 + 2)^2, minimum inside the box.
        let obj = |x: &[f64], g: &mut [f64]| {
            g[0] = 2.0 * (x[0] - 1.0);
            g[1] = 8.0 * (x[1] + 2.0);
            (x[0] - 1.0).powi(2) + 4.0 * (x[1] + 2.0).powi(2)
        };
        let result = minimize(
            obj,
            &[0.0, 0.0],
            &[-10.0, -10.0],
            &[10.0, 10.0],
            &Options::default(),
        )
        .unwrap();
        assert!(result.converged, "{}", result.message);
        assert_relative_eq!(result.x[0], 1.0, epsilon = 1e-4);
        assert_relative_eq!(result.x[1], -2.0, epsilon = 1e-4);
    }

    #[test]
    fn test_minimum_outside_box_lands_on_bound() {
        // f(x) = (x - 5)^2 constrained to [0, 1]: optimum at the upper bound.
        let obj = |x: &[f64], g: &mut [f64]| {
            g[0] = 2.0 * (x[0] - 5.0);
            (x[0] - 5.0).powi(2)
        };
        let result = minimize(obj, &[0.5], &[0.0], &[1.0], &Options::default()).unwrap();
        assert_relative_eq!(result.x[0], 1.0, epsilon = 1e-8);
        assert!(result.converged);
    }

    #[test]
    fn test_result_is_always_feasible() {
        let obj = |x: &[f64], g: &mut [f64]| {
            g[0] = 2.0 * x[0];
            g[1] = 2.0 * x[1];
            x[0] * x[0] + x[1] * x[1]
        };
        // Infeasible starting point gets projected.
        let result = minimize(obj, &[5.0, -5.0], &[1.0, -2.0], &[3.0, -1.0], &Options::default())
            .unwrap();
        assert!(result.x[0] >= 1.0 && result.x[0] <= 3.0);
        assert!(result.x[1] >= -2.0 && result.x[1] <= -1.0);
    }

    #[test]
    fn test_rosenbrock_converges() {
        let obj = |x: &[f64], g: &mut [f64]| {
            let (a, b) = (x[0], x[1]);
            g[0] = -2.0 * (1.0 - a) - 400.0 * a * (b - a * a);
            g[1] = 200.0 * (b - a * a);
            (1.0 - a).powi(2) + 100.0 * (b - a * a).powi(2)
        };
        let opts = Options {
            max_iterations: 500,
            ..Options::default()
        };
        let result = minimize(obj, &[-1.2, 1.0], &[-5.0, -5.0], &[5.0, 5.0], &opts).unwrap();
        assert!(result.fx < 1e-6, "f = {}", result.fx);
    }

    #[test]
    fn test_nonfinite_start_reports_nonconvergence() {
        let obj = |_x: &[f64], g: &mut [f64]| {
            g[0] = 0.0;
            f64::NAN
        };
        let result = minimize(obj, &[0.5], &[0.0], &[1.0], &Options::default()).unwrap();
        assert!(!result.converged);
    }
}

//! Shared numeric primitives: robust regression, medians, guards.

use crate::error::{ForecastError, Result};

const EPSILON: f64 = 1e-8;
const POSITIVE_FLOOR: f64 = 1e-6;

/// Divide with a floor on the denominator magnitude so the result stays finite.
#[inline]
pub fn safe_divide(num: f64, denom: f64) -> f64 {
    let d = if denom.abs() < EPSILON {
        if denom >= 0.0 {
            EPSILON
        } else {
            -EPSILON
        }
    } else {
        denom
    };
    num / d
}

/// Floor a value at a small positive constant.
#[inline]
pub fn clamp_positive(value: f64) -> f64 {
    value.max(POSITIVE_FLOOR)
}

/// Median via partial selection, average O(n). The input slice is reordered.
///
/// Even-count inputs return the mean of the two central order statistics.
pub fn median(data: &mut [f64]) -> Result<f64> {
    if data.is_empty() {
        return Err(ForecastError::InvalidInput(
            "cannot compute median of empty slice".to_string(),
        ));
    }

    let n = data.len();
    let mid = n / 2;

    let cmp = |a: &f64, b: &f64| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal);
    data.select_nth_unstable_by(mid, cmp);
    let mid_val = data[mid];

    if n % 2 == 1 {
        Ok(mid_val)
    } else {
        // Maximum of the lower half is the other central order statistic.
        let lower_max = data[..mid].iter().cloned().fold(f64::NEG_INFINITY, f64::max);
        Ok((lower_max + mid_val) / 2.0)
    }
}

/// Siegel repeated-medians regression: slope and intercept with a 50% breakdown point.
///
/// For each point the median of its pairwise slopes is taken; the slope estimate
/// is the median of those medians, the intercept the median of `y - slope * x`.
/// Pairwise slopes over coincident x values count as zero.
pub fn siegel_repeated_medians(x: &[f64], y: &[f64]) -> Result<(f64, f64)> {
    let n = x.len();

    if n != y.len() {
        return Err(ForecastError::InvalidInput(format!(
            "x and y must have the same length: {} vs {}",
            n,
            y.len()
        )));
    }
    if n < 2 {
        return Err(ForecastError::InvalidInput(
            "need at least 2 points for regression".to_string(),
        ));
    }

    let mut point_medians = vec![0.0; n];
    let mut pairwise = vec![0.0; n - 1];

    for i in 0..n {
        let mut k = 0;
        for j in 0..n {
            if i == j {
                continue;
            }
            let xd = x[j] - x[i];
            pairwise[k] = if xd.abs() < 1e-10 {
                0.0
            } else {
                (y[j] - y[i]) / xd
            };
            k += 1;
        }
        point_medians[i] = median(&mut pairwise)?;
    }

    let slope = median(&mut point_medians)?;

    let mut intercepts: Vec<f64> = x.iter().zip(y.iter()).map(|(xi, yi)| yi - slope * xi).collect();
    let intercept = median(&mut intercepts)?;

    Ok((slope, intercept))
}

/// Minimize a one-dimensional function over `[lo, hi]` by golden-section search.
///
/// Used by the self-tuning model variants whose objectives are scalar and
/// derivative-free. Returns the best argument found.
pub fn minimize_scalar<F: FnMut(f64) -> f64>(mut f: F, lo: f64, hi: f64, tol: f64) -> f64 {
    const INVPHI: f64 = 0.618_033_988_749_894_8;

    let mut a = lo;
    let mut b = hi;
    let mut c = b - INVPHI * (b - a);
    let mut d = a + INVPHI * (b - a);
    let mut fc = f(c);
    let mut fd = f(d);

    while (b - a).abs() > tol {
        if fc < fd {
            b = d;
            d = c;
            fd = fc;
            c = b - INVPHI * (b - a);
            fc = f(c);
        } else {
            a = c;
            c = d;
            fc = fd;
            d = a + INVPHI * (b - a);
            fd = f(d);
        }
    }

    (a + b) / 2.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_median_odd() {
        let mut data = vec![3.0, 1.0, 2.0];
        assert_relative_eq!(median(&mut data).unwrap(), 2.0);
    }

    #[test]
    fn test_median_even() {
        let mut data = vec![3.0, 1.0, 4.0, 2.0];
        assert_relative_eq!(median(&mut data).unwrap(), 2.5);
    }

    #[test]
    fn test_median_empty_fails() {
        let mut data: Vec<f64> = vec![];
        assert!(matches!(
            median(&mut data),
            Err(ForecastError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_siegel_clean_line() {
        let x = vec![1.0, 2.0, 3.0, 4.0, 5.0];
        let y = vec![3.0, 5.0, 7.0, 9.0, 11.0];
        let (slope, intercept) = siegel_repeated_medians(&x, &y).unwrap();
        assert_relative_eq!(slope, 2.0, epsilon = 0.2);
        assert_relative_eq!(intercept, 1.0, epsilon = 0.2);
    }

    #[test]
    fn test_siegel_resists_outlier() {
        let x = vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0];
        let mut y: Vec<f64> = x.iter().map(|v| 2.0 * v + 1.0).collect();
        y[3] = 100.0;
        let (slope, _) = siegel_repeated_medians(&x, &y).unwrap();
        assert_relative_eq!(slope, 2.0, epsilon = 0.2);
    }

    #[test]
    fn test_siegel_too_few_points() {
        assert!(matches!(
            siegel_repeated_medians(&[1.0], &[2.0]),
            Err(ForecastError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_siegel_length_mismatch() {
        assert!(matches!(
            siegel_repeated_medians(&[1.0, 2.0], &[2.0]),
            Err(ForecastError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_safe_divide_near_zero() {
        assert!(safe_divide(1.0, 0.0).is_finite());
        assert!(safe_divide(1.0, -0.0).is_finite());
        assert_relative_eq!(safe_divide(6.0, 3.0), 2.0);
    }

    #[test]
    fn test_minimize_scalar_parabola() {
        let x = minimize_scalar(|v| (v - 0.3) * (v - 0.3), 0.0, 1.0, 1e-8);
        assert_relative_eq!(x, 0.3, epsilon = 1e-6);
    }
}

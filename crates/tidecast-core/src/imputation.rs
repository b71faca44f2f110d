//! Missing-value handling used by the forecast drivers.

/// Fill NULL values by linear interpolation between observed neighbours.
/// Leading and trailing NULL runs take the nearest observed value. A series
/// with no observed values at all comes back as NaN.
pub fn fill_nulls_interpolate(values: &[Option<f64>]) -> Vec<f64> {
    let mut result = vec![f64::NAN; values.len()];

    let first = match values.iter().position(|v| v.is_some()) {
        Some(i) => i,
        None => return result,
    };
    let last = values
        .iter()
        .rposition(|v| v.is_some())
        .unwrap_or(first);

    let first_val = values[first].unwrap_or(f64::NAN);
    let last_val = values[last].unwrap_or(f64::NAN);
    result[..first].fill(first_val);
    result[last + 1..].fill(last_val);

    let mut prev_idx = first;
    let mut prev_val = first_val;
    result[first] = first_val;

    for i in (first + 1)..=last {
        if let Some(v) = values[i] {
            let gap = i - prev_idx;
            if gap > 1 {
                let slope = (v - prev_val) / gap as f64;
                for j in 1..gap {
                    result[prev_idx + j] = prev_val + slope * j as f64;
                }
            }
            result[i] = v;
            prev_idx = i;
            prev_val = v;
        }
    }

    result
}

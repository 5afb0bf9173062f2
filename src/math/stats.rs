//! NaN-aware reductions and weighted-sample statistics.

use std::cmp::Ordering;

/// `ln(e^a + e^b)` without overflow. `-inf` is the identity.
pub fn log_add_exp(a: f64, b: f64) -> f64 {
    if a == f64::NEG_INFINITY {
        return b;
    }
    if b == f64::NEG_INFINITY {
        return a;
    }
    let (hi, lo) = if a >= b { (a, b) } else { (b, a) };
    hi + (lo - hi).exp().ln_1p()
}

/// Sum of the non-NaN values and how many there were.
pub fn nan_sum(values: &[f64]) -> (f64, usize) {
    values
        .iter()
        .filter(|v| !v.is_nan())
        .fold((0.0, 0), |(s, n), v| (s + v, n + 1))
}

/// Quantile (`q` in `[0, 1]`) with linear interpolation between order statistics.
///
/// NaN entries are ignored. Returns NaN for an empty input.
pub fn quantile(values: &[f64], q: f64) -> f64 {
    let mut sorted: Vec<f64> = values.iter().copied().filter(|v| !v.is_nan()).collect();
    if sorted.is_empty() || !(0.0..=1.0).contains(&q) {
        return f64::NAN;
    }
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));
    let pos = q * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    let frac = pos - lo as f64;
    sorted[lo] + (sorted[hi] - sorted[lo]) * frac
}

/// Population standard deviation of the non-NaN values.
pub fn stdev(values: &[f64]) -> f64 {
    let (sum, n) = nan_sum(values);
    if n == 0 {
        return f64::NAN;
    }
    let mean = sum / n as f64;
    let var = values
        .iter()
        .filter(|v| !v.is_nan())
        .map(|v| (v - mean) * (v - mean))
        .sum::<f64>()
        / n as f64;
    var.sqrt()
}

/// Max over non-NaN values, or NaN if there are none.
pub fn nan_max(values: &[f64]) -> f64 {
    values
        .iter()
        .copied()
        .filter(|v| !v.is_nan())
        .fold(f64::NAN, |acc, v| if acc.is_nan() || v > acc { v } else { acc })
}

/// Min over non-NaN values, or NaN if there are none.
pub fn nan_min(values: &[f64]) -> f64 {
    values
        .iter()
        .copied()
        .filter(|v| !v.is_nan())
        .fold(f64::NAN, |acc, v| if acc.is_nan() || v < acc { v } else { acc })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn log_add_exp_is_stable() {
        assert_relative_eq!(log_add_exp(0.0, 0.0), 2.0_f64.ln(), epsilon = 1e-12);
        assert_relative_eq!(log_add_exp(-1000.0, -1000.0), -1000.0 + 2.0_f64.ln(), epsilon = 1e-9);
        assert_eq!(log_add_exp(f64::NEG_INFINITY, -3.0), -3.0);
    }

    #[test]
    fn nan_sum_skips_nan() {
        let (s, n) = nan_sum(&[-10.0, f64::NAN, -12.0]);
        assert_eq!(n, 2);
        assert_relative_eq!(s, -22.0);
    }

    #[test]
    fn quantile_interpolates() {
        let v = [4.0, 1.0, 3.0, 2.0, 5.0];
        assert_relative_eq!(quantile(&v, 0.5), 3.0);
        assert_relative_eq!(quantile(&v, 0.25), 2.0);
        assert_relative_eq!(quantile(&v, 0.125), 1.5);
        assert!(quantile(&[], 0.5).is_nan());
    }

    #[test]
    fn extrema_ignore_nan() {
        let v = [f64::NAN, 2.0, -1.0, f64::NAN];
        assert_eq!(nan_max(&v), 2.0);
        assert_eq!(nan_min(&v), -1.0);
        assert!(nan_max(&[f64::NAN]).is_nan());
    }
}

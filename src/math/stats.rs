//! Small numerically careful helpers for likelihood work.

use std::f64::consts::PI;

/// `ln N(y; mean, variance)`.
pub fn log_normal_pdf(y: f64, mean: f64, variance: f64) -> f64 {
    let r = y - mean;
    -0.5 * ((2.0 * PI * variance).ln() + r * r / variance)
}

/// `ln Σ exp(x_i)` without overflow. Returns `-inf` when every term is `-inf`.
pub fn log_sum_exp(xs: &[f64]) -> f64 {
    let max = xs.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if !max.is_finite() {
        return max;
    }
    let sum: f64 = xs.iter().map(|&x| (x - max).exp()).sum();
    max + sum.ln()
}

pub fn mean(xs: &[f64]) -> Option<f64> {
    if xs.is_empty() {
        return None;
    }
    Some(xs.iter().sum::<f64>() / xs.len() as f64)
}

/// Population variance (`n` denominator), matching the ML variance estimate.
pub fn variance(xs: &[f64]) -> Option<f64> {
    let m = mean(xs)?;
    Some(xs.iter().map(|x| (x - m).powi(2)).sum::<f64>() / xs.len() as f64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_sum_exp_handles_large_and_infinite_terms() {
        let v = log_sum_exp(&[1000.0, 1000.0]);
        assert!((v - (1000.0 + 2f64.ln())).abs() < 1e-9);
        assert_eq!(log_sum_exp(&[f64::NEG_INFINITY, f64::NEG_INFINITY]), f64::NEG_INFINITY);
        assert!((log_sum_exp(&[f64::NEG_INFINITY, 0.0]) - 0.0).abs() < 1e-12);
    }

    #[test]
    fn standard_normal_density_at_zero() {
        let v = log_normal_pdf(0.0, 0.0, 1.0);
        assert!((v - (-(2.0 * PI).ln() / 2.0)).abs() < 1e-12);
    }

    #[test]
    fn moments() {
        assert_eq!(mean(&[]), None);
        assert!((variance(&[1.0, 3.0]).unwrap() - 1.0).abs() < 1e-12);
    }
}

//! Hamilton filter and Kim smoother.
//!
//! Forward pass (filter), for each date `t`:
//!
//! ```text
//! pred_t(j)   = Σ_i filt_{t-1}(i) P_ij          (pred_0 = steady state of P)
//! joint_t(j)  = pred_t(j) · N(y_t; x_t'β_j, σ²_j)
//! ℓ_t         = ln Σ_j joint_t(j)
//! filt_t(j)   = joint_t(j) / exp(ℓ_t)
//! ```
//!
//! The densities are combined in log space so that very peaked regimes (tiny
//! variances) do not underflow.
//!
//! Backward pass (smoother), from `T-1` down to `0`:
//!
//! ```text
//! ξ_t(i, j)   = filt_t(i) P_ij smooth_{t+1}(j) / pred_{t+1}(j)
//! smooth_t(i) = Σ_j ξ_t(i, j)
//! ```

use nalgebra::{DMatrix, DVector};

use crate::math::{log_normal_pdf, log_sum_exp, solve_least_squares};
use crate::regime::design::{Design, Params};

/// Probabilities below this are treated as zero in smoother ratios.
const TINY: f64 = 1e-300;

#[derive(Debug, Clone)]
pub(crate) struct FilterOutput {
    pub initial: Vec<f64>,
    /// `pred_t`, one row per date.
    pub predicted: Vec<Vec<f64>>,
    /// `filt_t`, one row per date.
    pub filtered: Vec<Vec<f64>>,
    pub log_likelihood: f64,
}

#[derive(Debug, Clone)]
pub(crate) struct SmootherOutput {
    pub smoothed: Vec<Vec<f64>>,
    /// `Σ_t ξ_t(i, j)` over `t = 0..T-2`.
    pub joint_sums: Vec<Vec<f64>>,
}

/// Stationary distribution `π = P'π`, `Σ π = 1`.
///
/// Solved as a least squares problem on the stacked system
/// `[(I - P'); 1'] π = [0; 1]`. Falls back to uniform if that fails.
pub(crate) fn steady_state(transition: &[Vec<f64>]) -> Vec<f64> {
    let k = transition.len();
    let uniform = vec![1.0 / k as f64; k];
    if k == 0 {
        return uniform;
    }

    let mut a = DMatrix::<f64>::zeros(k + 1, k);
    for r in 0..k {
        for c in 0..k {
            let identity = if r == c { 1.0 } else { 0.0 };
            a[(r, c)] = identity - transition[c][r];
        }
    }
    for c in 0..k {
        a[(k, c)] = 1.0;
    }
    let mut b = DVector::<f64>::zeros(k + 1);
    b[k] = 1.0;

    let Some(pi) = solve_least_squares(&a, &b) else {
        return uniform;
    };
    let mut pi: Vec<f64> = pi.iter().map(|v| v.max(0.0)).collect();
    let total: f64 = pi.iter().sum();
    if !(total.is_finite() && total > 0.0) {
        return uniform;
    }
    for v in &mut pi {
        *v /= total;
    }
    pi
}

/// Run the Hamilton filter. Returns `None` when the likelihood is not finite.
pub(crate) fn hamilton_filter(design: &Design, params: &Params) -> Option<FilterOutput> {
    let k = params.k();
    let n = design.n_obs();
    let initial = steady_state(&params.transition);

    let mut predicted = Vec::with_capacity(n);
    let mut filtered: Vec<Vec<f64>> = Vec::with_capacity(n);
    let mut log_likelihood = 0.0;
    let mut log_joint = vec![0.0; k];

    for t in 0..n {
        let pred: Vec<f64> = match filtered.last() {
            None => initial.clone(),
            Some(prev) => (0..k)
                .map(|j| (0..k).map(|i| prev[i] * params.transition[i][j]).sum())
                .collect(),
        };

        for j in 0..k {
            let mu = design.mean(t, &params.betas[j]);
            log_joint[j] = pred[j].ln() + log_normal_pdf(design.y[t], mu, params.variances[j]);
        }

        let ll_t = log_sum_exp(&log_joint);
        if !ll_t.is_finite() {
            return None;
        }
        log_likelihood += ll_t;

        let filt: Vec<f64> = log_joint.iter().map(|lj| (lj - ll_t).exp()).collect();
        predicted.push(pred);
        filtered.push(filt);
    }

    if !log_likelihood.is_finite() {
        return None;
    }

    Some(FilterOutput {
        initial,
        predicted,
        filtered,
        log_likelihood,
    })
}

/// Run the Kim smoother over a completed filter pass.
pub(crate) fn kim_smoother(transition: &[Vec<f64>], filter: &FilterOutput) -> SmootherOutput {
    let n = filter.filtered.len();
    let k = transition.len();
    let mut smoothed = vec![vec![0.0; k]; n];
    let mut joint_sums = vec![vec![0.0; k]; k];

    if n == 0 {
        return SmootherOutput { smoothed, joint_sums };
    }

    smoothed[n - 1] = filter.filtered[n - 1].clone();

    for t in (0..n - 1).rev() {
        let ratio: Vec<f64> = (0..k)
            .map(|j| {
                let pred = filter.predicted[t + 1][j];
                if pred > TINY { smoothed[t + 1][j] / pred } else { 0.0 }
            })
            .collect();

        let mut total = 0.0;
        for i in 0..k {
            let mut s = 0.0;
            for j in 0..k {
                let xi = filter.filtered[t][i] * transition[i][j] * ratio[j];
                joint_sums[i][j] += xi;
                s += xi;
            }
            smoothed[t][i] = s;
            total += s;
        }

        // Renormalize away rounding drift; fall back to the filtered row if the
        // smoothed mass vanished.
        if total > TINY {
            for v in &mut smoothed[t] {
                *v /= total;
            }
        } else {
            smoothed[t] = filter.filtered[t].clone();
        }
    }

    SmootherOutput { smoothed, joint_sums }
}

//! Weighted least squares solver.
//!
//! The M-step of the regime estimator solves one small regression per regime:
//!
//! ```text
//! minimize Σ w_t (y_t - x_t^T β)^2
//! ```
//!
//! where `w_t` is the smoothed probability of that regime at date `t`.
//!
//! Implementation choices:
//! - We scale rows by `sqrt(w_t)` and solve an ordinary least squares problem.
//! - We use SVD to solve the least-squares problem robustly even when the design
//!   matrix is tall (more rows than columns). Nalgebra's `QR::solve` is intended
//!   for square systems and will panic for non-square matrices.
//! - The parameter dimension is tiny (one or two columns), so SVD cost is
//!   negligible next to the filtering passes.

use nalgebra::{DMatrix, DVector};

/// Solve a least squares problem using SVD.
///
/// Returns `None` if the system is too ill-conditioned to solve robustly.
pub fn solve_least_squares(x: &DMatrix<f64>, y: &DVector<f64>) -> Option<DVector<f64>> {
    let svd = x.clone().svd(true, true);

    // Try progressively looser tolerances if strict solve fails. A regime that
    // carries almost no probability mass yields a nearly zero design matrix.
    for &tol in &[1e-10, 1e-8, 1e-6] {
        if let Ok(beta) = svd.solve(y, tol) {
            if beta.iter().all(|v| v.is_finite()) {
                return Some(beta);
            }
        }
    }

    None
}

/// Weighted least squares over row-major design rows.
///
/// Rows with zero (or negative) weight contribute nothing. Returns `None` when
/// the weighted design has no usable rows or the solve fails.
pub fn solve_weighted_least_squares(rows: &[Vec<f64>], y: &[f64], w: &[f64]) -> Option<Vec<f64>> {
    let n = rows.len();
    let p = rows.first().map(Vec::len)?;
    if p == 0 || n != y.len() || n != w.len() {
        return None;
    }
    if w.iter().all(|&wi| wi <= 0.0) {
        return None;
    }

    let mut x = DMatrix::<f64>::zeros(n, p);
    let mut yy = DVector::<f64>::zeros(n);
    for t in 0..n {
        let sw = w[t].max(0.0).sqrt();
        for c in 0..p {
            x[(t, c)] = rows[t][c] * sw;
        }
        yy[t] = y[t] * sw;
    }

    solve_least_squares(&x, &yy).map(|beta| beta.iter().copied().collect())
}

//! Expectation–maximization for Markov-switching regression.
//!
//! Each iteration:
//! - E-step: Hamilton filter + Kim smoother under the current parameters
//! - M-step:
//!   - `P_ij = Σ_t ξ_t(i, j) / Σ_t smooth_t(i)` (t over `0..T-1`)
//!   - `β_j`  = weighted least squares with weights `smooth_·(j)`
//!   - `σ²_j` = weighted mean squared residual (pooled over regimes when the
//!     variance does not switch)
//!
//! Two safeguards keep the likelihood finite: variances are floored and
//! transition probabilities are clamped away from zero. Both are tiny relative
//! to the data scale so they only matter for degenerate inputs (e.g. a 0/1
//! series, where a regime can fit its points exactly).

use tracing::debug;

use crate::domain::FitStatus;
use crate::error::FitError;
use crate::math::solve_weighted_least_squares;
use crate::regime::design::{Design, Params};
use crate::regime::filter::{hamilton_filter, kim_smoother, FilterOutput, SmootherOutput};

/// Lower bound on every transition probability.
const PROB_FLOOR: f64 = 1e-8;

/// Probability mass below which a regime's M-step update is skipped.
const MASS_EPS: f64 = 1e-10;

#[derive(Debug, Clone, Copy)]
pub(crate) struct EmOptions {
    pub max_iter: usize,
    pub tolerance: f64,
    pub switching_variance: bool,
    pub variance_floor: f64,
}

/// Output of one E-step.
#[derive(Debug, Clone)]
pub(crate) struct EStep {
    pub filter: FilterOutput,
    pub smoother: SmootherOutput,
}

impl EStep {
    pub fn log_likelihood(&self) -> f64 {
        self.filter.log_likelihood
    }
}

/// Result of an EM run.
#[derive(Debug, Clone)]
pub(crate) struct EmRun {
    pub params: Params,
    pub estep: EStep,
    pub start_log_likelihood: f64,
    pub iterations: usize,
    pub status: FitStatus,
}

pub(crate) fn e_step(design: &Design, params: &Params) -> Option<EStep> {
    if !params.is_finite() {
        return None;
    }
    let filter = hamilton_filter(design, params)?;
    let smoother = kim_smoother(&params.transition, &filter);
    Some(EStep { filter, smoother })
}

pub(crate) fn m_step(design: &Design, estep: &EStep, prev: &Params, opts: &EmOptions) -> Params {
    let k = prev.k();
    let n = design.n_obs();
    let smoothed = &estep.smoother.smoothed;

    // Transition probabilities.
    let mut transition = prev.transition.clone();
    for i in 0..k {
        let from_mass: f64 = smoothed[..n.saturating_sub(1)].iter().map(|row| row[i]).sum();
        if from_mass <= MASS_EPS {
            continue;
        }
        let mut row: Vec<f64> = (0..k)
            .map(|j| (estep.smoother.joint_sums[i][j] / from_mass).max(PROB_FLOOR))
            .collect();
        let total: f64 = row.iter().sum();
        for v in &mut row {
            *v /= total;
        }
        transition[i] = row;
    }

    // Regression coefficients.
    let mut betas = prev.betas.clone();
    if design.n_cols() > 0 {
        for j in 0..k {
            let w: Vec<f64> = smoothed.iter().map(|row| row[j]).collect();
            if let Some(beta) = solve_weighted_least_squares(&design.rows, &design.y, &w) {
                betas[j] = beta;
            }
        }
    }

    // Variances.
    let mut weighted_sse = vec![0.0; k];
    let mut mass = vec![0.0; k];
    for t in 0..n {
        for j in 0..k {
            let r = design.y[t] - design.mean(t, &betas[j]);
            weighted_sse[j] += smoothed[t][j] * r * r;
            mass[j] += smoothed[t][j];
        }
    }

    let variances = if opts.switching_variance {
        (0..k)
            .map(|j| {
                if mass[j] > MASS_EPS {
                    (weighted_sse[j] / mass[j]).max(opts.variance_floor)
                } else {
                    prev.variances[j]
                }
            })
            .collect()
    } else {
        let pooled = (weighted_sse.iter().sum::<f64>() / n.max(1) as f64).max(opts.variance_floor);
        vec![pooled; k]
    };

    Params {
        betas,
        variances,
        transition,
    }
}

/// Iterate EM from `start` until the relative log-likelihood change falls below
/// the tolerance, the iteration cap is hit, or the likelihood breaks down.
pub(crate) fn run_em(design: &Design, start: Params, opts: &EmOptions) -> Result<EmRun, FitError> {
    let mut params = start;
    let mut estep = e_step(design, &params).ok_or_else(|| FitError::ConvergenceFailure {
        iterations: 0,
        reason: "log-likelihood is not finite at the starting values".to_string(),
    })?;
    let start_log_likelihood = estep.log_likelihood();

    let mut iterations = 0usize;
    let mut status = FitStatus::IterationCap;

    while iterations < opts.max_iter {
        let next = m_step(design, &estep, &params, opts);
        iterations += 1;

        let Some(next_estep) = e_step(design, &next) else {
            status = FitStatus::Failed {
                reason: format!("log-likelihood became non-finite at iteration {iterations}"),
            };
            break;
        };

        let prev_ll = estep.log_likelihood();
        let delta = next_estep.log_likelihood() - prev_ll;
        params = next;
        estep = next_estep;

        if iterations % 500 == 0 {
            debug!(iterations, log_likelihood = estep.log_likelihood(), delta, "EM progress");
        }

        if delta.abs() <= opts.tolerance * (1.0 + prev_ll.abs()) {
            status = FitStatus::Converged;
            break;
        }
    }

    Ok(EmRun {
        params,
        estep,
        start_log_likelihood,
        iterations,
        status,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Trend;
    use crate::regime::design::persistent_transition;

    fn opts(max_iter: usize) -> EmOptions {
        EmOptions {
            max_iter,
            tolerance: 1e-10,
            switching_variance: true,
            variance_floor: 1e-10,
        }
    }

    /// Two long blocks around +1 and -1 with a little deterministic noise.
    fn block_series() -> Vec<f64> {
        (0..80)
            .map(|t| {
                let wiggle = 0.1 * ((t as f64) * 1.7).sin();
                if (t / 20) % 2 == 0 { 1.0 + wiggle } else { -1.0 + wiggle }
            })
            .collect()
    }

    fn start() -> Params {
        Params {
            betas: vec![vec![0.5], vec![-0.5]],
            variances: vec![1.0, 1.0],
            transition: persistent_transition(2, 0.9),
        }
    }

    #[test]
    fn em_separates_blocks_and_improves_likelihood() {
        let y = block_series();
        let design = Design::new(&y, None, Trend::Constant);
        let run = run_em(&design, start(), &opts(500)).unwrap();

        assert!(run.estep.log_likelihood() > run.start_log_likelihood);
        assert!((run.params.betas[0][0] - 1.0).abs() < 0.05);
        assert!((run.params.betas[1][0] + 1.0).abs() < 0.05);
        // 4 blocks of 20 → 3 switches in 79 transitions.
        assert!(run.params.transition[0][0] > 0.85);
        assert!(run.params.transition[1][1] > 0.85);
    }

    #[test]
    fn iteration_cap_is_reported() {
        let y = block_series();
        let design = Design::new(&y, None, Trend::Constant);
        let run = run_em(&design, start(), &EmOptions { tolerance: 0.0, ..opts(3) }).unwrap();
        assert_eq!(run.iterations, 3);
        assert_eq!(run.status, FitStatus::IterationCap);
    }

    #[test]
    fn pooled_variance_is_shared() {
        let y = block_series();
        let design = Design::new(&y, None, Trend::Constant);
        let o = EmOptions {
            switching_variance: false,
            ..opts(50)
        };
        let run = run_em(&design, start(), &o).unwrap();
        assert_eq!(run.params.variances[0], run.params.variances[1]);
    }

    #[test]
    fn transition_rows_stay_stochastic() {
        let y = block_series();
        let design = Design::new(&y, None, Trend::Constant);
        let run = run_em(&design, start(), &opts(100)).unwrap();
        for row in &run.params.transition {
            assert!((row.iter().sum::<f64>() - 1.0).abs() < 1e-9);
            assert!(row.iter().all(|p| *p >= PROB_FLOOR * 0.5));
        }
    }
}

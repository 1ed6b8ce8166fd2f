//! Regression design and working parameters of the estimator.

use crate::domain::Trend;

/// Observations plus one design row `x_t` per date.
///
/// Column layout: intercept first (when the trend is constant), then the
/// exogenous regressor (when supplied).
#[derive(Debug, Clone)]
pub(crate) struct Design {
    pub y: Vec<f64>,
    pub rows: Vec<Vec<f64>>,
    pub intercept: bool,
    pub has_exog: bool,
}

impl Design {
    pub fn new(endog: &[f64], exog: Option<&[f64]>, trend: Trend) -> Self {
        let intercept = trend.has_intercept();
        let rows = (0..endog.len())
            .map(|t| {
                let mut row = Vec::with_capacity(2);
                if intercept {
                    row.push(1.0);
                }
                if let Some(x) = exog {
                    row.push(x[t]);
                }
                row
            })
            .collect();
        Self {
            y: endog.to_vec(),
            rows,
            intercept,
            has_exog: exog.is_some(),
        }
    }

    pub fn n_obs(&self) -> usize {
        self.y.len()
    }

    pub fn n_cols(&self) -> usize {
        usize::from(self.intercept) + usize::from(self.has_exog)
    }

    /// `x_t' β`.
    pub fn mean(&self, t: usize, beta: &[f64]) -> f64 {
        self.rows[t].iter().zip(beta).map(|(x, b)| x * b).sum()
    }
}

/// Parameters in the estimator's working form.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Params {
    /// `k × n_cols` regression coefficients.
    pub betas: Vec<Vec<f64>>,
    /// One variance per regime (all equal when the variance does not switch).
    pub variances: Vec<f64>,
    /// `transition[i][j] = P(s_t = j | s_{t-1} = i)`.
    pub transition: Vec<Vec<f64>>,
}

impl Params {
    pub fn k(&self) -> usize {
        self.variances.len()
    }

    pub fn is_finite(&self) -> bool {
        self.betas.iter().flatten().all(|v| v.is_finite())
            && self.variances.iter().all(|v| v.is_finite() && *v > 0.0)
            && self.transition.iter().flatten().all(|v| v.is_finite())
    }
}

/// Transition matrix with `stay` on the diagonal and the rest spread evenly.
pub(crate) fn persistent_transition(k: usize, stay: f64) -> Vec<Vec<f64>> {
    let off = if k > 1 { (1.0 - stay) / (k as f64 - 1.0) } else { 0.0 };
    (0..k)
        .map(|i| (0..k).map(|j| if i == j { stay } else { off }).collect())
        .collect()
}

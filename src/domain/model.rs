//! Fitted regime model and its probability projections.

use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::domain::{RegimeOrder, TimeSeries, Trend};
use crate::error::FitError;

/// Regression parameters of one regime.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegimeParams {
    /// Present when the trend is `Constant`.
    pub intercept: Option<f64>,
    /// Present when an exogenous series was supplied.
    pub exog_coef: Option<f64>,
    pub variance: f64,
}

impl RegimeParams {
    /// Conditional mean `x_t' β` for one observation.
    pub fn mean(&self, exog: Option<f64>) -> f64 {
        self.intercept.unwrap_or(0.0) + self.exog_coef.unwrap_or(0.0) * exog.unwrap_or(0.0)
    }
}

/// How the EM run ended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum FitStatus {
    Converged,
    /// `max_iter` was reached before the tolerance was met.
    IterationCap,
    /// The likelihood became non-finite; the model holds the last finite iterate.
    Failed { reason: String },
}

impl fmt::Display for FitStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FitStatus::Converged => write!(f, "converged"),
            FitStatus::IterationCap => write!(f, "hit iteration cap"),
            FitStatus::Failed { reason } => write!(f, "failed ({reason})"),
        }
    }
}

/// A fitted Markov-switching regression.
///
/// Built only by [`crate::regime::fit`] (or read back from a model JSON file) and
/// never mutated afterwards. Probability matrices are stored row-major: one row
/// per date, one column per regime.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegimeModel {
    pub(crate) k_regimes: usize,
    pub(crate) trend: Trend,
    pub(crate) switching_variance: bool,
    pub(crate) order: RegimeOrder,
    pub(crate) endog: TimeSeries,
    pub(crate) exog: Option<TimeSeries>,
    pub(crate) params: Vec<RegimeParams>,
    /// `transition[i][j] = P(s_t = j | s_{t-1} = i)`.
    pub(crate) transition: Vec<Vec<f64>>,
    pub(crate) initial_probs: Vec<f64>,
    pub(crate) log_likelihood: f64,
    pub(crate) iterations: usize,
    pub(crate) status: FitStatus,
    pub(crate) filtered: Vec<Vec<f64>>,
    pub(crate) smoothed: Vec<Vec<f64>>,
}

impl RegimeModel {
    pub fn k_regimes(&self) -> usize {
        self.k_regimes
    }

    pub fn trend(&self) -> Trend {
        self.trend
    }

    pub fn switching_variance(&self) -> bool {
        self.switching_variance
    }

    pub fn order(&self) -> RegimeOrder {
        self.order
    }

    pub fn endog(&self) -> &TimeSeries {
        &self.endog
    }

    pub fn exog(&self) -> Option<&TimeSeries> {
        self.exog.as_ref()
    }

    pub fn dates(&self) -> &[NaiveDate] {
        self.endog.dates()
    }

    pub fn n_obs(&self) -> usize {
        self.endog.len()
    }

    pub fn params(&self) -> &[RegimeParams] {
        &self.params
    }

    pub fn transition(&self) -> &[Vec<f64>] {
        &self.transition
    }

    pub fn initial_probs(&self) -> &[f64] {
        &self.initial_probs
    }

    pub fn log_likelihood(&self) -> f64 {
        self.log_likelihood
    }

    pub fn iterations(&self) -> usize {
        self.iterations
    }

    pub fn status(&self) -> &FitStatus {
        &self.status
    }

    pub fn is_converged(&self) -> bool {
        self.status == FitStatus::Converged
    }

    /// Turn an unconverged fit into a `ConvergenceFailure` for callers that
    /// refuse to use one.
    pub fn ensure_converged(&self) -> Result<(), FitError> {
        match &self.status {
            FitStatus::Converged => Ok(()),
            FitStatus::IterationCap => Err(FitError::ConvergenceFailure {
                iterations: self.iterations,
                reason: "iteration cap reached before the tolerance was met".to_string(),
            }),
            FitStatus::Failed { reason } => Err(FitError::ConvergenceFailure {
                iterations: self.iterations,
                reason: reason.clone(),
            }),
        }
    }

    /// Number of free parameters: regression coefficients, variances and
    /// off-diagonal transition probabilities.
    pub fn n_params(&self) -> usize {
        let k = self.k_regimes;
        let n_coef = usize::from(self.trend.has_intercept()) + usize::from(self.exog.is_some());
        let n_var = if self.switching_variance { k } else { 1 };
        k * n_coef + n_var + k * (k - 1)
    }

    pub fn aic(&self) -> f64 {
        -2.0 * self.log_likelihood + 2.0 * self.n_params() as f64
    }

    pub fn bic(&self) -> f64 {
        -2.0 * self.log_likelihood + self.n_params() as f64 * (self.n_obs() as f64).ln()
    }

    pub fn hqic(&self) -> f64 {
        -2.0 * self.log_likelihood + 2.0 * self.n_params() as f64 * (self.n_obs() as f64).ln().ln()
    }

    /// Expected number of periods spent in each regime once entered.
    pub fn expected_durations(&self) -> Vec<f64> {
        self.transition
            .iter()
            .enumerate()
            .map(|(i, row)| {
                let stay = row[i];
                if stay >= 1.0 { f64::INFINITY } else { 1.0 / (1.0 - stay) }
            })
            .collect()
    }

    /// Human label of a regime; only meaningful under `RegimeOrder::ByMean`.
    pub fn regime_label(&self, regime: usize) -> String {
        match (self.order, self.k_regimes) {
            (RegimeOrder::ByMean, 2) if regime == 0 => "expansion".to_string(),
            (RegimeOrder::ByMean, 2) if regime == 1 => "contraction".to_string(),
            _ => format!("regime {regime}"),
        }
    }

    /// Mean fitted level of each regime over the sample.
    pub fn regime_means(&self) -> Vec<f64> {
        let n = self.n_obs().max(1) as f64;
        self.params
            .iter()
            .map(|p| {
                (0..self.n_obs())
                    .map(|t| p.mean(self.exog.as_ref().map(|x| x.values()[t])))
                    .sum::<f64>()
                    / n
            })
            .collect()
    }

    /// Most likely regime per date according to the smoothed probabilities.
    pub fn most_likely_regimes(&self) -> Vec<usize> {
        self.smoothed.iter().map(|row| argmax(row)).collect()
    }

    /// Project the stored smoothed probabilities into one series per regime.
    pub fn smoothed_probabilities(&self) -> SmoothedProbabilities {
        SmoothedProbabilities::from_rows("smoothed", self.endog.dates(), &self.smoothed, self.k_regimes)
    }

    /// Same projection for the filtered (causal) probabilities.
    pub fn filtered_probabilities(&self) -> SmoothedProbabilities {
        SmoothedProbabilities::from_rows("filtered", self.endog.dates(), &self.filtered, self.k_regimes)
    }

    pub fn smoothed_rows(&self) -> &[Vec<f64>] {
        &self.smoothed
    }

    pub fn filtered_rows(&self) -> &[Vec<f64>] {
        &self.filtered
    }

    /// Check that every regime-indexed and date-indexed field agrees with
    /// `k_regimes` and the endog dates. Holds for every model `fit` returns.
    pub fn check_dimensions(&self) -> Result<(), String> {
        let k = self.k_regimes;
        let n = self.endog.len();
        if k < 2 {
            return Err(format!("k_regimes must be at least 2 (got {k})"));
        }
        if self.params.len() != k {
            return Err(format!("{} regime parameter sets for {k} regimes", self.params.len()));
        }
        if self.initial_probs.len() != k {
            return Err(format!("{} initial probabilities for {k} regimes", self.initial_probs.len()));
        }
        if self.transition.len() != k || self.transition.iter().any(|row| row.len() != k) {
            return Err(format!("transition matrix is not {k}x{k}"));
        }
        if let Some(exog) = &self.exog {
            if !exog.same_index(&self.endog) {
                return Err(format!("exog `{}` does not share the endog dates", exog.name()));
            }
        }
        for (kind, rows) in [("smoothed", &self.smoothed), ("filtered", &self.filtered)] {
            if rows.len() != n {
                return Err(format!("{} {kind} rows for {n} dates", rows.len()));
            }
            if let Some(t) = rows.iter().position(|row| row.len() != k) {
                return Err(format!("{kind} row {t} does not have {k} regimes"));
            }
        }
        Ok(())
    }
}

/// Free-function form of [`RegimeModel::smoothed_probabilities`].
pub fn smoothed_probabilities(model: &RegimeModel) -> SmoothedProbabilities {
    model.smoothed_probabilities()
}

/// Per-regime probability series sharing the model's date index.
#[derive(Debug, Clone, PartialEq)]
pub struct SmoothedProbabilities {
    regimes: Vec<TimeSeries>,
}

impl SmoothedProbabilities {
    fn from_rows(kind: &str, dates: &[NaiveDate], rows: &[Vec<f64>], k: usize) -> Self {
        let regimes = (0..k)
            .map(|j| {
                let values: Vec<f64> = rows.iter().map(|row| row[j]).collect();
                // Dates come from an already validated series.
                TimeSeries::from_validated(format!("{kind} P(regime {j})"), dates.to_vec(), values)
            })
            .collect();
        Self { regimes }
    }

    pub fn k_regimes(&self) -> usize {
        self.regimes.len()
    }

    pub fn len(&self) -> usize {
        self.regimes.first().map(TimeSeries::len).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn dates(&self) -> &[NaiveDate] {
        self.regimes.first().map(TimeSeries::dates).unwrap_or(&[])
    }

    pub fn regime(&self, regime: usize) -> Option<&TimeSeries> {
        self.regimes.get(regime)
    }

    pub fn regimes(&self) -> &[TimeSeries] {
        &self.regimes
    }

    /// Probabilities of all regimes on the `t`-th date.
    pub fn row(&self, t: usize) -> Vec<f64> {
        self.regimes.iter().map(|s| s.values()[t]).collect()
    }

    /// Largest deviation of a row sum from 1 (0 for an empty projection).
    pub fn max_row_sum_error(&self) -> f64 {
        (0..self.len())
            .map(|t| (self.row(t).iter().sum::<f64>() - 1.0).abs())
            .fold(0.0, f64::max)
    }
}

pub(crate) fn argmax(row: &[f64]) -> usize {
    let mut best = 0;
    for (j, &p) in row.iter().enumerate() {
        if p > row[best] {
            best = j;
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;

    fn toy_model() -> RegimeModel {
        let dates = (1..=3)
            .map(|m| NaiveDate::from_ymd_opt(2020, m, 1).unwrap())
            .collect::<Vec<_>>();
        let endog = TimeSeries::new("ip", dates, vec![0.5, -1.0, 0.3]).unwrap();
        RegimeModel {
            k_regimes: 2,
            trend: Trend::Constant,
            switching_variance: true,
            order: RegimeOrder::ByMean,
            endog,
            exog: None,
            params: vec![
                RegimeParams { intercept: Some(0.4), exog_coef: None, variance: 0.1 },
                RegimeParams { intercept: Some(-0.9), exog_coef: None, variance: 0.5 },
            ],
            transition: vec![vec![0.95, 0.05], vec![0.2, 0.8]],
            initial_probs: vec![0.8, 0.2],
            log_likelihood: -10.0,
            iterations: 12,
            status: FitStatus::IterationCap,
            filtered: vec![vec![0.9, 0.1], vec![0.2, 0.8], vec![0.7, 0.3]],
            smoothed: vec![vec![0.85, 0.15], vec![0.1, 0.9], vec![0.75, 0.25]],
        }
    }

    #[test]
    fn projection_keeps_shape_and_row_sums() {
        let model = toy_model();
        let probs = model.smoothed_probabilities();
        assert_eq!(probs.k_regimes(), 2);
        assert_eq!(probs.len(), 3);
        assert_eq!(probs.dates(), model.dates());
        assert!(probs.max_row_sum_error() < 1e-12);
        assert_eq!(probs.row(1), vec![0.1, 0.9]);
        assert_eq!(model.most_likely_regimes(), vec![0, 1, 0]);
    }

    #[test]
    fn information_criteria_and_durations() {
        let model = toy_model();
        // 2 intercepts + 2 variances + 2 transition probabilities.
        assert_eq!(model.n_params(), 6);
        assert!((model.aic() - 32.0).abs() < 1e-12);
        let durations = model.expected_durations();
        assert!((durations[0] - 20.0).abs() < 1e-9);
        assert!((durations[1] - 5.0).abs() < 1e-9);
        assert_eq!(model.regime_label(1), "contraction");
    }

    #[test]
    fn unconverged_model_reports_convergence_failure() {
        let model = toy_model();
        assert!(matches!(
            model.ensure_converged(),
            Err(FitError::ConvergenceFailure { iterations: 12, .. })
        ));
    }
}

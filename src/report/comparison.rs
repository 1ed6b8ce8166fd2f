//! Agreement between the contraction regime and a recession indicator.

use crate::domain::{RecessionIndicator, RegimeModel};

/// Probability at or above which a date counts as classified "contraction".
pub const CONTRACTION_THRESHOLD: f64 = 0.5;

/// Confusion counts of "P(last regime) ≥ threshold" against the indicator.
#[derive(Debug, Clone, PartialEq)]
pub struct RecessionComparison {
    pub threshold: f64,
    /// Model dates for which the indicator had a value.
    pub n: usize,
    pub true_positive: usize,
    pub false_positive: usize,
    pub true_negative: usize,
    pub false_negative: usize,
    /// Mean smoothed contraction probability on recession dates.
    pub mean_prob_in_recession: Option<f64>,
    /// Mean smoothed contraction probability on non-recession dates.
    pub mean_prob_outside: Option<f64>,
}

impl RecessionComparison {
    pub fn accuracy(&self) -> Option<f64> {
        if self.n == 0 {
            return None;
        }
        Some((self.true_positive + self.true_negative) as f64 / self.n as f64)
    }

    pub fn recession_dates(&self) -> usize {
        self.true_positive + self.false_negative
    }
}

/// Compare smoothed contraction probabilities with an as-of indicator lookup.
///
/// The contraction regime is the last one, which under `ByMean` ordering has
/// the lowest mean level. Returns `None` when no model date is covered by the
/// indicator.
pub fn compare_with_recession(
    model: &RegimeModel,
    recession: &RecessionIndicator,
    threshold: f64,
) -> Option<RecessionComparison> {
    let last = model.k_regimes().checked_sub(1)?;
    let mut cmp = RecessionComparison {
        threshold,
        n: 0,
        true_positive: 0,
        false_positive: 0,
        true_negative: 0,
        false_negative: 0,
        mean_prob_in_recession: None,
        mean_prob_outside: None,
    };
    let (mut sum_in, mut sum_out) = (0.0, 0.0);

    for (date, row) in model.dates().iter().zip(model.smoothed_rows()) {
        let Some(in_recession) = recession.in_recession(*date) else {
            continue;
        };
        let p = row[last];
        let flagged = p >= threshold;
        cmp.n += 1;
        match (flagged, in_recession) {
            (true, true) => cmp.true_positive += 1,
            (true, false) => cmp.false_positive += 1,
            (false, false) => cmp.true_negative += 1,
            (false, true) => cmp.false_negative += 1,
        }
        if in_recession {
            sum_in += p;
        } else {
            sum_out += p;
        }
    }

    if cmp.n == 0 {
        return None;
    }
    let n_in = cmp.recession_dates();
    let n_out = cmp.n - n_in;
    cmp.mean_prob_in_recession = (n_in > 0).then(|| sum_in / n_in as f64);
    cmp.mean_prob_outside = (n_out > 0).then(|| sum_out / n_out as f64);
    Some(cmp)
}

//! Series transforms applied between loading and fitting.

use tracing::debug;

use crate::domain::{TimeSeries, Transform};

/// Apply the configured transform. `PctChange` drops the first observation.
pub fn apply_transform(series: &TimeSeries, transform: Transform) -> TimeSeries {
    match transform {
        Transform::None => series.clone(),
        Transform::PctChange => series.pct_change(),
    }
}

/// Restrict both series to the dates they share.
///
/// This is the explicit opt-in for misaligned inputs; the classifier itself
/// never joins.
pub fn inner_join(a: &TimeSeries, b: &TimeSeries) -> (TimeSeries, TimeSeries) {
    let mut a_points = Vec::new();
    let mut b_points = Vec::new();
    let (mut i, mut j) = (0, 0);
    let (ad, bd) = (a.dates(), b.dates());

    while i < ad.len() && j < bd.len() {
        match ad[i].cmp(&bd[j]) {
            std::cmp::Ordering::Less => i += 1,
            std::cmp::Ordering::Greater => j += 1,
            std::cmp::Ordering::Equal => {
                a_points.push((ad[i], a.values()[i]));
                b_points.push((bd[j], b.values()[j]));
                i += 1;
                j += 1;
            }
        }
    }

    debug!(
        left = a.name(),
        right = b.name(),
        kept = a_points.len(),
        left_dropped = a.len() - a_points.len(),
        right_dropped = b.len() - b_points.len(),
        "inner join"
    );

    let (dates, a_values): (Vec<_>, Vec<_>) = a_points.into_iter().unzip();
    let b_values = b_points.into_iter().map(|(_, v)| v).collect();
    (
        TimeSeries::from_validated(a.name(), dates.clone(), a_values),
        TimeSeries::from_validated(b.name(), dates, b_values),
    )
}

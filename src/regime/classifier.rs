//! The `fit` entry point: validation, estimation and output shaping.

use tracing::{info, warn};

use crate::domain::{
    ClassifierConfig, FitStatus, RegimeModel, RegimeOrder, RegimeParams, TimeSeries, Trend,
};
use crate::error::FitError;
use crate::math::variance;
use crate::regime::design::{Design, Params};
use crate::regime::em::{run_em, EmOptions};
use crate::regime::search::{candidate_starts, default_start, search_best_start};

/// Fewest observations accepted for estimation.
pub const MIN_OBSERVATIONS: usize = 20;

/// Variance floor relative to the sample variance of `endog`.
const REL_VARIANCE_FLOOR: f64 = 1e-6;
const ABS_VARIANCE_FLOOR: f64 = 1e-12;

/// Fit a Markov-switching regression of `endog` on an optional `exog`.
///
/// `exog` must carry exactly the same dates as `endog`. Neither input is
/// modified. The result is deterministic for identical inputs and config.
///
/// An EM run that stops at `max_iter` (or breaks down numerically part-way) is
/// still returned; inspect [`RegimeModel::status`] or call
/// [`RegimeModel::ensure_converged`].
pub fn fit(endog: &TimeSeries, exog: Option<&TimeSeries>, config: &ClassifierConfig) -> Result<RegimeModel, FitError> {
    validate_config(config, exog.is_some())?;
    validate_alignment(endog, exog)?;
    validate_quality(endog, exog, config)?;

    let design = Design::new(endog.values(), exog.map(TimeSeries::values), config.trend);
    let sample_var = variance(endog.values()).unwrap_or(0.0);
    let opts = EmOptions {
        max_iter: config.max_iter,
        tolerance: config.tolerance,
        switching_variance: config.switching_variance,
        variance_floor: (sample_var * REL_VARIANCE_FLOOR).max(ABS_VARIANCE_FLOOR),
    };

    let base = default_start(&design, config.k_regimes, config.switching_variance, opts.variance_floor);
    let start = if config.search_reps > 0 {
        let candidates = candidate_starts(
            &base,
            config.search_reps,
            config.seed,
            config.switching_variance,
            opts.variance_floor,
        );
        search_best_start(&design, &candidates, &opts, config.search_iter)?
    } else {
        base
    };

    let run = run_em(&design, start, &opts)?;

    let mut model = RegimeModel {
        k_regimes: config.k_regimes,
        trend: config.trend,
        switching_variance: config.switching_variance,
        order: config.order,
        endog: endog.clone(),
        exog: exog.cloned(),
        params: to_regime_params(&run.params, &design),
        transition: run.params.transition.clone(),
        initial_probs: run.estep.filter.initial.clone(),
        log_likelihood: run.estep.log_likelihood(),
        iterations: run.iterations,
        status: run.status,
        filtered: run.estep.filter.filtered,
        smoothed: run.estep.smoother.smoothed,
    };

    if config.order == RegimeOrder::ByMean {
        let order = order_by_mean(&model);
        model = relabel(model, &order);
    }

    match &model.status {
        FitStatus::Converged => info!(
            endog = endog.name(),
            n = model.n_obs(),
            iterations = model.iterations,
            log_likelihood = model.log_likelihood,
            "regime model converged"
        ),
        status => warn!(
            endog = endog.name(),
            n = model.n_obs(),
            iterations = model.iterations,
            log_likelihood = model.log_likelihood,
            %status,
            "regime model did not converge"
        ),
    }

    Ok(model)
}

fn validate_config(config: &ClassifierConfig, has_exog: bool) -> Result<(), FitError> {
    if config.k_regimes < 2 {
        return Err(FitError::InvalidConfig(format!(
            "k_regimes must be at least 2 (got {})",
            config.k_regimes
        )));
    }
    if config.max_iter == 0 {
        return Err(FitError::InvalidConfig("max_iter must be at least 1".to_string()));
    }
    if !(config.tolerance.is_finite() && config.tolerance >= 0.0) {
        return Err(FitError::InvalidConfig(format!(
            "tolerance must be finite and non-negative (got {})",
            config.tolerance
        )));
    }
    if config.trend == Trend::None && !has_exog && !config.switching_variance {
        return Err(FitError::InvalidConfig(
            "no intercept, no exogenous regressor and no switching variance leaves nothing to switch".to_string(),
        ));
    }
    Ok(())
}

fn validate_alignment(endog: &TimeSeries, exog: Option<&TimeSeries>) -> Result<(), FitError> {
    let Some(exog) = exog else {
        return Ok(());
    };
    if endog.len() != exog.len() {
        return Err(FitError::InputAlignment {
            reason: format!(
                "`{}` has {} observations but `{}` has {}",
                endog.name(),
                endog.len(),
                exog.name(),
                exog.len()
            ),
        });
    }
    if let Some(idx) = endog.dates().iter().zip(exog.dates()).position(|(a, b)| a != b) {
        return Err(FitError::InputAlignment {
            reason: format!(
                "dates differ at position {idx}: `{}` has {} but `{}` has {}",
                endog.name(),
                endog.dates()[idx],
                exog.name(),
                exog.dates()[idx]
            ),
        });
    }
    Ok(())
}

fn validate_quality(endog: &TimeSeries, exog: Option<&TimeSeries>, config: &ClassifierConfig) -> Result<(), FitError> {
    check_finite("endog", endog)?;
    if let Some(exog) = exog {
        if !exog.is_empty() && exog.count_missing() == exog.len() {
            return Err(FitError::data_quality("exog", format!("all values of `{}` are missing", exog.name())));
        }
        check_finite("exog", exog)?;
    }

    let k = config.k_regimes;
    let n_coef = usize::from(config.trend.has_intercept()) + usize::from(exog.is_some());
    let n_var = if config.switching_variance { k } else { 1 };
    let n_params = k * n_coef + n_var + k * (k - 1);
    let min_obs = MIN_OBSERVATIONS.max(n_params + 1);
    if endog.len() < min_obs {
        return Err(FitError::data_quality(
            "endog",
            format!(
                "`{}` has {} observations; at least {min_obs} are required",
                endog.name(),
                endog.len()
            ),
        ));
    }

    let values = endog.values();
    if values.iter().all(|v| *v == values[0]) {
        return Err(FitError::data_quality(
            "endog",
            format!("`{}` is constant; there is no regime structure to estimate", endog.name()),
        ));
    }
    Ok(())
}

fn check_finite(role: &str, series: &TimeSeries) -> Result<(), FitError> {
    let missing = series.count_missing();
    if missing == 0 {
        return Ok(());
    }
    let first = series
        .iter()
        .find(|(_, v)| !v.is_finite())
        .map(|(d, _)| d.to_string())
        .unwrap_or_default();
    Err(FitError::data_quality(
        role,
        format!(
            "`{}` has {missing} missing or non-finite value(s), first on {first}",
            series.name()
        ),
    ))
}

fn to_regime_params(params: &Params, design: &Design) -> Vec<RegimeParams> {
    params
        .betas
        .iter()
        .zip(&params.variances)
        .map(|(beta, &variance)| {
            let mut cols = beta.iter().copied();
            let intercept = if design.intercept { cols.next() } else { None };
            let exog_coef = if design.has_exog { cols.next() } else { None };
            RegimeParams {
                intercept,
                exog_coef,
                variance,
            }
        })
        .collect()
}

/// Regime indices sorted by descending mean fitted level (stable for ties).
fn order_by_mean(model: &RegimeModel) -> Vec<usize> {
    let means = model.regime_means();
    let mut order: Vec<usize> = (0..model.k_regimes).collect();
    order.sort_by(|&a, &b| means[b].partial_cmp(&means[a]).unwrap_or(std::cmp::Ordering::Equal));
    order
}

/// Relabel regimes so that new regime `r` is old regime `order[r]`.
fn relabel(model: RegimeModel, order: &[usize]) -> RegimeModel {
    if order.iter().enumerate().all(|(new, &old)| new == old) {
        return model;
    }
    let permute_row = |row: &Vec<f64>| order.iter().map(|&old| row[old]).collect::<Vec<f64>>();

    RegimeModel {
        params: order.iter().map(|&old| model.params[old].clone()).collect(),
        transition: order
            .iter()
            .map(|&old_from| order.iter().map(|&old_to| model.transition[old_from][old_to]).collect())
            .collect(),
        initial_probs: permute_row(&model.initial_probs),
        filtered: model.filtered.iter().map(permute_row).collect(),
        smoothed: model.smoothed.iter().map(permute_row).collect(),
        ..model
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::sample::{simulate, SimulationSpec};
    use chrono::NaiveDate;

    fn monthly_dates(start_year: i32, n: usize) -> Vec<NaiveDate> {
        (0..n)
            .map(|i| NaiveDate::from_ymd_opt(start_year + (i / 12) as i32, (i % 12) as u32 + 1, 1).unwrap())
            .collect()
    }

    fn series(name: &str, values: Vec<f64>) -> TimeSeries {
        TimeSeries::new(name, monthly_dates(2000, values.len()), values).unwrap()
    }

    fn assert_rows_are_distributions(model: &RegimeModel) {
        assert_eq!(model.check_dimensions(), Ok(()));
        let probs = model.smoothed_probabilities();
        assert_eq!(probs.len(), model.n_obs());
        for t in 0..probs.len() {
            let row = probs.row(t);
            assert!(row.iter().all(|p| (0.0..=1.0).contains(p)), "row {t}: {row:?}");
            assert!((row.iter().sum::<f64>() - 1.0).abs() < 1e-6, "row {t}: {row:?}");
        }
    }

    #[test]
    fn three_hundred_month_fit_with_exog_has_one_row_per_date() {
        let sim = simulate(&SimulationSpec {
            n_obs: 300,
            seed: 11,
            ..SimulationSpec::default()
        })
        .unwrap();
        let config = ClassifierConfig::default();
        let model = fit(&sim.endog, sim.exog.as_ref(), &config).unwrap();

        assert_eq!(model.n_obs(), 300);
        assert_eq!(model.smoothed_probabilities().len(), 300);
        assert_eq!(model.smoothed_probabilities().dates(), sim.endog.dates());
        assert_rows_are_distributions(&model);
        assert!(model.params()[0].exog_coef.is_some());
        assert!(model.log_likelihood().is_finite());
    }

    #[test]
    fn recovers_well_separated_regimes() {
        let sim = simulate(&SimulationSpec {
            n_obs: 300,
            seed: 5,
            ..SimulationSpec::default()
        })
        .unwrap();
        let model = fit(&sim.endog, sim.exog.as_ref(), &ClassifierConfig::default()).unwrap();

        // Regime 0 is the expansion regime after ordering.
        let p = model.params();
        assert!(p[0].intercept.unwrap() > p[1].intercept.unwrap());

        let predicted = model.most_likely_regimes();
        let agree = predicted.iter().zip(&sim.regimes).filter(|(a, b)| a == b).count();
        assert!(agree as f64 / 300.0 > 0.85, "agreement {agree}/300");
    }

    #[test]
    fn recession_indicator_as_endog_still_yields_distributions() {
        let values: Vec<f64> = (0..120).map(|t| if (30..42).contains(&t) || (90..100).contains(&t) { 1.0 } else { 0.0 }).collect();
        let endog = series("JHDUSRGDPBR", values);
        let model = fit(&endog, None, &ClassifierConfig::default()).unwrap();
        assert_eq!(model.n_obs(), 120);
        assert_rows_are_distributions(&model);
    }

    #[test]
    fn fitting_is_deterministic() {
        let sim = simulate(&SimulationSpec {
            n_obs: 150,
            seed: 9,
            ..SimulationSpec::default()
        })
        .unwrap();
        let config = ClassifierConfig {
            search_reps: 4,
            search_iter: 10,
            seed: 3,
            ..ClassifierConfig::default()
        };
        let a = fit(&sim.endog, sim.exog.as_ref(), &config).unwrap();
        let b = fit(&sim.endog, sim.exog.as_ref(), &config).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn mismatched_lengths_are_an_alignment_error() {
        let endog = series("ip", (0..40).map(|t| (t as f64).sin()).collect());
        let exog = series("sales", (0..39).map(|t| (t as f64).cos()).collect());
        let err = fit(&endog, Some(&exog), &ClassifierConfig::default()).unwrap_err();
        assert!(matches!(err, FitError::InputAlignment { .. }));
    }

    #[test]
    fn shifted_dates_are_an_alignment_error() {
        let endog = series("ip", (0..40).map(|t| (t as f64).sin()).collect());
        let exog = TimeSeries::new(
            "sales",
            monthly_dates(2001, 40),
            (0..40).map(|t| (t as f64).cos()).collect(),
        )
        .unwrap();
        let err = fit(&endog, Some(&exog), &ClassifierConfig::default()).unwrap_err();
        match err {
            FitError::InputAlignment { reason } => assert!(reason.contains("position 0")),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn all_missing_exog_is_a_data_quality_error() {
        let endog = series("ip", (0..40).map(|t| (t as f64).sin()).collect());
        let exog = series("sales", vec![f64::NAN; 40]);
        let err = fit(&endog, Some(&exog), &ClassifierConfig::default()).unwrap_err();
        assert!(matches!(err, FitError::DataQuality { ref series, .. } if series == "exog"));
    }

    #[test]
    fn missing_endog_value_is_a_data_quality_error() {
        let mut values: Vec<f64> = (0..40).map(|t| (t as f64).sin()).collect();
        values[7] = f64::NAN;
        let endog = series("ip", values);
        let err = fit(&endog, None, &ClassifierConfig::default()).unwrap_err();
        assert!(matches!(err, FitError::DataQuality { ref series, .. } if series == "endog"));
    }

    #[test]
    fn too_few_observations_is_a_data_quality_error() {
        let endog = series("ip", (0..12).map(|t| (t as f64).sin()).collect());
        let err = fit(&endog, None, &ClassifierConfig::default()).unwrap_err();
        assert!(matches!(err, FitError::DataQuality { .. }));
    }

    #[test]
    fn constant_endog_is_a_data_quality_error() {
        // The rounded mean leaves a tiny nonzero variance for these levels.
        for level in [0.3, 0.1, -1.7] {
            let endog = series("ip", vec![level; 40]);
            assert!(matches!(
                fit(&endog, None, &ClassifierConfig::default()),
                Err(FitError::DataQuality { .. })
            ));
        }
    }

    #[test]
    fn invalid_configs_are_rejected() {
        let endog = series("ip", (0..40).map(|t| (t as f64).sin()).collect());
        let one_regime = ClassifierConfig {
            k_regimes: 1,
            ..ClassifierConfig::default()
        };
        assert!(matches!(fit(&endog, None, &one_regime), Err(FitError::InvalidConfig(_))));

        let nothing_switches = ClassifierConfig {
            trend: Trend::None,
            switching_variance: false,
            ..ClassifierConfig::default()
        };
        assert!(matches!(fit(&endog, None, &nothing_switches), Err(FitError::InvalidConfig(_))));
    }

    #[test]
    fn iteration_cap_is_reported_not_fatal() {
        let sim = simulate(&SimulationSpec {
            n_obs: 120,
            seed: 2,
            ..SimulationSpec::default()
        })
        .unwrap();
        let config = ClassifierConfig {
            max_iter: 1,
            tolerance: 0.0,
            ..ClassifierConfig::default()
        };
        let model = fit(&sim.endog, sim.exog.as_ref(), &config).unwrap();
        assert_eq!(model.status(), &FitStatus::IterationCap);
        assert_eq!(model.iterations(), 1);
        assert!(model.ensure_converged().is_err());
        assert_rows_are_distributions(&model);
    }

    #[test]
    fn relabel_permutes_every_regime_indexed_field() {
        let sim = simulate(&SimulationSpec {
            n_obs: 100,
            seed: 4,
            ..SimulationSpec::default()
        })
        .unwrap();
        let config = ClassifierConfig {
            order: RegimeOrder::AsEstimated,
            ..ClassifierConfig::default()
        };
        let model = fit(&sim.endog, None, &config).unwrap();
        let swapped = relabel(model.clone(), &[1, 0]);

        assert_eq!(swapped.params[0], model.params[1]);
        assert_eq!(swapped.transition[0][0], model.transition[1][1]);
        assert_eq!(swapped.transition[0][1], model.transition[1][0]);
        assert_eq!(swapped.smoothed[5][0], model.smoothed[5][1]);
        assert_eq!(swapped.initial_probs[1], model.initial_probs[0]);
        assert_eq!(swapped.log_likelihood, model.log_likelihood);
    }

    #[test]
    fn trend_none_with_switching_variance_fits() {
        let sim = simulate(&SimulationSpec {
            n_obs: 120,
            seed: 8,
            ..SimulationSpec::default()
        })
        .unwrap();
        let config = ClassifierConfig {
            trend: Trend::None,
            ..ClassifierConfig::default()
        };
        let model = fit(&sim.endog, sim.exog.as_ref(), &config).unwrap();
        assert!(model.params().iter().all(|p| p.intercept.is_none()));
        assert_rows_are_distributions(&model);
    }
}

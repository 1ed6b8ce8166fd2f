//! Shared fit pipeline used by both the CLI and the TUI.
//!
//! load (CSV / FRED / simulation) -> transform -> align -> fit -> compare
//!
//! The front-ends only deal with presentation (printing vs widgets).

use tracing::info;

use crate::data::fred::FredClient;
use crate::data::sample::{simulate, SimulationSpec};
use crate::data::{apply_transform, inner_join};
use crate::domain::{
    AlignMode, ClassifierConfig, RecessionIndicator, RegimeModel, SeriesSource, SourceConfig, TimeSeries,
};
use crate::error::AppError;
use crate::io::ingest::{load_recession_csv, load_series_csv};
use crate::regime::fit;
use crate::report::{compare_with_recession, RecessionComparison, CONTRACTION_THRESHOLD};

/// Prepared inputs of a fit.
#[derive(Debug, Clone)]
pub struct LoadedInputs {
    pub endog: TimeSeries,
    pub exog: Option<TimeSeries>,
    pub recession: Option<RecessionIndicator>,
}

/// All computed outputs of a single run.
#[derive(Debug, Clone)]
pub struct RunOutput {
    pub inputs: LoadedInputs,
    pub model: RegimeModel,
    pub comparison: Option<RecessionComparison>,
}

/// Load, transform and align the configured sources.
///
/// `periods` counts transformed observations: FRED requests include the
/// transform's warm-up rows and the tail is taken afterwards.
pub fn load_inputs(source: &SourceConfig) -> Result<LoadedInputs, AppError> {
    let mut fred = None;
    let limit = source.periods.map(|n| n + source.transform.warmup());
    let prepare = |series: TimeSeries| {
        let series = apply_transform(&series, source.transform);
        match source.periods {
            Some(n) => series.tail(n),
            None => series,
        }
    };

    let endog = prepare(load_series(&source.endog, source.endog_column.as_deref(), limit, &mut fred)?);

    let exog = match &source.exog {
        Some(src) => Some(prepare(load_series(src, source.exog_column.as_deref(), limit, &mut fred)?)),
        None => None,
    };

    let (endog, exog) = match (exog, source.align) {
        (Some(exog), AlignMode::Intersect) => {
            let (endog, exog) = inner_join(&endog, &exog);
            if endog.is_empty() {
                return Err(AppError::new(3, "Endog and exog share no dates."));
            }
            (endog, Some(exog))
        }
        (exog, _) => (endog, exog),
    };

    let recession = match &source.recession {
        Some(SeriesSource::Csv(path)) => Some(load_recession_csv(path, source.recession_column.as_deref())?),
        Some(src @ SeriesSource::Fred(_)) => {
            let series = load_series(src, None, None, &mut fred)?;
            Some(RecessionIndicator::new(series)?)
        }
        None => None,
    };

    Ok(LoadedInputs { endog, exog, recession })
}

/// Simulated inputs for `rr demo`; the contraction regime is the recession indicator.
pub fn demo_inputs(n_obs: usize, seed: u64, with_exog: bool) -> Result<LoadedInputs, AppError> {
    let defaults = SimulationSpec::default();
    let sim = simulate(&SimulationSpec {
        n_obs,
        seed,
        exog_coef: if with_exog { defaults.exog_coef } else { None },
        ..defaults
    })?;
    Ok(LoadedInputs {
        endog: sim.endog,
        exog: sim.exog,
        recession: Some(sim.recession),
    })
}

/// Execute the full pipeline and return the computed outputs.
pub fn run_fit(source: &SourceConfig, config: &ClassifierConfig) -> Result<RunOutput, AppError> {
    let inputs = load_inputs(source)?;
    run_fit_with_inputs(inputs, config)
}

/// Fit pre-loaded inputs.
///
/// Used by the TUI to refit with new settings without reloading.
pub fn run_fit_with_inputs(inputs: LoadedInputs, config: &ClassifierConfig) -> Result<RunOutput, AppError> {
    info!(
        endog = inputs.endog.name(),
        exog = inputs.exog.as_ref().map(TimeSeries::name).unwrap_or("-"),
        n = inputs.endog.len(),
        "fitting regime model"
    );
    let model = fit(&inputs.endog, inputs.exog.as_ref(), config)?;
    let comparison = inputs
        .recession
        .as_ref()
        .and_then(|r| compare_with_recession(&model, r, CONTRACTION_THRESHOLD));

    Ok(RunOutput {
        inputs,
        model,
        comparison,
    })
}

/// `limit` only bounds FRED requests; CSV files are read whole.
fn load_series(
    src: &SeriesSource,
    column: Option<&str>,
    limit: Option<usize>,
    fred: &mut Option<FredClient>,
) -> Result<TimeSeries, AppError> {
    match src {
        SeriesSource::Csv(path) => Ok(load_series_csv(path, column)?.series),
        SeriesSource::Fred(id) => {
            if fred.is_none() {
                *fred = Some(FredClient::from_env()?);
            }
            match fred {
                Some(client) => client.fetch_series(id, limit),
                None => Err(AppError::new(4, "FRED client unavailable.")),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Transform;
    use chrono::NaiveDate;
    use std::path::PathBuf;

    fn temp_csv(name: &str, body: &str) -> PathBuf {
        let path = std::env::temp_dir().join(format!("rr-pipeline-{}-{name}", std::process::id()));
        std::fs::write(&path, body).unwrap();
        path
    }

    fn monthly_csv(values: &[f64], start_month: usize) -> String {
        let mut out = String::from("DATE,% chg\n");
        for (i, v) in values.iter().enumerate() {
            let m = start_month + i;
            out.push_str(&format!("01/{:02}/{},{v}\n", m % 12 + 1, 2000 + m / 12));
        }
        out
    }

    fn source(endog: PathBuf, exog: Option<PathBuf>, align: AlignMode) -> SourceConfig {
        SourceConfig {
            endog: SeriesSource::Csv(endog),
            exog: exog.map(SeriesSource::Csv),
            recession: None,
            endog_column: None,
            exog_column: None,
            recession_column: None,
            transform: Transform::None,
            align,
            periods: None,
        }
    }

    #[test]
    fn demo_run_compares_with_simulated_recessions() {
        let inputs = demo_inputs(240, 3, true).unwrap();
        let run = run_fit_with_inputs(inputs, &ClassifierConfig::default()).unwrap();
        let cmp = run.comparison.unwrap();
        assert_eq!(cmp.n, 240);
        assert!(cmp.accuracy().unwrap() > 0.8);
    }

    #[test]
    fn strict_alignment_rejects_shifted_csvs() {
        let y: Vec<f64> = (0..40).map(|t| (t as f64 * 0.7).sin()).collect();
        let endog = temp_csv("strict-endog.csv", &monthly_csv(&y, 0));
        let exog = temp_csv("strict-exog.csv", &monthly_csv(&y, 1));

        let err = run_fit(&source(endog.clone(), Some(exog.clone()), AlignMode::Strict), &ClassifierConfig::default())
            .unwrap_err();
        assert_eq!(err.exit_code(), 2);

        let inputs = load_inputs(&source(endog, Some(exog), AlignMode::Intersect)).unwrap();
        assert_eq!(inputs.endog.len(), 39);
        assert!(inputs.exog.as_ref().unwrap().same_index(&inputs.endog));
    }

    #[test]
    fn periods_count_transformed_observations() {
        let y: Vec<f64> = (0..40).map(|t| 100.0 + (t as f64 * 0.7).sin()).collect();
        let endog = temp_csv("periods-endog.csv", &monthly_csv(&y, 0));
        let mut cfg = source(endog, None, AlignMode::Strict);
        cfg.transform = Transform::PctChange;
        cfg.periods = Some(24);

        let inputs = load_inputs(&cfg).unwrap();
        assert_eq!(inputs.endog.len(), 24);
        assert_eq!(inputs.endog.count_missing(), 0);
        assert_eq!(inputs.endog.last_date(), NaiveDate::from_ymd_opt(2003, 4, 1));
    }

    #[test]
    fn missing_endog_values_are_data_quality_errors() {
        let mut y: Vec<f64> = (0..40).map(|t| (t as f64 * 0.7).sin()).collect();
        y[10] = f64::NAN;
        let endog = temp_csv("nan-endog.csv", &monthly_csv(&y, 0).replace("NaN", ""));
        let err = run_fit(&source(endog, None, AlignMode::Strict), &ClassifierConfig::default()).unwrap_err();
        assert_eq!(err.exit_code(), 3);
    }
}

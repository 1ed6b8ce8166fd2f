//! Configuration enums and run settings.
//!
//! These types are shared by the CLI (via `clap::ValueEnum`), the classifier and
//! the model JSON export (via `serde`).

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

/// Deterministic trend term included in every regime's regression.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Trend {
    /// Regime-specific intercept.
    #[value(name = "c", alias = "constant")]
    Constant,
    /// No intercept.
    #[value(name = "n", alias = "none")]
    None,
}

impl Trend {
    pub fn has_intercept(self) -> bool {
        matches!(self, Trend::Constant)
    }
}

/// How regimes are labelled after estimation.
///
/// EM labels are arbitrary (they depend on starting values). `ByMean` relabels so
/// regime 0 has the highest mean fitted level and the last regime the lowest,
/// which makes "regime 1" the contraction regime in the two-state case.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum RegimeOrder {
    ByMean,
    AsEstimated,
}

/// Transform applied to endogenous/exogenous inputs after loading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum Transform {
    None,
    /// `100 * (v_t / v_{t-1} - 1)`; use for level series such as FRED indices.
    PctChange,
}

impl Transform {
    /// Leading observations consumed before the first transformed value.
    pub fn warmup(self) -> usize {
        match self {
            Transform::None => 0,
            Transform::PctChange => 1,
        }
    }
}

/// What to do when endogenous and exogenous dates differ.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum AlignMode {
    /// Pass the series through unchanged; the classifier rejects mismatches.
    Strict,
    /// Keep only dates present in both series (explicit opt-in).
    Intersect,
}

/// Where a series comes from: a CSV file or a FRED series id (`fred:INDPRO`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SeriesSource {
    Csv(PathBuf),
    Fred(String),
}

impl FromStr for SeriesSource {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err("empty series source".to_string());
        }
        let lower = s.to_ascii_lowercase();
        if let Some(id) = lower.strip_prefix("fred:") {
            let id = id.trim();
            if id.is_empty() {
                return Err("missing FRED series id after `fred:`".to_string());
            }
            return Ok(SeriesSource::Fred(id.to_ascii_uppercase()));
        }
        Ok(SeriesSource::Csv(PathBuf::from(s)))
    }
}

impl fmt::Display for SeriesSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SeriesSource::Csv(path) => write!(f, "{}", path.display()),
            SeriesSource::Fred(id) => write!(f, "fred:{id}"),
        }
    }
}

/// Settings of a single `fit` call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassifierConfig {
    pub k_regimes: usize,
    pub trend: Trend,
    pub switching_variance: bool,
    /// Upper bound on EM iterations.
    pub max_iter: usize,
    /// Relative log-likelihood change below which EM stops.
    pub tolerance: f64,
    /// Number of random perturbed starting points tried in addition to the
    /// deterministic one.
    pub search_reps: usize,
    /// EM iterations spent on each starting point before picking the best.
    pub search_iter: usize,
    pub seed: u64,
    pub order: RegimeOrder,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            k_regimes: 2,
            trend: Trend::Constant,
            switching_variance: true,
            max_iter: 10_000,
            tolerance: 1e-8,
            search_reps: 0,
            search_iter: 20,
            seed: 42,
            order: RegimeOrder::ByMean,
        }
    }
}

/// Where the inputs of a run come from and how they are prepared.
#[derive(Debug, Clone)]
pub struct SourceConfig {
    pub endog: SeriesSource,
    pub exog: Option<SeriesSource>,
    pub recession: Option<SeriesSource>,
    /// CSV value column for the endogenous series (default `% chg`).
    pub endog_column: Option<String>,
    pub exog_column: Option<String>,
    pub recession_column: Option<String>,
    pub transform: Transform,
    pub align: AlignMode,
    /// Keep only the most recent N observations of each input.
    pub periods: Option<usize>,
}

/// Everything a run needs besides its inputs.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub classifier: ClassifierConfig,
    pub require_converged: bool,
    pub plot: bool,
    pub plot_width: usize,
    pub plot_height: usize,
    /// Number of trailing dates shown in the probability table.
    pub tail: usize,
    pub export_probs: Option<PathBuf>,
    pub export_model: Option<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn series_source_parses_fred_prefix_and_paths() {
        assert_eq!(
            "fred:indpro".parse::<SeriesSource>().unwrap(),
            SeriesSource::Fred("INDPRO".into())
        );
        assert_eq!(
            "data/ip.csv".parse::<SeriesSource>().unwrap(),
            SeriesSource::Csv(PathBuf::from("data/ip.csv"))
        );
        assert!("fred:".parse::<SeriesSource>().is_err());
        assert!("  ".parse::<SeriesSource>().is_err());
        assert_eq!(SeriesSource::Fred("JHDUSRGDPBR".into()).to_string(), "fred:JHDUSRGDPBR");
    }

    #[test]
    fn default_classifier_matches_two_regime_constant_switching_variance() {
        let c = ClassifierConfig::default();
        assert_eq!(c.k_regimes, 2);
        assert_eq!(c.trend, Trend::Constant);
        assert!(c.switching_variance);
        assert_eq!(c.max_iter, 10_000);
    }
}

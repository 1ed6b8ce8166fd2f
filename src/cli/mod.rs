//! Command-line parsing for the recession regime classifier.
//!
//! Keeps argument parsing and command dispatch separate from the estimation
//! code. Subcommands share option groups through `#[command(flatten)]`.

use std::path::PathBuf;

use clap::{ArgAction, Args, Parser, Subcommand};

use crate::domain::{AlignMode, ClassifierConfig, RegimeOrder, RunConfig, SeriesSource, SourceConfig, Transform, Trend};

/// Top-level CLI.
#[derive(Debug, Parser)]
#[command(
    name = "rr",
    version,
    about = "Markov-switching recession regime classifier for macro indicators"
)]
pub struct Cli {
    /// Increase log verbosity (-v info, -vv debug, -vvv trace). `RUST_LOG` wins when set.
    #[arg(short = 'v', long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

/// CLI subcommands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Fit a regime model to CSV or FRED inputs, print the report, and optionally plot/export.
    Fit(FitArgs),
    /// Fit a regime model to a simulated two-regime sample.
    Demo(DemoArgs),
    /// Download a FRED series to CSV.
    Fetch(FetchArgs),
    /// Plot a previously exported model JSON.
    Plot(PlotArgs),
    /// Launch the interactive TUI.
    ///
    /// Uses the same pipeline as `rr fit` but renders the probability charts in
    /// a terminal UI.
    Tui(FitArgs),
}

/// Options of `fit` and `tui`.
#[derive(Debug, Args, Clone)]
pub struct FitArgs {
    #[command(flatten)]
    pub source: SourceArgs,

    #[command(flatten)]
    pub model: ModelArgs,

    #[command(flatten)]
    pub output: OutputArgs,
}

/// Where the inputs come from.
#[derive(Debug, Args, Clone)]
pub struct SourceArgs {
    /// Endogenous series: a CSV path or `fred:SERIES_ID`.
    #[arg(long, value_name = "SRC")]
    pub endog: SeriesSource,

    /// Exogenous regressor: a CSV path or `fred:SERIES_ID`.
    #[arg(long, value_name = "SRC")]
    pub exog: Option<SeriesSource>,

    /// 0/1 recession indicator used for comparison and plotting only.
    #[arg(long, value_name = "SRC")]
    pub recession: Option<SeriesSource>,

    /// CSV value column of the endogenous series (default `% chg`, or the only value column).
    #[arg(long, value_name = "NAME")]
    pub column: Option<String>,

    /// CSV value column of the exogenous series.
    #[arg(long, value_name = "NAME")]
    pub exog_column: Option<String>,

    /// CSV value column of the recession indicator.
    #[arg(long, value_name = "NAME")]
    pub recession_column: Option<String>,

    /// Transform applied to endog and exog after loading.
    #[arg(long, value_enum, default_value_t = Transform::None)]
    pub transform: Transform,

    /// `strict` rejects endog/exog date mismatches; `intersect` keeps shared dates only.
    #[arg(long, value_enum, default_value_t = AlignMode::Strict)]
    pub align: AlignMode,

    /// Keep only the most recent N observations of each input, counted after the transform.
    #[arg(long, value_name = "N")]
    pub periods: Option<usize>,
}

/// Classifier settings.
#[derive(Debug, Args, Clone)]
pub struct ModelArgs {
    /// Number of regimes.
    #[arg(long, default_value_t = 2)]
    pub k_regimes: usize,

    /// Trend term: `c` (regime-specific intercept) or `n` (none).
    #[arg(long, value_enum, default_value_t = Trend::Constant)]
    pub trend: Trend,

    /// Share one variance across regimes.
    #[arg(long)]
    pub no_switching_variance: bool,

    /// Maximum EM iterations.
    #[arg(long, default_value_t = 10_000)]
    pub max_iter: usize,

    /// Relative log-likelihood tolerance for convergence.
    #[arg(long = "tol", default_value_t = 1e-8)]
    pub tolerance: f64,

    /// Random restarts tried before the full EM run (0 disables the search).
    #[arg(long, default_value_t = 0)]
    pub search_reps: usize,

    /// EM iterations spent on each restart.
    #[arg(long, default_value_t = 20)]
    pub search_iter: usize,

    /// Seed for the restart search.
    #[arg(long, default_value_t = 42)]
    pub seed: u64,

    /// Regime labelling: `by-mean` puts the highest-mean (expansion) regime first.
    #[arg(long, value_enum, default_value_t = RegimeOrder::ByMean)]
    pub order: RegimeOrder,

    /// Exit with an error if EM did not converge.
    #[arg(long)]
    pub require_converged: bool,
}

/// Report, plot and export settings.
#[derive(Debug, Args, Clone)]
pub struct OutputArgs {
    /// Disable the terminal plot.
    #[arg(long)]
    pub no_plot: bool,

    /// Plot width (columns).
    #[arg(long, default_value_t = 100)]
    pub width: usize,

    /// Plot height per panel (rows).
    #[arg(long, default_value_t = 12)]
    pub height: usize,

    /// Number of trailing dates in the probability table.
    #[arg(long, default_value_t = 12)]
    pub tail: usize,

    /// Export per-date probabilities to CSV.
    #[arg(long, value_name = "FILE")]
    pub export: Option<PathBuf>,

    /// Export the fitted model to JSON (re-plot with `rr plot --model`).
    #[arg(long = "export-model", value_name = "FILE")]
    pub export_model: Option<PathBuf>,
}

/// Options of `demo`.
#[derive(Debug, Args, Clone)]
pub struct DemoArgs {
    /// Number of simulated monthly observations.
    #[arg(short = 'n', long, default_value_t = 360)]
    pub n: usize,

    /// Seed of the simulated sample.
    #[arg(long, default_value_t = 7)]
    pub sample_seed: u64,

    /// Simulate without an exogenous regressor.
    #[arg(long)]
    pub no_exog: bool,

    #[command(flatten)]
    pub model: ModelArgs,

    #[command(flatten)]
    pub output: OutputArgs,
}

/// Options of `fetch`.
#[derive(Debug, Args, Clone)]
pub struct FetchArgs {
    /// FRED series id, e.g. `INDPRO` or `JHDUSRGDPBR`.
    #[arg(long, value_name = "ID")]
    pub series: String,

    /// Keep only the most recent N observations, counted after the transform.
    #[arg(long, value_name = "N")]
    pub periods: Option<usize>,

    #[arg(long, value_enum, default_value_t = Transform::None)]
    pub transform: Transform,

    /// Output CSV path.
    #[arg(long, value_name = "FILE")]
    pub out: PathBuf,
}

/// Options for plotting a saved model.
#[derive(Debug, Args, Clone)]
pub struct PlotArgs {
    /// Model JSON file produced by `rr fit --export-model`.
    #[arg(long, value_name = "JSON")]
    pub model: PathBuf,

    /// Plot filtered instead of smoothed probabilities.
    #[arg(long)]
    pub filtered: bool,

    /// Plot width (columns).
    #[arg(long, default_value_t = 100)]
    pub width: usize,

    /// Plot height per panel (rows).
    #[arg(long, default_value_t = 12)]
    pub height: usize,
}

impl ModelArgs {
    pub fn classifier_config(&self) -> ClassifierConfig {
        ClassifierConfig {
            k_regimes: self.k_regimes,
            trend: self.trend,
            switching_variance: !self.no_switching_variance,
            max_iter: self.max_iter,
            tolerance: self.tolerance,
            search_reps: self.search_reps,
            search_iter: self.search_iter,
            seed: self.seed,
            order: self.order,
        }
    }
}

impl SourceArgs {
    pub fn source_config(&self) -> SourceConfig {
        SourceConfig {
            endog: self.endog.clone(),
            exog: self.exog.clone(),
            recession: self.recession.clone(),
            endog_column: self.column.clone(),
            exog_column: self.exog_column.clone(),
            recession_column: self.recession_column.clone(),
            transform: self.transform,
            align: self.align,
            periods: self.periods,
        }
    }
}

/// Combine model and output options into the settings of one run.
pub fn run_config(model: &ModelArgs, output: &OutputArgs) -> RunConfig {
    RunConfig {
        classifier: model.classifier_config(),
        require_converged: model.require_converged,
        plot: !output.no_plot,
        plot_width: output.width,
        plot_height: output.height,
        tail: output.tail,
        export_probs: output.export.clone(),
        export_model: output.export_model.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fit_arguments_map_to_configs() {
        let cli = Cli::parse_from([
            "rr",
            "fit",
            "--endog",
            "Industrial Production.csv",
            "--exog",
            "fred:cmrmtspl",
            "--trend",
            "n",
            "--no-switching-variance",
            "--tol",
            "1e-6",
            "--search-reps",
            "5",
            "--no-plot",
            "-vv",
        ]);
        assert_eq!(cli.verbose, 2);
        let Command::Fit(args) = cli.command else {
            panic!("expected fit");
        };
        let source = args.source.source_config();
        assert_eq!(source.endog, SeriesSource::Csv(PathBuf::from("Industrial Production.csv")));
        assert_eq!(source.exog, Some(SeriesSource::Fred("CMRMTSPL".into())));
        assert_eq!(source.align, AlignMode::Strict);

        let run = run_config(&args.model, &args.output);
        assert_eq!(run.classifier.trend, Trend::None);
        assert!(!run.classifier.switching_variance);
        assert_eq!(run.classifier.tolerance, 1e-6);
        assert_eq!(run.classifier.search_reps, 5);
        assert!(!run.plot);
        assert_eq!(run.classifier.max_iter, 10_000);
    }

    #[test]
    fn defaults_match_classifier_defaults() {
        let cli = Cli::parse_from(["rr", "demo"]);
        let Command::Demo(args) = cli.command else {
            panic!("expected demo");
        };
        assert_eq!(args.model.classifier_config(), ClassifierConfig::default());
        assert_eq!(args.n, 360);
    }

    #[test]
    fn fit_requires_endog() {
        assert!(Cli::try_parse_from(["rr", "fit"]).is_err());
        assert!(Cli::try_parse_from(["rr", "fit", "--endog", "fred:"]).is_err());
    }
}

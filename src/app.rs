//! Top-level application orchestration.
//!
//! `src/main.rs` stays tiny; this module is the real main that:
//! - parses CLI arguments and sets up logging
//! - loads CSV / FRED / simulated inputs
//! - fits the regime model
//! - prints reports/plots
//! - writes optional exports

use clap::Parser;
use tracing::warn;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use crate::cli::{run_config, Command, DemoArgs, FetchArgs, FitArgs, PlotArgs};
use crate::domain::RunConfig;
use crate::error::AppError;
use crate::plot::ProbabilityKind;

pub mod pipeline;

use pipeline::RunOutput;

/// Entry point for the `rr` binary.
pub fn run() -> Result<(), AppError> {
    let argv = rewrite_args(std::env::args().collect());
    let cli = crate::cli::Cli::parse_from(argv);
    init_tracing(cli.verbose);

    match cli.command {
        Command::Fit(args) => handle_fit(args),
        Command::Demo(args) => handle_demo(args),
        Command::Fetch(args) => handle_fetch(args),
        Command::Plot(args) => handle_plot(args),
        Command::Tui(args) => handle_tui(args),
    }
}

/// Log to stderr. `RUST_LOG` takes precedence over `-v`.
fn init_tracing(verbose: u8) {
    let default_level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .finish();
    // A second init (e.g. in tests) keeps the first subscriber.
    let _ = tracing::subscriber::set_global_default(subscriber);
}

fn handle_fit(args: FitArgs) -> Result<(), AppError> {
    let source = args.source.source_config();
    let config = run_config(&args.model, &args.output);
    let run = pipeline::run_fit(&source, &config.classifier)?;
    present(&run, &config)
}

fn handle_demo(args: DemoArgs) -> Result<(), AppError> {
    let config = run_config(&args.model, &args.output);
    let inputs = pipeline::demo_inputs(args.n, args.sample_seed, !args.no_exog)?;
    let run = pipeline::run_fit_with_inputs(inputs, &config.classifier)?;
    present(&run, &config)
}

/// Print the report, plot and exports of a finished run.
fn present(run: &RunOutput, config: &RunConfig) -> Result<(), AppError> {
    let model = &run.model;
    if config.require_converged {
        model.ensure_converged()?;
    } else if !model.is_converged() {
        warn!(status = %model.status(), "using an unconverged fit");
    }

    println!("{}", crate::report::format_fit_summary(model));

    let recession = run.inputs.recession.as_ref();
    match (&run.comparison, recession) {
        (Some(cmp), Some(rec)) => println!("{}", crate::report::format_comparison(cmp, rec)),
        (None, Some(rec)) => warn!(indicator = rec.series().name(), "recession indicator does not cover the sample"),
        _ => {}
    }

    print!("{}", crate::report::format_tail(model, recession, config.tail));

    if config.plot {
        let plot = crate::plot::render_regime_plot(
            model,
            recession,
            ProbabilityKind::Smoothed,
            config.plot_width,
            config.plot_height,
        );
        println!();
        println!("{plot}");
    }

    if let Some(path) = &config.export_probs {
        crate::io::write_probabilities_csv(path, model, recession)?;
    }
    if let Some(path) = &config.export_model {
        let file = crate::io::ModelFile::new(&config.classifier, model, recession);
        crate::io::write_model_json(path, &file)?;
    }

    Ok(())
}

fn handle_fetch(args: FetchArgs) -> Result<(), AppError> {
    let client = crate::data::fred::FredClient::from_env()?;
    let limit = args.periods.map(|n| n + args.transform.warmup());
    let series = client.fetch_series(&args.series.to_ascii_uppercase(), limit)?;
    let series = crate::data::apply_transform(&series, args.transform);
    let series = match args.periods {
        Some(n) => series.tail(n),
        None => series,
    };
    crate::io::write_series_csv(&args.out, &series)?;
    println!(
        "Wrote {} observations of {} to {}",
        series.len(),
        series.name(),
        args.out.display()
    );
    Ok(())
}

fn handle_tui(args: FitArgs) -> Result<(), AppError> {
    let source = args.source.source_config();
    let config = run_config(&args.model, &args.output);
    let inputs = pipeline::load_inputs(&source)?;
    crate::tui::run(inputs, config)
}

fn handle_plot(args: PlotArgs) -> Result<(), AppError> {
    let file = crate::io::read_model_json(&args.model)?;
    let kind = if args.filtered {
        ProbabilityKind::Filtered
    } else {
        ProbabilityKind::Smoothed
    };
    let plot = crate::plot::render_regime_plot(&file.model, file.recession.as_ref(), kind, args.width, args.height);
    println!("{plot}");
    Ok(())
}

/// Rewrite argv so a bare `rr` runs the demo.
///
/// Rules:
/// - `rr`            -> `rr demo`
/// - anything else   -> unchanged
fn rewrite_args(mut argv: Vec<String>) -> Vec<String> {
    if argv.len() == 1 {
        argv.push("demo".to_string());
    }
    argv
}

//! `recession-regimes` library crate.
//!
//! The binary (`rr`) is a thin wrapper around this library so that:
//!
//! - the estimator is testable without spawning processes
//! - the pipeline is shared by the CLI report and the TUI

pub mod app;
pub mod cli;
pub mod data;
pub mod domain;
pub mod error;
pub mod io;
pub mod math;
pub mod plot;
pub mod regime;
pub mod report;
pub mod tui;

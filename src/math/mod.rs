//! Mathematical utilities: weighted least squares and likelihood helpers.

pub mod ols;
pub mod stats;

pub use ols::*;
pub use stats::*;

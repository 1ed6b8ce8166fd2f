//! Reporting: fit summary, recession comparison and probability tables.

pub mod comparison;
pub mod format;

pub use comparison::{compare_with_recession, RecessionComparison, CONTRACTION_THRESHOLD};
pub use format::{format_comparison, format_fit_summary, format_tail};

//! Error types.
//!
//! Library code returns typed errors (`FitError`, `SeriesError`) so callers can
//! tell an alignment problem from a data-quality problem and decide how to
//! recover. The binary converts them into `AppError`, which carries the process
//! exit code:
//!
//! - `2`: usage, schema, alignment, or configuration errors
//! - `3`: no usable data / data quality
//! - `4`: runtime failures (network, numerical, terminal)

use chrono::NaiveDate;
use thiserror::Error;

#[derive(Clone)]
pub struct AppError {
    exit_code: u8,
    message: String,
}

impl AppError {
    pub fn new(exit_code: u8, message: impl Into<String>) -> Self {
        Self {
            exit_code,
            message: message.into(),
        }
    }

    pub fn exit_code(&self) -> u8 {
        self.exit_code
    }
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::fmt::Debug for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppError")
            .field("exit_code", &self.exit_code)
            .field("message", &self.message)
            .finish()
    }
}

impl std::error::Error for AppError {}

/// Failures of the regime classifier.
///
/// All variants are recoverable: nothing is fitted and the inputs are untouched.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FitError {
    #[error("Input alignment error: {reason}")]
    InputAlignment { reason: String },

    #[error("Data quality error in `{series}`: {reason}")]
    DataQuality { series: String, reason: String },

    #[error("Convergence failure after {iterations} iteration(s): {reason}")]
    ConvergenceFailure { iterations: usize, reason: String },

    #[error("Invalid classifier configuration: {0}")]
    InvalidConfig(String),
}

impl FitError {
    pub(crate) fn data_quality(series: &str, reason: impl Into<String>) -> Self {
        FitError::DataQuality {
            series: series.to_string(),
            reason: reason.into(),
        }
    }
}

/// Violations of the `TimeSeries` / `RecessionIndicator` construction rules.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SeriesError {
    #[error("Series `{series}` has {dates} dates but {values} values")]
    LengthMismatch {
        series: String,
        dates: usize,
        values: usize,
    },

    #[error("Series `{series}` has duplicate date {date}")]
    DuplicateDate { series: String, date: NaiveDate },

    #[error("Series `{series}` is not ordered by date at position {index}")]
    Unordered { series: String, index: usize },

    #[error("Recession indicator `{series}` has non-binary value {value} on {date}")]
    NonBinary {
        series: String,
        date: NaiveDate,
        value: f64,
    },
}

impl From<FitError> for AppError {
    fn from(err: FitError) -> Self {
        let exit_code = match err {
            FitError::InputAlignment { .. } | FitError::InvalidConfig(_) => 2,
            FitError::DataQuality { .. } => 3,
            FitError::ConvergenceFailure { .. } => 4,
        };
        AppError::new(exit_code, err.to_string())
    }
}

impl From<SeriesError> for AppError {
    fn from(err: SeriesError) -> Self {
        AppError::new(2, err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fit_errors_map_to_exit_codes() {
        let e: AppError = FitError::InputAlignment { reason: "x".into() }.into();
        assert_eq!(e.exit_code(), 2);
        let e: AppError = FitError::data_quality("exog", "all values missing").into();
        assert_eq!(e.exit_code(), 3);
        assert!(e.to_string().contains("exog"));
        let e: AppError = FitError::ConvergenceFailure {
            iterations: 3,
            reason: "cap".into(),
        }
        .into();
        assert_eq!(e.exit_code(), 4);
    }
}

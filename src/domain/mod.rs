//! Domain types used throughout the pipeline.
//!
//! This module defines:
//!
//! - date-indexed series (`TimeSeries`, `RecessionIndicator`)
//! - configuration enums and run settings (`Trend`, `ClassifierConfig`, ...)
//! - fit outputs (`RegimeModel`, `SmoothedProbabilities`, `FitStatus`)

pub mod model;
pub mod series;
pub mod types;

pub use model::*;
pub use series::*;
pub use types::*;

//! Terminal plots of a fitted regime model.

pub mod ascii;

pub use ascii::render_regime_plot;

/// Which probability estimate a plot shows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProbabilityKind {
    /// Uses the whole sample (Kim smoother).
    #[default]
    Smoothed,
    /// Uses data up to each date only (Hamilton filter).
    Filtered,
}

impl ProbabilityKind {
    pub fn label(self) -> &'static str {
        match self {
            ProbabilityKind::Smoothed => "smoothed",
            ProbabilityKind::Filtered => "filtered",
        }
    }

    pub fn toggled(self) -> Self {
        match self {
            ProbabilityKind::Smoothed => ProbabilityKind::Filtered,
            ProbabilityKind::Filtered => ProbabilityKind::Smoothed,
        }
    }
}

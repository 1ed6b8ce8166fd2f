//! CSV exports: per-date regime probabilities and fetched series.
//!
//! Meant to be easy to consume in spreadsheets or downstream scripts.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::domain::{RecessionIndicator, RegimeModel, TimeSeries};
use crate::error::AppError;

/// Write one row per model date with smoothed and filtered probabilities.
///
/// The `recession` column holds the as-of indicator value (empty before the
/// indicator starts or when no indicator was supplied).
pub fn write_probabilities_csv(
    path: &Path,
    model: &RegimeModel,
    recession: Option<&RecessionIndicator>,
) -> Result<(), AppError> {
    let file = File::create(path)
        .map_err(|e| AppError::new(2, format!("Failed to create export CSV '{}': {e}", path.display())))?;
    write_probabilities(BufWriter::new(file), model, recession)
        .map_err(|e| AppError::new(2, format!("Failed to write export CSV '{}': {e}", path.display())))
}

fn write_probabilities<W: Write>(
    mut out: W,
    model: &RegimeModel,
    recession: Option<&RecessionIndicator>,
) -> std::io::Result<()> {
    let k = model.k_regimes();
    let mut header = String::from("date,endog");
    for j in 0..k {
        header.push_str(&format!(",p_smoothed_{j}"));
    }
    for j in 0..k {
        header.push_str(&format!(",p_filtered_{j}"));
    }
    header.push_str(",recession");
    writeln!(out, "{header}")?;

    let smoothed = model.smoothed_rows();
    let filtered = model.filtered_rows();
    for (t, (date, y)) in model.endog().iter().enumerate() {
        let mut line = format!("{date},{y:.6}");
        for p in &smoothed[t] {
            line.push_str(&format!(",{p:.6}"));
        }
        for p in &filtered[t] {
            line.push_str(&format!(",{p:.6}"));
        }
        let flag = recession
            .and_then(|r| r.value_on(date))
            .map(|v| format!("{}", v as u8))
            .unwrap_or_default();
        line.push(',');
        line.push_str(&flag);
        writeln!(out, "{line}")?;
    }
    out.flush()
}

/// Write a series as `date,<name>` so it can be loaded back with `--endog`.
pub fn write_series_csv(path: &Path, series: &TimeSeries) -> Result<(), AppError> {
    let file = File::create(path)
        .map_err(|e| AppError::new(2, format!("Failed to create CSV '{}': {e}", path.display())))?;
    write_series(BufWriter::new(file), series)
        .map_err(|e| AppError::new(2, format!("Failed to write CSV '{}': {e}", path.display())))
}

fn write_series<W: Write>(mut out: W, series: &TimeSeries) -> std::io::Result<()> {
    writeln!(out, "date,{}", series.name())?;
    for (date, v) in series.iter() {
        if v.is_finite() {
            writeln!(out, "{date},{v}")?;
        } else {
            writeln!(out, "{date},")?;
        }
    }
    out.flush()
}

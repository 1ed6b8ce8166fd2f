//! CSV ingest for date-indexed macro series.
//!
//! Expected layout: a `date` column plus one or more value columns. The value
//! column is chosen by name (`--column`), defaulting to `% chg`, or to the only
//! non-date column when the file has just one.
//!
//! - Header names are matched case-insensitively (BOM stripped).
//! - Dates are day-first (`DD/MM/YYYY`, `DD-MM-YYYY`, `DD.MM.YYYY`) or ISO.
//! - Empty, `.`, `NA` and `NaN` values are kept as missing (NaN).
//! - Rows with an unparseable date or value are skipped and reported.
//! - Rows are sorted by date; a repeated date is a schema error.

use std::collections::HashMap;
use std::fs::File;
use std::io::Read;
use std::path::Path;

use chrono::NaiveDate;
use csv::StringRecord;
use tracing::{debug, warn};

use crate::domain::{RecessionIndicator, TimeSeries};
use crate::error::AppError;

/// Default value column, as produced by the percent-change spreadsheets.
pub const DEFAULT_VALUE_COLUMN: &str = "% chg";

const DATE_COLUMNS: [&str; 3] = ["date", "observation_date", "ref_date"];
const MISSING_TOKENS: [&str; 4] = ["", ".", "na", "nan"];

/// A row-level error encountered during ingest.
#[derive(Debug, Clone)]
pub struct RowError {
    pub line: usize,
    pub message: String,
}

/// Ingest output: the series plus what happened on the way in.
#[derive(Debug, Clone)]
pub struct IngestedSeries {
    pub series: TimeSeries,
    /// Header of the value column actually used.
    pub column: String,
    pub row_errors: Vec<RowError>,
    pub rows_read: usize,
    pub rows_used: usize,
}

/// Load one value column of a CSV file. The series is named after the file stem.
pub fn load_series_csv(path: &Path, column: Option<&str>) -> Result<IngestedSeries, AppError> {
    let file = File::open(path)
        .map_err(|e| AppError::new(2, format!("Failed to open CSV '{}': {e}", path.display())))?;
    let name = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());

    let ingested = read_series(file, &name, column)?;
    if !ingested.row_errors.is_empty() {
        warn!(
            path = %path.display(),
            skipped = ingested.row_errors.len(),
            "skipped malformed CSV rows"
        );
    }
    debug!(
        path = %path.display(),
        column = %ingested.column,
        rows = ingested.rows_used,
        "loaded series"
    );
    Ok(ingested)
}

/// Load a 0/1 recession indicator CSV. Missing rows are dropped.
pub fn load_recession_csv(path: &Path, column: Option<&str>) -> Result<RecessionIndicator, AppError> {
    let ingested = load_series_csv(path, column)?;
    let indicator = RecessionIndicator::new(ingested.series)?;
    if indicator.series().is_empty() {
        return Err(AppError::new(
            3,
            format!("Recession indicator '{}' has no observations.", path.display()),
        ));
    }
    Ok(indicator)
}

/// Parse a series from any CSV reader.
pub fn read_series<R: Read>(reader: R, name: &str, column: Option<&str>) -> Result<IngestedSeries, AppError> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let headers = reader
        .headers()
        .map_err(|e| AppError::new(2, format!("Failed to read CSV headers: {e}")))?
        .clone();

    let header_map = build_header_map(&headers);
    let date_idx = DATE_COLUMNS
        .iter()
        .find_map(|c| header_map.get(*c).copied())
        .ok_or_else(|| AppError::new(2, format!("Missing required column in '{name}': `date`")))?;
    let value_idx = resolve_value_column(&headers, &header_map, date_idx, column, name)?;

    let mut points = Vec::new();
    let mut row_errors = Vec::new();
    let mut rows_read = 0usize;

    for (idx, result) in reader.records().enumerate() {
        // Header is line 1.
        let line = idx + 2;
        rows_read += 1;

        let record = match result {
            Ok(r) => r,
            Err(e) => {
                row_errors.push(RowError {
                    line,
                    message: format!("CSV parse error: {e}"),
                });
                continue;
            }
        };

        match parse_row(&record, date_idx, value_idx) {
            Ok(Some(point)) => points.push(point),
            Ok(None) => {} // blank line
            Err(message) => row_errors.push(RowError { line, message }),
        }
    }

    let rows_used = points.len();
    if rows_used == 0 {
        return Err(AppError::new(3, format!("No valid rows in '{name}'.")));
    }

    points.sort_by_key(|(d, _)| *d);
    let series = TimeSeries::from_points(name, points)?;

    Ok(IngestedSeries {
        series,
        column: headers.get(value_idx).unwrap_or_default().to_string(),
        row_errors,
        rows_read,
        rows_used,
    })
}

fn build_header_map(headers: &StringRecord) -> HashMap<String, usize> {
    headers
        .iter()
        .enumerate()
        .map(|(idx, name)| (normalize_header_name(name), idx))
        .collect()
}

fn normalize_header_name(name: &str) -> String {
    // Spreadsheet exports often carry a UTF-8 BOM on the first header.
    let name = name.trim().trim_start_matches('\u{feff}');
    name.to_ascii_lowercase()
}

fn resolve_value_column(
    headers: &StringRecord,
    header_map: &HashMap<String, usize>,
    date_idx: usize,
    column: Option<&str>,
    name: &str,
) -> Result<usize, AppError> {
    if let Some(column) = column {
        return header_map
            .get(&normalize_header_name(column))
            .copied()
            .ok_or_else(|| AppError::new(2, format!("Missing column `{column}` in '{name}'.")));
    }
    if let Some(idx) = header_map.get(DEFAULT_VALUE_COLUMN) {
        return Ok(*idx);
    }

    let candidates: Vec<usize> = (0..headers.len())
        .filter(|&i| i != date_idx && !headers.get(i).unwrap_or_default().trim().is_empty())
        .collect();
    match candidates.as_slice() {
        [only] => Ok(*only),
        [] => Err(AppError::new(2, format!("No value column in '{name}'."))),
        _ => Err(AppError::new(
            2,
            format!("'{name}' has several value columns and no `{DEFAULT_VALUE_COLUMN}`; pick one with --column."),
        )),
    }
}

fn parse_row(record: &StringRecord, date_idx: usize, value_idx: usize) -> Result<Option<(NaiveDate, f64)>, String> {
    let raw_date = record.get(date_idx).unwrap_or_default();
    let raw_value = record.get(value_idx).unwrap_or_default();
    if raw_date.is_empty() && raw_value.is_empty() {
        return Ok(None);
    }
    let date = parse_date(raw_date)?;
    let value = parse_value(raw_value)?;
    Ok(Some((date, value)))
}

/// Day-first dates as exported by the statistics spreadsheets, or ISO.
pub fn parse_date(s: &str) -> Result<NaiveDate, String> {
    const FMTS: [&str; 4] = ["%Y-%m-%d", "%d/%m/%Y", "%d-%m-%Y", "%d.%m.%Y"];
    for fmt in FMTS {
        if let Ok(d) = NaiveDate::parse_from_str(s, fmt) {
            return Ok(d);
        }
    }
    Err(format!(
        "Invalid date '{s}'. Expected one of: YYYY-MM-DD, DD/MM/YYYY, DD-MM-YYYY, DD.MM.YYYY."
    ))
}

fn parse_value(s: &str) -> Result<f64, String> {
    let trimmed = s.trim();
    if MISSING_TOKENS.contains(&trimmed.to_ascii_lowercase().as_str()) {
        return Ok(f64::NAN);
    }
    trimmed
        .trim_end_matches('%')
        .replace(',', "")
        .parse::<f64>()
        .map_err(|_| format!("Invalid value '{s}'."))
}

//! FRED API client for monthly/quarterly macro series.

use chrono::NaiveDate;
use reqwest::blocking::Client;
use serde::Deserialize;
use tracing::debug;

use crate::domain::TimeSeries;
use crate::error::AppError;

const BASE_URL: &str = "https://api.stlouisfed.org/fred/series/observations";
const OBS_LIMIT: usize = 100_000;

pub struct FredClient {
    client: Client,
    api_key: String,
}

impl FredClient {
    pub fn from_env() -> Result<Self, AppError> {
        dotenvy::dotenv().ok();
        let api_key = std::env::var("FRED_API_KEY")
            .map_err(|_| AppError::new(2, "Missing FRED_API_KEY in environment (.env)."))?;
        Ok(Self {
            client: Client::new(),
            api_key,
        })
    }

    /// Fetch `series_id`, keeping the most recent `periods` observations.
    ///
    /// Observations come back newest-first from the API and are returned in
    /// ascending date order.
    pub fn fetch_series(&self, series_id: &str, periods: Option<usize>) -> Result<TimeSeries, AppError> {
        let limit = periods.unwrap_or(OBS_LIMIT).clamp(1, OBS_LIMIT);
        let resp = self
            .client
            .get(BASE_URL)
            .query(&[
                ("series_id", series_id),
                ("api_key", &self.api_key),
                ("file_type", "json"),
                ("sort_order", "desc"),
                ("limit", &limit.to_string()),
            ])
            .send()
            .map_err(|e| AppError::new(4, format!("FRED request failed: {e}")))?;

        if !resp.status().is_success() {
            return Err(AppError::new(
                4,
                format!("FRED request for {series_id} failed with status {}.", resp.status()),
            ));
        }

        let body: ObservationsResponse = resp
            .json()
            .map_err(|e| AppError::new(4, format!("Failed to parse FRED response: {e}")))?;

        let points = parse_observations(series_id, body.observations)?;
        if points.is_empty() {
            return Err(AppError::new(3, format!("No observations returned for series {series_id}.")));
        }
        debug!(series_id, n = points.len(), "fetched FRED series");

        TimeSeries::from_points(series_id, points).map_err(AppError::from)
    }
}

#[derive(Debug, Deserialize)]
struct ObservationsResponse {
    observations: Vec<Observation>,
}

#[derive(Debug, Deserialize)]
struct Observation {
    date: String,
    value: String,
}

/// Parse newest-first observations into ascending `(date, value)` points.
fn parse_observations(series_id: &str, observations: Vec<Observation>) -> Result<Vec<(NaiveDate, f64)>, AppError> {
    let mut out = Vec::with_capacity(observations.len());
    for obs in observations {
        let Some(value) = parse_value(&obs.value) else {
            continue;
        };
        let date = NaiveDate::parse_from_str(&obs.date, "%Y-%m-%d").map_err(|e| {
            AppError::new(4, format!("Invalid FRED date '{}' in {series_id}: {e}", obs.date))
        })?;
        out.push((date, value));
    }
    out.sort_by_key(|(d, _)| *d);
    Ok(out)
}

fn parse_value(raw: &str) -> Option<f64> {
    let trimmed = raw.trim();
    if trimmed == "." || trimmed.is_empty() {
        return None;
    }
    let v = trimmed.parse::<f64>().ok()?;
    if v.is_finite() {
        Some(v)
    } else {
        None
    }
}

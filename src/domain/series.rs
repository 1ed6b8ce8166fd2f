//! Date-indexed series.
//!
//! `TimeSeries` is the value object passed between loaders, transforms and the
//! classifier. Dates are strictly increasing; a missing observation is stored as
//! NaN so that it survives ingest and can be rejected (or dropped) explicitly.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::SeriesError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "SeriesRecord")]
pub struct TimeSeries {
    name: String,
    dates: Vec<NaiveDate>,
    values: Vec<f64>,
}

/// Unchecked wire form; deserialization goes through [`TimeSeries::new`].
#[derive(Deserialize)]
struct SeriesRecord {
    name: String,
    dates: Vec<NaiveDate>,
    values: Vec<f64>,
}

impl TryFrom<SeriesRecord> for TimeSeries {
    type Error = SeriesError;

    fn try_from(r: SeriesRecord) -> Result<Self, Self::Error> {
        TimeSeries::new(r.name, r.dates, r.values)
    }
}

impl TimeSeries {
    /// Build a series, rejecting mismatched lengths and unordered/duplicate dates.
    pub fn new(name: impl Into<String>, dates: Vec<NaiveDate>, values: Vec<f64>) -> Result<Self, SeriesError> {
        let name = name.into();
        if dates.len() != values.len() {
            return Err(SeriesError::LengthMismatch {
                series: name,
                dates: dates.len(),
                values: values.len(),
            });
        }
        for i in 1..dates.len() {
            if dates[i] == dates[i - 1] {
                return Err(SeriesError::DuplicateDate {
                    series: name,
                    date: dates[i],
                });
            }
            if dates[i] < dates[i - 1] {
                return Err(SeriesError::Unordered { series: name, index: i });
            }
        }
        Ok(Self { name, dates, values })
    }

    /// Build from parts already known to satisfy the ordering rules.
    pub(crate) fn from_validated(name: impl Into<String>, dates: Vec<NaiveDate>, values: Vec<f64>) -> Self {
        debug_assert_eq!(dates.len(), values.len());
        Self {
            name: name.into(),
            dates,
            values,
        }
    }

    pub fn from_points(name: impl Into<String>, points: Vec<(NaiveDate, f64)>) -> Result<Self, SeriesError> {
        let (dates, values) = points.into_iter().unzip();
        Self::new(name, dates, values)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn renamed(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn dates(&self) -> &[NaiveDate] {
        &self.dates
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn iter(&self) -> impl Iterator<Item = (NaiveDate, f64)> + '_ {
        self.dates.iter().copied().zip(self.values.iter().copied())
    }

    pub fn first_date(&self) -> Option<NaiveDate> {
        self.dates.first().copied()
    }

    pub fn last_date(&self) -> Option<NaiveDate> {
        self.dates.last().copied()
    }

    /// Number of NaN / infinite observations.
    pub fn count_missing(&self) -> usize {
        self.values.iter().filter(|v| !v.is_finite()).count()
    }

    /// Same series without non-finite observations.
    pub fn dropna(&self) -> TimeSeries {
        let (dates, values) = self.iter().filter(|(_, v)| v.is_finite()).unzip();
        TimeSeries {
            name: self.name.clone(),
            dates,
            values,
        }
    }

    /// Period-over-period percent change, `100 * (v_t / v_{t-1} - 1)`.
    ///
    /// The first observation is dropped. A change against a zero or missing
    /// previous value is NaN.
    pub fn pct_change(&self) -> TimeSeries {
        let mut dates = Vec::with_capacity(self.len().saturating_sub(1));
        let mut values = Vec::with_capacity(self.len().saturating_sub(1));
        for i in 1..self.len() {
            let prev = self.values[i - 1];
            let cur = self.values[i];
            let chg = if prev.is_finite() && cur.is_finite() && prev != 0.0 {
                100.0 * (cur / prev - 1.0)
            } else {
                f64::NAN
            };
            dates.push(self.dates[i]);
            values.push(chg);
        }
        TimeSeries {
            name: self.name.clone(),
            dates,
            values,
        }
    }

    /// Last `n` observations.
    pub fn tail(&self, n: usize) -> TimeSeries {
        let start = self.len().saturating_sub(n);
        TimeSeries {
            name: self.name.clone(),
            dates: self.dates[start..].to_vec(),
            values: self.values[start..].to_vec(),
        }
    }

    /// Value of the last observation dated on or before `date`.
    pub fn value_as_of(&self, date: NaiveDate) -> Option<f64> {
        let idx = self.dates.partition_point(|d| *d <= date);
        if idx == 0 {
            None
        } else {
            Some(self.values[idx - 1])
        }
    }

    /// Whether both series carry exactly the same dates in the same order.
    pub fn same_index(&self, other: &TimeSeries) -> bool {
        self.dates == other.dates
    }
}

/// Binary (0/1) recession indicator used as a reference only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "IndicatorRecord")]
pub struct RecessionIndicator {
    series: TimeSeries,
}

#[derive(Deserialize)]
struct IndicatorRecord {
    series: TimeSeries,
}

impl TryFrom<IndicatorRecord> for RecessionIndicator {
    type Error = SeriesError;

    fn try_from(r: IndicatorRecord) -> Result<Self, Self::Error> {
        RecessionIndicator::new(r.series)
    }
}

impl RecessionIndicator {
    /// Wrap a series, dropping missing rows and rejecting anything but 0 or 1.
    pub fn new(series: TimeSeries) -> Result<Self, SeriesError> {
        let series = series.dropna();
        for (date, value) in series.iter() {
            if value != 0.0 && value != 1.0 {
                return Err(SeriesError::NonBinary {
                    series: series.name().to_string(),
                    date,
                    value,
                });
            }
        }
        Ok(Self { series })
    }

    pub fn series(&self) -> &TimeSeries {
        &self.series
    }

    /// Indicator value in force on `date`.
    ///
    /// `None` before the first observation and from one observation spacing
    /// past the last one (the spacing of the final two observations; a
    /// single observation only covers its own date).
    pub fn value_on(&self, date: NaiveDate) -> Option<f64> {
        let dates = self.series.dates();
        let last = *dates.last()?;
        if date > last {
            let prev = *dates.get(dates.len().checked_sub(2)?)?;
            match last.checked_add_signed(last - prev) {
                Some(end) if date >= end => return None,
                _ => {}
            }
        }
        self.series.value_as_of(date)
    }

    /// Recession state in force on `date`, if the indicator covers it.
    pub fn in_recession(&self, date: NaiveDate) -> Option<bool> {
        self.value_on(date).map(|v| v >= 0.5)
    }

    /// Contiguous recession spells as `(first, last)` flagged observation dates.
    pub fn spells(&self) -> Vec<(NaiveDate, NaiveDate)> {
        let mut out = Vec::new();
        let mut open: Option<(NaiveDate, NaiveDate)> = None;
        for (date, value) in self.series.iter() {
            if value >= 0.5 {
                open = Some(match open {
                    Some((start, _)) => (start, date),
                    None => (date, date),
                });
            } else if let Some(spell) = open.take() {
                out.push(spell);
            }
        }
        out.extend(open);
        out
    }
}

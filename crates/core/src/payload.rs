//! Time-series scoring payload construction.
//!
//! A payload for one series is its most recent `history` rows followed
//! by `horizon` future calendar days with empty features. Every row
//! carries a synthetic association id (`"{series} {date}"`) so the
//! platform can later join predictions to actuals.

use chrono::{Days, NaiveDate};

use crate::dataset::{write_csv, Dataset};
use crate::error::CoreError;
use crate::naming::association_row_id;
use crate::types::DATE_FORMAT;

/// Columns and sizes used to build a scoring payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PayloadSpec {
    pub series_column: String,
    pub time_column: String,
    /// Column receiving the synthetic association id.
    pub association_column: String,
    /// Number of most recent known rows to send.
    pub history: usize,
    /// Number of future days to forecast.
    pub horizon: u32,
}

/// Rows ready to be sent to a deployment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PredictionPayload {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
    /// Last known date of the series; the implicit forecast point.
    pub last_known_date: NaiveDate,
}

impl PredictionPayload {
    /// Delimited text body for the scoring endpoint.
    pub fn to_csv_string(&self) -> Result<String, CoreError> {
        let bytes = write_csv(&self.headers, &self.rows)?;
        String::from_utf8(bytes).map_err(|e| CoreError::Internal(e.to_string()))
    }
}

/// Parse the calendar day at the start of a date or datetime string.
///
/// Accepts `2021-01-31`, `2021-01-31 00:00:00` and `2021-01-31T00:00:00Z`.
pub fn parse_day(value: &str) -> Option<NaiveDate> {
    let day = value.trim().split(|c: char| c == 'T' || c == ' ').next()?;
    NaiveDate::parse_from_str(day, DATE_FORMAT).ok()
}

/// Build the scoring payload for one series.
pub fn build_payload(
    dataset: &Dataset,
    series: &str,
    spec: &PayloadSpec,
) -> Result<PredictionPayload, CoreError> {
    let subset = dataset.series_subset(&spec.series_column, series)?;
    if subset.is_empty() {
        return Err(CoreError::NotFound {
            entity: "series",
            id: series.to_string(),
        });
    }

    let recent = subset
        .sorted_by_key(&spec.time_column, |v| (parse_day(v), v.to_string()))?
        .tail(spec.history);

    let time_idx = recent.column_index(&spec.time_column)?;
    let series_idx = recent.column_index(&spec.series_column)?;

    let mut headers = recent.headers().to_vec();
    let id_idx = match headers.iter().position(|h| h == &spec.association_column) {
        Some(idx) => idx,
        None => {
            headers.push(spec.association_column.clone());
            headers.len() - 1
        }
    };

    let last_date_text = recent
        .rows()
        .last()
        .map(|row| row[time_idx].clone())
        .unwrap_or_default();
    let last_known_date = parse_day(&last_date_text).ok_or_else(|| {
        CoreError::Validation(format!(
            "cannot parse last date '{last_date_text}' of series '{series}'"
        ))
    })?;

    let mut rows = Vec::with_capacity(recent.len() + spec.horizon as usize);

    for known in recent.rows() {
        let mut row = known.clone();
        row.resize(headers.len(), String::new());
        row[id_idx] = association_row_id(series, &known[time_idx]);
        rows.push(row);
    }

    for step in 1..=u64::from(spec.horizon) {
        let date = last_known_date
            .checked_add_days(Days::new(step))
            .ok_or_else(|| CoreError::Validation("forecast date out of range".to_string()))?
            .format(DATE_FORMAT)
            .to_string();

        let mut row = vec![String::new(); headers.len()];
        row[series_idx] = series.to_string();
        row[id_idx] = association_row_id(series, &date);
        row[time_idx] = date;
        rows.push(row);
    }

    Ok(PredictionPayload {
        headers,
        rows,
        last_known_date,
    })
}

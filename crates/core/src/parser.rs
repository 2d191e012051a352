//! Flattening of prediction API responses into tabular rows.
//!
//! The scoring endpoint answers with `{"data": [record, ...]}` where each
//! record holds a `predictionValues` array. Every element of that array
//! becomes one output row, carrying the record's identifying fields.

use serde::Deserialize;
use serde_json::Value;

use crate::error::CoreError;

/// Output column names.
pub const COL_FORECAST_POINT: &str = "forecastPoint";
pub const COL_TIMESTAMP: &str = "timestamp";
pub const COL_SERIES: &str = "series";
pub const COL_ROW_ID: &str = "rowId";
pub const COL_LABEL: &str = "label";
pub const COL_PREDICTION: &str = "prediction";
pub const COL_PASSTHROUGH: &str = "passthroughValue";

/// One element of the response's `data` array.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PredictionRecord {
    #[serde(default)]
    pub row_id: Option<Value>,
    #[serde(default)]
    pub forecast_point: Option<Value>,
    #[serde(default)]
    pub timestamp: Option<Value>,
    #[serde(default)]
    pub series_id: Option<Value>,
    /// Older responses name the series field `series`.
    #[serde(default)]
    pub series: Option<Value>,
    #[serde(default)]
    pub prediction_values: Vec<PredictionValue>,
    #[serde(default)]
    pub passthrough_values: Option<Value>,
}

impl PredictionRecord {
    /// `seriesId` when present and non-null, otherwise `series`.
    pub fn series_value(&self) -> Option<&Value> {
        self.series_id
            .as_ref()
            .filter(|v| !v.is_null())
            .or(self.series.as_ref())
    }
}

/// A single predicted value for one target label.
#[derive(Debug, Clone, Deserialize)]
pub struct PredictionValue {
    #[serde(default)]
    pub label: Value,
    #[serde(default)]
    pub value: Value,
}

/// Which fields to carry into the output.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ParseOptions {
    /// Carry `forecastPoint`, `timestamp` and `series` instead of `rowId`.
    pub timeseries: bool,
    /// Add a `passthroughValue` column.
    pub passthrough: bool,
}

/// Flat prediction rows with named columns.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PredictionTable {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl PredictionTable {
    /// Column names produced for the given options, in output order.
    pub fn columns_for(options: ParseOptions) -> Vec<String> {
        let mut columns: Vec<&str> = if options.timeseries {
            vec![COL_FORECAST_POINT, COL_TIMESTAMP, COL_SERIES]
        } else {
            vec![COL_ROW_ID]
        };
        columns.extend([COL_LABEL, COL_PREDICTION]);
        if options.passthrough {
            columns.push(COL_PASSTHROUGH);
        }
        columns.into_iter().map(str::to_string).collect()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Values of one column, if it exists.
    pub fn column(&self, name: &str) -> Option<Vec<&str>> {
        let idx = self.columns.iter().position(|c| c == name)?;
        Some(self.rows.iter().map(|row| row[idx].as_str()).collect())
    }

    /// Set every row's `name` cell to `value`, appending the column if absent.
    pub fn set_column(&mut self, name: &str, value: &str) {
        match self.columns.iter().position(|c| c == name) {
            Some(idx) => {
                for row in &mut self.rows {
                    row[idx] = value.to_string();
                }
            }
            None => {
                self.columns.push(name.to_string());
                for row in &mut self.rows {
                    row.push(value.to_string());
                }
            }
        }
    }
}

/// Render a JSON scalar as a table cell.
fn cell(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

/// Flatten a prediction response.
///
/// Row count equals the total number of prediction values across all
/// records, independent of `options`.
pub fn parse_predictions(
    response: &Value,
    options: ParseOptions,
) -> Result<PredictionTable, CoreError> {
    let data = response
        .get("data")
        .filter(|d| d.is_array())
        .ok_or_else(|| {
            CoreError::Validation("prediction response has no 'data' array".to_string())
        })?;
    let records: Vec<PredictionRecord> = serde_json::from_value(data.clone())?;

    let mut rows = Vec::new();
    for record in &records {
        for prediction in &record.prediction_values {
            let mut row = if options.timeseries {
                vec![
                    cell(record.forecast_point.as_ref()),
                    cell(record.timestamp.as_ref()),
                    cell(record.series_value()),
                ]
            } else {
                vec![cell(record.row_id.as_ref())]
            };
            row.push(cell(Some(&prediction.label)));
            row.push(cell(Some(&prediction.value)));
            if options.passthrough {
                row.push(cell(record.passthrough_values.as_ref()));
            }
            rows.push(row);
        }
    }

    Ok(PredictionTable {
        columns: PredictionTable::columns_for(options),
        rows,
    })
}

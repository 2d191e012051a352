//! Accumulated prediction output across scoring runs.
//!
//! Rows are keyed by every column except the predicted value and the
//! passthrough value. Writing a row whose key already exists replaces the
//! stored row (last write wins), so re-scoring the same forecast point
//! updates it and exact duplicates collapse to one row.

use std::collections::HashMap;
use std::path::Path;

use crate::dataset::{write_atomic, write_csv, Dataset};
use crate::error::CoreError;
use crate::parser::{PredictionTable, COL_PASSTHROUGH, COL_PREDICTION};

/// Keyed table of scored predictions.
#[derive(Debug, Clone, Default)]
pub struct ScoreStore {
    columns: Vec<String>,
    rows: Vec<Vec<String>>,
    index: HashMap<Vec<String>, usize>,
}

impl ScoreStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a scores file; a missing file yields an empty store.
    pub fn load_or_empty<P: AsRef<Path>>(path: P) -> Result<Self, CoreError> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::new());
        }
        let dataset = Dataset::from_path(path)?;
        let mut store = Self::new();
        store.insert_rows(dataset.headers(), dataset.rows())?;
        Ok(store)
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<String>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Add parsed predictions, replacing rows with the same key.
    ///
    /// Returns the number of rows that were new.
    pub fn append(&mut self, table: &PredictionTable) -> Result<usize, CoreError> {
        self.insert_rows(&table.columns, &table.rows)
    }

    /// Serialize the whole table as CSV.
    pub fn to_csv_bytes(&self) -> Result<Vec<u8>, CoreError> {
        if self.columns.is_empty() {
            return Ok(Vec::new());
        }
        write_csv(&self.columns, &self.rows)
    }

    /// Overwrite the scores file with the full table.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), CoreError> {
        write_atomic(path.as_ref(), &self.to_csv_bytes()?)
    }

    fn insert_rows(&mut self, columns: &[String], rows: &[Vec<String>]) -> Result<usize, CoreError> {
        if self.columns.is_empty() {
            self.columns = columns.to_vec();
        } else if self.columns != columns {
            return Err(CoreError::Validation(format!(
                "score columns {columns:?} do not match stored columns {:?}",
                self.columns
            )));
        }

        let key_positions: Vec<usize> = self
            .columns
            .iter()
            .enumerate()
            .filter(|(_, c)| c.as_str() != COL_PREDICTION && c.as_str() != COL_PASSTHROUGH)
            .map(|(idx, _)| idx)
            .collect();

        let mut added = 0;
        for row in rows {
            let key: Vec<String> = key_positions.iter().map(|&i| row[i].clone()).collect();
            match self.index.get(&key) {
                Some(&pos) => self.rows[pos] = row.clone(),
                None => {
                    self.index.insert(key, self.rows.len());
                    self.rows.push(row.clone());
                    added += 1;
                }
            }
        }
        Ok(added)
    }
}

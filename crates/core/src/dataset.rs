//! In-memory tabular dataset backed by CSV.
//!
//! Cells are kept as text. Column order is preserved so that subsets
//! written back out look like the file they came from.

use std::collections::HashSet;
use std::path::Path;

use crate::error::CoreError;

/// A CSV table held in memory.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Dataset {
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl Dataset {
    /// Build a dataset from headers and rows.
    ///
    /// Every row must have exactly one cell per header.
    pub fn new(headers: Vec<String>, rows: Vec<Vec<String>>) -> Result<Self, CoreError> {
        if let Some((idx, row)) = rows
            .iter()
            .enumerate()
            .find(|(_, row)| row.len() != headers.len())
        {
            return Err(CoreError::Validation(format!(
                "row {idx} has {} cells but there are {} columns",
                row.len(),
                headers.len()
            )));
        }
        Ok(Self { headers, rows })
    }

    /// Read a dataset from a CSV file with a header row.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self, CoreError> {
        let path = path.as_ref();
        let file = std::fs::File::open(path).map_err(|e| CoreError::io(path, e))?;
        Self::from_reader(file)
    }

    /// Read a dataset from CSV text with a header row.
    pub fn from_csv_str(text: &str) -> Result<Self, CoreError> {
        Self::from_reader(text.as_bytes())
    }

    /// Read a dataset from any CSV source with a header row.
    pub fn from_reader<R: std::io::Read>(reader: R) -> Result<Self, CoreError> {
        let mut reader = csv::ReaderBuilder::new().has_headers(true).from_reader(reader);
        let headers = reader.headers()?.iter().map(str::to_string).collect();
        let rows = reader
            .records()
            .map(|record| record.map(|r| r.iter().map(str::to_string).collect()))
            .collect::<Result<Vec<Vec<String>>, _>>()?;
        Self::new(headers, rows)
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
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

    /// Position of a named column.
    pub fn column_index(&self, name: &str) -> Result<usize, CoreError> {
        self.headers
            .iter()
            .position(|h| h == name)
            .ok_or_else(|| CoreError::NotFound {
                entity: "column",
                id: name.to_string(),
            })
    }

    /// Keep only rows whose `column` value is in `allowed`.
    pub fn filter_in(&self, column: &str, allowed: &[String]) -> Result<Self, CoreError> {
        let idx = self.column_index(column)?;
        let allowed: HashSet<&str> = allowed.iter().map(String::as_str).collect();
        Ok(self.retain(|row| allowed.contains(row[idx].as_str())))
    }

    /// Rows belonging to one series.
    pub fn series_subset(&self, column: &str, key: &str) -> Result<Self, CoreError> {
        let idx = self.column_index(column)?;
        Ok(self.retain(|row| row[idx] == key))
    }

    /// Distinct values of `column` in order of first appearance.
    pub fn distinct(&self, column: &str) -> Result<Vec<String>, CoreError> {
        let idx = self.column_index(column)?;
        let mut seen = HashSet::new();
        Ok(self
            .rows
            .iter()
            .map(|row| row[idx].clone())
            .filter(|value| seen.insert(value.clone()))
            .collect())
    }

    /// Lexicographic maximum of a column, `None` for an empty dataset.
    ///
    /// ISO dates compare correctly as text.
    pub fn max_of(&self, column: &str) -> Result<Option<&str>, CoreError> {
        let idx = self.column_index(column)?;
        Ok(self.rows.iter().map(|row| row[idx].as_str()).max())
    }

    /// Stable sort of the rows by a key derived from one column.
    pub fn sorted_by_key<K, F>(&self, column: &str, key: F) -> Result<Self, CoreError>
    where
        K: Ord,
        F: Fn(&str) -> K,
    {
        let idx = self.column_index(column)?;
        let mut rows = self.rows.clone();
        rows.sort_by_key(|row| key(&row[idx]));
        Ok(Self {
            headers: self.headers.clone(),
            rows,
        })
    }

    /// Last `n` rows (all rows if there are fewer).
    pub fn tail(&self, n: usize) -> Self {
        let start = self.rows.len().saturating_sub(n);
        Self {
            headers: self.headers.clone(),
            rows: self.rows[start..].to_vec(),
        }
    }

    /// Serialize to CSV bytes with a header row.
    pub fn to_csv_bytes(&self) -> Result<Vec<u8>, CoreError> {
        write_csv(&self.headers, &self.rows)
    }

    /// Serialize to CSV text with a header row.
    pub fn to_csv_string(&self) -> Result<String, CoreError> {
        let bytes = self.to_csv_bytes()?;
        String::from_utf8(bytes).map_err(|e| CoreError::Internal(e.to_string()))
    }

    fn retain<F: Fn(&[String]) -> bool>(&self, keep: F) -> Self {
        Self {
            headers: self.headers.clone(),
            rows: self.rows.iter().filter(|r| keep(r)).cloned().collect(),
        }
    }
}

/// Write headers and rows as CSV into a byte buffer.
pub(crate) fn write_csv(headers: &[String], rows: &[Vec<String>]) -> Result<Vec<u8>, CoreError> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(headers)?;
    for row in rows {
        writer.write_record(row)?;
    }
    writer
        .into_inner()
        .map_err(|e| CoreError::Internal(format!("CSV flush failed: {e}")))
}

/// Write bytes to `path` through a temporary sibling file and a rename,
/// so readers never observe a half-written table.
pub(crate) fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), CoreError> {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = std::path::PathBuf::from(tmp);

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| CoreError::io(parent, e))?;
    }
    std::fs::write(&tmp, bytes).map_err(|e| CoreError::io(&tmp, e))?;
    std::fs::rename(&tmp, path).map_err(|e| CoreError::io(path, e))
}

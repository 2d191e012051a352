//! Reference store: which project and deployment serve each series.
//!
//! Written by the retrain flow, read by the scoring flow. Persisted as a
//! CSV file with the columns `use_case, latest_project, deployment_id,
//! error, content_key`.
//!
//! The store is keyed by `use_case` with last-write-wins semantics: a
//! series processed again replaces its previous row in place, and rows
//! for series that were not touched are carried over unchanged.

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::dataset::write_atomic;
use crate::error::CoreError;
use crate::types::RemoteId;

/// One series' active project and deployment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReferenceRecord {
    /// Series key.
    pub use_case: String,
    pub latest_project: RemoteId,
    pub deployment_id: RemoteId,
    /// Cross-validated metric of the deployed model (or its parent).
    pub error: Option<f64>,
    /// Digest of the training input; empty for files written before keys existed.
    #[serde(default)]
    pub content_key: String,
}

/// Whether an upsert added a series or replaced an existing one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Upsert {
    Inserted,
    Replaced,
}

/// Keyed, ordered collection of [`ReferenceRecord`]s.
#[derive(Debug, Clone, Default)]
pub struct ReferenceStore {
    records: Vec<ReferenceRecord>,
    index: HashMap<String, usize>,
}

impl ReferenceStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a reference file. The file must exist.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, CoreError> {
        let path = path.as_ref();
        let file = std::fs::File::open(path).map_err(|e| CoreError::io(path, e))?;
        Self::from_reader(file)
    }

    /// Load a reference file, treating a missing file as an empty store.
    pub fn load_or_empty<P: AsRef<Path>>(path: P) -> Result<Self, CoreError> {
        let path = path.as_ref();
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::new())
        }
    }

    /// Read records from CSV. Duplicate series keep their last row.
    pub fn from_reader<R: std::io::Read>(reader: R) -> Result<Self, CoreError> {
        let mut reader = csv::Reader::from_reader(reader);
        let mut store = Self::new();
        for record in reader.deserialize::<ReferenceRecord>() {
            store.upsert(record?);
        }
        Ok(store)
    }

    /// Insert a record, replacing any existing row for the same series.
    pub fn upsert(&mut self, record: ReferenceRecord) -> Upsert {
        match self.index.get(&record.use_case) {
            Some(&pos) => {
                self.records[pos] = record;
                Upsert::Replaced
            }
            None => {
                self.index
                    .insert(record.use_case.clone(), self.records.len());
                self.records.push(record);
                Upsert::Inserted
            }
        }
    }

    /// Upsert every record from a run, returning `(inserted, replaced)` counts.
    pub fn merge<I>(&mut self, records: I) -> (usize, usize)
    where
        I: IntoIterator<Item = ReferenceRecord>,
    {
        records
            .into_iter()
            .fold((0, 0), |(ins, rep), record| match self.upsert(record) {
                Upsert::Inserted => (ins + 1, rep),
                Upsert::Replaced => (ins, rep + 1),
            })
    }

    pub fn get(&self, use_case: &str) -> Option<&ReferenceRecord> {
        self.index.get(use_case).map(|&pos| &self.records[pos])
    }

    pub fn records(&self) -> &[ReferenceRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Serialize the whole table as CSV.
    pub fn to_csv_bytes(&self) -> Result<Vec<u8>, CoreError> {
        let mut writer = csv::Writer::from_writer(Vec::new());
        if self.records.is_empty() {
            writer.write_record([
                "use_case",
                "latest_project",
                "deployment_id",
                "error",
                "content_key",
            ])?;
        }
        for record in &self.records {
            writer.serialize(record)?;
        }
        writer
            .into_inner()
            .map_err(|e| CoreError::Internal(format!("CSV flush failed: {e}")))
    }

    /// Overwrite the reference file with the full table.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), CoreError> {
        write_atomic(path.as_ref(), &self.to_csv_bytes()?)
    }
}

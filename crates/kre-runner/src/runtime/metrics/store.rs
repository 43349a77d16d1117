//! Metric stores
//!
//! The metric writer actor hands every record to a [`MetricStore`]. Two
//! stores ship with the runner: an in-memory one for tests and local runs,
//! and a JSON-lines file store.

use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, RwLock};

use chrono::{DateTime, Utc};

use super::MetricRecord;

/// Errors raised by metric stores
#[derive(Debug, thiserror::Error)]
pub enum MetricStoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Store lock poisoned")]
    Poisoned,
}

/// Destination for metric records
pub trait MetricStore: Send + Sync {
    /// Persist one record
    fn insert(&self, record: &MetricRecord) -> Result<(), MetricStoreError>;

    /// Records dated within `[start, end]`, oldest first
    fn between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<MetricRecord>, MetricStoreError>;

    /// Number of stored records
    fn len(&self) -> Result<usize, MetricStoreError>;

    fn is_empty(&self) -> Result<bool, MetricStoreError> {
        Ok(self.len()? == 0)
    }
}

fn select_between(
    records: impl IntoIterator<Item = MetricRecord>,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> Vec<MetricRecord> {
    let mut selected: Vec<MetricRecord> = records
        .into_iter()
        .filter(|r| r.date >= start && r.date <= end)
        .collect();
    selected.sort_by_key(|r| r.date);
    selected
}

/// In-memory metric store
#[derive(Debug, Default)]
pub struct MemoryMetricStore {
    records: RwLock<Vec<MetricRecord>>,
}

impl MemoryMetricStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every record in insertion order
    pub fn records(&self) -> Result<Vec<MetricRecord>, MetricStoreError> {
        let records = self.records.read().map_err(|_| MetricStoreError::Poisoned)?;
        Ok(records.clone())
    }
}

impl MetricStore for MemoryMetricStore {
    fn insert(&self, record: &MetricRecord) -> Result<(), MetricStoreError> {
        let mut records = self.records.write().map_err(|_| MetricStoreError::Poisoned)?;
        records.push(record.clone());
        Ok(())
    }

    fn between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<MetricRecord>, MetricStoreError> {
        let records = self.records.read().map_err(|_| MetricStoreError::Poisoned)?;
        Ok(select_between(records.iter().cloned(), start, end))
    }

    fn len(&self) -> Result<usize, MetricStoreError> {
        let records = self.records.read().map_err(|_| MetricStoreError::Poisoned)?;
        Ok(records.len())
    }
}

/// Store that appends one JSON document per line to a file
#[derive(Debug)]
pub struct JsonlMetricStore {
    path: PathBuf,
    file: Mutex<File>,
}

impl JsonlMetricStore {
    /// Open (or create) the file at `path` in append mode
    pub fn open(path: impl AsRef<Path>) -> Result<Self, MetricStoreError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(&path)?;

        tracing::debug!(path = %path.display(), "Opened metric file");
        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_all(&self) -> Result<Vec<MetricRecord>, MetricStoreError> {
        // Hold the writer lock so a half-written line is never read
        let _guard = self.file.lock().map_err(|_| MetricStoreError::Poisoned)?;
        let reader = BufReader::new(File::open(&self.path)?);

        let mut records = Vec::new();
        for line in reader.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            records.push(serde_json::from_str(&line)?);
        }
        Ok(records)
    }
}

impl MetricStore for JsonlMetricStore {
    fn insert(&self, record: &MetricRecord) -> Result<(), MetricStoreError> {
        let mut line = serde_json::to_vec(record)?;
        line.push(b'\n');

        let mut file = self.file.lock().map_err(|_| MetricStoreError::Poisoned)?;
        file.write_all(&line)?;
        file.flush()?;
        Ok(())
    }

    fn between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<MetricRecord>, MetricStoreError> {
        Ok(select_between(self.read_all()?, start, end))
    }

    fn len(&self) -> Result<usize, MetricStoreError> {
        Ok(self.read_all()?.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::context::WorkerIdentity;
    use chrono::TimeZone;
    use kre_runner_sdk::{SaveMetric, ERR_NEW_LABELS};

    fn record_at(day: u32) -> MetricRecord {
        let date = Utc.with_ymd_and_hms(2020, 4, day, 0, 0, 0).unwrap();
        MetricRecord::resolve(
            SaveMetric::new().date(date).predicted_value(format!("class_{day}")),
            &WorkerIdentity::default(),
            Utc::now(),
        )
    }

    #[test]
    fn test_memory_store_between() {
        let store = MemoryMetricStore::new();
        for day in [9, 3, 6, 1] {
            store.insert(&record_at(day)).unwrap();
        }
        assert_eq!(store.len().unwrap(), 4);

        let start = Utc.with_ymd_and_hms(2020, 4, 3, 0, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2020, 4, 6, 0, 0, 0).unwrap();
        let days: Vec<_> = store
            .between(start, end)
            .unwrap()
            .into_iter()
            .map(|r| r.predicted_value.unwrap())
            .collect();
        assert_eq!(days, vec!["class_3", "class_6"]);
    }

    #[test]
    fn test_jsonl_store_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("metrics").join("worker.jsonl");

        let first = record_at(2);
        let mut second = record_at(4);
        second.error = Some(ERR_NEW_LABELS);
        second.predicted_value = None;

        {
            let store = JsonlMetricStore::open(&path).unwrap();
            assert!(store.is_empty().unwrap());
            store.insert(&first).unwrap();
            store.insert(&second).unwrap();
        }

        let store = JsonlMetricStore::open(&path).unwrap();
        assert_eq!(store.len().unwrap(), 2);

        let all = store
            .between(first.date, second.date)
            .unwrap();
        assert_eq!(all, vec![first, second]);

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains(r#""error":"new_labels""#));
        assert_eq!(text.lines().count(), 2);
    }
}

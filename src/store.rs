use std::future::Future;
use std::path::Path;
use std::sync::Mutex;

use anyhow::Context;
use chrono::{DateTime, Utc};
use serde_json::json;

use crate::error::StorageError;
use crate::models::PracticeRecord;

/// Durable, append-only collection of practice records.
pub trait RecordStore {
    /// Inserts and commits one record.
    fn insert(
        &self,
        record: &PracticeRecord,
    ) -> impl Future<Output = Result<(), StorageError>> + Send;

    fn query_all(&self) -> impl Future<Output = Result<Vec<PracticeRecord>, StorageError>> + Send;
}

/// Process-local store used for offline aggregation of CSV exports.
#[derive(Debug, Default)]
pub struct MemoryRecordStore {
    records: Mutex<Vec<PracticeRecord>>,
}

impl MemoryRecordStore {
    pub fn new(records: Vec<PracticeRecord>) -> Self {
        Self {
            records: Mutex::new(records),
        }
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Vec<PracticeRecord>>, StorageError> {
        self.records.lock().map_err(|_| StorageError::Unavailable {
            reason: "failed to acquire record store".to_string(),
        })
    }
}

impl RecordStore for MemoryRecordStore {
    async fn insert(&self, record: &PracticeRecord) -> Result<(), StorageError> {
        let mut records = self.lock()?;
        let duplicate = records.iter().any(|existing| {
            existing.id == record.id
                || (existing.timestamp == record.timestamp && existing.prompt == record.prompt)
        });
        if duplicate {
            return Err(StorageError::Duplicate { id: record.id });
        }
        records.push(record.clone());
        Ok(())
    }

    async fn query_all(&self) -> Result<Vec<PracticeRecord>, StorageError> {
        Ok(self.lock()?.clone())
    }
}

#[derive(Debug, serde::Deserialize)]
struct CsvRow {
    timestamp: DateTime<Utc>,
    score: Option<f64>,
    fluency: Option<f64>,
    completeness: Option<f64>,
    relevance: Option<f64>,
    prompt: String,
    user_text: Option<String>,
}

impl CsvRow {
    fn into_record(self) -> PracticeRecord {
        let has_dimensions =
            self.fluency.is_some() || self.completeness.is_some() || self.relevance.is_some();
        let mut record = PracticeRecord::new(self.timestamp, self.prompt);
        record.score = self.score;
        record.dimension_payload = has_dimensions.then(|| {
            json!({
                "fluency": self.fluency,
                "completeness": self.completeness,
                "relevance": self.relevance,
            })
            .to_string()
        });
        record.user_text = self.user_text.filter(|text| !text.trim().is_empty());
        record.is_audio = record.user_text.is_none();
        record
    }
}

pub fn read_csv_records(path: &Path) -> anyhow::Result<Vec<PracticeRecord>> {
    let mut reader = csv::Reader::from_path(path)
        .with_context(|| format!("failed to open {}", path.display()))?;
    let mut records = Vec::new();

    for (line, result) in reader.deserialize::<CsvRow>().enumerate() {
        let row = result.with_context(|| format!("invalid row {} in {}", line + 1, path.display()))?;
        records.push(row.into_record());
    }

    Ok(records)
}

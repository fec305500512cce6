use chrono::{DateTime, Duration, Utc};
use serde_json::json;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::error::StorageError;
use crate::models::PracticeRecord;
use crate::store::{read_csv_records, RecordStore};

pub async fn init_db(pool: &PgPool) -> Result<(), StorageError> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

/// Postgres-backed record store. Each insert commits on its own.
#[derive(Debug, Clone)]
pub struct PgRecordStore {
    pool: PgPool,
}

impl PgRecordStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

impl RecordStore for PgRecordStore {
    async fn insert(&self, record: &PracticeRecord) -> Result<(), StorageError> {
        let written = insert_record(&self.pool, record).await?;
        ensure_written(written, record)
    }

    async fn query_all(&self) -> Result<Vec<PracticeRecord>, StorageError> {
        fetch_records(&self.pool).await
    }
}

/// Returns the number of rows written; duplicates by id or by
/// `(created_at, prompt)` are skipped.
pub async fn insert_record(pool: &PgPool, record: &PracticeRecord) -> Result<u64, StorageError> {
    let result = sqlx::query(
        r#"
        INSERT INTO practice.records
        (id, created_at, score, dimension_payload, prompt, user_text, is_audio, audio_ref)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        ON CONFLICT DO NOTHING
        "#,
    )
    .bind(record.id)
    .bind(record.timestamp)
    .bind(record.score)
    .bind(record.dimension_payload.as_deref())
    .bind(&record.prompt)
    .bind(record.user_text.as_deref())
    .bind(record.is_audio)
    .bind(record.audio_ref.as_deref())
    .execute(pool)
    .await?;

    Ok(result.rows_affected())
}

/// A skipped insert is an error for callers that report the record as saved.
fn ensure_written(rows: u64, record: &PracticeRecord) -> Result<(), StorageError> {
    if rows == 0 {
        return Err(StorageError::Duplicate { id: record.id });
    }
    Ok(())
}

pub async fn fetch_records(pool: &PgPool) -> Result<Vec<PracticeRecord>, StorageError> {
    let rows = sqlx::query(
        "SELECT id, created_at, score, dimension_payload, prompt, user_text, is_audio, audio_ref \
         FROM practice.records \
         ORDER BY created_at DESC",
    )
    .fetch_all(pool)
    .await?;

    Ok(rows.iter().map(record_from_row).collect())
}

fn record_from_row(row: &PgRow) -> PracticeRecord {
    PracticeRecord {
        id: row.get("id"),
        timestamp: row.get("created_at"),
        score: row.get("score"),
        dimension_payload: row.get("dimension_payload"),
        prompt: row.get("prompt"),
        user_text: row.get("user_text"),
        is_audio: row.get("is_audio"),
        audio_ref: row.get("audio_ref"),
    }
}

pub async fn seed(pool: &PgPool) -> Result<u64, StorageError> {
    let mut inserted = 0;
    for record in seed_records(Utc::now()) {
        inserted += insert_record(pool, &record).await?;
    }
    Ok(inserted)
}

pub async fn import_csv(pool: &PgPool, csv_path: &std::path::Path) -> anyhow::Result<u64> {
    let records = read_csv_records(csv_path)?;
    let mut inserted = 0;

    for record in &records {
        inserted += insert_record(pool, record).await?;
    }

    Ok(inserted)
}

/// Two weeks of sample practice, keyed by fixed ids so reseeding is a no-op.
pub fn seed_records(now: DateTime<Utc>) -> Vec<PracticeRecord> {
    let samples: [(u128, i64, Option<[f64; 3]>, &str, Option<&str>); 6] = [
        (
            0x3d7f5d6f_24f7_4e8e_8b4b_3e7e44b4a7b2,
            13,
            Some([55.0, 65.0, 60.0]),
            "Describe your day.",
            None,
        ),
        (
            0x0c22f1f1_9184_4fd4_9b21_28c68a6a89dc,
            9,
            Some([62.0, 70.0, 66.0]),
            "Talk about a book you enjoyed.",
            None,
        ),
        (
            0xd5a0a1a2_2a3c_44c2_8f73_60b7897a9dd2,
            6,
            None,
            "Introduce yourself to a new colleague.",
            None,
        ),
        (
            0x8f1c2e43_5b7a_4c1d_9e2f_7a6b5c4d3e21,
            3,
            Some([82.0, 75.0, 83.0]),
            "Explain your favourite hobby.",
            Some("I really enjoy hiking because it clears my head."),
        ),
        (
            0x1b2c3d4e_5f60_4718_8a9b_0c1d2e3f4a5b,
            1,
            Some([88.0, 80.0, 86.0]),
            "Describe your hometown.",
            None,
        ),
        (
            0x6a7b8c9d_0e1f_4a2b_8c3d_4e5f6a7b8c9d,
            0,
            Some([92.0, 88.0, 90.0]),
            "Summarise today's news.",
            None,
        ),
    ];

    samples
        .iter()
        .map(|(id, days_ago, dimensions, prompt, user_text)| {
            let mut record = PracticeRecord::new(now - Duration::days(*days_ago), *prompt);
            record.id = Uuid::from_u128(*id);
            record.user_text = user_text.map(str::to_string);
            record.is_audio = user_text.is_none();
            if let Some([fluency, completeness, relevance]) = dimensions {
                record.score = Some((fluency + completeness + relevance) / 3.0);
                record.dimension_payload = Some(
                    json!({
                        "fluency": fluency,
                        "completeness": completeness,
                        "relevance": relevance,
                    })
                    .to_string(),
                );
            }
            record
        })
        .collect()
}

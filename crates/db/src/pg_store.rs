//! PostgreSQL status store backed by the `job_statuses` table.

use std::collections::BTreeMap;

use async_trait::async_trait;
use audioforma_core::job::{JobRecord, JobStatus};
use audioforma_core::types::{JobId, Timestamp};
use sqlx::types::Json;
use sqlx::PgPool;

use crate::{StatusStore, StoreError};

/// Column list for `job_statuses` queries.
const COLUMNS: &str = "\
    job_id, status, progress, error, files, \
    created_at, updated_at, completed_at";

#[derive(Debug, sqlx::FromRow)]
struct JobStatusRow {
    job_id: String,
    status: String,
    progress: f64,
    error: Option<String>,
    files: Option<Json<BTreeMap<String, String>>>,
    created_at: Timestamp,
    updated_at: Timestamp,
    completed_at: Option<Timestamp>,
}

impl JobStatusRow {
    fn into_record(self) -> Result<JobRecord, StoreError> {
        let corrupt = |reason: String| StoreError::Corrupt {
            job_id: self.job_id.clone(),
            reason,
        };
        let job_id = JobId::parse(&self.job_id).map_err(|e| corrupt(e.to_string()))?;
        let status = JobStatus::from_name(&self.status).map_err(|e| corrupt(e.to_string()))?;
        Ok(JobRecord {
            job_id,
            status,
            progress: self.progress,
            error: self.error,
            files: self.files.map(|Json(files)| files),
            created_at: self.created_at,
            updated_at: self.updated_at,
            completed_at: self.completed_at,
        })
    }
}

#[derive(Debug, Clone)]
pub struct PgStatusStore {
    pool: PgPool,
}

impl PgStatusStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl StatusStore for PgStatusStore {
    async fn upsert(&self, record: &JobRecord) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO job_statuses (\
                job_id, status, progress, error, files, \
                created_at, updated_at, completed_at\
             ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8) \
             ON CONFLICT (job_id) DO UPDATE SET \
                status = EXCLUDED.status, \
                progress = EXCLUDED.progress, \
                error = EXCLUDED.error, \
                files = EXCLUDED.files, \
                updated_at = EXCLUDED.updated_at, \
                completed_at = EXCLUDED.completed_at",
        )
        .bind(record.job_id.as_str())
        .bind(record.status.as_str())
        .bind(record.progress)
        .bind(record.error.as_deref())
        .bind(record.files.as_ref().map(Json))
        .bind(record.created_at)
        .bind(record.updated_at)
        .bind(record.completed_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get(&self, job_id: &JobId) -> Result<Option<JobRecord>, StoreError> {
        let query = format!("SELECT {COLUMNS} FROM job_statuses WHERE job_id = $1");
        let row = sqlx::query_as::<_, JobStatusRow>(&query)
            .bind(job_id.as_str())
            .fetch_optional(&self.pool)
            .await?;
        row.map(JobStatusRow::into_record).transpose()
    }

    fn backend(&self) -> &'static str {
        "postgres"
    }
}

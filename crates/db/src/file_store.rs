//! JSON-file status store: one `<jobs_dir>/<job_id>.json` per job.
//!
//! Each upsert writes a uniquely named temp file in the same directory and
//! renames it over the target, so a reader sees either the previous record
//! or the new one, never a torn write.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use audioforma_core::job::JobRecord;
use audioforma_core::types::JobId;

use crate::{StatusStore, StoreError};

#[derive(Debug, Clone)]
pub struct FileStatusStore {
    dir: PathBuf,
}

impl FileStatusStore {
    /// Use `dir` as the record directory, creating it if needed.
    pub async fn open(dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir).await?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn record_path(&self, job_id: &JobId) -> PathBuf {
        self.dir.join(format!("{job_id}.json"))
    }
}

#[async_trait]
impl StatusStore for FileStatusStore {
    async fn upsert(&self, record: &JobRecord) -> Result<(), StoreError> {
        let body = serde_json::to_vec_pretty(record)?;
        let target = self.record_path(&record.job_id);
        let tmp = self
            .dir
            .join(format!(".{}.{}.tmp", record.job_id, uuid::Uuid::new_v4().simple()));

        tokio::fs::write(&tmp, &body).await?;
        if let Err(e) = tokio::fs::rename(&tmp, &target).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(e.into());
        }
        Ok(())
    }

    async fn get(&self, job_id: &JobId) -> Result<Option<JobRecord>, StoreError> {
        let bytes = match tokio::fs::read(self.record_path(job_id)).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|e| StoreError::Corrupt {
                job_id: job_id.to_string(),
                reason: e.to_string(),
            })
    }

    fn backend(&self) -> &'static str {
        "file"
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

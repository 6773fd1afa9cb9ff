use std::collections::HashMap;

use async_trait::async_trait;
use audioforma_core::job::JobRecord;
use audioforma_core::types::JobId;
use tokio::sync::RwLock;

use crate::{StatusStore, StoreError};

/// In-process store. Records are lost on restart.
#[derive(Debug, Default)]
pub struct MemoryStatusStore {
    records: RwLock<HashMap<JobId, JobRecord>>,
}

impl MemoryStatusStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}

#[async_trait]
impl StatusStore for MemoryStatusStore {
    async fn upsert(&self, record: &JobRecord) -> Result<(), StoreError> {
        self.records
            .write()
            .await
            .insert(record.job_id.clone(), record.clone());
        Ok(())
    }

    async fn get(&self, job_id: &JobId) -> Result<Option<JobRecord>, StoreError> {
        Ok(self.records.read().await.get(job_id).cloned())
    }

    fn backend(&self) -> &'static str {
        "memory"
    }
}

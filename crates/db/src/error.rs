use audioforma_core::error::CoreError;

/// Failures of a status store backend.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("status store I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("status record serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("corrupt status record for job {job_id}: {reason}")]
    Corrupt { job_id: String, reason: String },
}

impl From<StoreError> for CoreError {
    fn from(err: StoreError) -> Self {
        CoreError::Resource(err.to_string())
    }
}

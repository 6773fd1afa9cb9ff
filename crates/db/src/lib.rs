//! Job status store.
//!
//! The orchestrator persists whole [`JobRecord`]s through the
//! [`StatusStore`] trait and API handlers read them back. Three backends
//! exist: JSON files on local disk, an in-process map, and a PostgreSQL
//! table. [`connect`] picks one from a [`StoreConfig`].

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use audioforma_core::job::JobRecord;
use audioforma_core::types::JobId;
use sqlx::postgres::PgPoolOptions;

pub mod error;
pub mod file_store;
pub mod memory_store;
pub mod pg_store;

pub use error::StoreError;
pub use file_store::FileStatusStore;
pub use memory_store::MemoryStatusStore;
pub use pg_store::PgStatusStore;

pub type DbPool = sqlx::PgPool;

/// Persistence for job status records.
///
/// Writes are whole-record upserts. There is deliberately no
/// read-modify-write primitive: each job has exactly one writer.
#[async_trait]
pub trait StatusStore: Send + Sync {
    /// Insert or replace the record for `record.job_id`.
    async fn upsert(&self, record: &JobRecord) -> Result<(), StoreError>;

    /// Fetch the record of `job_id`, `None` if it was never written.
    async fn get(&self, job_id: &JobId) -> Result<Option<JobRecord>, StoreError>;

    /// Short backend name for logs and the health endpoint.
    fn backend(&self) -> &'static str;
}

/// Backend selection.
#[derive(Debug, Clone)]
pub enum StoreConfig {
    File { dir: PathBuf },
    Memory,
    Postgres { database_url: String, max_connections: u32 },
}

/// Open the configured backend. The PostgreSQL backend runs migrations.
pub async fn connect(config: &StoreConfig) -> Result<Arc<dyn StatusStore>, StoreError> {
    let store: Arc<dyn StatusStore> = match config {
        StoreConfig::File { dir } => Arc::new(FileStatusStore::open(dir.clone()).await?),
        StoreConfig::Memory => Arc::new(MemoryStatusStore::new()),
        StoreConfig::Postgres {
            database_url,
            max_connections,
        } => {
            let pool = create_pool(database_url, *max_connections).await?;
            run_migrations(&pool).await?;
            Arc::new(PgStatusStore::new(pool))
        }
    };
    tracing::info!(backend = store.backend(), "Status store ready");
    Ok(store)
}

/// Create a connection pool from a database URL.
pub async fn create_pool(database_url: &str, max_connections: u32) -> Result<DbPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(database_url)
        .await
}

/// Apply the embedded migrations in `crates/db/migrations`.
pub async fn run_migrations(pool: &DbPool) -> Result<(), StoreError> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

/// Check that the pool can reach the database.
pub async fn health_check(pool: &DbPool) -> Result<(), sqlx::Error> {
    sqlx::query("SELECT 1").execute(pool).await?;
    Ok(())
}

//! PostgreSQL backend tests. Need `DATABASE_URL`; run with `--ignored`.

use std::collections::BTreeMap;

use audioforma_core::job::{JobRecord, JobStatus};
use audioforma_core::types::JobId;
use audioforma_db::{PgStatusStore, StatusStore};
use sqlx::PgPool;

#[sqlx::test(migrations = "./migrations")]
#[ignore = "requires a PostgreSQL database"]
async fn test_upsert_then_get(pool: PgPool) {
    audioforma_db::health_check(&pool).await.unwrap();
    let store = PgStatusStore::new(pool);
    let id = JobId::parse("pg_1").unwrap();

    assert!(store.get(&id).await.unwrap().is_none());

    let mut record = JobRecord::new(id.clone());
    store.upsert(&record).await.unwrap();
    record.advance(JobStatus::Uploading, 0.0).unwrap();
    record.advance(JobStatus::Validating, 0.1).unwrap();
    record.advance(JobStatus::Processing, 0.2).unwrap();
    record.set_progress(0.55).unwrap();
    store.upsert(&record).await.unwrap();

    let loaded = store.get(&id).await.unwrap().unwrap();
    assert_eq!(loaded.status, JobStatus::Processing);
    assert!((loaded.progress - 0.55).abs() < 1e-9);
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "requires a PostgreSQL database"]
async fn test_completed_record_keeps_files(pool: PgPool) {
    let store = PgStatusStore::new(pool);
    let id = JobId::parse("pg_2").unwrap();

    let mut record = JobRecord::new(id.clone());
    record.advance(JobStatus::Uploading, 0.0).unwrap();
    record.advance(JobStatus::Validating, 0.1).unwrap();
    record.advance(JobStatus::Processing, 0.2).unwrap();
    let files: BTreeMap<String, String> = ["vocals", "drums", "bass", "other"]
        .into_iter()
        .map(|n| (n.to_string(), format!("/files/pg_2/{n}.mp3")))
        .collect();
    record.complete(files.clone()).unwrap();
    store.upsert(&record).await.unwrap();

    let loaded = store.get(&id).await.unwrap().unwrap();
    assert_eq!(loaded.status, JobStatus::Completed);
    assert_eq!(loaded.files, Some(files));
    assert!(loaded.completed_at.is_some());
}

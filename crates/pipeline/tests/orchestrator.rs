mod common;

use std::sync::Arc;
use std::time::Duration;

use assert_matches::assert_matches;
use audioforma_cloud::BlobStore;
use audioforma_core::error::CoreError;
use audioforma_core::job::JobStatus;
use audioforma_core::types::JobId;
use audioforma_pipeline::orchestrator::INTERRUPTED_MESSAGE;
use audioforma_pipeline::{JobInput, OrchestratorSettings};
use audioforma_separator::OutputStream;
use common::{
    harness, harness_with, harness_with_flaky_store, wait_idle, wait_terminal, Ending,
    RecordingBlobStore, ScriptedEngine,
};

const BAR: &str = " 53%|█████▎    | 17.5/30.0 [00:05<00:04,  3.21seconds/s]\r";

fn upload() -> JobInput {
    JobInput::Upload {
        filename: Some("song.mp3".to_string()),
        data: vec![0xFF; 4096],
    }
}

/// Drain every update published for `job_id` so far.
fn collect_updates(
    rx: &mut tokio::sync::broadcast::Receiver<audioforma_events::JobUpdate>,
    job_id: &JobId,
) -> Vec<(JobStatus, f64)> {
    let mut seen = Vec::new();
    while let Ok(update) = rx.try_recv() {
        if update.job_id() == job_id {
            seen.push((update.record.status, update.record.progress));
        }
    }
    seen
}

#[tokio::test]
async fn test_short_clip_fails_validation_and_is_cleaned_up() {
    let h = harness(ScriptedEngine::succeeding(&[]), 10.0, None);
    let mut rx = h.orchestrator.subscribe();

    let created = h.orchestrator.submit(upload()).await.unwrap();
    assert_eq!(created.status, JobStatus::Created);

    let record = wait_terminal(&h.orchestrator, &created.job_id).await;
    assert_eq!(record.status, JobStatus::Error);
    assert!(record.error.as_deref().unwrap().contains("minimum duration"));
    assert!((record.progress - 0.1).abs() < 1e-9);
    assert!(record.completed_at.is_some());
    assert!(record.files.is_none());

    wait_idle(&h.orchestrator).await;
    assert!(!h.workspaces.exists(&created.job_id).await);

    let statuses: Vec<JobStatus> = collect_updates(&mut rx, &created.job_id)
        .into_iter()
        .map(|(s, _)| s)
        .collect();
    assert_eq!(
        statuses,
        [
            JobStatus::Created,
            JobStatus::Uploading,
            JobStatus::Validating,
            JobStatus::Error
        ]
    );
}

#[tokio::test]
async fn test_forty_second_clip_completes_with_all_stems() {
    let engine = ScriptedEngine::succeeding(&[
        "Selected model is a bag of 4 models.\n",
        "Separating track temp/job/input.mp3\n",
        "Separating track temp/job/input.mp3\n",
        BAR,
    ]);
    let h = harness(engine, 40.0, None);
    let mut rx = h.orchestrator.subscribe();

    let created = h.orchestrator.submit(upload()).await.unwrap();
    let record = wait_terminal(&h.orchestrator, &created.job_id).await;

    assert_eq!(record.status, JobStatus::Completed);
    assert_eq!(record.progress, 1.0);
    let files = record.files.expect("completed job has files");
    assert_eq!(files.len(), 4);
    for stem in ["vocals", "drums", "bass", "other"] {
        assert_eq!(
            files[stem],
            format!("/files/{}/output/mdx_extra/input/{stem}.mp3", created.job_id)
        );
    }

    // Two finished stages plus 17.5 of an assumed 33 s stage.
    let expected = 0.2 + (2.0 * 100.0 + 17.5 / 33.0 * 100.0) / 4.0 / 100.0 * 0.8;
    let updates = collect_updates(&mut rx, &created.job_id);
    assert!(
        updates
            .iter()
            .any(|(s, p)| *s == JobStatus::Processing && (p - expected).abs() < 1e-4),
        "expected a processing update near {expected}: {updates:?}"
    );
    assert!(updates.windows(2).all(|w| w[0].1 <= w[1].1));

    // Local results stay on disk for the retention window.
    assert!(h.workspaces.exists(&created.job_id).await);
    assert!(h.orchestrator.shutdown(Duration::from_secs(1)).await);
}

#[tokio::test]
async fn test_progress_never_decreases() {
    let engine = ScriptedEngine::succeeding(&[
        "Separating track x\n",
        " 60%| 20.0/33.0\n",
        " 30%| 10.0/33.0\n",
        " 90%| 30.0/33.0\n",
    ]);
    let h = harness(engine, 60.0, None);
    let mut rx = h.orchestrator.subscribe();

    let created = h.orchestrator.submit(upload()).await.unwrap();
    wait_terminal(&h.orchestrator, &created.job_id).await;

    let progress: Vec<f64> = collect_updates(&mut rx, &created.job_id)
        .into_iter()
        .map(|(_, p)| p)
        .collect();
    assert!(progress.windows(2).all(|w| w[0] <= w[1]), "{progress:?}");
}

#[tokio::test]
async fn test_engine_failure_keeps_cause_and_progress() {
    let engine = ScriptedEngine::new(
        &["Separating track x\n", " 50%| 16.5/33.0\n"],
        Ending::Fail("RuntimeError: out of memory"),
    );
    let h = harness(engine, 60.0, None);

    let created = h.orchestrator.submit(upload()).await.unwrap();
    let record = wait_terminal(&h.orchestrator, &created.job_id).await;

    assert_eq!(record.status, JobStatus::Error);
    assert!(record.error.as_deref().unwrap().contains("out of memory"));
    assert!(record.progress > 0.2 && record.progress < 1.0);

    wait_idle(&h.orchestrator).await;
    assert!(!h.workspaces.exists(&created.job_id).await);
}

#[tokio::test]
async fn test_engine_panic_is_recorded_as_error() {
    let h = harness(ScriptedEngine::new(&[], Ending::Panic), 60.0, None);

    let created = h.orchestrator.submit(upload()).await.unwrap();
    let record = wait_terminal(&h.orchestrator, &created.job_id).await;

    assert_eq!(record.status, JobStatus::Error);
    assert!(record.error.as_deref().unwrap().contains("panicked"));
}

#[tokio::test]
async fn test_missing_stem_fails_the_job() {
    let engine = ScriptedEngine::new(&[], Ending::Stems(vec!["vocals", "drums", "other"]));
    let h = harness(engine, 60.0, None);

    let created = h.orchestrator.submit(upload()).await.unwrap();
    let record = wait_terminal(&h.orchestrator, &created.job_id).await;

    assert_eq!(record.status, JobStatus::Error);
    assert!(record.error.as_deref().unwrap().contains("missing bass file"));
    assert!(record.files.is_none());
}

#[tokio::test]
async fn test_blob_store_uploads_and_cleans_up_immediately() {
    let blobs = Arc::new(RecordingBlobStore::default());
    let h = harness(ScriptedEngine::succeeding(&[]), 60.0, Some(blobs.clone() as Arc<dyn BlobStore>));

    let created = h.orchestrator.submit(upload()).await.unwrap();
    let record = wait_terminal(&h.orchestrator, &created.job_id).await;

    assert_eq!(record.status, JobStatus::Completed);
    let files = record.files.unwrap();
    assert_eq!(
        files["vocals"],
        format!("https://blobs.test/public/stems/{}/vocals.mp3", created.job_id)
    );
    assert_eq!(blobs.uploads.lock().unwrap().len(), 4);

    wait_idle(&h.orchestrator).await;
    assert!(!h.workspaces.exists(&created.job_id).await);
}

#[tokio::test]
async fn test_unknown_job_is_not_found() {
    let h = harness(ScriptedEngine::succeeding(&[]), 60.0, None);
    let missing = JobId::parse("20200101_000000_000_0000_0000").unwrap();
    assert_matches!(
        h.orchestrator.status(&missing).await,
        Err(CoreError::NotFound { entity: "Job", .. })
    );
}

#[tokio::test]
async fn test_empty_upload_is_rejected_before_any_workspace() {
    let h = harness(ScriptedEngine::succeeding(&[]), 60.0, None);
    let result = h
        .orchestrator
        .submit(JobInput::Upload {
            filename: None,
            data: Vec::new(),
        })
        .await;
    assert_matches!(result, Err(CoreError::Validation(_)));
    assert!(!h.workspaces.root().exists());
    assert!(h.store.is_empty().await);
}

#[tokio::test]
async fn test_concurrent_submissions_get_distinct_jobs() {
    let h = harness(ScriptedEngine::succeeding(&[]), 60.0, None);
    let submissions = (0..8).map(|_| h.orchestrator.submit(upload()));
    let records = futures::future::join_all(submissions).await;

    let mut ids: Vec<JobId> = records.into_iter().map(|r| r.unwrap().job_id).collect();
    ids.sort();
    ids.dedup();
    assert_eq!(ids.len(), 8);
    for id in &ids {
        assert_eq!(
            wait_terminal(&h.orchestrator, id).await.status,
            JobStatus::Completed
        );
    }
}

#[tokio::test]
async fn test_shutdown_bound_with_hung_engine() {
    let settings = OrchestratorSettings {
        result_retention: Duration::ZERO,
        ..OrchestratorSettings::default()
    };
    let h = harness_with(ScriptedEngine::new(&[], Ending::Hang), 60.0, None, settings);

    let created = h.orchestrator.submit(upload()).await.unwrap();
    for _ in 0..100 {
        if h.orchestrator.status(&created.job_id).await.unwrap().status == JobStatus::Processing {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(!h.orchestrator.shutdown(Duration::from_millis(100)).await);

    let record = h.orchestrator.status(&created.job_id).await.unwrap();
    assert_eq!(record.status, JobStatus::Error);
    assert_eq!(record.error.as_deref(), Some(INTERRUPTED_MESSAGE));
    assert_eq!(h.orchestrator.active_tasks(), 0);
}

#[tokio::test]
async fn test_stage_marker_between_unterminated_bars_advances_stage() {
    let engine = ScriptedEngine::with_streams(
        vec![
            (OutputStream::Stderr, "\r  0%| 0.0/33.0 [00:00<?]".to_string()),
            (OutputStream::Stdout, "Separating track input.mp3\n".to_string()),
            (OutputStream::Stderr, "\r 50%| 16.5/33.0 [00:05<00:05]".to_string()),
        ],
        Ending::Stems(vec!["vocals", "drums", "bass", "other"]),
    );
    let h = harness(engine, 60.0, None);
    let mut rx = h.orchestrator.subscribe();

    let created = h.orchestrator.submit(upload()).await.unwrap();
    let record = wait_terminal(&h.orchestrator, &created.job_id).await;
    assert_eq!(record.status, JobStatus::Completed);

    let max_processing = collect_updates(&mut rx, &created.job_id)
        .into_iter()
        .filter(|(status, _)| *status == JobStatus::Processing)
        .map(|(_, p)| p)
        .fold(0.0, f64::max);
    assert!((max_processing - 0.5).abs() < 1e-9, "got {max_processing}");
}

#[tokio::test]
async fn test_terminal_write_is_retried() {
    let settings = OrchestratorSettings {
        terminal_retry_delays: vec![Duration::from_millis(5); 3],
        ..OrchestratorSettings::default()
    };
    let (h, flaky) = harness_with_flaky_store(ScriptedEngine::succeeding(&[]), 2, settings);

    let created = h.orchestrator.submit(upload()).await.unwrap();
    let record = wait_terminal(&h.orchestrator, &created.job_id).await;

    assert_eq!(record.status, JobStatus::Completed);
    assert_eq!(flaky.terminal_attempts.load(std::sync::atomic::Ordering::SeqCst), 3);
}

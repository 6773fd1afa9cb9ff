//! Shared fakes for orchestrator tests.

#![allow(dead_code)]

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use audioforma_cloud::{BlobStore, CloudError};
use audioforma_core::artifacts::ArtifactSet;
use audioforma_core::error::CoreError;
use audioforma_core::job::JobRecord;
use audioforma_core::types::JobId;
use audioforma_core::workspace::WorkspaceManager;
use audioforma_db::{MemoryStatusStore, StatusStore, StoreError};
use audioforma_events::JobEventBus;
use audioforma_pipeline::{JobOrchestrator, MediaProbe, OrchestratorDeps, OrchestratorSettings};
use audioforma_separator::{
    OutputSink, OutputStream, SeparationEngine, SeparationOutput, SeparationRequest, SeparatorError,
};

/// Probe that reports a fixed duration.
pub struct FixedProbe(pub f64);

#[async_trait]
impl MediaProbe for FixedProbe {
    async fn duration_secs(&self, _path: &Path) -> Result<f64, CoreError> {
        Ok(self.0)
    }
}

/// How the scripted engine ends.
#[derive(Clone)]
pub enum Ending {
    Stems(Vec<&'static str>),
    Fail(&'static str),
    Panic,
    Hang,
}

/// Engine that replays `chunks` into the sink, then ends as scripted.
pub struct ScriptedEngine {
    pub chunks: Vec<(OutputStream, String)>,
    pub ending: Ending,
    artifacts: ArtifactSet,
}

impl ScriptedEngine {
    /// `chunks` are replayed on stdout.
    pub fn new(chunks: &[&str], ending: Ending) -> Self {
        let chunks: Vec<_> = chunks
            .iter()
            .map(|c| (OutputStream::Stdout, c.to_string()))
            .collect();
        Self::with_streams(chunks, ending)
    }

    pub fn with_streams(chunks: Vec<(OutputStream, String)>, ending: Ending) -> Self {
        Self {
            chunks,
            ending,
            artifacts: ArtifactSet::default(),
        }
    }

    pub fn succeeding(chunks: &[&str]) -> Self {
        Self::new(chunks, Ending::Stems(vec!["vocals", "drums", "bass", "other"]))
    }
}

#[async_trait]
impl SeparationEngine for ScriptedEngine {
    async fn separate(
        &self,
        request: SeparationRequest,
        sink: OutputSink,
    ) -> Result<SeparationOutput, SeparatorError> {
        for chunk in &self.chunks {
            let _ = sink.send(chunk.clone());
            tokio::task::yield_now().await;
        }
        match &self.ending {
            Ending::Fail(tail) => Err(SeparatorError::Failed {
                exit_code: Some(1),
                tail: tail.to_string(),
            }),
            Ending::Panic => panic!("engine exploded"),
            Ending::Hang => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                unreachable!()
            }
            Ending::Stems(stems) => {
                let dir = request.output_dir.join("mdx_extra").join("input");
                tokio::fs::create_dir_all(&dir).await?;
                for stem in stems {
                    tokio::fs::write(dir.join(format!("{stem}.mp3")), vec![1u8; 1000]).await?;
                }
                let artifacts = self.artifacts.verify(&dir)?;
                Ok(SeparationOutput {
                    artifact_dir: dir,
                    artifacts,
                    duration_ms: 1,
                })
            }
        }
    }

    fn artifacts(&self) -> &ArtifactSet {
        &self.artifacts
    }

    fn model(&self) -> &str {
        "mdx_extra"
    }
}

/// Blob store that records uploads and returns fake public URLs.
#[derive(Default)]
pub struct RecordingBlobStore {
    pub uploads: Mutex<Vec<String>>,
}

#[async_trait]
impl BlobStore for RecordingBlobStore {
    async fn upload_file(
        &self,
        key: &str,
        path: &Path,
        _content_type: &str,
    ) -> Result<String, CloudError> {
        assert!(path.is_file(), "uploaded artifact must exist");
        self.uploads.lock().unwrap().push(key.to_string());
        Ok(self.public_url(key))
    }

    fn public_url(&self, key: &str) -> String {
        format!("https://blobs.test/public/stems/{key}")
    }

    fn name(&self) -> &'static str {
        "recording"
    }
}

/// Memory store whose first `failures` terminal writes fail.
pub struct FlakyTerminalStore {
    inner: Arc<MemoryStatusStore>,
    failures: AtomicUsize,
    pub terminal_attempts: AtomicUsize,
}

#[async_trait]
impl StatusStore for FlakyTerminalStore {
    async fn upsert(&self, record: &JobRecord) -> Result<(), StoreError> {
        if record.status.is_terminal() {
            self.terminal_attempts.fetch_add(1, Ordering::SeqCst);
            let remaining = self.failures.load(Ordering::SeqCst);
            if remaining > 0 {
                self.failures.store(remaining - 1, Ordering::SeqCst);
                return Err(StoreError::Io(std::io::Error::other("disk full")));
            }
        }
        self.inner.upsert(record).await
    }

    async fn get(&self, job_id: &JobId) -> Result<Option<JobRecord>, StoreError> {
        self.inner.get(job_id).await
    }

    fn backend(&self) -> &'static str {
        "flaky"
    }
}

pub struct Harness {
    pub orchestrator: JobOrchestrator,
    pub store: Arc<MemoryStatusStore>,
    pub workspaces: WorkspaceManager,
    _root: tempfile::TempDir,
}

pub fn harness(
    engine: ScriptedEngine,
    duration_secs: f64,
    blob_store: Option<Arc<dyn BlobStore>>,
) -> Harness {
    harness_with(engine, duration_secs, blob_store, OrchestratorSettings::default())
}

pub fn harness_with(
    engine: ScriptedEngine,
    duration_secs: f64,
    blob_store: Option<Arc<dyn BlobStore>>,
    settings: OrchestratorSettings,
) -> Harness {
    let store = Arc::new(MemoryStatusStore::new());
    build(engine, duration_secs, blob_store, settings, store.clone(), store)
}

/// Harness whose store rejects the first `failures` terminal writes.
pub fn harness_with_flaky_store(
    engine: ScriptedEngine,
    failures: usize,
    settings: OrchestratorSettings,
) -> (Harness, Arc<FlakyTerminalStore>) {
    let store = Arc::new(MemoryStatusStore::new());
    let flaky = Arc::new(FlakyTerminalStore {
        inner: store.clone(),
        failures: AtomicUsize::new(failures),
        terminal_attempts: AtomicUsize::new(0),
    });
    let h = build(engine, 60.0, None, settings, flaky.clone(), store);
    (h, flaky)
}

fn build(
    engine: ScriptedEngine,
    duration_secs: f64,
    blob_store: Option<Arc<dyn BlobStore>>,
    settings: OrchestratorSettings,
    backend: Arc<dyn StatusStore>,
    store: Arc<MemoryStatusStore>,
) -> Harness {
    let root = tempfile::tempdir().unwrap();
    let workspaces = WorkspaceManager::new(root.path().join("temp"));
    let orchestrator = JobOrchestrator::new(
        OrchestratorDeps {
            store: backend,
            engine: Arc::new(engine),
            probe: Arc::new(FixedProbe(duration_secs)),
            blob_store,
            workspaces: workspaces.clone(),
            events: Arc::new(JobEventBus::default()),
            http: reqwest::Client::new(),
        },
        settings,
    );
    Harness {
        orchestrator,
        store,
        workspaces,
        _root: root,
    }
}

/// Poll until the job is terminal.
pub async fn wait_terminal(orchestrator: &JobOrchestrator, job_id: &JobId) -> JobRecord {
    for _ in 0..500 {
        let record = orchestrator.status(job_id).await.unwrap();
        if record.status.is_terminal() {
            return record;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("job {job_id} did not finish");
}

/// Poll until no unit or cleanup task is left.
pub async fn wait_idle(orchestrator: &JobOrchestrator) {
    for _ in 0..500 {
        if orchestrator.active_tasks() == 0 {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("orchestrator did not become idle");
}

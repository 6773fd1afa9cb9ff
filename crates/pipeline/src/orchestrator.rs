//! Job orchestrator.
//!
//! The request path only allocates a workspace, persists the `created`
//! record and spawns a background unit. The unit is the single writer of its
//! job's record from then on:
//!
//! `uploading (0.0) → validating (0.1) → processing (0.2..1.0) → completed | error`
//!
//! Every persisted record is also published on the [`JobEventBus`]. Errors
//! and panics inside a unit end the job in `error`; nothing escapes the
//! unit boundary. Units still running when the shutdown bound expires are
//! aborted and their jobs failed, so no record stays `processing`.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use audioforma_cloud::BlobStore;
use audioforma_core::artifacts::content_type_for;
use audioforma_core::error::CoreError;
use audioforma_core::job::{
    JobRecord, JobStatus, PROGRESS_PROCESSING_BASE, PROGRESS_UPLOADING, PROGRESS_VALIDATING,
};
use audioforma_core::progress::{OutputStream, ProgressParser};
use audioforma_core::types::JobId;
use audioforma_core::workspace::{Workspace, WorkspaceManager};
use audioforma_db::StatusStore;
use audioforma_events::{JobEventBus, JobUpdate};
use audioforma_separator::{SeparationEngine, SeparationOutput, SeparationRequest};
use tokio::sync::{broadcast, mpsc};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::input::{download_to, JobInput};
use crate::probe::MediaProbe;
use crate::results::local_file_url;
use crate::settings::OrchestratorSettings;

/// Cause recorded for jobs aborted by shutdown.
pub const INTERRUPTED_MESSAGE: &str = "Job interrupted by server shutdown";

const PANICKED_MESSAGE: &str = "Internal error: processing task panicked";

/// Time interrupted units get to record their failure.
const INTERRUPT_GRACE: Duration = Duration::from_secs(5);

/// Collaborators of the orchestrator.
#[derive(Clone)]
pub struct OrchestratorDeps {
    pub store: Arc<dyn StatusStore>,
    pub engine: Arc<dyn SeparationEngine>,
    pub probe: Arc<dyn MediaProbe>,
    /// When set, artifacts are uploaded and workspaces removed right away.
    pub blob_store: Option<Arc<dyn BlobStore>>,
    pub workspaces: WorkspaceManager,
    pub events: Arc<JobEventBus>,
    pub http: reqwest::Client,
}

struct Inner {
    deps: OrchestratorDeps,
    settings: OrchestratorSettings,
    tracker: TaskTracker,
    /// Cancels deferred cleanups.
    cancel: CancellationToken,
    /// Aborts running units.
    interrupt: CancellationToken,
}

/// Cheaply cloneable handle to the job orchestrator.
#[derive(Clone)]
pub struct JobOrchestrator {
    inner: Arc<Inner>,
}

impl JobOrchestrator {
    pub fn new(deps: OrchestratorDeps, settings: OrchestratorSettings) -> Self {
        Self {
            inner: Arc::new(Inner {
                deps,
                settings,
                tracker: TaskTracker::new(),
                cancel: CancellationToken::new(),
                interrupt: CancellationToken::new(),
            }),
        }
    }

    pub fn settings(&self) -> &OrchestratorSettings {
        &self.inner.settings
    }

    pub fn workspaces(&self) -> &WorkspaceManager {
        &self.inner.deps.workspaces
    }

    pub fn store_backend(&self) -> &'static str {
        self.inner.deps.store.backend()
    }

    /// Background units and pending cleanups still alive.
    pub fn active_tasks(&self) -> usize {
        self.inner.tracker.len()
    }

    /// Accept a job and start processing it in the background.
    ///
    /// Returns the `created` record as soon as it is persisted.
    pub async fn submit(&self, input: JobInput) -> Result<JobRecord, CoreError> {
        if let JobInput::Upload { data, .. } = &input {
            if data.is_empty() {
                return Err(CoreError::Validation("Uploaded file is empty".to_string()));
            }
        }

        let job_id = JobId::generate();
        let workspace = self.inner.deps.workspaces.create(&job_id).await?;
        let record = JobRecord::new(job_id.clone());

        if let Err(e) = self.inner.persist(&record).await {
            self.inner.remove_workspace(&job_id).await;
            return Err(e);
        }

        tracing::info!(job_id = %job_id, input = input.kind(), "Job accepted");
        let inner = Arc::clone(&self.inner);
        let unit_record = record.clone();
        self.inner
            .tracker
            .spawn(async move { inner.supervise(workspace, unit_record, input).await });
        Ok(record)
    }

    /// Current record of `job_id`.
    pub async fn status(&self, job_id: &JobId) -> Result<JobRecord, CoreError> {
        self.inner
            .deps
            .store
            .get(job_id)
            .await?
            .ok_or_else(|| CoreError::job_not_found(job_id))
    }

    /// Live feed of every persisted record.
    pub fn subscribe(&self) -> broadcast::Receiver<JobUpdate> {
        self.inner.deps.events.subscribe()
    }

    /// Cancel pending cleanups and wait up to `timeout` for running units.
    ///
    /// Units still running when the bound expires are aborted and their jobs
    /// end in `error`. Returns `false` in that case.
    pub async fn shutdown(&self, timeout: Duration) -> bool {
        self.inner.cancel.cancel();
        self.inner.tracker.close();
        let drained = tokio::time::timeout(timeout, self.inner.tracker.wait())
            .await
            .is_ok();
        if drained {
            tracing::info!("All jobs drained");
            return true;
        }

        tracing::warn!(
            remaining = self.inner.tracker.len(),
            "Shutdown timeout reached, interrupting running jobs"
        );
        self.inner.interrupt.cancel();
        if tokio::time::timeout(INTERRUPT_GRACE, self.inner.tracker.wait())
            .await
            .is_err()
        {
            tracing::error!(
                remaining = self.inner.tracker.len(),
                "Interrupted jobs did not record their failure in time"
            );
        }
        false
    }
}

impl Inner {
    /// Write `record` to the store and publish it.
    async fn persist(&self, record: &JobRecord) -> Result<(), CoreError> {
        self.deps.store.upsert(record).await?;
        self.deps.events.publish(record.clone());
        Ok(())
    }

    /// Persist a terminal record, retrying with backoff.
    async fn persist_terminal(&self, record: &JobRecord) -> Result<(), CoreError> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.persist(record).await {
                Ok(()) => return Ok(()),
                Err(e) => match self.settings.terminal_retry_delays.get(attempt - 1) {
                    Some(delay) => {
                        tracing::warn!(
                            job_id = %record.job_id,
                            attempt,
                            error = %e,
                            "Terminal status write failed, retrying"
                        );
                        tokio::time::sleep(*delay).await;
                    }
                    None => return Err(e),
                },
            }
        }
    }

    /// Run the unit in its own task so a panic or an interrupt is observed
    /// here. The unit has stopped before anything is written on its behalf.
    async fn supervise(self: Arc<Self>, workspace: Workspace, record: JobRecord, input: JobInput) {
        let job_id = record.job_id.clone();
        let unit = JobUnit {
            inner: Arc::clone(&self),
            workspace,
            record,
        };
        let mut handle = tokio::spawn(unit.run(input));

        let cause = tokio::select! {
            joined = &mut handle => match joined {
                Ok(()) => return,
                Err(join_err) => {
                    tracing::error!(job_id = %job_id, error = %join_err, "Job unit panicked");
                    PANICKED_MESSAGE
                }
            },
            _ = self.interrupt.cancelled() => {
                handle.abort();
                let _ = handle.await;
                tracing::warn!(job_id = %job_id, "Job unit interrupted by shutdown");
                INTERRUPTED_MESSAGE
            }
        };
        self.fail_unfinished(&job_id, cause).await;
        self.schedule_cleanup(job_id, self.settings.error_retention).await;
    }

    /// Fail `job_id` with `cause` unless its stored record is already terminal.
    async fn fail_unfinished(&self, job_id: &JobId, cause: &str) {
        let mut record = match self.deps.store.get(job_id).await {
            Ok(Some(record)) => record,
            _ => JobRecord::new(job_id.clone()),
        };
        if record.status.is_terminal() || record.fail(cause).is_err() {
            return;
        }
        if let Err(e) = self.persist_terminal(&record).await {
            tracing::error!(job_id = %job_id, error = %e, "Failed to persist job failure");
        }
    }

    /// Remove the workspace after `delay`, or now if `delay` is zero.
    async fn schedule_cleanup(self: &Arc<Self>, job_id: JobId, delay: Duration) {
        if delay.is_zero() {
            self.remove_workspace(&job_id).await;
            return;
        }
        let inner = Arc::clone(self);
        self.tracker.spawn(async move {
            tokio::select! {
                _ = inner.cancel.cancelled() => {
                    tracing::debug!(job_id = %job_id, "Deferred cleanup cancelled by shutdown");
                }
                _ = tokio::time::sleep(delay) => {
                    inner.remove_workspace(&job_id).await;
                }
            }
        });
    }

    async fn remove_workspace(&self, job_id: &JobId) {
        if let Err(e) = self.deps.workspaces.destroy(job_id).await {
            tracing::warn!(job_id = %job_id, error = %e, "Workspace cleanup failed");
        }
    }
}

// ---------------------------------------------------------------------------
// Background unit
// ---------------------------------------------------------------------------

/// One job's background processing. Sole writer of its record.
struct JobUnit {
    inner: Arc<Inner>,
    workspace: Workspace,
    record: JobRecord,
}

impl JobUnit {
    async fn run(mut self, input: JobInput) {
        let job_id = self.record.job_id.clone();
        let outcome = self.execute(input).await;
        match conclude(&mut self.record, outcome) {
            Ok(()) => {
                self.save().await;
                tracing::info!(job_id = %job_id, "Job completed");

                let delay = if self.inner.deps.blob_store.is_some() {
                    Duration::ZERO
                } else {
                    self.inner.settings.result_retention
                };
                self.inner.schedule_cleanup(job_id, delay).await;
            }
            Err(e) => {
                let message = failure_message(&e);
                tracing::warn!(
                    job_id = %job_id,
                    status = %self.record.status,
                    error = %message,
                    "Job failed"
                );
                match self.record.fail(message) {
                    Ok(()) => self.save().await,
                    Err(e) => {
                        tracing::error!(job_id = %job_id, error = %e, "Cannot record job failure");
                    }
                }
                self.inner
                    .schedule_cleanup(job_id, self.inner.settings.error_retention)
                    .await;
            }
        }
    }

    async fn execute(&mut self, input: JobInput) -> Result<BTreeMap<String, String>, CoreError> {
        self.transition(JobStatus::Uploading, PROGRESS_UPLOADING)
            .await?;
        let input_path = self.store_input(input).await?;

        self.transition(JobStatus::Validating, PROGRESS_VALIDATING)
            .await?;
        let duration = self.inner.deps.probe.duration_secs(&input_path).await?;
        self.inner.settings.duration_policy.check(duration)?;
        tracing::debug!(job_id = %self.record.job_id, duration_secs = duration, "Input accepted");

        self.transition(JobStatus::Processing, PROGRESS_PROCESSING_BASE)
            .await?;
        let output = self.separate(input_path).await?;

        self.publish_artifacts(&output).await
    }

    /// Write the uploaded bytes or download the URL into the workspace.
    async fn store_input(&self, input: JobInput) -> Result<PathBuf, CoreError> {
        let path = self.workspace.input_path(input.file_name().as_deref());
        match input {
            JobInput::Upload { data, .. } => {
                tokio::fs::write(&path, &data).await.map_err(|e| {
                    CoreError::Resource(format!("cannot write {}: {e}", path.display()))
                })?;
            }
            JobInput::Url(url) => {
                let settings = &self.inner.settings;
                let bytes = download_to(
                    &self.inner.deps.http,
                    &url,
                    &path,
                    settings.max_download_bytes,
                    settings.download_timeout,
                )
                .await?;
                tracing::debug!(job_id = %self.record.job_id, bytes, "Input downloaded");
            }
        }
        Ok(path)
    }

    /// Run the engine while feeding its output through the progress parser.
    async fn separate(&mut self, input: PathBuf) -> Result<SeparationOutput, CoreError> {
        let engine = Arc::clone(&self.inner.deps.engine);
        let request = SeparationRequest {
            job_id: self.record.job_id.clone(),
            input,
            output_dir: self.workspace.output_dir(),
        };
        let (tx, mut rx) = mpsc::unbounded_channel::<(OutputStream, String)>();
        let mut parser = ProgressParser::new(self.inner.settings.progress.clone());

        let run = engine.separate(request, tx);
        tokio::pin!(run);
        let result = loop {
            tokio::select! {
                result = &mut run => break result,
                Some((stream, chunk)) = rx.recv() => {
                    for delta in parser.push(stream, &chunk) {
                        self.report_progress(delta.overall).await;
                    }
                }
            }
        };

        while let Ok((stream, chunk)) = rx.try_recv() {
            for delta in parser.push(stream, &chunk) {
                self.report_progress(delta.overall).await;
            }
        }
        for delta in parser.finish() {
            self.report_progress(delta.overall).await;
        }

        Ok(result?)
    }

    /// Map artifacts to their public locations.
    async fn publish_artifacts(
        &self,
        output: &SeparationOutput,
    ) -> Result<BTreeMap<String, String>, CoreError> {
        let job_id = &self.record.job_id;
        let mut files = BTreeMap::new();
        match &self.inner.deps.blob_store {
            Some(blobs) => {
                for (name, path) in &output.artifacts {
                    let file_name = path
                        .file_name()
                        .map(|n| n.to_string_lossy().into_owned())
                        .unwrap_or_else(|| name.clone());
                    let key = format!("{job_id}/{file_name}");
                    let url = blobs
                        .upload_file(&key, path, content_type_for(path))
                        .await?;
                    files.insert(name.clone(), url);
                }
                tracing::info!(job_id = %job_id, provider = blobs.name(), "Artifacts uploaded");
            }
            None => {
                let root = self.inner.deps.workspaces.root();
                for (name, path) in &output.artifacts {
                    files.insert(name.clone(), local_file_url(root, path)?);
                }
            }
        }
        Ok(files)
    }

    async fn transition(&mut self, next: JobStatus, progress: f64) -> Result<(), CoreError> {
        self.record.advance(next, progress)?;
        self.inner.persist(&self.record).await
    }

    /// Persist a progress increase. Store failures here are logged only.
    async fn report_progress(&mut self, progress: f64) {
        match self.record.set_progress(progress) {
            Ok(true) => {
                if let Err(e) = self.inner.persist(&self.record).await {
                    tracing::warn!(job_id = %self.record.job_id, error = %e, "Failed to persist progress");
                }
            }
            Ok(false) => {}
            Err(e) => {
                tracing::warn!(job_id = %self.record.job_id, error = %e, "Progress update rejected");
            }
        }
    }

    /// Persist the terminal record, logging when every retry failed.
    async fn save(&self) {
        if let Err(e) = self.inner.persist_terminal(&self.record).await {
            tracing::error!(job_id = %self.record.job_id, error = %e, "Failed to persist job status");
        }
    }
}

/// Complete `record` with the produced files. A refused completion is
/// returned as the job's failure like any other error.
fn conclude(
    record: &mut JobRecord,
    outcome: Result<BTreeMap<String, String>, CoreError>,
) -> Result<(), CoreError> {
    outcome.and_then(|files| record.complete(files))
}

/// User-facing cause of a failed job.
fn failure_message(err: &CoreError) -> String {
    match err {
        CoreError::Validation(msg)
        | CoreError::Transformation(msg)
        | CoreError::Resource(msg) => msg.clone(),
        other => other.to_string(),
    }
}

//! Shared test app and fakes for API integration tests.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use audioforma_api::config::ServerConfig;
use audioforma_api::router::build_app_router;
use audioforma_api::state::AppState;
use audioforma_core::artifacts::ArtifactSet;
use audioforma_core::error::CoreError;
use audioforma_core::job::JobRecord;
use audioforma_core::types::JobId;
use audioforma_core::workspace::WorkspaceManager;
use audioforma_db::{MemoryStatusStore, StoreConfig};
use audioforma_events::JobEventBus;
use audioforma_pipeline::{JobOrchestrator, MediaProbe, OrchestratorDeps, OrchestratorSettings};
use audioforma_separator::{
    DemucsConfig, OutputSink, OutputStream, SeparationEngine, SeparationOutput, SeparationRequest,
    SeparatorError,
};
use axum::body::Body;
use axum::http::{Method, Request};
use axum::response::Response;
use axum::Router;
use http_body_util::BodyExt;
use tower::ServiceExt;

pub const BOUNDARY: &str = "audioforma-test-boundary";

/// Build a test `ServerConfig` with safe defaults.
pub fn test_config(workspace_dir: PathBuf) -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        cors_origins: vec!["http://localhost:5173".to_string()],
        request_timeout_secs: 30,
        shutdown_timeout_secs: 5,
        max_upload_bytes: 1024 * 1024,
        workspace_dir,
        sweep_interval_secs: 900,
        ffprobe_program: "ffprobe".to_string(),
        store: StoreConfig::Memory,
        demucs: DemucsConfig::default(),
        orchestrator: OrchestratorSettings::default(),
        supabase: None,
    }
}

/// Probe that reports a fixed duration.
pub struct FixedProbe(pub f64);

#[async_trait]
impl MediaProbe for FixedProbe {
    async fn duration_secs(&self, _path: &Path) -> Result<f64, CoreError> {
        Ok(self.0)
    }
}

/// Engine that prints one progress bar and writes 1000-byte stems.
#[derive(Default)]
pub struct StemWriter {
    artifacts: ArtifactSet,
}

#[async_trait]
impl SeparationEngine for StemWriter {
    async fn separate(
        &self,
        request: SeparationRequest,
        sink: OutputSink,
    ) -> Result<SeparationOutput, SeparatorError> {
        let _ = sink.send((
            OutputStream::Stdout,
            "Separating track input.mp3\n".to_string(),
        ));
        let _ = sink.send((OutputStream::Stderr, "\r 50%| 16.5/33.0".to_string()));
        let dir = request.output_dir.join("mdx_extra").join("input");
        tokio::fs::create_dir_all(&dir).await?;
        for name in self.artifacts.names() {
            let bytes: Vec<u8> = (0..1000u32).map(|i| (i % 251) as u8).collect();
            tokio::fs::write(dir.join(self.artifacts.file_name(name)), bytes).await?;
        }
        let artifacts = self.artifacts.verify(&dir)?;
        Ok(SeparationOutput {
            artifact_dir: dir,
            artifacts,
            duration_ms: 1,
        })
    }

    fn artifacts(&self) -> &ArtifactSet {
        &self.artifacts
    }

    fn model(&self) -> &str {
        "mdx_extra"
    }
}

pub struct TestApp {
    pub router: Router,
    pub orchestrator: JobOrchestrator,
    pub workspaces: WorkspaceManager,
    _root: tempfile::TempDir,
}

/// Full router with the production middleware stack, an in-memory store
/// and a fake engine reporting `duration_secs` for every input.
pub fn build_test_app(duration_secs: f64) -> TestApp {
    let root = tempfile::tempdir().unwrap();
    let config = test_config(root.path().join("temp"));
    let workspaces = WorkspaceManager::new(config.workspace_dir.clone());

    let orchestrator = JobOrchestrator::new(
        OrchestratorDeps {
            store: Arc::new(MemoryStatusStore::new()),
            engine: Arc::new(StemWriter::default()),
            probe: Arc::new(FixedProbe(duration_secs)),
            blob_store: None,
            workspaces: workspaces.clone(),
            events: Arc::new(JobEventBus::default()),
            http: reqwest::Client::new(),
        },
        config.orchestrator.clone(),
    );

    let state = AppState {
        config: Arc::new(config.clone()),
        orchestrator: orchestrator.clone(),
    };

    TestApp {
        router: build_app_router(state, &config),
        orchestrator,
        workspaces,
        _root: root,
    }
}

pub async fn get(app: &Router, uri: &str) -> Response {
    send(app, Request::get(uri).body(Body::empty()).unwrap()).await
}

pub async fn send(app: &Router, request: Request<Body>) -> Response {
    app.clone().oneshot(request).await.unwrap()
}

pub async fn body_bytes(response: Response) -> Vec<u8> {
    response
        .into_body()
        .collect()
        .await
        .unwrap()
        .to_bytes()
        .to_vec()
}

pub async fn body_json(response: Response) -> serde_json::Value {
    serde_json::from_slice(&body_bytes(response).await).unwrap()
}

/// `multipart/form-data` request with a single file field.
pub fn multipart_upload(uri: &str, field: &str, filename: &str, data: &[u8]) -> Request<Body> {
    let mut body = Vec::new();
    body.extend_from_slice(
        format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{field}\"; filename=\"{filename}\"\r\nContent-Type: audio/mpeg\r\n\r\n"
        )
        .as_bytes(),
    );
    body.extend_from_slice(data);
    body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());

    Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header(
            "content-type",
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(body))
        .unwrap()
}

/// Poll until the job is terminal.
pub async fn wait_terminal(orchestrator: &JobOrchestrator, job_id: &str) -> JobRecord {
    let job_id = JobId::parse(job_id).unwrap();
    for _ in 0..500 {
        let record = orchestrator.status(&job_id).await.unwrap();
        if record.status.is_terminal() {
            return record;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("job {job_id} did not finish");
}

/// Upload a file, wait for completion and return the final record.
pub async fn completed_job(app: &TestApp) -> JobRecord {
    let response = send(
        &app.router,
        multipart_upload("/api/v1/audio/separate", "file", "song.mp3", &[0xFF; 2048]),
    )
    .await;
    assert_eq!(response.status(), 202);
    let json = body_json(response).await;
    let record = wait_terminal(&app.orchestrator, json["job_id"].as_str().unwrap()).await;
    assert_eq!(record.status, audioforma_core::job::JobStatus::Completed);
    record
}

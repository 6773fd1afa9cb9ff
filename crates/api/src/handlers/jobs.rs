//! Handlers for job submission, status polling and status streaming.

use std::collections::BTreeMap;

use audioforma_core::error::CoreError;
use audioforma_core::job::{JobRecord, JobStatus};
use audioforma_core::job_events::event_name_for;
use audioforma_core::types::{JobId, Timestamp};
use audioforma_events::JobUpdate;
use audioforma_pipeline::{JobInput, JobOrchestrator};
use axum::extract::{Multipart, Path, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::Json;
use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;

use crate::error::{AppError, AppResult};
use crate::state::AppState;

/// Multipart field carrying the uploaded file.
const UPLOAD_FIELD: &str = "file";

// ---------------------------------------------------------------------------
// Request / response types
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
pub struct JobAccepted {
    pub job_id: JobId,
    pub status: JobStatus,
}

#[derive(Debug, Deserialize)]
pub struct SeparateFromUrl {
    pub url: String,
}

/// Public view of a job status record.
#[derive(Debug, Serialize)]
pub struct JobStatusResponse {
    pub job_id: JobId,
    pub status: JobStatus,
    pub progress: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub files: Option<BTreeMap<String, String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub updated_at: Timestamp,
}

impl From<JobRecord> for JobStatusResponse {
    fn from(record: JobRecord) -> Self {
        Self {
            job_id: record.job_id,
            status: record.status,
            progress: record.progress,
            files: record.files,
            error: record.error,
            updated_at: record.updated_at,
        }
    }
}

/// Unparseable ids cannot name a stored job, so they answer like unknown ones.
fn parse_job_id(raw: &str) -> Result<JobId, CoreError> {
    JobId::parse(raw).map_err(|_| CoreError::job_not_found(raw))
}

// ---------------------------------------------------------------------------
// Submission
// ---------------------------------------------------------------------------

/// POST /api/v1/audio/separate
///
/// Accepts a multipart upload with a `file` field and answers `202` as soon
/// as the job exists; the bytes are written and validated in the background.
pub async fn separate_upload(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> AppResult<(StatusCode, Json<JobAccepted>)> {
    let mut upload = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::BadRequest(e.body_text()))?
    {
        if field.name() != Some(UPLOAD_FIELD) {
            continue;
        }
        let filename = field.file_name().map(str::to_string);
        let data = field
            .bytes()
            .await
            .map_err(|e| AppError::BadRequest(e.body_text()))?;
        upload = Some(JobInput::Upload {
            filename,
            data: data.to_vec(),
        });
        break;
    }

    let input = upload.ok_or_else(|| {
        CoreError::Validation(format!("Missing multipart field '{UPLOAD_FIELD}'"))
    })?;
    accept(&state.orchestrator, input).await
}

/// POST /api/v1/audio/separate-from-url
///
/// The remote file is fetched by the job's background unit, so download
/// failures surface as an `error` status rather than on this request.
pub async fn separate_from_url(
    State(state): State<AppState>,
    Json(body): Json<SeparateFromUrl>,
) -> AppResult<(StatusCode, Json<JobAccepted>)> {
    let input = JobInput::from_url(&body.url)?;
    accept(&state.orchestrator, input).await
}

async fn accept(
    orchestrator: &JobOrchestrator,
    input: JobInput,
) -> AppResult<(StatusCode, Json<JobAccepted>)> {
    let record = orchestrator.submit(input).await?;
    Ok((
        StatusCode::ACCEPTED,
        Json(JobAccepted {
            job_id: record.job_id,
            status: record.status,
        }),
    ))
}

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

/// GET /api/v1/audio/status/{job_id}
pub async fn get_status(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> AppResult<Json<JobStatusResponse>> {
    let job_id = parse_job_id(&job_id)?;
    let record = state.orchestrator.status(&job_id).await?;
    Ok(Json(record.into()))
}

/// GET /api/v1/audio/status/{job_id}/stream
///
/// Server-sent events: the current record first, then every persisted
/// update of this job until it is terminal. Event names are
/// `job_progress`, `job_completed` and `job_failed`.
pub async fn stream_status(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> AppResult<Sse<impl Stream<Item = Result<Event, axum::Error>>>> {
    let job_id = parse_job_id(&job_id)?;
    // Subscribe before reading so an update between the two is not lost.
    let updates = state.orchestrator.subscribe();
    let current = state.orchestrator.status(&job_id).await?;

    let feed = StatusFeed {
        orchestrator: state.orchestrator.clone(),
        job_id,
        updates: BroadcastStream::new(updates),
        pending: Some(current),
        last_sent: None,
    };
    let stream = futures::stream::unfold(feed, |mut feed| async move {
        let record = feed.next_record().await?;
        Some((status_event(record), feed))
    });

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

fn status_event(record: JobRecord) -> Result<Event, axum::Error> {
    Event::default()
        .event(event_name_for(record.status))
        .json_data(JobStatusResponse::from(record))
}

/// Per-connection cursor over one job's updates.
struct StatusFeed {
    orchestrator: JobOrchestrator,
    job_id: JobId,
    updates: BroadcastStream<JobUpdate>,
    pending: Option<JobRecord>,
    last_sent: Option<JobRecord>,
}

impl StatusFeed {
    /// Next record to send, or `None` once the job is terminal or the bus
    /// is gone.
    async fn next_record(&mut self) -> Option<JobRecord> {
        if self
            .last_sent
            .as_ref()
            .is_some_and(|r| r.status.is_terminal())
        {
            return None;
        }
        loop {
            let candidate = match self.pending.take() {
                Some(record) => record,
                None => self.receive().await?,
            };
            if self.is_stale(&candidate) {
                continue;
            }
            self.last_sent = Some(candidate.clone());
            return Some(candidate);
        }
    }

    async fn receive(&mut self) -> Option<JobRecord> {
        loop {
            match self.updates.next().await? {
                Ok(update) if update.job_id() == &self.job_id => return Some(update.record),
                Ok(_) => continue,
                Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                    tracing::debug!(job_id = %self.job_id, skipped, "Status stream lagged, re-reading store");
                    match self.orchestrator.status(&self.job_id).await {
                        Ok(record) => return Some(record),
                        Err(e) => {
                            tracing::warn!(job_id = %self.job_id, error = %e, "Status stream re-read failed");
                            return None;
                        }
                    }
                }
            }
        }
    }

    /// Duplicates and records older than the last one sent are dropped.
    fn is_stale(&self, candidate: &JobRecord) -> bool {
        self.last_sent
            .as_ref()
            .is_some_and(|last| candidate == last || candidate.updated_at < last.updated_at)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

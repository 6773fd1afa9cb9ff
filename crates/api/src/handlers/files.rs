//! Artifact downloads with HTTP range support.
//!
//! Two addressing schemes lead to the same file serving:
//! `/files/{*path}` mirrors the locations recorded in job status, and
//! `/api/v1/jobs/{job_id}/files/{artifact}` looks the artifact up by name,
//! redirecting to the blob store when the artifact was uploaded.

use std::io::{ErrorKind, SeekFrom};
use std::path::Path as FsPath;

use audioforma_core::artifacts::content_type_for;
use audioforma_core::error::CoreError;
use audioforma_core::types::JobId;
use audioforma_pipeline::{resolve, ArtifactLocation};
use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::header::{self, HeaderMap};
use axum::http::{response, Method, StatusCode};
use axum::response::{IntoResponse, Redirect, Response};
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio_util::io::ReaderStream;

use crate::error::{AppError, AppResult};
use crate::state::AppState;

/// Artifacts never change once written.
const CACHE_CONTROL: &str = "public, max-age=604800, immutable, no-transform";

// ---------------------------------------------------------------------------
// Range parsing
// ---------------------------------------------------------------------------

/// A single requested byte range, resolved against the file size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ByteRange {
    /// Inclusive `start..=end`.
    Bounded { start: u64, end: u64 },
    Unsatisfiable,
}

/// Parse a `Range` header value for a file of `file_size` bytes.
///
/// Supports `bytes=a-b`, `bytes=a-` and `bytes=-n`. Returns `None` for
/// malformed or multi-range values, which are served as a full response.
fn parse_range_header(range: &str, file_size: u64) -> Option<ByteRange> {
    let ranges = range.trim().strip_prefix("bytes=")?.trim();
    if ranges.contains(',') {
        return None;
    }
    let (first, last) = ranges.split_once('-')?;
    let (first, last) = (first.trim(), last.trim());

    if first.is_empty() {
        let suffix: u64 = last.parse().ok()?;
        if suffix == 0 || file_size == 0 {
            return Some(ByteRange::Unsatisfiable);
        }
        return Some(ByteRange::Bounded {
            start: file_size.saturating_sub(suffix),
            end: file_size - 1,
        });
    }

    let start: u64 = first.parse().ok()?;
    let end = if last.is_empty() {
        None
    } else {
        Some(last.parse::<u64>().ok()?)
    };
    if end.is_some_and(|end| end < start) {
        return None;
    }
    if start >= file_size {
        return Some(ByteRange::Unsatisfiable);
    }
    let end = end.map_or(file_size - 1, |end| end.min(file_size - 1));
    Some(ByteRange::Bounded { start, end })
}

// ---------------------------------------------------------------------------
// Serving
// ---------------------------------------------------------------------------

fn not_found(what: &str) -> AppError {
    AppError::Core(CoreError::NotFound {
        entity: "File",
        id: what.to_string(),
    })
}

fn finish(builder: response::Builder, body: Body) -> AppResult<Response> {
    builder
        .body(body)
        .map_err(|e| AppError::InternalError(format!("Failed to build response: {e}")))
}

/// Serve `path` honouring a single `Range` and `HEAD`.
async fn serve_file(path: &FsPath, method: &Method, headers: &HeaderMap) -> AppResult<Response> {
    let metadata = match tokio::fs::metadata(path).await {
        Ok(meta) if meta.is_file() => meta,
        Ok(_) => return Err(not_found(&path.display().to_string())),
        Err(e) if e.kind() == ErrorKind::NotFound => {
            return Err(not_found(&path.display().to_string()))
        }
        Err(e) => return Err(AppError::InternalError(e.to_string())),
    };
    let file_size = metadata.len();
    let content_type = content_type_for(path);
    let head_only = *method == Method::HEAD;

    let range = headers
        .get(header::RANGE)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| parse_range_header(v, file_size));

    let builder = Response::builder()
        .header(header::CONTENT_TYPE, content_type)
        .header(header::ACCEPT_RANGES, "bytes")
        .header(header::CACHE_CONTROL, CACHE_CONTROL);

    match range {
        Some(ByteRange::Unsatisfiable) => finish(
            builder
                .status(StatusCode::RANGE_NOT_SATISFIABLE)
                .header(header::CONTENT_RANGE, format!("bytes */{file_size}")),
            Body::empty(),
        ),
        Some(ByteRange::Bounded { start, end }) => {
            let length = end - start + 1;
            let builder = builder
                .status(StatusCode::PARTIAL_CONTENT)
                .header(header::CONTENT_LENGTH, length.to_string())
                .header(
                    header::CONTENT_RANGE,
                    format!("bytes {start}-{end}/{file_size}"),
                );
            if head_only {
                return finish(builder, Body::empty());
            }

            let mut file = tokio::fs::File::open(path)
                .await
                .map_err(|e| AppError::InternalError(e.to_string()))?;
            file.seek(SeekFrom::Start(start))
                .await
                .map_err(|e| AppError::InternalError(e.to_string()))?;
            let stream = ReaderStream::new(file.take(length));
            finish(builder, Body::from_stream(stream))
        }
        None => {
            let builder = builder
                .status(StatusCode::OK)
                .header(header::CONTENT_LENGTH, file_size.to_string());
            if head_only {
                return finish(builder, Body::empty());
            }

            let file = tokio::fs::File::open(path)
                .await
                .map_err(|e| AppError::InternalError(e.to_string()))?;
            finish(builder, Body::from_stream(ReaderStream::new(file)))
        }
    }
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// GET|HEAD /files/{*path}
pub async fn serve_path(
    State(state): State<AppState>,
    Path(path): Path<String>,
    method: Method,
    headers: HeaderMap,
) -> AppResult<Response> {
    let file = state
        .orchestrator
        .workspaces()
        .resolve_file(&path)
        .ok_or_else(|| not_found(&path))?;
    serve_file(&file, &method, &headers).await
}

/// GET|HEAD /api/v1/jobs/{job_id}/files/{artifact}
///
/// `409` while the job is not completed, `307` to the public URL for
/// uploaded artifacts.
pub async fn serve_artifact(
    State(state): State<AppState>,
    Path((job_id, artifact)): Path<(String, String)>,
    method: Method,
    headers: HeaderMap,
) -> AppResult<Response> {
    let job_id = JobId::parse(&job_id).map_err(|_| CoreError::job_not_found(&job_id))?;
    let record = state.orchestrator.status(&job_id).await?;
    match resolve(&record, &artifact, state.orchestrator.workspaces())? {
        ArtifactLocation::Remote(url) => Ok(Redirect::temporary(&url).into_response()),
        ArtifactLocation::Local(file) => serve_file(&file, &method, &headers).await,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

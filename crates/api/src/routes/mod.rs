pub mod audio;
pub mod files;
pub mod health;
pub mod jobs;

use axum::Router;

use crate::state::AppState;

/// Build the `/api/v1` route tree.
///
/// ```text
/// /audio/separate                          upload a file (POST, multipart)
/// /audio/separate-from-url                 submit a URL (POST, JSON)
/// /audio/status/{job_id}                   poll status (GET)
/// /audio/status/{job_id}/stream            status updates as SSE (GET)
///
/// /jobs/{job_id}/files/{artifact}          download or redirect (GET)
/// ```
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .nest("/audio", audio::router())
        .nest("/jobs", jobs::router())
}

//! Route definitions for job submission and status.

use axum::routing::{get, post};
use axum::Router;

use crate::handlers::jobs;
use crate::state::AppState;

/// Routes mounted at `/audio`.
///
/// ```text
/// POST   /separate                    -> separate_upload
/// POST   /separate-from-url           -> separate_from_url
/// GET    /status/{job_id}             -> get_status
/// GET    /status/{job_id}/stream      -> stream_status
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/separate", post(jobs::separate_upload))
        .route("/separate-from-url", post(jobs::separate_from_url))
        .route("/status/{job_id}", get(jobs::get_status))
        .route("/status/{job_id}/stream", get(jobs::stream_status))
}

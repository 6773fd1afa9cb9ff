//! Route definitions for the `/jobs` resource.

use axum::routing::get;
use axum::Router;

use crate::handlers::files;
use crate::state::AppState;

/// Routes mounted at `/jobs`.
///
/// ```text
/// GET|HEAD  /{job_id}/files/{artifact}   -> serve_artifact
/// ```
pub fn router() -> Router<AppState> {
    Router::new().route("/{job_id}/files/{artifact}", get(files::serve_artifact))
}

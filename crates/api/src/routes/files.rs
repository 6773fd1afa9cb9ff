use axum::routing::get;
use axum::Router;

use crate::handlers::files;
use crate::state::AppState;

/// Path-addressed downloads, mounted at the root next to `/health`.
///
/// The path mirrors the `/files/...` locations recorded in job status.
pub fn router() -> Router<AppState> {
    Router::new().route("/files/{*path}", get(files::serve_path))
}

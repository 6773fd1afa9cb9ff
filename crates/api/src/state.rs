use std::sync::Arc;

use audioforma_pipeline::JobOrchestrator;

use crate::config::ServerConfig;

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// Cheaply cloneable: the orchestrator is a handle around an `Arc`.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ServerConfig>,
    /// Owns the status store, the engine and every background unit.
    pub orchestrator: JobOrchestrator,
}

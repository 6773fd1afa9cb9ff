//! Periodic removal of stale job workspaces.
//!
//! Deferred cleanups are in-memory timers, so a restart orphans the
//! workspaces they were holding. This sweep reclaims any workspace directory
//! untouched for longer than the configured age, unless its job is still
//! open in the status store.

use std::sync::Arc;
use std::time::Duration;

use audioforma_core::workspace::WorkspaceManager;
use audioforma_db::StatusStore;
use tokio_util::sync::CancellationToken;

/// Added to the result retention to get the sweep age, so a workspace
/// still inside its retention window is left alone.
pub const STALE_GRACE: Duration = Duration::from_secs(3600);

/// Age after which a workspace counts as stale.
pub fn stale_after(result_retention: Duration) -> Duration {
    result_retention + STALE_GRACE
}

/// Startup sweep. No job runs yet, so every stale workspace is an orphan.
pub async fn sweep_at_startup(workspaces: &WorkspaceManager, max_age: Duration) -> usize {
    match workspaces.sweep_older_than(max_age).await {
        Ok(removed) => {
            tracing::info!(removed, "Startup workspace sweep finished");
            removed
        }
        Err(e) => {
            tracing::error!(error = %e, "Startup workspace sweep failed");
            0
        }
    }
}

/// Run one sweep and log the outcome.
///
/// Workspaces of jobs that are not terminal in `store` are kept, however
/// old, as are those whose record cannot be read.
pub async fn sweep_once(
    workspaces: &WorkspaceManager,
    store: &dyn StatusStore,
    max_age: Duration,
) -> usize {
    let stale = match workspaces.stale_workspaces(max_age).await {
        Ok(stale) => stale,
        Err(e) => {
            tracing::error!(error = %e, "Workspace sweep failed");
            return 0;
        }
    };

    let mut removed = 0;
    for job_id in stale {
        match store.get(&job_id).await {
            Ok(Some(record)) if !record.status.is_terminal() => {
                tracing::debug!(job_id = %job_id, status = %record.status, "Workspace sweep: job still open");
                continue;
            }
            Ok(_) => {}
            Err(e) => {
                tracing::warn!(job_id = %job_id, error = %e, "Workspace sweep: cannot read job status");
                continue;
            }
        }
        match workspaces.destroy(&job_id).await {
            Ok(()) => removed += 1,
            Err(e) => tracing::warn!(job_id = %job_id, error = %e, "Failed to sweep workspace"),
        }
    }

    if removed > 0 {
        tracing::info!(removed, "Workspace sweep: removed stale workspaces");
    } else {
        tracing::debug!("Workspace sweep: nothing to remove");
    }
    removed
}

/// Run the sweep loop until `cancel` is triggered.
pub async fn run(
    workspaces: WorkspaceManager,
    store: Arc<dyn StatusStore>,
    max_age: Duration,
    every: Duration,
    cancel: CancellationToken,
) {
    tracing::info!(
        max_age_secs = max_age.as_secs(),
        interval_secs = every.as_secs(),
        "Workspace sweep started"
    );

    let mut interval = tokio::time::interval(every);
    // The startup sweep already ran; skip the immediate first tick.
    interval.tick().await;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!("Workspace sweep stopping");
                break;
            }
            _ = interval.tick() => {
                sweep_once(&workspaces, store.as_ref(), max_age).await;
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

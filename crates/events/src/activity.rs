//! Lifecycle log subscriber.
//!
//! [`ActivityLog`] listens on the bus and emits one log line per status
//! transition. Progress-only updates within a status are skipped so the log
//! stays readable during long separations.

use std::collections::HashMap;

use audioforma_core::job::{JobRecord, JobStatus};
use audioforma_core::types::JobId;
use tokio::sync::broadcast;

use crate::bus::JobUpdate;

/// Background service that logs job lifecycle transitions.
#[derive(Debug, Default)]
pub struct ActivityLog {
    last_status: HashMap<JobId, JobStatus>,
}

impl ActivityLog {
    /// Run until the bus is dropped.
    pub async fn run(mut receiver: broadcast::Receiver<JobUpdate>) {
        let mut log = Self::default();
        loop {
            match receiver.recv().await {
                Ok(update) => {
                    log.observe(&update.record);
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!(skipped = n, "Activity log lagged behind job updates");
                }
                Err(broadcast::error::RecvError::Closed) => {
                    tracing::info!("Job event bus closed, activity log shutting down");
                    break;
                }
            }
        }
    }

    /// Record `record` and return whether it was a status transition.
    pub fn observe(&mut self, record: &JobRecord) -> bool {
        let previous = self.last_status.get(&record.job_id).copied();
        if previous == Some(record.status) {
            return false;
        }

        match record.status {
            JobStatus::Completed => {
                tracing::info!(
                    job_id = %record.job_id,
                    files = record.files.as_ref().map_or(0, |f| f.len()),
                    "Job completed"
                );
            }
            JobStatus::Error => {
                tracing::warn!(
                    job_id = %record.job_id,
                    progress = record.progress,
                    error = record.error.as_deref().unwrap_or_default(),
                    "Job failed"
                );
            }
            status => {
                tracing::info!(job_id = %record.job_id, status = %status, "Job status changed");
            }
        }

        if record.status.is_terminal() {
            self.last_status.remove(&record.job_id);
        } else {
            self.last_status.insert(record.job_id.clone(), record.status);
        }
        true
    }

    pub fn tracked_jobs(&self) -> usize {
        self.last_status.len()
    }
}

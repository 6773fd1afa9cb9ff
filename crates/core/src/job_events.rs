//! Event name constants for job status updates.
//!
//! Used as SSE event names by the status stream endpoint and as the `kind`
//! of updates published on the job event bus.

use crate::job::JobStatus;

/// Non-terminal status or progress change.
pub const EVENT_JOB_PROGRESS: &str = "job_progress";

/// Job completed successfully.
pub const EVENT_JOB_COMPLETED: &str = "job_completed";

/// Job failed with an error.
pub const EVENT_JOB_FAILED: &str = "job_failed";

/// Event name for a record in the given status.
pub fn event_name_for(status: JobStatus) -> &'static str {
    match status {
        JobStatus::Completed => EVENT_JOB_COMPLETED,
        JobStatus::Error => EVENT_JOB_FAILED,
        _ => EVENT_JOB_PROGRESS,
    }
}

//! In-process job update bus backed by a `tokio::sync::broadcast` channel.
//!
//! [`JobEventBus`] is shared via `Arc` between the orchestrator (publisher)
//! and the status stream endpoint (subscribers).

use audioforma_core::job::JobRecord;
use audioforma_core::job_events::event_name_for;
use audioforma_core::types::{JobId, Timestamp};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

// ---------------------------------------------------------------------------
// JobUpdate
// ---------------------------------------------------------------------------

/// A persisted job status record as published on the bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobUpdate {
    /// `job_progress`, `job_completed` or `job_failed`.
    pub kind: String,

    /// Snapshot of the record exactly as it was written to the store.
    pub record: JobRecord,

    /// When the update was published (UTC).
    pub timestamp: Timestamp,
}

impl JobUpdate {
    pub fn new(record: JobRecord) -> Self {
        Self {
            kind: event_name_for(record.status).to_string(),
            record,
            timestamp: Utc::now(),
        }
    }

    pub fn job_id(&self) -> &JobId {
        &self.record.job_id
    }

    pub fn is_terminal(&self) -> bool {
        self.record.status.is_terminal()
    }
}

// ---------------------------------------------------------------------------
// JobEventBus
// ---------------------------------------------------------------------------

/// Default buffer capacity for the broadcast channel.
const DEFAULT_CAPACITY: usize = 1024;

/// In-process fan-out bus of [`JobUpdate`]s.
///
/// Delivery is best effort: slow receivers observe `RecvError::Lagged` and
/// should re-read the status store.
pub struct JobEventBus {
    sender: broadcast::Sender<JobUpdate>,
}

impl JobEventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish a record snapshot to all current subscribers.
    pub fn publish(&self, record: JobRecord) {
        // A SendError only means there are zero receivers.
        let _ = self.sender.send(JobUpdate::new(record));
    }

    pub fn subscribe(&self) -> broadcast::Receiver<JobUpdate> {
        self.sender.subscribe()
    }

    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for JobEventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

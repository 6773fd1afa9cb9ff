//! Job status state machine and the persisted status record.
//!
//! `created → uploading → validating → processing → {completed | error}`.
//! Transitions only move forward; `error` is reachable from every
//! non-terminal state. Once terminal the record is frozen.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::types::{JobId, Timestamp};

// ---------------------------------------------------------------------------
// Progress anchors
// ---------------------------------------------------------------------------

/// Progress reported while the input is being written.
pub const PROGRESS_UPLOADING: f64 = 0.0;

/// Progress reported while the input is being validated.
pub const PROGRESS_VALIDATING: f64 = 0.1;

/// Start of the processing sub-range.
pub const PROGRESS_PROCESSING_BASE: f64 = 0.2;

/// Width of the processing sub-range (`0.2..=1.0`).
pub const PROGRESS_PROCESSING_SCALE: f64 = 0.8;

/// Progress of a completed job.
pub const PROGRESS_COMPLETED: f64 = 1.0;

// ---------------------------------------------------------------------------
// JobStatus
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Created,
    Uploading,
    Validating,
    Processing,
    Completed,
    Error,
}

impl JobStatus {
    /// Position in the forward ordering of the state machine.
    fn rank(self) -> u8 {
        match self {
            Self::Created => 0,
            Self::Uploading => 1,
            Self::Validating => 2,
            Self::Processing => 3,
            Self::Completed | Self::Error => 4,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Error)
    }

    /// Whether `self → next` is a legal transition.
    pub fn can_transition_to(self, next: JobStatus) -> bool {
        if self.is_terminal() {
            return false;
        }
        match next {
            Self::Error => true,
            Self::Completed => self == Self::Processing,
            _ => next.rank() == self.rank() + 1,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Uploading => "uploading",
            Self::Validating => "validating",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Error => "error",
        }
    }

    /// Parse the lowercase wire name.
    pub fn from_name(name: &str) -> Result<Self, CoreError> {
        match name {
            "created" => Ok(Self::Created),
            "uploading" => Ok(Self::Uploading),
            "validating" => Ok(Self::Validating),
            "processing" => Ok(Self::Processing),
            "completed" => Ok(Self::Completed),
            "error" => Ok(Self::Error),
            other => Err(CoreError::Validation(format!(
                "Unknown job status '{other}'"
            ))),
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// JobRecord
// ---------------------------------------------------------------------------

/// Full status record of one job, always upserted as a whole.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRecord {
    pub job_id: JobId,
    pub status: JobStatus,
    /// Overall completion as a fraction in `[0, 1]`.
    pub progress: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Artifact name → location (relative URL path or public URL).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub files: Option<BTreeMap<String, String>>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<Timestamp>,
}

impl JobRecord {
    /// A freshly created job.
    pub fn new(job_id: JobId) -> Self {
        let now = chrono::Utc::now();
        Self {
            job_id,
            status: JobStatus::Created,
            progress: 0.0,
            error: None,
            files: None,
            created_at: now,
            updated_at: now,
            completed_at: None,
        }
    }

    /// Move to a non-terminal `next` status and raise progress to `progress`.
    ///
    /// Use [`complete`](Self::complete) and [`fail`](Self::fail) for the
    /// terminal states.
    pub fn advance(&mut self, next: JobStatus, progress: f64) -> Result<(), CoreError> {
        if next.is_terminal() {
            return Err(CoreError::Internal(format!(
                "terminal status '{next}' must be set through complete/fail"
            )));
        }
        self.check_transition(next)?;
        self.status = next;
        self.raise_progress(progress);
        self.touch();
        Ok(())
    }

    /// Raise progress without changing status.
    ///
    /// Returns `Ok(true)` when the stored value actually increased, so callers
    /// can skip redundant writes.
    pub fn set_progress(&mut self, progress: f64) -> Result<bool, CoreError> {
        self.ensure_open()?;
        let changed = self.raise_progress(progress);
        if changed {
            self.touch();
        }
        Ok(changed)
    }

    /// Terminal success with the artifact locations.
    pub fn complete(&mut self, files: BTreeMap<String, String>) -> Result<(), CoreError> {
        self.check_transition(JobStatus::Completed)?;
        self.status = JobStatus::Completed;
        self.progress = PROGRESS_COMPLETED;
        self.files = Some(files);
        self.finish();
        Ok(())
    }

    /// Terminal failure with a human-readable cause.
    pub fn fail(&mut self, message: impl Into<String>) -> Result<(), CoreError> {
        self.check_transition(JobStatus::Error)?;
        self.status = JobStatus::Error;
        self.error = Some(message.into());
        self.finish();
        Ok(())
    }

    fn check_transition(&self, next: JobStatus) -> Result<(), CoreError> {
        self.ensure_open()?;
        if self.status.can_transition_to(next) {
            Ok(())
        } else {
            Err(CoreError::Conflict(format!(
                "Job {} cannot move from '{}' to '{next}'",
                self.job_id, self.status
            )))
        }
    }

    fn ensure_open(&self) -> Result<(), CoreError> {
        if self.status.is_terminal() {
            Err(CoreError::Conflict(format!(
                "Job {} is already {}",
                self.job_id, self.status
            )))
        } else {
            Ok(())
        }
    }

    fn raise_progress(&mut self, progress: f64) -> bool {
        let clamped = round_progress(progress.clamp(0.0, 1.0));
        if clamped > self.progress {
            self.progress = clamped;
            true
        } else {
            false
        }
    }

    fn touch(&mut self) {
        self.updated_at = chrono::Utc::now();
    }

    fn finish(&mut self) {
        let now = chrono::Utc::now();
        self.updated_at = now;
        self.completed_at = Some(now);
    }
}

/// Round to four decimals so tiny float jitter does not produce writes.
fn round_progress(value: f64) -> f64 {
    (value * 10_000.0).round() / 10_000.0
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

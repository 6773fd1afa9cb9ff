use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// All timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;

/// Maximum accepted length of a job id.
const MAX_JOB_ID_LEN: usize = 64;

/// Process-wide sequence mixed into generated ids.
static JOB_SEQUENCE: AtomicU32 = AtomicU32::new(0);

/// Time-ordered, human-sortable job identifier.
///
/// Generated ids look like `20260118_142233_517_0042_a3f9`: wall-clock time
/// down to milliseconds, a wrapping process-wide sequence and a random salt,
/// so two submissions in the same millisecond still get distinct ids.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(String);

impl JobId {
    /// Generate a fresh id from the current time.
    pub fn generate() -> Self {
        Self::generate_at(chrono::Utc::now())
    }

    /// Generate an id stamped with `now`.
    pub fn generate_at(now: Timestamp) -> Self {
        let seq = JOB_SEQUENCE.fetch_add(1, Ordering::Relaxed) % 10_000;
        let salt: u16 = rand::random();
        Self(format!(
            "{}_{seq:04}_{salt:04x}",
            now.format("%Y%m%d_%H%M%S_%3f")
        ))
    }

    /// Parse an externally supplied id.
    ///
    /// Only `[A-Za-z0-9_-]` is accepted so the id is always safe to use as a
    /// file or directory name.
    pub fn parse(raw: &str) -> Result<Self, CoreError> {
        let valid = !raw.is_empty()
            && raw.len() <= MAX_JOB_ID_LEN
            && raw
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
        if valid {
            Ok(Self(raw.to_string()))
        } else {
            Err(CoreError::Validation(format!("Invalid job id '{raw}'")))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for JobId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

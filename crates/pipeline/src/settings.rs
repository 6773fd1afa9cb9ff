use std::time::Duration;

use audioforma_core::progress::ProgressSettings;
use audioforma_core::validation::DurationPolicy;

/// Tunables of the job orchestrator.
#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    pub duration_policy: DurationPolicy,
    pub progress: ProgressSettings,
    /// Delay before a completed job's workspace is removed when artifacts
    /// are served from local disk.
    pub result_retention: Duration,
    /// Delay before a failed job's workspace is removed.
    pub error_retention: Duration,
    /// Upper bound on bytes fetched for URL submissions.
    pub max_download_bytes: u64,
    /// Total time allowed for a URL download.
    pub download_timeout: Duration,
    /// Backoff between attempts to persist a terminal record.
    pub terminal_retry_delays: Vec<Duration>,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            duration_policy: DurationPolicy::default(),
            progress: ProgressSettings::default(),
            result_retention: Duration::from_secs(3600),
            error_retention: Duration::ZERO,
            max_download_bytes: 200 * 1024 * 1024,
            download_timeout: Duration::from_secs(300),
            terminal_retry_delays: vec![
                Duration::from_millis(250),
                Duration::from_secs(1),
                Duration::from_secs(2),
            ],
        }
    }
}

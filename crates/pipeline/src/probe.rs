//! Media inspection seam used by input validation.

use std::path::Path;

use async_trait::async_trait;
use audioforma_core::error::CoreError;
use audioforma_core::ffmpeg::{self, FfmpegError};

/// Reads the playable duration of a media file.
#[async_trait]
pub trait MediaProbe: Send + Sync {
    /// Duration in seconds. Undecodable input is a `Validation` error.
    async fn duration_secs(&self, path: &Path) -> Result<f64, CoreError>;
}

/// [`MediaProbe`] backed by the `ffprobe` binary.
#[derive(Debug, Clone)]
pub struct FfprobeProbe {
    program: String,
}

impl FfprobeProbe {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl Default for FfprobeProbe {
    fn default() -> Self {
        Self::new("ffprobe")
    }
}

#[async_trait]
impl MediaProbe for FfprobeProbe {
    async fn duration_secs(&self, path: &Path) -> Result<f64, CoreError> {
        let probe = ffmpeg::probe_media(&self.program, path)
            .await
            .map_err(probe_error)?;
        let info = ffmpeg::audio_info(&probe).ok_or_else(|| {
            CoreError::Validation("Invalid audio file: no decodable audio stream".to_string())
        })?;
        tracing::debug!(
            path = %path.display(),
            duration_secs = info.duration_secs,
            codec = %info.codec,
            "Probed input"
        );
        Ok(info.duration_secs)
    }
}

fn probe_error(err: FfmpegError) -> CoreError {
    match err {
        FfmpegError::NotFound(e) => CoreError::Resource(format!("ffprobe unavailable: {e}")),
        FfmpegError::MediaNotFound(p) => CoreError::Resource(format!("input file missing: {p}")),
        FfmpegError::ExecutionFailed { stderr, .. } => {
            CoreError::Validation(format!("Invalid audio file: {stderr}"))
        }
        FfmpegError::ParseError(_) => {
            CoreError::Validation("Invalid audio file: unreadable media metadata".to_string())
        }
    }
}

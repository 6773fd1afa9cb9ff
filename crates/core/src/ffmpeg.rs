//! FFprobe helpers for inspecting uploaded audio.
//!
//! Only probing is needed: validation reads the duration and checks that the
//! input actually decodes to an audio stream.

use std::path::Path;

use serde::Deserialize;

/// Error type for FFprobe operations.
#[derive(Debug, thiserror::Error)]
pub enum FfmpegError {
    #[error("ffprobe binary not found: {0}")]
    NotFound(std::io::Error),

    #[error("ffprobe execution failed (exit code {exit_code:?}): {stderr}")]
    ExecutionFailed {
        exit_code: Option<i32>,
        stderr: String,
    },

    #[error("failed to parse ffprobe output: {0}")]
    ParseError(String),

    #[error("media file not found: {0}")]
    MediaNotFound(String),
}

// ---------------------------------------------------------------------------
// ffprobe JSON output structures
// ---------------------------------------------------------------------------

/// Top-level ffprobe JSON output (`-print_format json -show_format -show_streams`).
#[derive(Debug, Deserialize)]
pub struct FfprobeOutput {
    #[serde(default)]
    pub streams: Vec<FfprobeStream>,
    pub format: FfprobeFormat,
}

/// A single stream from ffprobe output.
#[derive(Debug, Deserialize)]
pub struct FfprobeStream {
    pub index: i32,
    pub codec_name: Option<String>,
    pub codec_type: Option<String>,
    pub channels: Option<i32>,
    pub sample_rate: Option<String>,
    pub duration: Option<String>,
}

/// Format-level metadata from ffprobe.
#[derive(Debug, Deserialize)]
pub struct FfprobeFormat {
    pub duration: Option<String>,
    pub size: Option<String>,
    pub format_name: Option<String>,
}

/// Summary of the primary audio stream.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct AudioInfo {
    pub duration_secs: f64,
    pub codec: String,
    pub channels: i32,
    pub sample_rate: i32,
    pub format_name: Option<String>,
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Run `ffprobe` (or the binary at `program`) on a media file.
pub async fn probe_media(program: &str, path: &Path) -> Result<FfprobeOutput, FfmpegError> {
    if !path.exists() {
        return Err(FfmpegError::MediaNotFound(
            path.to_string_lossy().to_string(),
        ));
    }

    let output = tokio::process::Command::new(program)
        .args([
            "-v",
            "error",
            "-print_format",
            "json",
            "-show_format",
            "-show_streams",
        ])
        .arg(path)
        .output()
        .await
        .map_err(FfmpegError::NotFound)?;

    if !output.status.success() {
        return Err(FfmpegError::ExecutionFailed {
            exit_code: output.status.code(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    serde_json::from_str::<FfprobeOutput>(&stdout)
        .map_err(|e| FfmpegError::ParseError(format!("{e}: {stdout}")))
}

// ---------------------------------------------------------------------------
// Parsing helpers
// ---------------------------------------------------------------------------

/// Find the first audio stream in the ffprobe output.
pub fn first_audio_stream(probe: &FfprobeOutput) -> Option<&FfprobeStream> {
    probe
        .streams
        .iter()
        .find(|s| s.codec_type.as_deref() == Some("audio"))
}

/// Parse the duration in seconds, preferring the container value.
pub fn parse_duration(probe: &FfprobeOutput) -> Option<f64> {
    let from_format = probe
        .format
        .duration
        .as_deref()
        .and_then(|d| d.parse::<f64>().ok());
    from_format.or_else(|| {
        first_audio_stream(probe)
            .and_then(|s| s.duration.as_deref())
            .and_then(|d| d.parse::<f64>().ok())
    })
}

/// Summarise the primary audio stream; `None` if the file has no audio.
pub fn audio_info(probe: &FfprobeOutput) -> Option<AudioInfo> {
    let stream = first_audio_stream(probe)?;
    Some(AudioInfo {
        duration_secs: parse_duration(probe)?,
        codec: stream.codec_name.clone().unwrap_or_default(),
        channels: stream.channels.unwrap_or(0),
        sample_rate: stream
            .sample_rate
            .as_deref()
            .and_then(|r| r.parse::<i32>().ok())
            .unwrap_or(0),
        format_name: probe.format.format_name.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const MP3_PROBE: &str = r#"{
        "streams": [
            {"index": 0, "codec_name": "mp3", "codec_type": "audio",
             "sample_rate": "44100", "channels": 2, "duration": "40.020000"},
            {"index": 1, "codec_name": "mjpeg", "codec_type": "video"}
        ],
        "format": {"duration": "40.045714", "size": "641234", "format_name": "mp3"}
    }"#;

    fn parse(json: &str) -> FfprobeOutput {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn duration_prefers_format() {
        let probe = parse(MP3_PROBE);
        assert!((parse_duration(&probe).unwrap() - 40.045714).abs() < 1e-6);
    }

    #[test]
    fn duration_falls_back_to_audio_stream() {
        let probe = parse(
            r#"{"streams": [{"index": 0, "codec_type": "audio", "duration": "12.5"}],
                "format": {}}"#,
        );
        assert!((parse_duration(&probe).unwrap() - 12.5).abs() < 1e-9);
    }

    #[test]
    fn audio_info_summarises_first_audio_stream() {
        let info = audio_info(&parse(MP3_PROBE)).unwrap();
        assert_eq!(info.codec, "mp3");
        assert_eq!(info.channels, 2);
        assert_eq!(info.sample_rate, 44100);
        assert_eq!(info.format_name.as_deref(), Some("mp3"));
    }

    #[test]
    fn no_audio_stream_means_no_info() {
        let probe = parse(
            r#"{"streams": [{"index": 0, "codec_type": "video"}],
                "format": {"duration": "3.0"}}"#,
        );
        assert!(audio_info(&probe).is_none());
    }

    #[test]
    fn missing_streams_key_is_tolerated() {
        let probe = parse(r#"{"format": {"duration": "1.0"}}"#);
        assert!(probe.streams.is_empty());
        assert!(first_audio_stream(&probe).is_none());
    }

    #[tokio::test]
    async fn probe_missing_file() {
        let err = probe_media("ffprobe", Path::new("/nonexistent/input.mp3"))
            .await
            .unwrap_err();
        assert!(matches!(err, FfmpegError::MediaNotFound(_)));
    }
}

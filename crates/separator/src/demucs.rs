//! Demucs separation engine.
//!
//! Runs `<program> <args..> <input> -n <model> [--mp3] -o <output>` and
//! expects the stems under `<output>/<model>/<input stem>/`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use audioforma_core::artifacts::ArtifactSet;
use tokio::process::Command;

use crate::engine::{OutputSink, SeparationEngine, SeparationOutput, SeparationRequest};
use crate::error::SeparatorError;
use crate::subprocess::run_streaming;

/// Default model: a bag of four MDX models.
pub const DEFAULT_MODEL: &str = "mdx_extra";

#[derive(Debug, Clone)]
pub struct DemucsConfig {
    /// Executable, e.g. `python3` or a `demucs` entry point.
    pub program: String,
    /// Arguments placed before the input path, e.g. `-m demucs.separate`.
    pub args: Vec<String>,
    pub model: String,
    /// Kill the engine after this long. `None` waits indefinitely.
    pub timeout: Option<Duration>,
    pub artifacts: ArtifactSet,
}

impl Default for DemucsConfig {
    fn default() -> Self {
        Self {
            program: "python3".to_string(),
            args: vec!["-m".to_string(), "demucs.separate".to_string()],
            model: DEFAULT_MODEL.to_string(),
            timeout: None,
            artifacts: ArtifactSet::default(),
        }
    }
}

pub struct DemucsEngine {
    config: DemucsConfig,
}

impl DemucsEngine {
    pub fn new(config: DemucsConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &DemucsConfig {
        &self.config
    }

    fn command(&self, input: &Path, output_dir: &Path) -> Command {
        let mut cmd = Command::new(&self.config.program);
        cmd.args(&self.config.args)
            .arg(input)
            .arg("-n")
            .arg(&self.config.model);
        if self.config.artifacts.extension() == "mp3" {
            cmd.arg("--mp3");
        }
        cmd.arg("-o").arg(output_dir);
        // Stage markers go to stdout, which Python block-buffers on a pipe.
        cmd.env("PYTHONUNBUFFERED", "1");
        cmd
    }

    /// `<output>/<model>/<input stem>`.
    fn artifact_dir(&self, request: &SeparationRequest) -> PathBuf {
        let stem = request
            .input
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "input".to_string());
        request.output_dir.join(&self.config.model).join(stem)
    }
}

#[async_trait]
impl SeparationEngine for DemucsEngine {
    async fn separate(
        &self,
        request: SeparationRequest,
        sink: OutputSink,
    ) -> Result<SeparationOutput, SeparatorError> {
        tokio::fs::create_dir_all(&request.output_dir).await?;

        let mut cmd = self.command(&request.input, &request.output_dir);
        tracing::info!(
            job_id = %request.job_id,
            model = %self.config.model,
            input = %request.input.display(),
            "Starting separation"
        );

        let outcome = run_streaming(&mut cmd, &request.job_id, sink, self.config.timeout).await?;
        if !outcome.success {
            return Err(SeparatorError::Failed {
                exit_code: outcome.exit_code,
                tail: outcome.tail,
            });
        }

        let model_dir = request.output_dir.join(&self.config.model);
        if !tokio::fs::metadata(&model_dir)
            .await
            .map(|m| m.is_dir())
            .unwrap_or(false)
        {
            return Err(SeparatorError::MissingOutputDir(
                model_dir.display().to_string(),
            ));
        }

        let artifact_dir = self.artifact_dir(&request);
        let artifacts = {
            let set = self.config.artifacts.clone();
            let dir = artifact_dir.clone();
            tokio::task::spawn_blocking(move || set.verify(&dir))
                .await
                .map_err(|e| SeparatorError::Io(std::io::Error::other(e)))??
        };

        tracing::info!(
            job_id = %request.job_id,
            duration_ms = outcome.duration_ms,
            artifacts = artifacts.len(),
            "Separation finished"
        );
        Ok(SeparationOutput {
            artifact_dir,
            artifacts,
            duration_ms: outcome.duration_ms,
        })
    }

    fn artifacts(&self) -> &ArtifactSet {
        &self.config.artifacts
    }

    fn model(&self) -> &str {
        &self.config.model
    }
}

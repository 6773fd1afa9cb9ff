use std::collections::BTreeMap;
use std::path::PathBuf;

use async_trait::async_trait;
use audioforma_core::artifacts::ArtifactSet;
use audioforma_core::progress::OutputStream;
use audioforma_core::types::JobId;
use tokio::sync::mpsc;

use crate::error::SeparatorError;

/// Receives raw engine output chunks for one invocation, tagged with the
/// stream they were read from.
///
/// Chunks are forwarded as read and may split lines; the receiving side does
/// the line buffering. A dropped receiver is not an error for the engine.
pub type OutputSink = mpsc::UnboundedSender<(OutputStream, String)>;

/// One separation run.
#[derive(Debug, Clone)]
pub struct SeparationRequest {
    pub job_id: JobId,
    /// Validated input file inside the job workspace.
    pub input: PathBuf,
    /// Directory the engine writes its output tree into.
    pub output_dir: PathBuf,
}

/// A verified, complete artifact set.
#[derive(Debug, Clone)]
pub struct SeparationOutput {
    /// Directory holding the artifacts, e.g. `<output>/mdx_extra/input`.
    pub artifact_dir: PathBuf,
    /// Artifact name → absolute path. Always the full set.
    pub artifacts: BTreeMap<String, PathBuf>,
    pub duration_ms: u64,
}

/// An external separation model.
///
/// Implementations must either return the complete artifact set or an error;
/// partial output is never a success.
#[async_trait]
pub trait SeparationEngine: Send + Sync {
    async fn separate(
        &self,
        request: SeparationRequest,
        sink: OutputSink,
    ) -> Result<SeparationOutput, SeparatorError>;

    /// Artifacts a successful run produces.
    fn artifacts(&self) -> &ArtifactSet;

    /// Model name for logs and output layout.
    fn model(&self) -> &str;
}

//! Result access: from a completed record to servable artifact locations.
//!
//! Locally served artifacts are recorded as `/files/<job_id>/<relative
//! path>`; with a blob store they are absolute public URLs.

use std::path::{Path, PathBuf};

use audioforma_core::error::CoreError;
use audioforma_core::job::{JobRecord, JobStatus};
use audioforma_core::workspace::WorkspaceManager;

/// URL prefix of the path-addressed file route.
pub const FILES_URL_PREFIX: &str = "/files/";

/// Where an artifact can be fetched from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArtifactLocation {
    /// File on local disk, inside the workspace root.
    Local(PathBuf),
    /// Public URL in the blob store.
    Remote(String),
}

/// Locate `artifact` of a completed job.
pub fn resolve(
    record: &JobRecord,
    artifact: &str,
    workspaces: &WorkspaceManager,
) -> Result<ArtifactLocation, CoreError> {
    if record.status != JobStatus::Completed {
        return Err(CoreError::Conflict(format!(
            "Job {} is {}, artifacts are only available once completed",
            record.job_id, record.status
        )));
    }
    let location = record
        .files
        .as_ref()
        .and_then(|files| files.get(artifact))
        .ok_or_else(|| CoreError::NotFound {
            entity: "Artifact",
            id: artifact.to_string(),
        })?;

    if location.starts_with("http://") || location.starts_with("https://") {
        return Ok(ArtifactLocation::Remote(location.clone()));
    }
    location
        .strip_prefix(FILES_URL_PREFIX)
        .and_then(|relative| workspaces.resolve_file(relative))
        .map(ArtifactLocation::Local)
        .ok_or_else(|| CoreError::Internal(format!("unrecognised artifact location '{location}'")))
}

/// `/files/...` URL of a file inside the workspace root.
pub fn local_file_url(root: &Path, path: &Path) -> Result<String, CoreError> {
    let relative = path.strip_prefix(root).map_err(|_| {
        CoreError::Internal(format!(
            "{} is outside the workspace root {}",
            path.display(),
            root.display()
        ))
    })?;
    let segments: Vec<String> = relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    Ok(format!("{FILES_URL_PREFIX}{}", segments.join("/")))
}

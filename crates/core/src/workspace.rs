//! Per-job workspace directories.
//!
//! Every job owns exactly one directory `<root>/<job_id>` holding the raw
//! input and the engine's output tree. The manager only deals in paths; it
//! keeps no other state.

use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};
use std::time::{Duration, SystemTime};

use crate::error::CoreError;
use crate::types::JobId;

/// Base name of the stored input file.
const INPUT_FILE_STEM: &str = "input";

/// Extension used when the uploaded name has none we accept.
const DEFAULT_INPUT_EXTENSION: &str = "mp3";

/// Engine output directory inside a workspace.
const OUTPUT_DIR_NAME: &str = "output";

/// Allocates and destroys job workspaces under one root directory.
#[derive(Debug, Clone)]
pub struct WorkspaceManager {
    root: PathBuf,
}

/// Paths of a single job's workspace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Workspace {
    job_id: JobId,
    dir: PathBuf,
}

impl WorkspaceManager {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory that belongs (or would belong) to `job_id`.
    pub fn path_for(&self, job_id: &JobId) -> PathBuf {
        self.root.join(job_id.as_str())
    }

    /// Create a fresh workspace for `job_id`.
    ///
    /// Fails with [`CoreError::Resource`] if the job already has one.
    pub async fn create(&self, job_id: &JobId) -> Result<Workspace, CoreError> {
        tokio::fs::create_dir_all(&self.root).await.map_err(|e| {
            CoreError::Resource(format!(
                "cannot create workspace root {}: {e}",
                self.root.display()
            ))
        })?;

        let dir = self.path_for(job_id);
        match tokio::fs::create_dir(&dir).await {
            Ok(()) => {
                tracing::debug!(job_id = %job_id, dir = %dir.display(), "Workspace created");
                Ok(Workspace {
                    job_id: job_id.clone(),
                    dir,
                })
            }
            Err(e) if e.kind() == ErrorKind::AlreadyExists => Err(CoreError::Resource(format!(
                "workspace for job {job_id} already exists"
            ))),
            Err(e) => Err(CoreError::Resource(format!(
                "cannot create workspace {}: {e}",
                dir.display()
            ))),
        }
    }

    /// Recursively remove the workspace of `job_id`. Idempotent.
    pub async fn destroy(&self, job_id: &JobId) -> Result<(), CoreError> {
        let dir = self.path_for(job_id);
        match tokio::fs::remove_dir_all(&dir).await {
            Ok(()) => {
                tracing::debug!(job_id = %job_id, "Workspace destroyed");
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(CoreError::Resource(format!(
                "cannot remove workspace {}: {e}",
                dir.display()
            ))),
        }
    }

    pub async fn exists(&self, job_id: &JobId) -> bool {
        tokio::fs::metadata(self.path_for(job_id))
            .await
            .map(|m| m.is_dir())
            .unwrap_or(false)
    }

    /// Resolve a path relative to the workspace root.
    ///
    /// Rejects absolute paths and any `..`/root/prefix component, so the
    /// result can never escape the root.
    pub fn resolve_file(&self, relative: &str) -> Option<PathBuf> {
        let rel = Path::new(relative);
        if relative.is_empty() || rel.is_absolute() {
            return None;
        }
        let safe = rel
            .components()
            .all(|c| matches!(c, Component::Normal(_) | Component::CurDir));
        safe.then(|| self.root.join(rel))
    }

    /// Jobs whose workspace directory was last modified more than `max_age`
    /// ago. Entries that are not job workspaces are ignored.
    ///
    /// The directory mtime stops moving once the engine writes deeper in the
    /// tree, so callers must not treat this as proof the job is finished.
    pub async fn stale_workspaces(&self, max_age: Duration) -> Result<Vec<JobId>, CoreError> {
        let mut entries = match tokio::fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(CoreError::Resource(e.to_string())),
        };

        let now = SystemTime::now();
        let mut stale = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| CoreError::Resource(e.to_string()))?
        {
            let Ok(meta) = entry.metadata().await else {
                continue;
            };
            if !meta.is_dir() {
                continue;
            }
            let Some(job_id) = entry.file_name().to_str().and_then(|n| JobId::parse(n).ok()) else {
                continue;
            };
            let age = meta
                .modified()
                .ok()
                .and_then(|m| now.duration_since(m).ok())
                .unwrap_or_default();
            if age >= max_age {
                stale.push(job_id);
            }
        }
        Ok(stale)
    }

    /// Remove every workspace older than `max_age`.
    ///
    /// Returns the number of directories removed. Only safe while no job is
    /// running, e.g. at startup.
    pub async fn sweep_older_than(&self, max_age: Duration) -> Result<usize, CoreError> {
        let mut removed = 0;
        for job_id in self.stale_workspaces(max_age).await? {
            match self.destroy(&job_id).await {
                Ok(()) => removed += 1,
                Err(e) => tracing::warn!(job_id = %job_id, error = %e, "Failed to sweep workspace"),
            }
        }
        Ok(removed)
    }
}

impl Workspace {
    pub fn job_id(&self) -> &JobId {
        &self.job_id
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Where the raw input is stored, keeping a recognised audio extension
    /// from `original_name`.
    pub fn input_path(&self, original_name: Option<&str>) -> PathBuf {
        let ext = original_name
            .and_then(|n| Path::new(n).extension())
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .filter(|e| is_audio_extension(e))
            .unwrap_or_else(|| DEFAULT_INPUT_EXTENSION.to_string());
        self.dir.join(format!("{INPUT_FILE_STEM}.{ext}"))
    }

    /// Root of the engine output tree.
    pub fn output_dir(&self) -> PathBuf {
        self.dir.join(OUTPUT_DIR_NAME)
    }
}

fn is_audio_extension(ext: &str) -> bool {
    matches!(ext, "mp3" | "wav" | "flac" | "ogg" | "m4a" | "aac" | "aiff" | "opus")
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

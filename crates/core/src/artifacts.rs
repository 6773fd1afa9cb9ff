//! The fixed set of named outputs a successful separation must produce.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Default stem names produced by four-source separation models.
pub const DEFAULT_STEMS: &[&str] = &["vocals", "drums", "bass", "other"];

/// Default artifact file extension (engine runs with `--mp3`).
pub const DEFAULT_EXTENSION: &str = "mp3";

/// Why an artifact set is incomplete.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ArtifactError {
    #[error("missing {name} file. Found files: {found:?}")]
    Missing { name: String, found: Vec<String> },

    #[error("{name} file is empty: {path}")]
    Empty { name: String, path: String },
}

/// Named artifacts expected inside one output directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactSet {
    names: Vec<String>,
    extension: String,
}

impl ArtifactSet {
    pub fn new(names: impl IntoIterator<Item = impl Into<String>>, extension: impl Into<String>) -> Self {
        Self {
            names: names.into_iter().map(Into::into).collect(),
            extension: extension.into(),
        }
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn extension(&self) -> &str {
        &self.extension
    }

    pub fn contains(&self, name: &str) -> bool {
        self.names.iter().any(|n| n == name)
    }

    /// File name of one artifact, e.g. `vocals.mp3`.
    pub fn file_name(&self, name: &str) -> String {
        format!("{name}.{}", self.extension)
    }

    /// Check that every artifact exists in `dir` and is non-empty.
    ///
    /// Returns artifact name → path. Partial sets are an error, never a
    /// partial success.
    pub fn verify(&self, dir: &Path) -> Result<BTreeMap<String, PathBuf>, ArtifactError> {
        let mut located = BTreeMap::new();
        for name in &self.names {
            let path = dir.join(self.file_name(name));
            match std::fs::metadata(&path) {
                Ok(meta) if meta.is_file() && meta.len() > 0 => {
                    located.insert(name.clone(), path);
                }
                Ok(meta) if meta.is_file() => {
                    return Err(ArtifactError::Empty {
                        name: name.clone(),
                        path: path.to_string_lossy().into_owned(),
                    });
                }
                _ => {
                    return Err(ArtifactError::Missing {
                        name: name.clone(),
                        found: list_file_names(dir),
                    });
                }
            }
        }
        Ok(located)
    }
}

impl Default for ArtifactSet {
    fn default() -> Self {
        Self::new(DEFAULT_STEMS.iter().copied(), DEFAULT_EXTENSION)
    }
}

/// MIME type served for an artifact or input file, by extension.
pub fn content_type_for(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);
    match ext.as_deref() {
        Some("mp3") => "audio/mpeg",
        Some("wav") => "audio/wav",
        Some("flac") => "audio/flac",
        Some("ogg") | Some("opus") => "audio/ogg",
        Some("m4a") | Some("aac") => "audio/mp4",
        Some("aiff") => "audio/aiff",
        Some("json") => "application/json",
        _ => "application/octet-stream",
    }
}

/// Sorted file names directly inside `dir`, for diagnostics.
fn list_file_names(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .map(|entries| {
            entries
                .filter_map(Result::ok)
                .map(|e| e.file_name().to_string_lossy().into_owned())
                .collect()
        })
        .unwrap_or_default();
    names.sort();
    names
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

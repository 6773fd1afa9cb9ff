use audioforma_core::artifacts::ArtifactError;
use audioforma_core::error::CoreError;

/// Why a separation run did not produce a usable artifact set.
#[derive(Debug, thiserror::Error)]
pub enum SeparatorError {
    #[error("Failed to start {program}: {source}")]
    Spawn {
        program: String,
        source: std::io::Error,
    },

    #[error("Processing timed out after {elapsed_ms} ms")]
    Timeout { elapsed_ms: u64 },

    #[error("Separation exited with {}: {tail}", describe_exit(.exit_code))]
    Failed { exit_code: Option<i32>, tail: String },

    #[error("Processing failed - no output directory {0}")]
    MissingOutputDir(String),

    #[error("Processing failed - missing {name} file. Found files: {found:?}")]
    MissingArtifact { name: String, found: Vec<String> },

    #[error("Processing failed - {name} file is empty: {path}")]
    EmptyArtifact { name: String, path: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

fn describe_exit(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("code {code}"),
        None => "signal".to_string(),
    }
}

impl From<ArtifactError> for SeparatorError {
    fn from(err: ArtifactError) -> Self {
        match err {
            ArtifactError::Missing { name, found } => Self::MissingArtifact { name, found },
            ArtifactError::Empty { name, path } => Self::EmptyArtifact { name, path },
        }
    }
}

impl From<SeparatorError> for CoreError {
    fn from(err: SeparatorError) -> Self {
        CoreError::Transformation(err.to_string())
    }
}

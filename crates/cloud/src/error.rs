use audioforma_core::error::CoreError;

/// Errors from blob storage operations.
#[derive(Debug, thiserror::Error)]
pub enum CloudError {
    /// The underlying HTTP request failed (network, DNS, timeout, etc.).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The storage API answered with a non-2xx status code.
    #[error("Storage returned HTTP {status}: {body}")]
    HttpStatus { status: u16, body: String },

    #[error("Cannot read {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("Invalid storage configuration: {0}")]
    Config(String),
}

impl From<CloudError> for CoreError {
    fn from(err: CloudError) -> Self {
        CoreError::Resource(err.to_string())
    }
}

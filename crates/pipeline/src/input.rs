//! Job inputs and how they are materialised inside a workspace.

use std::path::Path;
use std::time::Duration;

use audioforma_core::error::CoreError;
use futures::StreamExt;
use reqwest::Url;
use tokio::io::AsyncWriteExt;

/// What a client submitted.
#[derive(Debug, Clone)]
pub enum JobInput {
    /// Uploaded bytes and the client-side file name, if any.
    Upload {
        filename: Option<String>,
        data: Vec<u8>,
    },
    /// A remote file fetched by the background unit.
    Url(Url),
}

impl JobInput {
    /// Build a URL input, accepting only absolute `http`/`https` URLs.
    pub fn from_url(raw: &str) -> Result<Self, CoreError> {
        let url = Url::parse(raw.trim())
            .map_err(|e| CoreError::Validation(format!("Invalid URL '{raw}': {e}")))?;
        match url.scheme() {
            "http" | "https" if url.host_str().is_some() => Ok(Self::Url(url)),
            scheme => Err(CoreError::Validation(format!(
                "Unsupported URL scheme '{scheme}', expected http or https"
            ))),
        }
    }

    /// Name used to pick the stored input's extension.
    pub fn file_name(&self) -> Option<String> {
        match self {
            Self::Upload { filename, .. } => filename.clone(),
            Self::Url(url) => url
                .path_segments()
                .and_then(|mut segments| segments.next_back())
                .filter(|s| !s.is_empty())
                .map(str::to_string),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Upload { .. } => "upload",
            Self::Url(_) => "url",
        }
    }
}

/// Stream `url` into `dest`, refusing bodies over `max_bytes`.
pub async fn download_to(
    client: &reqwest::Client,
    url: &Url,
    dest: &Path,
    max_bytes: u64,
    timeout: Duration,
) -> Result<u64, CoreError> {
    let response = client
        .get(url.clone())
        .timeout(timeout)
        .send()
        .await
        .map_err(|e| CoreError::Validation(format!("Error downloading file: {e}")))?;

    let status = response.status();
    if !status.is_success() {
        return Err(CoreError::Validation(format!(
            "Could not download file from URL (HTTP {})",
            status.as_u16()
        )));
    }
    if response.content_length().is_some_and(|len| len > max_bytes) {
        return Err(too_large(max_bytes));
    }

    let mut file = tokio::fs::File::create(dest)
        .await
        .map_err(|e| CoreError::Resource(format!("cannot create {}: {e}", dest.display())))?;
    let mut written: u64 = 0;
    let mut body = response.bytes_stream();
    while let Some(chunk) = body.next().await {
        let chunk =
            chunk.map_err(|e| CoreError::Validation(format!("Error downloading file: {e}")))?;
        written += chunk.len() as u64;
        if written > max_bytes {
            return Err(too_large(max_bytes));
        }
        file.write_all(&chunk)
            .await
            .map_err(|e| CoreError::Resource(e.to_string()))?;
    }
    file.flush()
        .await
        .map_err(|e| CoreError::Resource(e.to_string()))?;

    if written == 0 {
        return Err(CoreError::Validation(
            "Downloaded file is empty".to_string(),
        ));
    }
    Ok(written)
}

fn too_large(max_bytes: u64) -> CoreError {
    CoreError::Validation(format!("File exceeds the {max_bytes} byte limit"))
}

//! Supabase Storage provider.
//!
//! Objects are uploaded with `POST {url}/storage/v1/object/{bucket}/{key}`
//! (service-role bearer token, `x-upsert: true`) and served from the public
//! bucket path `{url}/storage/v1/object/public/{bucket}/{key}`.
//! Failed uploads are retried with exponential backoff (1 s, 2 s, 4 s).

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::io::ReaderStream;

use crate::error::CloudError;
use crate::provider::BlobStore;

/// Default retry delays between upload attempts.
const DEFAULT_RETRY_DELAYS: [Duration; 3] = [
    Duration::from_secs(1),
    Duration::from_secs(2),
    Duration::from_secs(4),
];

/// HTTP request timeout for a single upload attempt.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

/// Connection settings for a Supabase project.
#[derive(Debug, Clone)]
pub struct SupabaseConfig {
    /// Project URL, e.g. `https://abc.supabase.co`.
    pub url: String,
    pub service_role_key: String,
    pub bucket: String,
}

#[derive(Debug)]
pub struct SupabaseStorage {
    client: reqwest::Client,
    base_url: String,
    service_role_key: String,
    bucket: String,
    retry_delays: Vec<Duration>,
}

impl SupabaseStorage {
    pub fn new(config: SupabaseConfig) -> Result<Self, CloudError> {
        let base_url = config.url.trim_end_matches('/').to_string();
        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            return Err(CloudError::Config(format!(
                "Supabase URL must be http(s): {base_url}"
            )));
        }
        if config.bucket.is_empty() || config.bucket.contains('/') {
            return Err(CloudError::Config(format!(
                "Invalid bucket name '{}'",
                config.bucket
            )));
        }

        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;

        Ok(Self {
            client,
            base_url,
            service_role_key: config.service_role_key,
            bucket: config.bucket,
            retry_delays: DEFAULT_RETRY_DELAYS.to_vec(),
        })
    }

    /// Override the backoff schedule.
    pub fn with_retry_delays(mut self, delays: Vec<Duration>) -> Self {
        self.retry_delays = delays;
        self
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    fn object_url(&self, key: &str) -> String {
        format!(
            "{}/storage/v1/object/{}/{}",
            self.base_url,
            self.bucket,
            key.trim_start_matches('/')
        )
    }

    /// One upload attempt, streaming the file from disk.
    async fn try_upload(&self, key: &str, path: &Path, content_type: &str) -> Result<(), CloudError> {
        let io_err = |source| CloudError::Io {
            path: path.display().to_string(),
            source,
        };
        let file = tokio::fs::File::open(path).await.map_err(io_err)?;
        let len = file.metadata().await.map_err(io_err)?.len();

        let response = self
            .client
            .post(self.object_url(key))
            .bearer_auth(&self.service_role_key)
            .header("apikey", &self.service_role_key)
            .header("x-upsert", "true")
            .header(reqwest::header::CONTENT_TYPE, content_type)
            .header(reqwest::header::CONTENT_LENGTH, len)
            .body(reqwest::Body::wrap_stream(ReaderStream::new(file)))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CloudError::HttpStatus {
                status: status.as_u16(),
                body,
            });
        }
        Ok(())
    }
}

#[async_trait]
impl BlobStore for SupabaseStorage {
    async fn upload_file(
        &self,
        key: &str,
        path: &Path,
        content_type: &str,
    ) -> Result<String, CloudError> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.try_upload(key, path, content_type).await {
                Ok(()) => {
                    tracing::debug!(key, bucket = %self.bucket, "Uploaded object");
                    return Ok(self.public_url(key));
                }
                // Missing local files will not appear on retry.
                Err(e @ CloudError::Io { .. }) => return Err(e),
                Err(e) => match self.retry_delays.get(attempt - 1) {
                    Some(delay) => {
                        tracing::warn!(attempt, key, error = %e, "Upload attempt failed, retrying");
                        tokio::time::sleep(*delay).await;
                    }
                    None => {
                        tracing::error!(key, error = %e, "Upload failed after all retries");
                        return Err(e);
                    }
                },
            }
        }
    }

    fn public_url(&self, key: &str) -> String {
        format!(
            "{}/storage/v1/object/public/{}/{}",
            self.base_url,
            self.bucket,
            key.trim_start_matches('/')
        )
    }

    fn name(&self) -> &'static str {
        "supabase"
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    fn storage(url: &str) -> SupabaseStorage {
        SupabaseStorage::new(SupabaseConfig {
            url: url.to_string(),
            service_role_key: "service-key".to_string(),
            bucket: "stems".to_string(),
        })
        .unwrap()
        .with_retry_delays(vec![Duration::from_millis(10)])
    }

    fn artifact() -> tempfile::NamedTempFile {
        let file = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(file.path(), b"ID3 stem bytes").unwrap();
        file
    }

    #[test]
    fn public_url_format() {
        let s = storage("https://proj.supabase.co/");
        assert_eq!(
            s.public_url("job_1/vocals.mp3"),
            "https://proj.supabase.co/storage/v1/object/public/stems/job_1/vocals.mp3"
        );
    }

    #[test]
    fn rejects_invalid_config() {
        let bad_url = SupabaseStorage::new(SupabaseConfig {
            url: "proj.supabase.co".into(),
            service_role_key: "k".into(),
            bucket: "b".into(),
        });
        assert_matches!(bad_url, Err(CloudError::Config(_)));

        let bad_bucket = SupabaseStorage::new(SupabaseConfig {
            url: "https://proj.supabase.co".into(),
            service_role_key: "k".into(),
            bucket: "a/b".into(),
        });
        assert_matches!(bad_bucket, Err(CloudError::Config(_)));
    }

    #[tokio::test]
    async fn upload_posts_object_and_returns_public_url() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/storage/v1/object/stems/job_1/vocals.mp3"))
            .and(header("authorization", "Bearer service-key"))
            .and(header("x-upsert", "true"))
            .and(header("content-type", "audio/mpeg"))
            .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"Key":"stems/job_1/vocals.mp3"}"#))
            .expect(1)
            .mount(&server)
            .await;

        let file = artifact();
        let url = storage(&server.uri())
            .upload_file("job_1/vocals.mp3", file.path(), "audio/mpeg")
            .await
            .unwrap();
        assert_eq!(
            url,
            format!("{}/storage/v1/object/public/stems/job_1/vocals.mp3", server.uri())
        );
    }

    #[tokio::test]
    async fn upload_retries_then_reports_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503).set_body_string("unavailable"))
            .expect(2)
            .mount(&server)
            .await;

        let file = artifact();
        let err = storage(&server.uri())
            .upload_file("job_1/drums.mp3", file.path(), "audio/mpeg")
            .await
            .unwrap_err();
        assert_matches!(err, CloudError::HttpStatus { status: 503, body } if body == "unavailable");
    }

    #[tokio::test]
    async fn missing_local_file_is_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let err = storage(&server.uri())
            .upload_file("job_1/bass.mp3", Path::new("/nonexistent/bass.mp3"), "audio/mpeg")
            .await
            .unwrap_err();
        assert_matches!(err, CloudError::Io { .. });
    }
}

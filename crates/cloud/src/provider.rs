use std::path::Path;

use async_trait::async_trait;

use crate::error::CloudError;

/// An object store that hands out publicly readable URLs.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Upload the file at `path` under `key` and return its public URL.
    ///
    /// Existing objects under the same key are replaced.
    async fn upload_file(
        &self,
        key: &str,
        path: &Path,
        content_type: &str,
    ) -> Result<String, CloudError>;

    /// Public URL of `key`, whether or not it has been uploaded yet.
    fn public_url(&self, key: &str) -> String;

    /// Short provider name for logs.
    fn name(&self) -> &'static str;
}

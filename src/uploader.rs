//! Single-photo evidence upload.

use std::sync::Arc;

use crate::error::UploadError;
use crate::models::PhotoAsset;
use crate::traits::UploadSink;

#[derive(Clone)]
pub struct EvidenceUploader {
    sink: Arc<dyn UploadSink>,
}

impl EvidenceUploader {
    pub fn new(sink: Arc<dyn UploadSink>) -> Self {
        Self { sink }
    }

    /// Uploads the photo's file and returns the server reference.
    pub async fn upload(&self, photo: &PhotoAsset) -> Result<String, UploadError> {
        let path = &photo.local_path;
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|source| UploadError::LocalFile {
                path: path.clone(),
                source,
            })?;
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "photo.jpg".to_string());

        let url = self.sink.upload_file(bytes, &filename).await?;
        let url = url.trim();
        if url.is_empty() {
            return Err(UploadError::Protocol("empty url in response".to_string()));
        }
        tracing::debug!(file = %filename, url, "photo uploaded");
        Ok(url.to_string())
    }
}

//! Media upload collaborator
//!
//! Avatars and cover images arrive base64-encoded in the JSON body. They are
//! staged to a local file, forwarded to the upload service, and the staged
//! file is removed whatever the outcome. Deleting remote media is best
//! effort: failures are logged and never surface to the caller.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::types::{AppError, Result};

/// A file carried inline in a request body
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaPayload {
    pub file_name: String,
    pub content_base64: String,
}

/// Where the upload service put a file
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UploadedMedia {
    pub url: String,
    pub public_id: String,
}

/// Object storage reached by upload-and-get-URL calls
#[async_trait::async_trait]
pub trait MediaUploader: Send + Sync {
    async fn upload(&self, local_path: &Path) -> Result<UploadedMedia>;

    async fn delete(&self, public_id: &str) -> Result<()>;
}

/// Upload service over HTTP: `POST {base}/upload`, `DELETE {base}/upload/{publicId}`
pub struct HttpMediaUploader {
    http_client: reqwest::Client,
    base_url: String,
}

impl HttpMediaUploader {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::Config(format!("Failed to create HTTP client: {}", e)))?;

        info!(storage_url = %base_url, "Media uploader configured");
        Ok(Self {
            http_client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait::async_trait]
impl MediaUploader for HttpMediaUploader {
    async fn upload(&self, local_path: &Path) -> Result<UploadedMedia> {
        let bytes = tokio::fs::read(local_path).await?;
        let file_name = local_path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("upload");

        let response = self
            .http_client
            .post(format!("{}/upload", self.base_url))
            .header("Content-Type", "application/octet-stream")
            .header("X-File-Name", file_name)
            .body(bytes)
            .send()
            .await?
            .error_for_status()?;

        let uploaded: UploadedMedia = response.json().await?;
        debug!(public_id = %uploaded.public_id, "Media uploaded");
        Ok(uploaded)
    }

    async fn delete(&self, public_id: &str) -> Result<()> {
        self.http_client
            .delete(format!(
                "{}/upload/{}",
                self.base_url,
                urlencoding::encode(public_id)
            ))
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}

/// Stand-in used when no upload service is configured (dev mode only)
pub struct UnconfiguredUploader;

#[async_trait::async_trait]
impl MediaUploader for UnconfiguredUploader {
    async fn upload(&self, _local_path: &Path) -> Result<UploadedMedia> {
        Err(AppError::Unavailable(
            "media upload service is not configured".into(),
        ))
    }

    async fn delete(&self, _public_id: &str) -> Result<()> {
        Ok(())
    }
}

/// Public id the upload service assigns: last path segment without extension
pub fn public_id_from_url(url: &str) -> Option<&str> {
    let path = url.split(['?', '#']).next()?;
    let segment = path.rsplit('/').next()?;
    let id = segment.split('.').next()?;
    if id.is_empty() {
        None
    } else {
        Some(id)
    }
}

/// Keep only characters that are safe in a file name
fn sanitize_file_name(name: &str) -> String {
    let base = Path::new(name)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("");
    let cleaned: String = base
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_'))
        .collect();
    if cleaned.trim_matches('.').is_empty() {
        "upload".to_string()
    } else {
        cleaned
    }
}

/// Stage, upload, clean up
pub struct MediaService {
    uploader: Arc<dyn MediaUploader>,
    staging_dir: PathBuf,
}

impl MediaService {
    pub fn new(uploader: Arc<dyn MediaUploader>, staging_dir: PathBuf) -> Self {
        Self {
            uploader,
            staging_dir,
        }
    }

    /// Decode and write the payload under the staging directory
    async fn stage(&self, payload: &MediaPayload) -> Result<PathBuf> {
        let bytes = STANDARD
            .decode(payload.content_base64.trim())
            .map_err(|_| AppError::bad_request(format!("{} is not valid base64", payload.file_name)))?;
        if bytes.is_empty() {
            return Err(AppError::bad_request(format!("{} is empty", payload.file_name)));
        }

        tokio::fs::create_dir_all(&self.staging_dir).await?;
        let path = self.staging_dir.join(format!(
            "{}-{}",
            uuid::Uuid::new_v4(),
            sanitize_file_name(&payload.file_name)
        ));
        tokio::fs::write(&path, &bytes).await?;
        Ok(path)
    }

    /// Upload one payload. The staged file never outlives this call.
    pub async fn upload(&self, payload: &MediaPayload) -> Result<UploadedMedia> {
        let path = self.stage(payload).await?;
        let result = self.uploader.upload(&path).await;

        if let Err(e) = tokio::fs::remove_file(&path).await {
            warn!(path = %path.display(), error = %e, "Failed to remove staged upload");
        }

        if let Err(ref e) = result {
            warn!(file = %payload.file_name, error = %e, "Media upload failed");
        }
        result
    }

    /// Best-effort removal by public id
    pub async fn discard(&self, public_id: &str) {
        if let Err(e) = self.uploader.delete(public_id).await {
            warn!(public_id = %public_id, error = %e, "Failed to delete media");
        }
    }

    /// Best-effort removal of previously stored media, by its URL
    pub async fn discard_url(&self, url: &str) {
        match public_id_from_url(url) {
            Some(public_id) => self.discard(public_id).await,
            None => debug!(url = %url, "No public id in media URL; nothing to delete"),
        }
    }
}


#[cfg(test)]
mod tests {
    use super::testing::{png, FakeUploader};
    use super::*;

    fn staged_files(dir: &Path) -> usize {
        std::fs::read_dir(dir).map(|d| d.count()).unwrap_or(0)
    }

    #[tokio::test]
    async fn test_upload_removes_staged_file() {
        let dir = tempfile::tempdir().unwrap();
        let uploader = Arc::new(FakeUploader::default());
        let media = MediaService::new(uploader.clone(), dir.path().to_path_buf());

        let uploaded = media.upload(&png("avatar.png")).await.unwrap();
        assert_eq!(uploaded.public_id, "media0");
        assert_eq!(staged_files(dir.path()), 0);
    }

    #[tokio::test]
    async fn test_failed_upload_also_removes_staged_file() {
        let dir = tempfile::tempdir().unwrap();
        let media = MediaService::new(
            Arc::new(FakeUploader::failing()),
            dir.path().to_path_buf(),
        );

        let err = media.upload(&png("avatar.png")).await.unwrap_err();
        assert!(matches!(err, AppError::Upload(_)));
        assert_eq!(staged_files(dir.path()), 0);
    }

    #[tokio::test]
    async fn test_invalid_payload_is_bad_request() {
        let dir = tempfile::tempdir().unwrap();
        let media = MediaService::new(Arc::new(FakeUploader::default()), dir.path().to_path_buf());

        let bad = MediaPayload {
            file_name: "x.png".into(),
            content_base64: "!!!not base64!!!".into(),
        };
        assert!(matches!(
            media.upload(&bad).await,
            Err(AppError::BadRequest(_))
        ));

        let empty = MediaPayload {
            file_name: "x.png".into(),
            content_base64: String::new(),
        };
        assert!(matches!(
            media.upload(&empty).await,
            Err(AppError::BadRequest(_))
        ));
    }

    #[tokio::test]
    async fn test_unconfigured_uploader_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let media = MediaService::new(Arc::new(UnconfiguredUploader), dir.path().to_path_buf());
        let err = media.upload(&png("a.png")).await.unwrap_err();
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_discard_url_uses_public_id() {
        let uploader = Arc::new(FakeUploader::default());
        let media = MediaService::new(uploader.clone(), PathBuf::from("unused"));
        media.discard_url("https://media.example/v1/abc123.png").await;
        assert_eq!(*uploader.deleted.lock().unwrap(), vec!["abc123".to_string()]);
    }

    #[test]
    fn test_public_id_from_url() {
        assert_eq!(
            public_id_from_url("https://res.example.com/image/upload/v17/abc.png"),
            Some("abc")
        );
        assert_eq!(public_id_from_url("https://media.example/x.jpg?sig=1"), Some("x"));
        assert_eq!(public_id_from_url("https://media.example/"), None);
    }

    #[test]
    fn test_sanitize_file_name() {
        assert_eq!(sanitize_file_name("../../etc/passwd"), "passwd");
        assert_eq!(sanitize_file_name("my photo (1).png"), "myphoto1.png");
        assert_eq!(sanitize_file_name(".."), "upload");
    }
}

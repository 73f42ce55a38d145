//! Object storage backends for creative images.
//!
//! Both backends overwrite in place: writing the same path twice is a no-op
//! from the caller's point of view.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use bytes::Bytes;
use thiserror::Error;
use url::Url;

pub type StorageResult<T> = std::result::Result<T, StorageError>;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Storage API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Invalid object path: {0}")]
    InvalidPath(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<reqwest::Error> for StorageError {
    fn from(err: reqwest::Error) -> Self {
        StorageError::Network(err.to_string())
    }
}

impl From<url::ParseError> for StorageError {
    fn from(err: url::ParseError) -> Self {
        StorageError::InvalidPath(err.to_string())
    }
}

fn validate_object_path(path: &str) -> StorageResult<()> {
    if path.trim().is_empty()
        || path.starts_with('/')
        || path.contains('\\')
        || path.split('/').any(|seg| seg.is_empty() || seg == "..")
    {
        return Err(StorageError::InvalidPath(path.to_string()));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Google Cloud Storage
// ---------------------------------------------------------------------------

const GCS_UPLOAD_BASE: &str = "https://storage.googleapis.com/upload/storage/v1";
const GCS_PUBLIC_BASE: &str = "https://storage.googleapis.com";

/// GCS bucket client using the JSON API simple media upload.
pub struct GcsImageStore {
    client: reqwest::Client,
    bucket: String,
    access_token: String,
    upload_base: String,
    public_base: String,
}

impl GcsImageStore {
    pub fn new(bucket: &str, access_token: &str, timeout: Duration) -> StorageResult<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            bucket: bucket.to_string(),
            access_token: access_token.to_string(),
            upload_base: GCS_UPLOAD_BASE.to_string(),
            public_base: GCS_PUBLIC_BASE.to_string(),
        })
    }

    /// Point uploads and public URLs somewhere else (emulators, tests).
    pub fn with_endpoints(mut self, upload_base: &str, public_base: &str) -> Self {
        self.upload_base = upload_base.trim_end_matches('/').to_string();
        self.public_base = public_base.trim_end_matches('/').to_string();
        self
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    pub fn public_url(&self, path: &str) -> String {
        format!("{}/{}/{}", self.public_base, self.bucket, path)
    }

    /// Upload `bytes` to `path` and return the object's public URL.
    pub async fn put_object(&self, path: &str, bytes: Bytes) -> StorageResult<String> {
        validate_object_path(path)?;

        let mut endpoint = Url::parse(&format!("{}/b/{}/o", self.upload_base, self.bucket))?;
        endpoint
            .query_pairs_mut()
            .append_pair("uploadType", "media")
            .append_pair("name", path);

        let size = bytes.len();
        let resp = self
            .client
            .post(endpoint)
            .bearer_auth(&self.access_token)
            .header("Content-Type", "image/jpeg")
            .body(bytes)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let message = resp.text().await.unwrap_or_default();
            return Err(StorageError::Api {
                status: status.as_u16(),
                message,
            });
        }

        tracing::debug!(bucket = %self.bucket, path, size, "Uploaded image");
        Ok(self.public_url(path))
    }
}

// ---------------------------------------------------------------------------
// Local filesystem
// ---------------------------------------------------------------------------

/// Directory-backed store for development runs.
#[derive(Debug, Clone)]
pub struct FsImageStore {
    root: PathBuf,
    public_base_url: Option<String>,
}

impl FsImageStore {
    pub fn new(root: impl Into<PathBuf>, public_base_url: Option<&str>) -> Self {
        Self {
            root: root.into(),
            public_base_url: public_base_url.map(|u| u.trim_end_matches('/').to_string()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn public_url(&self, path: &str) -> String {
        match &self.public_base_url {
            Some(base) => format!("{base}/{path}"),
            None => format!("file://{}", self.root.join(path).display()),
        }
    }

    /// Write via a uniquely named temp file in the destination directory,
    /// then rename over `path`. Readers never see a partial image, and
    /// concurrent writers of the same path each get their own temp file.
    pub async fn put_object(&self, path: &str, bytes: Bytes) -> StorageResult<String> {
        validate_object_path(path)?;

        let dest = self.root.join(path);
        let parent = dest
            .parent()
            .ok_or_else(|| StorageError::InvalidPath(path.to_string()))?
            .to_path_buf();
        tokio::fs::create_dir_all(&parent).await?;

        let size = bytes.len();
        let target = dest.clone();
        tokio::task::spawn_blocking(move || -> StorageResult<()> {
            let mut tmp = tempfile::NamedTempFile::new_in(&parent)?;
            tmp.write_all(&bytes)?;
            tmp.persist(&target).map_err(|e| StorageError::Io(e.error))?;
            Ok(())
        })
        .await
        .map_err(|e| StorageError::Io(std::io::Error::other(e)))??;

        tracing::debug!(path = %dest.display(), size, "Stored image");
        Ok(self.public_url(path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_unsafe_paths() {
        assert!(validate_object_path("").is_err());
        assert!(validate_object_path("/abs/x.jpg").is_err());
        assert!(validate_object_path("a/../b.jpg").is_err());
        assert!(validate_object_path("a//b.jpg").is_err());
        assert!(validate_object_path("a\\b.jpg").is_err());
        assert!(validate_object_path("0123/4567/abc.jpg").is_ok());
    }

    #[test]
    fn gcs_public_url_layout() {
        let store = GcsImageStore::new("facebook_ad_images", "t", Duration::from_secs(1)).unwrap();
        assert_eq!(
            store.public_url("0123/x.jpg"),
            "https://storage.googleapis.com/facebook_ad_images/0123/x.jpg"
        );
    }

    #[tokio::test]
    async fn fs_put_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsImageStore::new(dir.path(), Some("https://img.example/"));

        let url1 = store
            .put_object("0123/4567/abc.jpg", Bytes::from_static(b"one"))
            .await
            .unwrap();
        let url2 = store
            .put_object("0123/4567/abc.jpg", Bytes::from_static(b"one"))
            .await
            .unwrap();

        assert_eq!(url1, "https://img.example/0123/4567/abc.jpg");
        assert_eq!(url1, url2);
        let on_disk = std::fs::read(dir.path().join("0123/4567/abc.jpg")).unwrap();
        assert_eq!(on_disk, b"one");

        let entries = std::fs::read_dir(dir.path().join("0123/4567")).unwrap().count();
        assert_eq!(entries, 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn fs_concurrent_puts_of_one_path_all_succeed() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsImageStore::new(dir.path(), None);
        let path = "abcd/ef01/same.jpg";

        let mut writers = tokio::task::JoinSet::new();
        for _ in 0..32 {
            let store = store.clone();
            writers.spawn(async move {
                store
                    .put_object(path, Bytes::from_static(b"same image"))
                    .await
            });
        }
        while let Some(result) = writers.join_next().await {
            result.unwrap().unwrap();
        }

        let on_disk = std::fs::read(dir.path().join(path)).unwrap();
        assert_eq!(on_disk, b"same image");
        let entries = std::fs::read_dir(dir.path().join("abcd/ef01")).unwrap().count();
        assert_eq!(entries, 1);
    }
}

// Trait abstractions for the retriever's external collaborators.
//
// SnapshotResolver — archive ID → image URL (ad library snapshot endpoint)
// ImageFetcher     — image URL → bytes or a classified failure
// ImageStore       — content-addressed object writes
// IdentifierSource / RecordSink — the Postgres datastore, read and write sides
//
// Concrete clients live in snapshot-client and adscreen-archive; the mocks in
// `testing` let the pipeline run with no network and no database.

use anyhow::Result;
use async_trait::async_trait;
use bytes::Bytes;

use adscreen_archive::{FsImageStore, GcsImageStore, ImageDownloader, ImageRecordStore};
use adscreen_common::{ArchiveId, ImageFetch, StoredImageRecord};
use snapshot_client::SnapshotClient;

// ---------------------------------------------------------------------------
// Network side
// ---------------------------------------------------------------------------

#[async_trait]
pub trait SnapshotResolver: Send + Sync {
    /// `Ok(None)` when the snapshot has no usable image URL. Transport and
    /// HTTP status failures are errors.
    async fn resolve_image_url(&self, archive_id: ArchiveId) -> Result<Option<String>>;
}

#[async_trait]
impl SnapshotResolver for SnapshotClient {
    async fn resolve_image_url(&self, archive_id: ArchiveId) -> Result<Option<String>> {
        Ok(self.resolve_image_url(&archive_id.to_string()).await?)
    }
}

#[async_trait]
pub trait ImageFetcher: Send + Sync {
    async fn fetch_image(&self, url: &str) -> ImageFetch;
}

#[async_trait]
impl ImageFetcher for ImageDownloader {
    async fn fetch_image(&self, url: &str) -> ImageFetch {
        self.download(url).await
    }
}

// ---------------------------------------------------------------------------
// Object storage
// ---------------------------------------------------------------------------

#[async_trait]
pub trait ImageStore: Send + Sync {
    /// Write `bytes` at `path`, overwriting, and return the public URL.
    async fn put_object(&self, path: &str, bytes: Bytes) -> Result<String>;
}

#[async_trait]
impl ImageStore for GcsImageStore {
    async fn put_object(&self, path: &str, bytes: Bytes) -> Result<String> {
        Ok(self.put_object(path, bytes).await?)
    }
}

#[async_trait]
impl ImageStore for FsImageStore {
    async fn put_object(&self, path: &str, bytes: Bytes) -> Result<String> {
        Ok(self.put_object(path, bytes).await?)
    }
}

// ---------------------------------------------------------------------------
// Datastore
// ---------------------------------------------------------------------------

#[async_trait]
pub trait IdentifierSource: Send + Sync {
    /// Archive IDs with no result row yet. `None` means no limit.
    async fn archive_ids_missing_image(&self, limit: Option<i64>) -> Result<Vec<ArchiveId>>;
}

#[async_trait]
pub trait RecordSink: Send + Sync {
    /// Durably write one chunk's records, all or nothing.
    async fn commit_chunk(&self, records: &[StoredImageRecord]) -> Result<()>;
}

#[async_trait]
impl IdentifierSource for ImageRecordStore {
    async fn archive_ids_missing_image(&self, limit: Option<i64>) -> Result<Vec<ArchiveId>> {
        Ok(self.archive_ids_missing_image(limit).await?)
    }
}

#[async_trait]
impl RecordSink for ImageRecordStore {
    async fn commit_chunk(&self, records: &[StoredImageRecord]) -> Result<()> {
        Ok(self.insert_records(records).await?)
    }
}

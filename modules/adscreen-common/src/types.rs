use std::fmt;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// ArchiveId
// ---------------------------------------------------------------------------

/// Ad library archive ID. Supplied by the datastore, never minted here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ArchiveId(pub i64);

impl fmt::Display for ArchiveId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for ArchiveId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

// ---------------------------------------------------------------------------
// FetchStatus
// ---------------------------------------------------------------------------

/// Result of downloading an ad's image URL.
///
/// Persisted as the integer codes returned by [`FetchStatus::code`], which
/// existing `ad_snapshot_images` rows already use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FetchStatus {
    UnknownError,
    Success,
    Timeout,
    NotFound,
}

impl FetchStatus {
    pub fn code(self) -> i32 {
        match self {
            FetchStatus::UnknownError => 0,
            FetchStatus::Success => 1,
            FetchStatus::Timeout => 2,
            FetchStatus::NotFound => 3,
        }
    }

    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            0 => Some(FetchStatus::UnknownError),
            1 => Some(FetchStatus::Success),
            2 => Some(FetchStatus::Timeout),
            3 => Some(FetchStatus::NotFound),
            _ => None,
        }
    }

    pub fn is_success(self) -> bool {
        self == FetchStatus::Success
    }
}

impl fmt::Display for FetchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FetchStatus::UnknownError => "unknown_error",
            FetchStatus::Success => "success",
            FetchStatus::Timeout => "timeout",
            FetchStatus::NotFound => "not_found",
        };
        f.write_str(s)
    }
}

// ---------------------------------------------------------------------------
// Per-stage outcomes
// ---------------------------------------------------------------------------

/// How a snapshot lookup ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// Snapshot fetched and an image URL extracted.
    Found(String),
    /// Snapshot fetched but it carries no usable image URL.
    NotFound,
    /// Snapshot could not be fetched (transport error, timeout, non-2xx).
    /// Nothing is recorded, so the archive ID is retried on the next run.
    Failed(String),
}

/// What snapshot resolution produced for one archive ID.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotFetchOutcome {
    pub archive_id: ArchiveId,
    pub fetched_at: DateTime<Utc>,
    pub resolution: Resolution,
}

impl SnapshotFetchOutcome {
    pub fn found(&self) -> bool {
        matches!(self.resolution, Resolution::Found(_))
    }

    pub fn failed(&self) -> bool {
        matches!(self.resolution, Resolution::Failed(_))
    }

    pub fn image_url(&self) -> Option<&str> {
        match &self.resolution {
            Resolution::Found(url) => Some(url),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub enum ImageFetch {
    Fetched(Bytes),
    Failed(FetchStatus),
}

/// Download result for one image URL. Bytes live only as long as this value.
#[derive(Debug, Clone)]
pub struct ImageFetchResult {
    pub archive_id: ArchiveId,
    pub outcome: ImageFetch,
}

impl ImageFetchResult {
    pub fn status(&self) -> FetchStatus {
        match &self.outcome {
            ImageFetch::Fetched(_) => FetchStatus::Success,
            ImageFetch::Failed(status) => *status,
        }
    }
}

// ---------------------------------------------------------------------------
// StoredImageRecord
// ---------------------------------------------------------------------------

/// One result row per archive ID per run.
///
/// Fields are private so that a record without an image URL can never carry a
/// storage URL, fetch status or fingerprint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StoredImageRecord {
    archive_id: ArchiveId,
    snapshot_fetch_time: DateTime<Utc>,
    image_url_found_in_snapshot: bool,
    public_storage_url: Option<String>,
    fetch_status: Option<FetchStatus>,
    fingerprint: Option<String>,
}

impl StoredImageRecord {
    /// Snapshot had no usable image URL.
    pub fn not_found(archive_id: ArchiveId, snapshot_fetch_time: DateTime<Utc>) -> Self {
        Self {
            archive_id,
            snapshot_fetch_time,
            image_url_found_in_snapshot: false,
            public_storage_url: None,
            fetch_status: None,
            fingerprint: None,
        }
    }

    /// Image URL found but the download failed.
    pub fn download_failed(
        archive_id: ArchiveId,
        snapshot_fetch_time: DateTime<Utc>,
        status: FetchStatus,
    ) -> Self {
        Self {
            archive_id,
            snapshot_fetch_time,
            image_url_found_in_snapshot: true,
            public_storage_url: None,
            fetch_status: Some(status),
            fingerprint: None,
        }
    }

    /// Image downloaded but the bytes did not decode as an image.
    pub fn undecodable(archive_id: ArchiveId, snapshot_fetch_time: DateTime<Utc>) -> Self {
        Self {
            archive_id,
            snapshot_fetch_time,
            image_url_found_in_snapshot: true,
            public_storage_url: None,
            fetch_status: Some(FetchStatus::Success),
            fingerprint: None,
        }
    }

    /// Image downloaded, hashed and written to object storage.
    pub fn stored(
        archive_id: ArchiveId,
        snapshot_fetch_time: DateTime<Utc>,
        public_storage_url: String,
        fingerprint: String,
    ) -> Self {
        Self {
            archive_id,
            snapshot_fetch_time,
            image_url_found_in_snapshot: true,
            public_storage_url: Some(public_storage_url),
            fetch_status: Some(FetchStatus::Success),
            fingerprint: Some(fingerprint),
        }
    }

    pub fn archive_id(&self) -> ArchiveId {
        self.archive_id
    }

    pub fn snapshot_fetch_time(&self) -> DateTime<Utc> {
        self.snapshot_fetch_time
    }

    pub fn image_url_found_in_snapshot(&self) -> bool {
        self.image_url_found_in_snapshot
    }

    pub fn public_storage_url(&self) -> Option<&str> {
        self.public_storage_url.as_deref()
    }

    pub fn fetch_status(&self) -> Option<FetchStatus> {
        self.fetch_status
    }

    pub fn fingerprint(&self) -> Option<&str> {
        self.fingerprint.as_deref()
    }
}

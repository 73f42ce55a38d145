// Test mocks for the retriever pipeline.
//
// One mock per trait boundary:
// - MockResolver (SnapshotResolver) — archive ID → image URL / not found / error
// - MockImageHost (ImageFetcher) — URL → bytes or a failure status
// - MemoryImageStore (ImageStore) — in-memory object bucket
// - MemoryDatastore (IdentifierSource + RecordSink) — ads table + result rows
//
// Plus `test_png` for building small decodable images.

use std::collections::{BTreeSet, HashMap};
use std::io::Cursor;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use anyhow::{bail, Result};
use async_trait::async_trait;
use bytes::Bytes;
use image::{DynamicImage, GrayImage, ImageFormat, Luma};

use adscreen_common::{ArchiveId, FetchStatus, ImageFetch, StoredImageRecord};

use crate::traits::{IdentifierSource, ImageFetcher, ImageStore, RecordSink, SnapshotResolver};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Encode a small grayscale PNG. The same seed always yields the same bytes.
pub fn test_png(seed: u32) -> Bytes {
    let img = DynamicImage::ImageLuma8(GrayImage::from_fn(48, 32, |x, y| {
        let v = x.wrapping_mul(seed % 7 + 1) + y.wrapping_mul(seed % 5 + 2) + seed * 13;
        Luma([(v % 256) as u8])
    }));
    let mut buf = Cursor::new(Vec::new());
    img.write_to(&mut buf, ImageFormat::Png)
        .expect("encoding an in-memory PNG cannot fail");
    Bytes::from(buf.into_inner())
}

pub fn ids(range: std::ops::RangeInclusive<i64>) -> Vec<ArchiveId> {
    range.map(ArchiveId).collect()
}

// ---------------------------------------------------------------------------
// MockResolver
// ---------------------------------------------------------------------------

enum Snapshot {
    Image(String),
    NotFound,
    Error(String),
}

/// Unregistered archive IDs resolve to "no image URL".
/// Builder pattern: `.on_image()`, `.on_not_found()`, `.on_error()`.
pub struct MockResolver {
    snapshots: HashMap<ArchiveId, Snapshot>,
    calls: AtomicUsize,
}

impl MockResolver {
    pub fn new() -> Self {
        Self {
            snapshots: HashMap::new(),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn on_image(mut self, id: i64, url: &str) -> Self {
        self.snapshots
            .insert(ArchiveId(id), Snapshot::Image(url.to_string()));
        self
    }

    pub fn on_not_found(mut self, id: i64) -> Self {
        self.snapshots.insert(ArchiveId(id), Snapshot::NotFound);
        self
    }

    pub fn on_error(mut self, id: i64, message: &str) -> Self {
        self.snapshots
            .insert(ArchiveId(id), Snapshot::Error(message.to_string()));
        self
    }

    /// Every ID in `ids` resolves to `http://img.test/<id>.png`.
    pub fn images_for(mut self, ids: &[ArchiveId]) -> Self {
        for id in ids {
            self.snapshots
                .insert(*id, Snapshot::Image(format!("http://img.test/{id}.png")));
        }
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Default for MockResolver {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SnapshotResolver for MockResolver {
    async fn resolve_image_url(&self, archive_id: ArchiveId) -> Result<Option<String>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.snapshots.get(&archive_id) {
            Some(Snapshot::Image(url)) => Ok(Some(url.clone())),
            Some(Snapshot::NotFound) | None => Ok(None),
            Some(Snapshot::Error(message)) => bail!("MockResolver: {message}"),
        }
    }
}

// ---------------------------------------------------------------------------
// MockImageHost
// ---------------------------------------------------------------------------

/// URL → canned download outcome. Unregistered URLs fail with `NotFound`.
pub struct MockImageHost {
    images: HashMap<String, ImageFetch>,
}

impl MockImageHost {
    pub fn new() -> Self {
        Self {
            images: HashMap::new(),
        }
    }

    pub fn on_image(mut self, url: &str, bytes: Bytes) -> Self {
        self.images
            .insert(url.to_string(), ImageFetch::Fetched(bytes));
        self
    }

    pub fn on_failure(mut self, url: &str, status: FetchStatus) -> Self {
        self.images
            .insert(url.to_string(), ImageFetch::Failed(status));
        self
    }

    /// Serve `test_png(id)` at every URL `MockResolver::images_for` hands out.
    pub fn pngs_for(mut self, ids: &[ArchiveId]) -> Self {
        for id in ids {
            self.images.insert(
                format!("http://img.test/{id}.png"),
                ImageFetch::Fetched(test_png(id.0 as u32)),
            );
        }
        self
    }
}

impl Default for MockImageHost {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ImageFetcher for MockImageHost {
    async fn fetch_image(&self, url: &str) -> ImageFetch {
        self.images
            .get(url)
            .cloned()
            .unwrap_or(ImageFetch::Failed(FetchStatus::NotFound))
    }
}

// ---------------------------------------------------------------------------
// MemoryImageStore
// ---------------------------------------------------------------------------

/// In-memory bucket. Public URLs are `mem://<path>`.
pub struct MemoryImageStore {
    objects: Mutex<HashMap<String, Bytes>>,
    puts: AtomicUsize,
    fail_on_put: bool,
}

impl MemoryImageStore {
    pub fn new() -> Self {
        Self {
            objects: Mutex::new(HashMap::new()),
            puts: AtomicUsize::new(0),
            fail_on_put: false,
        }
    }

    /// Make every `put_object` return an error.
    pub fn failing(mut self) -> Self {
        self.fail_on_put = true;
        self
    }

    pub fn object_count(&self) -> usize {
        self.objects.lock().unwrap().len()
    }

    pub fn put_count(&self) -> usize {
        self.puts.load(Ordering::SeqCst)
    }

    pub fn get(&self, path: &str) -> Option<Bytes> {
        self.objects.lock().unwrap().get(path).cloned()
    }
}

impl Default for MemoryImageStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ImageStore for MemoryImageStore {
    async fn put_object(&self, path: &str, bytes: Bytes) -> Result<String> {
        if self.fail_on_put {
            bail!("MemoryImageStore: write to {path} rejected");
        }
        self.puts.fetch_add(1, Ordering::SeqCst);
        self.objects.lock().unwrap().insert(path.to_string(), bytes);
        Ok(format!("mem://{path}"))
    }
}

// ---------------------------------------------------------------------------
// MemoryDatastore
// ---------------------------------------------------------------------------

struct DatastoreInner {
    ads: BTreeSet<ArchiveId>,
    records: Vec<StoredImageRecord>,
    commits: usize,
    fail_on_commit: Option<usize>,
}

/// The `ads` table plus committed `ad_snapshot_images` rows.
/// An archive ID is "missing" until at least one record for it is committed.
pub struct MemoryDatastore {
    inner: Mutex<DatastoreInner>,
}

impl MemoryDatastore {
    pub fn new(ads: &[ArchiveId]) -> Self {
        Self {
            inner: Mutex::new(DatastoreInner {
                ads: ads.iter().copied().collect(),
                records: Vec::new(),
                commits: 0,
                fail_on_commit: None,
            }),
        }
    }

    /// Reject the `n`th commit (zero-based) and every one after it.
    pub fn failing_from_commit(self, n: usize) -> Self {
        self.inner.lock().unwrap().fail_on_commit = Some(n);
        self
    }

    pub fn records(&self) -> Vec<StoredImageRecord> {
        self.inner.lock().unwrap().records.clone()
    }

    pub fn commits(&self) -> usize {
        self.inner.lock().unwrap().commits
    }

    pub fn records_for(&self, id: i64) -> Vec<StoredImageRecord> {
        self.inner
            .lock()
            .unwrap()
            .records
            .iter()
            .filter(|r| r.archive_id() == ArchiveId(id))
            .cloned()
            .collect()
    }
}

#[async_trait]
impl IdentifierSource for MemoryDatastore {
    async fn archive_ids_missing_image(&self, limit: Option<i64>) -> Result<Vec<ArchiveId>> {
        let inner = self.inner.lock().unwrap();
        let done: BTreeSet<ArchiveId> = inner.records.iter().map(|r| r.archive_id()).collect();
        let missing = inner.ads.iter().filter(|id| !done.contains(*id)).copied();
        Ok(match limit {
            Some(n) => missing.take(n.max(0) as usize).collect(),
            None => missing.collect(),
        })
    }
}

#[async_trait]
impl RecordSink for MemoryDatastore {
    async fn commit_chunk(&self, records: &[StoredImageRecord]) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        if inner.fail_on_commit.is_some_and(|n| inner.commits >= n) {
            bail!("MemoryDatastore: commit rejected");
        }
        inner.commits += 1;
        inner.records.extend_from_slice(records);
        Ok(())
    }
}

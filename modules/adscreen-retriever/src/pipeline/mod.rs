//! Batch pipeline: resolve → download → hash → store → record, one chunk at a
//! time.
//!
//! Each chunk goes through two worker-pool stages separated by barriers:
//!
//! 1. every snapshot in the chunk is resolved, then the systemic-failure
//!    check runs over the whole chunk;
//! 2. every found image is downloaded, fingerprinted and written to object
//!    storage, then the chunk's records are committed in one transaction.
//!
//! A crash after chunk *k* commits leaves chunks `1..=k` durable; the next
//! run's "missing image" query naturally picks up from chunk *k+1*. Archive IDs
//! whose snapshot could not be fetched get no record, so they stay in that
//! query's result until a later run resolves them.

mod error;
mod stats;

pub use error::PipelineError;
pub use stats::RunStats;

use std::fmt;

use adscreen_archive::{fingerprint, image_path};
use adscreen_common::{
    ArchiveId, FetchStatus, FileConfig, ImageFetch, ImageFetchResult, Resolution,
    SnapshotFetchOutcome, StoredImageRecord,
};
use chrono::Utc;
use futures::stream::{self, StreamExt};
use tracing::{debug, error, info, warn};

use crate::traits::{ImageFetcher, ImageStore, RecordSink, SnapshotResolver};

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct RetrieverConfig {
    pub batch_size: usize,
    pub concurrency: usize,
    pub systemic_failure_threshold: f64,
}

impl Default for RetrieverConfig {
    fn default() -> Self {
        Self::from(&FileConfig::default())
    }
}

impl From<&FileConfig> for RetrieverConfig {
    fn from(cfg: &FileConfig) -> Self {
        Self {
            batch_size: cfg.limits.batch_size,
            concurrency: cfg.pipeline.concurrency,
            systemic_failure_threshold: cfg.pipeline.systemic_failure_threshold,
        }
    }
}

impl RetrieverConfig {
    /// Not-found count at which a chunk is treated as a systemic failure.
    ///
    /// Measured against the configured batch size, not the chunk's length, so
    /// at the default threshold of 1.0 a short trailing chunk never trips it.
    pub fn systemic_failure_limit(&self) -> usize {
        let limit = (self.systemic_failure_threshold * self.batch_size as f64 - 1e-9).ceil();
        (limit as usize).max(1)
    }
}

// ---------------------------------------------------------------------------
// Report
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct RunAbort {
    /// Zero-based index of the chunk that failed.
    pub chunk_index: usize,
    pub error: PipelineError,
}

/// Terminal status of a run. Stats cover everything processed, including the
/// partial work of an aborted chunk.
#[derive(Debug)]
pub struct RunReport {
    pub stats: RunStats,
    pub chunks_total: usize,
    pub abort: Option<RunAbort>,
}

impl RunReport {
    pub fn completed(&self) -> bool {
        self.abort.is_none()
    }

    pub fn into_result(self) -> Result<RunStats, PipelineError> {
        match self.abort {
            None => Ok(self.stats),
            Some(abort) => Err(abort.error),
        }
    }
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.abort {
            None => write!(
                f,
                "Completed {} of {} chunks",
                self.stats.chunks_committed, self.chunks_total
            ),
            Some(abort) => write!(
                f,
                "Aborted at chunk {} of {} ({} committed): {}",
                abort.chunk_index + 1,
                self.chunks_total,
                self.stats.chunks_committed,
                abort.error
            ),
        }
    }
}

// ---------------------------------------------------------------------------
// Retriever
// ---------------------------------------------------------------------------

/// What happened to one archive ID after its snapshot resolved.
enum Settled {
    SnapshotFailed,
    NoImageUrl,
    DownloadFailed(FetchStatus),
    Undecodable,
    Stored,
}

pub struct Retriever<'a> {
    snapshots: &'a dyn SnapshotResolver,
    images: &'a dyn ImageFetcher,
    storage: &'a dyn ImageStore,
    records: &'a dyn RecordSink,
    config: RetrieverConfig,
}

impl<'a> Retriever<'a> {
    pub fn new(
        snapshots: &'a dyn SnapshotResolver,
        images: &'a dyn ImageFetcher,
        storage: &'a dyn ImageStore,
        records: &'a dyn RecordSink,
        config: RetrieverConfig,
    ) -> Self {
        let config = RetrieverConfig {
            batch_size: config.batch_size.max(1),
            concurrency: config.concurrency.max(1),
            ..config
        };
        Self {
            snapshots,
            images,
            storage,
            records,
            config,
        }
    }

    /// Process `archive_ids` chunk by chunk, committing after each one.
    /// Stops at the first run-fatal error; stats are logged either way.
    pub async fn run(&self, archive_ids: &[ArchiveId]) -> RunReport {
        let batch_size = self.config.batch_size;
        let chunks_total = archive_ids.len().div_ceil(batch_size);
        info!(
            total = archive_ids.len(),
            batch_size,
            concurrency = self.config.concurrency,
            "Processing archive IDs in batches"
        );

        let mut stats = RunStats::default();
        let mut abort = None;

        for (chunk_index, chunk) in archive_ids.chunks(batch_size).enumerate() {
            match self.process_chunk(chunk, &mut stats).await {
                Ok(()) => {
                    stats.chunks_committed += 1;
                    info!(
                        "Processed {} of {} archive IDs.",
                        stats.ids_processed,
                        archive_ids.len()
                    );
                    info!("{stats}");
                }
                Err(e) => {
                    error!(chunk = chunk_index + 1, error = %e, "Chunk failed, aborting run");
                    abort = Some(RunAbort {
                        chunk_index,
                        error: e,
                    });
                    break;
                }
            }
        }

        let report = RunReport {
            stats,
            chunks_total,
            abort,
        };
        info!("{}", report.stats);
        if report.completed() {
            info!("{report}");
        } else {
            error!("{report}");
        }
        report
    }

    async fn process_chunk(
        &self,
        chunk: &[ArchiveId],
        stats: &mut RunStats,
    ) -> Result<(), PipelineError> {
        let width = self.config.concurrency;

        // Stage 1: resolve every snapshot before judging the chunk.
        let outcomes: Vec<SnapshotFetchOutcome> = stream::iter(chunk.iter().copied())
            .map(|id| self.resolve(id))
            .buffered(width)
            .collect()
            .await;

        // Fetch failures count toward the systemic check.
        let not_found = outcomes.iter().filter(|o| !o.found()).count();
        stats.ids_processed += outcomes.len() as u32;
        stats.image_urls_found += (outcomes.len() - not_found) as u32;
        stats.snapshot_errors += outcomes.iter().filter(|o| o.failed()).count() as u32;

        if not_found >= self.config.systemic_failure_limit() {
            return Err(PipelineError::SystemicFailure {
                not_found,
                chunk_len: chunk.len(),
            });
        }

        // Stage 2: download, hash, store.
        let settled: Vec<Result<(Option<StoredImageRecord>, Settled), PipelineError>> =
            stream::iter(outcomes)
                .map(|o| self.settle(o))
                .buffered(width)
                .collect()
                .await;

        let mut records = Vec::with_capacity(settled.len());
        let mut first_error = None;
        for result in settled {
            match result {
                Ok((record, how)) => {
                    match how {
                        Settled::SnapshotFailed | Settled::NoImageUrl => {}
                        Settled::DownloadFailed(status) => stats.record_download_failure(status),
                        Settled::Undecodable => {
                            stats.downloads_succeeded += 1;
                            stats.images_undecodable += 1;
                        }
                        Settled::Stored => {
                            stats.downloads_succeeded += 1;
                            stats.images_uploaded += 1;
                        }
                    }
                    records.extend(record);
                }
                Err(e) => {
                    first_error.get_or_insert(e);
                }
            }
        }
        if let Some(e) = first_error {
            return Err(e);
        }

        debug!(records = ?records, "Inserting ad image records");
        self.records
            .commit_chunk(&records)
            .await
            .map_err(|e| PipelineError::Datastore(e.into()))?;
        Ok(())
    }

    async fn resolve(&self, archive_id: ArchiveId) -> SnapshotFetchOutcome {
        let resolution = match self.snapshots.resolve_image_url(archive_id).await {
            Ok(Some(url)) => {
                debug!(%archive_id, image_url = %url, "Archive ID has image URL");
                Resolution::Found(url)
            }
            Ok(None) => {
                warn!(%archive_id, "Unable to find image URL for archive ID");
                Resolution::NotFound
            }
            Err(e) => {
                warn!(%archive_id, error = %e, "Snapshot fetch failed, leaving for next run");
                Resolution::Failed(e.to_string())
            }
        };

        SnapshotFetchOutcome {
            archive_id,
            fetched_at: Utc::now(),
            resolution,
        }
    }

    async fn settle(
        &self,
        outcome: SnapshotFetchOutcome,
    ) -> Result<(Option<StoredImageRecord>, Settled), PipelineError> {
        let SnapshotFetchOutcome {
            archive_id,
            fetched_at,
            resolution,
        } = outcome;

        let image_url = match resolution {
            Resolution::Found(url) => url,
            Resolution::NotFound => {
                return Ok((
                    Some(StoredImageRecord::not_found(archive_id, fetched_at)),
                    Settled::NoImageUrl,
                ));
            }
            Resolution::Failed(_) => return Ok((None, Settled::SnapshotFailed)),
        };

        let fetched = ImageFetchResult {
            archive_id,
            outcome: self.images.fetch_image(&image_url).await,
        };
        let bytes = match fetched.outcome {
            ImageFetch::Fetched(bytes) => bytes,
            ImageFetch::Failed(status) => {
                warn!(%archive_id, %status, "Image download failed");
                return Ok((
                    Some(StoredImageRecord::download_failed(archive_id, fetched_at, status)),
                    Settled::DownloadFailed(status),
                ));
            }
        };

        let hash_input = bytes.clone();
        let hashed = tokio::task::spawn_blocking(move || fingerprint(&hash_input)).await;
        let fp = match hashed {
            Ok(Ok(fp)) => fp.to_hex(),
            Ok(Err(e)) => {
                warn!(%archive_id, error = %e, "Downloaded image could not be decoded");
                return Ok((
                    Some(StoredImageRecord::undecodable(archive_id, fetched_at)),
                    Settled::Undecodable,
                ));
            }
            Err(e) => {
                warn!(%archive_id, error = %e, "Fingerprint task failed");
                return Ok((
                    Some(StoredImageRecord::undecodable(archive_id, fetched_at)),
                    Settled::Undecodable,
                ));
            }
        };

        let path = image_path(&fp)?;
        let public_url = self
            .storage
            .put_object(&path, bytes)
            .await
            .map_err(|e| PipelineError::Storage {
                archive_id,
                source: e.into(),
            })?;
        debug!(%archive_id, fingerprint = %fp, path = %path, "Image uploaded");

        Ok((
            Some(StoredImageRecord::stored(archive_id, fetched_at, public_url, fp)),
            Settled::Stored,
        ))
    }
}

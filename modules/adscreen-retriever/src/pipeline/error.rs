use adscreen_archive::AddressError;
use adscreen_common::ArchiveId;
use thiserror::Error;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Run-fatal conditions. Per-identifier failures (missing image URL, failed
/// download, undecodable bytes) are recorded, not raised.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(
        "Failed to find image URLs in {not_found} of {chunk_len} snapshots in this batch. \
         Assuming access token has expired. Aborting!"
    )]
    SystemicFailure { not_found: usize, chunk_len: usize },

    #[error("Object storage write failed for archive ID {archive_id}: {source}")]
    Storage {
        archive_id: ArchiveId,
        #[source]
        source: BoxError,
    },

    #[error("Datastore commit failed: {0}")]
    Datastore(#[source] BoxError),

    #[error(transparent)]
    Address(#[from] AddressError),
}

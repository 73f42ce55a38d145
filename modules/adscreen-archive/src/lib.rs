pub mod content_address;
pub mod download;
pub mod error;
pub mod hasher;
pub mod object_store;
pub mod store;

pub use content_address::{image_path, AddressError};
pub use download::ImageDownloader;
pub use error::{ArchiveError, Result};
pub use hasher::{fingerprint, Fingerprint, HashError};
pub use object_store::{FsImageStore, GcsImageStore, StorageError, StorageResult};
pub use store::{ImageRecordRow, ImageRecordStore};

// Content-addressed object paths for stored creatives.
//
// `0123456789abcdef...` → `0123/4567/89ab/cdef/0123/4567/89ab/<fingerprint>.jpg`
// Four hex characters per level caps every listing at 65,536 entries.

use thiserror::Error;

pub const SHARD_WIDTH: usize = 4;
pub const SHARD_DEPTH: usize = 7;
pub const IMAGE_SUFFIX: &str = "jpg";

const MIN_FINGERPRINT_LEN: usize = SHARD_WIDTH * SHARD_DEPTH;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AddressError {
    #[error("Malformed fingerprint {0:?}: need at least 28 ASCII characters")]
    MalformedFingerprint(String),
}

/// Object path for an image with the given fingerprint.
pub fn image_path(fingerprint: &str) -> Result<String, AddressError> {
    if fingerprint.len() < MIN_FINGERPRINT_LEN || !fingerprint.is_ascii() {
        return Err(AddressError::MalformedFingerprint(fingerprint.to_string()));
    }

    let mut path = String::with_capacity(
        MIN_FINGERPRINT_LEN + SHARD_DEPTH + fingerprint.len() + IMAGE_SUFFIX.len() + 1,
    );
    for level in 0..SHARD_DEPTH {
        let start = level * SHARD_WIDTH;
        path.push_str(&fingerprint[start..start + SHARD_WIDTH]);
        path.push('/');
    }
    path.push_str(fingerprint);
    path.push('.');
    path.push_str(IMAGE_SUFFIX);
    Ok(path)
}

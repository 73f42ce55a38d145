//! Perceptual fingerprints for ad creatives.
//!
//! Row/column difference hash: the image is reduced to a 9×9 grayscale
//! thumbnail and each of the 8×8 cells contributes one bit comparing it with
//! its right neighbour (row hash) and one comparing it with the cell below
//! (column hash). Re-encoding or mild recompression leaves the gradients, and
//! so the hash, unchanged.

use std::fmt;

use image::imageops::FilterType;
use image::{DynamicImage, GrayImage};
use thiserror::Error;

const HASH_SIZE: u32 = 8;

/// Length of [`Fingerprint::to_hex`].
pub const FINGERPRINT_HEX_LEN: usize = 32;

#[derive(Debug, Error)]
pub enum HashError {
    #[error("Image decode failed: {0}")]
    Decode(#[from] image::ImageError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Fingerprint {
    row: u64,
    col: u64,
}

impl Fingerprint {
    /// 16 hex chars of row hash followed by 16 of column hash.
    pub fn to_hex(&self) -> String {
        format!("{:016x}{:016x}", self.row, self.col)
    }

    pub fn from_hex(s: &str) -> Option<Self> {
        if s.len() != FINGERPRINT_HEX_LEN || !s.bytes().all(|b| b.is_ascii_hexdigit()) {
            return None;
        }
        let row = u64::from_str_radix(&s[..16], 16).ok()?;
        let col = u64::from_str_radix(&s[16..], 16).ok()?;
        Some(Self { row, col })
    }

    /// Number of differing bits. 0 means perceptually identical.
    pub fn hamming_distance(&self, other: &Fingerprint) -> u32 {
        (self.row ^ other.row).count_ones() + (self.col ^ other.col).count_ones()
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// Decode `bytes` (first frame only for animated formats) and fingerprint it.
pub fn fingerprint(bytes: &[u8]) -> Result<Fingerprint, HashError> {
    let img = image::load_from_memory(bytes)?;
    Ok(fingerprint_image(&img))
}

pub fn fingerprint_image(img: &DynamicImage) -> Fingerprint {
    let width = HASH_SIZE + 1;
    let thumb = image::imageops::resize(&img.to_luma8(), width, width, FilterType::Lanczos3);
    difference_hash(&thumb)
}

/// Row/column difference bits over a 9×9 luma thumbnail, scanned row-major,
/// most significant bit first. A bit is set when a cell is darker than its
/// right (row) or lower (column) neighbour. Existing `sim_hash` values and
/// bucket paths were produced with exactly this layout.
fn difference_hash(thumb: &GrayImage) -> Fingerprint {
    let px = |x: u32, y: u32| thumb.get_pixel(x, y).0[0];

    let mut row = 0u64;
    let mut col = 0u64;
    for y in 0..HASH_SIZE {
        for x in 0..HASH_SIZE {
            row = (row << 1) | u64::from(px(x, y) < px(x + 1, y));
            col = (col << 1) | u64::from(px(x, y) < px(x, y + 1));
        }
    }
    Fingerprint { row, col }
}

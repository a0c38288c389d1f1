//! Perceptual hashing for near-duplicate image detection.
//!
//! A 64-bit average-hash: the image is area-averaged down to an 8×8 grid,
//! converted to luminance, and each cell emits `1` if it is brighter than
//! the grid mean. Robust to resizing, recompression and small colour
//! shifts; not to cropping or rotation.

use std::fmt;

use image::{RgbImage, imageops};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::DecodeError;
use crate::registry::BannedImageRegistry;

/// Images at or above this similarity (percent) to a banned fingerprint are banned.
pub const BAN_SIMILARITY_THRESHOLD: f64 = 85.0;

/// Side length of the sampling grid.
const GRID: u32 = 8;

/// Number of bits in a fingerprint produced by [`fingerprint`].
pub const FINGERPRINT_BITS: usize = (GRID * GRID) as usize;

/// A perceptual fingerprint stored as a string of `'0'`/`'1'` characters.
///
/// Fingerprints loaded from disk are kept verbatim, so lengths may differ;
/// [`similarity`] treats mismatched lengths as unrelated.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Build from raw bits, most significant bit first (row-major cell order).
    pub fn from_bits(bits: u64) -> Self {
        Self(format!("{bits:064b}"))
    }

    /// Parse a binary string. Returns `None` on any char other than `0`/`1`.
    pub fn parse(s: &str) -> Option<Self> {
        if s.is_empty() || !s.chars().all(|c| c == '0' || c == '1') {
            return None;
        }
        Some(Self(s.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Number of differing positions, or `None` if lengths differ.
    pub fn hamming_distance(&self, other: &Fingerprint) -> Option<usize> {
        if self.0.len() != other.0.len() {
            return None;
        }
        Some(
            self.0
                .bytes()
                .zip(other.0.bytes())
                .filter(|(a, b)| a != b)
                .count(),
        )
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Decode encoded image bytes into RGB pixels.
pub fn decode(bytes: &[u8]) -> Result<RgbImage, DecodeError> {
    let img = image::load_from_memory(bytes)?.to_rgb8();
    if img.width() == 0 || img.height() == 0 {
        return Err(DecodeError {
            reason: "image has no pixels".into(),
        });
    }
    Ok(img)
}

/// [`decode`] on the blocking pool; decoding large images is CPU-bound.
pub async fn decode_blocking(bytes: Vec<u8>) -> Result<RgbImage, DecodeError> {
    tokio::task::spawn_blocking(move || decode(&bytes))
        .await
        .map_err(|e| DecodeError {
            reason: format!("decode task failed: {e}"),
        })?
}

/// Average-hash of already decoded pixels.
pub fn fingerprint_image(img: &RgbImage) -> Fingerprint {
    let grid = imageops::thumbnail(img, GRID, GRID);
    let luma: Vec<f64> = grid
        .pixels()
        .map(|p| {
            let [r, g, b] = p.0.map(f64::from);
            0.299 * r + 0.587 * g + 0.114 * b
        })
        .collect();
    let mean = luma.iter().sum::<f64>() / luma.len() as f64;

    Fingerprint(
        luma.iter()
            .map(|&l| if l > mean { '1' } else { '0' })
            .collect(),
    )
}

/// Compute the average-hash of encoded image bytes.
pub fn fingerprint(bytes: &[u8]) -> Result<Fingerprint, DecodeError> {
    decode(bytes).map(|img| fingerprint_image(&img))
}

pub async fn fingerprint_blocking(bytes: Vec<u8>) -> Result<Fingerprint, DecodeError> {
    decode_blocking(bytes).await.map(|img| fingerprint_image(&img))
}

/// Similarity in percent: `100 * (1 - hamming / len)`. Zero when lengths differ.
pub fn similarity(a: &Fingerprint, b: &Fingerprint) -> f64 {
    match a.hamming_distance(b) {
        Some(_) if a.is_empty() => 0.0,
        Some(distance) => 100.0 * (1.0 - distance as f64 / a.len() as f64),
        None => 0.0,
    }
}

/// Fingerprint `bytes` and test it against every banned fingerprint.
pub async fn is_banned(
    bytes: Vec<u8>,
    registry: &BannedImageRegistry,
) -> Result<bool, DecodeError> {
    let img = decode_blocking(bytes).await?;
    Ok(is_banned_image(&img, registry).await)
}

/// Like [`is_banned`] for pixels the caller already decoded.
///
/// The first entry at or above [`BAN_SIMILARITY_THRESHOLD`] short-circuits.
pub async fn is_banned_image(img: &RgbImage, registry: &BannedImageRegistry) -> bool {
    let hit = registry.find_match(&fingerprint_image(img)).await;
    if let Some(m) = &hit {
        debug!(index = m.index, similarity = m.similarity, "Banned image match");
    }
    hit.is_some()
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageFormat, Rgb};
    use std::io::Cursor;

    fn encode(img: &RgbImage) -> Vec<u8> {
        let mut buf = Cursor::new(Vec::new());
        img.write_to(&mut buf, ImageFormat::Png).unwrap();
        buf.into_inner()
    }

    /// Left half white, right half black.
    fn split_image(size: u32) -> RgbImage {
        RgbImage::from_fn(size, size, |x, _| {
            if x < size / 2 {
                Rgb([255, 255, 255])
            } else {
                Rgb([0, 0, 0])
            }
        })
    }

    fn flip_bits(fp: &Fingerprint, n: usize) -> Fingerprint {
        let flipped: String = fp
            .as_str()
            .chars()
            .enumerate()
            .map(|(i, c)| match (i < n, c) {
                (true, '0') => '1',
                (true, _) => '0',
                (false, c) => c,
            })
            .collect();
        Fingerprint::parse(&flipped).unwrap()
    }

    #[test]
    fn split_image_hash_is_row_major() {
        let hash = fingerprint(&encode(&split_image(64))).unwrap();
        assert_eq!(hash.len(), FINGERPRINT_BITS);
        assert_eq!(hash.as_str(), "11110000".repeat(8));
    }

    #[test]
    fn hash_is_stable_across_resizes() {
        let small = fingerprint(&encode(&split_image(16))).unwrap();
        let large = fingerprint(&encode(&split_image(400))).unwrap();
        assert_eq!(small, large);
    }

    #[test]
    fn hash_works_on_images_smaller_than_grid() {
        let img = RgbImage::from_fn(3, 5, |x, _| Rgb([(x * 100) as u8, 0, 0]));
        let hash = fingerprint(&encode(&img)).unwrap();
        assert_eq!(hash.len(), FINGERPRINT_BITS);
    }

    #[test]
    fn uniform_image_hashes_to_zeros() {
        let img = RgbImage::from_pixel(32, 32, Rgb([0, 0, 0]));
        let hash = fingerprint(&encode(&img)).unwrap();
        assert_eq!(hash.as_str(), "0".repeat(64));
    }

    #[test]
    fn garbage_bytes_fail_to_decode() {
        assert!(fingerprint(b"definitely not an image").is_err());
    }

    #[test]
    fn similarity_with_self_is_100() {
        for bits in [0u64, u64::MAX, 0xDEAD_BEEF_0BAD_F00D] {
            let h = Fingerprint::from_bits(bits);
            assert_eq!(similarity(&h, &h), 100.0);
        }
    }

    #[test]
    fn similarity_is_symmetric() {
        let a = Fingerprint::from_bits(0xF0F0_F0F0_0000_FFFF);
        let b = Fingerprint::from_bits(0x0FF0_F0F0_1234_FFFF);
        assert_eq!(similarity(&a, &b), similarity(&b, &a));
    }

    #[test]
    fn similarity_of_different_lengths_is_zero() {
        let a = Fingerprint::parse("0101").unwrap();
        let b = Fingerprint::parse("01010").unwrap();
        assert_eq!(similarity(&a, &b), 0.0);
    }

    #[test]
    fn similarity_steps_by_one_sixty_fourth() {
        let base = Fingerprint::from_bits(0xAAAA_5555_AAAA_5555);
        assert_eq!(similarity(&base, &flip_bits(&base, 9)), 85.9375);
        assert_eq!(similarity(&base, &flip_bits(&base, 10)), 84.375);
    }

    #[test]
    fn decoded_and_encoded_paths_agree() {
        let bytes = encode(&split_image(48));
        let img = decode(&bytes).unwrap();
        assert_eq!(fingerprint_image(&img), fingerprint(&bytes).unwrap());
    }

    #[test]
    fn parse_rejects_non_binary() {
        assert!(Fingerprint::parse("01x1").is_none());
        assert!(Fingerprint::parse("").is_none());
        assert!(Fingerprint::parse("0110").is_some());
    }

    #[tokio::test]
    async fn is_banned_against_registry() {
        let dir = tempfile::TempDir::new().unwrap();
        let reg = BannedImageRegistry::open(dir.path().join("banned_images.json")).await;
        let bytes = encode(&split_image(64));

        assert!(!is_banned(bytes.clone(), &reg).await.unwrap());
        reg.add(fingerprint(&bytes).unwrap()).await.unwrap();
        assert!(is_banned(bytes, &reg).await.unwrap());
    }

    #[tokio::test]
    async fn is_banned_image_uses_decoded_pixels() {
        let dir = tempfile::TempDir::new().unwrap();
        let reg = BannedImageRegistry::open(dir.path().join("banned_images.json")).await;
        let img = split_image(64);
        reg.add(fingerprint_image(&img)).await.unwrap();

        assert!(is_banned_image(&img, &reg).await);
        let inverted = RgbImage::from_fn(64, 64, |x, y| {
            let [r, g, b] = img.get_pixel(x, y).0;
            Rgb([255 - r, 255 - g, 255 - b])
        });
        assert!(!is_banned_image(&inverted, &reg).await);
    }

    #[tokio::test]
    async fn is_banned_propagates_decode_error() {
        let dir = tempfile::TempDir::new().unwrap();
        let reg = BannedImageRegistry::open(dir.path().join("banned_images.json")).await;
        assert!(is_banned(b"junk".to_vec(), &reg).await.is_err());
    }
}

use super::Frame;
use anyhow::{Context, Result};
use image::imageops::{self, FilterType};
use img_hash::{HashAlg, Hasher, HasherConfig, image as img_hash_image};
use serde::{Deserialize, Serialize};

/// Side length every frame is resized to before pixel comparison
pub const COMPARISON_SIZE: u32 = 256;

/// Resize a frame to a fixed square so that source resolution never affects a score.
pub fn normalize_frame(frame: &Frame, size: u32) -> Result<Frame> {
    if frame.width() == 0 || frame.height() == 0 {
        anyhow::bail!("Cannot normalize an empty frame");
    }

    if frame.width() == size && frame.height() == size {
        return Ok(frame.clone());
    }

    Ok(imageops::resize(frame, size, size, FilterType::Triangle))
}

/// Fixed-length bit vector derived from one frame
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PerceptualHash(Vec<u8>);

impl PerceptualHash {
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn bit_len(&self) -> u32 {
        self.0.len() as u32 * 8
    }

    pub fn distance(&self, other: &PerceptualHash) -> Result<u32> {
        hamming_distance(&self.0, &other.0)
    }
}

/// 64-bit DCT hash (pHash): 8x8 low-frequency block of a 16x16 downscale.
pub fn phash_hasher() -> Hasher {
    HasherConfig::new()
        .hash_alg(HashAlg::Mean)
        .preproc_dct()
        .hash_size(8, 8)
        .to_hasher()
}

pub fn generate_perceptual_hash(hasher: &Hasher, frame: &Frame) -> Result<PerceptualHash> {
    let (width, height) = frame.dimensions();
    if width == 0 || height == 0 {
        anyhow::bail!("Cannot hash an empty frame");
    }

    // img_hash carries its own image version, so the pixels are moved across by buffer
    let buffer = img_hash_image::RgbImage::from_raw(width, height, frame.as_raw().clone())
        .context("Failed to create hash buffer from frame")?;
    let dynamic_img = img_hash_image::DynamicImage::ImageRgb8(buffer);

    let hash = hasher.hash_image(&dynamic_img);

    Ok(PerceptualHash(hash.as_bytes().to_vec()))
}

/// Hash each frame, dropping frames that fail to hash.
pub fn hash_frames(frames: &[Frame]) -> Vec<PerceptualHash> {
    let hasher = phash_hasher();

    frames
        .iter()
        .enumerate()
        .filter_map(|(index, frame)| match generate_perceptual_hash(&hasher, frame) {
            Ok(hash) => Some(hash),
            Err(e) => {
                log::debug!("Dropping frame {} from hash list: {:#}", index, e);
                None
            }
        })
        .collect()
}

pub fn hamming_distance(hash1: &[u8], hash2: &[u8]) -> Result<u32> {
    if hash1.len() != hash2.len() {
        anyhow::bail!("Hashes must be the same length");
    }
    let mut distance = 0u32;
    for (byte1, byte2) in hash1.iter().zip(hash2.iter()) {
        let xor = byte1 ^ byte2;

        distance += xor.count_ones();
    }

    Ok(distance)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    fn noise_frame(seed: u32, width: u32, height: u32) -> Frame {
        let mut state = seed.wrapping_mul(2_654_435_761).wrapping_add(1);
        Frame::from_fn(width, height, |_, _| {
            state = state.wrapping_mul(1_103_515_245).wrapping_add(12_345);
            let v = (state >> 16) as u8;
            Rgb([v, v, v])
        })
    }

    #[test]
    fn test_hamming_distance() {
        let hash1 = vec![0b11110000, 0b10101010];
        let hash2 = vec![0b11110000, 0b10101010];
        assert_eq!(hamming_distance(&hash1, &hash2).unwrap(), 0);

        let hash3 = vec![0b11110000, 0b00000000];
        let hash4 = vec![0b00001111, 0b11111111];
        assert_eq!(hamming_distance(&hash3, &hash4).unwrap(), 16);

        assert!(hamming_distance(&[0u8], &[0u8, 1u8]).is_err());
    }

    #[test]
    fn test_phash_is_64_bits_and_stable() {
        let hasher = phash_hasher();
        let frame = noise_frame(7, 64, 48);

        let a = generate_perceptual_hash(&hasher, &frame).unwrap();
        let b = generate_perceptual_hash(&hasher, &frame).unwrap();

        assert_eq!(a.bit_len(), 64);
        assert_eq!(a.distance(&b).unwrap(), 0);
    }

    #[test]
    fn test_empty_frames_are_dropped() {
        let frames = vec![noise_frame(1, 32, 32), Frame::new(0, 0), noise_frame(2, 32, 32)];
        assert_eq!(hash_frames(&frames).len(), 2);
    }

    #[test]
    fn test_normalize_frame_resizes() {
        let frame = noise_frame(3, 100, 40);
        let normalized = normalize_frame(&frame, COMPARISON_SIZE).unwrap();
        assert_eq!(normalized.dimensions(), (COMPARISON_SIZE, COMPARISON_SIZE));
        assert!(normalize_frame(&Frame::new(0, 10), 16).is_err());
    }
}

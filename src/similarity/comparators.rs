//! Single-frame similarity kernels.
//!
//! Every comparator scores a frame pair in `[0, 1]` where 1.0 means identical.
//! Frames are resized to a common resolution first, so source resolution never
//! leaks into a score.

use super::Frame;
use super::hash::{COMPARISON_SIZE, normalize_frame};
use anyhow::Result;
use std::f64::consts::PI;

pub const HISTOGRAM: &str = "histogram";
pub const PERCEPTUAL_HASH: &str = "perceptual_hash";

pub trait FrameComparator: Send + Sync {
    fn name(&self) -> &'static str;

    fn compare(&self, frame_a: &Frame, frame_b: &Frame) -> Result<f64>;

    /// Like `compare`, but any failure scores 0.0.
    fn score(&self, frame_a: &Frame, frame_b: &Frame) -> f64 {
        match self.compare(frame_a, frame_b) {
            Ok(score) => score.clamp(0.0, 1.0),
            Err(e) => {
                log::warn!("{} comparator failed: {:#}", self.name(), e);
                0.0
            }
        }
    }
}

/// The closed set of built-in comparators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComparatorKind {
    Histogram,
    PerceptualHashDct,
}

impl ComparatorKind {
    pub fn build(self) -> Box<dyn FrameComparator> {
        match self {
            ComparatorKind::Histogram => Box::new(HistogramComparator::default()),
            ComparatorKind::PerceptualHashDct => Box::new(DctHashComparator::default()),
        }
    }
}

/// Correlation of 2D hue/saturation histograms
#[derive(Debug, Clone)]
pub struct HistogramComparator {
    pub hue_bins: usize,
    pub saturation_bins: usize,
}

impl Default for HistogramComparator {
    fn default() -> Self {
        Self {
            hue_bins: 50,
            saturation_bins: 50,
        }
    }
}

impl HistogramComparator {
    fn histogram(&self, frame: &Frame) -> Result<Vec<f64>> {
        let normalized = normalize_frame(frame, COMPARISON_SIZE)?;
        let mut bins = vec![0.0f64; self.hue_bins * self.saturation_bins];

        for pixel in normalized.pixels() {
            let (hue, saturation) = hue_saturation(pixel.0);
            let h = ((hue / 180.0) * self.hue_bins as f64) as usize;
            let s = ((saturation / 256.0) * self.saturation_bins as f64) as usize;
            let h = h.min(self.hue_bins - 1);
            let s = s.min(self.saturation_bins - 1);
            bins[h * self.saturation_bins + s] += 1.0;
        }

        min_max_normalize(&mut bins);
        Ok(bins)
    }
}

impl FrameComparator for HistogramComparator {
    fn name(&self) -> &'static str {
        HISTOGRAM
    }

    fn compare(&self, frame_a: &Frame, frame_b: &Frame) -> Result<f64> {
        if self.hue_bins == 0 || self.saturation_bins == 0 {
            anyhow::bail!("Histogram needs at least one bin per channel");
        }

        let hist_a = self.histogram(frame_a)?;
        let hist_b = self.histogram(frame_b)?;
        let corr = correlation(&hist_a, &hist_b);

        Ok(((corr + 1.0) / 2.0).max(0.0))
    }
}

/// 8-bit HSV conversion: hue in [0, 180), saturation in [0, 255].
fn hue_saturation([r, g, b]: [u8; 3]) -> (f64, f64) {
    let (r, g, b) = (r as f64, g as f64, b as f64);
    let max = r.max(g).max(b);
    let min = r.min(g).min(b);
    let delta = max - min;

    let saturation = if max > 0.0 { delta / max * 255.0 } else { 0.0 };

    if delta == 0.0 {
        return (0.0, saturation);
    }

    let mut hue = if max == r {
        60.0 * (g - b) / delta
    } else if max == g {
        120.0 + 60.0 * (b - r) / delta
    } else {
        240.0 + 60.0 * (r - g) / delta
    };
    if hue < 0.0 {
        hue += 360.0;
    }

    (hue / 2.0, saturation)
}

fn min_max_normalize(values: &mut [f64]) {
    let min = values.iter().copied().fold(f64::INFINITY, f64::min);
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let range = max - min;

    for v in values.iter_mut() {
        *v = if range > 0.0 { (*v - min) / range } else { 0.0 };
    }
}

/// Pearson correlation. Degenerate (zero-variance) inputs correlate fully
/// only when they are equal.
fn correlation(a: &[f64], b: &[f64]) -> f64 {
    let n = a.len() as f64;
    let mean_a = a.iter().sum::<f64>() / n;
    let mean_b = b.iter().sum::<f64>() / n;

    let mut cov = 0.0;
    let mut var_a = 0.0;
    let mut var_b = 0.0;
    for (x, y) in a.iter().zip(b) {
        let dx = x - mean_a;
        let dy = y - mean_b;
        cov += dx * dy;
        var_a += dx * dx;
        var_b += dy * dy;
    }

    let denom = (var_a * var_b).sqrt();
    if denom <= f64::EPSILON {
        return if a == b { 1.0 } else { 0.0 };
    }

    (cov / denom).clamp(-1.0, 1.0)
}

/// Inline DCT hash: grayscale downscale, 2D DCT, low-frequency block
/// thresholded against its AC mean.
#[derive(Debug, Clone)]
pub struct DctHashComparator {
    /// Side of the grayscale square the DCT runs on.
    pub input_size: usize,
    /// Side of the low-frequency block kept for the hash.
    pub block_size: usize,
}

impl Default for DctHashComparator {
    fn default() -> Self {
        Self {
            input_size: 16,
            block_size: 8,
        }
    }
}

impl DctHashComparator {
    /// One bit per AC coefficient of the low-frequency block. The DC term
    /// only shifts overall brightness and is left out.
    pub fn hash(&self, frame: &Frame) -> Result<Vec<bool>> {
        if self.block_size < 2 || self.block_size > self.input_size {
            anyhow::bail!(
                "Invalid DCT block {} for input {}",
                self.block_size,
                self.input_size
            );
        }

        let small = normalize_frame(frame, self.input_size as u32)?;
        let gray: Vec<f64> = small
            .pixels()
            .map(|p| 0.299 * p.0[0] as f64 + 0.587 * p.0[1] as f64 + 0.114 * p.0[2] as f64)
            .collect();

        let block = dct_low_block(&gray, self.input_size, self.block_size);
        let ac = &block[1..];
        let mean = ac.iter().sum::<f64>() / ac.len() as f64;

        Ok(ac.iter().map(|&c| c > mean).collect())
    }
}

impl FrameComparator for DctHashComparator {
    fn name(&self) -> &'static str {
        PERCEPTUAL_HASH
    }

    fn compare(&self, frame_a: &Frame, frame_b: &Frame) -> Result<f64> {
        let hash_a = self.hash(frame_a)?;
        let hash_b = self.hash(frame_b)?;

        if hash_a.is_empty() || hash_a.len() != hash_b.len() {
            anyhow::bail!("DCT hashes differ in length");
        }

        let distance = hash_a.iter().zip(&hash_b).filter(|(a, b)| a != b).count();
        Ok((1.0 - distance as f64 / hash_a.len() as f64).max(0.0))
    }
}

/// Orthonormal 2D DCT-II of an `n x n` row-major block, returning only the
/// top-left `k x k` coefficients in row-major order.
fn dct_low_block(input: &[f64], n: usize, k: usize) -> Vec<f64> {
    let cos_table: Vec<f64> = (0..k)
        .flat_map(|u| {
            (0..n).map(move |x| (PI * (2 * x + 1) as f64 * u as f64 / (2 * n) as f64).cos())
        })
        .collect();
    let scale = |u: usize| {
        if u == 0 {
            (1.0 / n as f64).sqrt()
        } else {
            (2.0 / n as f64).sqrt()
        }
    };

    // rows first: n rows x k frequencies
    let mut rows = vec![0.0; n * k];
    for y in 0..n {
        for u in 0..k {
            let sum: f64 = (0..n)
                .map(|x| input[y * n + x] * cos_table[u * n + x])
                .sum();
            rows[y * k + u] = scale(u) * sum;
        }
    }

    let mut out = vec![0.0; k * k];
    for v in 0..k {
        for u in 0..k {
            let sum: f64 = (0..n).map(|y| rows[y * k + u] * cos_table[v * n + y]).sum();
            out[v * k + u] = scale(v) * sum;
        }
    }

    out
}

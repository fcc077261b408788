//! Perceptual hash comparison of videos.
//!
//! Two scoring functions live here:
//! [`PerceptualHashEngine::compare`] averages a continuous best-match
//! similarity, while [`PerceptualHashEngine::find_candidates`] counts how many
//! frames have any match within a fixed hamming cutoff. Both are driven by the
//! shorter of the two hash lists.

use super::hash::{PerceptualHash, hash_frames};
use super::sampler::FrameSampler;
use super::video::FrameSource;
use super::{
    Evidence, FrameComparisonResult, FramesExtracted, PairwiseResult, SimilarityPair,
    canonical_pair,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

pub const PHASH_SCORE: &str = "phash";

/// Best match of one hash from the shorter list
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HashMatch {
    /// Index into the shorter list.
    pub short_index: usize,
    /// Index of the closest hash in the longer list.
    pub long_index: Option<usize>,
    pub hamming_distance: Option<u32>,
    pub similarity: f64,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct HashComparison {
    pub similarity: f64,
    pub frame_comparisons: Vec<HashMatch>,
    pub hashes: FramesExtracted,
    /// Whether video A supplied the shorter list.
    pub short_is_a: bool,
}

impl From<HashComparison> for PairwiseResult {
    fn from(comparison: HashComparison) -> Self {
        let frame_comparisons = comparison
            .frame_comparisons
            .iter()
            .map(|m| {
                let (frame_a, frame_b) = if comparison.short_is_a {
                    (Some(m.short_index), m.long_index)
                } else {
                    (m.long_index, Some(m.short_index))
                };
                FrameComparisonResult {
                    frame_a,
                    frame_b,
                    scores: BTreeMap::from([(PHASH_SCORE.to_string(), m.similarity)]),
                    overall: m.similarity,
                }
            })
            .collect();

        let error = if comparison.hashes.video_a == 0 || comparison.hashes.video_b == 0 {
            Some("No frame hashes could be computed for one of the videos".to_string())
        } else {
            None
        };

        PairwiseResult {
            similarity: comparison.similarity,
            frame_comparisons,
            frames_extracted: comparison.hashes,
            error,
        }
    }
}

/// A pair accepted by the coverage search
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HashCandidate {
    pub path_a: PathBuf,
    pub path_b: PathBuf,
    pub match_ratio: f64,
    pub matched: usize,
    pub compared: usize,
}

/// Hamming-distance matching of per-frame pHashes.
pub struct PerceptualHashEngine<S: FrameSource> {
    sampler: FrameSampler<S>,
    frame_count: usize,
    hamming_threshold: u32,
}

impl<S: FrameSource> PerceptualHashEngine<S> {
    pub fn new(sampler: FrameSampler<S>, frame_count: usize, hamming_threshold: u32) -> Self {
        Self {
            sampler,
            frame_count,
            hamming_threshold,
        }
    }

    pub fn hamming_threshold(&self) -> u32 {
        self.hamming_threshold
    }

    /// Sample and hash a video. Frames that fail to hash are dropped.
    pub fn video_hashes(&self, path: &Path, frame_count: usize) -> Vec<PerceptualHash> {
        let frames = self.sampler.sample(path, frame_count);
        let hashes = hash_frames(&frames);
        log::debug!("Computed {} hashes for {:?}", hashes.len(), path);
        hashes
    }

    /// Continuous similarity: mean over the shorter list of
    /// `1 - min_distance / bits` against the longer list.
    pub fn compare(&self, video_a: &Path, video_b: &Path, frame_count: usize) -> HashComparison {
        let hashes_a = self.video_hashes(video_a, frame_count);
        let hashes_b = self.video_hashes(video_b, frame_count);
        compare_hashes(&hashes_a, &hashes_b)
    }

    /// Hash every path once.
    pub fn hash_videos(&self, video_paths: &[PathBuf]) -> HashMap<PathBuf, Vec<PerceptualHash>> {
        let mut hashes = HashMap::new();
        for path in video_paths {
            if !hashes.contains_key(path) {
                hashes.insert(path.clone(), self.video_hashes(path, self.frame_count));
            }
        }
        hashes
    }

    /// Coverage search over every unordered pair of `video_paths`, sorted by
    /// descending match ratio.
    pub fn find_candidates(&self, video_paths: &[PathBuf], threshold: f64) -> Vec<HashCandidate> {
        let hashes = self.hash_videos(video_paths);

        let mut candidates = Vec::new();
        for i in 0..video_paths.len() {
            for j in i + 1..video_paths.len() {
                if let Some(candidate) =
                    self.score_pair(&hashes, &video_paths[i], &video_paths[j], threshold)
                {
                    candidates.push(candidate);
                }
            }
        }

        sort_candidates(&mut candidates);
        candidates
    }

    /// Coverage-score one pair from precomputed hash lists. `None` when the
    /// pair misses the threshold or either video has no hashes.
    pub fn score_pair(
        &self,
        hashes: &HashMap<PathBuf, Vec<PerceptualHash>>,
        a: &Path,
        b: &Path,
        threshold: f64,
    ) -> Option<HashCandidate> {
        let coverage = hash_coverage(hashes.get(a)?, hashes.get(b)?, self.hamming_threshold)?;
        log::debug!(
            "{:?} vs {:?}: {}/{} frames within {} bits",
            a,
            b,
            coverage.matched,
            coverage.compared,
            self.hamming_threshold
        );

        if coverage.match_ratio < threshold {
            return None;
        }

        let (path_a, path_b) = canonical_pair(a, b);
        Some(HashCandidate {
            path_a,
            path_b,
            match_ratio: coverage.match_ratio,
            matched: coverage.matched,
            compared: coverage.compared,
        })
    }
}

impl HashCandidate {
    pub fn into_pair(self, hamming_threshold: u32) -> SimilarityPair {
        SimilarityPair {
            path_a: self.path_a,
            path_b: self.path_b,
            score: self.match_ratio,
            evidence: Evidence::HashCoverage {
                matched: self.matched,
                compared: self.compared,
                hamming_threshold,
            },
        }
    }
}

/// Split two hash lists into (shorter, longer); ties keep the first as shorter.
fn short_long<'a>(
    a: &'a [PerceptualHash],
    b: &'a [PerceptualHash],
) -> (&'a [PerceptualHash], &'a [PerceptualHash]) {
    if a.len() <= b.len() { (a, b) } else { (b, a) }
}

pub fn compare_hashes(hashes_a: &[PerceptualHash], hashes_b: &[PerceptualHash]) -> HashComparison {
    let counts = FramesExtracted {
        video_a: hashes_a.len(),
        video_b: hashes_b.len(),
    };

    if hashes_a.is_empty() || hashes_b.is_empty() {
        return HashComparison {
            hashes: counts,
            ..HashComparison::default()
        };
    }

    let (short, long) = short_long(hashes_a, hashes_b);
    let short_is_a = hashes_a.len() <= hashes_b.len();

    let frame_comparisons: Vec<HashMatch> = short
        .iter()
        .enumerate()
        .map(|(short_index, hash)| {
            let best = long
                .iter()
                .enumerate()
                .filter_map(|(j, other)| hash.distance(other).ok().map(|d| (j, d)))
                .min_by_key(|&(_, d)| d);

            match best {
                Some((long_index, distance)) => HashMatch {
                    short_index,
                    long_index: Some(long_index),
                    hamming_distance: Some(distance),
                    similarity: (1.0 - distance as f64 / hash.bit_len() as f64).clamp(0.0, 1.0),
                },
                None => HashMatch {
                    short_index,
                    long_index: None,
                    hamming_distance: None,
                    similarity: 0.0,
                },
            }
        })
        .collect();

    let similarity =
        frame_comparisons.iter().map(|m| m.similarity).sum::<f64>() / frame_comparisons.len() as f64;

    HashComparison {
        similarity,
        frame_comparisons,
        hashes: counts,
        short_is_a,
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Coverage {
    pub matched: usize,
    pub compared: usize,
    pub match_ratio: f64,
}

/// Fraction of the shorter list having some hash of the longer list within
/// `max_distance` bits. `None` when either list is empty.
pub fn hash_coverage(
    hashes_a: &[PerceptualHash],
    hashes_b: &[PerceptualHash],
    max_distance: u32,
) -> Option<Coverage> {
    if hashes_a.is_empty() || hashes_b.is_empty() {
        return None;
    }

    let (short, long) = short_long(hashes_a, hashes_b);
    let matched = short
        .iter()
        .filter(|hash| {
            long.iter()
                .any(|other| matches!(hash.distance(other), Ok(d) if d <= max_distance))
        })
        .count();

    Some(Coverage {
        matched,
        compared: short.len(),
        match_ratio: matched as f64 / short.len() as f64,
    })
}

/// Descending by match ratio; equal ratios keep discovery order.
pub fn sort_candidates(candidates: &mut [HashCandidate]) {
    candidates.sort_by(|a, b| b.match_ratio.total_cmp(&a.match_ratio));
}

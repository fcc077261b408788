pub mod aggregator;
pub mod background;
pub mod cache;
pub mod comparators;
pub mod config;
pub mod engine;
pub mod fingerprint;
pub mod grouping;
pub mod hash;
pub mod pairwise;
pub mod phash_engine;
pub mod prefilter;
pub mod sampler;
pub mod scanner;
pub mod video;
pub mod worker;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// A decoded RGB raster. Produced by the sampler, consumed by comparators.
pub type Frame = image::RgbImage;

/// Stream-level facts about a video container
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct VideoMetadata {
    pub width: u32,
    pub height: u32,
    pub fps: f64,
    pub total_frames: u64,
    /// Zero when the frame rate is unknown.
    pub duration_seconds: f64,
}

impl VideoMetadata {
    /// Build metadata the way the sampler expects it: duration is derived from
    /// the frame count and collapses to zero for an unknown frame rate.
    pub fn new(width: u32, height: u32, fps: f64, total_frames: u64) -> Self {
        let duration_seconds = if fps > 0.0 {
            total_frames as f64 / fps
        } else {
            0.0
        };

        Self {
            width,
            height,
            fps,
            total_frames,
            duration_seconds,
        }
    }
}

/// A video path paired with its resolved metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoHandle {
    pub path: PathBuf,
    pub size_bytes: u64,
    pub metadata: VideoMetadata,
}

/// Scores of one frame pair
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct FrameComparisonResult {
    pub frame_a: Option<usize>,
    pub frame_b: Option<usize>,
    /// Per-algorithm score keyed by comparator name.
    pub scores: BTreeMap<String, f64>,
    pub overall: f64,
}

impl FrameComparisonResult {
    /// Slot for a frame that only one side could provide.
    pub fn missing(frame_a: Option<usize>, frame_b: Option<usize>) -> Self {
        Self {
            frame_a,
            frame_b,
            scores: BTreeMap::new(),
            overall: 0.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FramesExtracted {
    pub video_a: usize,
    pub video_b: usize,
}

/// Outcome of comparing two videos
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PairwiseResult {
    pub similarity: f64,
    pub frame_comparisons: Vec<FrameComparisonResult>,
    pub frames_extracted: FramesExtracted,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl PairwiseResult {
    /// A zero-similarity result carrying an explicit error marker.
    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            error: Some(error.into()),
            ..Self::default()
        }
    }
}

/// Why a pair was reported
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Evidence {
    ExactDuplicate,
    Frames(PairwiseResult),
    HashCoverage {
        matched: usize,
        compared: usize,
        hamming_threshold: u32,
    },
}

/// An unordered pair of similar videos, stored with `path_a <= path_b`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimilarityPair {
    pub path_a: PathBuf,
    pub path_b: PathBuf,
    pub score: f64,
    pub evidence: Evidence,
}

impl SimilarityPair {
    pub fn new(a: &Path, b: &Path, score: f64, evidence: Evidence) -> Self {
        let (path_a, path_b) = canonical_pair(a, b);
        Self {
            path_a,
            path_b,
            score,
            evidence,
        }
    }

    pub fn key(&self) -> (PathBuf, PathBuf) {
        (self.path_a.clone(), self.path_b.clone())
    }

    pub fn involves(&self, path: &Path) -> bool {
        self.path_a == path || self.path_b == path
    }
}

/// Order two paths so that the same unordered pair always yields the same key.
pub fn canonical_pair(a: &Path, b: &Path) -> (PathBuf, PathBuf) {
    if a <= b {
        (a.to_path_buf(), b.to_path_buf())
    } else {
        (b.to_path_buf(), a.to_path_buf())
    }
}

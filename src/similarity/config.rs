use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_FRAME_SAMPLES: usize = 10;
pub const DEFAULT_FAST_FRAME_SAMPLES: usize = 30;
pub const DEFAULT_HAMMING_THRESHOLD: u32 = 12;
pub const DEFAULT_SIMILARITY_THRESHOLD: f64 = 0.7;
pub const MAX_FRAME_SAMPLES: usize = 50;

const WEIGHT_TOLERANCE: f64 = 1e-3;

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("comparator weights must sum to 1.0, got {sum}")]
    WeightSum { sum: f64 },

    #[error("comparator weight for {name} must be non-negative, got {weight}")]
    NegativeWeight { name: String, weight: f64 },

    #[error("similarity threshold must be within [0.1, 1.0], got {0}")]
    Threshold(f64),

    #[error("{name} must be within 1..={max}, got {value}")]
    FrameCount {
        name: &'static str,
        value: usize,
        max: usize,
    },

    #[error("prefilter ratio {name} must be within (0, 1], got {value}")]
    PrefilterRatio { name: &'static str, value: f64 },

    #[error("hamming threshold must be at most 64 bits, got {0}")]
    HammingThreshold(u32),
}

/// Search strategy selectable by name at the orchestrator boundary
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Algorithm {
    /// Index-aligned frame comparison.
    #[default]
    Simple,
    /// Best-match frame comparison.
    Thorough,
    /// Perceptual hash coverage.
    #[serde(rename = "phash")]
    PerceptualHash,
    /// Embedding index. Declared but not implemented.
    CnnFaiss,
}

impl Algorithm {
    pub fn as_str(&self) -> &'static str {
        match self {
            Algorithm::Simple => "simple",
            Algorithm::Thorough => "thorough",
            Algorithm::PerceptualHash => "phash",
            Algorithm::CnnFaiss => "cnn_faiss",
        }
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Algorithm {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "simple" => Ok(Algorithm::Simple),
            "thorough" => Ok(Algorithm::Thorough),
            "phash" => Ok(Algorithm::PerceptualHash),
            "cnn_faiss" => Ok(Algorithm::CnnFaiss),
            other => Err(format!("unknown algorithm: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ComparatorWeights {
    pub histogram: f64,
    pub phash: f64,
}

impl Default for ComparatorWeights {
    fn default() -> Self {
        Self {
            histogram: 0.4,
            phash: 0.6,
        }
    }
}

impl ComparatorWeights {
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_weights(&[("histogram", self.histogram), ("phash", self.phash)])
    }
}

/// Reject negative weights and weights whose sum is not 1.0.
pub fn validate_weights(weights: &[(&str, f64)]) -> Result<(), ConfigError> {
    for (name, weight) in weights {
        if !weight.is_finite() || *weight < 0.0 {
            return Err(ConfigError::NegativeWeight {
                name: name.to_string(),
                weight: *weight,
            });
        }
    }

    let sum: f64 = weights.iter().map(|(_, w)| w).sum();
    if (sum - 1.0).abs() > WEIGHT_TOLERANCE {
        return Err(ConfigError::WeightSum { sum });
    }

    Ok(())
}

/// Minimum min/max ratios a pair must reach to stay a candidate.
/// Raising a ratio makes the filter stricter.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PrefilterTolerance {
    pub size_ratio: f64,
    pub duration_ratio: f64,
    pub width_ratio: f64,
}

impl Default for PrefilterTolerance {
    fn default() -> Self {
        Self {
            size_ratio: 0.5,
            duration_ratio: 0.7,
            width_ratio: 0.7,
        }
    }
}

impl PrefilterTolerance {
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, value) in [
            ("size_ratio", self.size_ratio),
            ("duration_ratio", self.duration_ratio),
            ("width_ratio", self.width_ratio),
        ] {
            if !(value > 0.0 && value <= 1.0) {
                return Err(ConfigError::PrefilterRatio { name, value });
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchConfig {
    pub algorithm: Algorithm,
    /// Frames sampled per video for pairwise comparison.
    pub frame_samples: usize,
    /// Frames sampled per video by the perceptual hash fast path.
    pub fast_frame_samples: usize,
    /// Maximum hamming distance (out of 64 bits) that counts as a frame match.
    pub hamming_threshold: u32,
    pub weights: ComparatorWeights,
    pub similarity_threshold: f64,
    pub prefilter: PrefilterTolerance,
    /// Fan out deep comparison over rayon's pool.
    pub parallel: bool,
    pub frame_cache_capacity: usize,
    pub worker_timeout: Duration,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            algorithm: Algorithm::default(),
            frame_samples: DEFAULT_FRAME_SAMPLES,
            fast_frame_samples: DEFAULT_FAST_FRAME_SAMPLES,
            hamming_threshold: DEFAULT_HAMMING_THRESHOLD,
            weights: ComparatorWeights::default(),
            similarity_threshold: DEFAULT_SIMILARITY_THRESHOLD,
            prefilter: PrefilterTolerance::default(),
            parallel: false,
            frame_cache_capacity: 50,
            worker_timeout: Duration::from_secs(600),
        }
    }
}

impl SearchConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.weights.validate()?;
        validate_threshold(self.similarity_threshold)?;
        validate_frame_count("frame_samples", self.frame_samples)?;
        validate_frame_count("fast_frame_samples", self.fast_frame_samples)?;
        self.prefilter.validate()?;

        if self.hamming_threshold > 64 {
            return Err(ConfigError::HammingThreshold(self.hamming_threshold));
        }

        Ok(())
    }
}

pub fn validate_threshold(threshold: f64) -> Result<(), ConfigError> {
    if !(0.1..=1.0).contains(&threshold) {
        return Err(ConfigError::Threshold(threshold));
    }
    Ok(())
}

fn validate_frame_count(name: &'static str, value: usize) -> Result<(), ConfigError> {
    if value == 0 || value > MAX_FRAME_SAMPLES {
        return Err(ConfigError::FrameCount {
            name,
            value,
            max: MAX_FRAME_SAMPLES,
        });
    }
    Ok(())
}

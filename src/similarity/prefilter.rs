use super::config::PrefilterTolerance;
use super::fingerprint::ContentFingerprint;
use serde::{Deserialize, Serialize};

/// What the prefilter knows about one file, without touching its frames
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct FileMetadata {
    pub size_bytes: u64,
    pub duration_seconds: f64,
    pub width: u32,
    pub height: u32,
    pub fingerprint: Option<ContentFingerprint>,
}

/// Cheap metadata gate in front of frame extraction.
///
/// Lossy: a rejected pair is never compared again, so a resized transcode
/// whose width differs by more than the tolerance is never reported. Only the
/// width is checked; height and aspect ratio are ignored.
#[derive(Debug, Clone, Copy, Default)]
pub struct MetadataPreFilter {
    tolerance: PrefilterTolerance,
}

impl MetadataPreFilter {
    pub fn new(tolerance: PrefilterTolerance) -> Self {
        Self { tolerance }
    }

    pub fn likely_similar(&self, a: &FileMetadata, b: &FileMetadata) -> bool {
        if let (Some(fa), Some(fb)) = (&a.fingerprint, &b.fingerprint) {
            if fa == fb {
                return true;
            }
        }

        if ratio(a.size_bytes as f64, b.size_bytes as f64) < self.tolerance.size_ratio {
            return false;
        }

        if a.duration_seconds > 0.0
            && b.duration_seconds > 0.0
            && ratio(a.duration_seconds, b.duration_seconds) < self.tolerance.duration_ratio
        {
            return false;
        }

        if a.width > 0
            && b.width > 0
            && ratio(a.width as f64, b.width as f64) < self.tolerance.width_ratio
        {
            return false;
        }

        true
    }
}

/// min/max, with two zeros counting as equal.
fn ratio(a: f64, b: f64) -> f64 {
    let max = a.max(b);
    if max <= 0.0 {
        return 1.0;
    }
    a.min(b) / max
}

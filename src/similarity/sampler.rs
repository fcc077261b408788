use super::video::FrameSource;
use super::{Frame, VideoMetadata};
use std::path::Path;
use std::sync::Arc;

/// Frame indices for `n` samples spread evenly over `total_frames`.
///
/// Short videos yield every frame; otherwise the positions are
/// `linspace(0, total_frames - 1, n)` rounded to the nearest index.
pub fn sample_positions(total_frames: u64, n: usize) -> Vec<u64> {
    if n == 0 || total_frames == 0 {
        return Vec::new();
    }

    if total_frames <= n as u64 {
        return (0..total_frames).collect();
    }

    if n == 1 {
        return vec![0];
    }

    let last = (total_frames - 1) as f64;
    let step = last / (n - 1) as f64;

    (0..n)
        .map(|i| ((i as f64 * step).round() as u64).min(total_frames - 1))
        .collect()
}

/// Extracts evenly spaced frames from a video.
///
/// Never fails: an unreadable container, a failed seek or a failed decode
/// just means fewer (possibly zero) frames.
pub struct FrameSampler<S: FrameSource> {
    source: Arc<S>,
}

impl<S: FrameSource> Clone for FrameSampler<S> {
    fn clone(&self) -> Self {
        Self {
            source: Arc::clone(&self.source),
        }
    }
}

impl<S: FrameSource> FrameSampler<S> {
    pub fn new(source: Arc<S>) -> Self {
        Self { source }
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn probe(&self, path: &Path) -> Option<VideoMetadata> {
        match self.source.probe(path) {
            Ok(metadata) => Some(metadata),
            Err(e) => {
                log::warn!("Failed to read video metadata of {:?}: {:#}", path, e);
                None
            }
        }
    }

    pub fn sample(&self, path: &Path, n: usize) -> Vec<Frame> {
        let metadata = match self.probe(path) {
            Some(metadata) => metadata,
            None => return Vec::new(),
        };

        self.sample_with(path, &metadata, n)
    }

    /// Sample using metadata the caller already holds.
    pub fn sample_with(&self, path: &Path, metadata: &VideoMetadata, n: usize) -> Vec<Frame> {
        let positions = sample_positions(metadata.total_frames, n);
        if positions.is_empty() {
            log::debug!("No frames to sample from {:?}", path);
            return Vec::new();
        }

        match self.source.read_frames(path, &positions) {
            Ok(frames) => {
                log::debug!(
                    "Sampled {}/{} frames from {:?}",
                    frames.len(),
                    positions.len(),
                    path
                );
                frames
            }
            Err(e) => {
                log::warn!("Failed to extract frames from {:?}: {:#}", path, e);
                Vec::new()
            }
        }
    }
}

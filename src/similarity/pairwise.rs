use super::aggregator::ComparisonAggregator;
use super::sampler::FrameSampler;
use super::video::FrameSource;
use super::{Frame, FrameComparisonResult, FramesExtracted, PairwiseResult};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;

pub const NO_FRAMES_ERROR: &str = "Failed to extract frames from one of the videos";

/// How sampled frames of two videos are paired up
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PairingStrategy {
    /// Frame i of A against frame i of B. Symmetric.
    #[default]
    IndexAligned,
    /// Each frame of A against its best counterpart in B. Not symmetric.
    BestMatch,
}

/// Compares two videos frame by frame through the aggregator.
pub struct PairwiseVideoComparator<S: FrameSource> {
    sampler: FrameSampler<S>,
    aggregator: Arc<ComparisonAggregator>,
}

impl<S: FrameSource> PairwiseVideoComparator<S> {
    pub fn new(sampler: FrameSampler<S>, aggregator: Arc<ComparisonAggregator>) -> Self {
        Self {
            sampler,
            aggregator,
        }
    }

    pub fn compare(
        &self,
        video_a: &Path,
        video_b: &Path,
        max_frames: usize,
        strategy: PairingStrategy,
    ) -> PairwiseResult {
        let frames_a = self.sampler.sample(video_a, max_frames);
        let frames_b = self.sampler.sample(video_b, max_frames);

        log::debug!(
            "Extracted {} frames from {:?} and {} from {:?}",
            frames_a.len(),
            video_a,
            frames_b.len(),
            video_b
        );

        compare_frames(&self.aggregator, &frames_a, &frames_b, strategy)
    }
}

/// Score two already-sampled frame sequences.
pub fn compare_frames(
    aggregator: &ComparisonAggregator,
    frames_a: &[Frame],
    frames_b: &[Frame],
    strategy: PairingStrategy,
) -> PairwiseResult {
    let frames_extracted = FramesExtracted {
        video_a: frames_a.len(),
        video_b: frames_b.len(),
    };

    if frames_a.is_empty() || frames_b.is_empty() {
        return PairwiseResult {
            frames_extracted,
            ..PairwiseResult::failed(NO_FRAMES_ERROR)
        };
    }

    let frame_comparisons = match strategy {
        PairingStrategy::IndexAligned => index_aligned(aggregator, frames_a, frames_b),
        PairingStrategy::BestMatch => best_match(aggregator, frames_a, frames_b),
    };

    let similarity = if frame_comparisons.is_empty() {
        0.0
    } else {
        frame_comparisons.iter().map(|c| c.overall).sum::<f64>() / frame_comparisons.len() as f64
    };

    PairwiseResult {
        similarity,
        frame_comparisons,
        frames_extracted,
        error: None,
    }
}

/// One slot per index of the longer sequence; a slot only one side can fill scores 0.0.
fn index_aligned(
    aggregator: &ComparisonAggregator,
    frames_a: &[Frame],
    frames_b: &[Frame],
) -> Vec<FrameComparisonResult> {
    let slots = frames_a.len().max(frames_b.len());

    (0..slots)
        .map(|i| match (frames_a.get(i), frames_b.get(i)) {
            (Some(a), Some(b)) => FrameComparisonResult {
                frame_a: Some(i),
                frame_b: Some(i),
                ..aggregator.aggregate(a, b)
            },
            (a, b) => FrameComparisonResult::missing(a.map(|_| i), b.map(|_| i)),
        })
        .collect()
}

fn best_match(
    aggregator: &ComparisonAggregator,
    frames_a: &[Frame],
    frames_b: &[Frame],
) -> Vec<FrameComparisonResult> {
    frames_a
        .iter()
        .enumerate()
        .filter_map(|(i, a)| {
            let mut best: Option<FrameComparisonResult> = None;

            for (j, b) in frames_b.iter().enumerate() {
                let result = aggregator.aggregate(a, b);
                if best.as_ref().is_none_or(|current| result.overall > current.overall) {
                    best = Some(FrameComparisonResult {
                        frame_a: Some(i),
                        frame_b: Some(j),
                        ..result
                    });
                }
            }

            best
        })
        .collect()
}

#![deny(clippy::all)]

pub mod similarity;

pub use similarity::background::{
    CancelFlag, NoProgress, ProgressEvent, ProgressSink, SearchHandle, spawn_search,
};
pub use similarity::config::{
    Algorithm, ComparatorWeights, ConfigError, PrefilterTolerance, SearchConfig,
};
pub use similarity::engine::{SearchError, SimilaritySearchEngine};
pub use similarity::grouping::{VideoGroup, group_pairs};
pub use similarity::pairwise::{PairingStrategy, PairwiseVideoComparator};
pub use similarity::phash_engine::PerceptualHashEngine;
pub use similarity::scanner::scan_videos;
pub use similarity::video::{FfmpegSource, FrameSource};
pub use similarity::worker::IsolatedComparator;
pub use similarity::{
    Evidence, Frame, FrameComparisonResult, FramesExtracted, PairwiseResult, SimilarityPair,
    VideoHandle, VideoMetadata,
};

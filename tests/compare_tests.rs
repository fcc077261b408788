mod common;

use common::{Library, Look, hd_clip, video};
use std::sync::Arc;
use vidsim::similarity::aggregator::ComparisonAggregator;
use vidsim::similarity::comparators::{HISTOGRAM, PERCEPTUAL_HASH};
use vidsim::similarity::pairwise::NO_FRAMES_ERROR;
use vidsim::similarity::sampler::FrameSampler;
use vidsim::{
    Algorithm, ComparatorWeights, PairingStrategy, PairwiseVideoComparator, PerceptualHashEngine,
    SearchConfig,
};

const SIZE: usize = 4096;

#[test]
fn test_self_similarity() {
    let library = Library::new();
    let a = library.add("a.mp4", SIZE, 1, hd_clip(Look::Red(1)));
    let engine = library.engine(SearchConfig::default());

    let result = engine.compare(&a, &a, 10).unwrap();
    assert!((result.similarity - 1.0).abs() < 1e-6);
    assert_eq!(result.frames_extracted.video_a, 10);
}

#[test]
fn test_repeated_comparison_is_identical() {
    let library = Library::new();
    let a = library.add("a.mp4", SIZE, 1, hd_clip(Look::Red(1)));
    let d = library.add("d.mp4", SIZE, 2, hd_clip(Look::Red(2)));

    let engine = library.engine(SearchConfig::default());
    let first = engine.compare(&a, &d, 10).unwrap();
    engine.clear_caches();
    let second = engine.compare(&a, &d, 10).unwrap();

    assert_eq!(first, second);
}

#[test]
fn test_index_aligned_is_symmetric() {
    let library = Library::new();
    let a = library.add("a.mp4", SIZE, 1, hd_clip(Look::Red(1)));
    // shorter than the sample count: missing slots on one side
    let d = library.add("d.mp4", SIZE, 2, video(Look::Red(2), 1920, 5.0, 6));

    let engine = library.engine(SearchConfig::default());
    let ab = engine.compare(&a, &d, 10).unwrap();
    let ba = engine.compare(&d, &a, 10).unwrap();

    assert_eq!(ab.frame_comparisons.len(), 10);
    assert!((ab.similarity - ba.similarity).abs() < 1e-9);
}

#[test]
fn test_best_match_is_not_symmetric() {
    let library = Library::new();
    let still = library.add("still.mp4", SIZE, 1, video(Look::Still(7), 1920, 5.0, 3));
    let moving = library.add("moving.mp4", SIZE, 2, video(Look::Red(7), 1920, 5.0, 3));

    let engine = library.engine(SearchConfig {
        algorithm: Algorithm::Thorough,
        ..SearchConfig::default()
    });
    let forward = engine.compare(&still, &moving, 3).unwrap();
    let backward = engine.compare(&moving, &still, 3).unwrap();

    // every still frame is frame 0 of the moving clip, not the other way round
    assert!((forward.similarity - 1.0).abs() < 1e-9);
    assert!(backward.similarity < forward.similarity);
    assert!(forward.frame_comparisons.iter().all(|c| c.frame_b == Some(0)));
}

#[test]
fn test_unrelated_videos_score_below_half() {
    let library = Library::new();
    let red = library.add("red.mp4", SIZE, 1, hd_clip(Look::Red(1)));
    let blue = library.add("blue.mp4", SIZE, 2, hd_clip(Look::BlueInverted(1)));

    let engine = library.engine(SearchConfig::default());
    let result = engine.compare(&red, &blue, 10).unwrap();

    assert!(result.similarity < 0.5, "similarity {}", result.similarity);
    for comparison in &result.frame_comparisons {
        assert!(comparison.scores[HISTOGRAM] < 0.5);
    }
}

// Flat frames share one DCT hash, so the hash comparator scores solid red
// against solid blue as identical and only the histogram tells them apart.
// The weighted score lands near 0.8, above the 0.5 an unrelated pair is
// expected to stay below; test_unrelated_videos_score_below_half uses noise.
#[test]
fn test_solid_colours_are_only_separated_by_histogram() {
    let library = Library::new();
    let red = library.add("red.mp4", SIZE, 1, hd_clip(Look::Solid([255, 0, 0])));
    let blue = library.add("blue.mp4", SIZE, 2, hd_clip(Look::Solid([0, 0, 255])));

    let engine = library.engine(SearchConfig::default());
    let result = engine.compare(&red, &blue, 10).unwrap();

    assert!((result.similarity - 0.8).abs() < 0.01, "similarity {}", result.similarity);
    for comparison in &result.frame_comparisons {
        assert!(comparison.scores[HISTOGRAM] < 0.5);
        assert_eq!(comparison.scores[PERCEPTUAL_HASH], 1.0);
    }
}

#[test]
fn test_zero_frames_is_an_explicit_error() {
    let library = Library::new();
    let a = library.add("a.mp4", SIZE, 1, hd_clip(Look::Red(1)));
    let mut broken = hd_clip(Look::Red(1));
    broken.decodable = false;
    let b = library.add("b.mp4", SIZE, 2, broken);
    let missing = library.dir.path().join("missing.mp4");

    let engine = library.engine(SearchConfig::default());

    let result = engine.compare(&a, &b, 10).unwrap();
    assert_eq!(result.similarity, 0.0);
    assert_eq!(result.error.as_deref(), Some(NO_FRAMES_ERROR));
    assert_eq!(result.frames_extracted.video_a, 10);
    assert_eq!(result.frames_extracted.video_b, 0);

    let result = engine.compare(&missing, &a, 10).unwrap();
    assert_eq!(result.similarity, 0.0);
    assert!(result.error.is_some());
}

#[test]
fn test_perceptual_hash_compare_with_zero_frames() {
    let library = Library::new();
    let a = library.add("a.mp4", SIZE, 1, hd_clip(Look::Red(1)));
    let mut broken = hd_clip(Look::Red(1));
    broken.decodable = false;
    let b = library.add("b.mp4", SIZE, 2, broken);

    let phash = PerceptualHashEngine::new(FrameSampler::new(Arc::clone(&library.source)), 30, 12);
    let comparison = phash.compare(&a, &b, 30);
    assert_eq!(comparison.similarity, 0.0);
    assert!(comparison.frame_comparisons.is_empty());

    let engine = library.engine(SearchConfig {
        algorithm: Algorithm::PerceptualHash,
        ..SearchConfig::default()
    });
    let result = engine.compare(&b, &a, 30).unwrap();
    assert_eq!(result.similarity, 0.0);
    assert!(result.frame_comparisons.is_empty());
}

#[test]
fn test_perceptual_hash_compare_uses_shorter_side() {
    let library = Library::new();
    let long = library.add("long.mp4", SIZE, 1, video(Look::Red(3), 1920, 5.0, 8));
    let short = library.add("short.mp4", SIZE, 2, video(Look::Still(3), 1920, 5.0, 2));

    let engine = library.engine(SearchConfig {
        algorithm: Algorithm::PerceptualHash,
        ..SearchConfig::default()
    });
    let result = engine.compare(&long, &short, 30).unwrap();

    // both frames of the short clip are frame 0 of the long one
    assert_eq!(result.frame_comparisons.len(), 2);
    assert_eq!(result.similarity, 1.0);
    assert_eq!(result.frames_extracted.video_a, 8);
    assert_eq!(result.frames_extracted.video_b, 2);

    // frame_b indexes the 2-frame clip, frame_a the 8-frame one
    let slots: Vec<_> = result
        .frame_comparisons
        .iter()
        .map(|c| (c.frame_a, c.frame_b))
        .collect();
    assert_eq!(slots, vec![(Some(0), Some(0)), (Some(0), Some(1))]);
}

#[test]
fn test_find_candidates_scores_each_pair_once() {
    let library = Library::new();
    let a = library.add("a.mp4", SIZE, 1, hd_clip(Look::Red(1)));
    let c = library.add("c.mp4", SIZE, 2, hd_clip(Look::Red(1)));
    let d = library.add("d.mp4", SIZE, 3, hd_clip(Look::BlueInverted(1)));
    let mut broken = hd_clip(Look::Red(1));
    broken.decodable = false;
    let e = library.add("e.mp4", SIZE, 4, broken);
    let paths = vec![a.clone(), c.clone(), d.clone(), e.clone()];

    let phash = PerceptualHashEngine::new(FrameSampler::new(Arc::clone(&library.source)), 30, 12);

    // every pair without an empty hash list, best first
    let all = phash.find_candidates(&paths, 0.0);
    assert_eq!(all.len(), 3);
    assert!(all.iter().all(|c| c.path_a < c.path_b && c.path_b != e));
    assert!(all.windows(2).all(|w| w[0].match_ratio >= w[1].match_ratio));
    assert_eq!((&all[0].path_a, &all[0].path_b), (&a, &c));
    assert_eq!(all[0].match_ratio, 1.0);
    for path in &paths {
        assert_eq!(library.source.reads(path), 1);
    }

    let accepted = phash.find_candidates(&paths, 0.7);
    assert_eq!(accepted.len(), 1);
    assert_eq!((&accepted[0].path_a, &accepted[0].path_b), (&a, &c));
    assert_eq!(accepted[0].matched, accepted[0].compared);
}

#[test]
fn test_short_videos_return_every_frame() {
    let library = Library::new();
    let a = library.add("a.mp4", SIZE, 1, video(Look::Red(1), 640, 0.0, 4));
    let engine = library.engine(SearchConfig::default());

    let result = engine.compare(&a, &a, 10).unwrap();
    assert_eq!(result.frames_extracted.video_a, 4);
    assert_eq!(result.frame_comparisons.len(), 4);
    assert!((result.similarity - 1.0).abs() < 1e-6);
}

#[test]
fn test_compare_group_covers_every_pair() {
    let library = Library::new();
    let paths: Vec<_> = (0..3u8)
        .map(|i| library.add(&format!("v{}.mp4", i), SIZE, i, hd_clip(Look::Red(1))))
        .collect();

    let engine = library.engine(SearchConfig::default());
    let results = engine.compare_group(&paths, 5).unwrap();

    assert_eq!(results.len(), 3);
    for ((a, b), result) in &results {
        assert!(a < b);
        assert!((result.similarity - 1.0).abs() < 1e-9);
    }
}

#[test]
fn test_pairwise_comparator_without_engine() {
    let library = Library::new();
    let a = library.add("a.mp4", SIZE, 1, hd_clip(Look::Red(1)));
    let c = library.add("c.mp4", SIZE, 2, hd_clip(Look::Red(1)));

    let aggregator = ComparisonAggregator::new(ComparatorWeights::default()).unwrap();
    let comparator = PairwiseVideoComparator::new(
        FrameSampler::new(Arc::clone(&library.source)),
        Arc::new(aggregator),
    );

    let result = comparator.compare(&a, &c, 4, PairingStrategy::IndexAligned);
    assert_eq!(result.frame_comparisons.len(), 4);
    assert!((result.similarity - 1.0).abs() < 1e-9);
    assert_eq!(library.source.reads(&a), 1);
}

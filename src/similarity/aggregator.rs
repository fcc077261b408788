use super::comparators::{ComparatorKind, FrameComparator};
use super::config::{ComparatorWeights, ConfigError, validate_weights};
use super::{Frame, FrameComparisonResult};
use std::collections::BTreeMap;

pub struct WeightedComparator {
    pub comparator: Box<dyn FrameComparator>,
    pub weight: f64,
}

impl WeightedComparator {
    pub fn new(comparator: Box<dyn FrameComparator>, weight: f64) -> Self {
        Self { comparator, weight }
    }
}

/// Runs every registered comparator on a frame pair and combines the scores.
///
/// A comparator that fails contributes 0.0 while its weight stays in the
/// denominator, so partial failure pulls the overall score down.
pub struct ComparisonAggregator {
    comparators: Vec<WeightedComparator>,
}

impl ComparisonAggregator {
    pub fn new(weights: ComparatorWeights) -> Result<Self, ConfigError> {
        Self::with_comparators(vec![
            WeightedComparator::new(ComparatorKind::Histogram.build(), weights.histogram),
            WeightedComparator::new(ComparatorKind::PerceptualHashDct.build(), weights.phash),
        ])
    }

    pub fn with_comparators(comparators: Vec<WeightedComparator>) -> Result<Self, ConfigError> {
        let weights: Vec<(&str, f64)> = comparators
            .iter()
            .map(|c| (c.comparator.name(), c.weight))
            .collect();
        validate_weights(&weights)?;

        Ok(Self { comparators })
    }

    pub fn comparator_names(&self) -> Vec<&'static str> {
        self.comparators.iter().map(|c| c.comparator.name()).collect()
    }

    pub fn aggregate(&self, frame_a: &Frame, frame_b: &Frame) -> FrameComparisonResult {
        let mut scores = BTreeMap::new();
        let mut total_score = 0.0;
        let mut total_weight = 0.0;

        for entry in &self.comparators {
            let score = entry.comparator.score(frame_a, frame_b);
            scores.insert(entry.comparator.name().to_string(), score);
            total_score += score * entry.weight;
            total_weight += entry.weight;
        }

        let overall = if total_weight > 0.0 {
            total_score / total_weight
        } else {
            0.0
        };

        FrameComparisonResult {
            frame_a: None,
            frame_b: None,
            scores,
            overall,
        }
    }
}

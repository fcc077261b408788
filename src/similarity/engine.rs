use super::aggregator::ComparisonAggregator;
use super::background::{CancelFlag, NoProgress, ProgressSink};
use super::cache::{FrameCache, MetadataCache};
use super::config::{Algorithm, ConfigError, SearchConfig, validate_threshold};
use super::fingerprint::{ContentFingerprint, FingerprintCache, group_exact_duplicates};
use super::hash::PerceptualHash;
use super::pairwise::{PairingStrategy, compare_frames};
use super::phash_engine::PerceptualHashEngine;
use super::prefilter::{FileMetadata, MetadataPreFilter};
use super::sampler::FrameSampler;
use super::video::{FfmpegSource, FrameSource};
use super::{Evidence, Frame, PairwiseResult, SimilarityPair, VideoHandle, canonical_pair};
use rayon::prelude::*;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SearchError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("algorithm '{0}' is not supported")]
    Unsupported(Algorithm),

    #[error("search cancelled")]
    Cancelled,

    #[error(transparent)]
    Io(#[from] anyhow::Error),
}

/// A file that survived fingerprinting, with whatever else is known about it
struct Entry {
    path: PathBuf,
    fingerprint: ContentFingerprint,
    handle: Option<VideoHandle>,
}

/// Top-level near-duplicate search.
///
/// Per call: fingerprint, exact-duplicate grouping, metadata prefilter, deep
/// comparison of the survivors, then dedup and sort. Video metadata and
/// sampled frames are cached for the engine's lifetime; call
/// [`SimilaritySearchEngine::forget`] when a file is deleted.
pub struct SimilaritySearchEngine<S: FrameSource = FfmpegSource> {
    config: SearchConfig,
    sampler: FrameSampler<S>,
    aggregator: Arc<ComparisonAggregator>,
    prefilter: MetadataPreFilter,
    phash: PerceptualHashEngine<S>,
    metadata: MetadataCache,
    frames: FrameCache,
}

impl SimilaritySearchEngine<FfmpegSource> {
    pub fn new(config: SearchConfig) -> Result<Self, SearchError> {
        let source = FfmpegSource::new()?;
        Self::with_source(config, Arc::new(source))
    }
}

impl<S: FrameSource> SimilaritySearchEngine<S> {
    pub fn with_source(config: SearchConfig, source: Arc<S>) -> Result<Self, SearchError> {
        config.validate()?;

        let sampler = FrameSampler::new(source);
        let aggregator = Arc::new(ComparisonAggregator::new(config.weights)?);

        Ok(Self {
            prefilter: MetadataPreFilter::new(config.prefilter),
            phash: PerceptualHashEngine::new(
                sampler.clone(),
                config.fast_frame_samples,
                config.hamming_threshold,
            ),
            metadata: MetadataCache::new(),
            frames: FrameCache::new(config.frame_cache_capacity),
            sampler,
            aggregator,
            config,
        })
    }

    pub fn config(&self) -> &SearchConfig {
        &self.config
    }

    pub fn aggregator(&self) -> &Arc<ComparisonAggregator> {
        &self.aggregator
    }

    pub fn phash(&self) -> &PerceptualHashEngine<S> {
        &self.phash
    }

    pub fn find_similar(
        &self,
        paths: &[PathBuf],
        threshold: f64,
    ) -> Result<Vec<SimilarityPair>, SearchError> {
        self.find_similar_with(paths, threshold, &NoProgress, &CancelFlag::new())
    }

    pub fn find_similar_with(
        &self,
        paths: &[PathBuf],
        threshold: f64,
        progress: &dyn ProgressSink,
        cancel: &CancelFlag,
    ) -> Result<Vec<SimilarityPair>, SearchError> {
        validate_threshold(threshold)?;
        let algorithm = self.config.algorithm;
        if algorithm == Algorithm::CnnFaiss {
            return Err(SearchError::Unsupported(algorithm));
        }

        let mut unique = HashSet::new();
        let paths: Vec<&PathBuf> = paths.iter().filter(|p| unique.insert(*p)).collect();

        log::info!(
            "Searching {} videos with the {} algorithm, threshold {}",
            paths.len(),
            algorithm,
            threshold
        );

        // 1. fingerprint
        let mut fingerprints = FingerprintCache::new();
        let mut entries = Vec::with_capacity(paths.len());
        for (i, path) in paths.iter().enumerate() {
            check(cancel)?;
            progress.report(
                stage_percent(0, 20, i, paths.len()),
                &format!("Fingerprinting {}", display_name(path)),
            );

            if let Some(fingerprint) = fingerprints.get(path) {
                entries.push(Entry {
                    path: (*path).clone(),
                    fingerprint: fingerprint.clone(),
                    handle: None,
                });
            }
        }

        // 2. exact duplicates
        let mut seen = HashSet::new();
        let mut results = Vec::new();
        let groups = group_exact_duplicates(
            entries
                .iter()
                .map(|e| (e.path.as_path(), &e.fingerprint)),
        );
        for group in &groups {
            for i in 0..group.len() {
                for j in i + 1..group.len() {
                    let pair = SimilarityPair::new(&group[i], &group[j], 1.0, Evidence::ExactDuplicate);
                    if seen.insert(pair.key()) {
                        results.push(pair);
                    }
                }
            }
        }
        log::info!(
            "Found {} exact duplicate pairs in {} groups",
            results.len(),
            groups.len()
        );

        // 3. candidates
        let entries_len = entries.len();
        for (i, entry) in entries.iter_mut().enumerate() {
            check(cancel)?;
            progress.report(
                stage_percent(20, 40, i, entries_len),
                &format!("Reading metadata of {}", display_name(&entry.path)),
            );
            entry.handle = self.handle(&entry.path);
        }

        let mut candidates = Vec::new();
        for i in 0..entries.len() {
            for j in i + 1..entries.len() {
                let (a, b) = (&entries[i], &entries[j]);
                if seen.contains(&canonical_pair(&a.path, &b.path)) {
                    continue;
                }
                let (Some(meta_a), Some(meta_b)) = (file_metadata(a), file_metadata(b)) else {
                    continue;
                };
                if self.prefilter.likely_similar(&meta_a, &meta_b) {
                    candidates.push((i, j));
                }
            }
        }
        log::info!("{} candidate pairs passed the metadata filter", candidates.len());

        // 4. deep comparison
        let deep = match algorithm {
            Algorithm::PerceptualHash => {
                self.hash_candidates(&entries, &candidates, threshold, progress, cancel)?
            }
            _ => self.frame_candidates(&entries, &candidates, threshold, progress, cancel)?,
        };

        // 5. dedup
        for pair in deep {
            if seen.insert(pair.key()) {
                results.push(pair);
            }
        }

        // 6. sort, stable for equal scores
        results.sort_by(|a, b| b.score.total_cmp(&a.score));

        progress.report(100, &format!("Found {} similar pairs", results.len()));
        log::info!("Search finished with {} similar pairs", results.len());

        Ok(results)
    }

    fn frame_candidates(
        &self,
        entries: &[Entry],
        candidates: &[(usize, usize)],
        threshold: f64,
        progress: &dyn ProgressSink,
        cancel: &CancelFlag,
    ) -> Result<Vec<SimilarityPair>, SearchError> {
        let strategy = strategy_for(self.config.algorithm);
        let done = AtomicUsize::new(0);

        let compare = |&(i, j): &(usize, usize)| -> Option<SimilarityPair> {
            if cancel.is_cancelled() {
                return None;
            }
            let (a, b) = (&entries[i], &entries[j]);
            let result = self.compare_handles(a, b, self.config.frame_samples, strategy);

            let finished = done.fetch_add(1, Ordering::SeqCst) + 1;
            progress.report(
                stage_percent(40, 100, finished, candidates.len()),
                &format!(
                    "Compared {} and {}",
                    display_name(&a.path),
                    display_name(&b.path)
                ),
            );

            if let Some(error) = &result.error {
                log::warn!("Skipping {:?} vs {:?}: {}", a.path, b.path, error);
                return None;
            }

            log::debug!(
                "{:?} vs {:?}: similarity {:.3}",
                a.path,
                b.path,
                result.similarity
            );
            (result.similarity >= threshold).then(|| {
                SimilarityPair::new(&a.path, &b.path, result.similarity, Evidence::Frames(result))
            })
        };

        let matches: Vec<Option<SimilarityPair>> = if self.config.parallel {
            candidates.par_iter().map(compare).collect()
        } else {
            let mut matches = Vec::with_capacity(candidates.len());
            for candidate in candidates {
                check(cancel)?;
                matches.push(compare(candidate));
            }
            matches
        };

        check(cancel)?;
        Ok(matches.into_iter().flatten().collect())
    }

    fn hash_candidates(
        &self,
        entries: &[Entry],
        candidates: &[(usize, usize)],
        threshold: f64,
        progress: &dyn ProgressSink,
        cancel: &CancelFlag,
    ) -> Result<Vec<SimilarityPair>, SearchError> {
        let mut involved: Vec<usize> = candidates.iter().flat_map(|&(i, j)| [i, j]).collect();
        involved.sort_unstable();
        involved.dedup();

        let hash_one = |index: &usize| -> Option<(PathBuf, Vec<PerceptualHash>)> {
            if cancel.is_cancelled() {
                return None;
            }
            let path = &entries[*index].path;
            let hashes = self.phash.video_hashes(path, self.config.fast_frame_samples);
            Some((path.clone(), hashes))
        };

        let hashes: HashMap<PathBuf, Vec<PerceptualHash>> = if self.config.parallel {
            involved.par_iter().filter_map(hash_one).collect()
        } else {
            let mut hashes = HashMap::new();
            for (n, index) in involved.iter().enumerate() {
                check(cancel)?;
                progress.report(
                    stage_percent(40, 90, n, involved.len()),
                    &format!("Hashing {}", display_name(&entries[*index].path)),
                );
                hashes.extend(hash_one(index));
            }
            hashes
        };
        check(cancel)?;

        let mut matches = Vec::new();
        for (n, &(i, j)) in candidates.iter().enumerate() {
            check(cancel)?;
            progress.report(
                stage_percent(90, 100, n, candidates.len()),
                "Matching perceptual hashes",
            );
            if let Some(candidate) =
                self.phash
                    .score_pair(&hashes, &entries[i].path, &entries[j].path, threshold)
            {
                matches.push(candidate.into_pair(self.phash.hamming_threshold()));
            }
        }

        Ok(matches)
    }

    /// Compare two videos with the configured algorithm.
    pub fn compare(
        &self,
        video_a: &Path,
        video_b: &Path,
        max_frames: usize,
    ) -> Result<PairwiseResult, SearchError> {
        match self.config.algorithm {
            Algorithm::Simple | Algorithm::Thorough => Ok(self.compare_with_strategy(
                video_a,
                video_b,
                max_frames,
                strategy_for(self.config.algorithm),
            )),
            Algorithm::PerceptualHash => Ok(self.phash.compare(video_a, video_b, max_frames).into()),
            Algorithm::CnnFaiss => Err(SearchError::Unsupported(Algorithm::CnnFaiss)),
        }
    }

    pub fn compare_with_strategy(
        &self,
        video_a: &Path,
        video_b: &Path,
        max_frames: usize,
        strategy: PairingStrategy,
    ) -> PairwiseResult {
        let frames_a = self.frames_for(video_a, self.handle(video_a).as_ref(), max_frames);
        let frames_b = self.frames_for(video_b, self.handle(video_b).as_ref(), max_frames);
        compare_frames(&self.aggregator, &frames_a, &frames_b, strategy)
    }

    /// Compare every unordered pair inside a group, keyed by canonical pair.
    pub fn compare_group(
        &self,
        paths: &[PathBuf],
        max_frames: usize,
    ) -> Result<BTreeMap<(PathBuf, PathBuf), PairwiseResult>, SearchError> {
        let mut results = BTreeMap::new();
        for i in 0..paths.len() {
            for j in i + 1..paths.len() {
                let key = canonical_pair(&paths[i], &paths[j]);
                if key.0 == key.1 || results.contains_key(&key) {
                    continue;
                }
                let result = self.compare(&key.0, &key.1, max_frames)?;
                results.insert(key, result);
            }
        }
        Ok(results)
    }

    /// Drop everything cached about a file, e.g. after it was deleted.
    pub fn forget(&self, path: &Path) {
        self.metadata.remove(path);
        self.frames.remove(path);
    }

    pub fn clear_caches(&self) {
        self.metadata.clear();
        self.frames.clear();
    }

    fn handle(&self, path: &Path) -> Option<VideoHandle> {
        self.metadata.get_or_insert_with(path, || {
            let size_bytes = match std::fs::metadata(path) {
                Ok(meta) => meta.len(),
                Err(e) => {
                    log::warn!("Failed to stat {:?}: {}", path, e);
                    return None;
                }
            };

            Some(VideoHandle {
                path: path.to_path_buf(),
                size_bytes,
                metadata: self.sampler.probe(path)?,
            })
        })
    }

    fn frames_for(
        &self,
        path: &Path,
        handle: Option<&VideoHandle>,
        max_frames: usize,
    ) -> Arc<Vec<Frame>> {
        match handle {
            Some(handle) => self.frames.get_or_insert_with(path, max_frames, || {
                self.sampler.sample_with(path, &handle.metadata, max_frames)
            }),
            None => Arc::new(Vec::new()),
        }
    }

    fn compare_handles(
        &self,
        a: &Entry,
        b: &Entry,
        max_frames: usize,
        strategy: PairingStrategy,
    ) -> PairwiseResult {
        let frames_a = self.frames_for(&a.path, a.handle.as_ref(), max_frames);
        let frames_b = self.frames_for(&b.path, b.handle.as_ref(), max_frames);
        compare_frames(&self.aggregator, &frames_a, &frames_b, strategy)
    }
}

fn strategy_for(algorithm: Algorithm) -> PairingStrategy {
    match algorithm {
        Algorithm::Thorough => PairingStrategy::BestMatch,
        _ => PairingStrategy::IndexAligned,
    }
}

fn check(cancel: &CancelFlag) -> Result<(), SearchError> {
    if cancel.is_cancelled() {
        log::info!("Search cancelled");
        return Err(SearchError::Cancelled);
    }
    Ok(())
}

fn file_metadata(entry: &Entry) -> Option<FileMetadata> {
    let handle = entry.handle.as_ref()?;
    Some(FileMetadata {
        size_bytes: handle.size_bytes,
        duration_seconds: handle.metadata.duration_seconds,
        width: handle.metadata.width,
        height: handle.metadata.height,
        fingerprint: Some(entry.fingerprint.clone()),
    })
}

fn stage_percent(start: u8, end: u8, done: usize, total: usize) -> u8 {
    if total == 0 {
        return end;
    }
    let span = f64::from(end - start);
    start + (span * done.min(total) as f64 / total as f64) as u8
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_percent() {
        assert_eq!(stage_percent(0, 20, 0, 10), 0);
        assert_eq!(stage_percent(0, 20, 5, 10), 10);
        assert_eq!(stage_percent(40, 100, 3, 3), 100);
        assert_eq!(stage_percent(40, 100, 0, 0), 100);
    }

    #[test]
    fn test_strategy_per_algorithm() {
        assert_eq!(strategy_for(Algorithm::Simple), PairingStrategy::IndexAligned);
        assert_eq!(strategy_for(Algorithm::Thorough), PairingStrategy::BestMatch);
    }

    #[test]
    fn test_cancelled_flag_fails_check() {
        let cancel = CancelFlag::new();
        assert!(check(&cancel).is_ok());
        cancel.cancel();
        assert!(matches!(check(&cancel), Err(SearchError::Cancelled)));
    }
}

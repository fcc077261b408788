use super::{Frame, VideoHandle};
use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    // a panic while holding the lock leaves plain map data behind, still usable
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Resolved video handles keyed by path, kept for the engine's lifetime.
/// Failed probes are stored as `None`.
#[derive(Debug, Default)]
pub struct MetadataCache {
    entries: Mutex<HashMap<PathBuf, Option<VideoHandle>>>,
}

impl MetadataCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_or_insert_with<F>(&self, path: &Path, resolve: F) -> Option<VideoHandle>
    where
        F: FnOnce() -> Option<VideoHandle>,
    {
        if let Some(entry) = lock(&self.entries).get(path) {
            return entry.clone();
        }

        // resolved outside the lock; a racing insert for the same path is harmless
        let handle = resolve();
        lock(&self.entries)
            .entry(path.to_path_buf())
            .or_insert(handle)
            .clone()
    }

    pub fn remove(&self, path: &Path) {
        lock(&self.entries).remove(path);
    }

    pub fn clear(&self) {
        lock(&self.entries).clear();
    }

    pub fn len(&self) -> usize {
        lock(&self.entries).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

type FrameKey = (PathBuf, usize);

#[derive(Debug, Default)]
struct FrameCacheInner {
    entries: HashMap<FrameKey, Arc<Vec<Frame>>>,
    order: VecDeque<FrameKey>,
}

/// Sampled frames keyed by (path, sample count), bounded by entry count.
/// The oldest insertion is evicted first.
#[derive(Debug)]
pub struct FrameCache {
    capacity: usize,
    inner: Mutex<FrameCacheInner>,
}

impl FrameCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            inner: Mutex::new(FrameCacheInner::default()),
        }
    }

    pub fn get_or_insert_with<F>(&self, path: &Path, samples: usize, sample: F) -> Arc<Vec<Frame>>
    where
        F: FnOnce() -> Vec<Frame>,
    {
        let key = (path.to_path_buf(), samples);
        if let Some(frames) = lock(&self.inner).entries.get(&key) {
            return Arc::clone(frames);
        }

        let frames = Arc::new(sample());
        if self.capacity == 0 {
            return frames;
        }

        let mut inner = lock(&self.inner);
        if let Some(existing) = inner.entries.get(&key) {
            return Arc::clone(existing);
        }

        while inner.entries.len() >= self.capacity {
            match inner.order.pop_front() {
                Some(oldest) => {
                    inner.entries.remove(&oldest);
                }
                None => break,
            }
        }

        inner.order.push_back(key.clone());
        inner.entries.insert(key, Arc::clone(&frames));
        frames
    }

    pub fn remove(&self, path: &Path) {
        let mut inner = lock(&self.inner);
        inner.entries.retain(|(p, _), _| p != path);
        inner.order.retain(|(p, _)| p != path);
    }

    pub fn clear(&self) {
        let mut inner = lock(&self.inner);
        inner.entries.clear();
        inner.order.clear();
    }

    pub fn len(&self) -> usize {
        lock(&self.inner).entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::similarity::VideoMetadata;
    use image::Rgb;
    use std::cell::Cell;

    fn frames(n: usize) -> Vec<Frame> {
        (0..n).map(|_| Frame::from_pixel(2, 2, Rgb([0, 0, 0]))).collect()
    }

    #[test]
    fn test_metadata_resolved_once() {
        let cache = MetadataCache::new();
        let calls = Cell::new(0);
        let resolve = || {
            calls.set(calls.get() + 1);
            Some(VideoHandle {
                path: PathBuf::from("a.mp4"),
                size_bytes: 10,
                metadata: VideoMetadata::new(640, 480, 25.0, 250),
            })
        };

        let first = cache.get_or_insert_with(Path::new("a.mp4"), resolve);
        let second = cache.get_or_insert_with(Path::new("a.mp4"), || None);
        assert_eq!(first, second);
        assert_eq!(calls.get(), 1);

        cache.remove(Path::new("a.mp4"));
        assert!(cache.get_or_insert_with(Path::new("a.mp4"), || None).is_none());
    }

    #[test]
    fn test_frame_cache_evicts_oldest() {
        let cache = FrameCache::new(2);
        cache.get_or_insert_with(Path::new("a"), 3, || frames(3));
        cache.get_or_insert_with(Path::new("b"), 3, || frames(3));
        cache.get_or_insert_with(Path::new("c"), 3, || frames(3));
        assert_eq!(cache.len(), 2);

        // "a" was evicted and is sampled again
        let resampled = cache.get_or_insert_with(Path::new("a"), 3, || frames(1));
        assert_eq!(resampled.len(), 1);
    }

    #[test]
    fn test_frame_cache_remove_by_path() {
        let cache = FrameCache::new(10);
        cache.get_or_insert_with(Path::new("a"), 3, || frames(3));
        cache.get_or_insert_with(Path::new("a"), 5, || frames(5));
        cache.get_or_insert_with(Path::new("b"), 3, || frames(3));

        cache.remove(Path::new("a"));
        assert_eq!(cache.len(), 1);

        cache.clear();
        assert!(cache.is_empty());
    }
}

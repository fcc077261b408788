#![allow(dead_code)]

use anyhow::Result;
use image::Rgb;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;
use tempfile::TempDir;
use vidsim::{Frame, FrameSource, SearchConfig, SimilaritySearchEngine, VideoMetadata};

pub const FRAME_SIZE: u32 = 64;
const BLOCK: u32 = 8;

/// What the frames of a synthetic video look like
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Look {
    /// Random red blocks, a new pattern every frame.
    Red(u64),
    /// `Red` with the intensity inverted and moved to the blue channel.
    BlueInverted(u64),
    /// Every frame is frame 0 of `Red`.
    Still(u64),
    /// One flat colour.
    Solid([u8; 3]),
}

#[derive(Debug, Clone)]
pub struct SyntheticVideo {
    pub metadata: VideoMetadata,
    pub look: Look,
    pub decodable: bool,
}

pub fn video(look: Look, width: u32, fps: f64, total_frames: u64) -> SyntheticVideo {
    SyntheticVideo {
        metadata: VideoMetadata::new(width, width * 9 / 16, fps, total_frames),
        look,
        decodable: true,
    }
}

/// In-memory frame source keyed by path. Unregistered paths fail to probe.
#[derive(Default)]
pub struct SyntheticSource {
    videos: Mutex<HashMap<PathBuf, SyntheticVideo>>,
    reads: Mutex<HashMap<PathBuf, usize>>,
    delay: Duration,
}

impl SyntheticSource {
    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay,
            ..Self::default()
        }
    }

    pub fn register(&self, path: &Path, video: SyntheticVideo) {
        self.videos
            .lock()
            .unwrap()
            .insert(path.to_path_buf(), video);
    }

    pub fn video(&self, path: &Path) -> Option<SyntheticVideo> {
        self.videos.lock().unwrap().get(path).cloned()
    }

    /// How often frames of `path` were decoded
    pub fn reads(&self, path: &Path) -> usize {
        self.reads.lock().unwrap().get(path).copied().unwrap_or(0)
    }
}

impl FrameSource for SyntheticSource {
    fn probe(&self, path: &Path) -> Result<VideoMetadata> {
        match self.video(path) {
            Some(video) => Ok(video.metadata),
            None => anyhow::bail!("{:?} is not a video", path),
        }
    }

    fn read_frames(&self, path: &Path, indices: &[u64]) -> Result<Vec<Frame>> {
        let video = match self.video(path) {
            Some(video) => video,
            None => anyhow::bail!("{:?} is not a video", path),
        };
        *self
            .reads
            .lock()
            .unwrap()
            .entry(path.to_path_buf())
            .or_default() += 1;

        if !self.delay.is_zero() {
            thread::sleep(self.delay);
        }

        if !video.decodable {
            return Ok(Vec::new());
        }

        Ok(indices
            .iter()
            .filter(|&&i| i < video.metadata.total_frames)
            .map(|&i| render(video.look, i))
            .collect())
    }
}

fn splitmix(mut x: u64) -> u64 {
    x = x.wrapping_add(0x9E37_79B9_7F4A_7C15);
    x = (x ^ (x >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    x = (x ^ (x >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    x ^ (x >> 31)
}

fn block_value(seed: u64, frame: u64, bx: u32, by: u32) -> u8 {
    let key = seed
        .wrapping_mul(1_000_003)
        .wrapping_add(frame.wrapping_mul(7919))
        .wrapping_add(u64::from(bx) * 131 + u64::from(by));
    (splitmix(key) % 256) as u8
}

pub fn render(look: Look, index: u64) -> Frame {
    Frame::from_fn(FRAME_SIZE, FRAME_SIZE, |x, y| {
        let (bx, by) = (x / BLOCK, y / BLOCK);
        match look {
            Look::Red(seed) => Rgb([block_value(seed, index, bx, by), 0, 0]),
            Look::Still(seed) => Rgb([block_value(seed, 0, bx, by), 0, 0]),
            Look::BlueInverted(seed) => Rgb([0, 0, 255 - block_value(seed, index, bx, by)]),
            Look::Solid(colour) => Rgb(colour),
        }
    })
}

/// A temp directory of files, each registered with a synthetic source
pub struct Library {
    pub dir: TempDir,
    pub source: Arc<SyntheticSource>,
}

impl Library {
    pub fn new() -> Self {
        Self::with_source(SyntheticSource::default())
    }

    pub fn with_source(source: SyntheticSource) -> Self {
        Self {
            dir: TempDir::new().unwrap(),
            source: Arc::new(source),
        }
    }

    /// Write `size` bytes derived from `content_seed` and register the file.
    pub fn add(&self, name: &str, size: usize, content_seed: u8, video: SyntheticVideo) -> PathBuf {
        let path = self.write(name, size, content_seed);
        self.source.register(&path, video);
        path
    }

    /// A file on disk that is not a decodable container.
    pub fn write(&self, name: &str, size: usize, content_seed: u8) -> PathBuf {
        let path = self.dir.path().join(name);
        let content: Vec<u8> = (0..size)
            .map(|i| (i as u8).wrapping_mul(31).wrapping_add(content_seed))
            .collect();
        fs::write(&path, content).unwrap();
        path
    }

    /// Byte-identical copy, registered with the same video.
    pub fn copy(&self, from: &Path, name: &str) -> PathBuf {
        let path = self.dir.path().join(name);
        fs::copy(from, &path).unwrap();
        let video = self.source.video(from).unwrap();
        self.source.register(&path, video);
        path
    }

    pub fn engine(&self, config: SearchConfig) -> SimilaritySearchEngine<SyntheticSource> {
        SimilaritySearchEngine::with_source(config, Arc::clone(&self.source)).unwrap()
    }
}

/// 60 s, 1920x1080, 300 frames
pub fn hd_clip(look: Look) -> SyntheticVideo {
    video(look, 1920, 5.0, 300)
}

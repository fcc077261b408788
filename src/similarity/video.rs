use super::{Frame, VideoMetadata};
use anyhow::{Context, Result};
use ffmpeg_next as ffmpeg;
use std::collections::BTreeSet;
use std::path::Path;

/// Container access used by the sampler: metadata probing and decoding of
/// frames by index.
pub trait FrameSource: Send + Sync {
    fn probe(&self, path: &Path) -> Result<VideoMetadata>;

    /// Decode the frames at `indices` (ascending). Frames that cannot be
    /// sought or decoded are skipped; an `Err` means the container itself is
    /// unusable.
    fn read_frames(&self, path: &Path, indices: &[u64]) -> Result<Vec<Frame>>;
}

/// Intialize FFmpeg (safe to call more than once)
pub fn init_ffmpeg() -> Result<()> {
    ffmpeg::init().context("Failed to initialize FFmpeg")?;
    ffmpeg::util::log::set_level(ffmpeg::util::log::Level::Error);

    Ok(())
}

/// FFmpeg-backed frame source
#[derive(Debug, Clone, Copy)]
pub struct FfmpegSource;

impl FfmpegSource {
    pub fn new() -> Result<Self> {
        init_ffmpeg()?;
        Ok(Self)
    }
}

impl FrameSource for FfmpegSource {
    fn probe(&self, path: &Path) -> Result<VideoMetadata> {
        let input = ffmpeg::format::input(&path).context("Failed to open video file")?;

        let video_stream = input
            .streams()
            .best(ffmpeg::media::Type::Video)
            .context("Could not find video stream")?;

        let decoder = ffmpeg::codec::context::Context::from_parameters(video_stream.parameters())
            .context("Failed to create decoder context")?
            .decoder()
            .video()
            .context("Failed to create video decoder")?;

        let fps = stream_fps(&video_stream);
        let total_frames = if video_stream.frames() > 0 {
            video_stream.frames() as u64
        } else {
            // no frame count in the container: estimate from duration
            let duration = if video_stream.duration() > 0 {
                video_stream.duration() as f64 * f64::from(video_stream.time_base())
            } else {
                input.duration().max(0) as f64 / f64::from(ffmpeg::ffi::AV_TIME_BASE)
            };
            (duration * fps).round().max(0.0) as u64
        };

        Ok(VideoMetadata::new(
            decoder.width(),
            decoder.height(),
            fps,
            total_frames,
        ))
    }

    fn read_frames(&self, path: &Path, indices: &[u64]) -> Result<Vec<Frame>> {
        let mut reader = VideoReader::open(path)?;

        let sequential = reader.fps <= 0.0
            || indices
                .iter()
                .enumerate()
                .all(|(i, &index)| index == i as u64);

        if sequential {
            return Ok(reader.decode_sequential(indices));
        }

        let mut frames = Vec::with_capacity(indices.len());
        for &index in indices {
            match reader.decode_at(index) {
                Ok(Some(frame)) => frames.push(frame),
                Ok(None) => log::debug!("No frame decoded at index {} of {:?}", index, path),
                Err(e) => log::debug!("Skipping frame {} of {:?}: {:#}", index, path, e),
            }
        }

        Ok(frames)
    }
}

fn stream_fps(stream: &ffmpeg::format::stream::Stream) -> f64 {
    let fps = f64::from(stream.avg_frame_rate());
    if fps.is_finite() && fps > 0.0 {
        return fps;
    }

    let fps = f64::from(stream.rate());
    if fps.is_finite() && fps > 0.0 { fps } else { 0.0 }
}

/// An opened container with a decoder and RGB24 scaler for its best video stream
struct VideoReader {
    input: ffmpeg::format::context::Input,
    stream_index: usize,
    decoder: ffmpeg::decoder::Video,
    scaler: ffmpeg::software::scaling::context::Context,
    time_base: f64,
    /// First presentation timestamp of the stream, in `time_base` units.
    start_pts: i64,
    fps: f64,
}

impl VideoReader {
    fn open(path: &Path) -> Result<Self> {
        let input = ffmpeg::format::input(&path)
            .context("Failed to open video file for frame extraction")?;

        let video_stream = input
            .streams()
            .best(ffmpeg::media::Type::Video)
            .context("Could not find video stream")?;
        let stream_index = video_stream.index();
        let time_base = f64::from(video_stream.time_base());
        let start_pts = match video_stream.start_time() {
            ffmpeg::ffi::AV_NOPTS_VALUE => 0,
            start => start,
        };
        let fps = stream_fps(&video_stream);

        let context_decoder =
            ffmpeg::codec::context::Context::from_parameters(video_stream.parameters())
                .context("Failed to create codec context")?;

        let decoder = context_decoder
            .decoder()
            .video()
            .context("Failed to create video decoder")?;

        let scaler = ffmpeg::software::scaling::context::Context::get(
            decoder.format(),
            decoder.width(),
            decoder.height(),
            ffmpeg::format::Pixel::RGB24,
            decoder.width(),
            decoder.height(),
            ffmpeg::software::scaling::flag::Flags::BILINEAR,
        )
        .context("Failed to create scaler")?;

        Ok(Self {
            input,
            stream_index,
            decoder,
            scaler,
            time_base,
            start_pts,
            fps,
        })
    }

    /// Seek to the keyframe before `index` and decode forward to it.
    fn decode_at(&mut self, index: u64) -> Result<Option<Frame>> {
        let (position, target_pts) = seek_targets(index, self.fps, self.time_base, self.start_pts);

        self.input
            .seek(position, ..position)
            .with_context(|| format!("Failed to seek to frame {}", index))?;
        self.decoder.flush();

        let mut decoded = ffmpeg::util::frame::video::Video::empty();
        for (stream, packet) in self.input.packets() {
            if stream.index() != self.stream_index {
                continue;
            }
            if self.decoder.send_packet(&packet).is_err() {
                continue;
            }

            while self.decoder.receive_frame(&mut decoded).is_ok() {
                let pts = decoded.timestamp().or(decoded.pts()).unwrap_or(0);
                if pts >= target_pts {
                    return convert_frame(&mut self.scaler, &decoded).map(Some);
                }
            }
        }

        // end of stream: take whatever the decoder still holds
        self.decoder.send_eof().ok();
        let mut last = None;
        while self.decoder.receive_frame(&mut decoded).is_ok() {
            last = Some(convert_frame(&mut self.scaler, &decoded)?);
        }

        Ok(last)
    }

    /// Decode from the start, keeping the frames whose ordinal is in `indices`.
    fn decode_sequential(&mut self, indices: &[u64]) -> Vec<Frame> {
        let wanted: BTreeSet<u64> = indices.iter().copied().collect();
        let last_wanted = match wanted.last() {
            Some(&last) => last,
            None => return Vec::new(),
        };

        let mut frames = Vec::with_capacity(wanted.len());
        let mut ordinal = 0u64;
        let mut decoded = ffmpeg::util::frame::video::Video::empty();

        for (stream, packet) in self.input.packets() {
            if stream.index() != self.stream_index {
                continue;
            }
            if self.decoder.send_packet(&packet).is_err() {
                continue;
            }

            while self.decoder.receive_frame(&mut decoded).is_ok() {
                if wanted.contains(&ordinal) {
                    keep_frame(&mut self.scaler, &decoded, ordinal, &mut frames);
                }
                ordinal += 1;
            }

            if ordinal > last_wanted {
                return frames;
            }
        }

        self.decoder.send_eof().ok();
        while ordinal <= last_wanted && self.decoder.receive_frame(&mut decoded).is_ok() {
            if wanted.contains(&ordinal) {
                keep_frame(&mut self.scaler, &decoded, ordinal, &mut frames);
            }
            ordinal += 1;
        }

        frames
    }
}

/// Container seek position (in `AV_TIME_BASE` units) and stream pts of frame
/// `index`, both offset by the stream's start time.
fn seek_targets(index: u64, fps: f64, time_base: f64, start_pts: i64) -> (i64, i64) {
    let seconds = index as f64 / fps;
    if time_base <= 0.0 {
        return ((seconds * f64::from(ffmpeg::ffi::AV_TIME_BASE)) as i64, 0);
    }

    let start_seconds = start_pts as f64 * time_base;
    let position = ((seconds + start_seconds) * f64::from(ffmpeg::ffi::AV_TIME_BASE)) as i64;
    let target_pts = start_pts + (seconds / time_base).round() as i64;
    (position, target_pts)
}

fn keep_frame(
    scaler: &mut ffmpeg::software::scaling::context::Context,
    decoded: &ffmpeg::util::frame::video::Video,
    ordinal: u64,
    frames: &mut Vec<Frame>,
) {
    match convert_frame(scaler, decoded) {
        Ok(frame) => frames.push(frame),
        Err(e) => log::debug!("Skipping frame {}: {:#}", ordinal, e),
    }
}

/// Convert a decoded frame to RGB24 and copy it row by row, dropping the stride padding.
fn convert_frame(
    scaler: &mut ffmpeg::software::scaling::context::Context,
    decoded: &ffmpeg::util::frame::video::Video,
) -> Result<Frame> {
    let mut rgb_frame = ffmpeg::util::frame::video::Video::empty();
    scaler
        .run(decoded, &mut rgb_frame)
        .context("Failed to scale frame")?;

    let width = rgb_frame.width();
    let height = rgb_frame.height();
    let stride = rgb_frame.stride(0);
    let data = rgb_frame.data(0);
    let row_len = width as usize * 3;

    let mut pixels = Vec::with_capacity(row_len * height as usize);
    for y in 0..height as usize {
        let start = y * stride;
        let row = data
            .get(start..start + row_len)
            .context("Frame buffer shorter than its dimensions")?;
        pixels.extend_from_slice(row);
    }

    Frame::from_raw(width, height, pixels).context("Failed to create image buffer from frame")
}

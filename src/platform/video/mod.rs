// Video input and annotated output
// Frame sources decoded outside this crate, sampling, and annotated frame sinks

pub mod image_sequence;
pub mod keypoint_track;
pub mod png_sink;

pub use image_sequence::ImageSequenceSource;
pub use keypoint_track::{KeypointTrack, TrackSource};
pub use png_sink::PngSequenceSink;

use crate::models::capture::VideoFrame;
use crate::models::pose::FrameKeypoints;
use std::path::{Path, PathBuf};

/// Yields decoded frames in presentation order.
///
/// `Ok(None)` is end-of-stream; `Err` is a decode failure.
pub trait VideoSource: Send {
    fn next_frame(&mut self) -> VideoResult<Option<VideoFrame>>;
}

/// Receives frames in order, each with the landmarks detected on it
pub trait VideoSink: Send {
    fn write_frame(
        &mut self,
        frame: &VideoFrame,
        keypoints: Option<&FrameKeypoints>,
    ) -> VideoResult<()>;

    /// Flush anything buffered; no frames may follow
    fn finish(&mut self) -> VideoResult<()>;
}

/// Keeps every `stride`-th frame of the inner source.
///
/// The kept frames are those whose 1-based position is divisible by the
/// stride, so a stride of 2 keeps 0-based indices 1, 3, 5, ...
pub struct Strided<S> {
    inner: S,
    stride: u64,
}

impl<S: VideoSource> Strided<S> {
    /// A stride of 0 is treated as 1
    pub fn new(inner: S, stride: u32) -> Self {
        Self {
            inner,
            stride: u64::from(stride.max(1)),
        }
    }
}

impl<S: VideoSource> VideoSource for Strided<S> {
    fn next_frame(&mut self) -> VideoResult<Option<VideoFrame>> {
        while let Some(frame) = self.inner.next_frame()? {
            if (frame.index + 1) % self.stride == 0 {
                return Ok(Some(frame));
            }
        }
        Ok(None)
    }
}

impl<S: VideoSource + ?Sized> VideoSource for Box<S> {
    fn next_frame(&mut self) -> VideoResult<Option<VideoFrame>> {
        (**self).next_frame()
    }
}

/// How a video argument is resolved to frames and landmarks
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VideoReference {
    /// `.json` keypoint track with recorded landmarks
    Track(PathBuf),
    /// Directory of decoded frame images
    ImageSequence(PathBuf),
}

impl VideoReference {
    pub fn from_path(path: &Path) -> VideoResult<Self> {
        if path.is_dir() {
            return Ok(VideoReference::ImageSequence(path.to_path_buf()));
        }
        let is_json = path
            .extension()
            .and_then(|e| e.to_str())
            .map_or(false, |e| e.eq_ignore_ascii_case("json"));
        if is_json && path.is_file() {
            return Ok(VideoReference::Track(path.to_path_buf()));
        }
        Err(VideoError::UnsupportedReference(path.to_path_buf()))
    }

    pub fn path(&self) -> &Path {
        match self {
            VideoReference::Track(path) | VideoReference::ImageSequence(path) => path,
        }
    }
}

// ==============================================================================
// Error Types
// ==============================================================================

#[derive(Debug, thiserror::Error)]
pub enum VideoError {
    #[error("Video I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("Frame decode failed: {0}")]
    Decode(#[from] image::ImageError),

    #[error("Invalid keypoint track: {0}")]
    InvalidTrack(String),

    #[error("Not a keypoint track or image directory: {0:?}")]
    UnsupportedReference(PathBuf),

    #[error("Frame encode failed: {0}")]
    Encode(String),
}

pub type VideoResult<T> = Result<T, VideoError>;

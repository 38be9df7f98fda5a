// Directory of decoded frame images, read in file name order

use super::{VideoResult, VideoSource};
use crate::models::capture::{PixelFormat, VideoFrame};
use std::path::{Path, PathBuf};
use tracing::debug;

const IMAGE_EXTENSIONS: [&str; 5] = ["png", "jpg", "jpeg", "bmp", "webp"];

/// Default frame rate when the directory carries no timing information
pub const DEFAULT_FPS: f64 = 30.0;

pub struct ImageSequenceSource {
    paths: Vec<PathBuf>,
    position: usize,
    fps: f64,
}

impl ImageSequenceSource {
    pub fn open(dir: &Path) -> VideoResult<Self> {
        let mut paths = Vec::new();
        for entry in std::fs::read_dir(dir)? {
            let path = entry?.path();
            let is_image = path
                .extension()
                .and_then(|e| e.to_str())
                .map_or(false, |e| IMAGE_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()));
            if is_image && path.is_file() {
                paths.push(path);
            }
        }
        paths.sort();

        debug!("Opened image sequence {:?} with {} frames", dir, paths.len());
        Ok(Self {
            paths,
            position: 0,
            fps: DEFAULT_FPS,
        })
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }
}

impl VideoSource for ImageSequenceSource {
    fn next_frame(&mut self) -> VideoResult<Option<VideoFrame>> {
        let Some(path) = self.paths.get(self.position) else {
            return Ok(None);
        };

        let rgba = image::open(path)?.to_rgba8();
        let index = self.position as u64;
        self.position += 1;

        Ok(Some(VideoFrame {
            index,
            timestamp_ms: (index as f64 * 1000.0 / self.fps).round() as i64,
            width: rgba.width(),
            height: rgba.height(),
            data: rgba.into_raw(),
            format: PixelFormat::RGBA8,
        }))
    }
}

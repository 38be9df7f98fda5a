// Annotated output as a numbered PNG sequence

use super::{VideoError, VideoResult, VideoSink};
use crate::models::capture::{PixelFormat, VideoFrame};
use crate::models::pose::{FrameKeypoints, POSE_CONNECTIONS};
use image::{Rgba, RgbaImage};
use std::path::{Path, PathBuf};
use tracing::debug;

const LANDMARK_COLOR: Rgba<u8> = Rgba([255, 64, 64, 255]);
const SEGMENT_COLOR: Rgba<u8> = Rgba([64, 255, 64, 255]);
const LANDMARK_RADIUS: i64 = 3;
const MIN_DRAW_VISIBILITY: f64 = 0.5;
const SCORE_COLOR: Rgba<u8> = Rgba([64, 160, 255, 255]);
const SCORE_TRACK_COLOR: Rgba<u8> = Rgba([48, 48, 48, 255]);
const SCORE_BAR_HEIGHT: u32 = 8;

/// Canvas used for frames that carry no pixels (replayed tracks)
pub const BLANK_CANVAS: (u32, u32) = (640, 480);

/// Writes `frame_000000.png`, `frame_000001.png`, ... into one directory
pub struct PngSequenceSink {
    dir: PathBuf,
    written: usize,
    finished: bool,
}

impl PngSequenceSink {
    pub fn create(dir: &Path) -> VideoResult<Self> {
        std::fs::create_dir_all(dir)?;
        Ok(Self {
            dir: dir.to_path_buf(),
            written: 0,
            finished: false,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn frames_written(&self) -> usize {
        self.written
    }
}

impl VideoSink for PngSequenceSink {
    fn write_frame(
        &mut self,
        frame: &VideoFrame,
        keypoints: Option<&FrameKeypoints>,
    ) -> VideoResult<()> {
        if self.finished {
            return Err(VideoError::Encode("Sink already finished".to_string()));
        }

        let mut canvas = to_canvas(frame)?;
        if let Some(keypoints) = keypoints {
            annotate(&mut canvas, keypoints);
        }

        let path = self.dir.join(format!("frame_{:06}.png", self.written));
        canvas
            .save(&path)
            .map_err(|e| VideoError::Encode(format!("{:?}: {}", path, e)))?;
        self.written += 1;
        Ok(())
    }

    fn finish(&mut self) -> VideoResult<()> {
        self.finished = true;
        debug!("Wrote {} annotated frames to {:?}", self.written, self.dir);
        Ok(())
    }
}

/// Draw a score bar across the top of every frame a sink wrote into `dir`.
///
/// The filled share of the bar is `score` clamped to [0, 1]. Returns the number
/// of frames stamped.
pub fn stamp_score(dir: &Path, score: f64) -> VideoResult<usize> {
    let mut frames: Vec<PathBuf> = std::fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| {
            path.file_name()
                .and_then(|name| name.to_str())
                .map_or(false, |name| name.starts_with("frame_") && name.ends_with(".png"))
        })
        .collect();
    frames.sort();

    for path in &frames {
        let mut canvas = image::open(path)?.to_rgba8();
        draw_score_bar(&mut canvas, score);
        canvas
            .save(path)
            .map_err(|e| VideoError::Encode(format!("{:?}: {}", path, e)))?;
    }

    debug!("Stamped score {:.3} on {} frames in {:?}", score, frames.len(), dir);
    Ok(frames.len())
}

fn draw_score_bar(canvas: &mut RgbaImage, score: f64) {
    let (width, height) = canvas.dimensions();
    let filled = (score.clamp(0.0, 1.0) * width as f64).round() as u32;
    for y in 0..SCORE_BAR_HEIGHT.min(height) {
        for x in 0..width {
            let color = if x < filled { SCORE_COLOR } else { SCORE_TRACK_COLOR };
            canvas.put_pixel(x, y, color);
        }
    }
}

fn to_canvas(frame: &VideoFrame) -> VideoResult<RgbaImage> {
    if !frame.has_pixels() {
        let (width, height) = BLANK_CANVAS;
        return Ok(RgbaImage::from_pixel(width, height, Rgba([0, 0, 0, 255])));
    }

    let expected = frame.width as usize * frame.height as usize * frame.format.bytes_per_pixel();
    if frame.data.len() != expected {
        return Err(VideoError::Encode(format!(
            "Frame {} has {} bytes, expected {}",
            frame.index,
            frame.data.len(),
            expected
        )));
    }

    let rgba = match frame.format {
        PixelFormat::RGBA8 => frame.data.clone(),
        PixelFormat::RGB8 => frame
            .data
            .chunks_exact(3)
            .flat_map(|px| [px[0], px[1], px[2], 255])
            .collect(),
    };

    RgbaImage::from_raw(frame.width, frame.height, rgba)
        .ok_or_else(|| VideoError::Encode(format!("Frame {} buffer size mismatch", frame.index)))
}

/// Draw skeleton segments, then landmark dots on top
fn annotate(canvas: &mut RgbaImage, keypoints: &FrameKeypoints) {
    let (width, height) = canvas.dimensions();
    let to_pixel = |x: f64, y: f64| {
        (
            (x * width as f64).round() as i64,
            (y * height as f64).round() as i64,
        )
    };

    for (from, to) in POSE_CONNECTIONS {
        if let (Some(a), Some(b)) = (keypoints.get(from), keypoints.get(to)) {
            if !a.is_visible(MIN_DRAW_VISIBILITY) || !b.is_visible(MIN_DRAW_VISIBILITY) {
                continue;
            }
            draw_line(canvas, to_pixel(a.x, a.y), to_pixel(b.x, b.y), SEGMENT_COLOR);
        }
    }

    for landmark in &keypoints.landmarks {
        if !landmark.is_visible(MIN_DRAW_VISIBILITY) {
            continue;
        }
        let (cx, cy) = to_pixel(landmark.x, landmark.y);
        for dy in -LANDMARK_RADIUS..=LANDMARK_RADIUS {
            for dx in -LANDMARK_RADIUS..=LANDMARK_RADIUS {
                if dx * dx + dy * dy <= LANDMARK_RADIUS * LANDMARK_RADIUS {
                    put(canvas, cx + dx, cy + dy, LANDMARK_COLOR);
                }
            }
        }
    }
}

fn draw_line(canvas: &mut RgbaImage, from: (i64, i64), to: (i64, i64), color: Rgba<u8>) {
    let steps = (to.0 - from.0).abs().max((to.1 - from.1).abs()).max(1);
    for step in 0..=steps {
        let t = step as f64 / steps as f64;
        let x = from.0 as f64 + (to.0 - from.0) as f64 * t;
        let y = from.1 as f64 + (to.1 - from.1) as f64 * t;
        put(canvas, x.round() as i64, y.round() as i64, color);
    }
}

// Out-of-bounds pixels are clipped
fn put(canvas: &mut RgbaImage, x: i64, y: i64, color: Rgba<u8>) {
    let (width, height) = canvas.dimensions();
    if x >= 0 && y >= 0 && (x as u32) < width && (y as u32) < height {
        canvas.put_pixel(x as u32, y as u32, color);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::pose::{BodyLandmark, Landmark};

    fn temp_dir() -> PathBuf {
        std::env::temp_dir().join(format!("proform_annotated_{}", uuid::Uuid::new_v4()))
    }

    fn rgb_frame(index: u64, width: u32, height: u32) -> VideoFrame {
        VideoFrame {
            index,
            timestamp_ms: 0,
            width,
            height,
            data: vec![0; (width * height * 3) as usize],
            format: PixelFormat::RGB8,
        }
    }

    #[test]
    fn test_writes_numbered_frames_in_order() {
        let dir = temp_dir();
        let mut sink = PngSequenceSink::create(&dir).unwrap();

        sink.write_frame(&rgb_frame(1, 8, 6), None).unwrap();
        sink.write_frame(&VideoFrame::placeholder(3, 100), None).unwrap();
        sink.finish().unwrap();

        assert_eq!(sink.frames_written(), 2);
        let first = image::open(dir.join("frame_000000.png")).unwrap();
        assert_eq!((first.width(), first.height()), (8, 6));
        let second = image::open(dir.join("frame_000001.png")).unwrap();
        assert_eq!((second.width(), second.height()), BLANK_CANVAS);

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_landmarks_are_drawn() {
        let dir = temp_dir();
        let mut sink = PngSequenceSink::create(&dir).unwrap();

        let mut landmarks = vec![Landmark::new(-1.0, -1.0); 33];
        landmarks[BodyLandmark::LeftShoulder.index()] = Landmark::new(0.5, 0.5);
        sink.write_frame(&rgb_frame(0, 20, 20), Some(&FrameKeypoints::new(landmarks)))
            .unwrap();

        let image = image::open(dir.join("frame_000000.png")).unwrap().to_rgba8();
        assert_eq!(*image.get_pixel(10, 10), LANDMARK_COLOR);
        assert_eq!(*image.get_pixel(0, 19), Rgba([0, 0, 0, 255]));

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_occluded_landmarks_are_not_drawn() {
        let dir = temp_dir();
        let mut sink = PngSequenceSink::create(&dir).unwrap();

        let mut landmarks = vec![Landmark::new(-1.0, -1.0); 33];
        landmarks[BodyLandmark::LeftShoulder.index()] = Landmark {
            visibility: Some(0.1),
            ..Landmark::new(0.5, 0.5)
        };
        sink.write_frame(&rgb_frame(0, 20, 20), Some(&FrameKeypoints::new(landmarks)))
            .unwrap();

        let image = image::open(dir.join("frame_000000.png")).unwrap().to_rgba8();
        assert_eq!(*image.get_pixel(10, 10), Rgba([0, 0, 0, 255]));

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_write_after_finish_fails() {
        let dir = temp_dir();
        let mut sink = PngSequenceSink::create(&dir).unwrap();
        sink.finish().unwrap();
        assert!(sink.write_frame(&VideoFrame::placeholder(0, 0), None).is_err());
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_score_bar_is_stamped_on_written_frames() {
        let dir = temp_dir();
        let mut sink = PngSequenceSink::create(&dir).unwrap();
        sink.write_frame(&rgb_frame(0, 20, 20), None).unwrap();
        sink.write_frame(&rgb_frame(1, 20, 20), None).unwrap();
        sink.finish().unwrap();
        std::fs::write(dir.join("notes.txt"), "not a frame").unwrap();

        assert_eq!(stamp_score(&dir, 0.25).unwrap(), 2);

        let image = image::open(dir.join("frame_000001.png")).unwrap().to_rgba8();
        assert_eq!(*image.get_pixel(4, 0), SCORE_COLOR);
        assert_eq!(*image.get_pixel(5, 0), SCORE_TRACK_COLOR);
        assert_eq!(*image.get_pixel(4, SCORE_BAR_HEIGHT), Rgba([0, 0, 0, 255]));

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_short_buffer_is_encode_error() {
        let mut frame = rgb_frame(0, 4, 4);
        frame.data.truncate(5);
        assert!(matches!(to_canvas(&frame), Err(VideoError::Encode(_))));
    }
}

// Keypoint track files - landmarks recorded per frame, replayed without decoding pixels

use super::{VideoError, VideoResult, VideoSource};
use crate::models::capture::VideoFrame;
use crate::models::pose::{FrameKeypoints, Landmark, SkeletonTopology};
use crate::platform::pose::RecordedPoseEstimator;
use serde::{Deserialize, Serialize};
use std::path::Path;

fn default_fps() -> f64 {
    30.0
}

/// On-disk track: one entry per frame, `null` where nobody was detected
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeypointTrack {
    #[serde(default)]
    pub topology: SkeletonTopology,
    #[serde(default = "default_fps")]
    pub fps: f64,
    pub frames: Vec<Option<Vec<Landmark>>>,
}

impl KeypointTrack {
    pub fn new(frames: Vec<Option<Vec<Landmark>>>) -> Self {
        Self {
            topology: SkeletonTopology::default(),
            fps: default_fps(),
            frames,
        }
    }

    pub fn load(path: &Path) -> VideoResult<Self> {
        let contents = std::fs::read_to_string(path)?;
        let track: KeypointTrack = serde_json::from_str(&contents)
            .map_err(|e| VideoError::InvalidTrack(format!("{:?}: {}", path, e)))?;
        if !(track.fps.is_finite() && track.fps > 0.0) {
            return Err(VideoError::InvalidTrack(format!(
                "{:?}: fps must be positive, got {}",
                path, track.fps
            )));
        }
        Ok(track)
    }

    pub fn save(&self, path: &Path) -> VideoResult<()> {
        let contents = serde_json::to_string_pretty(self)
            .map_err(|e| VideoError::InvalidTrack(e.to_string()))?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Split into a frame source and an estimator replaying the recorded landmarks
    pub fn into_parts(self) -> (TrackSource, RecordedPoseEstimator) {
        let source = TrackSource {
            len: self.frames.len() as u64,
            position: 0,
            fps: self.fps,
        };
        let topology = self.topology;
        let recorded = self
            .frames
            .into_iter()
            .map(|frame| {
                frame.map(|landmarks| FrameKeypoints {
                    topology,
                    landmarks,
                })
            })
            .collect();
        (source, RecordedPoseEstimator::new(recorded))
    }
}

/// Placeholder frames for each position of a keypoint track
pub struct TrackSource {
    len: u64,
    position: u64,
    fps: f64,
}

impl VideoSource for TrackSource {
    fn next_frame(&mut self) -> VideoResult<Option<VideoFrame>> {
        if self.position >= self.len {
            return Ok(None);
        }
        let index = self.position;
        self.position += 1;
        let timestamp_ms = (index as f64 * 1000.0 / self.fps).round() as i64;
        Ok(Some(VideoFrame::placeholder(index, timestamp_ms)))
    }
}

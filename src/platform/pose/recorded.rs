// Replays landmarks captured ahead of time, keyed by frame position

use super::PoseEstimator;
use crate::models::capture::VideoFrame;
use crate::models::pose::{FrameKeypoints, PoseResult};

/// Pose estimator backed by a recorded landmark track.
///
/// Frames past the end of the track, or recorded as `None`, detect nobody.
#[derive(Debug, Clone, Default)]
pub struct RecordedPoseEstimator {
    frames: Vec<Option<FrameKeypoints>>,
}

impl RecordedPoseEstimator {
    pub fn new(frames: Vec<Option<FrameKeypoints>>) -> Self {
        Self { frames }
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}

impl PoseEstimator for RecordedPoseEstimator {
    fn estimate(&self, frame: &VideoFrame) -> PoseResult<Option<FrameKeypoints>> {
        let recorded = usize::try_from(frame.index)
            .ok()
            .and_then(|i| self.frames.get(i))
            .cloned()
            .flatten();
        Ok(recorded)
    }

    fn model_info(&self) -> String {
        format!("Recorded landmark track ({} frames)", self.frames.len())
    }
}

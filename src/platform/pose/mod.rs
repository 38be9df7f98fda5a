// Pose estimation platform integration
// Provides the estimator capability, the MediaPipe bridge and recorded-landmark replay

pub mod mediapipe_bridge;
pub mod recorded;

pub use mediapipe_bridge::{parse_landmarks, DefaultEstimator, DummyEstimator};
pub use recorded::RecordedPoseEstimator;

use crate::models::capture::VideoFrame;
use crate::models::pose::{FrameKeypoints, PoseConfig, PoseResult};
use std::sync::Arc;

/// Produces landmarks for a decoded frame.
///
/// `Ok(None)` means no person was detected, which is distinct from a person
/// detected with a short landmark list.
pub trait PoseEstimator: Send + Sync {
    fn estimate(&self, frame: &VideoFrame) -> PoseResult<Option<FrameKeypoints>>;

    /// Get model info
    fn model_info(&self) -> String;
}

/// Build the live estimator selected by the enabled build features
pub fn default_estimator(config: &PoseConfig) -> PoseResult<Arc<dyn PoseEstimator>> {
    let estimator: Arc<dyn PoseEstimator> = Arc::new(DefaultEstimator::new(config)?);
    Ok(estimator)
}

// Data models for pose landmarks produced by an external pose estimator

use serde::{Deserialize, Serialize};

// ==============================================================================
// Skeleton Topology
// ==============================================================================

/// Versioned landmark topology a pose estimator reports against
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkeletonTopology {
    /// MediaPipe Pose, 33 body landmarks
    MediapipePose33,
}

impl Default for SkeletonTopology {
    fn default() -> Self {
        SkeletonTopology::MediapipePose33
    }
}

/// MediaPipe Pose Landmark indices (33 total)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum BodyLandmark {
    Nose = 0,
    LeftEyeInner = 1,
    LeftEye = 2,
    LeftEyeOuter = 3,
    RightEyeInner = 4,
    RightEye = 5,
    RightEyeOuter = 6,
    LeftEar = 7,
    RightEar = 8,
    MouthLeft = 9,
    MouthRight = 10,
    LeftShoulder = 11,
    RightShoulder = 12,
    LeftElbow = 13,
    RightElbow = 14,
    LeftWrist = 15,
    RightWrist = 16,
    LeftPinky = 17,
    RightPinky = 18,
    LeftIndex = 19,
    RightIndex = 20,
    LeftThumb = 21,
    RightThumb = 22,
    LeftHip = 23,
    RightHip = 24,
    LeftKnee = 25,
    RightKnee = 26,
    LeftAnkle = 27,
    RightAnkle = 28,
    LeftHeel = 29,
    RightHeel = 30,
    LeftFootIndex = 31,
    RightFootIndex = 32,
}

impl BodyLandmark {
    /// Position of this landmark in a MediaPipe Pose landmark list
    pub fn index(self) -> usize {
        self as usize
    }
}

/// Body segments drawn on annotated output frames
pub const POSE_CONNECTIONS: [(BodyLandmark, BodyLandmark); 12] = [
    (BodyLandmark::LeftShoulder, BodyLandmark::RightShoulder),
    (BodyLandmark::LeftShoulder, BodyLandmark::LeftElbow),
    (BodyLandmark::LeftElbow, BodyLandmark::LeftWrist),
    (BodyLandmark::RightShoulder, BodyLandmark::RightElbow),
    (BodyLandmark::RightElbow, BodyLandmark::RightWrist),
    (BodyLandmark::LeftShoulder, BodyLandmark::LeftHip),
    (BodyLandmark::RightShoulder, BodyLandmark::RightHip),
    (BodyLandmark::LeftHip, BodyLandmark::RightHip),
    (BodyLandmark::LeftHip, BodyLandmark::LeftKnee),
    (BodyLandmark::LeftKnee, BodyLandmark::LeftAnkle),
    (BodyLandmark::RightHip, BodyLandmark::RightKnee),
    (BodyLandmark::RightKnee, BodyLandmark::RightAnkle),
];

// ==============================================================================
// Landmarks
// ==============================================================================

/// One estimated anatomical point
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Landmark {
    pub x: f64, // Normalized [0, 1] for image coordinates
    pub y: f64, // Normalized [0, 1] for image coordinates
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub z: Option<f64>, // Depth relative to the hip midpoint, when reported
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub visibility: Option<f64>,
}

impl Landmark {
    pub fn new(x: f64, y: f64) -> Self {
        Self {
            x,
            y,
            z: None,
            visibility: None,
        }
    }

    pub fn is_visible(&self, threshold: f64) -> bool {
        self.visibility.map_or(true, |v| v >= threshold)
    }
}

/// Full ordered landmark set for one frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameKeypoints {
    #[serde(default)]
    pub topology: SkeletonTopology,
    pub landmarks: Vec<Landmark>,
}

impl FrameKeypoints {
    pub fn new(landmarks: Vec<Landmark>) -> Self {
        Self {
            topology: SkeletonTopology::MediapipePose33,
            landmarks,
        }
    }

    /// Look up a named landmark; `None` when the estimator output is short
    pub fn get(&self, landmark: BodyLandmark) -> Option<&Landmark> {
        self.landmarks.get(landmark.index())
    }

    /// Like [`get`](Self::get), but reports the absent landmark as an error
    pub fn require(&self, landmark: BodyLandmark) -> PoseResult<&Landmark> {
        self.get(landmark)
            .ok_or(PoseError::MissingLandmark(landmark))
    }
}

// ==============================================================================
// Configuration
// ==============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoseConfig {
    pub min_detection_confidence: f32,          // Minimum confidence for detection (default: 0.5)
    pub min_tracking_confidence: f32,           // Minimum confidence for tracking (default: 0.5)
    pub model_complexity: ModelComplexity,      // Model complexity (0=lite, 1=full, 2=heavy)
    pub python_module: String,                  // Python module exposing `process_image_bytes`
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelComplexity {
    Lite = 0,   // Fastest, less accurate
    Full = 1,   // Balanced
    Heavy = 2,  // Slowest, most accurate
}

impl Default for PoseConfig {
    fn default() -> Self {
        Self {
            min_detection_confidence: 0.5,
            min_tracking_confidence: 0.5,
            model_complexity: ModelComplexity::Full,
            python_module: "pose_inference".to_string(),
        }
    }
}

// ==============================================================================
// Error Types
// ==============================================================================

#[derive(Debug, thiserror::Error)]
pub enum PoseError {
    #[error("Landmark {0:?} missing from estimator output")]
    MissingLandmark(BodyLandmark),

    #[error("Model loading failed: {0}")]
    ModelLoadFailed(String),

    #[error("Inference failed: {0}")]
    InferenceFailed(String),

    #[error("Invalid landmark data: {0}")]
    InvalidLandmarks(String),
}

pub type PoseResult<T> = Result<T, PoseError>;

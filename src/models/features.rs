// Derived movement features: joint vectors, per-frame features and per-video vectors

use serde::{Deserialize, Serialize};

/// Integer-coded class identifier, assigned per training corpus
pub type Label = u32;

// ==============================================================================
// Joint Vectors
// ==============================================================================

/// Planar displacement between two landmarks
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct JointVector {
    pub dx: f64,
    pub dy: f64,
}

impl JointVector {
    pub fn new(dx: f64, dy: f64) -> Self {
        Self { dx, dy }
    }

    /// Euclidean distance to another vector
    pub fn distance(&self, other: &JointVector) -> f64 {
        (self.dx - other.dx).hypot(self.dy - other.dy)
    }
}

/// Comparator-path frame feature: both segments of one joint chain
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SegmentPair {
    pub upper: JointVector, // proximal -> middle
    pub lower: JointVector, // middle -> distal
}

impl SegmentPair {
    pub fn new(upper: JointVector, lower: JointVector) -> Self {
        Self { upper, lower }
    }
}

/// Classifier-path frame feature: joint angles in degrees
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AngleFeature(pub Vec<f64>);

impl AngleFeature {
    pub fn values(&self) -> &[f64] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl AsRef<[f64]> for AngleFeature {
    fn as_ref(&self) -> &[f64] {
        &self.0
    }
}

// ==============================================================================
// Video Feature Vector
// ==============================================================================

/// Elementwise mean of a video's frame features
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoFeatureVector {
    values: Vec<f64>,
    frame_count: usize,
}

impl VideoFeatureVector {
    pub fn new(values: Vec<f64>, frame_count: usize) -> Self {
        Self {
            values,
            frame_count,
        }
    }

    /// Wrap an already aggregated vector, e.g. one supplied by a caller
    pub fn from_values(values: Vec<f64>) -> Self {
        Self {
            values,
            frame_count: 1,
        }
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn dimension(&self) -> usize {
        self.values.len()
    }

    /// Number of frame features that contributed to the mean
    pub fn frame_count(&self) -> usize {
        self.frame_count
    }

    pub fn is_finite(&self) -> bool {
        self.values.iter().all(|v| v.is_finite())
    }
}

/// All feature vectors of one class in a training corpus
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LabeledSet {
    pub label: Label,
    pub vectors: Vec<VideoFeatureVector>,
}

impl LabeledSet {
    pub fn new(label: Label, vectors: Vec<VideoFeatureVector>) -> Self {
        Self { label, vectors }
    }
}

// ==============================================================================
// Error Types
// ==============================================================================

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum FeatureError {
    #[error("No valid frames: every sampled frame failed landmark extraction")]
    NoValidFrames,

    #[error("Dimension mismatch: expected {expected} features, found {found}")]
    DimensionMismatch { expected: usize, found: usize },
}

pub type FeatureResult<T> = Result<T, FeatureError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_joint_vector_distance() {
        let origin = JointVector::new(0.0, 0.0);
        assert!((JointVector::new(0.3, 0.4).distance(&origin) - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_joint_vector_distance_is_symmetric() {
        let a = JointVector::new(0.1, -0.2);
        let b = JointVector::new(-0.5, 0.6);
        assert_eq!(a.distance(&b), b.distance(&a));
        assert_eq!(a.distance(&a), 0.0);
    }

    #[test]
    fn test_video_feature_vector_finiteness() {
        assert!(VideoFeatureVector::from_values(vec![1.0, 2.0]).is_finite());
        assert!(!VideoFeatureVector::from_values(vec![1.0, f64::NAN]).is_finite());
        assert!(!VideoFeatureVector::from_values(vec![f64::INFINITY]).is_finite());
    }
}

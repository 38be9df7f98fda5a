// Frame feature aggregation - reduces a video's per-frame features to one vector

use crate::core::joint_vectors::{extract_angles, AngleSpec};
use crate::models::features::{FeatureError, FeatureResult, VideoFeatureVector};
use crate::models::pose::FrameKeypoints;
use tracing::debug;

/// Elementwise arithmetic mean of `features`.
///
/// Each column is summed in sorted order, so the result is bit-identical for
/// any permutation of the input frames.
pub fn aggregate<F: AsRef<[f64]>>(features: &[F]) -> FeatureResult<VideoFeatureVector> {
    let first = features.first().ok_or(FeatureError::NoValidFrames)?;
    let dimension = first.as_ref().len();

    for feature in features {
        let found = feature.as_ref().len();
        if found != dimension {
            return Err(FeatureError::DimensionMismatch {
                expected: dimension,
                found,
            });
        }
    }

    let count = features.len();
    let mut column = Vec::with_capacity(count);
    let mut means = Vec::with_capacity(dimension);

    for col in 0..dimension {
        column.clear();
        column.extend(features.iter().map(|f| f.as_ref()[col]));
        column.sort_by(|a, b| a.total_cmp(b));

        let sum: f64 = column.iter().sum();
        means.push(sum / count as f64);
    }

    Ok(VideoFeatureVector::new(means, count))
}

/// Angle features for every frame that has the required landmarks, then their mean.
///
/// Frames failing extraction are dropped; if none survive the result is `NoValidFrames`.
pub fn aggregate_keypoints(
    frames: &[FrameKeypoints],
    specs: &[AngleSpec],
) -> FeatureResult<VideoFeatureVector> {
    let mut features = Vec::with_capacity(frames.len());

    for (position, frame) in frames.iter().enumerate() {
        match extract_angles(frame, specs) {
            Ok(feature) => features.push(feature),
            Err(e) => debug!("Skipping frame {}: {}", position, e),
        }
    }

    debug!(
        "Aggregating {} of {} frames into a video feature vector",
        features.len(),
        frames.len()
    );
    aggregate(&features)
}

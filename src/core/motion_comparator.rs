// Motion comparison - positional frame alignment and divergence scoring against a reference

use crate::core::joint_vectors::{extract_segments, JointChain};
use crate::models::features::SegmentPair;
use crate::models::pose::FrameKeypoints;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Placeholder replaced by the formatted divergence in corrective feedback
pub const DIVERGENCE_PLACEHOLDER: &str = "{divergence}";

/// Threshold and message templates used to turn a divergence into feedback
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedbackPolicy {
    /// Divergences strictly above this are corrected
    pub threshold: f64,
    /// Must contain `{divergence}`
    pub corrective_template: String,
    pub affirmative_message: String,
}

impl Default for FeedbackPolicy {
    fn default() -> Self {
        Self {
            threshold: 0.1,
            corrective_template: format!(
                "Your movement is off by an average of {}. Try to match the reference form.",
                DIVERGENCE_PLACEHOLDER
            ),
            affirmative_message: "Your movement looks good!".to_string(),
        }
    }
}

impl FeedbackPolicy {
    pub fn feedback_for(&self, divergence: f64) -> String {
        if divergence > self.threshold {
            self.corrective_template
                .replace(DIVERGENCE_PLACEHOLDER, &format!("{:.2}", divergence))
        } else {
            self.affirmative_message.clone()
        }
    }
}

/// Result of comparing a user sequence against a reference sequence
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comparison {
    /// Mean per-frame divergence; 0 when no frames were compared
    pub divergence: f64,
    pub frames_compared: usize,
    pub frame_divergences: Vec<f64>,
    pub needs_correction: bool,
    pub feedback: String,
}

/// Divergence of one aligned frame: mean Euclidean distance of the two segments
pub fn frame_divergence(user: &SegmentPair, reference: &SegmentPair) -> f64 {
    let upper = user.upper.distance(&reference.upper);
    let lower = user.lower.distance(&reference.lower);
    (upper + lower) / 2.0
}

/// Compare two raw segment sequences frame by frame.
///
/// Both sequences are truncated to the shorter length and paired by position;
/// trailing frames of the longer one are ignored. Two empty sequences compare
/// with divergence 0.
pub fn compare(
    user: &[SegmentPair],
    reference: &[SegmentPair],
    policy: &FeedbackPolicy,
) -> Comparison {
    let aligned = user.len().min(reference.len());
    if user.len() != reference.len() {
        debug!(
            "Truncating comparison to {} frames (user {}, reference {})",
            aligned,
            user.len(),
            reference.len()
        );
    }

    let frame_divergences: Vec<f64> = user[..aligned]
        .iter()
        .zip(&reference[..aligned])
        .map(|(u, r)| frame_divergence(u, r))
        .collect();

    let divergence = if frame_divergences.is_empty() {
        0.0
    } else {
        frame_divergences.iter().sum::<f64>() / frame_divergences.len() as f64
    };

    Comparison {
        divergence,
        frames_compared: aligned,
        frame_divergences,
        needs_correction: divergence > policy.threshold,
        feedback: policy.feedback_for(divergence),
    }
}

/// Segment vectors for every frame that has the chain's landmarks.
///
/// Frames missing a landmark are dropped before alignment.
pub fn segment_sequence(frames: &[FrameKeypoints], chain: &JointChain) -> Vec<SegmentPair> {
    frames
        .iter()
        .enumerate()
        .filter_map(|(position, frame)| match extract_segments(frame, chain) {
            Ok(segments) => Some(segments),
            Err(e) => {
                debug!("Skipping frame {}: {}", position, e);
                None
            }
        })
        .collect()
}

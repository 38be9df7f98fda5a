// Joint vector extraction - turns one frame's landmarks into segment vectors and angles

use crate::models::features::{AngleFeature, JointVector, SegmentPair};
use crate::models::pose::{BodyLandmark, FrameKeypoints, PoseResult};
use serde::{Deserialize, Serialize};

/// Three landmarks forming a joint: the angle sits at `middle`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct JointChain {
    pub proximal: BodyLandmark,
    pub middle: BodyLandmark,
    pub distal: BodyLandmark,
}

impl JointChain {
    pub fn new(proximal: BodyLandmark, middle: BodyLandmark, distal: BodyLandmark) -> Self {
        Self {
            proximal,
            middle,
            distal,
        }
    }

    pub fn left_arm() -> Self {
        Self::new(
            BodyLandmark::LeftShoulder,
            BodyLandmark::LeftElbow,
            BodyLandmark::LeftWrist,
        )
    }
}

impl Default for JointChain {
    fn default() -> Self {
        Self::left_arm()
    }
}

/// A point an angle can be measured from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnglePoint {
    /// Image origin (0, 0)
    Origin,
    Landmark(BodyLandmark),
}

impl AnglePoint {
    fn resolve(&self, frame: &FrameKeypoints) -> PoseResult<(f64, f64)> {
        match self {
            AnglePoint::Origin => Ok((0.0, 0.0)),
            AnglePoint::Landmark(landmark) => {
                let point = frame.require(*landmark)?;
                Ok((point.x, point.y))
            }
        }
    }
}

/// One classifier angle feature
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AngleSpec {
    pub name: String,
    pub proximal: AnglePoint,
    pub middle: AnglePoint,
    pub distal: AnglePoint,
}

impl AngleSpec {
    /// Angle at the elbow between upper arm and forearm
    pub fn left_elbow() -> Self {
        Self {
            name: "left_elbow".to_string(),
            proximal: AnglePoint::Landmark(BodyLandmark::LeftShoulder),
            middle: AnglePoint::Landmark(BodyLandmark::LeftElbow),
            distal: AnglePoint::Landmark(BodyLandmark::LeftWrist),
        }
    }

    /// Angle at the shoulder between the image origin and the elbow
    pub fn left_shoulder() -> Self {
        Self {
            name: "left_shoulder".to_string(),
            proximal: AnglePoint::Origin,
            middle: AnglePoint::Landmark(BodyLandmark::LeftShoulder),
            distal: AnglePoint::Landmark(BodyLandmark::LeftElbow),
        }
    }

    pub fn default_set() -> Vec<AngleSpec> {
        vec![Self::left_elbow(), Self::left_shoulder()]
    }
}

/// Angle at `middle` in degrees.
///
/// This is the absolute difference of the two segment headings and is not
/// wrapped into [0, 180]; results up to 360 are returned unchanged.
pub fn joint_angle(proximal: (f64, f64), middle: (f64, f64), distal: (f64, f64)) -> f64 {
    let distal_heading = (distal.1 - middle.1).atan2(distal.0 - middle.0);
    let proximal_heading = (proximal.1 - middle.1).atan2(proximal.0 - middle.0);
    (distal_heading - proximal_heading).to_degrees().abs()
}

/// Upper (`middle - proximal`) and lower (`distal - middle`) segment vectors.
///
/// Fails with `MissingLandmark` when the frame lacks one of the chain's landmarks.
pub fn extract_segments(frame: &FrameKeypoints, chain: &JointChain) -> PoseResult<SegmentPair> {
    let proximal = frame.require(chain.proximal)?;
    let middle = frame.require(chain.middle)?;
    let distal = frame.require(chain.distal)?;

    Ok(SegmentPair::new(
        JointVector::new(middle.x - proximal.x, middle.y - proximal.y),
        JointVector::new(distal.x - middle.x, distal.y - middle.y),
    ))
}

/// One angle per `AngleSpec`, in the order given
pub fn extract_angles(frame: &FrameKeypoints, specs: &[AngleSpec]) -> PoseResult<AngleFeature> {
    let mut angles = Vec::with_capacity(specs.len());
    for spec in specs {
        angles.push(joint_angle(
            spec.proximal.resolve(frame)?,
            spec.middle.resolve(frame)?,
            spec.distal.resolve(frame)?,
        ));
    }
    Ok(AngleFeature(angles))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::pose::{Landmark, PoseError};

    fn arm_frame(shoulder: (f64, f64), elbow: (f64, f64), wrist: (f64, f64)) -> FrameKeypoints {
        let mut landmarks = vec![Landmark::new(0.0, 0.0); 33];
        landmarks[BodyLandmark::LeftShoulder.index()] = Landmark::new(shoulder.0, shoulder.1);
        landmarks[BodyLandmark::LeftElbow.index()] = Landmark::new(elbow.0, elbow.1);
        landmarks[BodyLandmark::LeftWrist.index()] = Landmark::new(wrist.0, wrist.1);
        FrameKeypoints::new(landmarks)
    }

    #[test]
    fn test_straight_arm_is_180_degrees() {
        let angle = joint_angle((0.0, 0.0), (0.5, 0.0), (1.0, 0.0));
        assert!((angle - 180.0).abs() < 1e-9);
    }

    #[test]
    fn test_bent_arm_is_90_degrees() {
        let angle = joint_angle((0.0, 0.0), (0.5, 0.0), (0.5, 0.5));
        assert!((angle - 90.0).abs() < 1e-9);
    }

    #[test]
    fn test_angle_is_not_range_reduced() {
        // distal heading 135 deg, proximal heading -135 deg
        let a = (-1.0, -1.0);
        let b = (0.0, 0.0);
        let c = (-1.0, 1.0);
        let angle = joint_angle(a, b, c);

        let expected = ((c.1 - b.1).atan2(c.0 - b.0) - (a.1 - b.1).atan2(a.0 - b.0))
            .to_degrees()
            .abs();
        assert_eq!(angle.to_bits(), expected.to_bits());
        assert!((angle - 270.0).abs() < 1e-9);
        assert!(angle > 180.0);
    }

    #[test]
    fn test_angle_is_deterministic() {
        let first = joint_angle((0.12, 0.34), (0.56, 0.78), (0.9, 0.1));
        let second = joint_angle((0.12, 0.34), (0.56, 0.78), (0.9, 0.1));
        assert_eq!(first.to_bits(), second.to_bits());
    }

    #[test]
    fn test_extract_segments() {
        let frame = arm_frame((0.2, 0.2), (0.5, 0.6), (0.5, 0.9));
        let segments = extract_segments(&frame, &JointChain::left_arm()).unwrap();

        assert!((segments.upper.dx - 0.3).abs() < 1e-12);
        assert!((segments.upper.dy - 0.4).abs() < 1e-12);
        assert_eq!(segments.lower.dx, 0.0);
        assert!((segments.lower.dy - 0.3).abs() < 1e-12);
    }

    #[test]
    fn test_extract_segments_missing_landmark() {
        // Only 14 landmarks: shoulder and elbow present, wrist absent
        let frame = FrameKeypoints::new(vec![Landmark::new(0.1, 0.1); 14]);
        match extract_segments(&frame, &JointChain::left_arm()) {
            Err(PoseError::MissingLandmark(BodyLandmark::LeftWrist)) => {}
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_empty_landmark_list_fails_extraction() {
        let frame = FrameKeypoints::new(Vec::new());
        assert!(extract_segments(&frame, &JointChain::left_arm()).is_err());
        assert!(extract_angles(&frame, &AngleSpec::default_set()).is_err());
    }

    #[test]
    fn test_extract_default_angles() {
        let frame = arm_frame((0.0, 0.0), (0.5, 0.0), (0.5, 0.5));
        let angles = extract_angles(&frame, &AngleSpec::default_set()).unwrap();

        assert_eq!(angles.len(), 2);
        // Elbow bent at a right angle
        assert!((angles.values()[0] - 90.0).abs() < 1e-9);
        // Shoulder sits on the origin: heading to origin is atan2(0, 0) = 0
        assert!((angles.values()[1] - 0.0).abs() < 1e-9);
    }

    #[test]
    fn test_angle_spec_json_shape() {
        let json = serde_json::to_string(&AngleSpec::left_shoulder()).unwrap();
        assert!(json.contains("\"proximal\":\"origin\""));
        assert!(json.contains("{\"landmark\":\"left_shoulder\"}"));
    }
}

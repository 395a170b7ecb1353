// THEORY:
// The `FeatureExtractor` is the first analytical stage of the posture engine. It
// takes the raw, noisy `KeypointSet` the pose estimator produced for one frame and
// reduces it to seven geometric measurements of the head and shoulders. Those seven
// numbers are all the scoring models ever see.
//
// Key architectural principles:
// 1.  **Validation First**: A frame is only measured when all five required
//     landmarks are present with enough confidence. One missing landmark fails the
//     whole frame with `MissingKeypoint`; the caller then holds the previous score.
//     Partial feature vectors do not exist.
// 2.  **Resolution Independence**: Points are normalized by the frame size before
//     any measurement, so the same posture yields the same vector at 480p and 4K.
// 3.  **Fixed Order**: The vector layout is part of the trained model's contract.
//     `FeatureVector::as_array` is the single place that order is written down.
// 4.  **Stateless**: Extraction is a pure function of one frame.

use crate::core_modules::geometry::{Degrees, Distance, Point};
use crate::core_modules::keypoint::keypoint::{Confidence, KeypointSet, Landmark};
use crate::error::{PostureError, PostureResult};

/// Number of features in a [`FeatureVector`].
pub const FEATURE_COUNT: usize = 7;

/// Landmarks at or below this confidence are treated as absent.
pub const DEFAULT_MIN_CONFIDENCE: Confidence = 0.3;

/// The seven geometric measurements a posture is scored from.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct FeatureVector {
    /// Distance from the nose to the midpoint of the shoulders.
    pub dist_nose_shoulders: Distance,
    /// `dist_nose_shoulders` relative to the shoulder width; 0 when the shoulders coincide.
    pub ratio_nose_shoulders: f64,
    /// Angle at the nose between the two ears.
    pub neck_tilt_angle: Degrees,
    pub dist_left_ear_nose: Distance,
    pub dist_right_ear_nose: Distance,
    /// Angle at the left shoulder between the left ear and the nose.
    pub angle_left_shoulder: Degrees,
    /// Angle at the right shoulder between the right ear and the nose.
    pub angle_right_shoulder: Degrees,
}

impl FeatureVector {
    /// The features in model input order.
    pub fn as_array(&self) -> [f64; FEATURE_COUNT] {
        [
            self.dist_nose_shoulders,
            self.ratio_nose_shoulders,
            self.neck_tilt_angle,
            self.dist_left_ear_nose,
            self.dist_right_ear_nose,
            self.angle_left_shoulder,
            self.angle_right_shoulder,
        ]
    }
}

impl From<[f64; FEATURE_COUNT]> for FeatureVector {
    fn from(values: [f64; FEATURE_COUNT]) -> Self {
        let [
            dist_nose_shoulders,
            ratio_nose_shoulders,
            neck_tilt_angle,
            dist_left_ear_nose,
            dist_right_ear_nose,
            angle_left_shoulder,
            angle_right_shoulder,
        ] = values;
        Self {
            dist_nose_shoulders,
            ratio_nose_shoulders,
            neck_tilt_angle,
            dist_left_ear_nose,
            dist_right_ear_nose,
            angle_left_shoulder,
            angle_right_shoulder,
        }
    }
}

/// Turns a `KeypointSet` into a `FeatureVector`.
#[derive(Debug, Clone)]
pub struct FeatureExtractor {
    min_confidence: Confidence,
}

impl Default for FeatureExtractor {
    fn default() -> Self {
        Self::new(DEFAULT_MIN_CONFIDENCE)
    }
}

impl FeatureExtractor {
    pub fn new(min_confidence: Confidence) -> Self {
        Self { min_confidence }
    }

    pub fn min_confidence(&self) -> Confidence {
        self.min_confidence
    }

    /// Measures one frame.
    pub fn extract(&self, keypoints: &KeypointSet) -> PostureResult<FeatureVector> {
        let (width, height) = (keypoints.frame_width, keypoints.frame_height);
        if !(width > 0.0 && height > 0.0 && width.is_finite() && height.is_finite()) {
            return Err(PostureError::InvalidFrame { width, height });
        }

        let normalized = |landmark: Landmark| -> PostureResult<Point> {
            keypoints
                .confident(landmark, self.min_confidence)
                .map(|kp| Point::new(kp.x / width, kp.y / height))
                .ok_or(PostureError::MissingKeypoint(landmark))
        };

        let nose = normalized(Landmark::Nose)?;
        let left_shoulder = normalized(Landmark::LeftShoulder)?;
        let right_shoulder = normalized(Landmark::RightShoulder)?;
        let left_ear = normalized(Landmark::LeftEar)?;
        let right_ear = normalized(Landmark::RightEar)?;

        let mid_shoulders = left_shoulder.midpoint(&right_shoulder);
        let dist_nose_shoulders = nose.distance_to(&mid_shoulders);
        let shoulder_width = left_shoulder.distance_to(&right_shoulder);
        let ratio_nose_shoulders = if shoulder_width > 0.0 {
            dist_nose_shoulders / shoulder_width
        } else {
            0.0
        };

        Ok(FeatureVector {
            dist_nose_shoulders,
            ratio_nose_shoulders,
            neck_tilt_angle: nose.angle_between(&left_ear, &right_ear),
            dist_left_ear_nose: left_ear.distance_to(&nose),
            dist_right_ear_nose: right_ear.distance_to(&nose),
            angle_left_shoulder: left_shoulder.angle_between(&left_ear, &nose),
            angle_right_shoulder: right_shoulder.angle_between(&right_ear, &nose),
        })
    }
}

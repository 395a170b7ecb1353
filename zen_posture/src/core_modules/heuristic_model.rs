// THEORY:
// The `HeuristicModel` is the scoring model of last resort. It needs no weights and
// no external resources, so it can always be constructed. The scheduler falls back to
// it whenever the trained network is unavailable or misbehaves.
//
// It maps each feature family to a 0..100 sub-score on its own, then blends them:
// 1.  **Neck tilt**: a wider angle between the ears, seen from the nose, means the
//     head is held up and back.
// 2.  **Nose height**: the nose far above the shoulders is good; a nose sinking
//     towards the shoulders is the signature of hunching. This carries the largest
//     weight.
// 3.  **Height ratio**: the same signal relative to shoulder width, which cancels
//     out distance from the camera.
// 4.  **Ears**: asymmetric ear distances mean a rotated or tilted head.
// 5.  **Shoulders**: open, symmetric shoulder angles.
//
// The blended score is stretched above 65 and compressed below 50 so that good and
// bad postures separate clearly. The stretch and compression constants were tuned
// by hand against recorded sessions and have no derivation behind them.

use crate::core_modules::feature_extractor::FeatureVector;

const NECK_TILT_WEIGHT: f64 = 0.25;
const DISTANCE_WEIGHT: f64 = 0.30;
const RATIO_WEIGHT: f64 = 0.25;
const EAR_WEIGHT: f64 = 0.10;
const SHOULDER_WEIGHT: f64 = 0.10;

/// Blended scores above this are stretched away from it.
const GOOD_BASELINE: f64 = 65.0;
const GOOD_STRETCH: f64 = 1.15;
/// Blended scores below this are compressed towards zero.
const BAD_BASELINE: f64 = 50.0;
const BAD_COMPRESSION: f64 = 0.9;

/// Feature vectors for six canonical postures, best to worst.
pub const REFERENCE_POSTURES: [[f64; 7]; 6] = [
    [0.17, 0.4, 170.0, 0.15, 0.15, 50.0, 50.0],
    [0.16, 0.5, 160.0, 0.18, 0.18, 45.0, 45.0],
    [0.14, 0.6, 150.0, 0.2, 0.2, 40.0, 40.0],
    [0.12, 0.65, 140.0, 0.22, 0.22, 35.0, 35.0],
    [0.1, 0.7, 130.0, 0.25, 0.25, 30.0, 30.0],
    [0.08, 0.85, 120.0, 0.3, 0.3, 25.0, 25.0],
];

/// Coarse quality bands for a 0..100 posture score.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PostureBand {
    /// 65 and above.
    Good,
    /// 50 to 64.
    Average,
    /// Below 50.
    Bad,
}

impl PostureBand {
    pub fn from_score(score: u8) -> Self {
        match score {
            65.. => PostureBand::Good,
            50..=64 => PostureBand::Average,
            _ => PostureBand::Bad,
        }
    }
}

/// The five sub-scores and the blended result for one feature vector.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoreBreakdown {
    pub neck_tilt: f64,
    pub distance: f64,
    pub ratio: f64,
    pub ear: f64,
    pub shoulder: f64,
    /// Weighted sum before the good/bad band adjustment.
    pub combined: f64,
    /// Final score in [0, 100].
    pub score: f64,
}

/// Closed-form posture scorer with no external dependencies.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeuristicModel;

impl HeuristicModel {
    pub fn new() -> Self {
        let model = HeuristicModel;
        for (i, posture) in REFERENCE_POSTURES.iter().enumerate() {
            let score = (model.predict(&FeatureVector::from(*posture)) * 100.0).round() as u8;
            tracing::debug!(
                example = i + 1,
                score,
                band = ?PostureBand::from_score(score),
                "Heuristic model reference posture"
            );
        }
        model
    }

    /// Score in [0, 1]. Defined for every input, including non-finite features.
    pub fn predict(&self, features: &FeatureVector) -> f64 {
        self.breakdown(features).score / 100.0
    }

    pub fn breakdown(&self, features: &FeatureVector) -> ScoreBreakdown {
        let neck_tilt = neck_tilt_score(features.neck_tilt_angle);
        let distance = distance_score(features.dist_nose_shoulders);
        let ratio = ratio_score(features.ratio_nose_shoulders);
        let ear = ear_score(features.dist_left_ear_nose, features.dist_right_ear_nose);
        let shoulder = shoulder_score(features.angle_left_shoulder, features.angle_right_shoulder);

        let combined = neck_tilt * NECK_TILT_WEIGHT
            + distance * DISTANCE_WEIGHT
            + ratio * RATIO_WEIGHT
            + ear * EAR_WEIGHT
            + shoulder * SHOULDER_WEIGHT;

        let adjusted = if combined > GOOD_BASELINE {
            GOOD_BASELINE + (combined - GOOD_BASELINE) * GOOD_STRETCH
        } else if combined < BAD_BASELINE {
            combined * BAD_COMPRESSION
        } else {
            combined
        };

        let score = if adjusted.is_finite() {
            adjusted.round().clamp(0.0, 100.0)
        } else {
            0.0
        };

        ScoreBreakdown {
            neck_tilt,
            distance,
            ratio,
            ear,
            shoulder,
            combined,
            score,
        }
    }
}

fn neck_tilt_score(angle: f64) -> f64 {
    (angle / 180.0).max(0.0).powf(1.2) * 100.0
}

fn distance_score(d: f64) -> f64 {
    if d < 0.08 {
        0.0
    } else if d < 0.12 {
        30.0 + (d - 0.08) * 375.0
    } else if d < 0.16 {
        45.0 + (d - 0.12) * 500.0
    } else if d < 0.22 {
        65.0 + (d - 0.16) * 417.0
    } else {
        // Leaning back is only mildly penalized.
        (90.0 - (d - 0.22) * 250.0).max(50.0)
    }
}

fn ratio_score(r: f64) -> f64 {
    if r < 0.4 {
        85.0 + (0.4 - r) * 37.5
    } else if r < 0.5 {
        65.0 + (0.5 - r) * 200.0
    } else if r < 0.65 {
        45.0 + (0.65 - r) * 133.0
    } else if r < 0.8 {
        20.0 + (0.8 - r) * 167.0
    } else {
        (20.0 - (r - 0.8) * 60.0).max(0.0)
    }
}

fn ear_score(left: f64, right: f64) -> f64 {
    let asymmetry = (left - right).abs();
    let average = (left + right) / 2.0;
    (100.0 - asymmetry * 300.0 - average * 150.0).max(0.0)
}

fn shoulder_score(left: f64, right: f64) -> f64 {
    let average = (left + right) / 2.0;
    let asymmetry = (left - right).abs();
    (20.0 + average * 1.2 - asymmetry * 1.5).max(0.0).min(100.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_modules::feature_extractor::FeatureExtractor;
    use crate::core_modules::keypoint::keypoint::{Keypoint, KeypointSet};
    use proptest::prelude::*;

    fn scored(nose_y: f64) -> (FeatureVector, ScoreBreakdown) {
        let set = KeypointSet::new(1.0, 1.0)
            .with_point("nose", Keypoint::new(0.5, nose_y, 0.9))
            .with_point("left_shoulder", Keypoint::new(0.35, 0.5, 0.9))
            .with_point("right_shoulder", Keypoint::new(0.65, 0.5, 0.9))
            .with_point("left_ear", Keypoint::new(0.4, 0.25, 0.9))
            .with_point("right_ear", Keypoint::new(0.6, 0.25, 0.9));
        let features = FeatureExtractor::default().extract(&set).unwrap();
        (features, HeuristicModel.breakdown(&features))
    }

    #[test]
    fn upright_posture_lands_in_good_band() {
        let (features, breakdown) = scored(0.3);
        assert!((features.dist_nose_shoulders - 0.2).abs() < 1e-9);
        assert!((breakdown.distance - 81.68).abs() < 1e-6);
        let score = (HeuristicModel.predict(&features) * 100.0).round() as u8;
        assert!(score >= 65, "score was {score}");
        assert_eq!(PostureBand::from_score(score), PostureBand::Good);
    }

    #[test]
    fn hunched_posture_lands_in_bad_band() {
        let (features, breakdown) = scored(0.45);
        assert!(features.dist_nose_shoulders < 0.08);
        assert_eq!(breakdown.distance, 0.0);
        let score = (HeuristicModel.predict(&features) * 100.0).round() as u8;
        assert!(score < 50, "score was {score}");
    }

    #[test]
    fn reference_postures_are_ordered() {
        let scores: Vec<f64> = REFERENCE_POSTURES
            .iter()
            .map(|p| HeuristicModel.predict(&FeatureVector::from(*p)))
            .collect();
        assert!(scores.windows(2).all(|w| w[0] > w[1]), "{scores:?}");
        assert_eq!(scores[0], 0.84);
        assert_eq!(scores[5], 0.35);
    }

    #[test]
    fn band_boundaries() {
        assert_eq!(PostureBand::from_score(100), PostureBand::Good);
        assert_eq!(PostureBand::from_score(65), PostureBand::Good);
        assert_eq!(PostureBand::from_score(64), PostureBand::Average);
        assert_eq!(PostureBand::from_score(50), PostureBand::Average);
        assert_eq!(PostureBand::from_score(49), PostureBand::Bad);
    }

    #[test]
    fn non_finite_features_score_within_range() {
        let features = FeatureVector::from([f64::NAN, f64::INFINITY, -1.0, f64::INFINITY, f64::INFINITY, f64::NAN, 0.0]);
        let p = HeuristicModel.predict(&features);
        assert!((0.0..=1.0).contains(&p));
    }

    proptest! {
        #[test]
        fn predict_is_always_a_probability(values in proptest::array::uniform7(-1.0e6f64..1.0e6)) {
            let p = HeuristicModel.predict(&FeatureVector::from(values));
            prop_assert!((0.0..=1.0).contains(&p));
        }
    }
}

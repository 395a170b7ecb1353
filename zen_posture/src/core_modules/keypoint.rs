// THEORY:
// The `Keypoint` module is the most fundamental unit of the posture engine. It is a
// "dumb" data container for what the external pose estimator saw in one frame: a set
// of named anatomical landmarks, each with a pixel position and a confidence, plus
// the size of the frame those pixels were measured in.
//
// Key principles:
// 1) No geometry here. Distances and angles live in `geometry`, feature assembly in
//    `feature_extractor`. A `KeypointSet` only knows how to hand back a landmark that
//    is trustworthy enough to use.
// 2) Open vocabulary. Pose models emit many more landmarks than the five the score
//    needs (BlazePose has 33), so the set is keyed by name and keeps everything it is
//    given. `Landmark` names the subset the engine actually reads.
// 3) Immutable per tick. A set is produced once per detection tick and owned by it.

pub mod keypoint {
    use serde::{Deserialize, Serialize};
    use std::collections::BTreeMap;
    use std::fmt;
    use std::str::FromStr;

    pub type Coordinate = f64;
    pub type Confidence = f64;

    /// The landmarks the posture score is computed from.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
    pub enum Landmark {
        Nose,
        LeftShoulder,
        RightShoulder,
        LeftEar,
        RightEar,
    }

    impl Landmark {
        /// Every landmark that must be present for a frame to be scored.
        pub const REQUIRED: [Landmark; 5] = [
            Landmark::Nose,
            Landmark::LeftShoulder,
            Landmark::RightShoulder,
            Landmark::LeftEar,
            Landmark::RightEar,
        ];

        /// The name pose estimators use for this landmark.
        pub fn name(&self) -> &'static str {
            match self {
                Landmark::Nose => "nose",
                Landmark::LeftShoulder => "left_shoulder",
                Landmark::RightShoulder => "right_shoulder",
                Landmark::LeftEar => "left_ear",
                Landmark::RightEar => "right_ear",
            }
        }
    }

    impl fmt::Display for Landmark {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str(self.name())
        }
    }

    impl FromStr for Landmark {
        type Err = String;

        fn from_str(s: &str) -> Result<Self, Self::Err> {
            Landmark::REQUIRED
                .into_iter()
                .find(|landmark| landmark.name() == s)
                .ok_or_else(|| format!("unknown landmark '{s}'"))
        }
    }

    /// A single landmark observation in source-frame pixel coordinates.
    #[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
    pub struct Keypoint {
        /// Horizontal position in pixels.
        pub x: Coordinate,
        /// Vertical position in pixels, growing downwards.
        pub y: Coordinate,
        /// Detector confidence in [0, 1].
        #[serde(alias = "score")]
        pub confidence: Confidence,
    }

    impl Keypoint {
        pub fn new(x: Coordinate, y: Coordinate, confidence: Confidence) -> Self {
            Self { x, y, confidence }
        }

        /// True when the observation is finite and strictly above `min_confidence`.
        pub fn is_usable(&self, min_confidence: Confidence) -> bool {
            self.x.is_finite()
                && self.y.is_finite()
                && self.confidence.is_finite()
                && self.confidence > min_confidence
        }
    }

    /// Every landmark the pose estimator reported for one frame.
    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    pub struct KeypointSet {
        /// Landmark name → observation, ordered by name.
        pub points: BTreeMap<String, Keypoint>,
        /// Width of the source frame in pixels.
        pub frame_width: f64,
        /// Height of the source frame in pixels.
        pub frame_height: f64,
    }

    impl KeypointSet {
        pub fn new(frame_width: f64, frame_height: f64) -> Self {
            Self {
                points: BTreeMap::new(),
                frame_width,
                frame_height,
            }
        }

        /// Builder-style insert, convenient for sources and tests.
        pub fn with_point(mut self, name: impl Into<String>, keypoint: Keypoint) -> Self {
            self.points.insert(name.into(), keypoint);
            self
        }

        pub fn insert(&mut self, name: impl Into<String>, keypoint: Keypoint) {
            self.points.insert(name.into(), keypoint);
        }

        pub fn get(&self, name: &str) -> Option<&Keypoint> {
            self.points.get(name)
        }

        /// The landmark's observation, if present and confident enough to use.
        pub fn confident(&self, landmark: Landmark, min_confidence: Confidence) -> Option<&Keypoint> {
            self.get(landmark.name())
                .filter(|keypoint| keypoint.is_usable(min_confidence))
        }

        pub fn len(&self) -> usize {
            self.points.len()
        }

        pub fn is_empty(&self) -> bool {
            self.points.is_empty()
        }
    }
}

#![allow(dead_code)]

use futures::future::{self, BoxFuture};
use std::sync::{Arc, Mutex};
use zen_posture::{
    Collaborators, Keypoint, KeypointSet, KeypointSource, MemoryConfigStore, Notification,
    NotificationKind, NotificationSink, PersistenceService, PostureError, PostureResult, PostureSample,
    TrainedModel,
};

/// Upright sitter: the heuristic scores this 65.
pub fn upright() -> KeypointSet {
    scaled(0.3)
}

/// Head dropped towards the shoulders: the heuristic scores this 41.
pub fn hunched() -> KeypointSet {
    scaled(0.45)
}

fn scaled(nose_y: f64) -> KeypointSet {
    let (w, h) = (640.0, 480.0);
    KeypointSet::new(w, h)
        .with_point("nose", Keypoint::new(0.5 * w, nose_y * h, 0.95))
        .with_point("left_shoulder", Keypoint::new(0.35 * w, 0.5 * h, 0.9))
        .with_point("right_shoulder", Keypoint::new(0.65 * w, 0.5 * h, 0.9))
        .with_point("left_ear", Keypoint::new(0.4 * w, 0.25 * h, 0.8))
        .with_point("right_ear", Keypoint::new(0.6 * w, 0.25 * h, 0.8))
}

pub fn without(mut keypoints: KeypointSet, name: &str) -> KeypointSet {
    keypoints.points.remove(name);
    keypoints
}

/// A trained network that overflows to NaN for upright frames (neck tilt above 90
/// degrees) and scores hunched frames exactly 50.
pub fn diverging_model() -> TrainedModel {
    const FEATURES: usize = 7;
    const HIDDEN: usize = 16;
    let mut kernel1 = vec![0.0; FEATURES * HIDDEN];
    kernel1[2 * HIDDEN] = 1e300;
    let mut bias1 = vec![0.0; HIDDEN];
    bias1[0] = -90.0 * 1e300;
    let mut kernel2 = vec![0.0; HIDDEN * HIDDEN];
    kernel2[0] = 1e300;
    kernel2[1] = 1e300;
    let mut kernel3 = vec![0.0; HIDDEN];
    kernel3[0] = 1.0;
    kernel3[1] = -1.0;
    TrainedModel::from_tensors(vec![kernel1, bias1, kernel2, vec![0.0; HIDDEN], kernel3, vec![0.0]]).unwrap()
}

/// Plays a fixed script of detections, repeating the last entry forever.
pub struct ScriptedSource {
    frames: Vec<PostureResult<Option<KeypointSet>>>,
    cursor: usize,
}

impl ScriptedSource {
    pub fn new(frames: Vec<Option<KeypointSet>>) -> Self {
        Self {
            frames: frames.into_iter().map(Ok).collect(),
            cursor: 0,
        }
    }

    pub fn always(keypoints: KeypointSet) -> Self {
        Self::new(vec![Some(keypoints)])
    }

    pub fn failing() -> Self {
        Self {
            frames: vec![Err(PostureError::sink("camera unplugged"))],
            cursor: 0,
        }
    }
}

impl KeypointSource for ScriptedSource {
    fn next_keypoints(&mut self) -> BoxFuture<'_, PostureResult<Option<KeypointSet>>> {
        let index = self.cursor.min(self.frames.len() - 1);
        self.cursor += 1;
        let frame = match &self.frames[index] {
            Ok(frame) => Ok(frame.clone()),
            Err(e) => Err(PostureError::sink(e.to_string())),
        };
        Box::pin(future::ready(frame))
    }
}

#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<Notification>>,
}

impl RecordingNotifier {
    pub fn sent(&self) -> Vec<Notification> {
        self.sent.lock().unwrap().clone()
    }

    pub fn count(&self, kind: NotificationKind) -> usize {
        self.sent().iter().filter(|n| n.kind == kind).count()
    }
}

impl NotificationSink for RecordingNotifier {
    fn notify(&self, notification: Notification) -> BoxFuture<'_, PostureResult<()>> {
        self.sent.lock().unwrap().push(notification);
        Box::pin(future::ready(Ok(())))
    }
}

/// A notification sink that blows up on every call.
pub struct PanickingNotifier;

impl NotificationSink for PanickingNotifier {
    fn notify(&self, notification: Notification) -> BoxFuture<'_, PostureResult<()>> {
        panic!("notification backend crashed on {:?}", notification.kind);
    }
}

#[derive(Default)]
pub struct RecordingPersistence {
    samples: Mutex<Vec<PostureSample>>,
}

impl RecordingPersistence {
    pub fn samples(&self) -> Vec<PostureSample> {
        self.samples.lock().unwrap().clone()
    }
}

impl PersistenceService for RecordingPersistence {
    fn record_sample(&self, sample: PostureSample) -> BoxFuture<'_, PostureResult<()>> {
        self.samples.lock().unwrap().push(sample);
        Box::pin(future::ready(Ok(())))
    }
}

/// Persistence that is always offline.
pub struct OfflinePersistence;

impl PersistenceService for OfflinePersistence {
    fn record_sample(&self, _sample: PostureSample) -> BoxFuture<'_, PostureResult<()>> {
        Box::pin(future::ready(Err(PostureError::sink("persistence offline"))))
    }
}

pub struct Harness {
    pub notifier: Arc<RecordingNotifier>,
    pub persistence: Arc<RecordingPersistence>,
    pub store: Arc<MemoryConfigStore>,
}

impl Harness {
    pub fn new() -> Self {
        Self {
            notifier: Arc::new(RecordingNotifier::default()),
            persistence: Arc::new(RecordingPersistence::default()),
            store: Arc::new(MemoryConfigStore::new()),
        }
    }

    pub fn with_thresholds(self, value: u8, notifications_enabled: bool) -> Self {
        zen_posture::ThresholdConfig::new(value, notifications_enabled)
            .save(&*self.store)
            .unwrap();
        self
    }

    pub fn collaborators(&self, source: impl KeypointSource + 'static) -> Collaborators {
        Collaborators {
            source: Box::new(source),
            persistence: self.persistence.clone(),
            notifier: self.notifier.clone(),
            config_store: self.store.clone(),
        }
    }
}

// THEORY:
// The engine talks to the outside world through three narrow, asynchronous seams.
// It pulls keypoints from a `KeypointSource`, pushes score samples to a
// `PersistenceService`, and pushes user-facing messages to a `NotificationSink`.
// Each is a trait object so the scheduler can be driven by a camera, a recording
// or a test double without knowing which.
//
// Key architectural principles:
// 1.  **Fire and forget**: sinks return a result only so failures can be logged.
//     The scheduler never retries and never lets a sink failure reach another task.
// 2.  **No blocking**: a source with nothing to offer answers `None` straight away.
//     A stalled source simply yields no update for that tick.
// 3.  **Boxed futures**: methods return `BoxFuture` so the traits stay object safe
//     and the futures can move onto the runtime's worker threads.

use crate::core_modules::keypoint::keypoint::KeypointSet;
use crate::core_modules::smoother::Score;
use crate::error::{PostureError, PostureResult};
use chrono::{DateTime, Utc};
use futures::future::{self, BoxFuture};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

/// Supplies one keypoint estimate per detection tick.
pub trait KeypointSource: Send {
    /// `Ok(None)` means no person was detected this tick.
    fn next_keypoints(&mut self) -> BoxFuture<'_, PostureResult<Option<KeypointSet>>>;
}

/// One telemetry record handed to persistence by the sampling tick.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PostureSample {
    pub score: Score,
    pub timestamp: DateTime<Utc>,
    /// Session length in seconds the sample stands for.
    #[serde(default)]
    pub duration: u64,
}

impl PostureSample {
    pub fn new(score: Score, timestamp: DateTime<Utc>) -> Self {
        Self {
            score: score.min(100),
            timestamp,
            duration: 0,
        }
    }
}

pub trait PersistenceService: Send + Sync {
    fn record_sample(&self, sample: PostureSample) -> BoxFuture<'_, PostureResult<()>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NotificationKind {
    PostureAlert,
    Reminder,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub kind: NotificationKind,
    pub title: String,
    pub body: String,
}

impl Notification {
    pub fn new(kind: NotificationKind, title: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            kind,
            title: title.into(),
            body: body.into(),
        }
    }
}

pub trait NotificationSink: Send + Sync {
    fn notify(&self, notification: Notification) -> BoxFuture<'_, PostureResult<()>>;
}

/// A source fed through a channel by whatever produces keypoints.
pub struct ChannelKeypointSource {
    receiver: mpsc::Receiver<KeypointSet>,
}

impl ChannelKeypointSource {
    pub fn new(receiver: mpsc::Receiver<KeypointSet>) -> Self {
        Self { receiver }
    }

    /// A bounded channel and the source reading from it.
    pub fn channel(capacity: usize) -> (mpsc::Sender<KeypointSet>, Self) {
        let (sender, receiver) = mpsc::channel(capacity);
        (sender, Self::new(receiver))
    }
}

impl KeypointSource for ChannelKeypointSource {
    fn next_keypoints(&mut self) -> BoxFuture<'_, PostureResult<Option<KeypointSet>>> {
        // Only the most recent estimate matters; older ones are stale.
        let mut latest = None;
        while let Ok(keypoints) = self.receiver.try_recv() {
            latest = Some(keypoints);
        }
        Box::pin(future::ready(Ok(latest)))
    }
}

/// Writes notifications to the log instead of a desktop.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingNotifier;

impl NotificationSink for TracingNotifier {
    fn notify(&self, notification: Notification) -> BoxFuture<'_, PostureResult<()>> {
        tracing::info!(
            kind = ?notification.kind,
            title = %notification.title,
            body = %notification.body,
            "Notification"
        );
        Box::pin(future::ready(Ok(())))
    }
}

/// Accepts samples and discards them.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullPersistence;

impl PersistenceService for NullPersistence {
    fn record_sample(&self, sample: PostureSample) -> BoxFuture<'_, PostureResult<()>> {
        tracing::trace!(score = sample.score, "Discarding posture sample");
        Box::pin(future::ready(Ok(())))
    }
}

/// Forwards samples into a channel, for consumers living on another task.
#[derive(Debug, Clone)]
pub struct ChannelPersistence {
    sender: mpsc::UnboundedSender<PostureSample>,
}

impl ChannelPersistence {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<PostureSample>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }
}

impl PersistenceService for ChannelPersistence {
    fn record_sample(&self, sample: PostureSample) -> BoxFuture<'_, PostureResult<()>> {
        let result = self
            .sender
            .send(sample)
            .map_err(|_| PostureError::sink("sample receiver dropped"));
        Box::pin(future::ready(result))
    }
}

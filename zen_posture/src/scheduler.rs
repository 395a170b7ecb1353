// THEORY:
// The `Scheduler` is the only stateful component of the engine. It runs three
// independent periodic tasks on the tokio runtime:
//
// - **Detection** (default 100ms): pull keypoints, run the pipeline, commit the
//   score, evaluate the alert policy. It is the single writer of `ScoreState` and
//   the sole owner of `AlertState`.
// - **Sampling** (default 5s): hand the latest smoothed score to persistence.
// - **Reminder** (default 60s): send a wellness reminder when notifications are on.
//
// Key architectural principles:
// 1.  **Isolation**: every tick body runs under `catch_unwind`. A panic or error in
//     one tick is logged and counted. It never ends its task and never reaches the
//     other two.
// 2.  **Single writer**: readers see the score through a watch channel snapshot and
//     cannot block the detection task.
// 3.  **Ordered shutdown**: a shutdown signal stops all three loops, then the
//     inference worker is drained, and only then is the model disposed.
// 4.  **Accounting**: detection ticks are timed against their period, in the manner
//     of a real-time frame budget, and the totals come back in the final report.

use crate::collaborators::{
    KeypointSource, Notification, NotificationKind, NotificationSink, PersistenceService, PostureSample,
};
use crate::config::{AlertConfig, AppConfig, ConfigStore, ThresholdConfig};
use crate::core_modules::alert_policy::{AlertDecision, AlertPolicy, AlertState};
use crate::core_modules::scoring_model::ModelSelection;
use crate::error::{PostureError, PostureResult};
use crate::pipeline::{HoldReason, PosturePipeline, Report};
use crate::state::{ScoreBoard, ScoreReader, ScoreState};
use chrono::Utc;
use futures::FutureExt;
use serde::Serialize;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, Interval, MissedTickBehavior};

/// Everything outside the engine that the scheduler talks to.
pub struct Collaborators {
    pub source: Box<dyn KeypointSource>,
    pub persistence: Arc<dyn PersistenceService>,
    pub notifier: Arc<dyn NotificationSink>,
    pub config_store: Arc<dyn ConfigStore>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DetectionStats {
    pub ticks: u64,
    pub scored: u64,
    pub held_no_detection: u64,
    pub held_missing_keypoint: u64,
    pub held_invalid_frame: u64,
    pub held_prediction_failed: u64,
    /// Stale results and an unavailable worker.
    pub held_other: u64,
    pub panics: u64,
    pub alerts_fired: u64,
    pub deadline_misses: u64,
    pub worst_case: Duration,
}

impl DetectionStats {
    fn record(&mut self, report: &Report) {
        match report {
            Report::Scored { .. } => self.scored += 1,
            Report::Held(HoldReason::NoDetection) => self.held_no_detection += 1,
            Report::Held(HoldReason::MissingKeypoint(_)) => self.held_missing_keypoint += 1,
            Report::Held(HoldReason::InvalidFrame) => self.held_invalid_frame += 1,
            Report::Held(HoldReason::PredictionFailed(_)) => self.held_prediction_failed += 1,
            Report::Held(HoldReason::StaleResult | HoldReason::WorkerUnavailable) => self.held_other += 1,
        }
    }

    fn time(&mut self, elapsed: Duration, budget: Duration) {
        if elapsed > budget {
            self.deadline_misses += 1;
        }
        if elapsed > self.worst_case {
            self.worst_case = elapsed;
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SamplingStats {
    pub ticks: u64,
    pub recorded: u64,
    /// Ticks before the first score existed.
    pub skipped: u64,
    pub failures: u64,
    pub panics: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReminderStats {
    pub ticks: u64,
    pub sent: u64,
    /// Ticks with notifications switched off.
    pub suppressed: u64,
    pub failures: u64,
    pub panics: u64,
}

/// What a session did, returned once it has shut down.
#[derive(Debug, Clone, Serialize)]
pub struct SchedulerReport {
    pub model: &'static str,
    pub degraded: bool,
    pub final_state: ScoreStateSummary,
    pub detection: DetectionStats,
    pub sampling: SamplingStats,
    pub reminder: ReminderStats,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct ScoreStateSummary {
    pub raw_score: Option<u8>,
    pub smoothed_score: Option<u8>,
    pub tick: u64,
}

impl From<ScoreState> for ScoreStateSummary {
    fn from(state: ScoreState) -> Self {
        Self {
            raw_score: state.raw_score,
            smoothed_score: state.smoothed_score,
            tick: state.tick,
        }
    }
}

pub struct Scheduler;

impl Scheduler {
    /// Validates the configuration and starts the three tasks. Must be called from
    /// within a tokio runtime.
    pub fn start(config: AppConfig, selection: ModelSelection, collaborators: Collaborators) -> PostureResult<SchedulerHandle> {
        config.validate()?;

        let thresholds = ThresholdConfig::load(collaborators.config_store.as_ref()).unwrap_or_else(|e| {
            tracing::warn!(error = %e, "Could not read thresholds, using defaults");
            ThresholdConfig::default()
        });

        let ModelSelection { model, degraded, reason } = selection;
        if degraded {
            tracing::warn!(reason = reason.as_deref().unwrap_or("unknown"), "Running in degraded mode with the fallback model");
        }

        let pipeline = PosturePipeline::new(&config.pipeline, model);
        let model_name = pipeline.model_name();
        let board = ScoreBoard::new();
        let scores = board.reader();

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (thresholds_tx, thresholds_rx) = watch::channel(thresholds);

        tracing::info!(
            model = model_name,
            degraded,
            threshold = thresholds.value,
            notifications = thresholds.notifications_enabled,
            detection_ms = config.scheduler.detection_period_ms,
            sampling_ms = config.scheduler.sampling_period_ms,
            reminder_ms = config.scheduler.reminder_period_ms,
            "Starting posture scheduler"
        );

        let detection = DetectionTask {
            pipeline,
            source: collaborators.source,
            board,
            policy: AlertPolicy::new(config.alert.cooldown()),
            alert_state: AlertState::default(),
            thresholds: thresholds_rx.clone(),
            notifier: collaborators.notifier.clone(),
            texts: config.alert.clone(),
            period: config.scheduler.detection_period(),
            stats: DetectionStats::default(),
        };
        let sampling = SamplingTask {
            scores: scores.clone(),
            persistence: collaborators.persistence,
            period: config.scheduler.sampling_period(),
            stats: SamplingStats::default(),
        };
        let reminder = ReminderTask {
            thresholds: thresholds_rx,
            notifier: collaborators.notifier,
            texts: config.alert,
            period: config.scheduler.reminder_period(),
            stats: ReminderStats::default(),
        };

        Ok(SchedulerHandle {
            detection: tokio::spawn(detection.run(shutdown_rx.clone())),
            sampling: tokio::spawn(sampling.run(shutdown_rx.clone())),
            reminder: tokio::spawn(reminder.run(shutdown_rx)),
            shutdown: shutdown_tx,
            thresholds: thresholds_tx,
            config_store: collaborators.config_store,
            scores,
            model_name,
            degraded,
            degraded_reason: reason,
        })
    }
}

/// Control and observation surface of a running scheduler.
pub struct SchedulerHandle {
    detection: JoinHandle<(DetectionStats, PosturePipeline)>,
    sampling: JoinHandle<SamplingStats>,
    reminder: JoinHandle<ReminderStats>,
    shutdown: watch::Sender<bool>,
    thresholds: watch::Sender<ThresholdConfig>,
    config_store: Arc<dyn ConfigStore>,
    scores: ScoreReader,
    model_name: &'static str,
    degraded: bool,
    degraded_reason: Option<String>,
}

impl SchedulerHandle {
    pub fn snapshot(&self) -> ScoreState {
        self.scores.snapshot()
    }

    /// A reader that can wait for new scores, for UIs.
    pub fn scores(&self) -> ScoreReader {
        self.scores.clone()
    }

    pub fn model_name(&self) -> &'static str {
        self.model_name
    }

    pub fn is_degraded(&self) -> bool {
        self.degraded
    }

    pub fn degraded_reason(&self) -> Option<&str> {
        self.degraded_reason.as_deref()
    }

    pub fn thresholds(&self) -> ThresholdConfig {
        *self.thresholds.borrow()
    }

    /// Persists new thresholds and applies them from the next tick on.
    pub fn set_thresholds(&self, thresholds: ThresholdConfig) -> PostureResult<()> {
        let thresholds = ThresholdConfig::new(thresholds.value, thresholds.notifications_enabled);
        thresholds.save(self.config_store.as_ref())?;
        self.thresholds.send_replace(thresholds);
        tracing::info!(
            threshold = thresholds.value,
            notifications = thresholds.notifications_enabled,
            "Thresholds updated"
        );
        Ok(())
    }

    /// Stops all tasks, drains inference and disposes the model.
    pub async fn shutdown(self) -> PostureResult<SchedulerReport> {
        tracing::info!("Shutting down posture scheduler");
        self.shutdown.send_replace(true);

        let (detection, sampling, reminder) = tokio::join!(self.detection, self.sampling, self.reminder);
        let sampling = sampling.map_err(|e| PostureError::TaskFailed(format!("sampling: {e}")))?;
        let reminder = reminder.map_err(|e| PostureError::TaskFailed(format!("reminder: {e}")))?;
        let (detection, pipeline) = detection.map_err(|e| PostureError::TaskFailed(format!("detection: {e}")))?;

        pipeline.shutdown().await?.dispose();

        let report = SchedulerReport {
            model: self.model_name,
            degraded: self.degraded,
            final_state: self.scores.snapshot().into(),
            detection,
            sampling,
            reminder,
        };
        tracing::info!(
            ticks = report.detection.ticks,
            scored = report.detection.scored,
            alerts = report.detection.alerts_fired,
            deadline_misses = report.detection.deadline_misses,
            worst_case = ?report.detection.worst_case,
            samples = report.sampling.recorded,
            reminders = report.reminder.sent,
            "Posture scheduler stopped"
        );
        Ok(report)
    }
}

fn periodic(period: Duration) -> Interval {
    let mut interval = time::interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    interval
}

/// Resolves once shutdown is requested or the handle is gone.
async fn stopped(shutdown: &mut watch::Receiver<bool>) {
    let _ = shutdown.wait_for(|stop| *stop).await;
}

struct DetectionTask {
    pipeline: PosturePipeline,
    source: Box<dyn KeypointSource>,
    board: ScoreBoard,
    policy: AlertPolicy,
    alert_state: AlertState,
    thresholds: watch::Receiver<ThresholdConfig>,
    notifier: Arc<dyn NotificationSink>,
    texts: AlertConfig,
    period: Duration,
    stats: DetectionStats,
}

impl DetectionTask {
    async fn run(mut self, mut shutdown: watch::Receiver<bool>) -> (DetectionStats, PosturePipeline) {
        let mut interval = periodic(self.period);
        let mut tick: u64 = 0;

        loop {
            tokio::select! {
                biased;
                _ = stopped(&mut shutdown) => break,
                _ = interval.tick() => {}
            }

            tick += 1;
            self.stats.ticks += 1;
            let started = Instant::now();

            match AssertUnwindSafe(self.tick(tick)).catch_unwind().await {
                Ok(report) => self.stats.record(&report),
                Err(_) => {
                    self.stats.panics += 1;
                    tracing::error!(tick, "Detection tick panicked, holding previous score");
                }
            }
            self.stats.time(started.elapsed(), self.period);
        }

        (self.stats, self.pipeline)
    }

    async fn tick(&mut self, tick: u64) -> Report {
        let keypoints = match self.source.next_keypoints().await {
            Ok(Some(keypoints)) => keypoints,
            Ok(None) => return Report::Held(HoldReason::NoDetection),
            Err(e) => {
                tracing::debug!(tick, error = %e, "Keypoint source failed, treating as no detection");
                return Report::Held(HoldReason::NoDetection);
            }
        };

        let previous = self.board.snapshot().smoothed_score;
        let report = self.pipeline.process(tick, &keypoints, previous).await;

        if let Report::Scored { tick, raw, smoothed } = report {
            if !self.board.commit(tick, raw, smoothed, Utc::now()) {
                tracing::warn!(tick, "Score commit rejected as stale");
                return Report::Held(HoldReason::StaleResult);
            }
            self.evaluate_alert(tick, smoothed).await;
        }
        report
    }

    async fn evaluate_alert(&mut self, tick: u64, smoothed: u8) {
        let thresholds = *self.thresholds.borrow();
        let decision = self.policy.evaluate(&mut self.alert_state, &thresholds, smoothed, Instant::now());
        if decision != AlertDecision::Fire {
            return;
        }

        self.stats.alerts_fired += 1;
        tracing::info!(tick, score = smoothed, threshold = thresholds.value, "Posture alert");
        let notification = Notification::new(
            NotificationKind::PostureAlert,
            self.texts.alert_title.clone(),
            self.texts.alert_body_for(smoothed),
        );
        if let Err(e) = self.notifier.notify(notification).await {
            tracing::warn!(error = %e, "Could not deliver posture alert");
        }
    }
}

struct SamplingTask {
    scores: ScoreReader,
    persistence: Arc<dyn PersistenceService>,
    period: Duration,
    stats: SamplingStats,
}

impl SamplingTask {
    async fn run(mut self, mut shutdown: watch::Receiver<bool>) -> SamplingStats {
        let mut interval = periodic(self.period);
        loop {
            tokio::select! {
                biased;
                _ = stopped(&mut shutdown) => break,
                _ = interval.tick() => {}
            }

            self.stats.ticks += 1;
            if AssertUnwindSafe(self.tick()).catch_unwind().await.is_err() {
                self.stats.panics += 1;
                tracing::error!("Sampling tick panicked");
            }
        }
        self.stats
    }

    async fn tick(&mut self) {
        let Some(score) = self.scores.snapshot().smoothed_score else {
            self.stats.skipped += 1;
            return;
        };

        match self.persistence.record_sample(PostureSample::new(score, Utc::now())).await {
            Ok(()) => self.stats.recorded += 1,
            Err(e) => {
                self.stats.failures += 1;
                tracing::warn!(error = %e, score, "Could not record posture sample");
            }
        }
    }
}

struct ReminderTask {
    thresholds: watch::Receiver<ThresholdConfig>,
    notifier: Arc<dyn NotificationSink>,
    texts: AlertConfig,
    period: Duration,
    stats: ReminderStats,
}

impl ReminderTask {
    async fn run(mut self, mut shutdown: watch::Receiver<bool>) -> ReminderStats {
        let mut interval = periodic(self.period);
        loop {
            tokio::select! {
                biased;
                _ = stopped(&mut shutdown) => break,
                _ = interval.tick() => {}
            }

            self.stats.ticks += 1;
            if AssertUnwindSafe(self.tick()).catch_unwind().await.is_err() {
                self.stats.panics += 1;
                tracing::error!("Reminder tick panicked");
            }
        }
        self.stats
    }

    async fn tick(&mut self) {
        let enabled = self.thresholds.borrow().notifications_enabled;
        if !enabled {
            self.stats.suppressed += 1;
            return;
        }

        let reminder = Notification::new(
            NotificationKind::Reminder,
            self.texts.reminder_title.clone(),
            self.texts.reminder_body.clone(),
        );
        match self.notifier.notify(reminder).await {
            Ok(()) => self.stats.sent += 1,
            Err(e) => {
                self.stats.failures += 1;
                tracing::warn!(error = %e, "Could not deliver reminder");
            }
        }
    }
}

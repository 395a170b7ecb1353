// THEORY:
// Configuration comes in two kinds with different owners.
//
// `AppConfig` is the static shape of a session: tick periods, the keypoint
// confidence cut-off, alert cooldown and texts, where the weights live. It is read
// from a TOML file once at startup and validated before anything runs.
//
// `ThresholdConfig` is user preference: the alert threshold and whether
// notifications are on. It lives in a `ConfigStore` under stable key names, can
// change while the engine runs, and survives restarts. The alert policy only ever
// reads it.

use crate::error::{PostureError, PostureResult};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

pub const THRESHOLD_KEY: &str = "postureThreshold";
pub const NOTIFICATIONS_KEY: &str = "notificationsEnabled";
pub const DEFAULT_THRESHOLD: u8 = 70;

/// User-facing alert preferences.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThresholdConfig {
    /// Smoothed scores below this trigger an alert. Always within 0..=100.
    pub value: u8,
    pub notifications_enabled: bool,
}

impl Default for ThresholdConfig {
    fn default() -> Self {
        Self {
            value: DEFAULT_THRESHOLD,
            notifications_enabled: true,
        }
    }
}

impl ThresholdConfig {
    pub fn new(value: u8, notifications_enabled: bool) -> Self {
        Self {
            value: value.min(100),
            notifications_enabled,
        }
    }

    /// Reads both preferences, substituting defaults for missing or unreadable values.
    pub fn load(store: &dyn ConfigStore) -> PostureResult<Self> {
        let defaults = Self::default();

        let value = match store.read(THRESHOLD_KEY)? {
            Some(raw) => raw.trim().parse::<u32>().map(|v| v.min(100) as u8).unwrap_or_else(|_| {
                tracing::warn!(key = THRESHOLD_KEY, value = %raw, "Unreadable threshold, using default");
                defaults.value
            }),
            None => defaults.value,
        };

        let notifications_enabled = match store.read(NOTIFICATIONS_KEY)? {
            Some(raw) => raw.trim().parse::<bool>().unwrap_or_else(|_| {
                tracing::warn!(key = NOTIFICATIONS_KEY, value = %raw, "Unreadable notification flag, using default");
                defaults.notifications_enabled
            }),
            None => defaults.notifications_enabled,
        };

        Ok(Self {
            value,
            notifications_enabled,
        })
    }

    pub fn save(&self, store: &dyn ConfigStore) -> PostureResult<()> {
        store.write(THRESHOLD_KEY, &self.value.to_string())?;
        store.write(NOTIFICATIONS_KEY, &self.notifications_enabled.to_string())
    }
}

/// Key/value persistence for user preferences.
pub trait ConfigStore: Send + Sync {
    fn read(&self, key: &str) -> PostureResult<Option<String>>;
    fn write(&self, key: &str, value: &str) -> PostureResult<()>;
}

/// Preferences that last as long as the process.
#[derive(Debug, Default)]
pub struct MemoryConfigStore {
    values: Mutex<HashMap<String, String>>,
}

impl MemoryConfigStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ConfigStore for MemoryConfigStore {
    fn read(&self, key: &str) -> PostureResult<Option<String>> {
        let values = self
            .values
            .lock()
            .map_err(|_| PostureError::config("config store lock poisoned"))?;
        Ok(values.get(key).cloned())
    }

    fn write(&self, key: &str, value: &str) -> PostureResult<()> {
        let mut values = self
            .values
            .lock()
            .map_err(|_| PostureError::config("config store lock poisoned"))?;
        values.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// Preferences kept in a flat TOML table on disk.
#[derive(Debug)]
pub struct TomlConfigStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl TomlConfigStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_table(&self) -> PostureResult<BTreeMap<String, String>> {
        if !self.path.exists() {
            return Ok(BTreeMap::new());
        }
        let content = fs::read_to_string(&self.path)?;
        Ok(toml::from_str(&content)?)
    }
}

impl ConfigStore for TomlConfigStore {
    fn read(&self, key: &str) -> PostureResult<Option<String>> {
        let _guard = self
            .lock
            .lock()
            .map_err(|_| PostureError::config("config store lock poisoned"))?;
        Ok(self.read_table()?.remove(key))
    }

    fn write(&self, key: &str, value: &str) -> PostureResult<()> {
        let _guard = self
            .lock
            .lock()
            .map_err(|_| PostureError::config("config store lock poisoned"))?;
        let mut table = self.read_table()?;
        table.insert(key.to_string(), value.to_string());
        fs::write(&self.path, toml::to_string_pretty(&table)?)?;
        Ok(())
    }
}

/// Periods of the three scheduler tasks.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub detection_period_ms: u64,
    pub sampling_period_ms: u64,
    pub reminder_period_ms: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            detection_period_ms: 100,
            sampling_period_ms: 5_000,
            reminder_period_ms: 60_000,
        }
    }
}

impl SchedulerConfig {
    pub fn detection_period(&self) -> Duration {
        Duration::from_millis(self.detection_period_ms)
    }

    pub fn sampling_period(&self) -> Duration {
        Duration::from_millis(self.sampling_period_ms)
    }

    pub fn reminder_period(&self) -> Duration {
        Duration::from_millis(self.reminder_period_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Keypoints at or below this confidence are ignored.
    pub min_keypoint_confidence: f64,
    /// Emit a detailed debug trace every N detection ticks; 0 disables it.
    pub trace_every_n_ticks: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            min_keypoint_confidence: 0.3,
            trace_every_n_ticks: 0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertConfig {
    pub cooldown_secs: u64,
    pub alert_title: String,
    /// `{score}` is replaced with the smoothed score.
    pub alert_body: String,
    pub reminder_title: String,
    pub reminder_body: String,
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            cooldown_secs: 60,
            alert_title: "Posture Alert".to_string(),
            alert_body: "Your posture score is {score}. Please correct your posture.".to_string(),
            reminder_title: "Time for Posture Exercises!".to_string(),
            reminder_body: "Let's do some stretches to maintain good posture".to_string(),
        }
    }
}

impl AlertConfig {
    pub fn cooldown(&self) -> Duration {
        Duration::from_secs(self.cooldown_secs)
    }

    pub fn alert_body_for(&self, score: u8) -> String {
        self.alert_body.replace("{score}", &score.to_string())
    }
}

/// Everything a session needs to know before it starts.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub scheduler: SchedulerConfig,
    pub pipeline: PipelineConfig,
    pub alert: AlertConfig,
    /// JSON weights document for the trained model. Absent means heuristic only.
    pub model_weights_path: Option<PathBuf>,
}

impl AppConfig {
    pub fn load(path: impl AsRef<Path>) -> PostureResult<Self> {
        let content = fs::read_to_string(path)?;
        let config: AppConfig = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> PostureResult<()> {
        let content = toml::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    pub fn validate(&self) -> PostureResult<()> {
        let periods = [
            ("detection_period_ms", self.scheduler.detection_period_ms),
            ("sampling_period_ms", self.scheduler.sampling_period_ms),
            ("reminder_period_ms", self.scheduler.reminder_period_ms),
        ];
        if let Some((name, _)) = periods.iter().find(|(_, ms)| *ms == 0) {
            return Err(PostureError::config(format!("scheduler.{name} must be greater than zero")));
        }

        let confidence = self.pipeline.min_keypoint_confidence;
        if !(0.0..1.0).contains(&confidence) {
            return Err(PostureError::config(format!(
                "pipeline.min_keypoint_confidence must be in [0, 1), got {confidence}"
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = AppConfig::default();
        config.validate().unwrap();
        assert_eq!(config.scheduler.detection_period(), Duration::from_millis(100));
        assert_eq!(config.alert.cooldown(), Duration::from_secs(60));
        assert_eq!(config.pipeline.min_keypoint_confidence, 0.3);
    }

    #[test]
    fn zero_period_is_rejected() {
        let mut config = AppConfig::default();
        config.scheduler.sampling_period_ms = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("sampling_period_ms"));
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let config: AppConfig = toml::from_str("[scheduler]\ndetection_period_ms = 50\n").unwrap();
        assert_eq!(config.scheduler.detection_period_ms, 50);
        assert_eq!(config.scheduler.sampling_period_ms, 5_000);
        assert_eq!(config.alert.alert_title, "Posture Alert");
    }

    #[test]
    fn app_config_round_trips_through_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("zen.toml");
        let mut config = AppConfig::default();
        config.model_weights_path = Some(PathBuf::from("model/model_weights.json"));
        config.save(&path).unwrap();

        let loaded = AppConfig::load(&path).unwrap();
        assert_eq!(loaded.model_weights_path, config.model_weights_path);
    }

    #[test]
    fn alert_body_includes_score() {
        assert_eq!(
            AlertConfig::default().alert_body_for(42),
            "Your posture score is 42. Please correct your posture."
        );
    }

    #[test]
    fn thresholds_default_when_store_is_empty() {
        let store = MemoryConfigStore::new();
        assert_eq!(ThresholdConfig::load(&store).unwrap(), ThresholdConfig::default());
    }

    #[test]
    fn thresholds_survive_a_toml_store() {
        let dir = tempfile::tempdir().unwrap();
        let store = TomlConfigStore::new(dir.path().join("prefs.toml"));
        ThresholdConfig::new(55, false).save(&store).unwrap();

        let reopened = TomlConfigStore::new(store.path());
        assert_eq!(ThresholdConfig::load(&reopened).unwrap(), ThresholdConfig::new(55, false));
    }

    #[test]
    fn unreadable_and_out_of_range_values_are_tamed() {
        let store = MemoryConfigStore::new();
        store.write(THRESHOLD_KEY, "250").unwrap();
        store.write(NOTIFICATIONS_KEY, "maybe").unwrap();
        let loaded = ThresholdConfig::load(&store).unwrap();
        assert_eq!(loaded.value, 100);
        assert!(loaded.notifications_enabled);

        store.write(THRESHOLD_KEY, "high").unwrap();
        assert_eq!(ThresholdConfig::load(&store).unwrap().value, DEFAULT_THRESHOLD);
    }
}

// THEORY:
// The `AlertPolicy` decides, once per detection tick, whether the user should be
// told to sit up. It is a two-state gate keyed purely on elapsed time:
//
//     Armed --(score below threshold)--> fire, CoolingDown
//     CoolingDown --(cooldown elapsed)--> Armed
//
// The policy itself is a pure transition function over `AlertState`, like a small
// state machine: given the state, the thresholds, the score and the current instant
// it returns a decision and, only when it fires, a new last-alert instant. It never
// counts ticks and never looks at how bad the score is beyond the comparison with
// the threshold.

use crate::config::ThresholdConfig;
use crate::core_modules::smoother::Score;
use std::time::Duration;
use tokio::time::Instant;

pub const DEFAULT_COOLDOWN: Duration = Duration::from_secs(60);

/// When the last alert fired, if ever.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AlertState {
    pub last_alert: Option<Instant>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertGate {
    Armed,
    CoolingDown,
}

/// What the policy decided for one tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertDecision {
    /// Notifications are switched off.
    Disabled,
    /// The score meets the threshold.
    AboveThreshold,
    /// The score is low but an alert fired too recently.
    CoolingDown { remaining: Duration },
    /// Send one alert now.
    Fire,
}

#[derive(Debug, Clone)]
pub struct AlertPolicy {
    cooldown: Duration,
}

impl Default for AlertPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_COOLDOWN)
    }
}

impl AlertPolicy {
    pub fn new(cooldown: Duration) -> Self {
        Self { cooldown }
    }

    pub fn cooldown(&self) -> Duration {
        self.cooldown
    }

    pub fn gate(&self, state: &AlertState, now: Instant) -> AlertGate {
        match state.last_alert {
            Some(last) if now.saturating_duration_since(last) < self.cooldown => AlertGate::CoolingDown,
            _ => AlertGate::Armed,
        }
    }

    /// Evaluates one tick, updating `state` only when the alert fires.
    pub fn evaluate(
        &self,
        state: &mut AlertState,
        thresholds: &ThresholdConfig,
        score: Score,
        now: Instant,
    ) -> AlertDecision {
        if !thresholds.notifications_enabled {
            return AlertDecision::Disabled;
        }
        if score >= thresholds.value {
            return AlertDecision::AboveThreshold;
        }

        match (self.gate(state, now), state.last_alert) {
            (AlertGate::CoolingDown, Some(last)) => AlertDecision::CoolingDown {
                remaining: self.cooldown - now.saturating_duration_since(last),
            },
            _ => {
                state.last_alert = Some(now);
                AlertDecision::Fire
            }
        }
    }
}

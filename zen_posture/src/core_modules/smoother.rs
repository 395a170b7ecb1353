// THEORY:
// The `TemporalSmoother` turns the jittery per-frame raw score into the score the
// user sees. Keypoints wobble from frame to frame even when the person does not
// move, and an unsmoothed score would flicker across the alert threshold.
//
// It is an exponential moving average whose weight on the past adapts to the input:
// 1.  **Bad posture reacts fast**: the worse the raw score, the less weight the
//     previous value gets, so genuine degradation shows up within a few ticks.
// 2.  **Jumps are damped**: a raw score far from the previous value is more likely a
//     detection glitch than a real change, so large jumps get extra weight on the past.
//
// The smoother holds no state of its own. The previous value is the committed
// `ScoreState`, owned by the scheduler.

pub type Score = u8;

/// Weight given to the previous value in the common case.
pub const BASE_FACTOR: f64 = 0.3;
/// Weight on the previous value when the raw score is below [`POOR_SCORE`].
pub const POOR_FACTOR: f64 = 0.2;
/// Weight on the previous value when the raw score is below [`VERY_POOR_SCORE`].
pub const VERY_POOR_FACTOR: f64 = 0.1;
pub const POOR_SCORE: Score = 50;
pub const VERY_POOR_SCORE: Score = 30;
/// A raw score further than this from the previous value counts as a jump.
pub const JUMP_THRESHOLD: Score = 15;
pub const JUMP_DAMPING: f64 = 0.2;
pub const MAX_FACTOR: f64 = 0.5;

/// Converts a model output in [0, 1] to a raw 0..100 score.
pub fn raw_score(score01: f64) -> Score {
    (score01 * 100.0).round().clamp(0.0, 100.0) as Score
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TemporalSmoother;

impl TemporalSmoother {
    pub fn new() -> Self {
        TemporalSmoother
    }

    /// The weight the previous value receives for this raw score.
    pub fn factor(&self, previous: Score, raw: Score) -> f64 {
        let mut factor = if raw < VERY_POOR_SCORE {
            VERY_POOR_FACTOR
        } else if raw < POOR_SCORE {
            POOR_FACTOR
        } else {
            BASE_FACTOR
        };

        if raw.abs_diff(previous) > JUMP_THRESHOLD {
            factor = MAX_FACTOR.min(factor + JUMP_DAMPING);
        }
        factor
    }

    /// The next displayed score. The first sample is taken as-is.
    pub fn smooth(&self, previous: Option<Score>, raw: Score) -> Score {
        let raw = raw.min(100);
        let Some(previous) = previous else {
            return raw;
        };

        let factor = self.factor(previous, raw);
        let blended = previous as f64 * factor + raw as f64 * (1.0 - factor);
        blended.round().clamp(0.0, 100.0) as Score
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_sample_is_not_smoothed() {
        assert_eq!(TemporalSmoother.smooth(None, 80), 80);
    }

    #[test]
    fn sharp_drop_is_damped() {
        // raw < 30 selects 0.1, the 60 point jump adds 0.2.
        let smoother = TemporalSmoother::new();
        assert!((smoother.factor(80, 20) - 0.3).abs() < 1e-12);
        assert_eq!(smoother.smooth(Some(80), 20), 38);
    }

    #[test]
    fn factor_bands() {
        let smoother = TemporalSmoother::new();
        assert_eq!(smoother.factor(70, 70), BASE_FACTOR);
        assert_eq!(smoother.factor(45, 45), POOR_FACTOR);
        assert_eq!(smoother.factor(25, 25), VERY_POOR_FACTOR);
        assert_eq!(smoother.factor(90, 70), MAX_FACTOR);
        // Exactly 15 apart is not a jump.
        assert_eq!(smoother.factor(85, 70), BASE_FACTOR);
    }

    #[test]
    fn raw_score_rounds_and_clamps() {
        assert_eq!(raw_score(0.646), 65);
        assert_eq!(raw_score(0.0), 0);
        assert_eq!(raw_score(1.7), 100);
        assert_eq!(raw_score(-0.2), 0);
    }

    #[test]
    fn repeated_raw_converges_to_it() {
        let smoother = TemporalSmoother::new();
        for (start, target) in [(0u8, 100u8), (100, 0), (37, 82), (95, 12), (50, 50)] {
            let mut smoothed = Some(start);
            for _ in 0..50 {
                smoothed = Some(smoother.smooth(smoothed, target));
            }
            assert_eq!(smoothed, Some(target), "from {start} towards {target}");
        }
    }

    #[test]
    fn steps_are_tighter_for_good_scores_than_very_poor_ones() {
        let smoother = TemporalSmoother::new();
        for distance in 1u8..=15 {
            let good_prev = 60 + distance;
            let good_step = smoother.smooth(Some(good_prev), 60).abs_diff(good_prev);

            let poor_prev = 10 + distance;
            let poor_step = smoother.smooth(Some(poor_prev), 10).abs_diff(poor_prev);

            assert!(good_step <= poor_step, "distance {distance}: {good_step} > {poor_step}");
        }

        // Beyond the jump threshold as well.
        let good_step = smoother.smooth(Some(100), 60).abs_diff(100);
        let poor_step = smoother.smooth(Some(69), 29).abs_diff(69);
        assert!(good_step < poor_step);
    }

    #[test]
    fn output_stays_in_range() {
        let smoother = TemporalSmoother::new();
        for prev in (0..=100).step_by(5) {
            for raw in (0..=100).step_by(5) {
                assert!(smoother.smooth(Some(prev), raw) <= 100);
            }
        }
    }
}

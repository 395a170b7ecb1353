// THEORY:
// `ScoreState` is the only piece of posture state shared between tasks. It has a
// single writer, the detection task, and any number of readers: the sampling tick,
// the scheduler handle, a UI.
//
// The board is a `tokio::sync::watch` channel. Readers copy the current value out
// and never hold it across an await, so they cannot stall the writer. Every write
// carries the tick that produced it, and a write whose tick is not newer than the
// committed one is dropped. That keeps the board correct even if results ever
// arrive out of order.

use crate::core_modules::smoother::Score;
use chrono::{DateTime, Utc};
use tokio::sync::watch;

/// The latest committed scores. `None` until the first frame has been scored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ScoreState {
    pub raw_score: Option<Score>,
    pub smoothed_score: Option<Score>,
    pub last_updated: Option<DateTime<Utc>>,
    /// Tick that committed this state; 0 before any commit.
    pub tick: u64,
}

/// Write side of the shared score.
#[derive(Debug)]
pub struct ScoreBoard {
    sender: watch::Sender<ScoreState>,
}

impl Default for ScoreBoard {
    fn default() -> Self {
        Self::new()
    }
}

impl ScoreBoard {
    pub fn new() -> Self {
        let (sender, _) = watch::channel(ScoreState::default());
        Self { sender }
    }

    /// Commits a scored tick. Returns false, leaving the state untouched, if the
    /// tick is not newer than the last committed one.
    pub fn commit(&self, tick: u64, raw: Score, smoothed: Score, at: DateTime<Utc>) -> bool {
        self.sender.send_if_modified(|state| {
            if tick <= state.tick {
                return false;
            }
            *state = ScoreState {
                raw_score: Some(raw.min(100)),
                smoothed_score: Some(smoothed.min(100)),
                last_updated: Some(at),
                tick,
            };
            true
        })
    }

    pub fn snapshot(&self) -> ScoreState {
        *self.sender.borrow()
    }

    pub fn reader(&self) -> ScoreReader {
        ScoreReader {
            receiver: self.sender.subscribe(),
        }
    }
}

/// Read side of the shared score.
#[derive(Debug, Clone)]
pub struct ScoreReader {
    receiver: watch::Receiver<ScoreState>,
}

impl ScoreReader {
    pub fn snapshot(&self) -> ScoreState {
        *self.receiver.borrow()
    }

    /// Waits for the next commit. Returns `None` once the board is gone.
    pub async fn changed(&mut self) -> Option<ScoreState> {
        self.receiver.changed().await.ok()?;
        Some(*self.receiver.borrow_and_update())
    }
}

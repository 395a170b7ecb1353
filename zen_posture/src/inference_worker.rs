// THEORY:
// The `InferenceWorker` takes model evaluation off the detection task. It is an
// actor: one spawned task owns the `ScoringModel` outright, and the rest of the
// engine reaches it only through a message channel. Each request carries the tick
// it belongs to and a oneshot channel for the answer, so a result always comes
// back labelled with the tick that asked for it.
//
// Key architectural principles:
// 1.  **Exclusive ownership**: nothing else holds the model, so there is nothing to
//     lock and nothing can touch it after shutdown.
// 2.  **Ordered drain**: the request queue is FIFO. A `Shutdown` message is
//     processed only after every prediction queued before it, so in-flight work
//     completes before the model is handed back.
// 3.  **Explicit disposal**: shutdown returns the model to the caller, which
//     disposes of it once the worker is provably idle.

use crate::core_modules::feature_extractor::FeatureVector;
use crate::core_modules::scoring_model::ScoringModel;
use crate::error::{PostureError, PostureResult};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

const REQUEST_QUEUE_DEPTH: usize = 8;

/// A prediction answer, labelled with the tick that requested it.
#[derive(Debug)]
pub struct Prediction {
    pub tick: u64,
    pub score01: PostureResult<f64>,
}

enum WorkerMessage {
    Predict {
        tick: u64,
        features: FeatureVector,
        reply: oneshot::Sender<Prediction>,
    },
    Shutdown,
}

pub struct InferenceWorker {
    sender: mpsc::Sender<WorkerMessage>,
    handle: JoinHandle<ScoringModel>,
    model_name: &'static str,
}

impl InferenceWorker {
    /// Moves the model onto its own task.
    pub fn spawn(model: ScoringModel) -> Self {
        let (sender, mut receiver) = mpsc::channel::<WorkerMessage>(REQUEST_QUEUE_DEPTH);
        let model_name = model.name();

        let handle = tokio::spawn(async move {
            while let Some(message) = receiver.recv().await {
                match message {
                    WorkerMessage::Predict { tick, features, reply } => {
                        let score01 = model.predict(&features);
                        // The requester may have gone away; its answer is simply lost.
                        let _ = reply.send(Prediction { tick, score01 });
                    }
                    WorkerMessage::Shutdown => break,
                }
            }
            tracing::debug!(model = model.name(), "Inference worker stopped");
            model
        });

        Self {
            sender,
            handle,
            model_name,
        }
    }

    pub fn model_name(&self) -> &'static str {
        self.model_name
    }

    /// Scores one feature vector on the worker.
    pub async fn predict(&self, tick: u64, features: FeatureVector) -> PostureResult<Prediction> {
        let (reply, answer) = oneshot::channel();
        self.sender
            .send(WorkerMessage::Predict { tick, features, reply })
            .await
            .map_err(|_| PostureError::WorkerUnavailable)?;
        answer.await.map_err(|_| PostureError::WorkerUnavailable)
    }

    /// Stops the worker after queued predictions finish and hands the model back.
    pub async fn shutdown(self) -> PostureResult<ScoringModel> {
        // A closed channel means the worker already exited; the join below still
        // recovers the model unless the task panicked.
        let _ = self.sender.send(WorkerMessage::Shutdown).await;
        self.handle.await.map_err(|e| {
            tracing::error!(error = %e, "Inference worker did not exit cleanly");
            PostureError::WorkerUnavailable
        })
    }
}

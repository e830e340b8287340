//! Ordered request queue and the single evaluation worker.
//!
//! Every session pushes its `CALC` requests into one bounded mpsc channel.
//! Exactly one [`EvaluationWorker`] pops them, so results are computed and
//! written in the order the requests were enqueued, across all sessions.
//!
//! ```text
//! ┌──────────┐  submit   ┌──────────────┐  recv  ┌──────────────────┐
//! │ session A│──────────▶│              │───────▶│ EvaluationWorker │──▶ RES / ERR
//! ├──────────┤           │ mpsc channel │        │  (single task)   │    to reply_to
//! │ session B│──────────▶│  (bounded)   │        └────────┬─────────┘
//! └──────────┘           └──────────────┘                 │ Completion
//!                                                         ▼ (broadcast)
//!                                                     subscribers
//! ```
//!
//! # Panic-Free Guarantees
//!
//! This module follows the panic-free policy:
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - A full or closed queue is reported as `QueueError`

mod worker;

pub use worker::EvaluationWorker;

use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;

use mathq_core::EvalError;

use crate::event_log::EventLog;
use crate::writer::SessionWriter;

/// Buffer for completion notifications.
const COMPLETION_BUFFER: usize = 256;

/// One unit of work: evaluate `expression` and reply to `reply_to`.
#[derive(Debug, Clone)]
pub struct CalcRequest {
    /// Registered name of the requesting client
    pub client: String,
    /// Expression text as received
    pub expression: String,
    /// Output channel of the requesting session
    pub reply_to: SessionWriter,
}

impl CalcRequest {
    pub fn new(
        client: impl Into<String>,
        expression: impl Into<String>,
        reply_to: SessionWriter,
    ) -> Self {
        Self {
            client: client.into(),
            expression: expression.into(),
            reply_to,
        }
    }
}

/// Result of evaluating one request.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// Formatted result, as sent in `RES`
    Value(String),
    /// Evaluation failed
    Failed(EvalError),
}

/// Published by the worker after each request has been answered.
#[derive(Debug, Clone, PartialEq)]
pub struct Completion {
    /// Dequeue order, starting at 0
    pub position: u64,
    pub client: String,
    pub expression: String,
    pub outcome: Outcome,
    /// Whether the reply reached the session's output channel
    pub delivered: bool,
}

/// Producer side of the queue, cheap to clone.
#[derive(Clone)]
pub struct RequestQueue {
    sender: mpsc::Sender<CalcRequest>,
    completions: broadcast::Sender<Completion>,
    capacity: usize,
}

impl RequestQueue {
    /// Enqueues a request without waiting.
    ///
    /// # Errors
    ///
    /// - `QueueError::Full` if `capacity` requests are already waiting
    /// - `QueueError::Closed` if the worker has stopped
    pub fn submit(&self, request: CalcRequest) -> Result<(), QueueError> {
        self.sender.try_send(request).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => QueueError::Full {
                capacity: self.capacity,
            },
            mpsc::error::TrySendError::Closed(_) => QueueError::Closed,
        })
    }

    /// Subscribe to completions, in evaluation order.
    pub fn subscribe(&self) -> broadcast::Receiver<Completion> {
        self.completions.subscribe()
    }

    /// Maximum number of waiting requests.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Returns `true` once the worker is gone.
    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }
}

/// Errors returned by [`RequestQueue::submit`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum QueueError {
    #[error("Request queue full (capacity: {capacity})")]
    Full { capacity: usize },

    #[error("Request queue closed")]
    Closed,
}

/// Creates the queue and spawns its single worker.
///
/// The worker runs until every [`RequestQueue`] clone has been dropped and
/// the remaining requests are answered. Its join handle yields the number
/// of requests processed.
pub fn spawn_evaluator(capacity: usize, event_log: EventLog) -> (RequestQueue, JoinHandle<u64>) {
    let (sender, receiver) = mpsc::channel(capacity.max(1));
    let (completions, _) = broadcast::channel(COMPLETION_BUFFER);

    let worker = EvaluationWorker::new(receiver, event_log, completions.clone());
    let handle = tokio::spawn(worker.run());

    let queue = RequestQueue {
        sender,
        completions,
        capacity,
    };
    (queue, handle)
}

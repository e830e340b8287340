//! The evaluation worker - sole consumer of the request queue.

use tokio::sync::{broadcast, mpsc};
use tracing::{debug, trace};

use mathq_core::{evaluate, format_result};
use mathq_protocol::Response;

use super::{CalcRequest, Completion, Outcome};
use crate::event_log::{EventKind, EventLog};

/// Pops requests in FIFO order, evaluates them and writes the replies.
///
/// One request is fully answered before the next one is dequeued.
pub struct EvaluationWorker {
    receiver: mpsc::Receiver<CalcRequest>,
    event_log: EventLog,
    completions: broadcast::Sender<Completion>,
    processed: u64,
}

impl EvaluationWorker {
    pub fn new(
        receiver: mpsc::Receiver<CalcRequest>,
        event_log: EventLog,
        completions: broadcast::Sender<Completion>,
    ) -> Self {
        Self {
            receiver,
            event_log,
            completions,
            processed: 0,
        }
    }

    /// Runs until the queue is closed and empty. Returns the number of
    /// requests processed.
    pub async fn run(mut self) -> u64 {
        debug!("Evaluation worker starting");

        while let Some(request) = self.receiver.recv().await {
            self.process(request).await;
        }

        debug!(processed = self.processed, "Evaluation worker stopped");
        self.processed
    }

    async fn process(&mut self, request: CalcRequest) {
        let position = self.processed;
        self.processed += 1;

        let CalcRequest {
            client,
            expression,
            reply_to,
        } = request;

        self.event_log.record(
            EventKind::CalcRequest,
            &client,
            format_args!("Expression received: {expression}"),
        );

        let (response, outcome) = match evaluate(&expression) {
            Ok(value) => {
                let formatted = format_result(value);
                self.event_log.record(
                    EventKind::CalcResponse,
                    &client,
                    format_args!("{expression} = {formatted}"),
                );
                (
                    Response::result(client.as_str(), formatted.as_str()),
                    Outcome::Value(formatted),
                )
            }
            Err(e) => {
                self.event_log.record(
                    EventKind::Err,
                    &client,
                    format_args!("Error evaluating expression '{expression}': {e}"),
                );
                (Response::error(e.client_message()), Outcome::Failed(e))
            }
        };

        let delivered = match reply_to.send(&response).await {
            Ok(()) => true,
            Err(e) => {
                self.event_log.record(
                    EventKind::Err,
                    &client,
                    format_args!("Failed to deliver reply: {e}"),
                );
                false
            }
        };

        trace!(position, client = %client, delivered, "Request completed");

        // No subscribers is the normal case.
        let _ = self.completions.send(Completion {
            position,
            client,
            expression,
            outcome,
            delivered,
        });
    }
}

//! Listener stage: gate → capture → input queue

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use super::{MessageQueue, ReadyGate, Stage, UserInput};
use crate::Result;
use crate::handlers::Listen;

/// Pause after a failed capture before the turn is handed on
pub const CAPTURE_BACKOFF: Duration = Duration::from_millis(250);

/// Waits for the gate, captures one utterance and queues it
///
/// Never reopens the gate itself; that is the speaker's (or a silent turn's)
/// job.
pub struct ListenerStage {
    listener: Arc<dyn Listen>,
    gate: Arc<ReadyGate>,
    inputs: Arc<MessageQueue<UserInput>>,
}

impl ListenerStage {
    /// Create the stage
    pub fn new(
        listener: Arc<dyn Listen>,
        gate: Arc<ReadyGate>,
        inputs: Arc<MessageQueue<UserInput>>,
    ) -> Self {
        Self {
            listener,
            gate,
            inputs,
        }
    }
}

#[async_trait]
impl Stage for ListenerStage {
    fn name(&self) -> &'static str {
        "listener"
    }

    async fn run(&mut self, cancel: CancellationToken) -> Result<()> {
        loop {
            self.gate.wait_for_ready(&cancel).await?;

            tracing::info!("listening...");
            let captured = tokio::select! {
                biased;
                () = cancel.cancelled() => return Ok(()),
                result = self.listener.listen(&cancel) => result,
            };

            let message = match captured {
                Ok(text) => text,
                Err(e) if e.is_interrupt() => return Ok(()),
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    tracing::warn!(error = %e, "capture failed, treating as silence");
                    tokio::select! {
                        biased;
                        () = cancel.cancelled() => return Ok(()),
                        () = tokio::time::sleep(CAPTURE_BACKOFF) => {}
                    }
                    String::new()
                }
            };

            tracing::debug!(chars = message.len(), "utterance captured");
            self.inputs.enqueue(UserInput::new(message));
        }
    }
}

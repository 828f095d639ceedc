//! Conversation stage: input queue → model → output queue

use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use super::{MessageQueue, ReadyGate, SpeakRequest, Stage, UserInput};
use crate::handlers::Converse;
use crate::{Error, Result};

/// Turns each queued [`UserInput`] into zero or one [`SpeakRequest`]
///
/// A turn that ends without anything to say (blank input, blank reply, or a
/// model failure) reopens the gate so listening resumes.
pub struct ConversationStage {
    converser: Arc<dyn Converse>,
    inputs: Arc<MessageQueue<UserInput>>,
    replies: Arc<MessageQueue<SpeakRequest>>,
    gate: Arc<ReadyGate>,
}

impl ConversationStage {
    /// Create the stage
    pub fn new(
        converser: Arc<dyn Converse>,
        inputs: Arc<MessageQueue<UserInput>>,
        replies: Arc<MessageQueue<SpeakRequest>>,
        gate: Arc<ReadyGate>,
    ) -> Self {
        Self {
            converser,
            inputs,
            replies,
            gate,
        }
    }

    /// Process a single input
    ///
    /// # Errors
    ///
    /// Returns the collaborator's error unchanged, or [`Error::Cancelled`].
    pub async fn respond(
        &self,
        input: &UserInput,
        cancel: &CancellationToken,
    ) -> Result<Option<SpeakRequest>> {
        if input.is_blank() {
            tracing::debug!("dropping blank input");
            return Ok(None);
        }

        let prompt = input.message.trim();
        tracing::info!(prompt, "heard");

        let reply = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(Error::Cancelled),
            reply = self.converser.process(prompt, cancel) => reply?,
        };

        let request = SpeakRequest::new(reply);
        if request.is_blank() {
            tracing::debug!("model produced no reply");
            return Ok(None);
        }

        Ok(Some(request))
    }
}

#[async_trait]
impl Stage for ConversationStage {
    fn name(&self) -> &'static str {
        "conversation"
    }

    async fn run(&mut self, cancel: CancellationToken) -> Result<()> {
        loop {
            self.inputs.wait(&cancel).await?;

            while let Some(input) = self.inputs.try_dequeue() {
                match self.respond(&input, &cancel).await {
                    Ok(Some(request)) => self.replies.enqueue(request),
                    Ok(None) => self.gate.set_ready(),
                    Err(e) if e.is_interrupt() => return Err(e),
                    Err(e) => {
                        tracing::error!(error = %e, "conversation turn failed");
                        self.gate.set_ready();
                    }
                }
            }
        }
    }
}

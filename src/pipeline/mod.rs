//! Turn-taking pipeline
//!
//! Three independent stages share two queues and a readiness gate:
//!
//! ```text
//!   ┌──────────┐  UserInput   ┌──────────────┐  SpeakRequest  ┌─────────┐
//!   │ Listener │ ───────────▶ │ Conversation │ ─────────────▶ │ Speaker │
//!   └────▲─────┘              └──────┬───────┘                └────┬────┘
//!        │        ReadyGate (silent turn)                          │
//!        └─────────────────────────┴───────────────────────────────┘
//! ```
//!
//! The gate holds a single permit, so the listener never starts a capture
//! while a reply for the previous turn is still being spoken.

mod conversation;
mod gate;
mod listener;
mod messages;
mod queue;
mod runner;
mod speaker;

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

pub use conversation::ConversationStage;
pub use gate::ReadyGate;
pub use listener::{CAPTURE_BACKOFF, ListenerStage};
pub use messages::{SpeakRequest, UserInput};
pub use queue::MessageQueue;
pub use runner::{Stage, StageRunner};
pub use speaker::SpeakerStage;

use crate::handlers::{Converse, Listen, Speak};

/// Default time each stage gets to unwind on shutdown
pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// Builder for [`Pipeline`]
pub struct PipelineBuilder {
    listener: Arc<dyn Listen>,
    converser: Arc<dyn Converse>,
    speaker: Arc<dyn Speak>,
    greeting: Option<String>,
    cancel: Option<CancellationToken>,
}

impl PipelineBuilder {
    /// Speak this before the first listen
    #[must_use]
    pub fn greeting(mut self, greeting: impl Into<String>) -> Self {
        self.greeting = Some(greeting.into());
        self
    }

    /// Use an externally owned root token
    #[must_use]
    pub fn cancel_token(mut self, cancel: CancellationToken) -> Self {
        self.cancel = Some(cancel);
        self
    }

    /// Wire the queues, gate and stages together
    #[must_use]
    pub fn build(self) -> Pipeline {
        let cancel = self.cancel.unwrap_or_default();
        let inputs = Arc::new(MessageQueue::new("inputs"));
        let replies = Arc::new(MessageQueue::new("replies"));
        let gate = Arc::new(ReadyGate::new());

        let listener = ListenerStage::new(self.listener, Arc::clone(&gate), Arc::clone(&inputs));
        let conversation = ConversationStage::new(
            self.converser,
            Arc::clone(&inputs),
            Arc::clone(&replies),
            Arc::clone(&gate),
        );
        let speaker = SpeakerStage::new(self.speaker, Arc::clone(&replies), Arc::clone(&gate))
            .with_greeting(self.greeting);

        let runners = vec![
            StageRunner::new(speaker, &cancel),
            StageRunner::new(conversation, &cancel),
            StageRunner::new(listener, &cancel),
        ];

        Pipeline {
            inputs,
            replies,
            gate,
            cancel,
            runners,
        }
    }
}

/// The running conversation loop
pub struct Pipeline {
    inputs: Arc<MessageQueue<UserInput>>,
    replies: Arc<MessageQueue<SpeakRequest>>,
    gate: Arc<ReadyGate>,
    cancel: CancellationToken,
    runners: Vec<StageRunner>,
}

impl Pipeline {
    /// Start building a pipeline from its three collaborators
    pub fn builder(
        listener: Arc<dyn Listen>,
        converser: Arc<dyn Converse>,
        speaker: Arc<dyn Speak>,
    ) -> PipelineBuilder {
        PipelineBuilder {
            listener,
            converser,
            speaker,
            greeting: None,
            cancel: None,
        }
    }

    /// Launch every stage
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(&mut self) {
        tracing::info!(stages = self.runners.len(), "starting pipeline");
        for runner in &mut self.runners {
            runner.start();
        }
    }

    /// Wait until the pipeline is cancelled, either by [`Pipeline::stop`], by
    /// the root token, or by a stage failing fatally
    pub async fn stopped(&self) {
        self.cancel.cancelled().await;
    }

    /// Request every stage to stop without waiting
    pub fn stop(&self) {
        for runner in &self.runners {
            runner.stop();
        }
        self.cancel.cancel();
    }

    /// Stop every stage, wait up to `timeout` for each, then close the
    /// queues and the gate
    ///
    /// Returns `true` if every stage exited on its own.
    pub async fn shutdown(mut self, timeout: Duration) -> bool {
        self.stop();

        let mut clean = true;
        for runner in &mut self.runners {
            clean &= runner.join(timeout).await;
        }

        self.inputs.close();
        self.replies.close();
        self.gate.close();

        tracing::info!(clean, "pipeline stopped");
        clean
    }

    /// The root cancellation token
    #[must_use]
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// The shared readiness gate
    #[must_use]
    pub const fn gate(&self) -> &Arc<ReadyGate> {
        &self.gate
    }

    /// Queue of captured utterances
    #[must_use]
    pub const fn inputs(&self) -> &Arc<MessageQueue<UserInput>> {
        &self.inputs
    }

    /// Queue of replies waiting to be spoken
    #[must_use]
    pub const fn replies(&self) -> &Arc<MessageQueue<SpeakRequest>> {
        &self.replies
    }

    /// Whether any stage loop is still running
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.runners.iter().any(StageRunner::is_running)
    }
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("runners", &self.runners)
            .field("inputs", &self.inputs)
            .field("replies", &self.replies)
            .field("gate_opened", &self.gate.times_opened())
            .finish_non_exhaustive()
    }
}

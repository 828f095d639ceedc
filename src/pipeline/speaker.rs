//! Speaker stage: output queue → speech → reopen gate

use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use super::{MessageQueue, ReadyGate, SpeakRequest, Stage};
use crate::handlers::Speak;
use crate::{Error, Result};

/// Voices queued replies and hands the turn back to the listener
///
/// On startup the gate is opened once, after the optional greeting, so the
/// first listen can begin.
pub struct SpeakerStage {
    speaker: Arc<dyn Speak>,
    replies: Arc<MessageQueue<SpeakRequest>>,
    gate: Arc<ReadyGate>,
    greeting: Option<String>,
}

impl SpeakerStage {
    /// Create the stage
    pub fn new(
        speaker: Arc<dyn Speak>,
        replies: Arc<MessageQueue<SpeakRequest>>,
        gate: Arc<ReadyGate>,
    ) -> Self {
        Self {
            speaker,
            replies,
            gate,
            greeting: None,
        }
    }

    /// Say something before the first listen
    #[must_use]
    pub fn with_greeting(mut self, greeting: Option<String>) -> Self {
        self.greeting = greeting.filter(|g| !g.trim().is_empty());
        self
    }

    /// Speak one message
    ///
    /// Speech failures are logged and swallowed so the gate still reopens;
    /// only cancellation is returned.
    async fn voice(&self, message: &str, cancel: &CancellationToken) -> Result<()> {
        tracing::info!(message, "speaking");

        let spoken = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(Error::Cancelled),
            result = self.speaker.speak(message, cancel) => result,
        };

        match spoken {
            Ok(()) => Ok(()),
            Err(e) if e.is_interrupt() => Err(e),
            Err(e) => {
                tracing::error!(error = %e, "failed to speak reply");
                Ok(())
            }
        }
    }
}

#[async_trait]
impl Stage for SpeakerStage {
    fn name(&self) -> &'static str {
        "speaker"
    }

    async fn run(&mut self, cancel: CancellationToken) -> Result<()> {
        if let Some(greeting) = self.greeting.take() {
            self.voice(greeting.trim(), &cancel).await?;
        }
        self.gate.set_ready();

        loop {
            self.replies.wait(&cancel).await?;

            while let Some(request) = self.replies.try_dequeue() {
                if request.is_blank() {
                    continue;
                }

                self.voice(request.message.trim(), &cancel).await?;
                self.gate.set_ready();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::time::Duration;

    use super::*;

    #[derive(Default)]
    struct Recording {
        spoken: Mutex<Vec<String>>,
        fail: bool,
    }

    #[async_trait]
    impl Speak for Recording {
        async fn speak(&self, text: &str, _cancel: &CancellationToken) -> Result<()> {
            self.spoken.lock().unwrap().push(text.to_string());
            if self.fail {
                return Err(Error::Tts("device busy".to_string()));
            }
            Ok(())
        }
    }

    async fn run_briefly(mut stage: SpeakerStage) {
        let cancel = CancellationToken::new();
        let task = tokio::spawn({
            let cancel = cancel.clone();
            async move { stage.run(cancel).await }
        });
        tokio::time::sleep(Duration::from_millis(50)).await;
        cancel.cancel();
        let result = task.await.unwrap();
        assert!(matches!(result, Err(Error::Cancelled)));
    }

    #[tokio::test]
    async fn test_bootstrap_opens_gate_once() {
        let gate = Arc::new(ReadyGate::new());
        let stage = SpeakerStage::new(
            Arc::new(Recording::default()),
            Arc::new(MessageQueue::new("replies")),
            Arc::clone(&gate),
        );

        run_briefly(stage).await;
        assert_eq!(gate.times_opened(), 1);
    }

    #[tokio::test]
    async fn test_greeting_spoken_before_gate_opens() {
        let gate = Arc::new(ReadyGate::new());
        let speaker = Arc::new(Recording::default());
        let stage = SpeakerStage::new(
            Arc::clone(&speaker) as Arc<dyn Speak>,
            Arc::new(MessageQueue::new("replies")),
            Arc::clone(&gate),
        )
        .with_greeting(Some("Hello!".to_string()));

        run_briefly(stage).await;
        assert_eq!(*speaker.spoken.lock().unwrap(), vec!["Hello!".to_string()]);
        assert_eq!(gate.times_opened(), 1);
    }

    #[tokio::test]
    async fn test_reopens_gate_after_each_reply() {
        let gate = Arc::new(ReadyGate::new());
        let replies = Arc::new(MessageQueue::new("replies"));
        let speaker = Arc::new(Recording::default());

        replies.enqueue(SpeakRequest::new(" one "));
        replies.enqueue(SpeakRequest::new(""));
        replies.enqueue(SpeakRequest::new("two"));

        let stage = SpeakerStage::new(
            Arc::clone(&speaker) as Arc<dyn Speak>,
            Arc::clone(&replies),
            Arc::clone(&gate),
        );
        run_briefly(stage).await;

        assert_eq!(
            *speaker.spoken.lock().unwrap(),
            vec!["one".to_string(), "two".to_string()]
        );
        // Bootstrap plus one per spoken reply
        assert_eq!(gate.times_opened(), 3);
    }

    #[tokio::test]
    async fn test_speech_failure_still_reopens_gate() {
        let gate = Arc::new(ReadyGate::new());
        let replies = Arc::new(MessageQueue::new("replies"));
        replies.enqueue(SpeakRequest::new("doomed"));

        let stage = SpeakerStage::new(
            Arc::new(Recording {
                fail: true,
                ..Default::default()
            }),
            replies,
            Arc::clone(&gate),
        );
        run_briefly(stage).await;

        assert_eq!(gate.times_opened(), 2);
    }
}

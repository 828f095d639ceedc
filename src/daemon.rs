//! Daemon - the assistant service
//!
//! Builds the collaborators from configuration, runs the turn-taking
//! pipeline, and shuts it down on Ctrl-C or when a stage can no longer make
//! progress.

use std::sync::Arc;

use crate::config::Config;
use crate::handlers::{
    ChatHandler, Converse, KeyboardListener, Listen, MicrophoneListener, Speak, VoiceSpeaker,
    WakeWordListener,
};
use crate::pipeline::Pipeline;
use crate::voice::{SpeechToText, TextToSpeech};
use crate::{Error, Result};

/// The Parley daemon
#[derive(Debug)]
pub struct Daemon {
    config: Config,
}

impl Daemon {
    /// Create a daemon from validated configuration
    ///
    /// # Errors
    ///
    /// Returns error if the configuration is invalid
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    /// The active configuration
    #[must_use]
    pub const fn config(&self) -> &Config {
        &self.config
    }

    /// Build the input side: keyboard or microphone, optionally gated by a
    /// wake word
    ///
    /// # Errors
    ///
    /// Returns error if the STT backend or capture thread cannot be created
    pub fn listener(&self) -> Result<Arc<dyn Listen>> {
        if self.config.system.text_mode {
            tracing::info!("text mode: type a line and press enter");
            return Ok(self.gated(KeyboardListener::stdin()));
        }

        let stt = SpeechToText::from_config(&self.config.speech, &self.config.api_keys)?;
        let microphone = MicrophoneListener::new(self.config.capture, stt)?;
        Ok(self.gated(microphone))
    }

    fn gated<L: Listen + 'static>(&self, inner: L) -> Arc<dyn Listen> {
        let wake = &self.config.wake;
        if wake.enabled() {
            Arc::new(WakeWordListener::new(
                inner,
                wake.phrases.clone(),
                wake.sleep_phrase.clone(),
            ))
        } else {
            Arc::new(inner)
        }
    }

    /// Build the chat backend
    ///
    /// # Errors
    ///
    /// Returns error if the OpenAI key is missing
    pub fn converser(&self) -> Result<Arc<dyn Converse>> {
        let key = self
            .config
            .api_keys
            .openai
            .clone()
            .ok_or_else(|| Error::Config("OPENAI_API_KEY is required".to_string()))?;
        Ok(Arc::new(ChatHandler::new(self.config.conversation.clone(), key)?))
    }

    /// Build the output side
    ///
    /// # Errors
    ///
    /// Returns error if the TTS backend's key is missing
    pub fn speaker(&self) -> Result<Arc<dyn Speak>> {
        let tts = TextToSpeech::from_config(&self.config.speech, &self.config.api_keys)?;
        Ok(Arc::new(VoiceSpeaker::new(tts)))
    }

    /// Run until interrupted or until a stage fails fatally
    ///
    /// # Errors
    ///
    /// Returns error if a collaborator cannot be built
    pub async fn run(self) -> Result<()> {
        let mut builder = Pipeline::builder(self.listener()?, self.converser()?, self.speaker()?);
        if let Some(greeting) = &self.config.system.greeting {
            builder = builder.greeting(greeting.clone());
        }
        let mut pipeline = builder.build();

        tracing::info!(
            model = %self.config.conversation.model,
            text_mode = self.config.system.text_mode,
            wake_word = self.config.wake.enabled(),
            "daemon running"
        );
        pipeline.start();

        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                if let Err(e) = result {
                    tracing::warn!(error = %e, "cannot listen for Ctrl-C");
                }
                tracing::info!("shutdown requested");
            }
            () = pipeline.stopped() => {
                tracing::info!("pipeline ended on its own");
            }
        }

        if !pipeline.shutdown(self.config.system.shutdown_timeout).await {
            tracing::warn!("some stages had to be aborted");
        }

        Ok(())
    }
}

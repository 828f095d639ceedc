//! Collaborators consumed by the pipeline
//!
//! Each capability is a narrow async trait so stages can be driven by real
//! audio/model backends or by test doubles.

mod chat;
mod keyboard;
mod microphone;
mod voice_speaker;
mod wake_word;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

pub use chat::{CONTEXT_RESET_REPLY, ChatHandler};
pub use keyboard::KeyboardListener;
pub use microphone::MicrophoneListener;
pub use voice_speaker::VoiceSpeaker;
pub use wake_word::{WakeState, WakeWordListener, extract_command};

use crate::Result;

/// Captures one utterance of user input
#[async_trait]
pub trait Listen: Send + Sync {
    /// Block until the user said something
    ///
    /// Returns an empty string when nothing was captured or `cancel` fired.
    async fn listen(&self, cancel: &CancellationToken) -> Result<String>;
}

/// Voices one reply
#[async_trait]
pub trait Speak: Send + Sync {
    /// Speak `text`; a blank `text` is a no-op
    async fn speak(&self, text: &str, cancel: &CancellationToken) -> Result<()>;
}

/// Turns a user prompt into a reply
#[async_trait]
pub trait Converse: Send + Sync {
    /// Produce a reply for `prompt`, possibly empty
    ///
    /// Upstream failures are returned as errors, never swallowed.
    async fn process(&self, prompt: &str, cancel: &CancellationToken) -> Result<String>;
}

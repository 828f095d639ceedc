//! Spoken output: hosted synthesis plus local playback

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use super::Speak;
use crate::voice::{AudioPlayback, TextToSpeech, decode_mp3};
use crate::{Error, Result};

/// Synthesizes each reply and plays it on the default output device
///
/// Playback stops early when the token is cancelled.
pub struct VoiceSpeaker {
    tts: TextToSpeech,
}

impl VoiceSpeaker {
    /// Create a speaker backed by `tts`
    #[must_use]
    pub const fn new(tts: TextToSpeech) -> Self {
        Self { tts }
    }
}

#[async_trait]
impl Speak for VoiceSpeaker {
    async fn speak(&self, text: &str, cancel: &CancellationToken) -> Result<()> {
        let text = text.trim();
        if text.is_empty() {
            return Ok(());
        }

        let mp3 = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(Error::Cancelled),
            mp3 = self.tts.synthesize(text) => mp3?,
        };

        let audio = decode_mp3(&mp3)?;
        tracing::debug!(
            samples = audio.samples.len(),
            sample_rate = audio.sample_rate,
            "playing reply"
        );

        let stop = Arc::new(AtomicBool::new(false));
        let playback = tokio::task::spawn_blocking({
            let stop = Arc::clone(&stop);
            move || AudioPlayback::open(audio.sample_rate)?.play(audio.samples, &stop)
        });

        // Raise the stop flag if this future is dropped or cancelled mid-playback
        let _guard = StopOnDrop(Arc::clone(&stop));

        tokio::select! {
            biased;
            () = cancel.cancelled() => {
                stop.store(true, Ordering::Release);
                Err(Error::Cancelled)
            }
            finished = playback => {
                finished.map_err(|e| Error::Audio(format!("playback task failed: {e}")))??;
                Ok(())
            }
        }
    }
}

struct StopOnDrop(Arc<AtomicBool>);

impl Drop for StopOnDrop {
    fn drop(&mut self) {
        self.0.store(true, Ordering::Release);
    }
}

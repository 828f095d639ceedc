//! Spoken input: microphone capture plus hosted transcription

use std::sync::mpsc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

use super::Listen;
use crate::config::CaptureConfig;
use crate::voice::{AudioCapture, SAMPLE_RATE, SpeechToText, UtteranceSegmenter, samples_to_wav};
use crate::{Error, Result};

/// How often the capture thread drains the device buffer
const CHUNK_INTERVAL: Duration = Duration::from_millis(100);

struct CaptureRequest {
    cancel: CancellationToken,
    reply: oneshot::Sender<Result<Vec<f32>>>,
}

/// Records one utterance per listen and transcribes it
///
/// The audio stream lives on a dedicated thread; the microphone is only open
/// while a listen is in progress, so replies being spoken are never
/// recorded.
pub struct MicrophoneListener {
    requests: mpsc::Sender<CaptureRequest>,
    stt: SpeechToText,
}

impl MicrophoneListener {
    /// Start the capture thread
    ///
    /// # Errors
    ///
    /// Returns error if the thread cannot be spawned
    pub fn new(capture: CaptureConfig, stt: SpeechToText) -> Result<Self> {
        let (requests, receiver) = mpsc::channel();

        std::thread::Builder::new()
            .name("parley-mic".to_string())
            .spawn(move || capture_thread(&capture, &receiver))?;

        Ok(Self { requests, stt })
    }

    async fn record(&self, cancel: &CancellationToken) -> Result<Vec<f32>> {
        let (reply, response) = oneshot::channel();
        self.requests
            .send(CaptureRequest {
                cancel: cancel.clone(),
                reply,
            })
            .map_err(|_| Error::InputClosed("capture thread exited".to_string()))?;

        response
            .await
            .map_err(|_| Error::InputClosed("capture thread exited".to_string()))?
    }
}

#[async_trait]
impl Listen for MicrophoneListener {
    async fn listen(&self, cancel: &CancellationToken) -> Result<String> {
        let samples = tokio::select! {
            biased;
            () = cancel.cancelled() => return Ok(String::new()),
            samples = self.record(cancel) => samples?,
        };

        if samples.is_empty() {
            return Ok(String::new());
        }

        let wav = samples_to_wav(&samples, SAMPLE_RATE)?;
        tracing::debug!(samples = samples.len(), wav_bytes = wav.len(), "transcribing");

        tokio::select! {
            biased;
            () = cancel.cancelled() => Ok(String::new()),
            text = self.stt.transcribe(&wav) => text,
        }
    }
}

fn capture_thread(config: &CaptureConfig, requests: &mpsc::Receiver<CaptureRequest>) {
    let mut capture = match AudioCapture::open() {
        Ok(capture) => capture,
        Err(e) => {
            tracing::error!(error = %e, "microphone unavailable");
            for request in requests {
                let _ = request
                    .reply
                    .send(Err(Error::InputClosed(format!("microphone unavailable: {e}"))));
            }
            return;
        }
    };

    for request in requests {
        let result = record_utterance(&mut capture, config, &request.cancel);
        capture.stop();
        // The listener may have given up on this request
        let _ = request.reply.send(result);
    }

    tracing::debug!("capture thread exiting");
}

fn record_utterance(
    capture: &mut AudioCapture,
    config: &CaptureConfig,
    cancel: &CancellationToken,
) -> Result<Vec<f32>> {
    let mut segmenter = UtteranceSegmenter::new(config, capture.sample_rate());
    capture.start()?;

    loop {
        if cancel.is_cancelled() {
            return Ok(Vec::new());
        }

        std::thread::sleep(CHUNK_INTERVAL);
        if segmenter.push(&capture.take_samples()) {
            return Ok(segmenter.take_utterance().unwrap_or_default());
        }
    }
}

//! Speech-to-text (STT) processing

use crate::config::{ApiKeys, SpeechConfig, SttProvider};
use crate::{Error, Result};

/// Response from `OpenAI` Whisper transcription API
#[derive(serde::Deserialize)]
struct WhisperResponse {
    text: String,
}

/// Response from Deepgram transcription API
#[derive(serde::Deserialize)]
struct DeepgramResponse {
    results: DeepgramResults,
}

#[derive(serde::Deserialize)]
struct DeepgramResults {
    channels: Vec<DeepgramChannel>,
}

#[derive(serde::Deserialize)]
struct DeepgramChannel {
    alternatives: Vec<DeepgramAlternative>,
}

#[derive(serde::Deserialize)]
struct DeepgramAlternative {
    transcript: String,
}

/// Transcribes WAV audio to text
pub struct SpeechToText {
    client: reqwest::Client,
    api_key: String,
    model: String,
    language: Option<String>,
    provider: SttProvider,
}

impl SpeechToText {
    /// Build the configured backend
    ///
    /// # Errors
    ///
    /// Returns error if the provider's API key is missing
    pub fn from_config(speech: &SpeechConfig, keys: &ApiKeys) -> Result<Self> {
        let (key, name) = match speech.stt_provider {
            SttProvider::Whisper => (keys.openai.as_deref(), "OpenAI"),
            SttProvider::Deepgram => (keys.deepgram.as_deref(), "Deepgram"),
        };
        let api_key = key
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| Error::Config(format!("{name} API key required for STT")))?;

        Ok(Self {
            client: reqwest::Client::new(),
            api_key: api_key.to_string(),
            model: speech.stt_model.clone(),
            language: speech.language.clone(),
            provider: speech.stt_provider,
        })
    }

    /// Transcribe WAV bytes
    ///
    /// # Errors
    ///
    /// Returns error if the request fails or the backend rejects it
    pub async fn transcribe(&self, wav: &[u8]) -> Result<String> {
        let text = match self.provider {
            SttProvider::Whisper => self.transcribe_whisper(wav).await?,
            SttProvider::Deepgram => self.transcribe_deepgram(wav).await?,
        };
        let text = text.trim().to_string();
        tracing::debug!(transcript = %text, provider = ?self.provider, "transcription complete");
        Ok(text)
    }

    async fn transcribe_whisper(&self, wav: &[u8]) -> Result<String> {
        let file = reqwest::multipart::Part::bytes(wav.to_vec())
            .file_name("utterance.wav")
            .mime_str("audio/wav")
            .map_err(|e| Error::Stt(e.to_string()))?;

        let mut form = reqwest::multipart::Form::new()
            .part("file", file)
            .text("model", self.model.clone());
        if let Some(language) = &self.language {
            form = form.text("language", language.clone());
        }

        let response = self
            .client
            .post("https://api.openai.com/v1/audio/transcriptions")
            .bearer_auth(&self.api_key)
            .multipart(form)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Stt(format!("Whisper API error {status}: {body}")));
        }

        let result: WhisperResponse = response.json().await?;
        Ok(result.text)
    }

    async fn transcribe_deepgram(&self, wav: &[u8]) -> Result<String> {
        let mut query = vec![("model", self.model.as_str()), ("punctuate", "true")];
        if let Some(language) = &self.language {
            query.push(("language", language.as_str()));
        }

        let response = self
            .client
            .post("https://api.deepgram.com/v1/listen")
            .query(&query)
            .header("Authorization", format!("Token {}", self.api_key))
            .header("Content-Type", "audio/wav")
            .body(wav.to_vec())
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Stt(format!("Deepgram API error {status}: {body}")));
        }

        let result: DeepgramResponse = response.json().await?;
        Ok(result
            .results
            .channels
            .into_iter()
            .next()
            .and_then(|c| c.alternatives.into_iter().next())
            .map(|a| a.transcript)
            .unwrap_or_default())
    }
}

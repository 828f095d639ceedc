//! TOML configuration file loading
//!
//! Supports `~/.config/parley/config.toml` as a persistent config source.
//! Every field is optional; the file is a partial overlay on top of defaults.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::{Error, Result};

/// Top-level TOML configuration file schema
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ParleyConfigFile {
    #[serde(default)]
    pub system: SystemFileConfig,

    #[serde(default)]
    pub conversation: ConversationFileConfig,

    #[serde(default)]
    pub speech: SpeechFileConfig,

    #[serde(default)]
    pub capture: CaptureFileConfig,

    #[serde(default)]
    pub wake: WakeFileConfig,

    /// API keys for external services
    #[serde(default)]
    pub api_keys: ApiKeysFileConfig,
}

/// Runtime behaviour
#[derive(Debug, Default, Deserialize)]
pub struct SystemFileConfig {
    /// Read typed lines instead of listening to the microphone
    pub text_mode: Option<bool>,

    /// Spoken once before the first listen; empty disables it
    pub greeting: Option<String>,

    /// Seconds each stage gets to stop on shutdown
    pub shutdown_timeout_secs: Option<u64>,
}

/// Chat model options
#[derive(Debug, Default, Deserialize)]
pub struct ConversationFileConfig {
    pub model: Option<String>,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
    pub top_p: Option<f32>,
    pub frequency_penalty: Option<f32>,
    pub presence_penalty: Option<f32>,
    pub system_prompt: Option<String>,

    /// Inputs starting with this phrase clear the history
    pub reset_phrase: Option<String>,

    /// Number of past exchanges sent with each request
    pub history: Option<usize>,

    /// Chat completions endpoint base (e.g. "https://api.openai.com/v1")
    pub base_url: Option<String>,
}

/// STT and TTS options
#[derive(Debug, Default, Deserialize)]
pub struct SpeechFileConfig {
    /// "whisper" or "deepgram"
    pub stt_provider: Option<String>,
    pub stt_model: Option<String>,

    /// ISO-639-1 hint passed to the STT backend
    pub language: Option<String>,

    /// "openai" or "elevenlabs"
    pub tts_provider: Option<String>,
    pub tts_model: Option<String>,
    pub tts_voice: Option<String>,
    pub tts_speed: Option<f32>,
}

/// Microphone segmentation thresholds
#[derive(Debug, Default, Deserialize)]
pub struct CaptureFileConfig {
    /// RMS level above which a chunk counts as speech
    pub energy_threshold: Option<f32>,
    pub min_speech_ms: Option<u64>,
    pub trailing_silence_ms: Option<u64>,
    pub max_utterance_secs: Option<u64>,
}

/// Wake word gating
#[derive(Debug, Default, Deserialize)]
pub struct WakeFileConfig {
    /// Wake phrases; empty disables gating
    pub phrases: Option<Vec<String>>,
    pub sleep_phrase: Option<String>,
}

/// API keys configuration
#[derive(Debug, Default, Deserialize)]
pub struct ApiKeysFileConfig {
    pub openai: Option<String>,
    pub deepgram: Option<String>,
    pub elevenlabs: Option<String>,
}

/// Load the TOML config file
///
/// An explicit `path` must exist and parse. Without one, the standard path
/// is tried and a missing or unreadable file falls back to defaults.
///
/// # Errors
///
/// Returns error if an explicitly requested file cannot be read or parsed
pub fn load_config_file(path: Option<&Path>) -> Result<ParleyConfigFile> {
    if let Some(path) = path {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("cannot read {}: {e}", path.display())))?;
        let config = toml::from_str(&content)?;
        tracing::info!(path = %path.display(), "loaded config file");
        return Ok(config);
    }

    let Some(path) = config_file_path() else {
        return Ok(ParleyConfigFile::default());
    };

    if !path.exists() {
        return Ok(ParleyConfigFile::default());
    }

    match std::fs::read_to_string(&path) {
        Ok(content) => match toml::from_str(&content) {
            Ok(config) => {
                tracing::info!(path = %path.display(), "loaded config file");
                Ok(config)
            }
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "failed to parse config file, using defaults"
                );
                Ok(ParleyConfigFile::default())
            }
        },
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "failed to read config file");
            Ok(ParleyConfigFile::default())
        }
    }
}

/// Return the config file path: `~/.config/parley/config.toml`
#[must_use]
pub fn config_file_path() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|d| d.config_dir().join("parley").join("config.toml"))
}

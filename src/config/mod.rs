//! Configuration management for Parley
//!
//! Values are resolved in three layers: built-in defaults, then the TOML
//! file, then environment variables.

pub mod file;

use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use crate::{Error, Result};

/// Assistant configuration
#[derive(Debug, Clone, Default)]
pub struct Config {
    pub system: SystemConfig,
    pub conversation: ConversationConfig,
    pub speech: SpeechConfig,
    pub capture: CaptureConfig,
    pub wake: WakeConfig,
    pub api_keys: ApiKeys,
}

/// Runtime behaviour
#[derive(Debug, Clone)]
pub struct SystemConfig {
    /// Use the keyboard listener instead of the microphone
    pub text_mode: bool,

    /// Spoken before the first listen
    pub greeting: Option<String>,

    /// Time each stage gets to stop on shutdown
    pub shutdown_timeout: Duration,
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            text_mode: false,
            greeting: Some("Hello!".to_string()),
            shutdown_timeout: Duration::from_secs(5),
        }
    }
}

/// Chat model configuration
#[derive(Debug, Clone)]
pub struct ConversationConfig {
    pub model: String,
    pub max_tokens: u32,

    /// Randomness (0.0 - 1.0)
    pub temperature: f32,

    /// Nucleus sampling (0.0 - 1.0)
    pub top_p: f32,

    /// Penalty for frequent tokens (0.0 - 2.0)
    pub frequency_penalty: f32,

    /// Penalty for tokens already present (0.0 - 2.0)
    pub presence_penalty: f32,

    pub system_prompt: String,

    /// Inputs starting with this phrase clear the history
    pub reset_phrase: String,

    /// Past exchanges kept as context
    pub history: usize,

    pub base_url: String,
}

impl Default for ConversationConfig {
    fn default() -> Self {
        Self {
            model: "gpt-4o-mini".to_string(),
            max_tokens: 256,
            temperature: 0.7,
            top_p: 1.0,
            frequency_penalty: 0.0,
            presence_penalty: 0.0,
            system_prompt: "You are a friendly voice assistant. Your replies are spoken \
                            aloud, so keep them short and conversational and avoid \
                            markdown, lists and code."
                .to_string(),
            reset_phrase: "start a new conversation".to_string(),
            history: 8,
            base_url: "https://api.openai.com/v1".to_string(),
        }
    }
}

/// Speech-to-text backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SttProvider {
    #[default]
    Whisper,
    Deepgram,
}

impl FromStr for SttProvider {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "whisper" | "openai" => Ok(Self::Whisper),
            "deepgram" => Ok(Self::Deepgram),
            other => Err(Error::Config(format!("unknown STT provider: {other}"))),
        }
    }
}

/// Text-to-speech backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TtsProvider {
    #[default]
    OpenAi,
    ElevenLabs,
}

impl FromStr for TtsProvider {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "openai" => Ok(Self::OpenAi),
            "elevenlabs" => Ok(Self::ElevenLabs),
            other => Err(Error::Config(format!("unknown TTS provider: {other}"))),
        }
    }
}

/// STT and TTS configuration
#[derive(Debug, Clone)]
pub struct SpeechConfig {
    pub stt_provider: SttProvider,

    /// STT model (e.g. "whisper-1", "nova-2")
    pub stt_model: String,

    /// Language hint for STT
    pub language: Option<String>,

    pub tts_provider: TtsProvider,

    /// TTS model (e.g. "tts-1", "eleven_monolingual_v1")
    pub tts_model: String,

    /// Voice name, or voice ID for ElevenLabs
    pub tts_voice: String,

    pub tts_speed: f32,
}

impl Default for SpeechConfig {
    fn default() -> Self {
        Self {
            stt_provider: SttProvider::Whisper,
            stt_model: "whisper-1".to_string(),
            language: None,
            tts_provider: TtsProvider::OpenAi,
            tts_model: "tts-1".to_string(),
            tts_voice: "alloy".to_string(),
            tts_speed: 1.0,
        }
    }
}

/// Microphone segmentation configuration
#[derive(Debug, Clone, Copy)]
pub struct CaptureConfig {
    /// RMS level above which a chunk counts as speech
    pub energy_threshold: f32,

    /// Shortest utterance worth transcribing
    pub min_speech: Duration,

    /// Silence that ends an utterance
    pub trailing_silence: Duration,

    /// Hard cap on a single utterance
    pub max_utterance: Duration,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            energy_threshold: 0.03,
            min_speech: Duration::from_millis(300),
            trailing_silence: Duration::from_millis(500),
            max_utterance: Duration::from_secs(30),
        }
    }
}

/// Wake word configuration
#[derive(Debug, Clone)]
pub struct WakeConfig {
    /// Wake phrases; empty disables gating
    pub phrases: Vec<String>,

    /// Puts the assistant back to sleep
    pub sleep_phrase: String,
}

impl Default for WakeConfig {
    fn default() -> Self {
        Self {
            phrases: Vec::new(),
            sleep_phrase: "goodbye".to_string(),
        }
    }
}

impl WakeConfig {
    /// Whether wake word gating is on
    #[must_use]
    pub fn enabled(&self) -> bool {
        self.phrases.iter().any(|p| !p.trim().is_empty())
    }
}

/// API keys for external services
#[derive(Clone, Default)]
pub struct ApiKeys {
    pub openai: Option<String>,
    pub deepgram: Option<String>,
    pub elevenlabs: Option<String>,
}

impl std::fmt::Debug for ApiKeys {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mask = |k: &Option<String>| k.as_ref().map(|_| "***");
        f.debug_struct("ApiKeys")
            .field("openai", &mask(&self.openai))
            .field("deepgram", &mask(&self.deepgram))
            .field("elevenlabs", &mask(&self.elevenlabs))
            .finish()
    }
}

impl Config {
    /// Load configuration (env > toml > default)
    ///
    /// # Errors
    ///
    /// Returns error if an explicit config file is unreadable, or if a value
    /// cannot be parsed
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let fc = file::load_config_file(path)?;
        let mut config = Self::default();
        config.apply_file(fc)?;
        config.apply_env_with(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Overlay values from a parsed config file
    ///
    /// # Errors
    ///
    /// Returns error if a provider name is unknown
    pub fn apply_file(&mut self, fc: file::ParleyConfigFile) -> Result<()> {
        let system = &mut self.system;
        if let Some(text_mode) = fc.system.text_mode {
            system.text_mode = text_mode;
        }
        if let Some(greeting) = fc.system.greeting {
            system.greeting = non_blank(greeting);
        }
        if let Some(secs) = fc.system.shutdown_timeout_secs {
            system.shutdown_timeout = Duration::from_secs(secs);
        }

        let conv = &mut self.conversation;
        let c = fc.conversation;
        overlay(&mut conv.model, c.model);
        overlay(&mut conv.max_tokens, c.max_tokens);
        overlay(&mut conv.temperature, c.temperature);
        overlay(&mut conv.top_p, c.top_p);
        overlay(&mut conv.frequency_penalty, c.frequency_penalty);
        overlay(&mut conv.presence_penalty, c.presence_penalty);
        overlay(&mut conv.system_prompt, c.system_prompt);
        overlay(&mut conv.reset_phrase, c.reset_phrase);
        overlay(&mut conv.history, c.history);
        overlay(&mut conv.base_url, c.base_url);

        let speech = &mut self.speech;
        let s = fc.speech;
        if let Some(provider) = s.stt_provider {
            speech.stt_provider = provider.parse()?;
        }
        overlay(&mut speech.stt_model, s.stt_model);
        if s.language.is_some() {
            speech.language = s.language.and_then(non_blank);
        }
        if let Some(provider) = s.tts_provider {
            speech.tts_provider = provider.parse()?;
        }
        overlay(&mut speech.tts_model, s.tts_model);
        overlay(&mut speech.tts_voice, s.tts_voice);
        overlay(&mut speech.tts_speed, s.tts_speed);

        let capture = &mut self.capture;
        overlay(&mut capture.energy_threshold, fc.capture.energy_threshold);
        if let Some(ms) = fc.capture.min_speech_ms {
            capture.min_speech = Duration::from_millis(ms);
        }
        if let Some(ms) = fc.capture.trailing_silence_ms {
            capture.trailing_silence = Duration::from_millis(ms);
        }
        if let Some(secs) = fc.capture.max_utterance_secs {
            capture.max_utterance = Duration::from_secs(secs);
        }

        overlay(&mut self.wake.phrases, fc.wake.phrases);
        overlay(&mut self.wake.sleep_phrase, fc.wake.sleep_phrase);

        let keys = &mut self.api_keys;
        keys.openai = fc.api_keys.openai.or(keys.openai.take());
        keys.deepgram = fc.api_keys.deepgram.or(keys.deepgram.take());
        keys.elevenlabs = fc.api_keys.elevenlabs.or(keys.elevenlabs.take());

        Ok(())
    }

    /// Overlay values from environment variables, looked up through `var`
    ///
    /// # Errors
    ///
    /// Returns error if a variable holds an unparseable value
    pub fn apply_env_with(&mut self, var: impl Fn(&str) -> Option<String>) -> Result<()> {
        let var = |key: &str| var(key).and_then(non_blank);

        if let Some(key) = var("OPENAI_API_KEY") {
            self.api_keys.openai = Some(key);
        }
        if let Some(key) = var("DEEPGRAM_API_KEY") {
            self.api_keys.deepgram = Some(key);
        }
        if let Some(key) = var("ELEVENLABS_API_KEY") {
            self.api_keys.elevenlabs = Some(key);
        }

        if let Some(flag) = var("PARLEY_TEXT_MODE") {
            self.system.text_mode = parse_bool("PARLEY_TEXT_MODE", &flag)?;
        }
        if let Some(greeting) = var("PARLEY_GREETING") {
            self.system.greeting = Some(greeting);
        }
        if let Some(model) = var("PARLEY_MODEL") {
            self.conversation.model = model;
        }
        if let Some(url) = var("PARLEY_BASE_URL") {
            self.conversation.base_url = url;
        }
        if let Some(provider) = var("PARLEY_STT_PROVIDER") {
            self.speech.stt_provider = provider.parse()?;
        }
        if let Some(provider) = var("PARLEY_TTS_PROVIDER") {
            self.speech.tts_provider = provider.parse()?;
        }
        if let Some(voice) = var("PARLEY_TTS_VOICE") {
            self.speech.tts_voice = voice;
        }
        if let Some(phrases) = var("PARLEY_WAKE_PHRASES") {
            self.wake.phrases = phrases
                .split(',')
                .map(str::trim)
                .filter(|p| !p.is_empty())
                .map(str::to_string)
                .collect();
        }

        Ok(())
    }

    /// Check option ranges and required keys
    ///
    /// # Errors
    ///
    /// Returns the first invalid option found
    pub fn validate(&self) -> Result<()> {
        let conv = &self.conversation;

        if conv.model.trim().is_empty() {
            return Err(Error::Config("conversation.model must not be empty".to_string()));
        }
        check_range("conversation.temperature", conv.temperature, 0.0, 1.0)?;
        check_range("conversation.top_p", conv.top_p, 0.0, 1.0)?;
        check_range("conversation.frequency_penalty", conv.frequency_penalty, 0.0, 2.0)?;
        check_range("conversation.presence_penalty", conv.presence_penalty, 0.0, 2.0)?;
        check_range("speech.tts_speed", self.speech.tts_speed, 0.25, 4.0)?;

        let threshold = self.capture.energy_threshold;
        if threshold.is_nan() || threshold <= 0.0 {
            return Err(Error::Config(
                "capture.energy_threshold must be positive".to_string(),
            ));
        }

        let capture = &self.capture;
        if capture.trailing_silence.is_zero() {
            return Err(Error::Config(
                "capture.trailing_silence must be greater than zero".to_string(),
            ));
        }
        if capture.min_speech > capture.max_utterance {
            return Err(Error::Config(
                "capture.min_speech must not exceed capture.max_utterance".to_string(),
            ));
        }

        require_key("OPENAI_API_KEY", self.api_keys.openai.as_ref())?;

        if !self.system.text_mode && self.speech.stt_provider == SttProvider::Deepgram {
            require_key("DEEPGRAM_API_KEY", self.api_keys.deepgram.as_ref())?;
        }
        if self.speech.tts_provider == TtsProvider::ElevenLabs {
            require_key("ELEVENLABS_API_KEY", self.api_keys.elevenlabs.as_ref())?;
        }

        Ok(())
    }
}

fn overlay<T>(slot: &mut T, value: Option<T>) {
    if let Some(value) = value {
        *slot = value;
    }
}

fn non_blank(s: String) -> Option<String> {
    if s.trim().is_empty() { None } else { Some(s) }
}

fn parse_bool(key: &str, value: &str) -> Result<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(Error::Config(format!("{key}: expected a boolean, got {other:?}"))),
    }
}

fn check_range(name: &str, value: f32, min: f32, max: f32) -> Result<()> {
    if (min..=max).contains(&value) {
        Ok(())
    } else {
        Err(Error::Config(format!(
            "{name} must be between {min} and {max}, got {value}"
        )))
    }
}

fn require_key(name: &str, key: Option<&String>) -> Result<()> {
    match key {
        Some(k) if !k.trim().is_empty() => Ok(()),
        _ => Err(Error::Config(format!("{name} is required"))),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::io::Write;

    use super::*;

    fn with_key() -> Config {
        let mut config = Config::default();
        config.api_keys.openai = Some("sk-test".to_string());
        config
    }

    #[test]
    fn test_defaults_validate_with_key() {
        assert!(with_key().validate().is_ok());
        assert!(Config::default().validate().is_err());
    }

    #[test]
    fn test_option_ranges() {
        let mut config = with_key();
        config.conversation.temperature = 1.5;
        assert!(config.validate().is_err());

        let mut config = with_key();
        config.conversation.top_p = -0.1;
        assert!(config.validate().is_err());

        let mut config = with_key();
        config.conversation.frequency_penalty = 2.0;
        config.conversation.presence_penalty = 2.0;
        assert!(config.validate().is_ok());
        config.conversation.presence_penalty = 2.1;
        assert!(config.validate().is_err());

        let mut config = with_key();
        config.conversation.model = "  ".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_capture_timings() {
        let mut config = with_key();
        config.capture.trailing_silence = Duration::ZERO;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("trailing_silence"));

        let mut config = with_key();
        config.capture.min_speech = Duration::from_secs(2);
        config.capture.max_utterance = Duration::from_secs(1);
        assert!(config.validate().is_err());
        config.capture.max_utterance = Duration::from_secs(2);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_provider_keys_required() {
        let mut config = with_key();
        config.speech.stt_provider = SttProvider::Deepgram;
        assert!(config.validate().is_err());

        // Keyboard input never transcribes
        config.system.text_mode = true;
        assert!(config.validate().is_ok());

        config.speech.tts_provider = TtsProvider::ElevenLabs;
        assert!(config.validate().is_err());
        config.api_keys.elevenlabs = Some("el-test".to_string());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_file_overlay() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[system]
text_mode = true
greeting = ""

[conversation]
model = "gpt-4o"
temperature = 0.2
history = 3

[speech]
tts_provider = "elevenlabs"
tts_voice = "21m00Tcm4TlvDq8ikWAM"

[wake]
phrases = ["hey parley"]

[api_keys]
openai = "sk-file"
"#
        )
        .unwrap();

        let fc = file::load_config_file(Some(file.path())).unwrap();
        let mut config = Config::default();
        config.apply_file(fc).unwrap();

        assert!(config.system.text_mode);
        assert_eq!(config.system.greeting, None);
        assert_eq!(config.conversation.model, "gpt-4o");
        assert!((config.conversation.temperature - 0.2).abs() < f32::EPSILON);
        assert_eq!(config.conversation.history, 3);
        assert_eq!(config.conversation.max_tokens, 256);
        assert_eq!(config.speech.tts_provider, TtsProvider::ElevenLabs);
        assert!(config.wake.enabled());
        assert_eq!(config.api_keys.openai.as_deref(), Some("sk-file"));
    }

    #[test]
    fn test_explicit_file_must_exist_and_parse() {
        let dir = tempfile::tempdir().unwrap();
        assert!(file::load_config_file(Some(&dir.path().join("missing.toml"))).is_err());

        let path = dir.path().join("bad.toml");
        std::fs::write(&path, "[conversation\nmodel = ").unwrap();
        assert!(file::load_config_file(Some(&path)).is_err());

        std::fs::write(&path, "[nonsense]\nkey = 1\n").unwrap();
        assert!(file::load_config_file(Some(&path)).is_err());
    }

    #[test]
    fn test_env_overrides_file() {
        let env: HashMap<&str, &str> = HashMap::from([
            ("OPENAI_API_KEY", "sk-env"),
            ("PARLEY_MODEL", "gpt-4.1-mini"),
            ("PARLEY_TEXT_MODE", "yes"),
            ("PARLEY_STT_PROVIDER", "Deepgram"),
            ("PARLEY_WAKE_PHRASES", "hey parley, ok parley ,"),
            ("DEEPGRAM_API_KEY", "   "),
        ]);

        let mut config = Config::default();
        config.api_keys.openai = Some("sk-file".to_string());
        config
            .apply_env_with(|k| env.get(k).map(ToString::to_string))
            .unwrap();

        assert_eq!(config.api_keys.openai.as_deref(), Some("sk-env"));
        assert_eq!(config.api_keys.deepgram, None);
        assert_eq!(config.conversation.model, "gpt-4.1-mini");
        assert!(config.system.text_mode);
        assert_eq!(config.speech.stt_provider, SttProvider::Deepgram);
        assert_eq!(config.wake.phrases, vec!["hey parley", "ok parley"]);
    }

    #[test]
    fn test_bad_env_values_rejected() {
        let mut config = Config::default();
        assert!(
            config
                .apply_env_with(|k| (k == "PARLEY_TEXT_MODE").then(|| "maybe".to_string()))
                .is_err()
        );
        assert!(
            config
                .apply_env_with(|k| (k == "PARLEY_TTS_PROVIDER").then(|| "espeak".to_string()))
                .is_err()
        );
    }

    #[test]
    fn test_api_keys_debug_is_masked() {
        let keys = ApiKeys {
            openai: Some("sk-secret".to_string()),
            ..Default::default()
        };
        let debug = format!("{keys:?}");
        assert!(!debug.contains("sk-secret"));
        assert!(debug.contains("***"));
    }
}

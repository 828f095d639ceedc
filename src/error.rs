//! Error types for Parley

use thiserror::Error;

/// Result type alias for Parley operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in Parley
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Audio device or decoding error
    #[error("audio error: {0}")]
    Audio(String),

    /// Speech-to-text error
    #[error("STT error: {0}")]
    Stt(String),

    /// Text-to-speech error
    #[error("TTS error: {0}")]
    Tts(String),

    /// Language-model backend error (quota, upstream failure, bad reply)
    #[error("conversation error: {0}")]
    Conversation(String),

    /// A wait was interrupted by its cancellation token
    #[error("operation cancelled")]
    Cancelled,

    /// A queue or gate was closed while (or before) waiting on it
    #[error("closed")]
    Closed,

    /// The input source is exhausted and will never produce another utterance
    #[error("input closed: {0}")]
    InputClosed(String),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP error
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// TOML parsing error
    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),
}

impl Error {
    /// Whether this error is a normal unwind signal rather than a failure
    #[must_use]
    pub const fn is_interrupt(&self) -> bool {
        matches!(self, Self::Cancelled | Self::Closed)
    }

    /// Whether a stage hitting this error can never make progress again
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(self, Self::InputClosed(_) | Self::Config(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interrupt_classification() {
        assert!(Error::Cancelled.is_interrupt());
        assert!(Error::Closed.is_interrupt());
        assert!(!Error::Conversation("quota".to_string()).is_interrupt());
    }

    #[test]
    fn test_fatal_classification() {
        assert!(Error::InputClosed("stdin".to_string()).is_fatal());
        assert!(!Error::Stt("timeout".to_string()).is_fatal());
        assert!(!Error::Cancelled.is_fatal());
    }
}

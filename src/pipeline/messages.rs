//! Values passed between pipeline stages

/// One captured utterance
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct UserInput {
    /// Recognized text, possibly empty
    pub message: String,
}

impl UserInput {
    /// Wrap captured text
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// Whether there is nothing worth sending to the model
    #[must_use]
    pub fn is_blank(&self) -> bool {
        self.message.trim().is_empty()
    }
}

/// One reply to be voiced
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SpeakRequest {
    /// Text to synthesize
    pub message: String,
}

impl SpeakRequest {
    /// Wrap reply text
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// Whether there is nothing to say
    #[must_use]
    pub fn is_blank(&self) -> bool {
        self.message.trim().is_empty()
    }
}

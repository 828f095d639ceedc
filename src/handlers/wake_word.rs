//! Wake word gating for any listener

use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use super::Listen;
use crate::Result;

/// Whether the assistant is currently taking commands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WakeState {
    Asleep,
    Awake,
}

/// Wraps a listener so only speech addressed to the assistant gets through
///
/// While asleep, utterances without a wake phrase are discarded and listening
/// continues. Hearing one wakes the assistant; anything said after the phrase
/// becomes the command. Saying the sleep phrase passes that utterance through
/// and goes back to sleep.
pub struct WakeWordListener<L> {
    inner: L,
    phrases: Vec<String>,
    sleep_phrase: String,
    state: Mutex<WakeState>,
}

impl<L: Listen> WakeWordListener<L> {
    /// Gate `inner` behind `phrases`
    pub fn new(inner: L, phrases: Vec<String>, sleep_phrase: impl Into<String>) -> Self {
        let phrases: Vec<String> = phrases
            .into_iter()
            .map(|p| p.trim().to_lowercase())
            .filter(|p| !p.is_empty())
            .collect();

        tracing::debug!(phrases = ?phrases, "wake word gating enabled");

        Self {
            inner,
            phrases,
            sleep_phrase: sleep_phrase.into().trim().to_lowercase(),
            state: Mutex::new(WakeState::Asleep),
        }
    }

    /// Current state
    pub fn state(&self) -> WakeState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_state(&self, state: WakeState) {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner) = state;
    }

    fn says_goodbye(&self, text: &str) -> bool {
        !self.sleep_phrase.is_empty() && match_at(text, &self.sleep_phrase).is_some()
    }

    /// Apply the gate to one transcript
    ///
    /// Returns `None` if the utterance should be discarded.
    fn gate(&self, transcript: &str) -> Option<String> {
        let transcript = transcript.trim();
        if transcript.is_empty() {
            return None;
        }

        if self.state() == WakeState::Asleep {
            let phrase = self.phrases.iter().find(|p| contains_phrase(transcript, p))?;
            tracing::info!(phrase = %phrase, "wake word heard");
            self.set_state(WakeState::Awake);

            let command = extract_command(transcript, phrase);
            if command.is_empty() {
                return None;
            }
            if self.says_goodbye(&command) {
                self.set_state(WakeState::Asleep);
            }
            return Some(command);
        }

        if self.says_goodbye(transcript) {
            tracing::info!("going back to sleep");
            self.set_state(WakeState::Asleep);
        }
        Some(transcript.to_string())
    }
}

#[async_trait]
impl<L: Listen> Listen for WakeWordListener<L> {
    async fn listen(&self, cancel: &CancellationToken) -> Result<String> {
        loop {
            let transcript = self.inner.listen(cancel).await?;
            if cancel.is_cancelled() {
                return Ok(String::new());
            }

            if let Some(command) = self.gate(&transcript) {
                return Ok(command);
            }

            if self.state() == WakeState::Asleep {
                tracing::trace!(transcript = %transcript, "ignored while asleep");
            }
        }
    }
}

fn contains_phrase(transcript: &str, phrase: &str) -> bool {
    find_phrase(transcript, phrase).is_some()
}

/// Byte length of the prefix of `text` that equals `phrase`, ignoring case
fn match_at(text: &str, phrase: &str) -> Option<usize> {
    let mut rest = text.char_indices();
    for expected in phrase.chars() {
        let (_, actual) = rest.next()?;
        if !actual.to_lowercase().eq(expected.to_lowercase()) {
            return None;
        }
    }
    Some(rest.next().map_or(text.len(), |(i, _)| i))
}

/// Byte range of the first case-insensitive occurrence of `phrase`
fn find_phrase(text: &str, phrase: &str) -> Option<(usize, usize)> {
    text.char_indices()
        .find_map(|(start, _)| match_at(&text[start..], phrase).map(|len| (start, start + len)))
}

/// Strip everything up to and including `wake_word` from `transcript`
///
/// Leading whitespace and punctuation after the wake word are dropped. The
/// transcript is returned unchanged if it does not contain the wake word.
#[must_use]
pub fn extract_command(transcript: &str, wake_word: &str) -> String {
    let wake_word = wake_word.trim();
    match find_phrase(transcript, wake_word) {
        Some((_, end)) if !wake_word.is_empty() => transcript[end..]
            .trim_start_matches(|c: char| c.is_whitespace() || c.is_ascii_punctuation())
            .trim_end()
            .to_string(),
        _ => transcript.trim().to_string(),
    }
}

//! Chat-completions conversation handler

use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use super::Converse;
use crate::config::ConversationConfig;
use crate::{Error, Result};

/// Reply given when the user asks to start over
pub const CONTEXT_RESET_REPLY: &str = "Okay, let's start a new conversation.";

/// One completed user/assistant exchange
#[derive(Debug, Clone)]
struct Exchange {
    user: String,
    assistant: String,
}

/// Converses through an OpenAI-compatible `/chat/completions` endpoint
///
/// Keeps the last few exchanges as context. The history lock is never held
/// across the HTTP call.
pub struct ChatHandler {
    client: reqwest::Client,
    api_key: String,
    endpoint: String,
    options: ConversationConfig,
    history: Mutex<VecDeque<Exchange>>,
}

impl ChatHandler {
    /// Create a handler
    ///
    /// # Errors
    ///
    /// Returns error if the API key is blank
    pub fn new(options: ConversationConfig, api_key: impl Into<String>) -> Result<Self> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(Error::Config(
                "OpenAI API key required for conversation".to_string(),
            ));
        }

        let endpoint = format!("{}/chat/completions", options.base_url.trim_end_matches('/'));
        tracing::debug!(model = %options.model, endpoint, "chat handler ready");

        Ok(Self {
            client: reqwest::Client::new(),
            api_key,
            endpoint,
            options,
            history: Mutex::new(VecDeque::new()),
        })
    }

    /// Forget every past exchange
    pub fn reset(&self) {
        self.history
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    /// Number of exchanges currently kept as context
    #[must_use]
    pub fn history_len(&self) -> usize {
        self.history
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    fn is_reset(&self, prompt: &str) -> bool {
        let phrase = self.options.reset_phrase.trim();
        !phrase.is_empty()
            && prompt
                .get(..phrase.len())
                .is_some_and(|head| head.eq_ignore_ascii_case(phrase))
    }

    fn build_messages(&self, prompt: &str) -> Vec<ChatMessage> {
        let history = self.history.lock().unwrap_or_else(PoisonError::into_inner);

        let mut messages = Vec::with_capacity(history.len() * 2 + 2);
        if !self.options.system_prompt.trim().is_empty() {
            messages.push(ChatMessage::new("system", &self.options.system_prompt));
        }
        for exchange in history.iter() {
            messages.push(ChatMessage::new("user", &exchange.user));
            messages.push(ChatMessage::new("assistant", &exchange.assistant));
        }
        messages.push(ChatMessage::new("user", prompt));
        messages
    }

    fn remember(&self, user: &str, assistant: &str) {
        if self.options.history == 0 {
            return;
        }

        let mut history = self.history.lock().unwrap_or_else(PoisonError::into_inner);
        history.push_back(Exchange {
            user: user.to_string(),
            assistant: assistant.to_string(),
        });
        while history.len() > self.options.history {
            history.pop_front();
        }
    }

    async fn complete(&self, prompt: &str) -> Result<String> {
        let request = ChatCompletionRequest {
            model: &self.options.model,
            messages: self.build_messages(prompt),
            max_tokens: self.options.max_tokens,
            temperature: self.options.temperature,
            top_p: self.options.top_p,
            frequency_penalty: self.options.frequency_penalty,
            presence_penalty: self.options.presence_penalty,
            n: 1,
            user: "parley",
        };

        tracing::debug!(messages = request.messages.len(), "sending chat request");

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| Error::Conversation(format!("chat request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Conversation(format!("chat API error {status}: {body}")));
        }

        let result: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| Error::Conversation(format!("malformed chat response: {e}")))?;

        let choice = result
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| Error::Conversation("chat response had no choices".to_string()))?;

        Ok(choice.message.content.unwrap_or_default().trim().to_string())
    }
}

#[async_trait]
impl Converse for ChatHandler {
    async fn process(&self, prompt: &str, cancel: &CancellationToken) -> Result<String> {
        let prompt = prompt.trim();
        if prompt.is_empty() {
            return Ok(String::new());
        }

        if self.is_reset(prompt) {
            tracing::info!("conversation context reset");
            self.reset();
            return Ok(CONTEXT_RESET_REPLY.to_string());
        }

        let reply = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(Error::Cancelled),
            reply = self.complete(prompt) => reply?,
        };

        if !reply.is_empty() {
            self.remember(prompt, &reply);
        }

        Ok(reply)
    }
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: &'static str,
    content: String,
}

impl ChatMessage {
    fn new(role: &'static str, content: &str) -> Self {
        Self {
            role,
            content: content.to_string(),
        }
    }
}

#[derive(Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    max_tokens: u32,
    temperature: f32,
    top_p: f32,
    frequency_penalty: f32,
    presence_penalty: f32,
    n: u32,
    user: &'a str,
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

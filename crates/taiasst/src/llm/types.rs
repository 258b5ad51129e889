//! Common types for LLM chat completions.

use std::pin::Pin;

use futures::Stream;
use serde::{Deserialize, Serialize};

use super::error::LLMError;

/// Temperature sent when the caller leaves it unset.
pub const DEFAULT_TEMPERATURE: f32 = 0.7;

/// Output token limit sent when the caller leaves it unset.
pub const DEFAULT_MAX_TOKENS: u32 = 2000;

/// A message in a chat conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }
}

/// The role of a message sender.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// Sampling parameters supplied by the caller. Unset fields fall back to
/// [`DEFAULT_TEMPERATURE`] and [`DEFAULT_MAX_TOKENS`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct GenerationParams {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

/// A streaming chat completion request (OpenAI-compatible format).
#[derive(Debug, Clone, Serialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<Message>,
    pub temperature: f32,
    pub max_tokens: u32,
    pub stream: bool,
}

impl ChatRequest {
    /// Build a streaming request, resolving omitted parameters to their defaults.
    pub fn new(model: impl Into<String>, messages: Vec<Message>, params: &GenerationParams) -> Self {
        Self {
            model: model.into(),
            messages,
            temperature: params.temperature.unwrap_or(DEFAULT_TEMPERATURE),
            max_tokens: params.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
            stream: true,
        }
    }
}

/// Events yielded by a structured provider stream.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    /// An incremental piece of answer text.
    Token(String),
    /// The vendor signalled the end of the response.
    Done,
}

/// A boxed stream of provider events.
pub type ChatStream = Pin<Box<dyn Stream<Item = Result<StreamEvent, LLMError>> + Send>>;

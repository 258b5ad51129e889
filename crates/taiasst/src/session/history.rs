//! Conversation state owned by the UI and mutated by the orchestrator.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::llm::{GenerationParams, Message, Provider, Role};

/// One turn of a conversation.
pub type ChatTurn = Message;

/// Title a conversation carries until its first exchange completes.
pub const DEFAULT_TITLE: &str = "New chat";

/// Characters of the first user message kept in a generated title.
const TITLE_CHARS: usize = 20;

/// Provider, model and sampling options of one conversation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CompletionOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<Provider>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

impl CompletionOptions {
    pub fn params(&self) -> GenerationParams {
        GenerationParams {
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        }
    }
}

/// A conversation: ordered turns plus the options used to continue it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatHistory {
    pub id: String,
    pub title: String,
    pub turns: Vec<ChatTurn>,
    pub config: CompletionOptions,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ChatHistory {
    /// Start a conversation holding only the system turn.
    pub fn new(
        title: impl Into<String>,
        system_prompt: impl Into<String>,
        config: CompletionOptions,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: format!("chat_{}", ulid::Ulid::new()),
            title: title.into(),
            turns: vec![Message::system(system_prompt)],
            config,
            created_at: now,
            updated_at: now,
        }
    }

    /// Append a turn and return its index.
    pub fn push_turn(&mut self, turn: ChatTurn) -> usize {
        self.turns.push(turn);
        self.touch();
        self.turns.len() - 1
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    pub fn user_turns(&self) -> usize {
        self.turns.iter().filter(|t| t.role == Role::User).count()
    }

    /// Replace the default title with one derived from `first_message`.
    ///
    /// Returns false when the conversation already has a custom title.
    pub fn title_from(&mut self, first_message: &str) -> bool {
        if self.title != DEFAULT_TITLE {
            return false;
        }
        self.title = generate_title(first_message);
        true
    }
}

fn generate_title(message: &str) -> String {
    let mut chars = message.char_indices();
    match chars.nth(TITLE_CHARS) {
        Some((cut, _)) => format!("{}...", &message[..cut]),
        None => message.to_string(),
    }
}

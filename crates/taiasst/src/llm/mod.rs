//! Vendor clients for streaming chat completions.

mod anthropic;
mod error;
pub mod lines;
mod openai;
mod provider;
mod types;

pub use anthropic::AnthropicProvider;
pub use error::LLMError;
pub use openai::OpenAICompatibleProvider;
pub use provider::{
    CapabilityFlags, LLMProvider, Provider, ProviderClient, create_client, create_client_with,
    validate_configuration,
};
pub use types::{
    ChatRequest, ChatStream, DEFAULT_MAX_TOKENS, DEFAULT_TEMPERATURE, GenerationParams, Message,
    Role, StreamEvent,
};

pub(crate) use openai::StreamChunk;

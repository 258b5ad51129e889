//! Provider identifiers and the client factory.

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::anthropic::AnthropicProvider;
use super::error::LLMError;
use super::openai::OpenAICompatibleProvider;
use super::types::{ChatRequest, ChatStream};

/// Vendors the engine can talk to, in fallback priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    OpenAI,
    DeepSeek,
    #[serde(alias = "claude")]
    Anthropic,
    Ollama,
}

impl Provider {
    /// Every supported provider; the first entry is the session fallback.
    pub const ALL: [Provider; 4] = [
        Provider::OpenAI,
        Provider::DeepSeek,
        Provider::Anthropic,
        Provider::Ollama,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::OpenAI => "openai",
            Provider::DeepSeek => "deepseek",
            Provider::Anthropic => "anthropic",
            Provider::Ollama => "ollama",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Provider::OpenAI => "OpenAI",
            Provider::DeepSeek => "DeepSeek AI",
            Provider::Anthropic => "Anthropic",
            Provider::Ollama => "Ollama",
        }
    }

    pub fn default_base_url(&self) -> &'static str {
        match self {
            Provider::OpenAI => "https://api.openai.com/v1",
            Provider::DeepSeek => "https://api.deepseek.com/v1",
            Provider::Anthropic => "https://api.anthropic.com",
            Provider::Ollama => "http://localhost:11434/v1",
        }
    }

    /// Local runtimes accept unauthenticated requests.
    pub fn requires_api_key(&self) -> bool {
        !matches!(self, Provider::Ollama)
    }

    /// Environment variable consulted when no key is configured.
    pub fn api_key_env(&self) -> &'static str {
        match self {
            Provider::OpenAI => "OPENAI_API_KEY",
            Provider::DeepSeek => "DEEPSEEK_API_KEY",
            Provider::Anthropic => "ANTHROPIC_API_KEY",
            Provider::Ollama => "OLLAMA_API_KEY",
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Provider {
    type Err = LLMError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "openai" => Ok(Provider::OpenAI),
            "deepseek" => Ok(Provider::DeepSeek),
            "anthropic" | "claude" => Ok(Provider::Anthropic),
            "ollama" => Ok(Provider::Ollama),
            _ => Err(LLMError::UnsupportedProvider(s.to_string())),
        }
    }
}

/// Per-model markers that select the engine path and the transcript shaping rule.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapabilityFlags {
    /// The model streams separate reasoning and answer channels and must be
    /// decoded by hand; its transcript has to open with a user turn.
    pub manual_decode_path: bool,
}

impl CapabilityFlags {
    pub fn for_model(provider: Provider, model_id: &str) -> Self {
        Self {
            manual_decode_path: provider == Provider::DeepSeek && model_id.contains("reasoner"),
        }
    }
}

/// Vendor-specific operations behind a structured stream.
#[async_trait]
pub trait LLMProvider: Send + Sync {
    /// Open a streaming chat completion.
    async fn chat_stream(&self, request: ChatRequest) -> Result<ChatStream, LLMError>;

    /// Lightweight authenticated call used to check credentials.
    async fn list_models(&self) -> Result<(), LLMError>;
}

/// A client bound to one vendor, its credentials and its base URL.
pub enum ProviderClient {
    OpenAI(OpenAICompatibleProvider),
    DeepSeek(OpenAICompatibleProvider),
    Anthropic(AnthropicProvider),
    Ollama(OpenAICompatibleProvider),
}

impl ProviderClient {
    pub fn provider(&self) -> Provider {
        match self {
            ProviderClient::OpenAI(_) => Provider::OpenAI,
            ProviderClient::DeepSeek(_) => Provider::DeepSeek,
            ProviderClient::Anthropic(_) => Provider::Anthropic,
            ProviderClient::Ollama(_) => Provider::Ollama,
        }
    }

    pub fn capabilities(&self, model_id: &str) -> CapabilityFlags {
        CapabilityFlags::for_model(self.provider(), model_id)
    }

    pub fn base_url(&self) -> &str {
        match self {
            ProviderClient::OpenAI(p) | ProviderClient::DeepSeek(p) | ProviderClient::Ollama(p) => {
                p.base_url()
            }
            ProviderClient::Anthropic(p) => p.base_url(),
        }
    }

    /// Raw transport for models that need the manual decode path.
    pub(crate) fn manual_transport(&self, model_id: &str) -> Option<&OpenAICompatibleProvider> {
        match self {
            ProviderClient::DeepSeek(p) if self.capabilities(model_id).manual_decode_path => Some(p),
            ProviderClient::OpenAI(_)
            | ProviderClient::DeepSeek(_)
            | ProviderClient::Anthropic(_)
            | ProviderClient::Ollama(_) => None,
        }
    }

    fn as_provider(&self) -> &dyn LLMProvider {
        match self {
            ProviderClient::OpenAI(p) | ProviderClient::DeepSeek(p) | ProviderClient::Ollama(p) => p,
            ProviderClient::Anthropic(p) => p,
        }
    }

    pub(crate) async fn chat_stream(&self, request: ChatRequest) -> Result<ChatStream, LLMError> {
        self.as_provider().chat_stream(request).await
    }
}

/// Build a client for `provider` with a fresh HTTP connection pool.
///
/// No network call is made and the key is not checked.
pub fn create_client(
    provider: &str,
    api_key: &str,
    base_url: Option<&str>,
) -> Result<ProviderClient, LLMError> {
    create_client_with(Client::new(), provider, api_key, base_url)
}

/// Build a client for `provider` on top of an existing HTTP connection pool.
pub fn create_client_with(
    http: Client,
    provider: &str,
    api_key: &str,
    base_url: Option<&str>,
) -> Result<ProviderClient, LLMError> {
    let provider: Provider = provider.parse()?;

    let base_url = base_url
        .map(str::trim)
        .filter(|url| !url.is_empty())
        .unwrap_or(provider.default_base_url())
        .trim_end_matches('/')
        .to_string();
    let api_key = (!api_key.is_empty()).then(|| api_key.to_string());

    debug!(%provider, %base_url, "Creating provider client");

    Ok(match provider {
        Provider::OpenAI => {
            ProviderClient::OpenAI(OpenAICompatibleProvider::new(http, base_url, api_key))
        }
        Provider::DeepSeek => {
            ProviderClient::DeepSeek(OpenAICompatibleProvider::new(http, base_url, api_key))
        }
        Provider::Anthropic => ProviderClient::Anthropic(AnthropicProvider::new(
            http,
            api_key.unwrap_or_default(),
            base_url,
        )),
        Provider::Ollama => {
            ProviderClient::Ollama(OpenAICompatibleProvider::new(http, base_url, api_key))
        }
    })
}

/// Check credentials with a model listing call. Any failure reads as "invalid".
pub async fn validate_configuration(client: &ProviderClient) -> bool {
    match client.as_provider().list_models().await {
        Ok(()) => true,
        Err(e) => {
            warn!(provider = %client.provider(), error = %e, "Provider configuration check failed");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_known_providers() {
        assert_eq!("openai".parse::<Provider>().unwrap(), Provider::OpenAI);
        assert_eq!("DeepSeek".parse::<Provider>().unwrap(), Provider::DeepSeek);
        assert_eq!("claude".parse::<Provider>().unwrap(), Provider::Anthropic);
        assert_eq!(" ollama ".parse::<Provider>().unwrap(), Provider::Ollama);
    }

    #[test]
    fn unsupported_provider_fails_before_any_io() {
        let result = create_client("moonshot", "sk-test", None);
        match result {
            Err(LLMError::UnsupportedProvider(name)) => assert_eq!(name, "moonshot"),
            Err(other) => panic!("unexpected error: {other}"),
            Ok(_) => panic!("moonshot should not be supported"),
        }
    }

    #[test]
    fn omitted_base_url_uses_vendor_default() {
        let client = create_client("deepseek", "sk-test", None).unwrap();
        assert_eq!(client.provider(), Provider::DeepSeek);
        assert_eq!(client.base_url(), "https://api.deepseek.com/v1");

        let client = create_client("openai", "sk-test", Some("  ")).unwrap();
        assert_eq!(client.base_url(), "https://api.openai.com/v1");
    }

    #[test]
    fn explicit_base_url_drops_trailing_slash() {
        let client = create_client("openai", "sk-test", Some("http://localhost:8000/v1/")).unwrap();
        assert_eq!(client.base_url(), "http://localhost:8000/v1");
    }

    #[test]
    fn reasoner_models_take_manual_path() {
        let deepseek = create_client("deepseek", "sk-test", None).unwrap();
        assert!(deepseek.capabilities("deepseek-reasoner").manual_decode_path);
        assert!(!deepseek.capabilities("deepseek-chat").manual_decode_path);
        assert!(deepseek.manual_transport("deepseek-reasoner").is_some());
        assert!(deepseek.manual_transport("deepseek-chat").is_none());

        let openai = create_client("openai", "sk-test", None).unwrap();
        assert!(!openai.capabilities("o1-reasoner").manual_decode_path);
        assert!(openai.manual_transport("o1-reasoner").is_none());
    }

    #[test]
    fn only_ollama_runs_without_key() {
        for provider in Provider::ALL {
            assert_eq!(provider.requires_api_key(), provider != Provider::Ollama);
        }
    }

    #[test]
    fn provider_serde_uses_lowercase_ids() {
        assert_eq!(serde_json::to_string(&Provider::DeepSeek).unwrap(), "\"deepseek\"");
        assert_eq!(
            serde_json::from_str::<Provider>("\"claude\"").unwrap(),
            Provider::Anthropic
        );
    }
}

use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Deserializer};
use thiserror::Error;
use tokio::fs;
use tracing::warn;

use crate::catalog::{ModelDefinition, StaticCatalog};
use crate::llm::Provider;
use crate::session::CompletionOptions;
use crate::store::{CredentialStore, ProviderCredentials};

pub const DEFAULT_CONFIG_PATH: &str = ".taiasst/config.yaml";

// ============================================================================
// Config (root)
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct Config {
    /// Per-provider credentials. Keys accept provider ids and aliases.
    #[serde(default, deserialize_with = "deserialize_providers")]
    pub providers: HashMap<Provider, ProviderConfig>,
    #[serde(default)]
    pub defaults: DefaultsConfig,
    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,
    /// Enabled models. Empty means the built-in list.
    #[serde(default)]
    pub models: Vec<ModelEntry>,
    #[serde(default = "default_settings_path")]
    pub settings_path: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            providers: HashMap::new(),
            defaults: DefaultsConfig::default(),
            system_prompt: default_system_prompt(),
            models: Vec::new(),
            settings_path: default_settings_path(),
        }
    }
}

impl Config {
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = match fs::read_to_string(path).await {
            Ok(c) => c,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) => return Err(ConfigError::Io(e)),
        };
        Ok(serde_saphyr::from_str(&contents)?)
    }

    /// Model catalog described by the `models` section.
    pub fn catalog(&self) -> StaticCatalog {
        StaticCatalog::new(
            self.models
                .iter()
                .map(|entry| {
                    let name = entry.name.as_deref().unwrap_or(&entry.model_id);
                    ModelDefinition::new(entry.provider, &entry.model_id, name)
                })
                .collect(),
        )
    }

    /// Options new conversations start with.
    pub fn completion_options(&self) -> CompletionOptions {
        CompletionOptions {
            provider: self.defaults.provider,
            model: self.defaults.model.clone(),
            temperature: self.defaults.temperature,
            max_tokens: self.defaults.max_tokens,
        }
    }

    fn resolve_credentials(
        &self,
        provider: Provider,
        env: impl Fn(&str) -> Option<String>,
    ) -> Option<ProviderCredentials> {
        let configured = self.providers.get(&provider);

        let api_key = configured
            .and_then(|c| c.api_key.clone())
            .filter(|key| !key.trim().is_empty())
            .or_else(|| env(provider.api_key_env()).filter(|key| !key.trim().is_empty()));
        let base_url = configured.and_then(|c| c.base_url.clone());

        if api_key.is_none() && base_url.is_none() && configured.is_none() {
            return None;
        }
        Some(ProviderCredentials { api_key, base_url })
    }
}

#[async_trait]
impl CredentialStore for Config {
    async fn credentials(&self, provider: Provider) -> Option<ProviderCredentials> {
        self.resolve_credentials(provider, |var| std::env::var(var).ok())
    }
}

/// Resolve provider keys once. Unknown providers are skipped; two keys naming
/// the same provider are rejected.
fn deserialize_providers<'de, D>(
    deserializer: D,
) -> Result<HashMap<Provider, ProviderConfig>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = HashMap::<String, ProviderConfig>::deserialize(deserializer)?;
    let mut providers = HashMap::with_capacity(raw.len());

    for (name, settings) in raw {
        let Ok(provider) = name.parse::<Provider>() else {
            warn!(provider = %name, "Ignoring credentials for unsupported provider");
            continue;
        };
        if providers.insert(provider, settings).is_some() {
            return Err(serde::de::Error::custom(format!(
                "credentials for provider {provider} are configured more than once"
            )));
        }
    }
    Ok(providers)
}

fn default_system_prompt() -> String {
    "You are a helpful assistant. Answer concisely and accurately.".to_string()
}

fn default_settings_path() -> PathBuf {
    PathBuf::from(".taiasst/settings.yaml")
}

// ============================================================================
// ProviderConfig
// ============================================================================

#[derive(Debug, Default, Deserialize)]
pub struct ProviderConfig {
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub base_url: Option<String>,
}

// ============================================================================
// DefaultsConfig
// ============================================================================

#[derive(Debug, Default, Deserialize)]
pub struct DefaultsConfig {
    #[serde(default)]
    pub provider: Option<Provider>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub temperature: Option<f32>,
    #[serde(default)]
    pub max_tokens: Option<u32>,
}

// ============================================================================
// ModelEntry
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct ModelEntry {
    pub provider: Provider,
    pub model_id: String,
    #[serde(default)]
    pub name: Option<String>,
}

// ============================================================================
// ConfigError
// ============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config file: {0}")]
    Yaml(#[from] serde_saphyr::Error),
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::ModelCatalog;
    use std::io::Write;
    use tempfile::{NamedTempFile, TempDir};

    fn no_env(_: &str) -> Option<String> {
        None
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(config.providers.is_empty());
        assert!(config.models.is_empty());
        assert_eq!(config.settings_path, PathBuf::from(".taiasst/settings.yaml"));
        assert!(!config.system_prompt.is_empty());
        assert_eq!(config.completion_options(), CompletionOptions::default());
    }

    #[tokio::test]
    async fn test_load_missing_file_returns_defaults() {
        let tmp_dir = TempDir::new().unwrap();
        let missing_path = tmp_dir.path().join("missing-config.yaml");
        let config = Config::load(&missing_path).await.unwrap();
        assert!(config.providers.is_empty());
        assert_eq!(config.settings_path, PathBuf::from(".taiasst/settings.yaml"));
    }

    #[tokio::test]
    async fn test_load_valid_yaml() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
providers:
  deepseek:
    api_key: "sk-deepseek"
  ollama:
    base_url: "http://gpu-box:11434/v1"
defaults:
  provider: deepseek
  model: deepseek-reasoner
  temperature: 0.2
system_prompt: "Be terse."
models:
  - provider: deepseek
    model_id: deepseek-reasoner
    name: "DeepSeek R1"
  - provider: claude
    model_id: claude-3-haiku-20240307
settings_path: "/tmp/taiasst-settings.yaml"
"#
        )
        .unwrap();

        let config = Config::load(file.path()).await.unwrap();
        assert_eq!(config.system_prompt, "Be terse.");
        assert_eq!(
            config.settings_path,
            PathBuf::from("/tmp/taiasst-settings.yaml")
        );

        let options = config.completion_options();
        assert_eq!(options.provider, Some(Provider::DeepSeek));
        assert_eq!(options.model.as_deref(), Some("deepseek-reasoner"));
        assert_eq!(options.temperature, Some(0.2));
        assert_eq!(options.max_tokens, None);

        let models = config.catalog().enabled_models().await.unwrap();
        assert_eq!(models.len(), 2);
        assert!(models[0].capabilities.manual_decode_path);
        assert_eq!(models[1].provider, Provider::Anthropic);
        assert_eq!(models[1].name, "claude-3-haiku-20240307");
    }

    #[tokio::test]
    async fn test_provider_keys_resolved_at_load() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
providers:
  claude:
    api_key: "sk-ant"
  moonshot:
    api_key: "sk-moon"
"#
        )
        .unwrap();

        let config = Config::load(file.path()).await.unwrap();
        assert_eq!(config.providers.len(), 1);
        assert_eq!(
            config.providers[&Provider::Anthropic].api_key.as_deref(),
            Some("sk-ant")
        );
    }

    #[tokio::test]
    async fn test_alias_and_id_for_same_provider_is_error() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
providers:
  claude:
    api_key: "sk-one"
  anthropic:
    api_key: "sk-two"
"#
        )
        .unwrap();

        let result = Config::load(file.path()).await;
        assert!(matches!(result, Err(ConfigError::Yaml(_))));
    }

    #[tokio::test]
    async fn test_load_invalid_yaml_is_error() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "defaults: [not, a, map").unwrap();

        let result = Config::load(file.path()).await;
        assert!(matches!(result, Err(ConfigError::Yaml(_))));
    }

    #[test]
    fn configured_key_wins_over_environment() {
        let mut config = Config::default();
        config.providers.insert(
            Provider::OpenAI,
            ProviderConfig {
                api_key: Some("sk-config".to_string()),
                base_url: None,
            },
        );

        let creds = config
            .resolve_credentials(Provider::OpenAI, |_| Some("sk-env".to_string()))
            .unwrap();
        assert_eq!(creds.api_key.as_deref(), Some("sk-config"));
        assert_eq!(creds.base_url, None);
    }

    #[test]
    fn environment_key_used_when_not_configured() {
        let config = Config::default();
        let creds = config
            .resolve_credentials(Provider::DeepSeek, |var| {
                (var == "DEEPSEEK_API_KEY").then(|| "sk-env".to_string())
            })
            .unwrap();
        assert_eq!(creds.api_key.as_deref(), Some("sk-env"));

        assert_eq!(config.resolve_credentials(Provider::OpenAI, no_env), None);
    }

    #[test]
    fn blank_key_counts_as_missing() {
        let mut config = Config::default();
        config.providers.insert(
            Provider::Anthropic,
            ProviderConfig {
                api_key: Some("  ".to_string()),
                base_url: Some("http://proxy".to_string()),
            },
        );

        let creds = config
            .resolve_credentials(Provider::Anthropic, no_env)
            .unwrap();
        assert_eq!(creds.api_key, None);
        assert_eq!(creds.base_url.as_deref(), Some("http://proxy"));
    }
}

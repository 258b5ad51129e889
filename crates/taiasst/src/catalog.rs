//! Model catalog and the process-wide model cache.

use std::collections::HashSet;
use std::sync::{Arc, PoisonError, RwLock};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use crate::llm::{CapabilityFlags, Provider};

/// A model the user can pick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelDefinition {
    pub provider: Provider,
    /// Identifier sent on the wire.
    pub model_id: String,
    /// Human-friendly name.
    pub name: String,
    #[serde(default)]
    pub capabilities: CapabilityFlags,
    /// Whether this entry came from the user's catalog rather than the built-ins.
    #[serde(default)]
    pub configured: bool,
}

impl ModelDefinition {
    pub fn new(provider: Provider, model_id: impl Into<String>, name: impl Into<String>) -> Self {
        let model_id = model_id.into();
        Self {
            capabilities: CapabilityFlags::for_model(provider, &model_id),
            provider,
            model_id,
            name: name.into(),
            configured: false,
        }
    }
}

/// Built-in models, used for every provider the catalog says nothing about.
pub fn default_models() -> Vec<ModelDefinition> {
    vec![
        ModelDefinition::new(Provider::OpenAI, "gpt-3.5-turbo", "GPT-3.5 Turbo"),
        ModelDefinition::new(Provider::OpenAI, "gpt-4", "GPT-4"),
        ModelDefinition::new(Provider::OpenAI, "gpt-4-turbo", "GPT-4 Turbo"),
        ModelDefinition::new(Provider::DeepSeek, "deepseek-chat", "DeepSeek Chat"),
        ModelDefinition::new(Provider::DeepSeek, "deepseek-reasoner", "DeepSeek R1"),
        ModelDefinition::new(Provider::Anthropic, "claude-3-opus-20240229", "Claude 3 Opus"),
        ModelDefinition::new(Provider::Anthropic, "claude-3-sonnet-20240229", "Claude 3 Sonnet"),
        ModelDefinition::new(Provider::Anthropic, "claude-3-haiku-20240307", "Claude 3 Haiku"),
        ModelDefinition::new(Provider::Ollama, "llama2", "Llama 2"),
        ModelDefinition::new(Provider::Ollama, "mistral", "Mistral"),
    ]
}

/// Errors from a model catalog backend.
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("model catalog unavailable: {0}")]
    Unavailable(String),
}

/// Source of the models the user has enabled.
#[async_trait]
pub trait ModelCatalog: Send + Sync {
    async fn enabled_models(&self) -> Result<Vec<ModelDefinition>, CatalogError>;
}

/// A fixed catalog, typically read from the config file.
#[derive(Debug, Clone, Default)]
pub struct StaticCatalog {
    models: Vec<ModelDefinition>,
}

impl StaticCatalog {
    pub fn new(models: Vec<ModelDefinition>) -> Self {
        Self { models }
    }
}

#[async_trait]
impl ModelCatalog for StaticCatalog {
    async fn enabled_models(&self) -> Result<Vec<ModelDefinition>, CatalogError> {
        Ok(self.models.clone())
    }
}

/// Shared list of available models.
///
/// The list is only ever replaced as a whole, so readers see either the old
/// snapshot or the new one.
#[derive(Clone)]
pub struct ModelCache {
    catalog: Arc<dyn ModelCatalog>,
    models: Arc<RwLock<Arc<Vec<ModelDefinition>>>>,
}

impl ModelCache {
    /// Create a cache holding the built-in models until the first refresh.
    pub fn new(catalog: Arc<dyn ModelCatalog>) -> Self {
        Self {
            catalog,
            models: Arc::new(RwLock::new(Arc::new(default_models()))),
        }
    }

    /// Reload from the catalog and swap in the merged list.
    pub async fn refresh(&self) -> Arc<Vec<ModelDefinition>> {
        let merged = match self.catalog.enabled_models().await {
            Ok(configured) => merge_with_defaults(configured),
            Err(e) => {
                warn!(error = %e, "Falling back to built-in models");
                default_models()
            }
        };

        info!(models = merged.len(), "Model cache refreshed");

        let snapshot = Arc::new(merged);
        *self.models.write().unwrap_or_else(PoisonError::into_inner) = Arc::clone(&snapshot);
        snapshot
    }

    /// Current snapshot.
    pub fn get(&self) -> Arc<Vec<ModelDefinition>> {
        Arc::clone(&self.models.read().unwrap_or_else(PoisonError::into_inner))
    }

    /// First model registered for `provider` in the current snapshot.
    pub fn first_model_for(&self, provider: Provider) -> Option<ModelDefinition> {
        self.get().iter().find(|m| m.provider == provider).cloned()
    }
}

/// Configured models first, then the built-ins of providers with nothing configured.
fn merge_with_defaults(configured: Vec<ModelDefinition>) -> Vec<ModelDefinition> {
    let covered: HashSet<Provider> = configured.iter().map(|m| m.provider).collect();

    configured
        .into_iter()
        .map(|mut model| {
            model.configured = true;
            model.capabilities = CapabilityFlags::for_model(model.provider, &model.model_id);
            model
        })
        .chain(
            default_models()
                .into_iter()
                .filter(|m| !covered.contains(&m.provider)),
        )
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FailingCatalog;

    #[async_trait]
    impl ModelCatalog for FailingCatalog {
        async fn enabled_models(&self) -> Result<Vec<ModelDefinition>, CatalogError> {
            Err(CatalogError::Unavailable("database locked".to_string()))
        }
    }

    #[test]
    fn defaults_flag_reasoner_for_manual_decoding() {
        let reasoner = default_models()
            .into_iter()
            .find(|m| m.model_id == "deepseek-reasoner")
            .unwrap();
        assert!(reasoner.capabilities.manual_decode_path);
        assert!(!reasoner.configured);
    }

    #[tokio::test]
    async fn refresh_merges_configured_with_uncovered_defaults() {
        let catalog = StaticCatalog::new(vec![ModelDefinition::new(
            Provider::DeepSeek,
            "deepseek-reasoner",
            "R1",
        )]);
        let cache = ModelCache::new(Arc::new(catalog));

        let before = cache.get();
        let after = cache.refresh().await;

        // Old snapshots stay intact after a refresh.
        assert_eq!(before.len(), default_models().len());

        assert_eq!(after[0].model_id, "deepseek-reasoner");
        assert!(after[0].configured);
        assert!(
            !after
                .iter()
                .any(|m| m.provider == Provider::DeepSeek && m.model_id == "deepseek-chat")
        );
        assert!(after.iter().any(|m| m.provider == Provider::OpenAI));
        assert_eq!(cache.get(), after);
    }

    #[tokio::test]
    async fn refresh_failure_installs_defaults() {
        let cache = ModelCache::new(Arc::new(FailingCatalog));
        let models = cache.refresh().await;
        assert_eq!(*models, default_models());
    }

    #[tokio::test]
    async fn first_model_for_provider() {
        let cache = ModelCache::new(Arc::new(StaticCatalog::default()));
        cache.refresh().await;

        let first = cache.first_model_for(Provider::OpenAI).unwrap();
        assert_eq!(first.model_id, "gpt-3.5-turbo");
        assert_eq!(
            cache.first_model_for(Provider::Ollama).unwrap().model_id,
            "llama2"
        );
    }
}

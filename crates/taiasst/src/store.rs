//! Persistence collaborators used by the chat orchestrator.
//!
//! Credentials and default-model settings live outside the engine. These
//! traits describe what the orchestrator needs from them; the file-backed
//! settings store writes YAML atomically (temp file + rename).

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use crate::llm::Provider;

// ============================================================================
// Credentials
// ============================================================================

/// Connection details for one provider.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProviderCredentials {
    pub api_key: Option<String>,
    pub base_url: Option<String>,
}

/// Source of per-provider API keys and endpoints.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn credentials(&self, provider: Provider) -> Option<ProviderCredentials>;
}

// ============================================================================
// Settings
// ============================================================================

/// The provider/model pair new conversations start with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DefaultSelection {
    pub provider: Provider,
    pub model: String,
}

/// Errors from a settings backend.
#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("settings file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse settings file: {0}")]
    Yaml(#[from] serde_saphyr::Error),

    #[error("failed to encode settings: {0}")]
    Encode(String),
}

impl SettingsError {
    fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Storage for the user's default model selection.
#[async_trait]
pub trait SettingsStore: Send + Sync {
    async fn default_selection(&self) -> Result<Option<DefaultSelection>, SettingsError>;

    async fn save_default_selection(&self, selection: &DefaultSelection)
    -> Result<(), SettingsError>;
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct SettingsFile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    default: Option<DefaultSelection>,
}

/// Settings kept in a YAML file.
#[derive(Debug, Clone)]
pub struct FileSettingsStore {
    path: PathBuf,
}

impl FileSettingsStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    async fn read(&self) -> Result<SettingsFile, SettingsError> {
        match fs::read_to_string(&self.path).await {
            Ok(contents) => Ok(serde_saphyr::from_str(&contents)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(SettingsFile::default()),
            Err(e) => Err(SettingsError::io(&self.path, e)),
        }
    }
}

#[async_trait]
impl SettingsStore for FileSettingsStore {
    async fn default_selection(&self) -> Result<Option<DefaultSelection>, SettingsError> {
        Ok(self.read().await?.default)
    }

    async fn save_default_selection(
        &self,
        selection: &DefaultSelection,
    ) -> Result<(), SettingsError> {
        let mut settings = self.read().await?;
        settings.default = Some(selection.clone());

        let yaml =
            serde_saphyr::to_string(&settings).map_err(|e| SettingsError::Encode(e.to_string()))?;

        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| SettingsError::io(parent, e))?;
        }
        atomic_write_file(&self.path, yaml.as_bytes()).await
    }
}

/// Write data to a temp file, fsync it, then atomically rename to the final path.
async fn atomic_write_file(final_path: &Path, data: &[u8]) -> Result<(), SettingsError> {
    let file_name = final_path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("settings");
    let temp_path = final_path.with_file_name(format!("{}.{}.tmp", file_name, ulid::Ulid::new()));

    let mut file = fs::File::create(&temp_path)
        .await
        .map_err(|e| SettingsError::io(&temp_path, e))?;
    file.write_all(data)
        .await
        .map_err(|e| SettingsError::io(&temp_path, e))?;
    file.sync_all()
        .await
        .map_err(|e| SettingsError::io(&temp_path, e))?;
    fs::rename(&temp_path, final_path)
        .await
        .map_err(|e| SettingsError::io(final_path, e))?;
    Ok(())
}

/// Settings held in memory for the lifetime of the process.
#[derive(Debug, Default)]
pub struct MemorySettingsStore {
    selection: Mutex<Option<DefaultSelection>>,
}

impl MemorySettingsStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SettingsStore for MemorySettingsStore {
    async fn default_selection(&self) -> Result<Option<DefaultSelection>, SettingsError> {
        Ok(self.selection.lock().await.clone())
    }

    async fn save_default_selection(
        &self,
        selection: &DefaultSelection,
    ) -> Result<(), SettingsError> {
        *self.selection.lock().await = Some(selection.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn missing_file_has_no_default() {
        let tmp = TempDir::new().unwrap();
        let store = FileSettingsStore::new(tmp.path().join("settings.yaml"));
        assert_eq!(store.default_selection().await.unwrap(), None);
    }

    #[tokio::test]
    async fn saved_selection_survives_reopen() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("nested").join("settings.yaml");

        let selection = DefaultSelection {
            provider: Provider::DeepSeek,
            model: "deepseek-reasoner".to_string(),
        };
        FileSettingsStore::new(&path)
            .save_default_selection(&selection)
            .await
            .unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        assert!(contents.contains("provider: deepseek"));

        let reopened = FileSettingsStore::new(&path);
        assert_eq!(reopened.default_selection().await.unwrap(), Some(selection));

        // No temp files left behind.
        let entries = std::fs::read_dir(path.parent().unwrap()).unwrap().count();
        assert_eq!(entries, 1);
    }

    #[tokio::test]
    async fn corrupt_file_is_an_error() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("settings.yaml");
        std::fs::write(&path, "default: [unclosed").unwrap();

        let result = FileSettingsStore::new(&path).default_selection().await;
        assert!(matches!(result, Err(SettingsError::Yaml(_))));
    }

    #[tokio::test]
    async fn memory_store_roundtrip() {
        let store = MemorySettingsStore::new();
        assert_eq!(store.default_selection().await.unwrap(), None);

        let selection = DefaultSelection {
            provider: Provider::OpenAI,
            model: "gpt-4".to_string(),
        };
        store.save_default_selection(&selection).await.unwrap();
        assert_eq!(store.default_selection().await.unwrap(), Some(selection));
    }
}

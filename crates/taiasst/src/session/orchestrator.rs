//! Drives one send: user turn in, assistant turn streamed back.

use std::sync::Arc;

use reqwest::Client;
use thiserror::Error;
use tracing::{debug, info, warn};

use super::history::{ChatHistory, ChatTurn, CompletionOptions};
use crate::assembler::assemble;
use crate::catalog::ModelCache;
use crate::engine::{self, StreamCallbacks};
use crate::llm::{
    CapabilityFlags, LLMError, Message, Provider, ProviderClient, create_client_with,
};
use crate::store::{CredentialStore, DefaultSelection, SettingsStore};

/// Errors returned by [`ChatOrchestrator::send`].
#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Llm(#[from] LLMError),

    #[error("no model available for provider {0}")]
    NoModelAvailable(Provider),
}

/// UI-side receiver of a send's progress.
pub trait ChatObserver: Send {
    fn on_chunk(&mut self, _text: &str) {}

    fn on_complete(&mut self, _turn: &ChatTurn) {}

    fn on_error(&mut self, _error: &LLMError) {}
}

/// Connects conversations to the completion engine.
pub struct ChatOrchestrator {
    http: Client,
    credentials: Arc<dyn CredentialStore>,
    settings: Arc<dyn SettingsStore>,
    models: ModelCache,
}

impl ChatOrchestrator {
    pub fn new(
        credentials: Arc<dyn CredentialStore>,
        settings: Arc<dyn SettingsStore>,
        models: ModelCache,
    ) -> Self {
        Self {
            http: Client::new(),
            credentials,
            settings,
            models,
        }
    }

    /// Send `text` as the next user turn and stream the reply into `history`.
    ///
    /// Chunks are appended to a fresh assistant turn as they arrive. On a
    /// stream failure the observer is told first and the partial turn is kept.
    pub async fn send(
        &self,
        history: &mut ChatHistory,
        text: &str,
        observer: &mut dyn ChatObserver,
    ) -> Result<(), SessionError> {
        let (provider, model) = self.resolve_selection(&mut history.config).await?;

        history.push_turn(Message::user(text));
        let records = assemble(&history.turns, CapabilityFlags::for_model(provider, &model));
        let client = self.resolve_client(provider).await?;
        let index = history.push_turn(Message::assistant(""));
        let params = history.config.params();

        info!(
            chat = %history.id,
            %provider,
            model = %model,
            records = records.len(),
            "Sending chat message"
        );

        let mut writer = TurnWriter {
            history: &mut *history,
            index,
            observer,
            outcome: None,
        };
        engine::stream(&client, &model, records, &params, &mut writer).await;
        let outcome = writer.outcome.take();

        match outcome {
            Some(Err(e)) => {
                warn!(chat = %history.id, error = %e, "Chat message failed");
                Err(SessionError::Llm(e))
            }
            Some(Ok(())) | None => {
                if history.user_turns() == 1 && history.title_from(text) {
                    debug!(chat = %history.id, title = %history.title, "Titled conversation");
                }
                Ok(())
            }
        }
    }

    /// Provider and model for this send, falling back to the stored or
    /// built-in default and writing the choice into `options`.
    async fn resolve_selection(
        &self,
        options: &mut CompletionOptions,
    ) -> Result<(Provider, String), SessionError> {
        if let Some(provider) = options.provider
            && let Some(model) = options.model.as_deref()
            && !model.is_empty()
        {
            return Ok((provider, model.to_string()));
        }

        let stored = match self.settings.default_selection().await {
            Ok(stored) => stored,
            Err(e) => {
                warn!(error = %e, "Failed to read default model selection");
                None
            }
        };

        let selection = match stored {
            Some(selection) => selection,
            None => {
                let provider = Provider::ALL[0];
                let model = self
                    .models
                    .first_model_for(provider)
                    .ok_or(SessionError::NoModelAvailable(provider))?;
                let selection = DefaultSelection {
                    provider,
                    model: model.model_id,
                };

                info!(%provider, model = %selection.model, "Persisting fallback model selection");
                if let Err(e) = self.settings.save_default_selection(&selection).await {
                    warn!(error = %e, "Failed to persist default model selection");
                }
                selection
            }
        };

        options.provider = Some(selection.provider);
        options.model = Some(selection.model.clone());
        Ok((selection.provider, selection.model))
    }

    async fn resolve_client(&self, provider: Provider) -> Result<ProviderClient, LLMError> {
        let credentials = self
            .credentials
            .credentials(provider)
            .await
            .unwrap_or_default();

        let api_key = credentials.api_key.unwrap_or_default();
        if provider.requires_api_key() && api_key.is_empty() {
            return Err(LLMError::MissingCredential(provider));
        }

        create_client_with(
            self.http.clone(),
            provider.as_str(),
            &api_key,
            credentials.base_url.as_deref(),
        )
    }
}

/// Appends streamed text to one assistant turn and relays it to the observer.
struct TurnWriter<'a> {
    history: &'a mut ChatHistory,
    index: usize,
    observer: &'a mut dyn ChatObserver,
    outcome: Option<Result<(), LLMError>>,
}

impl StreamCallbacks for TurnWriter<'_> {
    fn on_chunk(&mut self, text: &str) {
        if let Some(turn) = self.history.turns.get_mut(self.index) {
            turn.content.push_str(text);
        }
        self.observer.on_chunk(text);
    }

    fn on_complete(&mut self) {
        self.history.touch();
        if let Some(turn) = self.history.turns.get(self.index) {
            self.observer.on_complete(turn);
        }
        self.outcome = Some(Ok(()));
    }

    fn on_error(&mut self, error: LLMError) {
        self.history.touch();
        self.observer.on_error(&error);
        self.outcome = Some(Err(error));
    }
}

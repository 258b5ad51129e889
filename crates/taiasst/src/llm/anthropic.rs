//! Anthropic LLM provider with native API format.

use std::collections::VecDeque;
use std::pin::Pin;
use std::task::{Context, Poll};

use async_trait::async_trait;
use futures::Stream;
use reqwest::Client;

use super::error::{LLMError, error_for_status};
use super::lines::{DataLine, LineBuffer, classify};
use super::provider::LLMProvider;
use super::types::{ChatRequest, ChatStream, Role, StreamEvent};

/// Anthropic provider with native API format.
pub struct AnthropicProvider {
    client: Client,
    base_url: String,
    api_key: String,
    api_version: String,
}

impl AnthropicProvider {
    pub const DEFAULT_API_VERSION: &'static str = "2023-06-01";

    #[must_use]
    pub fn new(client: Client, api_key: String, base_url: String) -> Self {
        Self {
            client,
            base_url,
            api_key,
            api_version: Self::DEFAULT_API_VERSION.to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn authorize(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        builder
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", &self.api_version)
    }
}

#[async_trait]
impl LLMProvider for AnthropicProvider {
    async fn chat_stream(&self, request: ChatRequest) -> Result<ChatStream, LLMError> {
        let url = format!("{}/v1/messages", self.base_url);
        let anthropic_request = to_request(&request);

        let builder = self
            .client
            .post(&url)
            .header("Content-Type", "application/json");
        let response = self
            .authorize(builder)
            .json(&anthropic_request)
            .send()
            .await?;
        let response = error_for_status(response).await?;

        let byte_stream = response.bytes_stream();
        Ok(Box::pin(AnthropicStreamAdapter::new(byte_stream)))
    }

    async fn list_models(&self) -> Result<(), LLMError> {
        let url = format!("{}/v1/models", self.base_url);
        let response = self.authorize(self.client.get(&url)).send().await?;
        error_for_status(response).await?;
        Ok(())
    }
}

// ============================================================================
// Request Types
// ============================================================================

#[derive(serde::Serialize)]
struct Request {
    model: String,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    messages: Vec<RequestMessage>,
    temperature: f32,
    stream: bool,
}

#[derive(serde::Serialize)]
struct RequestMessage {
    role: &'static str,
    content: String,
}

/// System turns move to the top-level `system` field; everything else keeps its order.
fn to_request(request: &ChatRequest) -> Request {
    let mut system_parts: Vec<&str> = Vec::new();
    let mut messages = Vec::new();

    for msg in &request.messages {
        match msg.role {
            Role::System => {
                if !msg.content.is_empty() {
                    system_parts.push(&msg.content);
                }
            }
            Role::User => messages.push(RequestMessage {
                role: "user",
                content: msg.content.clone(),
            }),
            Role::Assistant => messages.push(RequestMessage {
                role: "assistant",
                content: msg.content.clone(),
            }),
        }
    }

    Request {
        model: request.model.clone(),
        max_tokens: request.max_tokens,
        system: (!system_parts.is_empty()).then(|| system_parts.join("\n\n")),
        messages,
        temperature: request.temperature,
        stream: request.stream,
    }
}

// ============================================================================
// Streaming
// ============================================================================

/// Adapter that converts Anthropic event-stream lines into StreamEvents.
struct AnthropicStreamAdapter<S> {
    inner: S,
    lines: LineBuffer,
    pending: VecDeque<String>,
    exhausted: bool,
    done: bool,
}

impl<S> AnthropicStreamAdapter<S> {
    fn new(inner: S) -> Self {
        Self {
            inner,
            lines: LineBuffer::new(),
            pending: VecDeque::new(),
            exhausted: false,
            done: false,
        }
    }
}

impl<S> Stream for AnthropicStreamAdapter<S>
where
    S: Stream<Item = Result<bytes::Bytes, reqwest::Error>> + Unpin,
{
    type Item = Result<StreamEvent, LLMError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        if self.done {
            return Poll::Ready(None);
        }

        loop {
            while let Some(line) = self.pending.pop_front() {
                let DataLine::Payload(data) = classify(&line) else {
                    continue;
                };

                match serde_json::from_str::<AnthropicStreamEvent>(data) {
                    Ok(AnthropicStreamEvent::ContentBlockDelta { delta }) => {
                        if let Some(text) = delta.text
                            && !text.is_empty()
                        {
                            return Poll::Ready(Some(Ok(StreamEvent::Token(text))));
                        }
                    }
                    Ok(AnthropicStreamEvent::MessageStop) => {
                        self.done = true;
                        return Poll::Ready(Some(Ok(StreamEvent::Done)));
                    }
                    Ok(AnthropicStreamEvent::Error { error }) => {
                        self.done = true;
                        return Poll::Ready(Some(Err(LLMError::Api {
                            status: 200,
                            message: error.message,
                        })));
                    }
                    Ok(AnthropicStreamEvent::Unknown) => {}
                    Err(e) => {
                        tracing::debug!(
                            data = %data,
                            error = %e,
                            "failed to parse Anthropic SSE event"
                        );
                    }
                }
            }

            if self.exhausted {
                self.done = true;
                return Poll::Ready(Some(Ok(StreamEvent::Done)));
            }

            match Pin::new(&mut self.inner).poll_next(cx) {
                Poll::Ready(Some(Ok(bytes))) => {
                    let lines = self.lines.push(&bytes);
                    self.pending.extend(lines);
                }
                Poll::Ready(Some(Err(e))) => {
                    self.done = true;
                    return Poll::Ready(Some(Err(LLMError::Request(e))));
                }
                Poll::Ready(None) => {
                    self.exhausted = true;
                    if let Some(tail) = self.lines.finish() {
                        self.pending.push_back(tail);
                    }
                }
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}

/// Anthropic SSE stream events. Only the ones that carry text or end the
/// message matter here.
#[derive(serde::Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum AnthropicStreamEvent {
    ContentBlockDelta {
        delta: Delta,
    },
    MessageStop,
    Error {
        error: StreamError,
    },
    #[serde(other)]
    Unknown,
}

#[derive(serde::Deserialize)]
struct Delta {
    text: Option<String>,
}

#[derive(serde::Deserialize)]
struct StreamError {
    message: String,
}

//! OpenAI-compatible LLM provider.
//!
//! Works with OpenAI, DeepSeek, Ollama, and other compatible APIs.

use std::collections::VecDeque;
use std::pin::Pin;
use std::task::{Context, Poll};

use async_trait::async_trait;
use futures::Stream;
use reqwest::Client;
use tracing::debug;

use super::error::{LLMError, error_for_status};
use super::lines::{DataLine, LineBuffer, classify};
use super::provider::LLMProvider;
use super::types::{ChatRequest, ChatStream, StreamEvent};

/// OpenAI-compatible provider (works for OpenAI, DeepSeek, Ollama).
pub struct OpenAICompatibleProvider {
    client: Client,
    base_url: String,
    api_key: Option<String>,
}

impl OpenAICompatibleProvider {
    #[must_use]
    pub fn new(client: Client, base_url: String, api_key: Option<String>) -> Self {
        Self {
            client,
            base_url,
            api_key,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn authorize(&self, mut req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        if let Some(ref key) = self.api_key {
            req = req.header("Authorization", format!("Bearer {}", key));
        }
        req
    }

    /// POST the request to `/chat/completions` and return the raw response
    /// once the status is known to be successful.
    pub(crate) async fn post_chat_completions(
        &self,
        request: &ChatRequest,
    ) -> Result<reqwest::Response, LLMError> {
        let url = format!("{}/chat/completions", self.base_url);

        let req = self
            .client
            .post(&url)
            .header("Content-Type", "application/json");

        let response = self.authorize(req).json(request).send().await?;
        error_for_status(response).await
    }
}

#[async_trait]
impl LLMProvider for OpenAICompatibleProvider {
    async fn chat_stream(&self, request: ChatRequest) -> Result<ChatStream, LLMError> {
        let response = self.post_chat_completions(&request).await?;

        let byte_stream = response.bytes_stream();
        let event_stream = StreamParser::new(byte_stream);

        Ok(Box::pin(event_stream))
    }

    async fn list_models(&self) -> Result<(), LLMError> {
        let url = format!("{}/models", self.base_url);
        let response = self.authorize(self.client.get(&url)).send().await?;
        error_for_status(response).await?;
        Ok(())
    }
}

// --- Streaming wire types ---

/// One `data:` payload of a chat completion stream.
#[derive(serde::Deserialize)]
pub(crate) struct StreamChunk {
    #[serde(default)]
    pub choices: Vec<StreamChoice>,
}

#[derive(serde::Deserialize)]
pub(crate) struct StreamChoice {
    #[serde(default)]
    pub delta: StreamDelta,
}

#[derive(Default, serde::Deserialize)]
pub(crate) struct StreamDelta {
    #[serde(default)]
    pub content: Option<String>,
    /// Reasoning channel, only sent by reasoning models.
    #[serde(default)]
    pub reasoning_content: Option<String>,
}

impl StreamChunk {
    pub(crate) fn into_delta(self) -> Option<StreamDelta> {
        self.choices.into_iter().next().map(|choice| choice.delta)
    }
}

// --- Structured stream adapter ---

struct StreamParser<S> {
    inner: S,
    lines: LineBuffer,
    pending: VecDeque<String>,
    exhausted: bool,
    done: bool,
}

impl<S> StreamParser<S> {
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

impl<S, E> Stream for StreamParser<S>
where
    S: Stream<Item = Result<bytes::Bytes, E>> + Unpin,
    E: Into<LLMError>,
{
    type Item = Result<StreamEvent, LLMError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        if self.done {
            return Poll::Ready(None);
        }

        loop {
            while let Some(line) = self.pending.pop_front() {
                match classify(&line) {
                    DataLine::Skip => continue,
                    DataLine::Done => {
                        self.done = true;
                        return Poll::Ready(Some(Ok(StreamEvent::Done)));
                    }
                    DataLine::Payload(data) => match serde_json::from_str::<StreamChunk>(data) {
                        Ok(chunk) => {
                            if let Some(delta) = chunk.into_delta()
                                && let Some(content) = delta.content
                                && !content.is_empty()
                            {
                                return Poll::Ready(Some(Ok(StreamEvent::Token(content))));
                            }
                        }
                        Err(e) => {
                            debug!(data = %data, error = %e, "failed to parse stream chunk");
                        }
                    },
                }
            }

            if self.exhausted {
                self.done = true;
                return Poll::Ready(Some(Ok(StreamEvent::Done)));
            }

            // Need more data
            match Pin::new(&mut self.inner).poll_next(cx) {
                Poll::Ready(Some(Ok(bytes))) => {
                    let lines = self.lines.push(&bytes);
                    self.pending.extend(lines);
                }
                Poll::Ready(Some(Err(e))) => {
                    self.done = true;
                    return Poll::Ready(Some(Err(e.into())));
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

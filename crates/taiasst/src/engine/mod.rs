//! Streaming completion engine.
//!
//! Drives one completion against a [`ProviderClient`] and reports text through
//! [`StreamCallbacks`]. Two paths exist:
//! - the structured path iterates the vendor's typed [`StreamEvent`]s
//! - the manual path decodes a raw event stream that interleaves a reasoning
//!   channel with the final answer (see [`reasoning`])
//!
//! Whatever happens, the callbacks see chunks in receipt order followed by
//! exactly one terminal call.

pub mod reasoning;

use futures::StreamExt;
use tracing::debug;

use crate::llm::{ChatRequest, GenerationParams, LLMError, Message, ProviderClient, StreamEvent};

/// Receiver of one completion's output.
pub trait StreamCallbacks: Send {
    /// An increment of text, in arrival order.
    fn on_chunk(&mut self, text: &str);

    /// The vendor finished the response.
    fn on_complete(&mut self);

    /// The request or the stream failed. Partial output may already have been delivered.
    fn on_error(&mut self, error: LLMError);
}

/// Stream a completion for `records` and report it through `callbacks`.
///
/// Omitted sampling parameters resolve to 0.7 / 2000 on both paths.
pub async fn stream(
    client: &ProviderClient,
    model_id: &str,
    records: Vec<Message>,
    params: &GenerationParams,
    callbacks: &mut dyn StreamCallbacks,
) {
    let mut callbacks = Terminating::new(callbacks);
    let request = ChatRequest::new(model_id, records, params);

    debug!(
        provider = %client.provider(),
        model = model_id,
        messages = request.messages.len(),
        temperature = request.temperature,
        max_tokens = request.max_tokens,
        "Starting completion stream"
    );

    match client.manual_transport(model_id) {
        Some(transport) => reasoning::stream(transport, &request, &mut callbacks).await,
        None => stream_structured(client, request, &mut callbacks).await,
    }
}

async fn stream_structured(
    client: &ProviderClient,
    request: ChatRequest,
    callbacks: &mut dyn StreamCallbacks,
) {
    let mut events = match client.chat_stream(request).await {
        Ok(events) => events,
        Err(e) => {
            callbacks.on_error(e);
            return;
        }
    };

    while let Some(event) = events.next().await {
        match event {
            Ok(StreamEvent::Token(text)) => {
                if !text.is_empty() {
                    callbacks.on_chunk(&text);
                }
            }
            Ok(StreamEvent::Done) => break,
            Err(e) => {
                callbacks.on_error(e);
                return;
            }
        }
    }

    callbacks.on_complete();
}

/// Forwards to the caller's callbacks until the first terminal call, then
/// swallows everything.
struct Terminating<'a> {
    inner: &'a mut dyn StreamCallbacks,
    finished: bool,
}

impl<'a> Terminating<'a> {
    fn new(inner: &'a mut dyn StreamCallbacks) -> Self {
        Self {
            inner,
            finished: false,
        }
    }
}

impl StreamCallbacks for Terminating<'_> {
    fn on_chunk(&mut self, text: &str) {
        if !self.finished {
            self.inner.on_chunk(text);
        }
    }

    fn on_complete(&mut self) {
        if !self.finished {
            self.finished = true;
            self.inner.on_complete();
        }
    }

    fn on_error(&mut self, error: LLMError) {
        if self.finished {
            debug!(error = %error, "Dropping error reported after stream end");
            return;
        }
        self.finished = true;
        self.inner.on_error(error);
    }
}

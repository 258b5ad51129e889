//! Manual decode path for reasoning models.
//!
//! These models put two channels in every delta: `reasoning_content` with the
//! intermediate thinking and `content` with the final answer. The body is read
//! one network read at a time, framed into lines by a [`LineBuffer`], and each
//! line goes through a per-stream [`ReasoningDecoder`].

use bytes::Bytes;
use futures::{Stream, StreamExt};
use tracing::{debug, warn};

use super::StreamCallbacks;
use crate::llm::lines::{DataLine, LineBuffer, classify};
use crate::llm::{ChatRequest, LLMError, OpenAICompatibleProvider, StreamChunk};

/// Emitted once, before the first non-blank reasoning fragment.
pub const THINKING_MARKER: &str = "🤔 **Thinking process**:\n\n";

/// Emitted once, before the first answer fragment of a stream that reasoned.
pub const FINAL_ANSWER_MARKER: &str = "\n\n✅ **Final answer**:\n\n";

/// What a single protocol line contributed.
#[derive(Debug, PartialEq, Eq)]
pub enum LineOutcome {
    /// Blank, comment or non-data line.
    Skipped,
    /// A data line whose payload was not valid JSON.
    Malformed,
    /// Text to forward, markers included, in order.
    Chunks(Vec<String>),
    /// The `[DONE]` sentinel.
    Done,
}

/// Channel state for one stream.
#[derive(Debug, Default)]
pub struct ReasoningDecoder {
    thinking_marked: bool,
    reasoning_seen: bool,
    answer_seen: bool,
    malformed: u32,
}

impl ReasoningDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn decode_line(&mut self, line: &str) -> LineOutcome {
        let payload = match classify(line) {
            DataLine::Skip => return LineOutcome::Skipped,
            DataLine::Done => return LineOutcome::Done,
            DataLine::Payload(payload) => payload,
        };

        let chunk: StreamChunk = match serde_json::from_str(payload) {
            Ok(chunk) => chunk,
            Err(e) => {
                self.malformed += 1;
                debug!(data = %payload, error = %e, "Skipping undecodable stream line");
                return LineOutcome::Malformed;
            }
        };

        let mut out = Vec::new();
        let Some(delta) = chunk.into_delta() else {
            return LineOutcome::Chunks(out);
        };

        if let Some(reasoning) = delta.reasoning_content
            && !reasoning.is_empty()
        {
            if !self.thinking_marked && !reasoning.trim().is_empty() {
                self.thinking_marked = true;
                out.push(THINKING_MARKER.to_string());
            }
            self.reasoning_seen = true;
            out.push(reasoning);
        }

        if let Some(answer) = delta.content
            && !answer.is_empty()
        {
            if !self.answer_seen && self.reasoning_seen {
                out.push(FINAL_ANSWER_MARKER.to_string());
            }
            self.answer_seen = true;
            out.push(answer);
        }

        LineOutcome::Chunks(out)
    }

    /// Data lines skipped because they did not parse.
    pub fn malformed_lines(&self) -> u32 {
        self.malformed
    }
}

/// POST the request and decode the response by hand.
///
/// A non-2xx status is reported through `on_error` without reading the body.
pub(crate) async fn stream(
    transport: &OpenAICompatibleProvider,
    request: &ChatRequest,
    callbacks: &mut dyn StreamCallbacks,
) {
    match transport.post_chat_completions(request).await {
        Ok(response) => decode_body(response.bytes_stream(), callbacks).await,
        Err(e) => callbacks.on_error(e),
    }
}

/// Decode a raw body, one read at a time, until `[DONE]` or exhaustion.
pub async fn decode_body<S, E>(body: S, callbacks: &mut dyn StreamCallbacks)
where
    S: Stream<Item = Result<Bytes, E>>,
    E: Into<LLMError>,
{
    let mut body = std::pin::pin!(body);
    let mut lines = LineBuffer::new();
    let mut decoder = ReasoningDecoder::new();
    let mut saw_done = false;

    'read: while let Some(read) = body.next().await {
        let bytes = match read {
            Ok(bytes) => bytes,
            Err(e) => {
                callbacks.on_error(e.into());
                return;
            }
        };

        for line in lines.push(&bytes) {
            if forward(decoder.decode_line(&line), callbacks) {
                saw_done = true;
                break 'read;
            }
        }
    }

    if !saw_done && let Some(tail) = lines.finish() {
        forward(decoder.decode_line(&tail), callbacks);
    }

    if decoder.malformed_lines() > 0 {
        warn!(
            skipped = decoder.malformed_lines(),
            "Stream finished with undecodable lines"
        );
    }

    callbacks.on_complete();
}

/// Returns true once the stream has signalled its end.
fn forward(outcome: LineOutcome, callbacks: &mut dyn StreamCallbacks) -> bool {
    match outcome {
        LineOutcome::Chunks(chunks) => {
            for chunk in &chunks {
                callbacks.on_chunk(chunk);
            }
            false
        }
        LineOutcome::Done => true,
        LineOutcome::Skipped | LineOutcome::Malformed => false,
    }
}

#![allow(dead_code)]

use taiasst::engine::StreamCallbacks;
use taiasst::llm::{LLMError, Message};
use taiasst::session::{ChatObserver, ChatTurn};

/// Records every engine callback in order.
#[derive(Debug, Default)]
pub struct Recorder {
    pub chunks: Vec<String>,
    pub completions: usize,
    pub errors: Vec<String>,
}

impl Recorder {
    pub fn text(&self) -> String {
        self.chunks.concat()
    }
}

impl StreamCallbacks for Recorder {
    fn on_chunk(&mut self, text: &str) {
        self.chunks.push(text.to_string());
    }

    fn on_complete(&mut self) {
        self.completions += 1;
    }

    fn on_error(&mut self, error: LLMError) {
        self.errors.push(error.to_string());
    }
}

/// Records what the UI would see.
#[derive(Debug, Default)]
pub struct UiRecorder {
    pub chunks: Vec<String>,
    pub completed: Vec<Message>,
    pub errors: Vec<String>,
}

impl ChatObserver for UiRecorder {
    fn on_chunk(&mut self, text: &str) {
        self.chunks.push(text.to_string());
    }

    fn on_complete(&mut self, turn: &ChatTurn) {
        self.completed.push(turn.clone());
    }

    fn on_error(&mut self, error: &LLMError) {
        self.errors.push(error.to_string());
    }
}

/// Frame JSON payloads as `data:` lines and terminate with `[DONE]`.
pub fn sse_body(payloads: &[serde_json::Value]) -> String {
    let mut body = String::new();
    for payload in payloads {
        body.push_str(&format!("data: {payload}\n\n"));
    }
    body.push_str("data: [DONE]\n\n");
    body
}

pub fn content_delta(text: &str) -> serde_json::Value {
    serde_json::json!({"choices": [{"index": 0, "delta": {"content": text}, "finish_reason": null}]})
}

pub fn reasoning_delta(text: &str) -> serde_json::Value {
    serde_json::json!({"choices": [{"index": 0, "delta": {"reasoning_content": text, "content": null}}]})
}

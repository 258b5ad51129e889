//! Chat sessions: conversation state and the orchestrator that feeds it.

mod history;
mod orchestrator;

pub use history::{ChatHistory, ChatTurn, CompletionOptions, DEFAULT_TITLE};
pub use orchestrator::{ChatObserver, ChatOrchestrator, SessionError};

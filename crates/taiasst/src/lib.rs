//! Taiasst - streaming chat completions for a desktop AI assistant.

pub mod assembler;
pub mod catalog;
pub mod config;
pub mod engine;
pub mod llm;
pub mod session;
pub mod store;

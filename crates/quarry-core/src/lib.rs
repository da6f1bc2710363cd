//! Configuration loading, backend construction, and the chat orchestrator.

pub mod bootstrap;
pub mod config;
pub mod orchestrator;

pub use config::Config;
pub use orchestrator::{ChatOrchestrator, ChatReply, ChatRequest, OrchestratorError, RagReply};

//! HTTP API: plain chat, retrieval-augmented chat, knowledge-base rebuild, and health.

mod error;
mod handlers;
mod router;
mod server;

pub use error::{ApiError, GatewayError};
pub use server::{GatewayServer, SharedOrchestrator};

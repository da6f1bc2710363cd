//! Chat-completion client and embedding backends.

pub mod any;
#[cfg(feature = "candle")]
pub mod candle_provider;
pub mod embed;
pub mod error;
pub mod http;
#[cfg(any(test, feature = "mock"))]
pub mod mock;
pub mod openai;
pub mod provider;
pub(crate) mod retry;

pub use any::{AnyEmbedder, AnyProvider};
pub use embed::{EmbedError, Embedder, Embedding, EmbeddingSpace};
pub use error::LlmError;
pub use provider::LlmProvider;

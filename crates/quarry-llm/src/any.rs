#[cfg(feature = "candle")]
use crate::candle_provider::{BertEmbedder, ClipEmbedder};
use crate::embed::{EmbedError, Embedder, Embedding, EmbeddingSpace};
use crate::error::LlmError;
#[cfg(any(test, feature = "mock"))]
use crate::mock::{MockEmbedder, MockProvider};
use crate::openai::{OpenAiEmbedder, OpenAiProvider};
use crate::provider::{ChatCompletion, ChatOptions, LlmProvider, Message};

/// Generates a match over all `AnyProvider` variants, binding the inner provider
/// and evaluating the given expression for each arm.
macro_rules! delegate_provider {
    ($self:expr, |$p:ident| $expr:expr) => {
        match $self {
            AnyProvider::OpenAi($p) => $expr,
            #[cfg(any(test, feature = "mock"))]
            AnyProvider::Mock($p) => $expr,
        }
    };
}

macro_rules! delegate_embedder {
    ($self:expr, |$e:ident| $expr:expr) => {
        match $self {
            AnyEmbedder::OpenAi($e) => $expr,
            #[cfg(feature = "candle")]
            AnyEmbedder::Bert($e) => $expr,
            #[cfg(feature = "candle")]
            AnyEmbedder::Clip($e) => $expr,
            #[cfg(any(test, feature = "mock"))]
            AnyEmbedder::Mock($e) => $expr,
        }
    };
}

#[derive(Debug, Clone)]
pub enum AnyProvider {
    OpenAi(OpenAiProvider),
    #[cfg(any(test, feature = "mock"))]
    Mock(MockProvider),
}

impl LlmProvider for AnyProvider {
    async fn chat(
        &self,
        messages: &[Message],
        options: &ChatOptions,
    ) -> Result<ChatCompletion, LlmError> {
        delegate_provider!(self, |p| p.chat(messages, options).await)
    }

    fn name(&self) -> &'static str {
        delegate_provider!(self, |p| p.name())
    }

    fn default_model(&self) -> &str {
        delegate_provider!(self, |p| p.default_model())
    }
}

#[derive(Debug, Clone)]
pub enum AnyEmbedder {
    OpenAi(OpenAiEmbedder),
    #[cfg(feature = "candle")]
    Bert(BertEmbedder),
    #[cfg(feature = "candle")]
    Clip(ClipEmbedder),
    #[cfg(any(test, feature = "mock"))]
    Mock(MockEmbedder),
}

impl Embedder for AnyEmbedder {
    async fn embed_text(&self, text: &str) -> Result<Embedding, EmbedError> {
        delegate_embedder!(self, |e| e.embed_text(text).await)
    }

    async fn embed_image(&self, bytes: &[u8]) -> Result<Embedding, EmbedError> {
        delegate_embedder!(self, |e| e.embed_image(bytes).await)
    }

    fn space(&self) -> &EmbeddingSpace {
        delegate_embedder!(self, |e| e.space())
    }

    fn supports_images(&self) -> bool {
        delegate_embedder!(self, |e| e.supports_images())
    }
}

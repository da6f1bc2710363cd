//! Plain and retrieval-augmented chat over an OpenAI-compatible provider.

use std::sync::Arc;
use std::time::Duration;

use quarry_index::{IndexError, RetrievalService};
use quarry_llm::provider::{ChatOptions, Message, Usage};
use quarry_llm::{Embedder, LlmError, LlmProvider};
use serde::Serialize;

use crate::config::Config;

/// Reply the model is told to give when the context does not contain the answer.
pub const NO_ANSWER: &str = "The knowledge base cannot answer this question.";

#[derive(Debug, thiserror::Error)]
pub enum OrchestratorError {
    #[error("language model request failed: {0}")]
    Upstream(#[from] LlmError),

    #[error("knowledge retrieval failed: {0}")]
    Retrieval(#[from] IndexError),
}

#[derive(Debug, Clone, Default)]
pub struct ChatRequest {
    pub message: String,
    pub model: Option<String>,
    pub max_tokens: Option<u32>,
    /// Ignored by plain chat.
    pub top_k: Option<usize>,
}

impl ChatRequest {
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatReply {
    pub response: String,
    pub model: String,
    pub usage: Option<Usage>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RagReply {
    #[serde(flatten)]
    pub reply: ChatReply,
    pub context: String,
}

#[derive(Debug, Clone, Copy)]
pub struct ChatSettings {
    pub chat_timeout: Duration,
    pub rag_timeout: Duration,
    pub default_top_k: usize,
}

impl Default for ChatSettings {
    fn default() -> Self {
        Self {
            chat_timeout: Duration::from_secs(30),
            rag_timeout: Duration::from_secs(60),
            default_top_k: 3,
        }
    }
}

impl From<&Config> for ChatSettings {
    fn from(config: &Config) -> Self {
        Self {
            chat_timeout: config.chat_timeout(),
            rag_timeout: config.rag_timeout(),
            default_top_k: config.retrieval.top_k,
        }
    }
}

/// System prompt that confines the model to `context`.
#[must_use]
pub fn rag_system_prompt(context: &str) -> String {
    format!(
        "Answer the user's question using only the context below. \
         If the context does not contain the relevant information, reply exactly: \"{NO_ANSWER}\"\n\
         \n\
         Context:\n\
         {context}"
    )
}

/// Forwards user messages to the language model, optionally grounding them in
/// retrieved knowledge-base context.
pub struct ChatOrchestrator<P, E> {
    provider: P,
    retrieval: Arc<RetrievalService<E>>,
    settings: ChatSettings,
}

impl<P: LlmProvider, E: Embedder> ChatOrchestrator<P, E> {
    #[must_use]
    pub fn new(provider: P, retrieval: Arc<RetrievalService<E>>, settings: ChatSettings) -> Self {
        Self {
            provider,
            retrieval,
            settings,
        }
    }

    #[must_use]
    pub fn retrieval(&self) -> &Arc<RetrievalService<E>> {
        &self.retrieval
    }

    #[must_use]
    pub fn provider(&self) -> &P {
        &self.provider
    }

    /// Send `request.message` as a single user turn.
    ///
    /// # Errors
    ///
    /// Returns [`OrchestratorError::Upstream`] if the model call fails or exceeds the
    /// chat timeout.
    pub async fn chat(&self, request: &ChatRequest) -> Result<ChatReply, OrchestratorError> {
        let messages = [Message::user(&request.message)];
        self.complete(&messages, request, self.settings.chat_timeout)
            .await
    }

    /// Retrieve context for `request.message`, then ask the model to answer from it.
    ///
    /// When no index is served the context is the not-initialized notice and the
    /// model is still called. A query that cannot be embedded gets an empty context.
    ///
    /// # Errors
    ///
    /// Returns [`OrchestratorError::Retrieval`] if the index rejects the query vector and
    /// [`OrchestratorError::Upstream`] if the model call fails or times out.
    pub async fn rag_chat(&self, request: &ChatRequest) -> Result<RagReply, OrchestratorError> {
        let top_k = request.top_k.unwrap_or(self.settings.default_top_k);
        let context = match self
            .retrieval
            .search_knowledge(&request.message, top_k)
            .await
        {
            Ok(context) => context,
            Err(IndexError::Embed(e)) => {
                tracing::warn!("query embedding failed, answering without context: {e}");
                String::new()
            }
            Err(e) => return Err(e.into()),
        };
        tracing::debug!(top_k, context_chars = context.len(), "context retrieved");

        let messages = [
            Message::system(rag_system_prompt(&context)),
            Message::user(&request.message),
        ];
        let reply = self
            .complete(&messages, request, self.settings.rag_timeout)
            .await?;
        Ok(RagReply { reply, context })
    }

    async fn complete(
        &self,
        messages: &[Message],
        request: &ChatRequest,
        timeout: Duration,
    ) -> Result<ChatReply, OrchestratorError> {
        let options = ChatOptions {
            model: request.model.clone(),
            max_tokens: request.max_tokens,
            timeout: Some(timeout),
        };
        let completion = tokio::time::timeout(timeout, self.provider.chat(messages, &options))
            .await
            .map_err(|_| {
                tracing::warn!(timeout_secs = timeout.as_secs(), "chat completion timed out");
                LlmError::Timeout
            })??;

        Ok(ChatReply {
            response: completion.content,
            model: completion.model,
            usage: completion.usage,
        })
    }
}

impl<P, E> std::fmt::Debug for ChatOrchestrator<P, E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatOrchestrator")
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use quarry_index::{NOT_INITIALIZED, RetrievalSettings};
    use quarry_llm::mock::{MockEmbedder, MockProvider};
    use quarry_llm::provider::Role;

    use super::*;

    fn orchestrator(
        provider: MockProvider,
        root: &std::path::Path,
    ) -> ChatOrchestrator<MockProvider, MockEmbedder> {
        let settings = RetrievalSettings {
            root: root.to_path_buf(),
            ..RetrievalSettings::default()
        };
        let retrieval = RetrievalService::new(MockEmbedder::new(64), settings).unwrap();
        ChatOrchestrator::new(provider, Arc::new(retrieval), ChatSettings::default())
    }

    #[test]
    fn rag_prompt_snapshot() {
        insta::assert_snapshot!(rag_system_prompt("Pumps are serviced every 90 days."), @r#"
        Answer the user's question using only the context below. If the context does not contain the relevant information, reply exactly: "The knowledge base cannot answer this question."

        Context:
        Pumps are serviced every 90 days.
        "#);
    }

    #[tokio::test]
    async fn chat_sends_single_user_message() {
        let dir = tempfile::tempdir().unwrap();
        let provider = MockProvider::with_responses(vec!["hi there".into()]);
        let orch = orchestrator(provider.clone(), dir.path());

        let reply = orch.chat(&ChatRequest::new("hello")).await.unwrap();
        assert_eq!(reply.response, "hi there");
        assert_eq!(reply.model, "mock-model");

        let recorded = provider.recorded();
        assert_eq!(recorded.len(), 1);
        assert_eq!(recorded[0], vec![Message::user("hello")]);
    }

    #[tokio::test]
    async fn chat_passes_model_override() {
        let dir = tempfile::tempdir().unwrap();
        let orch = orchestrator(MockProvider::default(), dir.path());
        let request = ChatRequest {
            model: Some("gpt-4o".into()),
            ..ChatRequest::new("hello")
        };
        let reply = orch.chat(&request).await.unwrap();
        assert_eq!(reply.model, "gpt-4o");
    }

    #[tokio::test]
    async fn rag_chat_before_build_degrades_to_notice() {
        let dir = tempfile::tempdir().unwrap();
        let provider = MockProvider::default();
        let orch = orchestrator(provider.clone(), dir.path());

        let reply = orch.rag_chat(&ChatRequest::new("pump schedule")).await.unwrap();
        assert_eq!(reply.context, NOT_INITIALIZED);

        let sent = &provider.recorded()[0];
        assert_eq!(sent[0].role, Role::System);
        assert!(sent[0].content.contains(NOT_INITIALIZED));
        assert_eq!(sent[1], Message::user("pump schedule"));
    }

    #[tokio::test]
    async fn rag_chat_includes_retrieved_context() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("pumps.txt"), "pump impeller inspection monthly").unwrap();
        std::fs::write(dir.path().join("hr.txt"), "annual leave policy").unwrap();
        let provider = MockProvider::default();
        let orch = orchestrator(provider.clone(), dir.path());
        orch.retrieval().build().await.unwrap();

        let request = ChatRequest {
            top_k: Some(1),
            ..ChatRequest::new("pump impeller")
        };
        let reply = orch.rag_chat(&request).await.unwrap();
        assert_eq!(reply.context, "pump impeller inspection monthly");
        assert!(provider.recorded()[0][0].content.ends_with("pump impeller inspection monthly"));
    }

    #[tokio::test]
    async fn rag_chat_survives_query_embedding_failure() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("pumps.txt"), "pump impeller inspection monthly").unwrap();
        let settings = RetrievalSettings {
            root: dir.path().to_path_buf(),
            ..RetrievalSettings::default()
        };
        let embedder = MockEmbedder::new(64).failing_on("outage");
        let retrieval = RetrievalService::new(embedder, settings).unwrap();
        let provider = MockProvider::default();
        let orch =
            ChatOrchestrator::new(provider.clone(), Arc::new(retrieval), ChatSettings::default());
        orch.retrieval().build().await.unwrap();

        let reply = orch
            .rag_chat(&ChatRequest::new("pump outage schedule"))
            .await
            .unwrap();
        assert_eq!(reply.context, "");
        let sent = &provider.recorded()[0];
        assert!(sent[0].content.ends_with("Context:\n"));
        assert_eq!(sent[1], Message::user("pump outage schedule"));
    }

    #[tokio::test]
    async fn upstream_failure_is_distinct() {
        let dir = tempfile::tempdir().unwrap();
        let orch = orchestrator(MockProvider::failing(), dir.path());

        let err = orch.chat(&ChatRequest::new("hello")).await.unwrap_err();
        assert!(matches!(err, OrchestratorError::Upstream(LlmError::Status { status: 500, .. })));
        let err = orch.rag_chat(&ChatRequest::new("hello")).await.unwrap_err();
        assert!(matches!(err, OrchestratorError::Upstream(_)));
    }

    #[tokio::test]
    async fn slow_model_times_out() {
        let dir = tempfile::tempdir().unwrap();
        let settings = RetrievalSettings {
            root: dir.path().to_path_buf(),
            ..RetrievalSettings::default()
        };
        let retrieval = RetrievalService::new(MockEmbedder::new(8), settings).unwrap();
        let orch = ChatOrchestrator::new(
            MockProvider::default().with_delay(500),
            Arc::new(retrieval),
            ChatSettings {
                chat_timeout: Duration::from_millis(20),
                ..ChatSettings::default()
            },
        );

        let err = orch.chat(&ChatRequest::new("hello")).await.unwrap_err();
        assert!(matches!(err, OrchestratorError::Upstream(LlmError::Timeout)));
    }

    #[test]
    fn settings_from_config() {
        let mut config = Config::default();
        config.llm.rag_timeout_secs = 90;
        config.retrieval.top_k = 7;
        let settings = ChatSettings::from(&config);
        assert_eq!(settings.rag_timeout, Duration::from_secs(90));
        assert_eq!(settings.chat_timeout, Duration::from_secs(30));
        assert_eq!(settings.default_top_k, 7);
    }
}

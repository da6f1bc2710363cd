//! Test-only mock provider and embedder.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, Mutex};

use crate::embed::{EmbedError, Embedder, Embedding, EmbeddingSpace};
use crate::error::LlmError;
use crate::provider::{ChatCompletion, ChatOptions, LlmProvider, Message, Usage};

#[derive(Debug, Clone)]
pub struct MockProvider {
    responses: Arc<Mutex<Vec<String>>>,
    recorded: Arc<Mutex<Vec<Vec<Message>>>>,
    pub default_response: String,
    pub model: String,
    pub fail_chat: bool,
    /// Milliseconds to sleep before returning a response.
    pub delay_ms: u64,
}

impl Default for MockProvider {
    fn default() -> Self {
        Self {
            responses: Arc::new(Mutex::new(Vec::new())),
            recorded: Arc::new(Mutex::new(Vec::new())),
            default_response: "mock response".into(),
            model: "mock-model".into(),
            fail_chat: false,
            delay_ms: 0,
        }
    }
}

impl MockProvider {
    #[must_use]
    pub fn with_responses(responses: Vec<String>) -> Self {
        Self {
            responses: Arc::new(Mutex::new(responses)),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn failing() -> Self {
        Self {
            fail_chat: true,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_delay(mut self, ms: u64) -> Self {
        self.delay_ms = ms;
        self
    }

    /// Message lists received so far, oldest first.
    ///
    /// # Panics
    ///
    /// Panics if the recording mutex is poisoned.
    #[must_use]
    pub fn recorded(&self) -> Vec<Vec<Message>> {
        self.recorded.lock().unwrap().clone()
    }
}

impl LlmProvider for MockProvider {
    async fn chat(
        &self,
        messages: &[Message],
        options: &ChatOptions,
    ) -> Result<ChatCompletion, LlmError> {
        self.recorded.lock().unwrap().push(messages.to_vec());
        if self.delay_ms > 0 {
            tokio::time::sleep(std::time::Duration::from_millis(self.delay_ms)).await;
        }
        if self.fail_chat {
            return Err(LlmError::Status {
                provider: "mock",
                status: 500,
            });
        }
        let content = {
            let mut responses = self.responses.lock().unwrap();
            if responses.is_empty() {
                self.default_response.clone()
            } else {
                responses.remove(0)
            }
        };
        Ok(ChatCompletion {
            content,
            model: options.model.clone().unwrap_or_else(|| self.model.clone()),
            usage: Some(Usage {
                prompt_tokens: 1,
                completion_tokens: 1,
                total_tokens: 2,
            }),
        })
    }

    fn name(&self) -> &'static str {
        "mock"
    }

    fn default_model(&self) -> &str {
        &self.model
    }
}

/// Deterministic bag-of-words embedder: each lowercase word is hashed into one
/// of `dimensions` buckets, so texts sharing words score higher.
#[derive(Debug, Clone)]
pub struct MockEmbedder {
    space: EmbeddingSpace,
    images: bool,
    failing_inputs: Vec<String>,
}

impl MockEmbedder {
    #[must_use]
    pub fn new(dimensions: usize) -> Self {
        Self {
            space: EmbeddingSpace::new("mock", "bag-of-words", dimensions),
            images: false,
            failing_inputs: Vec::new(),
        }
    }

    /// Accept images; their vector is derived from the raw bytes.
    #[must_use]
    pub fn with_images(mut self) -> Self {
        self.images = true;
        self.space.model = "bag-of-words-multimodal".into();
        self
    }

    /// Make `embed_text` fail for inputs containing `needle`.
    #[must_use]
    pub fn failing_on(mut self, needle: impl Into<String>) -> Self {
        self.failing_inputs.push(needle.into());
        self
    }

    fn bucket(&self, token: &[u8]) -> usize {
        let mut hasher = DefaultHasher::new();
        token.hash(&mut hasher);
        #[allow(clippy::cast_possible_truncation)]
        let idx = hasher.finish() as usize;
        idx % self.space.dimensions
    }
}

impl Embedder for MockEmbedder {
    async fn embed_text(&self, text: &str) -> Result<Embedding, EmbedError> {
        if self.failing_inputs.iter().any(|n| text.contains(n.as_str())) {
            return Err(EmbedError::Backend(LlmError::Inference(
                "mock failure".into(),
            )));
        }
        let mut v = vec![0.0f32; self.space.dimensions];
        for word in text.split_whitespace() {
            let token = word.to_lowercase();
            v[self.bucket(token.as_bytes())] += 1.0;
        }
        if v.iter().all(|x| *x == 0.0) {
            return Err(EmbedError::EmptyInput);
        }
        Embedding::normalized(v)
    }

    async fn embed_image(&self, bytes: &[u8]) -> Result<Embedding, EmbedError> {
        if !self.images {
            return Err(EmbedError::ImagesUnsupported { backend: "mock" });
        }
        if bytes.is_empty() {
            return Err(EmbedError::InvalidImage("empty image".into()));
        }
        let mut v = vec![0.0f32; self.space.dimensions];
        for window in bytes.chunks(4) {
            v[self.bucket(window)] += 1.0;
        }
        Embedding::normalized(v)
    }

    fn space(&self) -> &EmbeddingSpace {
        &self.space
    }

    fn supports_images(&self) -> bool {
        self.images
    }
}

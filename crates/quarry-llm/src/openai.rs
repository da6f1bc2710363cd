use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::embed::{EmbedError, Embedder, Embedding, EmbeddingSpace, truncate_chars};
use crate::error::LlmError;
use crate::provider::{ChatCompletion, ChatOptions, LlmProvider, Message, Usage};
use crate::retry::send_with_retry;

const PROVIDER: &str = "openai";
const DEFAULT_MAX_RETRIES: u32 = 2;

/// Character budget applied before sending text to the embeddings endpoint.
/// Roughly three characters per token against an 8191-token input limit.
pub const DEFAULT_EMBED_MAX_CHARS: usize = 24_000;

/// Client for OpenAI-compatible `/chat/completions` endpoints.
#[derive(Clone)]
pub struct OpenAiProvider {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
    max_tokens: u32,
    max_retries: u32,
}

impl fmt::Debug for OpenAiProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpenAiProvider")
            .field("client", &"<reqwest::Client>")
            .field("api_key", &"<redacted>")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("max_tokens", &self.max_tokens)
            .field("max_retries", &self.max_retries)
            .finish()
    }
}

fn trim_base_url(mut base_url: String) -> String {
    while base_url.ends_with('/') {
        base_url.pop();
    }
    base_url
}

impl OpenAiProvider {
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn new(
        api_key: String,
        base_url: String,
        model: String,
        max_tokens: u32,
    ) -> Result<Self, LlmError> {
        Ok(Self {
            client: crate::http::default_client()?,
            api_key,
            base_url: trim_base_url(base_url),
            model,
            max_tokens,
            max_retries: DEFAULT_MAX_RETRIES,
        })
    }

    #[must_use]
    pub fn with_client(mut self, client: reqwest::Client) -> Self {
        self.client = client;
        self
    }

    #[must_use]
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    async fn send_request(
        &self,
        messages: &[Message],
        options: &ChatOptions,
    ) -> Result<ChatCompletion, LlmError> {
        let model = options.model.as_deref().unwrap_or(&self.model);
        let body = ChatRequest {
            model,
            messages,
            max_tokens: options.max_tokens.unwrap_or(self.max_tokens),
        };
        let url = format!("{}/chat/completions", self.base_url);

        let response = send_with_retry(PROVIDER, self.max_retries, || {
            let mut req = self
                .client
                .post(&url)
                .header("Authorization", format!("Bearer {}", self.api_key))
                .json(&body);
            if let Some(timeout) = options.timeout {
                req = req.timeout(timeout);
            }
            req.send()
        })
        .await?;

        let status = response.status();
        let text = response.text().await.map_err(LlmError::from_transport)?;

        if !status.is_success() {
            tracing::error!(status = status.as_u16(), body = %text, "chat completion failed");
            return Err(LlmError::Status {
                provider: PROVIDER,
                status: status.as_u16(),
            });
        }

        let resp: ChatResponse = serde_json::from_str(&text)?;
        let content = resp
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or(LlmError::EmptyResponse { provider: PROVIDER })?;

        Ok(ChatCompletion {
            content,
            model: resp.model.unwrap_or_else(|| model.to_owned()),
            usage: resp.usage,
        })
    }
}

impl LlmProvider for OpenAiProvider {
    async fn chat(
        &self,
        messages: &[Message],
        options: &ChatOptions,
    ) -> Result<ChatCompletion, LlmError> {
        self.send_request(messages, options).await
    }

    fn name(&self) -> &'static str {
        PROVIDER
    }

    fn default_model(&self) -> &str {
        &self.model
    }
}

/// Text-only embedding backend over the OpenAI `/embeddings` endpoint.
#[derive(Clone)]
pub struct OpenAiEmbedder {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    space: EmbeddingSpace,
    max_chars: usize,
}

impl fmt::Debug for OpenAiEmbedder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpenAiEmbedder")
            .field("api_key", &"<redacted>")
            .field("base_url", &self.base_url)
            .field("space", &self.space)
            .field("max_chars", &self.max_chars)
            .finish_non_exhaustive()
    }
}

impl OpenAiEmbedder {
    /// Create an embedder and probe the endpoint once to learn the vector size.
    ///
    /// # Errors
    ///
    /// Returns an error if the client cannot be built or the probe request fails.
    pub async fn connect(
        api_key: String,
        base_url: String,
        model: String,
        timeout: Duration,
    ) -> Result<Self, LlmError> {
        let mut embedder = Self {
            client: crate::http::client_with_timeout(timeout)?,
            api_key,
            base_url: trim_base_url(base_url),
            space: EmbeddingSpace::new(PROVIDER, model, 0),
            max_chars: DEFAULT_EMBED_MAX_CHARS,
        };
        let probe = embedder.request("probe").await?;
        embedder.space.dimensions = probe.len();
        tracing::info!(space = %embedder.space, "embedding backend ready");
        Ok(embedder)
    }

    #[must_use]
    pub fn with_max_chars(mut self, max_chars: usize) -> Self {
        self.max_chars = max_chars;
        self
    }

    async fn request(&self, input: &str) -> Result<Vec<f32>, LlmError> {
        let body = EmbeddingRequest {
            input,
            model: &self.space.model,
        };
        let url = format!("{}/embeddings", self.base_url);
        let response = send_with_retry(PROVIDER, DEFAULT_MAX_RETRIES, || {
            self.client
                .post(&url)
                .header("Authorization", format!("Bearer {}", self.api_key))
                .json(&body)
                .send()
        })
        .await?;

        let status = response.status();
        let text = response.text().await.map_err(LlmError::from_transport)?;

        if !status.is_success() {
            tracing::error!(status = status.as_u16(), body = %text, "embedding request failed");
            return Err(LlmError::Status {
                provider: PROVIDER,
                status: status.as_u16(),
            });
        }

        let resp: EmbeddingResponse = serde_json::from_str(&text)?;
        resp.data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .ok_or(LlmError::EmptyResponse { provider: PROVIDER })
    }
}

impl Embedder for OpenAiEmbedder {
    async fn embed_text(&self, text: &str) -> Result<Embedding, EmbedError> {
        let input = truncate_chars(text.trim(), self.max_chars);
        if input.is_empty() {
            return Err(EmbedError::EmptyInput);
        }
        let vector = self.request(input).await?;
        Embedding::normalized(vector)
    }

    async fn embed_image(&self, _bytes: &[u8]) -> Result<Embedding, EmbedError> {
        Err(EmbedError::ImagesUnsupported { backend: PROVIDER })
    }

    fn space(&self) -> &EmbeddingSpace {
        &self.space
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [Message],
    max_tokens: u32,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    model: Option<String>,
    choices: Vec<ChatChoice>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    content: String,
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    input: &'a str,
    model: &'a str,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

#[cfg(test)]
mod tests {
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    fn test_provider(base_url: &str) -> OpenAiProvider {
        OpenAiProvider::new(
            "sk-test-key".into(),
            base_url.into(),
            "gpt-3.5-turbo".into(),
            512,
        )
        .unwrap()
        .with_max_retries(0)
    }

    fn completion_body() -> serde_json::Value {
        serde_json::json!({
            "model": "gpt-3.5-turbo-0125",
            "choices": [{"message": {"role": "assistant", "content": "hello there"}}],
            "usage": {"prompt_tokens": 9, "completion_tokens": 2, "total_tokens": 11}
        })
    }

    #[test]
    fn new_trims_trailing_slashes() {
        let p = test_provider("https://api.openai.com/v1//");
        assert_eq!(p.base_url, "https://api.openai.com/v1");
    }

    #[test]
    fn debug_redacts_api_key() {
        let p = test_provider("https://api.openai.com/v1");
        let debug = format!("{p:?}");
        assert!(!debug.contains("sk-test-key"));
        assert!(debug.contains("<redacted>"));
        assert!(debug.contains("gpt-3.5-turbo"));
    }

    #[test]
    fn chat_request_serialization() {
        let messages = vec![Message::system("ctx"), Message::user("hi")];
        let body = ChatRequest {
            model: "m",
            messages: &messages,
            max_tokens: 64,
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["messages"][0]["role"], "system");
        assert_eq!(json["messages"][1]["content"], "hi");
        assert_eq!(json["max_tokens"], 64);
    }

    #[tokio::test]
    async fn chat_returns_content_model_and_usage() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(header("authorization", "Bearer sk-test-key"))
            .and(body_partial_json(serde_json::json!({"model": "gpt-3.5-turbo", "max_tokens": 512})))
            .respond_with(ResponseTemplate::new(200).set_body_json(completion_body()))
            .expect(1)
            .mount(&server)
            .await;

        let p = test_provider(&server.uri());
        let out = p
            .chat(&[Message::user("hi")], &ChatOptions::default())
            .await
            .unwrap();
        assert_eq!(out.content, "hello there");
        assert_eq!(out.model, "gpt-3.5-turbo-0125");
        assert_eq!(out.usage.unwrap().total_tokens, 11);
    }

    #[tokio::test]
    async fn chat_options_override_model_and_budget() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(body_partial_json(serde_json::json!({"model": "gpt-4o", "max_tokens": 32})))
            .respond_with(ResponseTemplate::new(200).set_body_json(completion_body()))
            .expect(1)
            .mount(&server)
            .await;

        let p = test_provider(&server.uri());
        let options = ChatOptions {
            model: Some("gpt-4o".into()),
            max_tokens: Some(32),
            timeout: None,
        };
        assert!(p.chat(&[Message::user("hi")], &options).await.is_ok());
    }

    #[tokio::test]
    async fn non_success_status_is_reported() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401).set_body_string("bad key"))
            .mount(&server)
            .await;

        let p = test_provider(&server.uri());
        let err = p
            .chat(&[Message::user("hi")], &ChatOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, LlmError::Status { status: 401, .. }));
    }

    #[tokio::test]
    async fn empty_choices_is_empty_response() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"choices": []})))
            .mount(&server)
            .await;

        let p = test_provider(&server.uri());
        let err = p
            .chat(&[Message::user("hi")], &ChatOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, LlmError::EmptyResponse { .. }));
    }

    #[tokio::test]
    async fn slow_upstream_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(completion_body())
                    .set_delay(Duration::from_millis(500)),
            )
            .mount(&server)
            .await;

        let p = test_provider(&server.uri());
        let options = ChatOptions {
            timeout: Some(Duration::from_millis(50)),
            ..ChatOptions::default()
        };
        let err = p.chat(&[Message::user("hi")], &options).await.unwrap_err();
        assert!(matches!(err, LlmError::Timeout), "got {err:?}");
    }

    #[tokio::test]
    async fn unreachable_endpoint_errors() {
        let p = test_provider("http://127.0.0.1:1");
        assert!(
            p.chat(&[Message::user("hi")], &ChatOptions::default())
                .await
                .is_err()
        );
    }

    async fn embedding_server(vector: &[f32]) -> MockServer {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/embeddings"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"data": [{"embedding": vector}]})),
            )
            .mount(&server)
            .await;
        server
    }

    async fn connect(server: &MockServer) -> OpenAiEmbedder {
        OpenAiEmbedder::connect(
            "sk-test-key".into(),
            server.uri(),
            "text-embedding-3-small".into(),
            Duration::from_secs(5),
        )
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn embedder_probe_sets_dimensions() {
        let server = embedding_server(&[3.0, 4.0, 0.0]).await;
        let e = connect(&server).await;
        assert_eq!(e.space().dimensions, 3);
        assert_eq!(e.space().model, "text-embedding-3-small");
    }

    #[tokio::test]
    async fn embedder_normalizes_vectors() {
        let server = embedding_server(&[3.0, 4.0]).await;
        let e = connect(&server).await;
        let v = e.embed_text("hello").await.unwrap();
        let norm: f32 = v.as_slice().iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-6);
    }

    #[tokio::test]
    async fn embedder_rejects_blank_text() {
        let server = embedding_server(&[1.0]).await;
        let e = connect(&server).await;
        assert!(matches!(
            e.embed_text("   ").await,
            Err(EmbedError::EmptyInput)
        ));
    }

    #[tokio::test]
    async fn embedder_is_text_only() {
        let server = embedding_server(&[1.0]).await;
        let e = connect(&server).await;
        assert!(!e.supports_images());
        assert!(matches!(
            e.embed_image(&[0xFF, 0xD8]).await,
            Err(EmbedError::ImagesUnsupported { .. })
        ));
    }

    #[tokio::test]
    async fn embedder_truncates_long_input() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/embeddings"))
            .and(body_partial_json(serde_json::json!({"input": "abcd"})))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"data": [{"embedding": [1.0, 0.0]}]})),
            )
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/embeddings"))
            .and(body_partial_json(serde_json::json!({"input": "probe"})))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"data": [{"embedding": [1.0, 0.0]}]})),
            )
            .mount(&server)
            .await;

        let e = connect(&server).await.with_max_chars(4);
        assert!(e.embed_text("abcdefgh").await.is_ok());
    }

    #[test]
    fn embedder_debug_redacts_api_key() {
        let e = OpenAiEmbedder {
            client: reqwest::Client::new(),
            api_key: "sk-secret".into(),
            base_url: "https://api.openai.com/v1".into(),
            space: EmbeddingSpace::new(PROVIDER, "m", 3),
            max_chars: 10,
        };
        let debug = format!("{e:?}");
        assert!(!debug.contains("sk-secret"));
        assert!(debug.contains("<redacted>"));
    }
}

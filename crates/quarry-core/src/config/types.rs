use std::fmt;
use std::path::PathBuf;

use quarry_ingest::{DEFAULT_MAX_FILE_SIZE, SplitterConfig};
use serde::{Deserialize, Serialize};

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub knowledge_base: KnowledgeBaseConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub multimodal: MultimodalConfig,
}

fn default_base_url() -> String {
    "https://api.openai.com/v1".into()
}

fn default_model() -> String {
    "gpt-3.5-turbo".into()
}

fn default_max_tokens() -> u32 {
    512
}

fn default_chat_timeout_secs() -> u64 {
    30
}

fn default_rag_timeout_secs() -> u64 {
    60
}

/// OpenAI-compatible chat endpoint.
#[derive(Clone, Deserialize, Serialize)]
pub struct LlmConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_chat_timeout_secs")]
    pub chat_timeout_secs: u64,
    #[serde(default = "default_rag_timeout_secs")]
    pub rag_timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            api_key: String::new(),
            model: default_model(),
            max_tokens: default_max_tokens(),
            chat_timeout_secs: default_chat_timeout_secs(),
            rag_timeout_secs: default_rag_timeout_secs(),
        }
    }
}

impl fmt::Debug for LlmConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LlmConfig")
            .field("base_url", &self.base_url)
            .field(
                "api_key",
                &if self.api_key.is_empty() {
                    "<unset>"
                } else {
                    "<redacted>"
                },
            )
            .field("model", &self.model)
            .field("max_tokens", &self.max_tokens)
            .field("chat_timeout_secs", &self.chat_timeout_secs)
            .field("rag_timeout_secs", &self.rag_timeout_secs)
            .finish()
    }
}

/// Text embedding backend used by the retrieval service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingBackend {
    /// `/embeddings` on the chat endpoint's base URL.
    OpenAi,
    /// Local BERT-family sentence encoder (requires the `candle` feature).
    Bert,
}

impl EmbeddingBackend {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::OpenAi => "openai",
            Self::Bert => "bert",
        }
    }
}

impl fmt::Display for EmbeddingBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn default_embedding_backend() -> EmbeddingBackend {
    EmbeddingBackend::OpenAi
}

fn default_embedding_model() -> String {
    "text-embedding-3-small".into()
}

fn default_embedding_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EmbeddingConfig {
    #[serde(default = "default_embedding_backend")]
    pub backend: EmbeddingBackend,
    /// API model name, or a HuggingFace repo id for local backends.
    #[serde(default = "default_embedding_model")]
    pub model: String,
    #[serde(default = "default_embedding_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            backend: default_embedding_backend(),
            model: default_embedding_model(),
            timeout_secs: default_embedding_timeout_secs(),
        }
    }
}

fn default_kb_path() -> PathBuf {
    PathBuf::from("knowledge_base")
}

fn default_max_file_size() -> u64 {
    DEFAULT_MAX_FILE_SIZE
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct KnowledgeBaseConfig {
    #[serde(default = "default_kb_path")]
    pub path: PathBuf,
    #[serde(default)]
    pub recursive: bool,
    #[serde(default = "default_max_file_size")]
    pub max_file_size: u64,
    /// Drop the first row of every worksheet.
    #[serde(default = "default_true")]
    pub skip_header: bool,
}

impl Default for KnowledgeBaseConfig {
    fn default() -> Self {
        Self {
            path: default_kb_path(),
            recursive: false,
            max_file_size: default_max_file_size(),
            skip_header: true,
        }
    }
}

fn default_top_k() -> usize {
    3
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RetrievalConfig {
    #[serde(default = "default_top_k")]
    pub top_k: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
        }
    }
}

fn default_general_chunking() -> SplitterConfig {
    SplitterConfig {
        chunk_size: 500,
        chunk_overlap: 50,
    }
}

fn default_pdf_chunking() -> SplitterConfig {
    SplitterConfig {
        chunk_size: 500,
        chunk_overlap: 100,
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ChunkingConfig {
    /// Hierarchical splitting for plain text and spreadsheets.
    #[serde(default = "default_general_chunking")]
    pub general: SplitterConfig,
    /// Sliding window for PDF text and the multimodal pass.
    #[serde(default = "default_pdf_chunking")]
    pub pdf: SplitterConfig,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            general: default_general_chunking(),
            pdf: default_pdf_chunking(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1".into()
}

fn default_port() -> u16 {
    8000
}

fn default_max_body_size() -> usize {
    1_048_576
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_max_body_size")]
    pub max_body_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            port: default_port(),
            max_body_size: default_max_body_size(),
        }
    }
}

fn default_content_dir() -> PathBuf {
    PathBuf::from("extracted_content")
}

fn default_sink_path() -> PathBuf {
    PathBuf::from("extracted_content/embeddings.jsonl")
}

fn default_clip_model() -> String {
    "openai/clip-vit-base-patch32".into()
}

/// Batch extraction cache and the joint text/image embedding pass over it.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MultimodalConfig {
    #[serde(default = "default_content_dir")]
    pub content_dir: PathBuf,
    #[serde(default = "default_sink_path")]
    pub sink_path: PathBuf,
    #[serde(default = "default_clip_model")]
    pub model: String,
}

impl Default for MultimodalConfig {
    fn default() -> Self {
        Self {
            content_dir: default_content_dir(),
            sink_path: default_sink_path(),
            model: default_clip_model(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_serialize_roundtrip() {
        let config = Config::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize");
        let back: Config = toml::from_str(&toml_str).expect("deserialize");
        assert_eq!(back.llm.model, config.llm.model);
        assert_eq!(back.embedding.backend, config.embedding.backend);
        assert_eq!(back.chunking.pdf, config.chunking.pdf);
        assert_eq!(back.server.port, config.server.port);
    }

    #[test]
    fn embedding_backend_parses_lowercase() {
        let cfg: EmbeddingConfig = toml::from_str(r#"backend = "bert""#).unwrap();
        assert_eq!(cfg.backend, EmbeddingBackend::Bert);
        assert_eq!(cfg.model, "text-embedding-3-small");
    }

    #[test]
    fn llm_debug_redacts_key() {
        let cfg = LlmConfig {
            api_key: "sk-live-123".into(),
            ..LlmConfig::default()
        };
        let debug = format!("{cfg:?}");
        assert!(!debug.contains("sk-live-123"));
        assert!(debug.contains("<redacted>"));
        assert!(format!("{:?}", LlmConfig::default()).contains("<unset>"));
    }
}

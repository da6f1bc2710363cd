use quarry_ingest::{ExtractError, SplitError};
use quarry_llm::EmbedError;

#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    #[error("vector has {actual} dimensions, index expects {expected}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("query embedded in {actual}, index built in {expected}")]
    SpaceMismatch { expected: String, actual: String },

    #[error("embedding failed: {0}")]
    Embed(#[from] EmbedError),

    #[error("invalid chunking settings: {0}")]
    Split(#[from] SplitError),

    #[error("knowledge base scan failed: {0}")]
    Scan(#[from] ExtractError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("sink error: {0}")]
    Sink(String),
}

pub type Result<T> = std::result::Result<T, IndexError>;

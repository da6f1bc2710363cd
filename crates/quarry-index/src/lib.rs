//! Flat vector index, knowledge-base lifecycle, and retrieval over a document folder.

pub mod error;
pub mod index;
pub mod multimodal;
pub mod service;
pub mod sink;
pub mod state;

pub use error::IndexError;
pub use index::{ScoredChunk, VectorIndex};
pub use multimodal::{MultimodalIndexer, MultimodalReport};
pub use service::{
    BuildReport, KnowledgeStatus, NOT_INITIALIZED, Retrieval, RetrievalService,
    RetrievalSettings, RetrievedChunk,
};
pub use sink::{EmbeddingRecord, EmbeddingSink, InMemorySink, JsonlSink, RecordKind};
pub use state::{IndexPhase, KnowledgeBase};

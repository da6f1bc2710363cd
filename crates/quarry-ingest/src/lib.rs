//! Knowledge-base discovery, content extraction, and chunking.

pub mod cache;
pub mod error;
pub mod extractor;
pub mod report;
pub mod scan;
pub mod splitter;
pub mod types;

pub use cache::{CachedDocument, ContentCache, ExtractSummary, FolderExtraction, extract_folder};
pub use error::ExtractError;
pub use extractor::{
    ContentExtractor, DEFAULT_MAX_FILE_SIZE, ExtractOptions, Extraction, ExtractorRegistry,
};
pub use report::{IngestReport, ItemOutcome, ItemReport};
pub use scan::scan_knowledge_base;
pub use splitter::{SplitError, SplitStrategy, SplitterConfig, TextSplitter};
pub use types::{Chunk, Document, DocumentFormat, ImageArtifact, ImageKind, Modality, Segment};

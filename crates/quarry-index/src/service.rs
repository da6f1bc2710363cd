use std::path::PathBuf;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Instant;

use quarry_ingest::{
    Chunk, DocumentFormat, ExtractOptions, ExtractorRegistry, IngestReport, ItemReport,
    SplitStrategy, SplitterConfig, TextSplitter, scan_knowledge_base,
};
use quarry_llm::{EmbedError, Embedder};
use serde::Serialize;

use crate::error::Result;
use crate::index::{ScoredChunk, VectorIndex};
use crate::state::{IndexPhase, KnowledgeBase};

/// Returned by [`RetrievalService::search_knowledge`] until an index has been published.
pub const NOT_INITIALIZED: &str = "knowledge base not initialized";

#[derive(Debug, Clone)]
pub struct RetrievalSettings {
    pub root: PathBuf,
    pub recursive: bool,
    /// Recursive splitting for plain text and spreadsheets.
    pub general: SplitterConfig,
    /// Sliding-window splitting for PDF text.
    pub pdf: SplitterConfig,
    pub extract: ExtractOptions,
}

impl Default for RetrievalSettings {
    fn default() -> Self {
        Self {
            root: PathBuf::from("knowledge_base"),
            recursive: false,
            general: SplitterConfig {
                chunk_size: 500,
                chunk_overlap: 50,
            },
            pdf: SplitterConfig {
                chunk_size: 500,
                chunk_overlap: 100,
            },
            extract: ExtractOptions {
                extract_images: false,
                ..ExtractOptions::default()
            },
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RetrievedChunk {
    pub text: String,
    pub document: String,
    pub detail: Option<String>,
    pub score: f32,
}

impl From<ScoredChunk> for RetrievedChunk {
    fn from(hit: ScoredChunk) -> Self {
        let segment = &hit.chunk.parent_segment;
        Self {
            document: segment.source_document.clone(),
            detail: segment.source_detail.clone(),
            text: hit.chunk.text,
            score: hit.score,
        }
    }
}

/// Outcome of a query: either no index is being served, or the ranked hits.
#[derive(Debug, Clone)]
pub enum Retrieval {
    NotReady,
    Hits(Vec<RetrievedChunk>),
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct BuildReport {
    pub documents_scanned: usize,
    pub documents_indexed: usize,
    pub chunks_indexed: usize,
    pub items: IngestReport,
    pub duration_ms: u64,
}

impl BuildReport {
    #[must_use]
    pub fn skipped(&self) -> usize {
        self.items.skipped_count()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct KnowledgeStatus {
    pub state: IndexPhase,
    pub chunks: usize,
    pub space: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_build: Option<BuildReport>,
}

/// Embed `chunks` into a fresh index. Chunks that fail to embed are recorded and skipped.
///
/// # Errors
///
/// Returns an error if the embedder yields vectors of the wrong dimensionality.
pub async fn build_index<E: Embedder>(
    embedder: &E,
    chunks: Vec<Chunk>,
    report: &mut IngestReport,
) -> Result<VectorIndex> {
    let mut index = VectorIndex::new(embedder.space().clone());
    for chunk in chunks {
        match embedder.embed_text(&chunk.text).await {
            Ok(embedding) => index.insert(chunk, embedding)?,
            Err(e) => report.push(ItemReport::skipped(
                format!("{} chunk {}", chunk.parent_segment.provenance(), chunk.index),
                e,
            )),
        }
    }
    Ok(index)
}

/// Scans, extracts, chunks, and embeds a knowledge-base folder, and answers top-k
/// queries against the published index.
pub struct RetrievalService<E> {
    embedder: E,
    knowledge: KnowledgeBase,
    registry: ExtractorRegistry,
    general: TextSplitter,
    pdf: TextSplitter,
    root: PathBuf,
    recursive: bool,
    last_report: RwLock<Option<BuildReport>>,
}

impl<E: Embedder> RetrievalService<E> {
    /// # Errors
    ///
    /// Returns an error if either chunking configuration is invalid.
    pub fn new(embedder: E, settings: RetrievalSettings) -> Result<Self> {
        Ok(Self {
            general: TextSplitter::new(settings.general, SplitStrategy::Recursive)?,
            pdf: TextSplitter::new(settings.pdf, SplitStrategy::SlidingWindow)?,
            registry: ExtractorRegistry::with_defaults(settings.extract),
            knowledge: KnowledgeBase::new(),
            root: settings.root,
            recursive: settings.recursive,
            embedder,
            last_report: RwLock::new(None),
        })
    }

    #[must_use]
    pub fn with_registry(mut self, registry: ExtractorRegistry) -> Self {
        self.registry = registry;
        self
    }

    #[must_use]
    pub fn embedder(&self) -> &E {
        &self.embedder
    }

    #[must_use]
    pub fn knowledge(&self) -> &KnowledgeBase {
        &self.knowledge
    }

    fn splitter_for(&self, format: DocumentFormat) -> &TextSplitter {
        match format {
            DocumentFormat::Pdf => &self.pdf,
            DocumentFormat::PlainText | DocumentFormat::Spreadsheet => &self.general,
        }
    }

    /// Rebuild the index from the knowledge-base folder and publish it.
    ///
    /// Per-document and per-chunk failures are recorded in the report. While the build
    /// runs, the previous index (if any) keeps answering queries.
    ///
    /// # Errors
    ///
    /// Returns an error if the folder cannot be scanned or the embedder produces
    /// inconsistent vectors; the knowledge base is then marked failed.
    pub async fn build(&self) -> Result<BuildReport> {
        let generation = self.knowledge.begin_build();
        let started = Instant::now();
        tracing::info!(root = %self.root.display(), generation, "knowledge base build started");

        let (index, mut report) = match self.collect_index().await {
            Ok(built) => built,
            Err(e) => {
                tracing::error!("knowledge base build failed: {e}");
                self.knowledge.fail(generation, e.to_string());
                return Err(e);
            }
        };
        report.chunks_indexed = index.len();
        report.duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

        if self.knowledge.publish(generation, index) {
            tracing::info!(
                documents = report.documents_indexed,
                chunks = report.chunks_indexed,
                skipped = report.skipped(),
                duration_ms = report.duration_ms,
                "knowledge base ready"
            );
            *self
                .last_report
                .write()
                .unwrap_or_else(PoisonError::into_inner) = Some(report.clone());
        }
        Ok(report)
    }

    async fn collect_index(&self) -> Result<(VectorIndex, BuildReport)> {
        let documents = scan_knowledge_base(&self.root, self.recursive)?;
        let mut report = BuildReport {
            documents_scanned: documents.len(),
            ..BuildReport::default()
        };

        let mut chunks = Vec::new();
        for doc in &documents {
            let extraction = match self.registry.extract(doc).await {
                Ok(extraction) => extraction,
                Err(e) => {
                    report.items.push(ItemReport::skipped(&doc.name, e));
                    continue;
                }
            };
            report.items.extend(extraction.skipped);

            let splitter = self.splitter_for(doc.format);
            let before = chunks.len();
            for segment in extraction.segments {
                chunks.extend(splitter.split(&Arc::new(segment)));
            }
            report.documents_indexed += 1;
            report
                .items
                .push(ItemReport::ingested(&doc.name, chunks.len() - before));
        }

        let index = build_index(&self.embedder, chunks, &mut report.items).await?;
        Ok((index, report))
    }

    /// Top `top_k` chunks for `text`, or `NotReady` when no index is served.
    ///
    /// # Errors
    ///
    /// Returns an error if the query cannot be embedded or comes from another space.
    pub async fn query(&self, text: &str, top_k: usize) -> Result<Retrieval> {
        let Some(index) = self.knowledge.snapshot() else {
            return Ok(Retrieval::NotReady);
        };
        if top_k == 0 || index.is_empty() {
            return Ok(Retrieval::Hits(Vec::new()));
        }

        let query = match self.embedder.embed_text(text).await {
            Ok(query) => query,
            Err(EmbedError::EmptyInput) => return Ok(Retrieval::Hits(Vec::new())),
            Err(e) => return Err(e.into()),
        };
        let hits = index.search(&query, self.embedder.space(), top_k)?;
        tracing::debug!(top_k, hits = hits.len(), "knowledge base queried");
        Ok(Retrieval::Hits(hits.into_iter().map(Into::into).collect()))
    }

    /// Retrieved chunk texts joined by blank lines, most similar first, or
    /// [`NOT_INITIALIZED`] when no index is served.
    ///
    /// # Errors
    ///
    /// Returns an error if the query cannot be embedded.
    pub async fn search_knowledge(&self, query: &str, top_k: usize) -> Result<String> {
        Ok(match self.query(query, top_k).await? {
            Retrieval::NotReady => NOT_INITIALIZED.to_owned(),
            Retrieval::Hits(hits) => hits
                .iter()
                .map(|h| h.text.as_str())
                .collect::<Vec<_>>()
                .join("\n\n"),
        })
    }

    #[must_use]
    pub fn status(&self) -> KnowledgeStatus {
        KnowledgeStatus {
            state: self.knowledge.phase(),
            chunks: self.knowledge.snapshot().map_or(0, |index| index.len()),
            space: self.embedder.space().to_string(),
            failure: self.knowledge.failure(),
            last_build: self
                .last_report
                .read()
                .unwrap_or_else(PoisonError::into_inner)
                .clone(),
        }
    }
}

impl<E> std::fmt::Debug for RetrievalService<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetrievalService")
            .field("root", &self.root)
            .field("recursive", &self.recursive)
            .field("knowledge", &self.knowledge)
            .finish_non_exhaustive()
    }
}

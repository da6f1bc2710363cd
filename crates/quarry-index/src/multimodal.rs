use std::path::Path;

use quarry_ingest::{
    CachedDocument, ContentCache, IngestReport, ItemReport, SplitStrategy, SplitterConfig,
    TextSplitter,
};
use quarry_llm::{EmbedError, Embedder};
use serde::Serialize;

use crate::error::Result;
use crate::sink::{EmbeddingRecord, EmbeddingSink, RecordKind};

#[derive(Debug, Clone, Default, Serialize)]
pub struct MultimodalReport {
    pub documents: usize,
    pub text_chunks: usize,
    pub images: usize,
    pub items: IngestReport,
}

/// Embeds the text and images of an extracted-content cache with a joint
/// text/image embedder and writes the vectors to a sink.
pub struct MultimodalIndexer<E, S> {
    embedder: E,
    sink: S,
    splitter: TextSplitter,
}

impl<E: Embedder, S: EmbeddingSink> MultimodalIndexer<E, S> {
    /// # Errors
    ///
    /// Returns an error if the embedder cannot embed images or the chunking
    /// configuration is invalid.
    pub fn new(embedder: E, sink: S, chunking: SplitterConfig) -> Result<Self> {
        if !embedder.supports_images() {
            return Err(EmbedError::ImagesUnsupported {
                backend: embedder.space().backend,
            }
            .into());
        }
        Ok(Self {
            splitter: TextSplitter::new(chunking, SplitStrategy::SlidingWindow)?,
            embedder,
            sink,
        })
    }

    #[must_use]
    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// Clear the sink, then embed every cached document.
    ///
    /// Chunks and images that fail to embed are recorded and skipped. A missing
    /// cache directory leaves the sink empty.
    ///
    /// # Errors
    ///
    /// Returns an error if the sink rejects a write or the cache cannot be listed.
    pub async fn run(&self, cache: &ContentCache) -> Result<MultimodalReport> {
        self.sink.clear().await?;
        let mut report = MultimodalReport::default();

        if !cache.root().is_dir() {
            tracing::warn!(root = %cache.root().display(), "content directory not found");
            return Ok(report);
        }

        for doc in cache.documents()? {
            let mut records = self.embed_text_file(&doc, &mut report).await;
            records.extend(self.embed_images(&doc, &mut report).await);
            self.sink.insert(records).await?;
            report.documents += 1;
        }

        tracing::info!(
            documents = report.documents,
            text_chunks = report.text_chunks,
            images = report.images,
            skipped = report.items.skipped_count(),
            "multimodal embedding finished"
        );
        Ok(report)
    }

    async fn embed_text_file(
        &self,
        doc: &CachedDocument,
        report: &mut MultimodalReport,
    ) -> Vec<EmbeddingRecord> {
        let Some(text_file) = &doc.text_file else {
            return Vec::new();
        };
        let text = match tokio::fs::read_to_string(text_file).await {
            Ok(text) => text,
            Err(e) => {
                report.items.push(ItemReport::skipped(display(text_file), e));
                return Vec::new();
            }
        };

        let mut records = Vec::new();
        for (index, chunk) in self.splitter.split_text(&text).into_iter().enumerate() {
            match self.embedder.embed_text(&chunk).await {
                Ok(embedding) => {
                    records.push(EmbeddingRecord {
                        document: doc.name.clone(),
                        kind: RecordKind::Text,
                        chunk_index: Some(index),
                        image_name: None,
                        content: Some(chunk),
                        embedding: embedding.into_vec(),
                        source_file: display(text_file),
                    });
                }
                Err(e) => report
                    .items
                    .push(ItemReport::skipped(format!("{} chunk {index}", doc.name), e)),
            }
        }
        report.text_chunks += records.len();
        report
            .items
            .push(ItemReport::ingested(display(text_file), records.len()));
        records
    }

    async fn embed_images(
        &self,
        doc: &CachedDocument,
        report: &mut MultimodalReport,
    ) -> Vec<EmbeddingRecord> {
        let mut records = Vec::new();
        for path in &doc.images {
            let embedded = match tokio::fs::read(path).await {
                Ok(bytes) => self.embedder.embed_image(&bytes).await.map_err(|e| e.to_string()),
                Err(e) => Err(e.to_string()),
            };
            match embedded {
                Ok(embedding) => {
                    records.push(EmbeddingRecord {
                        document: doc.name.clone(),
                        kind: RecordKind::Image,
                        chunk_index: None,
                        image_name: path
                            .file_name()
                            .map(|n| n.to_string_lossy().into_owned()),
                        content: None,
                        embedding: embedding.into_vec(),
                        source_file: display(path),
                    });
                    report.items.push(ItemReport::ingested(display(path), 1));
                }
                Err(reason) => report.items.push(ItemReport::skipped(display(path), reason)),
            }
        }
        report.images += records.len();
        records
    }
}

fn display(path: &Path) -> String {
    path.display().to_string()
}

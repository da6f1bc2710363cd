use quarry_ingest::Chunk;
use quarry_llm::{Embedding, EmbeddingSpace};

use crate::error::{IndexError, Result};

struct Entry {
    chunk: Chunk,
    embedding: Embedding,
}

/// Brute-force index over unit vectors from a single embedding space.
///
/// Built once and then only read; a rebuild produces a new index.
pub struct VectorIndex {
    space: EmbeddingSpace,
    entries: Vec<Entry>,
}

#[derive(Debug, Clone)]
pub struct ScoredChunk {
    pub chunk: Chunk,
    pub score: f32,
}

impl VectorIndex {
    #[must_use]
    pub fn new(space: EmbeddingSpace) -> Self {
        Self {
            space,
            entries: Vec::new(),
        }
    }

    /// # Errors
    ///
    /// Returns `DimensionMismatch` if any embedding differs from the space's dimensionality.
    pub fn build(
        space: EmbeddingSpace,
        items: impl IntoIterator<Item = (Chunk, Embedding)>,
    ) -> Result<Self> {
        let mut index = Self::new(space);
        for (chunk, embedding) in items {
            index.insert(chunk, embedding)?;
        }
        Ok(index)
    }

    /// # Errors
    ///
    /// Returns `DimensionMismatch` if the embedding differs from the space's dimensionality.
    pub fn insert(&mut self, chunk: Chunk, embedding: Embedding) -> Result<()> {
        if embedding.dimensions() != self.space.dimensions {
            return Err(IndexError::DimensionMismatch {
                expected: self.space.dimensions,
                actual: embedding.dimensions(),
            });
        }
        self.entries.push(Entry { chunk, embedding });
        Ok(())
    }

    #[must_use]
    pub fn space(&self) -> &EmbeddingSpace {
        &self.space
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Top `top_k` chunks by dot product, highest first; equal scores keep insertion order.
    ///
    /// # Errors
    ///
    /// Returns `SpaceMismatch` if the query comes from a different embedding space.
    pub fn search(
        &self,
        query: &Embedding,
        query_space: &EmbeddingSpace,
        top_k: usize,
    ) -> Result<Vec<ScoredChunk>> {
        if *query_space != self.space || query.dimensions() != self.space.dimensions {
            return Err(IndexError::SpaceMismatch {
                expected: self.space.to_string(),
                actual: query_space.to_string(),
            });
        }

        let mut scored: Vec<(usize, f32)> = self
            .entries
            .iter()
            .enumerate()
            .map(|(i, e)| (i, e.embedding.dot(query)))
            .collect();
        scored.sort_by(|a, b| b.1.total_cmp(&a.1));
        scored.truncate(top_k);

        Ok(scored
            .into_iter()
            .map(|(i, score)| ScoredChunk {
                chunk: self.entries[i].chunk.clone(),
                score,
            })
            .collect())
    }
}

impl std::fmt::Debug for VectorIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VectorIndex")
            .field("space", &self.space)
            .field("len", &self.entries.len())
            .finish()
    }
}

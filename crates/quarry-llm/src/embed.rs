//! Embedding contract shared by every backend.
//!
//! An [`Embedding`] can only be constructed through [`Embedding::normalized`], so
//! every vector that leaves a backend has unit Euclidean norm and cosine
//! similarity reduces to a dot product. Vectors from different
//! [`EmbeddingSpace`]s are not comparable; indexes record the space they were
//! built in and refuse queries from any other.

use std::fmt;

use crate::error::LlmError;

const NORM_EPSILON: f32 = 1e-12;

#[derive(Debug, thiserror::Error)]
pub enum EmbedError {
    #[error("nothing to embed after trimming and truncation")]
    EmptyInput,

    #[error("image could not be decoded: {0}")]
    InvalidImage(String),

    #[error("{backend} cannot embed images")]
    ImagesUnsupported { backend: &'static str },

    #[error("backend produced a zero or non-finite vector")]
    Degenerate,

    #[error("embedding backend failed: {0}")]
    Backend(#[from] LlmError),
}

/// Identifies the semantic space a vector lives in.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct EmbeddingSpace {
    pub backend: &'static str,
    pub model: String,
    pub dimensions: usize,
}

impl EmbeddingSpace {
    #[must_use]
    pub fn new(backend: &'static str, model: impl Into<String>, dimensions: usize) -> Self {
        Self {
            backend,
            model: model.into(),
            dimensions,
        }
    }
}

impl fmt::Display for EmbeddingSpace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}@{}", self.backend, self.model, self.dimensions)
    }
}

/// A unit-length embedding vector.
#[derive(Clone, Debug, PartialEq)]
pub struct Embedding(Vec<f32>);

impl Embedding {
    /// Scale `vector` to unit length.
    ///
    /// # Errors
    ///
    /// Returns [`EmbedError::EmptyInput`] for an empty vector and
    /// [`EmbedError::Degenerate`] when the norm is zero or any component is not finite.
    pub fn normalized(mut vector: Vec<f32>) -> Result<Self, EmbedError> {
        if vector.is_empty() {
            return Err(EmbedError::EmptyInput);
        }
        if vector.iter().any(|x| !x.is_finite()) {
            return Err(EmbedError::Degenerate);
        }
        let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm <= NORM_EPSILON {
            return Err(EmbedError::Degenerate);
        }
        for x in &mut vector {
            *x /= norm;
        }
        Ok(Self(vector))
    }

    #[must_use]
    pub fn as_slice(&self) -> &[f32] {
        &self.0
    }

    #[must_use]
    pub fn dimensions(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn into_vec(self) -> Vec<f32> {
        self.0
    }

    /// Cosine similarity with another unit vector.
    #[must_use]
    pub fn dot(&self, other: &Self) -> f32 {
        self.0.iter().zip(&other.0).map(|(a, b)| a * b).sum()
    }
}

/// Maps text (and optionally images) to unit vectors in a fixed space.
///
/// Failures for a single input are reported through [`EmbedError`] so callers
/// can skip that unit and keep going.
pub trait Embedder: Send + Sync {
    /// # Errors
    ///
    /// Returns [`EmbedError::EmptyInput`] for blank text, or a backend error.
    fn embed_text(&self, text: &str) -> impl Future<Output = Result<Embedding, EmbedError>> + Send;

    /// # Errors
    ///
    /// Returns [`EmbedError::InvalidImage`] for undecodable bytes and
    /// [`EmbedError::ImagesUnsupported`] for text-only backends.
    fn embed_image(
        &self,
        bytes: &[u8],
    ) -> impl Future<Output = Result<Embedding, EmbedError>> + Send;

    fn space(&self) -> &EmbeddingSpace;

    fn supports_images(&self) -> bool {
        false
    }
}

/// Truncate `text` to at most `max_chars` characters on a char boundary.
#[must_use]
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalized_has_unit_norm() {
        let e = Embedding::normalized(vec![3.0, 4.0]).unwrap();
        assert!((e.as_slice()[0] - 0.6).abs() < 1e-6);
        assert!((e.as_slice()[1] - 0.8).abs() < 1e-6);
        assert!((e.dot(&e) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn zero_vector_is_degenerate() {
        assert!(matches!(
            Embedding::normalized(vec![0.0; 8]),
            Err(EmbedError::Degenerate)
        ));
    }

    #[test]
    fn nan_is_degenerate() {
        assert!(matches!(
            Embedding::normalized(vec![1.0, f32::NAN]),
            Err(EmbedError::Degenerate)
        ));
    }

    #[test]
    fn empty_vector_rejected() {
        assert!(matches!(
            Embedding::normalized(Vec::new()),
            Err(EmbedError::EmptyInput)
        ));
    }

    #[test]
    fn space_display() {
        let space = EmbeddingSpace::new("openai", "text-embedding-3-small", 1536);
        assert_eq!(space.to_string(), "openai/text-embedding-3-small@1536");
    }

    #[test]
    fn spaces_with_different_models_differ() {
        let a = EmbeddingSpace::new("candle", "clip", 512);
        let b = EmbeddingSpace::new("candle", "bert", 512);
        assert_ne!(a, b);
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        assert_eq!(truncate_chars("知识库文档", 2), "知识");
        assert_eq!(truncate_chars("abc", 10), "abc");
        assert_eq!(truncate_chars("abc", 0), "");
    }

    mod proptest_embedding {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #![proptest_config(ProptestConfig::with_cases(500))]

            #[test]
            fn normalized_vectors_have_unit_norm(
                v in proptest::collection::vec(-1000.0f32..1000.0, 1..256),
            ) {
                if let Ok(e) = Embedding::normalized(v) {
                    let norm = e.as_slice().iter().map(|x| x * x).sum::<f32>().sqrt();
                    prop_assert!((norm - 1.0).abs() < 1e-4);
                }
            }
        }
    }
}

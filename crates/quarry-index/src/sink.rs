use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::RwLock;

use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;

use crate::error::{IndexError, Result};

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    Text,
    Image,
}

/// One persisted embedding with its provenance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingRecord {
    pub document: String,
    #[serde(rename = "type")]
    pub kind: RecordKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chunk_index: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    pub embedding: Vec<f32>,
    pub source_file: String,
}

/// Destination for precomputed embeddings. A run clears the sink before inserting.
pub trait EmbeddingSink: Send + Sync {
    fn clear(&self) -> BoxFuture<'_, Result<()>>;

    fn insert(&self, records: Vec<EmbeddingRecord>) -> BoxFuture<'_, Result<()>>;
}

pub struct InMemorySink {
    records: RwLock<Vec<EmbeddingRecord>>,
}

impl InMemorySink {
    #[must_use]
    pub fn new() -> Self {
        Self {
            records: RwLock::new(Vec::new()),
        }
    }

    /// # Errors
    ///
    /// Returns an error if the lock is poisoned.
    pub fn records(&self) -> Result<Vec<EmbeddingRecord>> {
        self.records
            .read()
            .map(|r| r.clone())
            .map_err(|e| IndexError::Sink(e.to_string()))
    }
}

impl Default for InMemorySink {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for InMemorySink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemorySink").finish_non_exhaustive()
    }
}

impl EmbeddingSink for InMemorySink {
    fn clear(&self) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            self.records
                .write()
                .map_err(|e| IndexError::Sink(e.to_string()))?
                .clear();
            Ok(())
        })
    }

    fn insert(&self, records: Vec<EmbeddingRecord>) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            self.records
                .write()
                .map_err(|e| IndexError::Sink(e.to_string()))?
                .extend(records);
            Ok(())
        })
    }
}

/// Appends records as JSON lines to a file.
#[derive(Debug, Clone)]
pub struct JsonlSink {
    path: PathBuf,
}

impl JsonlSink {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl EmbeddingSink for JsonlSink {
    fn clear(&self) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            if let Some(parent) = self.path.parent()
                && !parent.as_os_str().is_empty()
            {
                tokio::fs::create_dir_all(parent).await?;
            }
            tokio::fs::write(&self.path, b"").await?;
            Ok(())
        })
    }

    fn insert(&self, records: Vec<EmbeddingRecord>) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            let mut buf = Vec::new();
            for record in &records {
                serde_json::to_writer(&mut buf, record)?;
                buf.push(b'\n');
            }
            let mut file = tokio::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&self.path)
                .await?;
            file.write_all(&buf).await?;
            file.flush().await?;
            Ok(())
        })
    }
}

use std::future::Future;
use std::pin::Pin;

use super::{ContentExtractor, DEFAULT_MAX_FILE_SIZE, Extraction, check_size};
use crate::error::Result;
use crate::types::{Document, Segment};

/// Whole file as a single segment.
pub struct TextExtractor {
    pub max_file_size: u64,
}

impl Default for TextExtractor {
    fn default() -> Self {
        Self {
            max_file_size: DEFAULT_MAX_FILE_SIZE,
        }
    }
}

impl ContentExtractor for TextExtractor {
    fn extract<'a>(
        &'a self,
        document: &'a Document,
    ) -> Pin<Box<dyn Future<Output = Result<Extraction>> + Send + 'a>> {
        Box::pin(async move {
            check_size(&document.path, self.max_file_size).await?;

            let bytes = tokio::fs::read(&document.path).await?;
            let text = match String::from_utf8(bytes) {
                Ok(text) => text,
                Err(e) => {
                    tracing::warn!(
                        document = %document.name,
                        "invalid UTF-8, replacing undecodable bytes"
                    );
                    String::from_utf8_lossy(e.as_bytes()).into_owned()
                }
            };

            Ok(Extraction {
                segments: vec![Segment::text(text, &document.name)],
                ..Extraction::default()
            })
        })
    }

    fn supported_extensions(&self) -> &[&str] {
        &["txt"]
    }
}

//! Format-specific content extraction behind one async contract.

#[cfg(feature = "pdf")]
mod pdf;
#[cfg(feature = "pdf")]
mod pdf_images;
mod spreadsheet;
mod text;

use std::future::Future;
use std::path::Path;
use std::pin::Pin;

#[cfg(feature = "pdf")]
pub use pdf::{PdfExtractor, clean_page_text};
pub use spreadsheet::{SheetSource, SpreadsheetExtractor, coerce_cell, sheets_to_segments};
pub use text::TextExtractor;

use crate::error::{ExtractError, Result};
use crate::report::ItemReport;
use crate::types::{Document, ImageArtifact, Segment};

/// Default maximum file size: 50 MiB.
pub const DEFAULT_MAX_FILE_SIZE: u64 = 50 * 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExtractOptions {
    pub max_file_size: u64,
    /// Treat the first row of each worksheet as a header and drop it.
    pub skip_header: bool,
    /// Pull raster images out of PDFs.
    pub extract_images: bool,
}

impl Default for ExtractOptions {
    fn default() -> Self {
        Self {
            max_file_size: DEFAULT_MAX_FILE_SIZE,
            skip_header: true,
            extract_images: true,
        }
    }
}

/// Everything recovered from one document.
#[derive(Debug, Default)]
pub struct Extraction {
    pub segments: Vec<Segment>,
    pub images: Vec<ImageArtifact>,
    /// Worksheets, pages, or images that could not be read.
    pub skipped: Vec<ItemReport>,
    /// Page count, for paged formats.
    pub pages: Option<u32>,
}

pub trait ContentExtractor: Send + Sync {
    fn extract<'a>(
        &'a self,
        document: &'a Document,
    ) -> Pin<Box<dyn Future<Output = Result<Extraction>> + Send + 'a>>;

    fn supported_extensions(&self) -> &[&str];
}

/// Dispatches documents to the extractor registered for their extension.
pub struct ExtractorRegistry {
    extractors: Vec<Box<dyn ContentExtractor>>,
}

impl ExtractorRegistry {
    #[must_use]
    pub fn empty() -> Self {
        Self {
            extractors: Vec::new(),
        }
    }

    /// Text and spreadsheet extractors, plus PDF when the `pdf` feature is enabled.
    #[must_use]
    pub fn with_defaults(options: ExtractOptions) -> Self {
        let registry = Self::empty()
            .with(TextExtractor {
                max_file_size: options.max_file_size,
            })
            .with(SpreadsheetExtractor {
                max_file_size: options.max_file_size,
                skip_header: options.skip_header,
            });
        #[cfg(feature = "pdf")]
        let registry = registry.with(PdfExtractor {
            max_file_size: options.max_file_size,
            extract_images: options.extract_images,
        });
        registry
    }

    #[must_use]
    pub fn with(mut self, extractor: impl ContentExtractor + 'static) -> Self {
        self.extractors.push(Box::new(extractor));
        self
    }

    #[must_use]
    pub fn extractor_for(&self, path: &Path) -> Option<&dyn ContentExtractor> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        self.extractors
            .iter()
            .find(|e| e.supported_extensions().contains(&ext.as_str()))
            .map(AsRef::as_ref)
    }

    /// # Errors
    ///
    /// Returns `UnsupportedFormat` when no extractor handles the extension, or the
    /// extractor's own error.
    pub async fn extract(&self, document: &Document) -> Result<Extraction> {
        let extractor = self.extractor_for(&document.path).ok_or_else(|| {
            ExtractError::UnsupportedFormat(document.path.display().to_string())
        })?;
        let extraction = extractor.extract(document).await?;
        tracing::debug!(
            document = %document.name,
            format = %document.format,
            segments = extraction.segments.len(),
            images = extraction.images.len(),
            skipped = extraction.skipped.len(),
            "document extracted"
        );
        Ok(extraction)
    }
}

impl Default for ExtractorRegistry {
    fn default() -> Self {
        Self::with_defaults(ExtractOptions::default())
    }
}

async fn check_size(path: &Path, max_size: u64) -> Result<()> {
    let meta = tokio::fs::metadata(path).await?;
    if meta.len() > max_size {
        return Err(ExtractError::FileTooLarge(meta.len()));
    }
    Ok(())
}

/// Run a blocking parser on the blocking pool; a panic inside it becomes an error.
async fn run_parser<T, F>(f: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| ExtractError::Parser(e.to_string()))?
}

//! On-disk layout for extracted document content:
//! `<root>/<doc>/<doc>_text.txt` and `<root>/<doc>/images/page_<n>_img_<m>.<ext>`.

use std::path::{Path, PathBuf};

use crate::error::{ExtractError, Result};
use crate::extractor::ExtractorRegistry;
use crate::report::{IngestReport, ItemReport};
use crate::scan::scan_knowledge_base;
use crate::types::{DocumentFormat, ImageArtifact};

const IMAGES_DIR: &str = "images";

#[derive(Debug, Clone)]
pub struct ContentCache {
    root: PathBuf,
}

/// One document directory in the cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedDocument {
    pub name: String,
    pub text_file: Option<PathBuf>,
    pub images: Vec<PathBuf>,
}

impl ContentCache {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    #[must_use]
    pub fn text_path(&self, document: &str) -> PathBuf {
        self.root
            .join(document)
            .join(format!("{document}_text.txt"))
    }

    #[must_use]
    pub fn images_dir(&self, document: &str) -> PathBuf {
        self.root.join(document).join(IMAGES_DIR)
    }

    /// Write a document's text and images, replacing whatever an earlier extraction
    /// left in its `images/` directory.
    ///
    /// # Errors
    ///
    /// Returns an error if a directory or file cannot be written.
    pub async fn store(
        &self,
        document: &str,
        text: &str,
        images: &[ImageArtifact],
    ) -> Result<CachedDocument> {
        let images_dir = self.images_dir(document);
        match tokio::fs::remove_dir_all(&images_dir).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        tokio::fs::create_dir_all(&images_dir).await?;

        let text_file = self.text_path(document);
        tokio::fs::write(&text_file, text).await?;

        let mut written = Vec::with_capacity(images.len());
        for image in images {
            let path = images_dir.join(image.file_name());
            tokio::fs::write(&path, &image.bytes).await?;
            written.push(path);
        }

        Ok(CachedDocument {
            name: document.to_owned(),
            text_file: Some(text_file),
            images: written,
        })
    }

    /// List cached documents with their text file (if present) and embeddable
    /// (`png`/`jpg`) images, sorted by name.
    ///
    /// # Errors
    ///
    /// Returns an error if the cache root cannot be read.
    pub fn documents(&self) -> Result<Vec<CachedDocument>> {
        let mut documents = Vec::new();
        for entry in std::fs::read_dir(&self.root)? {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            let text_file = Some(self.text_path(&name)).filter(|p| p.is_file());
            let images = embeddable_images(&self.images_dir(&name))?;
            documents.push(CachedDocument {
                name,
                text_file,
                images,
            });
        }
        documents.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(documents)
    }
}

fn embeddable_images(dir: &Path) -> Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Ok(Vec::new());
    }
    let mut images: Vec<PathBuf> = std::fs::read_dir(dir)?
        .filter_map(std::result::Result::ok)
        .map(|e| e.path())
        .filter(|p| {
            p.extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| matches!(e.to_ascii_lowercase().as_str(), "png" | "jpg" | "jpeg"))
        })
        .collect();
    images.sort();
    Ok(images)
}

#[derive(Debug, Clone)]
pub struct ExtractSummary {
    pub document: String,
    pub pages: u32,
    pub images: usize,
    pub text_file: PathBuf,
}

#[derive(Debug, Default)]
pub struct FolderExtraction {
    pub documents: Vec<ExtractSummary>,
    pub report: IngestReport,
}

/// Extract every PDF directly inside `folder` into `cache`.
///
/// Documents that fail are recorded in the report; the rest continue.
///
/// # Errors
///
/// Returns an error if `folder` is not a directory.
pub async fn extract_folder(
    registry: &ExtractorRegistry,
    folder: &Path,
    cache: &ContentCache,
) -> Result<FolderExtraction> {
    if !folder.is_dir() {
        return Err(ExtractError::Io(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("{} is not a directory", folder.display()),
        )));
    }

    let pdfs: Vec<_> = scan_knowledge_base(folder, false)?
        .into_iter()
        .filter(|d| d.format == DocumentFormat::Pdf)
        .collect();
    tracing::info!(folder = %folder.display(), count = pdfs.len(), "extracting PDFs");

    let mut out = FolderExtraction::default();
    for doc in pdfs {
        let extraction = match registry.extract(&doc).await {
            Ok(extraction) => extraction,
            Err(e) => {
                out.report.push(ItemReport::skipped(&doc.name, e));
                continue;
            }
        };

        let text = extraction
            .segments
            .iter()
            .map(|s| s.text.as_str())
            .collect::<Vec<_>>()
            .join("\n\n");
        let cached = match cache.store(&doc.name, &text, &extraction.images).await {
            Ok(cached) => cached,
            Err(e) => {
                out.report.push(ItemReport::skipped(&doc.name, e));
                continue;
            }
        };

        let pages = extraction.pages.unwrap_or(0);
        out.report.extend(extraction.skipped);
        out.report
            .push(ItemReport::ingested(&doc.name, pages as usize));
        out.documents.push(ExtractSummary {
            document: doc.name,
            pages,
            images: extraction.images.len(),
            text_file: cached.text_file.unwrap_or_default(),
        });
    }

    Ok(out)
}

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentFormat {
    PlainText,
    Pdf,
    Spreadsheet,
}

impl DocumentFormat {
    /// Map a file extension (case-insensitive) to a knowledge-base format.
    #[must_use]
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "txt" => Some(Self::PlainText),
            "pdf" => Some(Self::Pdf),
            "xlsx" | "xls" => Some(Self::Spreadsheet),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::PlainText => "text",
            Self::Pdf => "pdf",
            Self::Spreadsheet => "spreadsheet",
        }
    }
}

impl fmt::Display for DocumentFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A source file discovered in the knowledge base. Read once, never mutated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    pub path: PathBuf,
    /// File stem, used as the provenance label and cache directory name.
    pub name: String,
    pub format: DocumentFormat,
}

impl Document {
    /// Returns `None` when the extension is not a knowledge-base format.
    #[must_use]
    pub fn from_path(path: &Path) -> Option<Self> {
        let format = DocumentFormat::from_extension(path.extension()?.to_str()?)?;
        let name = path.file_stem()?.to_string_lossy().into_owned();
        Some(Self {
            path: path.to_path_buf(),
            name,
            format,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Modality {
    Text,
    Image,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    pub text: String,
    pub source_document: String,
    /// Sheet name for spreadsheets, image file name for image segments.
    pub source_detail: Option<String>,
    pub modality: Modality,
}

impl Segment {
    #[must_use]
    pub fn text(text: impl Into<String>, source_document: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            source_document: source_document.into(),
            source_detail: None,
            modality: Modality::Text,
        }
    }

    #[must_use]
    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.source_detail = Some(detail.into());
        self
    }

    #[must_use]
    pub fn with_modality(mut self, modality: Modality) -> Self {
        self.modality = modality;
        self
    }

    /// `document` or `document#detail`.
    #[must_use]
    pub fn provenance(&self) -> String {
        match &self.source_detail {
            Some(detail) => format!("{}#{detail}", self.source_document),
            None => self.source_document.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    pub text: String,
    pub parent_segment: Arc<Segment>,
    /// Position within the parent segment, starting at 0.
    pub index: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ImageKind {
    Jpeg,
    Png,
    /// Undecodable stream bytes dumped as-is.
    Raw,
}

impl ImageKind {
    #[must_use]
    pub fn extension(self) -> &'static str {
        match self {
            Self::Jpeg => "jpg",
            Self::Png => "png",
            Self::Raw => "bin",
        }
    }

    /// Whether the bytes are a container an image embedder can decode.
    #[must_use]
    pub fn is_embeddable(self) -> bool {
        matches!(self, Self::Jpeg | Self::Png)
    }
}

/// A raster image pulled out of a PDF page.
#[derive(Clone, PartialEq, Eq)]
pub struct ImageArtifact {
    /// 1-based page number.
    pub page: u32,
    /// 1-based counter across the whole document.
    pub ordinal: usize,
    pub kind: ImageKind,
    pub bytes: Vec<u8>,
}

impl ImageArtifact {
    #[must_use]
    pub fn file_name(&self) -> String {
        format!(
            "page_{}_img_{}.{}",
            self.page,
            self.ordinal,
            self.kind.extension()
        )
    }
}

impl fmt::Debug for ImageArtifact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImageArtifact")
            .field("page", &self.page)
            .field("ordinal", &self.ordinal)
            .field("kind", &self.kind)
            .field("bytes", &self.bytes.len())
            .finish()
    }
}

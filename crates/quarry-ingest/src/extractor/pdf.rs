use std::future::Future;
use std::pin::Pin;

use pdf_extract::{MediaBox, OutputDev, OutputError, Transform};

use super::{ContentExtractor, DEFAULT_MAX_FILE_SIZE, Extraction, check_size, pdf_images, run_parser};
use crate::error::{ExtractError, Result};
use crate::report::ItemReport;
use crate::types::{Document, Segment};

/// Fraction of the page height treated as header (top) and footer (bottom).
const MARGIN_BAND: f64 = 0.1;

/// Text with header/footer bands removed, plus raster images when enabled.
pub struct PdfExtractor {
    pub max_file_size: u64,
    pub extract_images: bool,
}

impl Default for PdfExtractor {
    fn default() -> Self {
        Self {
            max_file_size: DEFAULT_MAX_FILE_SIZE,
            extract_images: true,
        }
    }
}

impl ContentExtractor for PdfExtractor {
    fn extract<'a>(
        &'a self,
        document: &'a Document,
    ) -> Pin<Box<dyn Future<Output = Result<Extraction>> + Send + 'a>> {
        Box::pin(async move {
            check_size(&document.path, self.max_file_size).await?;

            let bytes = tokio::fs::read(&document.path).await?;
            let name = document.name.clone();
            let with_images = self.extract_images;
            run_parser(move || extract_pdf(&bytes, &name, with_images)).await
        })
    }

    fn supported_extensions(&self) -> &[&str] {
        &["pdf"]
    }
}

fn extract_pdf(bytes: &[u8], name: &str, with_images: bool) -> Result<Extraction> {
    let doc = lopdf::Document::load_mem(bytes).map_err(|e| ExtractError::Pdf(e.to_string()))?;
    let pages = doc.get_pages();

    let mut skipped = Vec::new();
    let mut page_texts = Vec::new();
    for &page in pages.keys() {
        let mut device = BandedText::default();
        match pdf_extract::output_doc_page(&doc, &mut device, page) {
            Ok(()) => {
                if let Some(text) = clean_page_text(&device.text) {
                    page_texts.push(text);
                }
            }
            Err(e) => {
                skipped.push(ItemReport::skipped(format!("{name} page {page}"), format!("{e:?}")));
            }
        }
    }

    let segments = if page_texts.is_empty() {
        Vec::new()
    } else {
        vec![Segment::text(page_texts.join("\n\n"), name)]
    };

    let images = if with_images {
        let (images, image_skips) = pdf_images::extract_images(&doc);
        skipped.extend(
            image_skips
                .into_iter()
                .map(|(page, reason)| ItemReport::skipped(format!("{name} page {page} image"), reason)),
        );
        images
    } else {
        Vec::new()
    };

    Ok(Extraction {
        segments,
        images,
        skipped,
        pages: Some(u32::try_from(pages.len()).unwrap_or(u32::MAX)),
    })
}

/// Drop blank lines, bare page numbers (up to three digits), and fragments shorter
/// than three characters. Returns `None` when nothing survives.
#[must_use]
pub fn clean_page_text(raw: &str) -> Option<String> {
    let lines: Vec<&str> = raw
        .lines()
        .map(str::trim)
        .filter(|line| {
            let len = line.chars().count();
            let page_number = line.chars().all(char::is_numeric) && len <= 3;
            len >= 3 && !page_number
        })
        .collect();
    (!lines.is_empty()).then(|| lines.join("\n"))
}

/// Plain-text output device that discards glyphs whose baseline falls in the top or
/// bottom margin band of the page.
struct BandedText {
    text: String,
    top: f64,
    height: f64,
    last_end: f64,
    last_y: f64,
    first_char: bool,
}

impl Default for BandedText {
    fn default() -> Self {
        Self {
            text: String::new(),
            top: 0.0,
            height: 0.0,
            last_end: 100_000.0,
            last_y: 0.0,
            first_char: false,
        }
    }
}

impl BandedText {
    fn in_body(&self, baseline: f64) -> bool {
        if self.height <= 0.0 {
            return true;
        }
        let from_top = (self.top - baseline) / self.height;
        (MARGIN_BAND..=1.0 - MARGIN_BAND).contains(&from_top)
    }
}

impl OutputDev for BandedText {
    fn begin_page(
        &mut self,
        _page_num: u32,
        media_box: &MediaBox,
        _art_box: Option<(f64, f64, f64, f64)>,
    ) -> std::result::Result<(), OutputError> {
        self.top = media_box.ury;
        self.height = media_box.ury - media_box.lly;
        Ok(())
    }

    fn end_page(&mut self) -> std::result::Result<(), OutputError> {
        Ok(())
    }

    fn output_character(
        &mut self,
        trm: &Transform,
        width: f64,
        _spacing: f64,
        font_size: f64,
        char: &str,
    ) -> std::result::Result<(), OutputError> {
        if !self.in_body(trm.m32) {
            return Ok(());
        }

        let x = trm.m31;
        let y = self.top - trm.m32;
        let size_x = font_size * trm.m11 + font_size * trm.m21;
        let size_y = font_size * trm.m12 + font_size * trm.m22;
        let size = (size_x * size_y).abs().sqrt();

        if self.first_char {
            let dy = (y - self.last_y).abs();
            if dy > size * 1.5 || (x < self.last_end && dy > size * 0.5) {
                self.text.push('\n');
            } else if x > self.last_end + size * 0.1 {
                self.text.push(' ');
            }
        }

        self.text.push_str(char);
        self.first_char = false;
        self.last_y = y;
        self.last_end = x + width * size;
        Ok(())
    }

    fn begin_word(&mut self) -> std::result::Result<(), OutputError> {
        self.first_char = true;
        Ok(())
    }

    fn end_word(&mut self) -> std::result::Result<(), OutputError> {
        Ok(())
    }

    fn end_line(&mut self) -> std::result::Result<(), OutputError> {
        Ok(())
    }
}

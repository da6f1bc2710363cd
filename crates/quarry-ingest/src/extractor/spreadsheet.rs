use std::future::Future;
use std::io::{Read, Seek};
use std::pin::Pin;

use calamine::{Data, DataType, Reader, Sheets};

use super::{ContentExtractor, DEFAULT_MAX_FILE_SIZE, Extraction, check_size, run_parser};
use crate::error::Result;
use crate::report::ItemReport;
use crate::types::{Document, Segment};

const CELL_SEPARATOR: &str = ", ";

/// One segment per worksheet; each non-empty row becomes one comma-joined line.
pub struct SpreadsheetExtractor {
    pub max_file_size: u64,
    pub skip_header: bool,
}

impl Default for SpreadsheetExtractor {
    fn default() -> Self {
        Self {
            max_file_size: DEFAULT_MAX_FILE_SIZE,
            skip_header: true,
        }
    }
}

/// A workbook whose worksheets can be read one at a time.
pub trait SheetSource {
    fn sheet_names(&self) -> Vec<String>;

    /// # Errors
    ///
    /// Returns a description of why the worksheet could not be parsed.
    fn read_rows(&mut self, sheet: &str) -> std::result::Result<Vec<Vec<Data>>, String>;
}

impl<RS: Read + Seek> SheetSource for Sheets<RS> {
    fn sheet_names(&self) -> Vec<String> {
        Reader::sheet_names(self)
    }

    fn read_rows(&mut self, sheet: &str) -> std::result::Result<Vec<Vec<Data>>, String> {
        self.worksheet_range(sheet)
            .map(|range| range.rows().map(<[Data]>::to_vec).collect())
            .map_err(|e| e.to_string())
    }
}

/// Render one cell as text.
///
/// Empty cells become `""`, floats use the shortest round-trip form (integral values
/// print without a fraction), Excel date-times print as `YYYY-MM-DD HH:MM:SS`, and cell
/// errors print their Excel text such as `#DIV/0!`.
#[must_use]
pub fn coerce_cell(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::Int(i) => i.to_string(),
        Data::Float(f) => f.to_string(),
        Data::Bool(b) => b.to_string(),
        Data::String(s) | Data::DateTimeIso(s) | Data::DurationIso(s) => s.clone(),
        Data::DateTime(dt) => cell.as_datetime().map_or_else(
            || dt.as_f64().to_string(),
            |d| d.format("%Y-%m-%d %H:%M:%S").to_string(),
        ),
        Data::Error(e) => e.to_string(),
    }
}

fn render_rows(rows: &[Vec<Data>], skip_header: bool) -> String {
    rows.iter()
        .skip(usize::from(skip_header))
        .filter(|row| row.iter().any(|c| !matches!(c, Data::Empty)))
        .map(|row| {
            row.iter()
                .map(coerce_cell)
                .collect::<Vec<_>>()
                .join(CELL_SEPARATOR)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Convert every readable worksheet to a segment; unreadable ones are reported and skipped.
pub fn sheets_to_segments<S: SheetSource + ?Sized>(
    source: &mut S,
    document: &str,
    skip_header: bool,
) -> (Vec<Segment>, Vec<ItemReport>) {
    let mut segments = Vec::new();
    let mut skipped = Vec::new();

    for sheet in source.sheet_names() {
        match source.read_rows(&sheet) {
            Ok(rows) => {
                let text = render_rows(&rows, skip_header);
                segments.push(Segment::text(text, document).with_detail(&sheet));
            }
            Err(reason) => {
                tracing::warn!(document, sheet = %sheet, %reason, "worksheet skipped");
                skipped.push(ItemReport::skipped(format!("{document}#{sheet}"), reason));
            }
        }
    }

    (segments, skipped)
}

impl ContentExtractor for SpreadsheetExtractor {
    fn extract<'a>(
        &'a self,
        document: &'a Document,
    ) -> Pin<Box<dyn Future<Output = Result<Extraction>> + Send + 'a>> {
        Box::pin(async move {
            check_size(&document.path, self.max_file_size).await?;

            let path = document.path.clone();
            let name = document.name.clone();
            let skip_header = self.skip_header;
            let (segments, skipped) = run_parser(move || {
                let mut workbook = calamine::open_workbook_auto(&path)?;
                Ok(sheets_to_segments(&mut workbook, &name, skip_header))
            })
            .await?;

            Ok(Extraction {
                segments,
                skipped,
                ..Extraction::default()
            })
        })
    }

    fn supported_extensions(&self) -> &[&str] {
        &["xlsx", "xls"]
    }
}

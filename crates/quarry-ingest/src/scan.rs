use std::path::Path;

use crate::error::Result;
use crate::types::Document;

/// Discover knowledge-base documents under `root`, sorted by path.
///
/// A missing root is created and yields no documents. Hidden files and ignore
/// rules are not applied; every `txt`, `pdf`, `xlsx`, and `xls` file counts.
///
/// # Errors
///
/// Returns an error if the missing root cannot be created.
pub fn scan_knowledge_base(root: &Path, recursive: bool) -> Result<Vec<Document>> {
    if !root.exists() {
        std::fs::create_dir_all(root)?;
        tracing::info!(root = %root.display(), "created empty knowledge base directory");
        return Ok(Vec::new());
    }

    let mut documents: Vec<Document> = ignore::WalkBuilder::new(root)
        .standard_filters(false)
        .max_depth(if recursive { None } else { Some(1) })
        .build()
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(e) => {
                tracing::warn!("scan error: {e}");
                None
            }
        })
        .filter(|e| e.file_type().is_some_and(|ft| ft.is_file()))
        .filter_map(|e| Document::from_path(e.path()))
        .collect();

    documents.sort_by(|a, b| a.path.cmp(&b.path));
    tracing::debug!(root = %root.display(), recursive, count = documents.len(), "knowledge base scanned");
    Ok(documents)
}

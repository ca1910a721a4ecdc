//! Document text extraction.
//!
//! PDFs are read page by page with `lopdf`. Plain-text documents (`.txt`,
//! `.md`) are accepted as well; a form feed (`\x0c`) starts a new page.
use lopdf::Document;
use std::fs;
use std::path::Path;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::types::Page;

/// Glyph replacements applied to extracted text.
const GLYPH_REPLACEMENTS: &[(&str, &str)] = &[
    ("(cid:127)", "-"),
    ("\u{2022}", "-"),
    ("\u{25cf}", "-"),
    ("\u{25aa}", "-"),
    ("\u{25e6}", "-"),
    ("\u{f0b7}", "-"),
    ("\u{f0a7}", "-"),
    ("\u{00a0}", " "),
    ("\u{2013}", "-"),
    ("\u{2014}", "-"),
    ("\u{2018}", "'"),
    ("\u{2019}", "'"),
    ("\u{201c}", "\""),
    ("\u{201d}", "\""),
    ("\u{2026}", "..."),
    ("\u{fb01}", "fi"),
    ("\u{fb02}", "fl"),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DocumentKind {
    Pdf,
    PlainText,
}

impl DocumentKind {
    fn detect(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "pdf" => Some(DocumentKind::Pdf),
            "txt" | "text" | "md" => Some(DocumentKind::PlainText),
            _ => None,
        }
    }
}

/// Extract the non-empty pages of the document at `path`, in page order.
pub fn extract_pages(path: &Path) -> Result<Vec<Page>> {
    let kind = DocumentKind::detect(path).ok_or_else(|| extraction_error(path, "unsupported document type"))?;
    let source_name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string());

    let raw_pages = match kind {
        DocumentKind::Pdf => read_pdf_pages(path)?,
        DocumentKind::PlainText => read_text_pages(path)?,
    };
    let total = raw_pages.len();

    let mut pages = Vec::with_capacity(total);
    for (page_number, text) in raw_pages {
        let content = normalize_text(&text);
        if content.trim().is_empty() {
            debug!(page = page_number, "skipping page without extractable text");
            continue;
        }
        pages.push(Page { content, page_number, source_name: source_name.clone() });
    }
    info!(document = %path.display(), total_pages = total, text_pages = pages.len(), "document extracted");
    Ok(pages)
}

fn read_pdf_pages(path: &Path) -> Result<Vec<(u32, String)>> {
    let document = Document::load(path).map_err(|e| extraction_error(path, e))?;
    let mut out = Vec::new();
    for page_number in document.get_pages().into_keys() {
        match document.extract_text(&[page_number]) {
            Ok(text) => out.push((page_number, text)),
            Err(e) => {
                warn!(page = page_number, error = %e, "failed to decode page text; treating page as empty");
                out.push((page_number, String::new()));
            }
        }
    }
    Ok(out)
}

fn read_text_pages(path: &Path) -> Result<Vec<(u32, String)>> {
    let bytes = fs::read(path).map_err(|e| extraction_error(path, e))?;
    let text = match String::from_utf8(bytes) {
        Ok(text) => text,
        Err(e) => String::from_utf8_lossy(e.as_bytes()).to_string(),
    };
    Ok(text
        .split('\x0c')
        .zip(1u32..)
        .map(|(page, number)| (number, page.to_string()))
        .collect())
}

/// Replace document-format artifacts with plain ASCII equivalents and drop
/// stray control characters. Line structure is preserved.
pub fn normalize_text(text: &str) -> String {
    let mut out = text.replace("\r\n", "\n").replace('\r', "\n");
    for (from, to) in GLYPH_REPLACEMENTS {
        if out.contains(from) {
            out = out.replace(from, to);
        }
    }
    out.chars()
        .filter_map(|c| match c {
            '\n' => Some('\n'),
            '\t' => Some(' '),
            c if c.is_control() => None,
            c => Some(c),
        })
        .collect()
}

fn extraction_error(path: &Path, reason: impl ToString) -> Error {
    Error::Extraction { path: path.display().to_string(), reason: reason.to_string() }
}

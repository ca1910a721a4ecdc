//! Domain types shared by extraction, chunking, indexing and answering.

use serde::{Deserialize, Serialize, Serializer};
use std::fmt;

/// Maximum number of characters of chunk text shown in a [`Source`].
pub const PREVIEW_CHARS: usize = 200;

/// Text of a single document page.
///
/// - `content`: normalized page text, never blank
/// - `page_number`: 1-based position in the source document
/// - `source_name`: file name of the document the page came from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page {
    pub content: String,
    pub page_number: u32,
    pub source_name: String,
}

/// Location metadata attached to every [`Chunk`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    pub source_page: u32,
    pub section: Option<String>,
    pub chunk_index: usize,
    pub source_name: String,
}

/// A retrieval-sized piece of document text; the unit of indexing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    pub content: String,
    pub metadata: ChunkMetadata,
}

/// One stored embedding together with the chunk it was computed from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexedVector {
    pub vector: Vec<f32>,
    pub chunk: Chunk,
}

/// A chunk returned by a similarity query.
///
/// `score` is the squared L2 distance between the query embedding and the
/// chunk embedding: lower is more similar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievedChunk {
    pub chunk: Chunk,
    pub score: f32,
}

/// Page reference shown to users; `Unknown` renders as `?`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageRef {
    Page(u32),
    Unknown,
}

impl PageRef {
    pub fn from_page(page: u32) -> Self {
        if page == 0 { PageRef::Unknown } else { PageRef::Page(page) }
    }
}

impl fmt::Display for PageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PageRef::Page(n) => write!(f, "{n}"),
            PageRef::Unknown => f.write_str("?"),
        }
    }
}

impl Serialize for PageRef {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            PageRef::Page(n) => serializer.serialize_u32(*n),
            PageRef::Unknown => serializer.serialize_str("?"),
        }
    }
}

/// Display-facing description of a retrieved chunk.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Source {
    pub page: PageRef,
    pub section: Option<String>,
    pub content_preview: String,
    pub score: f32,
}

impl Source {
    pub fn from_retrieved(retrieved: &RetrievedChunk) -> Self {
        let meta = &retrieved.chunk.metadata;
        Self {
            page: PageRef::from_page(meta.source_page),
            section: meta.section.clone(),
            content_preview: preview(&retrieved.chunk.content),
            score: retrieved.score,
        }
    }
}

/// Truncate to [`PREVIEW_CHARS`] characters, appending `...` when cut.
pub fn preview(text: &str) -> String {
    match text.char_indices().nth(PREVIEW_CHARS) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_string(),
    }
}

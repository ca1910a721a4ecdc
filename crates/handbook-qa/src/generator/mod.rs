//! Answer generation from retrieved chunks.
pub mod extractive;
pub mod generative;

use handbook_core::types::{PageRef, RetrievedChunk, Source};

pub use extractive::extractive_answer;
pub use generative::{build_prompt, generative_answer};

pub const NOT_FOUND_ANSWER: &str = "Sorry, no relevant information found in the handbook.";

const SOURCE_MARKER_PREFIX: &str = "[Source: Page ";

/// Concatenate chunk texts, each preceded by a `[Source: Page N]` marker.
pub fn build_context(chunks: &[RetrievedChunk]) -> String {
    chunks
        .iter()
        .map(|c| {
            let page = PageRef::from_page(c.chunk.metadata.source_page);
            format!("{SOURCE_MARKER_PREFIX}{page}]\n{}", c.chunk.content)
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Page number named by a context marker line; `None` for other lines and
/// for markers of unknown pages.
fn parse_marker(line: &str) -> Option<Option<u32>> {
    let rest = line.strip_prefix(SOURCE_MARKER_PREFIX)?.strip_suffix(']')?;
    Some(rest.trim().parse().ok())
}

pub fn format_sources(chunks: &[RetrievedChunk]) -> Vec<Source> {
    chunks.iter().map(Source::from_retrieved).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use handbook_core::types::{Chunk, ChunkMetadata};

    fn retrieved(page: u32, content: &str, score: f32) -> RetrievedChunk {
        RetrievedChunk {
            chunk: Chunk {
                content: content.to_string(),
                metadata: ChunkMetadata {
                    source_page: page,
                    section: None,
                    chunk_index: 0,
                    source_name: "handbook.pdf".into(),
                },
            },
            score,
        }
    }

    #[test]
    fn context_marks_each_chunk_with_its_page() {
        let ctx = build_context(&[retrieved(2, "Leave text", 0.1), retrieved(0, "Orphan", 0.2)]);
        assert_eq!(ctx, "[Source: Page 2]\nLeave text\n\n[Source: Page ?]\nOrphan");
    }

    #[test]
    fn marker_parsing() {
        assert_eq!(parse_marker("[Source: Page 12]"), Some(Some(12)));
        assert_eq!(parse_marker("[Source: Page ?]"), Some(None));
        assert_eq!(parse_marker("Page 12"), None);
    }

    #[test]
    fn sources_truncate_previews() {
        let long = "x".repeat(300);
        let sources = format_sources(&[retrieved(1, &long, 0.5)]);
        assert_eq!(sources[0].content_preview.len(), 203);
        assert_eq!(sources[0].score, 0.5);
    }
}

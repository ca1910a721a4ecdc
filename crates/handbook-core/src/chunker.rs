//! Split extracted pages into retrieval chunks.
//!
//! Two strategies are tried in order:
//! 1. numbered sections (`3. Leave Policy`): one chunk per heading, page
//!    attributed by position;
//! 2. recursive character splitting on `"\n\n"`, `"\n"`, `". "`, `" "` with a
//!    size limit and overlap, one pass per page.
use regex::Regex;
use std::ops::Range;
use tracing::{debug, info};

use crate::config::ChunkingSettings;
use crate::error::{Error, Result};
use crate::types::{Chunk, ChunkMetadata, Page};

const SEPARATORS: [&str; 4] = ["\n\n", "\n", ". ", " "];
const HEADING_PATTERN: &str = r"(?m)^[ \t]*\d+\.[ \t]+[A-Z][^\n]*$";

#[derive(Debug, Clone)]
pub struct ChunkingConfig {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub section_split: bool,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self { chunk_size: 1500, chunk_overlap: 100, section_split: true }
    }
}

impl From<&ChunkingSettings> for ChunkingConfig {
    fn from(s: &ChunkingSettings) -> Self {
        Self { chunk_size: s.chunk_size, chunk_overlap: s.chunk_overlap, section_split: s.section_split }
    }
}

/// A numbered section found in the document text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Section {
    pub heading: String,
    pub content: String,
}

pub struct Chunker {
    config: ChunkingConfig,
    heading: Regex,
}

impl Chunker {
    pub fn new(config: ChunkingConfig) -> Result<Self> {
        if config.chunk_size == 0 {
            return Err(Error::Chunking("chunk_size must be greater than zero".into()));
        }
        if config.chunk_overlap >= config.chunk_size {
            return Err(Error::Chunking(format!(
                "chunk_overlap ({}) must be smaller than chunk_size ({})",
                config.chunk_overlap, config.chunk_size
            )));
        }
        let heading = Regex::new(HEADING_PATTERN).map_err(|e| Error::Chunking(e.to_string()))?;
        Ok(Self { config, heading })
    }

    pub fn chunk_pages(&self, pages: &[Page]) -> Result<Vec<Chunk>> {
        if pages.is_empty() {
            return Ok(vec![]);
        }

        if self.config.section_split {
            let full_text = pages.iter().map(|p| p.content.as_str()).collect::<Vec<_>>().join("\n");
            let sections = self.split_sections(&full_text);
            if !sections.is_empty() {
                info!(sections = sections.len(), "chunked by numbered sections");
                return Ok(self.section_chunks(sections, pages));
            }
            debug!("no numbered headings found; falling back to recursive splitting");
        }

        let mut chunks = Vec::new();
        for page in pages {
            for content in self.split_recursive(&page.content) {
                chunks.push(Chunk {
                    content,
                    metadata: ChunkMetadata {
                        source_page: page.page_number,
                        section: None,
                        chunk_index: chunks.len(),
                        source_name: page.source_name.clone(),
                    },
                });
            }
        }

        if chunks.is_empty() && pages.iter().any(|p| !p.content.trim().is_empty()) {
            return Err(Error::Chunking("document has text but produced no chunks".into()));
        }
        info!(chunks = chunks.len(), "chunked by recursive splitting");
        Ok(chunks)
    }

    fn section_chunks(&self, sections: Vec<Section>, pages: &[Page]) -> Vec<Chunk> {
        let page_count = pages.len();
        let source_name = pages[0].source_name.clone();
        sections
            .into_iter()
            .enumerate()
            .map(|(i, section)| Chunk {
                content: section.content,
                metadata: ChunkMetadata {
                    // Sections are not tracked across page breaks; estimate by position.
                    source_page: u32::try_from((i + 1).min(page_count)).unwrap_or(u32::MAX),
                    section: Some(section.heading),
                    chunk_index: i,
                    source_name: source_name.clone(),
                },
            })
            .collect()
    }

    /// Split on numbered headings. Text before the first heading is not part
    /// of any section.
    pub fn split_sections(&self, text: &str) -> Vec<Section> {
        let starts: Vec<(usize, &str)> = self.heading.find_iter(text).map(|m| (m.start(), m.as_str())).collect();
        let mut sections = Vec::with_capacity(starts.len());
        for (i, (start, heading)) in starts.iter().enumerate() {
            let end = starts.get(i + 1).map_or(text.len(), |(next, _)| *next);
            let content = text[*start..end].trim();
            if content.is_empty() {
                continue;
            }
            sections.push(Section { heading: heading.trim().to_string(), content: content.to_string() });
        }
        if let Some((first, _)) = starts.first() {
            if !text[..*first].trim().is_empty() {
                debug!(chars = first, "dropping preamble before first numbered section");
            }
        }
        sections
    }

    /// Split `text` into chunks of at most `chunk_size` characters where each
    /// chunk starts with at least `chunk_overlap` characters of the previous
    /// one. Separators stay attached to the start of the following piece. A
    /// word longer than the chunk size is kept whole.
    pub fn split_recursive(&self, text: &str) -> Vec<String> {
        // Room for the carried tail plus one whitespace character at its cut.
        let reserve = if self.config.chunk_overlap == 0 { 0 } else { self.config.chunk_overlap + 1 };
        let limit = self.config.chunk_size.saturating_sub(reserve).max(1);
        let mut pieces = Vec::new();
        split_pieces(text, 0, &SEPARATORS, limit, &mut pieces);
        self.merge(text, &pieces)
    }

    /// Greedily join consecutive pieces into chunks. Each chunk after the
    /// first begins at the offset chosen by [`Chunker::overlap_start`].
    fn merge(&self, text: &str, pieces: &[Range<usize>]) -> Vec<String> {
        let size = self.config.chunk_size;
        let mut out = Vec::new();
        let Some(first) = pieces.first() else { return out };
        let mut start = first.start;
        let mut next = 0;
        loop {
            let mut len = char_len(&text[start..pieces[next].start]);
            let first_new = next;
            while let Some(piece) = pieces.get(next) {
                let piece_len = char_len(&text[piece.clone()]);
                if next > first_new && len + piece_len > size {
                    break;
                }
                len += piece_len;
                next += 1;
            }
            push_trimmed(&mut out, &text[start..pieces[next - 1].end]);
            if next == pieces.len() {
                return out;
            }
            start = self.overlap_start(text, pieces, start, next);
        }
    }

    /// Start of the chunk following `text[start..pieces[next].start]`. Prefers
    /// the latest piece boundary that carries at least `chunk_overlap`
    /// characters and still leaves room for the next piece; otherwise cuts
    /// the tail mid-piece.
    fn overlap_start(&self, text: &str, pieces: &[Range<usize>], start: usize, next: usize) -> usize {
        let end = pieces[next].start;
        let overlap = self.config.chunk_overlap;
        if overlap == 0 {
            return end;
        }
        let room = self.config.chunk_size.saturating_sub(char_len(&text[pieces[next].clone()]));
        for piece in pieces[..next].iter().rev() {
            if piece.start < start {
                break;
            }
            let tail = &text[piece.start..end];
            if tail.trim().chars().count() >= overlap {
                if char_len(tail) <= room {
                    return piece.start;
                }
                break;
            }
        }
        start + tail_cut(&text[start..end], overlap)
    }
}

/// Break `text` (found at byte `offset` of the page) into ranges of at most
/// `limit` characters, trying separators in order. A range with no separator
/// left to split on is kept whole.
fn split_pieces(text: &str, offset: usize, separators: &[&str], limit: usize, out: &mut Vec<Range<usize>>) {
    if text.is_empty() {
        return;
    }
    let found = separators.iter().position(|s| text.contains(s));
    let Some(i) = found.filter(|_| char_len(text) > limit) else {
        out.push(offset..offset + text.len());
        return;
    };
    for range in separator_ranges(text, separators[i]) {
        let piece = &text[range.clone()];
        if char_len(piece) <= limit {
            out.push(offset + range.start..offset + range.end);
        } else {
            split_pieces(piece, offset + range.start, &separators[i + 1..], limit, out);
        }
    }
}

/// Byte ranges between occurrences of `separator`, each occurrence opening
/// the range that follows it.
fn separator_ranges(text: &str, separator: &str) -> Vec<Range<usize>> {
    let mut ranges = Vec::new();
    let mut start = 0;
    for (idx, _) in text.match_indices(separator) {
        if idx > start {
            ranges.push(start..idx);
        }
        start = idx;
    }
    if start < text.len() {
        ranges.push(start..text.len());
    }
    ranges
}

/// Byte offset of the shortest suffix of `s` whose trimmed form holds at
/// least `overlap` characters; `0` when `s` is shorter than that.
fn tail_cut(s: &str, overlap: usize) -> usize {
    let body = s.trim_end();
    let mut count = 0;
    for (idx, ch) in body.char_indices().rev() {
        count += 1;
        if count >= overlap && !ch.is_whitespace() {
            return idx;
        }
    }
    0
}

fn char_len(s: &str) -> usize { s.chars().count() }

fn push_trimmed(out: &mut Vec<String>, chunk: &str) {
    let trimmed = chunk.trim();
    if !trimmed.is_empty() {
        out.push(trimmed.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page(n: u32, content: &str) -> Page {
        Page { content: content.to_string(), page_number: n, source_name: "handbook.pdf".into() }
    }

    fn chunker(size: usize, overlap: usize) -> Chunker {
        Chunker::new(ChunkingConfig { chunk_size: size, chunk_overlap: overlap, section_split: true }).unwrap()
    }

    fn shared_overlap(prev: &str, next: &str) -> usize {
        (1..=next.len())
            .rev()
            .find(|&k| next.is_char_boundary(k) && prev.ends_with(&next[..k]))
            .unwrap_or(0)
    }

    #[test]
    fn one_chunk_per_numbered_heading() {
        let text = "Welcome to Acme\n1. Introduction\nAbout us.\n2. Working Hours\nCore hours 10-16.\n3. Leave Policy\nEmployees get 15 days annual leave.";
        let chunks = chunker(1500, 100).chunk_pages(&[page(1, text)]).unwrap();
        assert_eq!(chunks.len(), 3);
        for (chunk, heading) in chunks.iter().zip(["1. Introduction", "2. Working Hours", "3. Leave Policy"]) {
            assert!(chunk.content.starts_with(heading), "{:?}", chunk.content);
            assert_eq!(chunk.metadata.section.as_deref(), Some(heading));
        }
        assert_eq!(chunks[2].content, "3. Leave Policy\nEmployees get 15 days annual leave.");
    }

    #[test]
    fn section_pages_are_estimated_by_position() {
        let pages = vec![page(1, "1. Alpha\na"), page(2, "2. Beta\nb\n3. Gamma\nc\n4. Delta\nd")];
        let chunks = chunker(1500, 100).chunk_pages(&pages).unwrap();
        let estimated: Vec<u32> = chunks.iter().map(|c| c.metadata.source_page).collect();
        assert_eq!(estimated, vec![1, 2, 2, 2]);
        let indices: Vec<usize> = chunks.iter().map(|c| c.metadata.chunk_index).collect();
        assert_eq!(indices, vec![0, 1, 2, 3]);
    }

    #[test]
    fn lowercase_titles_and_mid_line_numbers_are_not_headings() {
        let c = chunker(1500, 100);
        assert!(c.split_sections("1. lowercase title\nWe pay 2. Bonus twice").is_empty());
    }

    #[test]
    fn falls_back_to_recursive_split_without_headings() {
        let pages = vec![page(1, "Plain intro text."), page(2, "More plain text.")];
        let chunks = chunker(1500, 100).chunk_pages(&pages).unwrap();
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[1].metadata.source_page, 2);
        assert_eq!(chunks[1].metadata.chunk_index, 1);
        assert!(chunks.iter().all(|c| c.metadata.section.is_none()));
    }

    #[test]
    fn section_split_can_be_disabled() {
        let c = Chunker::new(ChunkingConfig { chunk_size: 1500, chunk_overlap: 0, section_split: false }).unwrap();
        let chunks = c.chunk_pages(&[page(1, "1. Alpha\na\n2. Beta\nb")]).unwrap();
        assert_eq!(chunks.len(), 1);
        assert!(chunks[0].metadata.section.is_none());
    }

    #[test]
    fn recursive_chunks_respect_size_and_overlap() {
        let text = (0..200).map(|i| format!("w{i:02}")).collect::<Vec<_>>().join(" ");
        let c = chunker(100, 20);
        let chunks = c.split_recursive(&text);
        assert!(chunks.len() > 1);
        for chunk in &chunks {
            assert!(!chunk.is_empty());
            assert!(chunk.chars().count() <= 100, "chunk too long: {}", chunk.len());
        }
        for pair in chunks.windows(2) {
            let shared = shared_overlap(&pair[0], &pair[1]);
            assert!(shared >= 20, "only {shared} chars shared between {:?} and {:?}", pair[0], pair[1]);
        }
    }

    fn assert_chunks_overlap(chunks: &[String], size: usize, overlap: usize) {
        assert!(chunks.len() > 1, "{chunks:?}");
        for chunk in chunks {
            assert!(chunk.chars().count() <= size, "chunk too long ({}): {chunk:?}", chunk.len());
        }
        for pair in chunks.windows(2) {
            let shared = shared_overlap(&pair[0], &pair[1]);
            assert!(shared >= overlap, "only {shared} chars shared between {:?} and {:?}", pair[0], pair[1]);
        }
    }

    #[test]
    fn sentence_sized_pieces_still_overlap() {
        let sentence =
            |topic: &str| format!("Employees should read the {topic} section carefully before asking their manager");
        let text = [sentence("leave"), sentence("expense"), sentence("conduct")].join(". ");
        assert_chunks_overlap(&chunker(100, 20).split_recursive(&text), 100, 20);
    }

    #[test]
    fn overlap_crosses_from_short_paragraph_into_long_one() {
        let long = (0..40).map(|i| format!("rule{i}")).collect::<Vec<_>>().join(" ");
        let text = format!("Short opening paragraph about us.\n\n{long}");
        let chunks = chunker(100, 20).split_recursive(&text);
        assert!(chunks[0].starts_with("Short opening paragraph"));
        assert_chunks_overlap(&chunks, 100, 20);
    }

    #[test]
    fn long_sentences_are_cut_with_overlap() {
        let text = format!("{}. {}", "alpha ".repeat(30).trim(), "beta ".repeat(40).trim());
        assert_chunks_overlap(&chunker(60, 15).split_recursive(&text), 60, 15);
    }

    #[test]
    fn separators_are_preserved() {
        let text = "First paragraph line one.\nLine two.\n\nSecond paragraph.";
        let chunks = chunker(40, 0).split_recursive(text);
        let rejoined = chunks.join("\n");
        for word in ["First", "Line two.", "Second paragraph."] {
            assert!(rejoined.contains(word));
        }
        assert!(chunks.iter().any(|c| c.contains("one.\nLine")), "{chunks:?}");
    }

    #[test]
    fn unsplittable_word_is_kept_whole() {
        let long = "x".repeat(50);
        let chunks = chunker(20, 5).split_recursive(&format!("ab {long} cd"));
        assert!(chunks.iter().any(|c| c.contains(&long)), "{chunks:?}");
        assert!(chunks.last().is_some_and(|c| c.ends_with("cd")));
    }

    #[test]
    fn empty_input_yields_no_chunks() {
        assert!(chunker(100, 10).chunk_pages(&[]).unwrap().is_empty());
        assert!(chunker(100, 10).split_recursive("   \n\n  ").is_empty());
    }

    #[test]
    fn rejects_overlap_not_smaller_than_size() {
        let err = Chunker::new(ChunkingConfig { chunk_size: 10, chunk_overlap: 10, section_split: true });
        assert!(matches!(err, Err(Error::Chunking(_))));
    }
}

use anyhow::Result;
use uuid::Uuid;

use crate::models::document::{Chunk, Region};

use super::parser::ParsedDocument;

#[derive(Debug, Clone)]
pub struct RawChunk {
    pub text: String,
    pub start_pos: usize,
    pub end_pos: usize,
    pub section_title: Option<String>,
}

/// Sliding char-window chunker with overlap. Section titles ride along from
/// the most recent markdown-style heading seen before the window.
pub struct TextChunker {
    chunk_size: usize,
    overlap: usize,
}

impl TextChunker {
    pub fn new(chunk_size: usize, overlap: usize) -> Self {
        Self {
            chunk_size: chunk_size.max(1),
            overlap: overlap.min(chunk_size.saturating_sub(1)),
        }
    }

    pub fn chunk(&self, text: &str) -> Result<Vec<RawChunk>> {
        let chars: Vec<char> = text.chars().collect();
        let total_len = chars.len();

        let mut chunks = Vec::new();
        if total_len == 0 {
            return Ok(chunks);
        }

        let headings = heading_positions(text);

        let mut start = 0;
        while start < total_len {
            let end = std::cmp::min(start + self.chunk_size, total_len);
            let content: String = chars[start..end].iter().collect();
            let trimmed = content.trim();

            if !trimmed.is_empty() {
                chunks.push(RawChunk {
                    text: trimmed.to_string(),
                    start_pos: start,
                    end_pos: end,
                    section_title: section_for(&headings, start),
                });
            }

            if end >= total_len {
                break;
            }
            start += self.chunk_size - self.overlap;
        }

        Ok(chunks)
    }

    /// Turn raw chunks into persisted chunk records. Region assignment needs
    /// the final count, so it happens here rather than inside the window
    /// loop.
    pub fn into_chunks(
        &self,
        document_id: Uuid,
        parsed: &ParsedDocument,
        raw: Vec<RawChunk>,
    ) -> Vec<Chunk> {
        let total = raw.len();
        raw.into_iter()
            .enumerate()
            .map(|(ordinal, rc)| Chunk {
                id: Uuid::new_v4(),
                document_id,
                ordinal,
                page: parsed.page_at(rc.start_pos),
                section_title: rc.section_title,
                region: Region::of(ordinal, total),
                text: rc.text,
            })
            .collect()
    }
}

fn heading_positions(text: &str) -> Vec<(usize, String)> {
    let mut headings = Vec::new();
    let mut offset = 0;
    for line in text.lines() {
        let line_chars = line.chars().count();
        let trimmed = line.trim_start();
        if let Some(title) = trimmed.strip_prefix('#') {
            let title = title.trim_start_matches('#').trim();
            if !title.is_empty() {
                headings.push((offset, title.to_string()));
            }
        }
        offset += line_chars + 1;
    }
    headings
}

fn section_for(headings: &[(usize, String)], pos: usize) -> Option<String> {
    headings
        .iter()
        .take_while(|(at, _)| *at <= pos)
        .last()
        .map(|(_, title)| title.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::parser::ParsedDocument;
    use crate::models::document::Region;

    fn unpaged(content: &str) -> ParsedDocument {
        ParsedDocument {
            content: content.to_string(),
            page_offsets: Vec::new(),
            page_count: None,
        }
    }

    #[test]
    fn windows_cover_whole_text_with_overlap() {
        let chunker = TextChunker::new(10, 2);
        let text = "abcdefghijklmnopqrstuvwxyz";
        let chunks = chunker.chunk(text).unwrap();

        assert!(chunks.len() > 1);
        assert_eq!(chunks[0].start_pos, 0);
        // Consecutive windows share `overlap` chars
        assert_eq!(chunks[1].start_pos, 8);
        assert_eq!(chunks.last().unwrap().end_pos, text.len());
    }

    #[test]
    fn empty_input_produces_no_chunks() {
        let chunker = TextChunker::new(100, 10);
        assert!(chunker.chunk("").unwrap().is_empty());
        assert!(chunker.chunk("   \n  ").unwrap().is_empty());
    }

    #[test]
    fn section_titles_follow_headings() {
        let chunker = TextChunker::new(40, 0);
        let text = "# Introduction\nsome intro text here\n# Methods\nmethod details follow here";
        let chunks = chunker.chunk(text).unwrap();

        assert_eq!(chunks[0].section_title.as_deref(), Some("Introduction"));
        assert_eq!(
            chunks.last().unwrap().section_title.as_deref(),
            Some("Methods")
        );
    }

    #[test]
    fn regions_assigned_by_final_ordinal() {
        let chunker = TextChunker::new(5, 0);
        let text = "aaaaabbbbbcccccdddddeeeeefffff"; // 6 chunks
        let raw = chunker.chunk(text).unwrap();
        assert_eq!(raw.len(), 6);

        let doc_id = Uuid::new_v4();
        let chunks = chunker.into_chunks(doc_id, &unpaged(text), raw);
        assert_eq!(chunks[0].region, Region::Intro);
        assert_eq!(chunks[1].region, Region::Intro);
        assert_eq!(chunks[2].region, Region::Middle);
        assert_eq!(chunks[3].region, Region::Middle);
        assert_eq!(chunks[4].region, Region::Conclusion);
        assert_eq!(chunks[5].region, Region::Conclusion);
        for (i, c) in chunks.iter().enumerate() {
            assert_eq!(c.ordinal, i);
            assert_eq!(c.document_id, doc_id);
        }
    }
}

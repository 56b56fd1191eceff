use anyhow::Result;

use crate::models::document::DocumentType;

#[derive(Debug)]
pub struct ParsedDocument {
    pub content: String,
    /// Char offset where each page starts; empty for unpaginated sources.
    pub page_offsets: Vec<usize>,
    pub page_count: Option<usize>,
}

impl ParsedDocument {
    /// Page containing the given char offset (1-based), when pagination is
    /// known.
    pub fn page_at(&self, offset: usize) -> Option<u32> {
        if self.page_offsets.is_empty() {
            return None;
        }
        let idx = match self.page_offsets.binary_search(&offset) {
            Ok(i) => i,
            Err(0) => 0,
            Err(i) => i - 1,
        };
        Some((idx + 1) as u32)
    }
}

pub struct DocumentParser;

impl DocumentParser {
    /// Extract plain text from raw upload bytes. CPU-bound; callers run this
    /// on a blocking worker.
    pub fn parse(data: &[u8], doc_type: DocumentType) -> Result<ParsedDocument> {
        match doc_type {
            DocumentType::Pdf => Self::parse_pdf(data),
            DocumentType::Docx => Self::parse_docx(data),
            DocumentType::Txt => Self::parse_text(data),
        }
    }

    fn parse_pdf(data: &[u8]) -> Result<ParsedDocument> {
        use lopdf::Document;

        let doc = Document::load_mem(data)?;
        let page_count = doc.get_pages().len();

        let mut content = String::new();
        let mut page_offsets = Vec::with_capacity(page_count);

        for page_num in 1..=page_count {
            page_offsets.push(content.chars().count());
            if let Ok(text) = doc.extract_text(&[page_num as u32]) {
                content.push_str(&text);
                content.push('\n');
            }
        }

        Ok(ParsedDocument {
            content,
            page_offsets,
            page_count: Some(page_count),
        })
    }

    fn parse_docx(data: &[u8]) -> Result<ParsedDocument> {
        use docx_rs::{read_docx, DocumentChild, ParagraphChild, RunChild};

        let docx = read_docx(data)?;

        let mut content = String::new();

        for child in docx.document.children {
            if let DocumentChild::Paragraph(para) = child {
                for child in para.children {
                    if let ParagraphChild::Run(run) = child {
                        for child in run.children {
                            if let RunChild::Text(text) = child {
                                content.push_str(&text.text);
                            }
                        }
                    }
                }
                content.push('\n');
            }
        }

        Ok(ParsedDocument {
            content,
            page_offsets: Vec::new(),
            page_count: None,
        })
    }

    fn parse_text(data: &[u8]) -> Result<ParsedDocument> {
        // UTF-8 with a lossy fallback through encoding detection; text
        // uploads are frequently latin-1 in the wild.
        let content = match std::str::from_utf8(data) {
            Ok(s) => s.to_string(),
            Err(_) => {
                let (decoded, _, _) = encoding_rs::WINDOWS_1252.decode(data);
                decoded.into_owned()
            }
        };

        Ok(ParsedDocument {
            content,
            page_offsets: Vec::new(),
            page_count: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_plain_utf8_text() {
        let parsed = DocumentParser::parse("hello world".as_bytes(), DocumentType::Txt).unwrap();
        assert_eq!(parsed.content, "hello world");
        assert_eq!(parsed.page_count, None);
        assert_eq!(parsed.page_at(3), None);
    }

    #[test]
    fn parses_latin1_text() {
        // "café" in windows-1252
        let bytes = [0x63, 0x61, 0x66, 0xE9];
        let parsed = DocumentParser::parse(&bytes, DocumentType::Txt).unwrap();
        assert_eq!(parsed.content, "café");
    }

    #[test]
    fn page_at_maps_offsets() {
        let parsed = ParsedDocument {
            content: String::new(),
            page_offsets: vec![0, 100, 250],
            page_count: Some(3),
        };
        assert_eq!(parsed.page_at(0), Some(1));
        assert_eq!(parsed.page_at(99), Some(1));
        assert_eq!(parsed.page_at(100), Some(2));
        assert_eq!(parsed.page_at(251), Some(3));
    }
}

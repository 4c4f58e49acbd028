//! A minimal line-window `Parser`, used when no language-aware parser is
//! supplied. Concrete parsing is a pluggable collaborator, not something
//! this workspace owns — this exists so the service and CLI are runnable
//! end to end without one.

use chunk_model::hash::sha256_hex;
use chunk_model::{Chunk, ChunkKind};
use index_manager::{ParseOutcome, ParseResult, Parser};

pub struct LineWindowParser {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
}

impl Default for LineWindowParser {
    fn default() -> Self {
        Self { chunk_size: 400, chunk_overlap: 50 }
    }
}

fn language_for(path: &str) -> &'static str {
    match path.rsplit('.').next() {
        Some("rs") => "rust",
        Some("swift") => "swift",
        Some("py") => "python",
        Some("ts") | Some("tsx") => "typescript",
        Some("js") | Some("jsx") => "javascript",
        Some("go") => "go",
        _ => "text",
    }
}

impl Parser for LineWindowParser {
    fn parse(&self, content: &[u8], path: &str, file_hash: &str) -> ParseResult {
        let Ok(text) = std::str::from_utf8(content) else {
            return ParseResult::failure();
        };
        if text.trim().is_empty() {
            return ParseResult { chunks: Vec::new(), snippets: Vec::new(), outcome: Some(ParseOutcome::Success) };
        }

        let lines: Vec<&str> = text.lines().collect();
        let step = self.chunk_size.saturating_sub(self.chunk_overlap).max(1);
        let language = language_for(path);

        let mut chunks = Vec::new();
        let mut start = 0usize;
        while start < lines.len() {
            let end = (start + self.chunk_size).min(lines.len());
            let body = lines[start..end].join("\n");
            let content_hash = sha256_hex(body.as_bytes());
            let id = format!("{path}:{}-{}:{}", start + 1, end, &content_hash[..16]);
            chunks.push(Chunk::new(id, path, body, (start + 1) as u32, end as u32, ChunkKind::Other, language, file_hash, content_hash));
            if end == lines.len() {
                break;
            }
            start += step;
        }

        ParseResult { chunks, snippets: Vec::new(), outcome: Some(ParseOutcome::Success) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_long_content_into_overlapping_windows() {
        let parser = LineWindowParser { chunk_size: 3, chunk_overlap: 1 };
        let content = "a\nb\nc\nd\ne\n";
        let result = parser.parse(content.as_bytes(), "f.rs", "fh");
        assert!(result.chunks.len() >= 2);
        assert_eq!(result.outcome, Some(ParseOutcome::Success));
    }

    #[test]
    fn empty_file_yields_no_chunks() {
        let parser = LineWindowParser::default();
        let result = parser.parse(b"   \n", "f.rs", "fh");
        assert!(result.chunks.is_empty());
    }

    #[test]
    fn invalid_utf8_reports_failure() {
        let parser = LineWindowParser::default();
        let result = parser.parse(&[0xff, 0xfe, 0x00], "f.bin", "fh");
        assert_eq!(result.outcome, Some(ParseOutcome::Failure));
    }
}

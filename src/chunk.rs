//! Recursive character text splitter.
//!
//! Splits text into chunks of at most `chunk_size` characters, with up to
//! `chunk_overlap` characters carried over between neighbouring chunks.
//! Separators are tried coarsest first (`"\n\n"`, `"\n"`, `" "`, `""`);
//! a piece that is still too long is split again with the next separator.
//! Separators stay attached to the start of the piece that follows them.
//!
//! Lengths are counted in characters, not bytes.
//!
//! # Example
//!
//! ```rust
//! use docchat::chunk::TextSplitter;
//!
//! let splitter = TextSplitter::new(800, 200);
//! let pieces = splitter.split_text("Hello world.\n\nSecond paragraph.");
//! assert_eq!(pieces, vec!["Hello world.\n\nSecond paragraph."]);
//! ```

use sha2::{Digest, Sha256};
use std::collections::VecDeque;

use crate::config::ChunkingConfig;
use crate::models::{Chunk, Document};

const DEFAULT_SEPARATORS: [&str; 4] = ["\n\n", "\n", " ", ""];

#[derive(Debug, Clone)]
pub struct TextSplitter {
    chunk_size: usize,
    chunk_overlap: usize,
    separators: Vec<String>,
}

impl TextSplitter {
    /// # Panics
    ///
    /// If `chunk_overlap >= chunk_size`; config validation rejects that.
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Self {
        assert!(
            chunk_overlap < chunk_size,
            "chunk_overlap ({}) must be smaller than chunk_size ({})",
            chunk_overlap,
            chunk_size
        );
        Self {
            chunk_size,
            chunk_overlap,
            separators: DEFAULT_SEPARATORS.iter().map(|s| s.to_string()).collect(),
        }
    }

    pub fn from_config(config: &ChunkingConfig) -> Self {
        Self::new(config.chunk_size, config.chunk_overlap)
    }

    pub fn split_text(&self, text: &str) -> Vec<String> {
        self.split_recursive(text, &self.separators)
    }

    /// Splits every document and numbers the chunks contiguously from 0.
    pub fn split_documents(&self, documents: &[Document]) -> Vec<Chunk> {
        let mut chunks = Vec::new();
        for doc in documents {
            for text in self.split_text(&doc.page_content) {
                chunks.push(make_chunk(chunks.len() as i64, text, doc));
            }
        }
        chunks
    }

    fn split_recursive(&self, text: &str, separators: &[String]) -> Vec<String> {
        let mut separator = separators.last().map(String::as_str).unwrap_or("");
        let mut remaining: &[String] = &[];
        for (i, sep) in separators.iter().enumerate() {
            if sep.is_empty() {
                separator = "";
                break;
            }
            if text.contains(sep.as_str()) {
                separator = sep.as_str();
                remaining = &separators[i + 1..];
                break;
            }
        }

        let mut finished = Vec::new();
        let mut good: Vec<&str> = Vec::new();
        for piece in split_keeping_separator(text, separator) {
            if char_len(piece) < self.chunk_size {
                good.push(piece);
                continue;
            }
            if !good.is_empty() {
                finished.extend(self.merge(&good));
                good.clear();
            }
            if remaining.is_empty() {
                finished.push(piece.to_string());
            } else {
                finished.extend(self.split_recursive(piece, remaining));
            }
        }
        if !good.is_empty() {
            finished.extend(self.merge(&good));
        }
        finished
    }

    /// Greedily packs pieces into chunks, then drops pieces from the front
    /// until at most `chunk_overlap` characters remain for the next chunk.
    fn merge(&self, pieces: &[&str]) -> Vec<String> {
        let mut out = Vec::new();
        let mut window: VecDeque<(&str, usize)> = VecDeque::new();
        let mut total = 0usize;

        for &piece in pieces {
            let len = char_len(piece);
            if total + len > self.chunk_size {
                if total > self.chunk_size {
                    tracing::debug!(
                        size = total,
                        chunk_size = self.chunk_size,
                        "created a chunk longer than chunk_size"
                    );
                }
                if !window.is_empty() {
                    push_joined(&mut out, &window);
                    while total > self.chunk_overlap
                        || (total + len > self.chunk_size && total > 0)
                    {
                        match window.pop_front() {
                            Some((_, front_len)) => total -= front_len,
                            None => break,
                        }
                    }
                }
            }
            window.push_back((piece, len));
            total += len;
        }
        if !window.is_empty() {
            push_joined(&mut out, &window);
        }
        out
    }
}

fn push_joined(out: &mut Vec<String>, window: &VecDeque<(&str, usize)>) {
    let joined: String = window.iter().map(|(s, _)| *s).collect();
    let trimmed = joined.trim();
    if !trimmed.is_empty() {
        out.push(trimmed.to_string());
    }
}

/// Splits on `separator`, keeping each separator at the start of the piece
/// that follows it. Empty pieces are dropped. An empty separator splits
/// into characters.
fn split_keeping_separator<'a>(text: &'a str, separator: &str) -> Vec<&'a str> {
    if separator.is_empty() {
        return text
            .char_indices()
            .map(|(i, c)| &text[i..i + c.len_utf8()])
            .collect();
    }
    let mut pieces = Vec::new();
    let mut start = 0;
    for (idx, _) in text.match_indices(separator) {
        pieces.push(&text[start..idx]);
        start = idx;
    }
    pieces.push(&text[start..]);
    pieces.retain(|p| !p.is_empty());
    pieces
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

fn make_chunk(index: i64, text: String, doc: &Document) -> Chunk {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    let hash = format!("{:x}", hasher.finalize());

    Chunk {
        index,
        text,
        hash,
        source: doc.source.clone(),
        row: doc.row,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn paragraph(n: usize) -> String {
        (0..40)
            .map(|i| format!("word{}_{}", n, i))
            .collect::<Vec<_>>()
            .join(" ")
    }

    #[test]
    fn small_text_is_one_chunk() {
        let splitter = TextSplitter::new(800, 200);
        assert_eq!(splitter.split_text("Hello, world!"), vec!["Hello, world!"]);
    }

    #[test]
    fn empty_text_has_no_chunks() {
        let splitter = TextSplitter::new(800, 200);
        assert!(splitter.split_text("").is_empty());
        assert!(splitter.split_text("  \n\n  ").is_empty());
    }

    #[test]
    fn chunks_respect_size_limit() {
        let text = (0..30).map(paragraph).collect::<Vec<_>>().join("\n\n");
        let splitter = TextSplitter::new(800, 200);
        let chunks = splitter.split_text(&text);
        assert!(chunks.len() > 1);
        for c in &chunks {
            assert!(char_len(c) <= 800, "chunk of {} chars", char_len(c));
        }
    }

    #[test]
    fn neighbouring_chunks_overlap() {
        // One long line of words: forces splitting on spaces with overlap.
        let text = (0..400)
            .map(|i| format!("w{:03}", i))
            .collect::<Vec<_>>()
            .join(" ");
        let splitter = TextSplitter::new(100, 30);
        let chunks = splitter.split_text(&text);
        assert!(chunks.len() > 2);
        for pair in chunks.windows(2) {
            let last_word = pair[0].split(' ').last().unwrap();
            assert!(
                pair[1].contains(last_word),
                "expected '{}' to carry over into {:?}",
                last_word,
                pair[1]
            );
        }
    }

    #[test]
    fn unbroken_text_falls_back_to_characters() {
        let text = "x".repeat(250);
        let splitter = TextSplitter::new(100, 20);
        let chunks = splitter.split_text(&text);
        assert!(chunks.iter().all(|c| char_len(c) <= 100));
        assert!(chunks.len() >= 3);
    }

    #[test]
    fn counts_characters_not_bytes() {
        let text = "é".repeat(90);
        let splitter = TextSplitter::new(100, 10);
        assert_eq!(splitter.split_text(&text).len(), 1);
    }

    #[test]
    fn separator_stays_with_following_piece() {
        assert_eq!(
            split_keeping_separator("a\n\nb\n\nc", "\n\n"),
            vec!["a", "\n\nb", "\n\nc"]
        );
        assert_eq!(split_keeping_separator("\n\na", "\n\n"), vec!["\n\na"]);
    }

    #[test]
    fn documents_get_contiguous_indices_and_hashes() {
        let docs = vec![
            Document::new((0..10).map(paragraph).collect::<Vec<_>>().join("\n\n"), "a.txt"),
            Document::new("short", "b.txt"),
        ];
        let splitter = TextSplitter::new(300, 50);
        let chunks = splitter.split_documents(&docs);
        for (i, c) in chunks.iter().enumerate() {
            assert_eq!(c.index, i as i64);
            assert_eq!(c.hash.len(), 64);
        }
        assert_eq!(chunks.last().unwrap().source, "b.txt");
        assert!(chunks.iter().all(|c| c.row.is_none()));
    }

    #[test]
    fn csv_rows_carry_into_chunks() {
        let docs = vec![
            Document::new("name: Ada", "people.csv").with_row(0),
            Document::new("name: Grace", "people.csv").with_row(1),
        ];
        let chunks = TextSplitter::new(800, 200).split_documents(&docs);
        assert_eq!(
            chunks.iter().map(|c| c.row).collect::<Vec<_>>(),
            vec![Some(0), Some(1)]
        );
    }

    #[test]
    fn deterministic() {
        let text = (0..12).map(paragraph).collect::<Vec<_>>().join("\n\n");
        let splitter = TextSplitter::new(200, 40);
        assert_eq!(splitter.split_text(&text), splitter.split_text(&text));
    }
}

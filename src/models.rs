//! Core data models shared by extraction, chunking and retrieval.

use serde::Serialize;
use std::fmt;
use std::str::FromStr;

/// Kinds of upload the pipeline knows how to turn into text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FileType {
    Pdf,
    Docx,
    Txt,
    Csv,
    /// The upload holds a URL; the page behind it is fetched on indexing.
    Url,
}

impl FileType {
    pub fn as_str(&self) -> &'static str {
        match self {
            FileType::Pdf => "pdf",
            FileType::Docx => "docx",
            FileType::Txt => "txt",
            FileType::Csv => "csv",
            FileType::Url => "url",
        }
    }

    /// Canonical extension, with the leading dot.
    pub fn extension(&self) -> &'static str {
        match self {
            FileType::Pdf => ".pdf",
            FileType::Docx => ".docx",
            FileType::Txt => ".txt",
            FileType::Csv => ".csv",
            FileType::Url => ".url",
        }
    }

    /// Infers the type from a file name's extension (case-insensitive).
    pub fn from_name(name: &str) -> Option<Self> {
        let (_, ext) = crate::file_store::split_extension(name);
        match ext.to_ascii_lowercase().as_str() {
            ".pdf" => Some(FileType::Pdf),
            ".docx" => Some(FileType::Docx),
            ".txt" | ".md" | ".text" => Some(FileType::Txt),
            ".csv" => Some(FileType::Csv),
            ".url" => Some(FileType::Url),
            _ => None,
        }
    }
}

impl fmt::Display for FileType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FileType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pdf" => Ok(FileType::Pdf),
            "docx" => Ok(FileType::Docx),
            "txt" | "text" => Ok(FileType::Txt),
            "csv" => Ok(FileType::Csv),
            "url" => Ok(FileType::Url),
            other => anyhow::bail!(
                "unsupported file type: '{}' (expected pdf, docx, txt, url, or csv)",
                other
            ),
        }
    }
}

/// A unit of extracted text with where it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub page_content: String,
    pub source: String,
    /// Zero-based data row, for CSV documents.
    pub row: Option<usize>,
}

impl Document {
    pub fn new(page_content: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            page_content: page_content.into(),
            source: source.into(),
            row: None,
        }
    }

    pub fn with_row(mut self, row: usize) -> Self {
        self.row = Some(row);
        self
    }
}

/// A span of a document's text, ready to embed.
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    pub index: i64,
    pub text: String,
    /// SHA-256 of `text`; the vector index de-duplicates on it.
    pub hash: String,
    pub source: String,
    /// Data row of the CSV document the chunk came from.
    pub row: Option<usize>,
}

/// A retrieved chunk and its cosine similarity to the query.
#[derive(Debug, Clone, Serialize)]
pub struct ScoredChunk {
    pub text: String,
    pub source: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub row: Option<usize>,
    pub score: f32,
}

//! Text extraction and chunking for uploaded documents.
//!
//! # Supported formats
//!
//! - PDF (by `application/pdf` content type or a `%PDF` magic prefix), via `pdf-extract`
//! - Plain text: `text/*` content types and `.txt` / `.md` files
//!
//! # Chunking
//!
//! Extracted text is whitespace-normalised and cut into fixed-size character
//! windows. Consecutive windows share `chunk_overlap` characters so that a
//! sentence split at a window edge still appears whole in one of them.

use std::time::Duration;

use bytes::Bytes;
use thiserror::Error;
use tiktoken_rs::{CoreBPE, cl100k_base};
use tracing::{debug, instrument};

use crate::config::ProcessingConfig;

#[derive(Debug, Error)]
pub enum DocumentProcessorError {
    #[error("Unsupported file type: {0}")]
    UnsupportedFormat(String),

    #[error("File too large: {size} bytes (max: {max} bytes)")]
    FileTooLarge { size: usize, max: usize },

    #[error("Invalid UTF-8 content")]
    InvalidUtf8,

    #[error("Document extraction failed: {0}")]
    Extraction(String),

    #[error("Document extraction timed out after {0} seconds")]
    Timeout(u64),

    #[error("Document contains no extractable text")]
    NoText,

    #[error("Tokenization error: {0}")]
    Tokenization(String),
}

/// A window of document text.
#[derive(Debug, Clone, PartialEq)]
pub struct TextChunk {
    pub content: String,
    /// Position in the chunk sequence, starting at 0.
    pub index: usize,
    /// Character offset (not byte offset) into the normalised text.
    pub char_start: usize,
    pub char_end: usize,
    /// `cl100k_base` token count.
    pub token_count: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DocumentKind {
    Pdf,
    PlainText,
}

pub struct DocumentProcessor {
    config: ProcessingConfig,
    tokenizer: CoreBPE,
}

impl DocumentProcessor {
    pub fn new(config: ProcessingConfig) -> Result<Self, DocumentProcessorError> {
        let tokenizer =
            cl100k_base().map_err(|e| DocumentProcessorError::Tokenization(e.to_string()))?;
        Ok(Self { config, tokenizer })
    }

    /// Extract plain text from a document body.
    ///
    /// PDF parsing is CPU-bound and runs on the blocking pool under
    /// `extraction_timeout_secs`.
    #[instrument(skip(self, data), fields(size = data.len()))]
    pub async fn extract_text(
        &self,
        data: Bytes,
        filename: &str,
        content_type: Option<&str>,
    ) -> Result<String, DocumentProcessorError> {
        if data.len() > self.config.max_file_size_bytes {
            return Err(DocumentProcessorError::FileTooLarge {
                size: data.len(),
                max: self.config.max_file_size_bytes,
            });
        }

        let text = match detect_kind(&data, filename, content_type)? {
            DocumentKind::PlainText => {
                String::from_utf8(data.to_vec()).map_err(|_| DocumentProcessorError::InvalidUtf8)?
            }
            DocumentKind::Pdf => {
                let timeout_secs = self.config.extraction_timeout_secs;
                let task = tokio::task::spawn_blocking(move || {
                    pdf_extract::extract_text_from_mem(&data)
                });
                match tokio::time::timeout(Duration::from_secs(timeout_secs), task).await {
                    Ok(Ok(Ok(text))) => text,
                    Ok(Ok(Err(e))) => return Err(DocumentProcessorError::Extraction(e.to_string())),
                    // pdf-extract panics on some malformed files
                    Ok(Err(join_err)) => {
                        return Err(DocumentProcessorError::Extraction(join_err.to_string()));
                    }
                    Err(_) => return Err(DocumentProcessorError::Timeout(timeout_secs)),
                }
            }
        };

        if text.trim().is_empty() {
            return Err(DocumentProcessorError::NoText);
        }

        debug!(chars = text.len(), "Extracted document text");
        Ok(text)
    }

    /// Split text into overlapping fixed-size character windows.
    pub fn chunk_text(&self, text: &str) -> Vec<TextChunk> {
        let normalized = normalize_whitespace(text);
        let chars: Vec<char> = normalized.chars().collect();
        if chars.is_empty() {
            return Vec::new();
        }

        let size = self.config.chunk_size;
        // Validated at config load: overlap < size, so step >= 1.
        let step = size.saturating_sub(self.config.chunk_overlap).max(1);

        let mut chunks = Vec::new();
        let mut start = 0;
        loop {
            let end = (start + size).min(chars.len());
            let content: String = chars[start..end].iter().collect();
            chunks.push(TextChunk {
                token_count: self.count_tokens(&content),
                content,
                index: chunks.len(),
                char_start: start,
                char_end: end,
            });
            if end == chars.len() {
                break;
            }
            start += step;
        }

        chunks
    }

    pub fn count_tokens(&self, text: &str) -> usize {
        self.tokenizer.encode_with_special_tokens(text).len()
    }
}

fn detect_kind(
    data: &[u8],
    filename: &str,
    content_type: Option<&str>,
) -> Result<DocumentKind, DocumentProcessorError> {
    let content_type = content_type.map(|ct| ct.to_ascii_lowercase());
    let extension = get_file_extension(filename);

    if data.starts_with(b"%PDF") || content_type.as_deref() == Some("application/pdf") {
        return Ok(DocumentKind::Pdf);
    }
    if content_type.as_deref().is_some_and(|ct| ct.starts_with("text/"))
        || matches!(extension.as_str(), "txt" | "md" | "markdown")
    {
        return Ok(DocumentKind::PlainText);
    }
    if extension == "pdf" {
        return Ok(DocumentKind::Pdf);
    }

    Err(DocumentProcessorError::UnsupportedFormat(
        content_type.unwrap_or_else(|| format!(".{extension}")),
    ))
}

fn get_file_extension(filename: &str) -> String {
    match filename.rsplit_once('.') {
        Some((_, ext)) => ext.to_lowercase(),
        None => String::new(),
    }
}

fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

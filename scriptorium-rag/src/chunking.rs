//! Document chunking strategies.
//!
//! This module provides the [`Chunker`] trait and two implementations:
//!
//! - [`FixedSizeChunker`] - splits by character count with configurable overlap
//! - [`RecursiveChunker`] - splits hierarchically by paragraphs, sentences, then words
//!
//! Both are deterministic: the same text always yields the same chunks with
//! the same IDs. Sizes are measured in characters, never bytes, so
//! multi-byte text is never cut inside a code point.

use crate::document::Chunk;

/// A strategy for splitting document text into chunks.
///
/// Implementations produce [`Chunk`]s without embeddings; those are written
/// later, once the compute worker answers.
pub trait Chunker: Send + Sync {
    /// Split `text` belonging to `document_id` into ordered chunks.
    ///
    /// Returns an empty `Vec` if the text is empty or whitespace.
    fn chunk(&self, document_id: &str, text: &str) -> Vec<Chunk>;
}

fn into_chunks(document_id: &str, pieces: Vec<String>) -> Vec<Chunk> {
    pieces
        .into_iter()
        .filter(|piece| !piece.trim().is_empty())
        .enumerate()
        .map(|(index, content)| Chunk {
            id: Chunk::chunk_id(document_id, index),
            document_id: document_id.to_string(),
            content,
            embedding: None,
        })
        .collect()
}

/// Splits text into fixed-size chunks by character count with configurable overlap.
///
/// # Example
///
/// ```rust,ignore
/// use scriptorium_rag::FixedSizeChunker;
///
/// let chunker = FixedSizeChunker::new(256, 50);
/// let chunks = chunker.chunk(&document.id, &text);
/// ```
#[derive(Debug, Clone)]
pub struct FixedSizeChunker {
    chunk_size: usize,
    chunk_overlap: usize,
}

impl FixedSizeChunker {
    /// Create a new `FixedSizeChunker`.
    ///
    /// # Arguments
    ///
    /// * `chunk_size` - maximum number of characters per chunk
    /// * `chunk_overlap` - number of overlapping characters between consecutive chunks
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Self {
        Self { chunk_size, chunk_overlap }
    }
}

impl Chunker for FixedSizeChunker {
    fn chunk(&self, document_id: &str, text: &str) -> Vec<Chunk> {
        into_chunks(document_id, split_by_size(text, self.chunk_size, self.chunk_overlap))
    }
}

/// Splits text hierarchically: paragraphs → sentences → words.
///
/// First splits by paragraph separators (`\n\n`). If a paragraph exceeds
/// `chunk_size`, splits by sentence boundaries (`. `, `! `, `? `). If a
/// sentence still exceeds `chunk_size`, splits by word boundaries, and
/// finally by character count with overlap.
#[derive(Debug, Clone)]
pub struct RecursiveChunker {
    chunk_size: usize,
    chunk_overlap: usize,
}

impl RecursiveChunker {
    /// Create a new `RecursiveChunker`.
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Self {
        Self { chunk_size, chunk_overlap }
    }
}

impl Chunker for RecursiveChunker {
    fn chunk(&self, document_id: &str, text: &str) -> Vec<Chunk> {
        if text.trim().is_empty() {
            return Vec::new();
        }
        let separators = ["\n\n", ". ", "! ", "? ", " "];
        let pieces = split_and_merge(text, self.chunk_size, self.chunk_overlap, &separators);
        into_chunks(document_id, pieces)
    }
}

fn char_len(text: &str) -> usize {
    text.chars().count()
}

/// Split text by a separator, then merge segments into chunks that respect
/// `chunk_size`. If a segment exceeds `chunk_size`, it is split further
/// using the next-level separator.
fn split_and_merge(
    text: &str,
    chunk_size: usize,
    chunk_overlap: usize,
    separators: &[&str],
) -> Vec<String> {
    if char_len(text) <= chunk_size || separators.is_empty() {
        return split_by_size(text, chunk_size, chunk_overlap);
    }

    let separator = separators[0];
    let remaining_separators = &separators[1..];
    let segments = split_keeping_separator(text, separator);

    let mut chunks = Vec::new();
    let mut current = String::new();

    for segment in segments {
        if current.is_empty() {
            current = segment.to_string();
        } else if char_len(&current) + char_len(segment) <= chunk_size {
            current.push_str(segment);
        } else {
            flush(&mut chunks, &current, chunk_size, chunk_overlap, remaining_separators);
            current = segment.to_string();
        }
    }

    if !current.is_empty() {
        flush(&mut chunks, &current, chunk_size, chunk_overlap, remaining_separators);
    }

    chunks
}

fn flush(
    chunks: &mut Vec<String>,
    current: &str,
    chunk_size: usize,
    chunk_overlap: usize,
    separators: &[&str],
) {
    if char_len(current) > chunk_size {
        chunks.extend(split_and_merge(current, chunk_size, chunk_overlap, separators));
    } else {
        chunks.push(current.to_string());
    }
}

/// Split text at a separator while keeping the separator attached to the preceding segment.
fn split_keeping_separator<'a>(text: &'a str, separator: &str) -> Vec<&'a str> {
    let mut result = Vec::new();
    let mut start = 0;

    while let Some(pos) = text[start..].find(separator) {
        let end = start + pos + separator.len();
        result.push(&text[start..end]);
        start = end;
    }

    if start < text.len() {
        result.push(&text[start..]);
    }

    result
}

/// Character-based splitting with overlap.
fn split_by_size(text: &str, chunk_size: usize, chunk_overlap: usize) -> Vec<String> {
    if text.is_empty() || chunk_size == 0 {
        return Vec::new();
    }

    let chars: Vec<char> = text.chars().collect();
    let step = chunk_size.saturating_sub(chunk_overlap).max(1);
    let mut chunks = Vec::new();
    let mut start = 0;

    while start < chars.len() {
        let end = (start + chunk_size).min(chars.len());
        chunks.push(chars[start..end].iter().collect());
        if end == chars.len() {
            break;
        }
        start += step;
    }

    chunks
}

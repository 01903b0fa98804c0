//! Paragraph- and sentence-aware text chunking

use unicode_segmentation::UnicodeSegmentation;

use crate::types::{Chunk, SourceFile};

/// Text chunker with a target size in characters
///
/// Paragraphs are packed into chunks until the next one would overflow the
/// target; paragraphs longer than the target are packed sentence by sentence.
/// A chunk only exceeds the target when it is a single sentence that is
/// itself longer than the target.
#[derive(Debug, Clone)]
pub struct TextChunker {
    /// Target chunk size in characters
    chunk_size: usize,
    /// Configured overlap; chunk boundaries never overlap
    overlap: usize,
}

impl TextChunker {
    /// Create a new chunker
    pub fn new(chunk_size: usize, overlap: usize) -> Self {
        Self {
            chunk_size: chunk_size.max(1),
            overlap,
        }
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn overlap(&self) -> usize {
        self.overlap
    }

    /// Split text into ordered, non-overlapping chunks
    pub fn chunk(&self, text: &str) -> Vec<String> {
        if text.trim().is_empty() {
            return Vec::new();
        }

        let mut buffer = ChunkBuffer::new(self.chunk_size);

        for paragraph in text.lines().map(str::trim).filter(|p| !p.is_empty()) {
            if char_len(paragraph) > self.chunk_size {
                for sentence in split_sentences(paragraph) {
                    buffer.push(sentence);
                }
            } else {
                buffer.push(paragraph);
            }
        }

        let first_pass = buffer.finish();

        // Second pass: anything still oversized gets re-split by sentence
        let mut chunks = Vec::with_capacity(first_pass.len());
        for chunk in first_pass {
            if char_len(&chunk) > self.chunk_size {
                let mut resplit = ChunkBuffer::new(self.chunk_size);
                for sentence in split_sentences(&chunk) {
                    resplit.push(sentence);
                }
                chunks.extend(resplit.finish());
            } else {
                chunks.push(chunk);
            }
        }

        chunks
    }

    /// Chunk extracted text and attach source metadata
    pub fn chunk_source(&self, source: &SourceFile, text: &str) -> Vec<Chunk> {
        let pieces = self.chunk(text);
        let total_chunks = pieces.len();
        let metadata = source.chunk_metadata();

        pieces
            .into_iter()
            .enumerate()
            .map(|(chunk_index, text)| Chunk {
                text,
                chunk_index,
                total_chunks,
                metadata: metadata.clone(),
            })
            .collect()
    }
}

impl Default for TextChunker {
    fn default() -> Self {
        Self::new(1000, 200)
    }
}

/// Accumulates pieces into chunks joined by single spaces
struct ChunkBuffer {
    limit: usize,
    current: String,
    current_len: usize,
    chunks: Vec<String>,
}

impl ChunkBuffer {
    fn new(limit: usize) -> Self {
        Self {
            limit,
            current: String::new(),
            current_len: 0,
            chunks: Vec::new(),
        }
    }

    fn push(&mut self, piece: &str) {
        let piece_len = char_len(piece);
        let separator = usize::from(!self.current.is_empty());

        if self.current_len + separator + piece_len <= self.limit {
            if separator == 1 {
                self.current.push(' ');
            }
            self.current.push_str(piece);
            self.current_len += separator + piece_len;
        } else {
            self.flush();
            self.current.push_str(piece);
            self.current_len = piece_len;
        }
    }

    fn flush(&mut self) {
        if !self.current.is_empty() {
            let chunk = std::mem::take(&mut self.current);
            self.chunks.push(chunk.trim().to_string());
            self.current_len = 0;
        }
    }

    fn finish(mut self) -> Vec<String> {
        self.flush();
        self.chunks
    }
}

/// Split text into trimmed, non-empty sentences
fn split_sentences(text: &str) -> Vec<&str> {
    text.split_sentence_bounds()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect()
}

fn char_len(text: &str) -> usize {
    text.chars().count()
}

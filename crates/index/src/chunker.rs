//! Token-bounded sliding-window chunker.
//!
//! Splits a document's text into overlapping windows of tokens, as counted
//! by the configured [`TokenCodec`]. The codec is fixed per index: switching
//! it changes every chunk boundary, so callers must rebuild rather than mix
//! codecs within one collection.

use ragdex_core::{Error, Result, TokenCodec};
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct ChunkerConfig {
  pub chunk_size: usize,
  pub chunk_overlap: usize,
  pub max_chunks: Option<usize>,
}

impl Default for ChunkerConfig {
  fn default() -> Self {
    Self {
      chunk_size: 1000,
      chunk_overlap: 200,
      max_chunks: None,
    }
  }
}

impl ChunkerConfig {
  fn validate(&self) -> Result<()> {
    if self.chunk_overlap >= self.chunk_size {
      return Err(Error::Config(format!(
        "chunk_overlap ({}) must be less than chunk_size ({})",
        self.chunk_overlap, self.chunk_size
      )));
    }
    Ok(())
  }
}

/// A token-bounded window over a document's text, not yet attached to
/// provenance metadata (that's [`crate::document_source::DocumentSource`]'s
/// job).
#[derive(Debug, Clone, PartialEq)]
pub struct TextChunk {
  pub content: String,
  pub chunk_index: u32,
  pub token_count: u32,
  pub chunk_start: usize,
  pub chunk_end: usize,
}

pub struct DocumentChunker {
  codec: Arc<dyn TokenCodec>,
  config: ChunkerConfig,
}

impl DocumentChunker {
  pub fn new(codec: Arc<dyn TokenCodec>, config: ChunkerConfig) -> Result<Self> {
    config.validate()?;
    Ok(Self { codec, config })
  }

  pub fn config(&self) -> &ChunkerConfig {
    &self.config
  }

  /// Tokenise `text` once and walk a sliding window over it, emitting
  /// `tokens[i..i+chunk_size]` as successive chunks, advancing `i` by
  /// `chunk_size - chunk_overlap` each step. The final chunk absorbs
  /// whatever remains once fewer than `chunk_size` tokens are left.
  pub fn chunk(&self, text: &str) -> Vec<TextChunk> {
    let tokens = self.codec.encode(text);
    if tokens.is_empty() {
      return Vec::new();
    }

    let stride = self.config.chunk_size - self.config.chunk_overlap;
    let mut chunks = Vec::new();
    let mut start = 0usize;
    let mut index = 0u32;

    loop {
      let end = (start + self.config.chunk_size).min(tokens.len());
      let window = &tokens[start..end];
      chunks.push(TextChunk {
        content: self.codec.decode(window),
        chunk_index: index,
        token_count: window.len() as u32,
        chunk_start: start,
        chunk_end: end,
      });
      index += 1;

      if let Some(max) = self.config.max_chunks
        && chunks.len() >= max
      {
        break;
      }

      if start + self.config.chunk_size >= tokens.len() {
        break;
      }
      start += stride;
    }

    chunks
  }

  /// Token count of `text` under the configured codec, without chunking it.
  pub fn estimate_token_count(&self, text: &str) -> usize {
    self.codec.count(text)
  }

  /// How many chunks `chunk` would produce for a document of `token_count`
  /// tokens, without materializing any text.
  pub fn estimate_chunks(&self, token_count: usize) -> Result<usize> {
    self.config.validate()?;
    if token_count == 0 {
      return Ok(0);
    }
    let stride = self.config.chunk_size - self.config.chunk_overlap;
    if token_count <= self.config.chunk_size {
      return Ok(1);
    }
    let remaining = token_count - self.config.chunk_size;
    let extra = remaining.div_ceil(stride);
    Ok(1 + extra)
  }

  /// Back-solves a `chunk_size` that would produce roughly `target_chunks`
  /// windows over a document of `token_count` tokens, never going below a
  /// minimum viable chunk size.
  pub fn optimal_chunk_size(target_chunks: usize, token_count: usize) -> usize {
    const MIN_CHUNK_SIZE: usize = 64;
    if target_chunks == 0 || token_count == 0 {
      return MIN_CHUNK_SIZE;
    }
    (token_count / target_chunks).max(MIN_CHUNK_SIZE)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use ragdex_core::WhitespaceCodec;

  fn chunker(chunk_size: usize, overlap: usize) -> DocumentChunker {
    DocumentChunker::new(
      Arc::new(WhitespaceCodec),
      ChunkerConfig {
        chunk_size,
        chunk_overlap: overlap,
        max_chunks: None,
      },
    )
    .unwrap()
  }

  #[test]
  fn empty_input_yields_no_chunks() {
    assert!(chunker(10, 2).chunk("").is_empty());
  }

  #[test]
  fn short_input_is_one_chunk() {
    let chunks = chunker(100, 20).chunk("a short document");
    assert_eq!(chunks.len(), 1);
    assert_eq!(chunks[0].chunk_index, 0);
    assert_eq!(chunks[0].content, "a short document");
  }

  #[test]
  fn long_input_produces_overlapping_chunks() {
    let text = (0..50).map(|i| format!("word{i} ")).collect::<String>();
    let chunks = chunker(10, 3).chunk(&text);
    assert!(chunks.len() > 1);
    for (i, chunk) in chunks.iter().enumerate() {
      assert_eq!(chunk.chunk_index, i as u32);
      assert!(chunk.token_count as usize <= 10);
    }
  }

  #[test]
  fn chunk_indices_are_contiguous() {
    let text = (0..200).map(|i| format!("t{i} ")).collect::<String>();
    let chunks = chunker(20, 5).chunk(&text);
    for (i, chunk) in chunks.iter().enumerate() {
      assert_eq!(chunk.chunk_index, i as u32);
    }
  }

  #[test]
  fn overlap_equal_to_size_is_rejected() {
    let err = DocumentChunker::new(
      Arc::new(WhitespaceCodec),
      ChunkerConfig {
        chunk_size: 10,
        chunk_overlap: 10,
        max_chunks: None,
      },
    );
    assert!(err.is_err());
  }

  #[test]
  fn max_chunks_truncates() {
    let text = (0..200).map(|i| format!("t{i} ")).collect::<String>();
    let chunker = DocumentChunker::new(
      Arc::new(WhitespaceCodec),
      ChunkerConfig {
        chunk_size: 10,
        chunk_overlap: 2,
        max_chunks: Some(3),
      },
    )
    .unwrap();
    assert_eq!(chunker.chunk(&text).len(), 3);
  }

  #[test]
  fn is_deterministic() {
    let c = chunker(15, 4);
    let text = "the quick brown fox jumps over the lazy dog and then some more words follow after that";
    assert_eq!(c.chunk(text), c.chunk(text));
  }

  #[test]
  fn estimate_chunks_matches_actual_chunk_count() {
    let c = chunker(10, 3);
    let text = (0..97).map(|i| format!("w{i} ")).collect::<String>();
    let actual = c.chunk(&text).len();
    let estimated = c.estimate_chunks(c.estimate_token_count(&text)).unwrap();
    assert_eq!(actual, estimated);
  }

  #[test]
  fn optimal_chunk_size_has_a_floor() {
    assert_eq!(DocumentChunker::optimal_chunk_size(1000, 10), 64);
  }
}

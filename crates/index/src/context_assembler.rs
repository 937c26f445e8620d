//! Greedy token-budget packing of retrieved chunks into one prompt-sized
//! block of text.

use ragdex_core::{Chunk, TokenCodec};
use std::sync::Arc;

pub struct ContextAssembler {
  codec: Arc<dyn TokenCodec>,
  max_tokens: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AssembledContext {
  pub content: String,
  pub documents_included: usize,
  pub total_tokens: usize,
  pub truncated: bool,
}

impl ContextAssembler {
  pub fn new(codec: Arc<dyn TokenCodec>, max_tokens: usize) -> Self {
    Self { codec, max_tokens }
  }

  /// Packs `system_prompt` (always included), then each chunk wrapped with
  /// its source, then `user_query`, in that order, dropping any chunk whose
  /// inclusion would exceed `max_tokens`.
  pub fn assemble(&self, chunks: &[Chunk], system_prompt: Option<&str>, user_query: Option<&str>) -> AssembledContext {
    if chunks.is_empty() && system_prompt.is_none() && user_query.is_none() {
      return AssembledContext {
        content: String::new(),
        documents_included: 0,
        total_tokens: 0,
        truncated: false,
      };
    }

    let mut parts: Vec<String> = Vec::new();
    let mut total_tokens = 0usize;

    if let Some(prompt) = system_prompt {
      total_tokens += self.codec.count(prompt);
      parts.push(prompt.to_string());
    }

    let mut documents_included = 0;
    let mut truncated = false;

    for chunk in chunks {
      let wrapped = format!("[source: {}]\n{}", chunk.metadata.source, chunk.content);
      let tokens = self.codec.count(&wrapped);
      if total_tokens + tokens > self.max_tokens {
        truncated = true;
        continue;
      }
      total_tokens += tokens;
      documents_included += 1;
      parts.push(wrapped);
    }

    if let Some(query) = user_query {
      let tokens = self.codec.count(query);
      if total_tokens + tokens > self.max_tokens {
        truncated = true;
      } else {
        total_tokens += tokens;
        parts.push(query.to_string());
      }
    }

    AssembledContext {
      content: parts.join("\n\n"),
      documents_included,
      total_tokens,
      truncated,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use chrono::Utc;
  use ragdex_core::{ChunkMetadata, WhitespaceCodec, format_doc_id};

  fn chunk(source: &str, content: &str) -> Chunk {
    Chunk {
      doc_id: format_doc_id(source, 0),
      content: content.to_string(),
      metadata: ChunkMetadata {
        source: source.to_string(),
        filename: "f".to_string(),
        extension: "txt".to_string(),
        last_modified: Utc::now(),
        chunk_index: 0,
        token_count: content.split_whitespace().count() as u32,
        is_chunk: true,
      },
    }
  }

  #[test]
  fn empty_input_yields_empty_result() {
    let assembler = ContextAssembler::new(Arc::new(WhitespaceCodec), 1000);
    let result = assembler.assemble(&[], None, None);
    assert_eq!(result.content, "");
    assert_eq!(result.total_tokens, 0);
    assert!(!result.truncated);
  }

  #[test]
  fn packs_system_prompt_chunks_and_query_in_order() {
    let assembler = ContextAssembler::new(Arc::new(WhitespaceCodec), 1000);
    let chunks = vec![chunk("/a", "alpha content"), chunk("/b", "beta content")];
    let result = assembler.assemble(&chunks, Some("system"), Some("query"));
    assert_eq!(result.documents_included, 2);
    assert!(!result.truncated);
    assert!(result.content.starts_with("system"));
    assert!(result.content.ends_with("query"));
  }

  #[test]
  fn drops_chunks_that_would_exceed_budget() {
    let assembler = ContextAssembler::new(Arc::new(WhitespaceCodec), 5);
    let chunks = vec![chunk("/a", "one two three four five six seven")];
    let result = assembler.assemble(&chunks, None, None);
    assert_eq!(result.documents_included, 0);
    assert!(result.truncated);
  }
}

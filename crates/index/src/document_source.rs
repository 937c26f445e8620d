//! Turns a single file on disk into a stream of provenance-tagged chunks.

use crate::chunker::DocumentChunker;
use chrono::{DateTime, Utc};
use ragdex_core::{Chunk, ChunkMetadata, Error, Result, base_id, format_doc_id};
use std::path::Path;
use std::time::UNIX_EPOCH;

pub struct DocumentSource;

impl DocumentSource {
  /// Reads `path`, fetches its mtime once, chunks the content, and attaches
  /// provenance metadata (absolute path, filename, extension, mtime) to
  /// every resulting chunk.
  pub fn from_file(path: &Path, chunker: &DocumentChunker) -> Result<Vec<Chunk>> {
    let content = std::fs::read_to_string(path)?;
    let metadata = std::fs::metadata(path)?;
    let last_modified = mtime_of(&metadata)?;
    let base = base_id(path)?;

    let filename = path.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();
    let extension = path.extension().map(|e| e.to_string_lossy().into_owned()).unwrap_or_default();

    let text_chunks = chunker.chunk(&content);
    if text_chunks.is_empty() {
      return Ok(Vec::new());
    }

    Ok(
      text_chunks
        .into_iter()
        .map(|tc| Chunk {
          doc_id: format_doc_id(&base, tc.chunk_index),
          content: tc.content,
          metadata: ChunkMetadata {
            source: base.clone(),
            filename: filename.clone(),
            extension: extension.clone(),
            last_modified,
            chunk_index: tc.chunk_index,
            token_count: tc.token_count,
            is_chunk: true,
          },
        })
        .collect(),
    )
  }
}

fn mtime_of(metadata: &std::fs::Metadata) -> Result<DateTime<Utc>> {
  let modified = metadata.modified().map_err(Error::Io)?;
  let since_epoch = modified.duration_since(UNIX_EPOCH).map_err(|e| Error::Io(std::io::Error::other(e)))?;
  DateTime::from_timestamp(since_epoch.as_secs() as i64, since_epoch.subsec_nanos())
    .ok_or_else(|| Error::Config("file mtime out of range".to_string()))
}

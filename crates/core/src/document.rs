//! The chunk/document data model.
//!
//! A [`Chunk`] is the unit actually stored in the vector collection. A
//! [`Document`] is the logical union of all chunks sharing a `base_id` —
//! it only exists as a reconstructed, in-memory view; nothing persists it
//! directly.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Metadata every chunk carries, in addition to its vector and content.
///
/// Fields are typed rather than a loose string map because every chunk in
/// this system carries exactly this set — there is no caller-defined
/// metadata extension point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkMetadata {
  /// Canonical absolute path of the source file. Doubles as the `base_id`.
  pub source: String,
  pub filename: String,
  pub extension: String,
  /// mtime of the source file at ingest time, microsecond resolution.
  pub last_modified: DateTime<Utc>,
  pub chunk_index: u32,
  pub token_count: u32,
  pub is_chunk: bool,
}

/// A single stored unit: text plus provenance, addressed by `doc_id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
  pub doc_id: String,
  pub content: String,
  pub metadata: ChunkMetadata,
}

impl Chunk {
  pub fn base_id(&self) -> &str {
    base_id_of(&self.doc_id)
  }
}

/// A reconstructed logical document: all of a source file's chunks joined
/// back into one record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
  pub base_id: String,
  pub content: String,
  pub source: String,
  pub filename: String,
  pub extension: String,
  pub last_modified: DateTime<Utc>,
}

/// Derives the stable identifier for a source file: its canonical absolute
/// path, as a string. A pure function of the path — re-indexing an
/// unchanged file yields byte-identical ids every time.
pub fn base_id(path: &Path) -> std::io::Result<String> {
  let canonical = path.canonicalize()?;
  Ok(canonical.to_string_lossy().into_owned())
}

/// Formats the id of chunk `chunk_index` belonging to `base_id`.
pub fn format_doc_id(base_id: &str, chunk_index: u32) -> String {
  format!("{base_id}#chunk{chunk_index}")
}

/// Recovers `base_id` from a chunk's `doc_id`. A document indexed without
/// chunking (exactly one chunk, index 0) still uses `"{base_id}#chunk0"`,
/// so this is a pure string split with no special-casing.
pub fn base_id_of(doc_id: &str) -> &str {
  doc_id.split("#chunk").next().unwrap_or(doc_id)
}

/// Reconstructs a [`Document`] from its chunks.
///
/// `chunks` must already share a `base_id`; callers (the indexer) are
/// responsible for sorting by `chunk_index` beforehand — this function
/// trusts the given order and only joins content.
pub fn reconstruct(chunks: &[Chunk]) -> Option<Document> {
  let first = chunks.first()?;
  let content = chunks
    .iter()
    .map(|c| c.content.as_str())
    .collect::<Vec<_>>()
    .join("\n");

  Some(Document {
    base_id: first.base_id().to_string(),
    content,
    source: first.metadata.source.clone(),
    filename: first.metadata.filename.clone(),
    extension: first.metadata.extension.clone(),
    last_modified: first.metadata.last_modified,
  })
}

//! The central coordinator: ties the chunker, document source, path filter,
//! embedding provider and vector collection together into the operations a
//! CLI verb or the watcher drives.

use crate::chunker::DocumentChunker;
use crate::document_source::DocumentSource;
use crate::path_filter::PathFilter;
use crate::scanner::Scanner;
use ragdex_core::{Chunk, Document, Error, Result, base_id, format_doc_id, reconstruct};
use ragdex_db::VectorCollection;
use ragdex_embedding::EmbeddingProvider;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

const DEFAULT_BATCH_SIZE: usize = 100;

fn coll_err(e: ragdex_db::DbError) -> Error {
  Error::Collection(e.to_string())
}

fn embed_err(e: ragdex_embedding::EmbeddingError) -> Error {
  Error::Collection(format!("embedding: {e}"))
}

/// Linear decay of a document's recency contribution: 1.0 at `hours=0`,
/// falling to 0.0 at `hours=24` and staying there for anything older.
fn recency_factor(hours: f64) -> f64 {
  (1.0 - hours / 24.0).max(0.0)
}

#[derive(Debug, Clone, Default)]
pub struct IndexStats {
  pub files_indexed: usize,
  pub files_skipped: usize,
  pub chunks_added: usize,
}

#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct ScoreWeights {
  /// Linear decay weight applied to hours-since-`last_modified`.
  pub recency_boost: f64,
}

#[derive(Debug, Clone, Default)]
pub struct SearchOptions {
  pub group_chunks: bool,
  pub paths: Vec<PathBuf>,
  pub path_filters: Vec<String>,
  pub weights: Option<ScoreWeights>,
  pub explain: bool,
}

#[derive(Debug, Clone)]
pub struct SearchResults {
  pub chunks: Vec<Chunk>,
  pub distances: Vec<f32>,
  pub explanations: Option<Vec<String>>,
}

#[derive(Debug, Clone)]
pub struct Status {
  pub chunk_count: usize,
  pub distinct_sources: usize,
  pub extension_histogram: HashMap<String, usize>,
  pub chunk_size: usize,
  pub chunk_overlap: usize,
  pub embedding_model: String,
}

pub struct Indexer {
  collection: Arc<dyn VectorCollection>,
  embedder: Arc<dyn EmbeddingProvider>,
  chunker: DocumentChunker,
}

impl Indexer {
  pub fn new(collection: Arc<dyn VectorCollection>, embedder: Arc<dyn EmbeddingProvider>, chunker: DocumentChunker) -> Self {
    Self {
      collection,
      embedder,
      chunker,
    }
  }

  /// Embeds and stores one already-chunked record. A collision on an
  /// existing `doc_id` is an overwrite.
  pub async fn add_document(&self, chunk: Chunk) -> Result<()> {
    self.add_documents(vec![chunk], DEFAULT_BATCH_SIZE).await
  }

  pub async fn add_documents(&self, chunks: Vec<Chunk>, batch_size: usize) -> Result<()> {
    for batch in chunks.chunks(batch_size.max(1)) {
      let texts: Vec<&str> = batch.iter().map(|c| c.content.as_str()).collect();
      let vectors = self.embedder.embed_batch(&texts).await.map_err(embed_err)?;
      self.collection.add(batch, &vectors).await.map_err(coll_err)?;
    }
    Ok(())
  }

  /// Walks `root`, filters out excluded files, and chunks every admitted
  /// file. Does not write anything.
  pub fn collect_documents(&self, root: &Path, filter: &PathFilter) -> Result<Vec<Chunk>> {
    let scanner = Scanner::new().with_filter(filter.clone());
    let scan = scanner.scan(root, |_| {});

    let mut chunks = Vec::new();
    for file in scan.files {
      chunks.extend(DocumentSource::from_file(&file.path, &self.chunker)?);
    }
    Ok(chunks)
  }

  /// Incremental sync: skips files whose stored mtime is already current,
  /// re-indexes (delete then add) anything new or changed.
  pub async fn index_directory(&self, root: &Path, filter: &PathFilter) -> Result<IndexStats> {
    let candidates = self.collect_documents(root, filter)?;

    let mut order: Vec<String> = Vec::new();
    let mut grouped: HashMap<String, Vec<Chunk>> = HashMap::new();
    for chunk in candidates {
      let base = chunk.base_id().to_string();
      if !grouped.contains_key(&base) {
        order.push(base.clone());
      }
      grouped.entry(base).or_default().push(chunk);
    }

    let mut stats = IndexStats::default();
    let mut to_add = Vec::new();

    for base in order {
      let group = grouped.remove(&base).unwrap_or_default();
      let Some(current_mtime) = group.first().map(|c| c.metadata.last_modified) else {
        continue;
      };

      let stored = self.collection.source_mtime(&base).await.map_err(coll_err)?;
      if stored.map(|s| s >= current_mtime).unwrap_or(false) {
        stats.files_skipped += 1;
        continue;
      }

      if stored.is_some() {
        self.collection.delete_by_base_id(&base).await.map_err(coll_err)?;
      }
      stats.files_indexed += 1;
      stats.chunks_added += group.len();
      to_add.extend(group);
    }

    self.add_documents(to_add, DEFAULT_BATCH_SIZE).await?;
    Ok(stats)
  }

  /// Embeds `query`, retrieves nearest chunks, applies path filters, and
  /// optionally groups results back to one hit per source document.
  pub async fn search(&self, query: &str, n_results: usize, options: &SearchOptions) -> Result<SearchResults> {
    let vector = self.embedder.embed(query).await.map_err(embed_err)?;
    let fetch_limit = if options.group_chunks { n_results * 3 } else { n_results };

    let hits = self.collection.query(&vector, fetch_limit.max(1)).await.map_err(coll_err)?;

    let mut filtered = Vec::new();
    for hit in hits {
      if PathFilter::matches(&hit.chunk.metadata.source, &options.paths, &options.path_filters)? {
        filtered.push(hit);
      }
    }

    let scored: Vec<(Chunk, f32, Option<String>)> = filtered
      .into_iter()
      .map(|hit| {
        if let Some(weights) = &options.weights {
          let hours = (chrono::Utc::now() - hit.chunk.metadata.last_modified).num_minutes() as f64 / 60.0;
          let recency_factor = recency_factor(hours);
          let score = (1.0 - hit.distance as f64) + weights.recency_boost * recency_factor;
          let explanation = options
            .explain
            .then(|| format!("base=(1-distance)={:.4} recency_boost*factor={:.4}", 1.0 - hit.distance as f64, weights.recency_boost * recency_factor));
          (hit.chunk, (1.0 - score) as f32, explanation)
        } else {
          (hit.chunk, hit.distance, None)
        }
      })
      .collect();

    let mut scored = scored;
    if options.weights.is_some() {
      scored.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal));
    }

    if options.group_chunks {
      let mut group_order: Vec<String> = Vec::new();
      let mut groups: HashMap<String, Vec<(Chunk, f32, Option<String>)>> = HashMap::new();
      for entry in scored {
        let base = entry.0.base_id().to_string();
        if !groups.contains_key(&base) {
          group_order.push(base.clone());
        }
        groups.entry(base).or_default().push(entry);
      }

      let mut chunks = Vec::new();
      let mut distances = Vec::new();
      let mut explanations = Vec::new();

      for base in group_order.into_iter().take(n_results) {
        let mut members = groups.remove(&base).unwrap_or_default();
        members.sort_by(|a, b| {
          a.1
            .partial_cmp(&b.1)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.0.metadata.chunk_index.cmp(&b.0.metadata.chunk_index))
        });
        if let Some((chunk, distance, explanation)) = members.into_iter().next() {
          chunks.push(chunk);
          distances.push(distance);
          explanations.push(explanation.unwrap_or_default());
        }
      }

      Ok(SearchResults {
        chunks,
        distances,
        explanations: options.explain.then_some(explanations),
      })
    } else {
      let mut chunks = Vec::new();
      let mut distances = Vec::new();
      let mut explanations = Vec::new();
      for (chunk, distance, explanation) in scored.into_iter().take(n_results) {
        chunks.push(chunk);
        distances.push(distance);
        explanations.push(explanation.unwrap_or_default());
      }
      Ok(SearchResults {
        chunks,
        distances,
        explanations: options.explain.then_some(explanations),
      })
    }
  }

  pub async fn get_document_chunks(&self, base_id: &str) -> Result<Vec<Chunk>> {
    self.collection.chunks_for(base_id).await.map_err(coll_err)
  }

  pub async fn reconstruct_document(&self, base_id: &str) -> Result<Document> {
    let chunks = self.collection.chunks_for(base_id).await.map_err(coll_err)?;
    reconstruct(&chunks).ok_or_else(|| Error::NotFound(base_id.to_string()))
  }

  /// Best-effort delete of the single-chunk id, then delete-by-source.
  pub async fn delete_document(&self, base_id: &str) -> Result<bool> {
    let _ = self.collection.delete(&format_doc_id(base_id, 0)).await;
    self.collection.delete_by_base_id(base_id).await.map_err(coll_err)?;
    Ok(true)
  }

  /// Confirms a just-written file is actually retrievable, retrying to
  /// absorb the vector store's eventual indexing of new vectors.
  pub async fn verify_document(&self, path: &Path, content: Option<&str>, retries: u32, delay: Duration) -> Result<bool> {
    let probe_source = match content {
      Some(c) => c.to_string(),
      None => std::fs::read_to_string(path)?,
    };
    let probe: String = probe_source.chars().take(100).collect();
    let base = base_id(path)?;

    for attempt in 0..retries {
      let chunks = self.collection.chunks_for(&base).await.map_err(coll_err)?;
      if chunks.iter().any(|c| c.content.contains(&probe)) {
        return Ok(true);
      }
      if attempt + 1 < retries {
        tokio::time::sleep(delay).await;
      }
    }
    Ok(false)
  }

  pub async fn get_status(&self) -> Result<Status> {
    let chunks = self.collection.all_chunks().await.map_err(coll_err)?;
    let mut sources = HashSet::new();
    let mut histogram = HashMap::new();
    for chunk in &chunks {
      sources.insert(chunk.metadata.source.clone());
      *histogram.entry(chunk.metadata.extension.clone()).or_insert(0) += 1;
    }
    Ok(Status {
      chunk_count: chunks.len(),
      distinct_sources: sources.len(),
      extension_histogram: histogram,
      chunk_size: self.chunker.config().chunk_size,
      chunk_overlap: self.chunker.config().chunk_overlap,
      embedding_model: self.embedder.model_id().to_string(),
    })
  }

  /// All chunks of `chunk`'s document whose `chunk_index` is the match
  /// itself or exactly ±1 away.
  pub async fn adjacent_chunks(&self, chunk: &Chunk) -> Result<Vec<Chunk>> {
    let siblings = self.collection.chunks_for(chunk.base_id()).await.map_err(coll_err)?;
    let idx = chunk.metadata.chunk_index as i64;
    Ok(
      siblings
        .into_iter()
        .filter(|c| (c.metadata.chunk_index as i64 - idx).abs() <= 1)
        .collect(),
    )
  }

  pub fn chunker(&self) -> &DocumentChunker {
    &self.chunker
  }
}

/// Sorts `chunks` by `chunk_index` and concatenates their content,
/// suppressing a duplicated boundary where one chunk's tail overlaps the
/// next chunk's head by at least 20 characters.
pub fn merge_chunks(chunks: &mut [Chunk]) -> String {
  chunks.sort_by_key(|c| c.metadata.chunk_index);

  let mut merged = String::new();
  for chunk in chunks.iter() {
    if merged.is_empty() {
      merged.push_str(&chunk.content);
      continue;
    }
    match suffix_prefix_overlap(&merged, &chunk.content, 20) {
      Some(overlap) => merged.push_str(&chunk.content[overlap..]),
      None => {
        merged.push('\n');
        merged.push_str(&chunk.content);
      }
    }
  }
  merged
}

/// Longest `len >= min_len` such that the last `len` bytes of `a` equal the
/// first `len` bytes of `b`.
fn suffix_prefix_overlap(a: &str, b: &str, min_len: usize) -> Option<usize> {
  let max_len = a.len().min(b.len());
  for len in (min_len..=max_len).rev() {
    if a.is_char_boundary(a.len() - len) && b.is_char_boundary(len) && a.ends_with(&b[..len]) {
      return Some(len);
    }
  }
  None
}

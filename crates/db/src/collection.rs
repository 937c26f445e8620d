//! `VectorCollection`: the storage seam between the indexer and whatever
//! backs vector search. `LanceChunkCollection` is the real, persistent
//! implementation; `MemoryChunkCollection` is a brute-force in-memory
//! double used in tests that don't need LanceDB's I/O.

use arrow_array::{
  Array, BooleanArray, FixedSizeListArray, Float32Array, Int64Array, RecordBatch, RecordBatchIterator, StringArray,
  UInt32Array,
};
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use futures::TryStreamExt;
use lancedb::query::{ExecutableQuery, QueryBase};
use ragdex_core::{Chunk, ChunkMetadata, base_id_of};
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::connection::{ChunkStore, DbError, Result};
use crate::schema::chunks_schema;

/// A scored search hit: the chunk and its distance from the query vector
/// (smaller is closer).
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredChunk {
  pub chunk: Chunk,
  pub distance: f32,
}

/// Storage contract the indexer drives: add, fetch, search, delete, count,
/// and a destructive reset. Every method is keyed by `doc_id` or `base_id`
/// rather than a row-internal id, since those are the only identifiers
/// callers outside this crate ever see.
#[async_trait]
pub trait VectorCollection: Send + Sync {
  async fn add(&self, chunks: &[Chunk], vectors: &[Vec<f32>]) -> Result<()>;
  async fn get(&self, doc_id: &str) -> Result<Option<Chunk>>;
  async fn query(&self, vector: &[f32], limit: usize) -> Result<Vec<ScoredChunk>>;
  /// All chunks sharing `base_id`, ordered by `chunk_index`.
  async fn chunks_for(&self, base_id: &str) -> Result<Vec<Chunk>>;
  /// Most recent `last_modified` recorded for `base_id`, if any chunk of it
  /// is currently stored. Drives the skip-unchanged-file decision.
  async fn source_mtime(&self, base_id: &str) -> Result<Option<DateTime<Utc>>>;
  async fn delete_by_base_id(&self, base_id: &str) -> Result<()>;
  async fn delete(&self, doc_id: &str) -> Result<()>;
  async fn count(&self) -> Result<usize>;
  /// Every stored chunk, unordered. Used for status reporting; not meant
  /// for the hot query path.
  async fn all_chunks(&self) -> Result<Vec<Chunk>>;
  async fn reset(&self) -> Result<()>;
}

#[async_trait]
impl VectorCollection for ChunkStore {
  async fn add(&self, chunks: &[Chunk], vectors: &[Vec<f32>]) -> Result<()> {
    if chunks.is_empty() {
      return Ok(());
    }
    if chunks.len() != vectors.len() {
      return Err(DbError::NotFound("chunks/vectors length mismatch".into()));
    }

    let table = self.chunks_table().await?;
    let batch = chunks_to_batch(chunks, vectors, self.vector_dim)?;
    let schema = chunks_schema(self.vector_dim);
    let iter = RecordBatchIterator::new(vec![Ok(batch)], schema);
    table.add(Box::new(iter)).execute().await?;
    Ok(())
  }

  async fn get(&self, doc_id: &str) -> Result<Option<Chunk>> {
    let table = self.chunks_table().await?;
    let escaped = doc_id.replace('\'', "''");
    let results: Vec<RecordBatch> = table
      .query()
      .only_if(format!("doc_id = '{escaped}'"))
      .execute()
      .await?
      .try_collect()
      .await?;

    for batch in &results {
      if batch.num_rows() > 0 {
        return Ok(Some(batch_to_chunk(batch, 0)?));
      }
    }
    Ok(None)
  }

  async fn query(&self, vector: &[f32], limit: usize) -> Result<Vec<ScoredChunk>> {
    let table = self.chunks_table().await?;
    let results: Vec<RecordBatch> = table
      .vector_search(vector.to_vec())?
      .limit(limit)
      .execute()
      .await?
      .try_collect()
      .await?;

    let mut hits = Vec::new();
    for batch in &results {
      for row in 0..batch.num_rows() {
        let chunk = batch_to_chunk(batch, row)?;
        let distance = batch
          .column_by_name("_distance")
          .and_then(|c| c.as_any().downcast_ref::<Float32Array>())
          .map(|a| a.value(row))
          .unwrap_or(f32::MAX);
        hits.push(ScoredChunk { chunk, distance });
      }
    }
    Ok(hits)
  }

  async fn chunks_for(&self, base_id: &str) -> Result<Vec<Chunk>> {
    let table = self.chunks_table().await?;
    let escaped = base_id.replace('\'', "''");
    let results: Vec<RecordBatch> = table
      .query()
      .only_if(format!("base_id = '{escaped}'"))
      .execute()
      .await?
      .try_collect()
      .await?;

    let mut chunks = Vec::new();
    for batch in &results {
      for row in 0..batch.num_rows() {
        chunks.push(batch_to_chunk(batch, row)?);
      }
    }
    chunks.sort_by_key(|c| c.metadata.chunk_index);
    Ok(chunks)
  }

  async fn source_mtime(&self, base_id: &str) -> Result<Option<DateTime<Utc>>> {
    let chunks = self.chunks_for(base_id).await?;
    Ok(chunks.into_iter().map(|c| c.metadata.last_modified).max())
  }

  async fn delete_by_base_id(&self, base_id: &str) -> Result<()> {
    let table = self.chunks_table().await?;
    let escaped = base_id.replace('\'', "''");
    table.delete(&format!("base_id = '{escaped}'")).await?;
    Ok(())
  }

  async fn delete(&self, doc_id: &str) -> Result<()> {
    let table = self.chunks_table().await?;
    let escaped = doc_id.replace('\'', "''");
    table.delete(&format!("doc_id = '{escaped}'")).await?;
    Ok(())
  }

  async fn count(&self) -> Result<usize> {
    let table = self.chunks_table().await?;
    Ok(table.count_rows(None).await?)
  }

  async fn all_chunks(&self) -> Result<Vec<Chunk>> {
    let table = self.chunks_table().await?;
    let results: Vec<RecordBatch> = table.query().execute().await?.try_collect().await?;

    let mut chunks = Vec::new();
    for batch in &results {
      for row in 0..batch.num_rows() {
        chunks.push(batch_to_chunk(batch, row)?);
      }
    }
    Ok(chunks)
  }

  async fn reset(&self) -> Result<()> {
    ChunkStore::reset(self).await
  }
}

fn chunks_to_batch(chunks: &[Chunk], vectors: &[Vec<f32>], vector_dim: usize) -> Result<RecordBatch> {
  let doc_id = StringArray::from_iter_values(chunks.iter().map(|c| c.doc_id.clone()));
  let base_id = StringArray::from_iter_values(chunks.iter().map(|c| c.base_id().to_string()));
  let content = StringArray::from_iter_values(chunks.iter().map(|c| c.content.clone()));
  let source = StringArray::from_iter_values(chunks.iter().map(|c| c.metadata.source.clone()));
  let filename = StringArray::from_iter_values(chunks.iter().map(|c| c.metadata.filename.clone()));
  let extension = StringArray::from_iter_values(chunks.iter().map(|c| c.metadata.extension.clone()));
  let last_modified = Int64Array::from_iter_values(chunks.iter().map(|c| c.metadata.last_modified.timestamp_millis()));
  let chunk_index = UInt32Array::from_iter_values(chunks.iter().map(|c| c.metadata.chunk_index));
  let token_count = UInt32Array::from_iter_values(chunks.iter().map(|c| c.metadata.token_count));
  let is_chunk = BooleanArray::from_iter(chunks.iter().map(|c| Some(c.metadata.is_chunk)));

  let flattened: Vec<f32> = vectors
    .iter()
    .flat_map(|v| {
      let mut v = v.clone();
      v.resize(vector_dim, 0.0);
      v
    })
    .collect();
  let field = Arc::new(arrow_schema::Field::new("item", arrow_schema::DataType::Float32, true));
  let vector_list =
    FixedSizeListArray::try_new(field, vector_dim as i32, Arc::new(Float32Array::from(flattened)), None)?;

  Ok(RecordBatch::try_new(
    chunks_schema(vector_dim),
    vec![
      Arc::new(doc_id),
      Arc::new(base_id),
      Arc::new(content),
      Arc::new(source),
      Arc::new(filename),
      Arc::new(extension),
      Arc::new(last_modified),
      Arc::new(chunk_index),
      Arc::new(token_count),
      Arc::new(is_chunk),
      Arc::new(vector_list),
    ],
  )?)
}

fn batch_to_chunk(batch: &RecordBatch, row: usize) -> Result<Chunk> {
  let get_string = |name: &str| -> Result<String> {
    batch
      .column_by_name(name)
      .and_then(|c| c.as_any().downcast_ref::<StringArray>())
      .map(|a| a.value(row).to_string())
      .ok_or_else(|| DbError::NotFound(format!("column {name}")))
  };
  let get_u32 = |name: &str| -> Result<u32> {
    batch
      .column_by_name(name)
      .and_then(|c| c.as_any().downcast_ref::<UInt32Array>())
      .map(|a| a.value(row))
      .ok_or_else(|| DbError::NotFound(format!("column {name}")))
  };
  let get_i64 = |name: &str| -> Result<i64> {
    batch
      .column_by_name(name)
      .and_then(|c| c.as_any().downcast_ref::<Int64Array>())
      .map(|a| a.value(row))
      .ok_or_else(|| DbError::NotFound(format!("column {name}")))
  };
  let get_bool = |name: &str| -> Result<bool> {
    batch
      .column_by_name(name)
      .and_then(|c| c.as_any().downcast_ref::<BooleanArray>())
      .map(|a| a.value(row))
      .ok_or_else(|| DbError::NotFound(format!("column {name}")))
  };

  let last_modified = Utc
    .timestamp_millis_opt(get_i64("last_modified")?)
    .single()
    .ok_or_else(|| DbError::NotFound("invalid last_modified timestamp".into()))?;

  Ok(Chunk {
    doc_id: get_string("doc_id")?,
    content: get_string("content")?,
    metadata: ChunkMetadata {
      source: get_string("source")?,
      filename: get_string("filename")?,
      extension: get_string("extension")?,
      last_modified,
      chunk_index: get_u32("chunk_index")?,
      token_count: get_u32("token_count")?,
      is_chunk: get_bool("is_chunk")?,
    },
  })
}

/// In-memory `VectorCollection` for tests: exact brute-force search over a
/// `Vec`, no persistence, no approximation.
#[derive(Default)]
pub struct MemoryChunkCollection {
  rows: Mutex<Vec<(Chunk, Vec<f32>)>>,
}

impl MemoryChunkCollection {
  pub fn new() -> Self {
    Self::default()
  }
}

fn l2_distance(a: &[f32], b: &[f32]) -> f32 {
  a.iter().zip(b.iter()).map(|(x, y)| (x - y).powi(2)).sum::<f32>().sqrt()
}

#[async_trait]
impl VectorCollection for MemoryChunkCollection {
  async fn add(&self, chunks: &[Chunk], vectors: &[Vec<f32>]) -> Result<()> {
    if chunks.len() != vectors.len() {
      return Err(DbError::NotFound("chunks/vectors length mismatch".into()));
    }
    let mut rows = self.rows.lock().await;
    for (chunk, vector) in chunks.iter().zip(vectors.iter()) {
      rows.retain(|(c, _)| c.doc_id != chunk.doc_id);
      rows.push((chunk.clone(), vector.clone()));
    }
    Ok(())
  }

  async fn get(&self, doc_id: &str) -> Result<Option<Chunk>> {
    let rows = self.rows.lock().await;
    Ok(rows.iter().find(|(c, _)| c.doc_id == doc_id).map(|(c, _)| c.clone()))
  }

  async fn query(&self, vector: &[f32], limit: usize) -> Result<Vec<ScoredChunk>> {
    let rows = self.rows.lock().await;
    let mut hits: Vec<ScoredChunk> = rows
      .iter()
      .map(|(chunk, v)| ScoredChunk {
        chunk: chunk.clone(),
        distance: l2_distance(vector, v),
      })
      .collect();
    hits.sort_by(|a, b| a.distance.partial_cmp(&b.distance).unwrap_or(std::cmp::Ordering::Equal));
    hits.truncate(limit);
    Ok(hits)
  }

  async fn chunks_for(&self, base_id: &str) -> Result<Vec<Chunk>> {
    let rows = self.rows.lock().await;
    let mut chunks: Vec<Chunk> = rows
      .iter()
      .filter(|(c, _)| base_id_of(&c.doc_id) == base_id)
      .map(|(c, _)| c.clone())
      .collect();
    chunks.sort_by_key(|c| c.metadata.chunk_index);
    Ok(chunks)
  }

  async fn source_mtime(&self, base_id: &str) -> Result<Option<DateTime<Utc>>> {
    Ok(self.chunks_for(base_id).await?.into_iter().map(|c| c.metadata.last_modified).max())
  }

  async fn delete_by_base_id(&self, base_id: &str) -> Result<()> {
    let mut rows = self.rows.lock().await;
    rows.retain(|(c, _)| base_id_of(&c.doc_id) != base_id);
    Ok(())
  }

  async fn delete(&self, doc_id: &str) -> Result<()> {
    let mut rows = self.rows.lock().await;
    rows.retain(|(c, _)| c.doc_id != doc_id);
    Ok(())
  }

  async fn count(&self) -> Result<usize> {
    Ok(self.rows.lock().await.len())
  }

  async fn all_chunks(&self) -> Result<Vec<Chunk>> {
    Ok(self.rows.lock().await.iter().map(|(c, _)| c.clone()).collect())
  }

  async fn reset(&self) -> Result<()> {
    self.rows.lock().await.clear();
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use chrono::TimeZone;

  fn chunk(base: &str, index: u32, content: &str) -> Chunk {
    Chunk {
      doc_id: ragdex_core::format_doc_id(base, index),
      content: content.to_string(),
      metadata: ChunkMetadata {
        source: base.to_string(),
        filename: "file.txt".to_string(),
        extension: "txt".to_string(),
        last_modified: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
        chunk_index: index,
        token_count: content.split_whitespace().count() as u32,
        is_chunk: true,
      },
    }
  }

  #[tokio::test]
  async fn memory_collection_add_and_get() {
    let store = MemoryChunkCollection::new();
    let c = chunk("/a", 0, "hello world");
    store.add(&[c.clone()], &[vec![1.0, 0.0]]).await.unwrap();

    let fetched = store.get(&c.doc_id).await.unwrap().unwrap();
    assert_eq!(fetched.content, "hello world");
  }

  #[tokio::test]
  async fn memory_collection_query_orders_by_distance() {
    let store = MemoryChunkCollection::new();
    let near = chunk("/a", 0, "near");
    let far = chunk("/b", 0, "far");
    store.add(&[near.clone(), far.clone()], &[vec![1.0, 0.0], vec![0.0, 1.0]]).await.unwrap();

    let hits = store.query(&[1.0, 0.0], 2).await.unwrap();
    assert_eq!(hits[0].chunk.doc_id, near.doc_id);
    assert_eq!(hits[1].chunk.doc_id, far.doc_id);
  }

  #[tokio::test]
  async fn memory_collection_delete_by_base_id_removes_all_chunks() {
    let store = MemoryChunkCollection::new();
    store
      .add(
        &[chunk("/a", 0, "one"), chunk("/a", 1, "two"), chunk("/b", 0, "three")],
        &[vec![0.0], vec![0.0], vec![0.0]],
      )
      .await
      .unwrap();

    store.delete_by_base_id("/a").await.unwrap();
    assert_eq!(store.count().await.unwrap(), 1);
  }

  #[tokio::test]
  async fn memory_collection_source_mtime_tracks_latest_chunk() {
    let store = MemoryChunkCollection::new();
    let mut c1 = chunk("/a", 0, "one");
    c1.metadata.last_modified = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    let mut c2 = chunk("/a", 1, "two");
    c2.metadata.last_modified = Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap();
    store.add(&[c1, c2.clone()], &[vec![0.0], vec![0.0]]).await.unwrap();

    assert_eq!(store.source_mtime("/a").await.unwrap(), Some(c2.metadata.last_modified));
  }
}

use arrow_schema::{DataType, Field, Schema};
use std::sync::Arc;

/// Default embedding dimensionality, used when a collection is opened
/// without an explicit override.
pub const DEFAULT_VECTOR_DIM: usize = 768;

/// Schema for the `chunks` table: one row per indexed chunk.
///
/// `base_id` is stored alongside `doc_id` (rather than derived by string
/// split on every query) so that `base_id = '...'` filters can hit a plain
/// column instead of a substring match.
pub fn chunks_schema(vector_dim: usize) -> Arc<Schema> {
  Arc::new(Schema::new(vec![
    Field::new("doc_id", DataType::Utf8, false),
    Field::new("base_id", DataType::Utf8, false),
    Field::new("content", DataType::Utf8, false),
    Field::new("source", DataType::Utf8, false),
    Field::new("filename", DataType::Utf8, false),
    Field::new("extension", DataType::Utf8, false),
    Field::new("last_modified", DataType::Int64, false), // unix ms
    Field::new("chunk_index", DataType::UInt32, false),
    Field::new("token_count", DataType::UInt32, false),
    Field::new("is_chunk", DataType::Boolean, false),
    Field::new(
      "vector",
      DataType::FixedSizeList(Arc::new(Field::new("item", DataType::Float32, true)), vector_dim as i32),
      true,
    ),
  ]))
}

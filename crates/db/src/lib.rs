pub mod collection;
pub mod connection;
pub mod schema;

pub use collection::{MemoryChunkCollection, ScoredChunk, VectorCollection};
pub use connection::{ChunkStore, DbError, Result};
pub use schema::{DEFAULT_VECTOR_DIM, chunks_schema};

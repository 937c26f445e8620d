pub mod config;
pub mod document;
pub mod error;
pub mod token;

pub use config::{ChunkingConfig, Config, Device, EmbeddingConfig, EmbeddingProvider, IndexConfig};
pub use document::{Chunk, ChunkMetadata, Document, base_id, base_id_of, format_doc_id, reconstruct};
pub use error::{Error, Result};
pub use token::{TokenCodec, WhitespaceCodec};

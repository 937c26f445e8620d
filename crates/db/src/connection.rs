use lancedb::{Connection, connect};
use std::path::PathBuf;
use thiserror::Error;
use tracing::{debug, info};

use crate::schema::chunks_schema;

#[derive(Error, Debug)]
pub enum DbError {
  #[error("LanceDB error: {0}")]
  Lance(#[from] lancedb::Error),
  #[error("Arrow error: {0}")]
  Arrow(#[from] arrow::error::ArrowError),
  #[error("IO error: {0}")]
  Io(#[from] std::io::Error),
  #[error("not found: {0}")]
  NotFound(String),
}

pub type Result<T> = std::result::Result<T, DbError>;

/// Connection to the on-disk vector store backing a single chunk collection.
pub struct ChunkStore {
  pub path: PathBuf,
  pub connection: Connection,
  pub vector_dim: usize,
}

impl ChunkStore {
  /// Open or create the store at `path`, creating the `chunks` table on
  /// first use.
  pub async fn open_at_path(path: PathBuf, vector_dim: usize) -> Result<Self> {
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent)?;
    }

    info!("Opening LanceDB at {:?}", path);
    let connection = connect(path.to_string_lossy().as_ref()).execute().await?;

    let store = Self {
      path,
      connection,
      vector_dim,
    };
    store.ensure_table().await?;
    Ok(store)
  }

  async fn ensure_table(&self) -> Result<()> {
    let table_names = self.connection.table_names().execute().await?;
    if !table_names.contains(&"chunks".to_string()) {
      debug!("Creating chunks table");
      self
        .connection
        .create_empty_table("chunks", chunks_schema(self.vector_dim))
        .execute()
        .await?;
    }
    Ok(())
  }

  pub async fn chunks_table(&self) -> Result<lancedb::Table> {
    Ok(self.connection.open_table("chunks").execute().await?)
  }

  /// Drop and recreate the `chunks` table, discarding all stored chunks.
  pub async fn reset(&self) -> Result<()> {
    self.connection.drop_table("chunks").await.ok();
    self
      .connection
      .create_empty_table("chunks", chunks_schema(self.vector_dim))
      .execute()
      .await?;
    Ok(())
  }
}

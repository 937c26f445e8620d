use thiserror::Error;

/// Errors surfaced by the indexing/search/watch pipeline.
///
/// Crates downstream of `ragdex-core` wrap their own failures into one of
/// these variants rather than inventing parallel error types, so a CLI
/// command only ever has to match on this one enum.
#[derive(Error, Debug)]
pub enum Error {
  #[error("config: {0}")]
  Config(String),

  #[error("io: {0}")]
  Io(#[from] std::io::Error),

  #[error("collection: {0}")]
  Collection(String),

  #[error("not found: {0}")]
  NotFound(String),

  #[error("verification failed for {path}: probe not found after {retries} retries")]
  Verification { path: String, retries: u32 },

  #[error("filter: {0}")]
  Filter(String),
}

pub type Result<T> = std::result::Result<T, Error>;

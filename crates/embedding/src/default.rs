//! Deterministic, network-free embedding provider.
//!
//! Used when no local model server is configured, and by tests that need
//! embeddings without talking to anything. Each token is hashed into a
//! fixed-size bucket vector (the hashing trick); the result has none of a
//! real model's semantic structure but is stable, fast, and good enough to
//! exercise chunking, storage, and search plumbing end to end.

use crate::{EmbeddingError, EmbeddingProvider};
use async_trait::async_trait;
use sha2::{Digest, Sha256};

const DEFAULT_DIMENSIONS: usize = 256;

#[derive(Debug, Clone)]
pub struct DefaultProvider {
  dimensions: usize,
}

impl Default for DefaultProvider {
  fn default() -> Self {
    Self::new()
  }
}

impl DefaultProvider {
  pub fn new() -> Self {
    Self {
      dimensions: DEFAULT_DIMENSIONS,
    }
  }

  pub fn with_dimensions(dimensions: usize) -> Self {
    Self { dimensions }
  }

  fn embed_sync(&self, text: &str) -> Vec<f32> {
    let mut vector = vec![0f32; self.dimensions];

    for token in text.split_whitespace() {
      let digest = Sha256::digest(token.as_bytes());
      let bucket = u32::from_be_bytes([digest[0], digest[1], digest[2], digest[3]]) as usize % self.dimensions;
      let sign = if digest[4] & 1 == 0 { 1.0 } else { -1.0 };
      vector[bucket] += sign;
    }

    let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > 0.0 {
      for v in &mut vector {
        *v /= norm;
      }
    }
    vector
  }
}

#[async_trait]
impl EmbeddingProvider for DefaultProvider {
  fn name(&self) -> &str {
    "default"
  }

  fn model_id(&self) -> &str {
    "hashing-256"
  }

  fn dimensions(&self) -> usize {
    self.dimensions
  }

  async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
    Ok(self.embed_sync(text))
  }

  async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
    Ok(texts.iter().map(|t| self.embed_sync(t)).collect())
  }

  async fn is_available(&self) -> bool {
    true
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[tokio::test]
  async fn embeddings_are_deterministic() {
    let provider = DefaultProvider::new();
    let a = provider.embed("the quick brown fox").await.unwrap();
    let b = provider.embed("the quick brown fox").await.unwrap();
    assert_eq!(a, b);
  }

  #[tokio::test]
  async fn embeddings_have_configured_dimensions() {
    let provider = DefaultProvider::with_dimensions(64);
    let v = provider.embed("hello world").await.unwrap();
    assert_eq!(v.len(), 64);
  }

  #[tokio::test]
  async fn different_text_yields_different_vectors() {
    let provider = DefaultProvider::new();
    let a = provider.embed("alpha").await.unwrap();
    let b = provider.embed("omega").await.unwrap();
    assert_ne!(a, b);
  }

  #[tokio::test]
  async fn empty_text_is_zero_vector() {
    let provider = DefaultProvider::new();
    let v = provider.embed("").await.unwrap();
    assert!(v.iter().all(|x| *x == 0.0));
  }

  #[tokio::test]
  async fn is_always_available() {
    let provider = DefaultProvider::new();
    assert!(provider.is_available().await);
  }
}

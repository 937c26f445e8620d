//! Layered configuration: built-in defaults, overridable by a project-local
//! file, overridable in turn by a user-level file, overridable last by CLI
//! flags (applied by the `cli` crate after loading).
//!
//! Priority: project-relative (`.ragdex/config.toml`) > user
//! (`~/.config/ragdex/config.toml`) > built-in defaults.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Which embedding backend to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingProvider {
  #[default]
  Ollama,
  /// Deterministic, network-free fallback. Used for tests and offline use.
  Default,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Device {
  #[default]
  Cpu,
  Cuda,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
  pub provider: EmbeddingProvider,
  pub model: String,
  pub dimensions: usize,
  pub ollama_url: String,
  pub device: Device,
}

impl Default for EmbeddingConfig {
  fn default() -> Self {
    Self {
      provider: EmbeddingProvider::Ollama,
      model: "modernbert".to_string(),
      dimensions: 768,
      ollama_url: "http://localhost:11434".to_string(),
      device: Device::Cpu,
    }
  }
}

/// Chunker defaults. CLI flags (`--chunk-size`, `--chunk-overlap`,
/// `--max-chunks`) override these per invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingConfig {
  pub chunk_size: usize,
  pub chunk_overlap: usize,
  pub max_chunks: Option<usize>,
}

impl Default for ChunkingConfig {
  fn default() -> Self {
    Self {
      chunk_size: 1000,
      chunk_overlap: 200,
      max_chunks: None,
    }
  }
}

/// Ingestion & watch-loop tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexConfig {
  /// Maximum file size to index, in bytes.
  pub max_file_size: usize,
  /// Debounce interval before a pending filesystem event is processed.
  pub watcher_debounce_ms: u64,
  /// Settle delay after a change is admitted, before the file is read.
  pub watcher_settle_ms: u64,
  /// Verification retry budget after a write, and delay between retries.
  pub verify_retries: u32,
  pub verify_delay_ms: u64,
  /// Glob pattern for files considered during `index`/`watch`.
  pub pattern: String,
  /// Additional glob patterns to ignore, beyond the built-in defaults.
  pub ignore_patterns: Vec<String>,
}

impl Default for IndexConfig {
  fn default() -> Self {
    Self {
      max_file_size: 1024 * 1024,
      watcher_debounce_ms: 1000,
      watcher_settle_ms: 200,
      verify_retries: 3,
      verify_delay_ms: 200,
      pattern: "**/*.*".to_string(),
      ignore_patterns: vec![".git".to_string(), "__pycache__".to_string(), "*.pyc".to_string()],
    }
  }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
  /// Directory holding the persistent vector collection.
  #[serde(skip_serializing_if = "Option::is_none")]
  pub persist_dir: Option<PathBuf>,
  pub embedding: EmbeddingConfig,
  pub chunking: ChunkingConfig,
  pub index: IndexConfig,
}

impl Config {
  /// Default persist directory: `$HOME/.cache/ragdex/rag`.
  pub fn default_persist_dir() -> PathBuf {
    dirs::cache_dir()
      .unwrap_or_else(std::env::temp_dir)
      .join("ragdex")
      .join("rag")
  }

  pub fn persist_dir(&self) -> PathBuf {
    self.persist_dir.clone().unwrap_or_else(Self::default_persist_dir)
  }

  /// Load config for a project directory, falling back to the user config,
  /// falling back to built-in defaults.
  pub fn load_for_project(project_path: &Path) -> Self {
    let project_config = Self::project_config_path(project_path);
    if project_config.exists()
      && let Ok(content) = std::fs::read_to_string(&project_config)
      && let Ok(config) = toml::from_str(&content)
    {
      return config;
    }

    if let Some(user_config_path) = Self::user_config_path()
      && user_config_path.exists()
      && let Ok(content) = std::fs::read_to_string(&user_config_path)
      && let Ok(config) = toml::from_str(&content)
    {
      return config;
    }

    Self::default()
  }

  pub fn user_config_path() -> Option<PathBuf> {
    if let Ok(path) = std::env::var("RAGDEX_CONFIG_DIR") {
      return Some(PathBuf::from(path).join("config.toml"));
    }
    dirs::config_dir().map(|p| p.join("ragdex").join("config.toml"))
  }

  pub fn project_config_path(project_path: &Path) -> PathBuf {
    project_path.join(".ragdex").join("config.toml")
  }

  pub fn generate_template() -> String {
    let default = Config::default();
    let body = toml::to_string_pretty(&default).unwrap_or_default();
    format!(
      "# ragdex configuration\n# Place in .ragdex/config.toml (project) or ~/.config/ragdex/config.toml (user)\n\n{body}"
    )
  }
}

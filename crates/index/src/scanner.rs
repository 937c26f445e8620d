use crate::parser;
use crate::path_filter::PathFilter;
use ignore::WalkBuilder;
use rayon::prelude::*;
use std::collections::hash_map::DefaultHasher;
use std::fs::File;
use std::hash::{Hash, Hasher};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::time::{Duration, Instant, UNIX_EPOCH};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ScanError {
  #[error("IO error: {0}")]
  Io(#[from] std::io::Error),
  #[error("Walk error: {0}")]
  Walk(#[from] ignore::Error),
}

/// Result of scanning a single file
#[derive(Debug, Clone)]
pub struct ScannedFile {
  pub path: PathBuf,
  pub relative_path: String,
  pub size: u64,
  pub mtime: u64,
  pub checksum: String,
}

/// Result of scanning a directory
#[derive(Debug)]
pub struct ScanResult {
  pub files: Vec<ScannedFile>,
  pub skipped_count: u32,
  pub total_bytes: u64,
  pub scan_duration: Duration,
}

/// Progress callback data
#[derive(Debug, Clone)]
pub struct ScanProgress {
  pub scanned: u32,
  pub path: PathBuf,
}

/// Parallel, gitignore-aware directory walker producing candidate text
/// files. Language is irrelevant here: any non-excluded, non-empty,
/// size-bounded file that the path filter admits is a candidate.
pub struct Scanner {
  max_file_size: u64,
  follow_links: bool,
  filter: Option<PathFilter>,
}

impl Default for Scanner {
  fn default() -> Self {
    Self::new()
  }
}

impl Scanner {
  pub fn new() -> Self {
    Self {
      max_file_size: 1024 * 1024,
      follow_links: false,
      filter: None,
    }
  }

  pub fn with_max_file_size(mut self, size: u64) -> Self {
    self.max_file_size = size;
    self
  }

  pub fn with_filter(mut self, filter: PathFilter) -> Self {
    self.filter = Some(filter);
    self
  }

  fn admits(&self, relative: &Path) -> bool {
    self.filter.as_ref().map(|f| f.admits(relative)).unwrap_or(true)
  }

  /// Scan `root` in parallel, respecting `.gitignore`.
  pub fn scan<F>(&self, root: &Path, progress: F) -> ScanResult
  where
    F: Fn(ScanProgress) + Send + Sync,
  {
    let start = Instant::now();
    let scanned = AtomicU32::new(0);
    let skipped = AtomicU32::new(0);
    let total_bytes = AtomicU64::new(0);

    let walker = WalkBuilder::new(root)
      .follow_links(self.follow_links)
      .hidden(true)
      .git_ignore(true)
      .git_global(true)
      .git_exclude(true)
      .add_custom_ignore_filename(".ragdexignore")
      .build();

    let files: Vec<ScannedFile> = walker
      .filter_map(|e| e.ok())
      .par_bridge()
      .filter_map(|entry| {
        let path = entry.path();

        if entry.file_type().is_none_or(|ft| ft.is_dir()) {
          return None;
        }

        let count = scanned.fetch_add(1, Ordering::Relaxed);
        if count.is_multiple_of(100) {
          progress(ScanProgress {
            scanned: count,
            path: path.to_path_buf(),
          });
        }

        let relative = path.strip_prefix(root).ok()?;
        if !self.admits(relative) || parser::is_excluded(path) {
          return None;
        }

        let metadata = entry.metadata().ok()?;
        if metadata.len() == 0 {
          skipped.fetch_add(1, Ordering::Relaxed);
          return None;
        }
        if metadata.len() > self.max_file_size {
          skipped.fetch_add(1, Ordering::Relaxed);
          return None;
        }

        let checksum = quick_checksum(path).ok()?;
        let mtime = metadata.modified().ok()?.duration_since(UNIX_EPOCH).ok()?.as_secs();

        total_bytes.fetch_add(metadata.len(), Ordering::Relaxed);

        Some(ScannedFile {
          path: path.to_path_buf(),
          relative_path: relative.to_string_lossy().into(),
          size: metadata.len(),
          mtime,
          checksum,
        })
      })
      .collect();

    ScanResult {
      files,
      skipped_count: skipped.load(Ordering::Relaxed),
      total_bytes: total_bytes.load(Ordering::Relaxed),
      scan_duration: start.elapsed(),
    }
  }

  /// Scan a single file, outside of a directory walk.
  pub fn scan_file(&self, path: &Path, root: &Path) -> Option<ScannedFile> {
    if parser::is_excluded(path) {
      return None;
    }

    let metadata = path.metadata().ok()?;
    if metadata.len() == 0 || metadata.len() > self.max_file_size {
      return None;
    }

    let checksum = quick_checksum(path).ok()?;
    let mtime = metadata.modified().ok()?.duration_since(UNIX_EPOCH).ok()?.as_secs();

    Some(ScannedFile {
      path: path.to_path_buf(),
      relative_path: path.strip_prefix(root).ok()?.to_string_lossy().into(),
      size: metadata.len(),
      mtime,
      checksum,
    })
  }
}

/// Quick checksum over the first 4KB plus file length; cheap enough to run
/// on every scanned file as a pre-filter before anything touches the index.
fn quick_checksum(path: &Path) -> Result<String, std::io::Error> {
  let mut file = File::open(path)?;
  let mut buffer = [0u8; 4096];
  let n = file.read(&mut buffer)?;

  let mut hasher = DefaultHasher::new();
  buffer[..n].hash(&mut hasher);
  file.metadata()?.len().hash(&mut hasher);

  Ok(format!("{:016x}", hasher.finish()))
}

#[cfg(test)]
mod tests {
  use super::*;
  use tempfile::TempDir;

  #[test]
  fn test_scan_basic() {
    let dir = TempDir::new().unwrap();

    std::fs::write(dir.path().join("main.rs"), "fn main() {}").unwrap();
    std::fs::write(dir.path().join("cache.sqlite3"), "binary").unwrap();

    let scanner = Scanner::new();
    let result = scanner.scan(dir.path(), |_| {});

    assert_eq!(result.files.len(), 1);
    assert_eq!(result.files[0].relative_path, "main.rs");
  }

  #[test]
  fn test_scan_respects_gitignore() {
    let dir = TempDir::new().unwrap();

    std::fs::create_dir(dir.path().join(".git")).unwrap();
    std::fs::write(dir.path().join(".gitignore"), "ignored/\n*.log").unwrap();

    std::fs::write(dir.path().join("main.rs"), "fn main() {}").unwrap();
    std::fs::create_dir(dir.path().join("ignored")).unwrap();
    std::fs::write(dir.path().join("ignored/hidden.rs"), "fn hidden() {}").unwrap();
    std::fs::write(dir.path().join("debug.log"), "log").unwrap();

    let scanner = Scanner::new();
    let result = scanner.scan(dir.path(), |_| {});

    let paths: Vec<_> = result.files.iter().map(|f| &f.relative_path).collect();
    assert_eq!(result.files.len(), 1, "found {:?}", paths);
    assert!(result.files[0].relative_path.contains("main.rs"));
  }

  #[test]
  fn test_scan_skips_large_files() {
    let dir = TempDir::new().unwrap();

    std::fs::write(dir.path().join("small.rs"), "fn small() {}").unwrap();
    let large_content = "x".repeat(2 * 1024 * 1024);
    std::fs::write(dir.path().join("large.rs"), large_content).unwrap();

    let scanner = Scanner::new().with_max_file_size(1024 * 1024);
    let result = scanner.scan(dir.path(), |_| {});

    assert_eq!(result.files.len(), 1);
    assert!(result.files[0].relative_path.contains("small.rs"));
    assert_eq!(result.skipped_count, 1);
  }

  #[test]
  fn test_quick_checksum() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("test.rs");
    std::fs::write(&path, "fn test() {}").unwrap();

    let checksum1 = quick_checksum(&path).unwrap();
    let checksum2 = quick_checksum(&path).unwrap();

    assert_eq!(checksum1, checksum2);
    assert_eq!(checksum1.len(), 16);
  }

  #[test]
  fn test_scan_skips_empty_files() {
    let dir = TempDir::new().unwrap();

    std::fs::write(dir.path().join("normal.rs"), "fn normal() {}").unwrap();
    std::fs::write(dir.path().join("empty.rs"), "").unwrap();

    let scanner = Scanner::new();
    let result = scanner.scan(dir.path(), |_| {});

    assert_eq!(result.files.len(), 1);
    assert!(result.files[0].relative_path.contains("normal.rs"));
    assert_eq!(result.skipped_count, 1);
  }

  #[test]
  fn test_scan_applies_path_filter() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("keep.md"), "content").unwrap();
    std::fs::write(dir.path().join("skip.rs"), "fn f() {}").unwrap();

    let filter = PathFilter::new("*.md", &[]).unwrap();
    let scanner = Scanner::new().with_filter(filter);
    let result = scanner.scan(dir.path(), |_| {});

    assert_eq!(result.files.len(), 1);
    assert_eq!(result.files[0].relative_path, "keep.md");
  }
}

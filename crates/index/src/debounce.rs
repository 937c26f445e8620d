//! Debounced file watcher: batches events and deduplicates changes per path.
//!
//! - 1000ms debounce for file changes, configurable (tests use 0).
//! - Deduplication of events by file path.
//! - Coalescing of create+modify into a single event.
//! - When multiple distinct paths become ready in the same pass, they are
//!   returned newest-mtime-first, per the watcher's processing order.

use crate::watcher::{ChangeKind, FileChange, FileWatcher, WatchError};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

#[derive(Debug, Clone)]
pub struct DebounceConfig {
  /// Debounce delay for file changes.
  pub file_debounce_ms: u64,
  /// Maximum events to collect before forcing a flush.
  pub max_pending_events: usize,
}

impl Default for DebounceConfig {
  fn default() -> Self {
    Self {
      file_debounce_ms: 1000,
      max_pending_events: 100,
    }
  }
}

/// Accumulated change state for a single file.
#[derive(Debug, Clone)]
struct PendingChange {
  kind: ChangeKind,
  last_seen: Instant,
}

impl PendingChange {
  fn new(kind: ChangeKind) -> Self {
    Self {
      kind,
      last_seen: Instant::now(),
    }
  }

  fn update(&mut self, kind: ChangeKind) {
    self.last_seen = Instant::now();
    match (&self.kind, &kind) {
      (ChangeKind::Created, ChangeKind::Modified) => {}
      (ChangeKind::Deleted, ChangeKind::Created) => self.kind = ChangeKind::Modified,
      (ChangeKind::Created, ChangeKind::Deleted) => self.kind = ChangeKind::Deleted,
      _ => self.kind = kind,
    }
  }
}

fn file_mtime(path: &Path) -> SystemTime {
  std::fs::metadata(path).and_then(|m| m.modified()).unwrap_or(UNIX_EPOCH)
}

/// A debounced file watcher that batches and deduplicates events, keyed by
/// path, and enforces at most one pending transition per path per window.
pub struct DebouncedWatcher {
  watcher: FileWatcher,
  config: DebounceConfig,
  pending: HashMap<PathBuf, PendingChange>,
}

impl DebouncedWatcher {
  pub fn new(root: &Path, config: DebounceConfig) -> Result<Self, WatchError> {
    Ok(Self {
      watcher: FileWatcher::new(root)?,
      config,
      pending: HashMap::new(),
    })
  }

  pub fn with_defaults(root: &Path) -> Result<Self, WatchError> {
    Self::new(root, DebounceConfig::default())
  }

  pub fn root(&self) -> &Path {
    self.watcher.root()
  }

  /// Poll for raw events and accumulate them.
  pub fn poll_raw(&mut self) {
    while let Some(change) = self.watcher.poll() {
      self.handle_change(change);
    }
  }

  /// Collect changes whose debounce period has elapsed, newest-mtime-first.
  pub fn collect_ready(&mut self) -> Vec<FileChange> {
    self.poll_raw();

    let now = Instant::now();
    let debounce_duration = Duration::from_millis(self.config.file_debounce_ms);

    let mut ready_paths = Vec::new();
    for (path, pending) in &self.pending {
      if now.duration_since(pending.last_seen) >= debounce_duration {
        ready_paths.push(path.clone());
      }
    }

    let mut ready: Vec<FileChange> = ready_paths
      .iter()
      .map(|path| FileChange {
        path: path.clone(),
        kind: self.pending[path].kind.clone(),
      })
      .collect();

    for path in &ready_paths {
      self.pending.remove(path);
    }

    ready.sort_by_key(|change| std::cmp::Reverse(file_mtime(&change.path)));
    ready
  }

  /// Force collect all pending changes regardless of debounce time.
  pub fn collect_all(&mut self) -> Vec<FileChange> {
    self.poll_raw();

    let mut changes: Vec<FileChange> = self
      .pending
      .drain()
      .map(|(path, pending)| FileChange { path, kind: pending.kind })
      .collect();

    changes.sort_by_key(|change| std::cmp::Reverse(file_mtime(&change.path)));
    changes
  }

  pub fn pending_count(&self) -> usize {
    self.pending.len()
  }

  pub fn should_force_flush(&self) -> bool {
    self.pending.len() >= self.config.max_pending_events
  }

  fn handle_change(&mut self, change: FileChange) {
    if let Some(pending) = self.pending.get_mut(&change.path) {
      pending.update(change.kind);
    } else {
      self.pending.insert(change.path, PendingChange::new(change.kind));
    }
  }
}

/// Interval-driven wrapper that calls a handler once per ready batch.
pub struct BatchProcessor {
  watcher: DebouncedWatcher,
  batch_interval: Duration,
  last_batch: Instant,
}

impl BatchProcessor {
  pub fn new(watcher: DebouncedWatcher) -> Self {
    Self {
      watcher,
      batch_interval: Duration::from_secs(1),
      last_batch: Instant::now(),
    }
  }

  pub fn with_interval(watcher: DebouncedWatcher, interval: Duration) -> Self {
    Self {
      watcher,
      batch_interval: interval,
      last_batch: Instant::now(),
    }
  }

  pub fn process_batch<F>(&mut self, handler: F) -> Result<usize, WatchError>
  where
    F: FnMut(FileChange),
  {
    let now = Instant::now();

    if now.duration_since(self.last_batch) < self.batch_interval && !self.watcher.should_force_flush() {
      return Ok(0);
    }

    let changes = if self.watcher.should_force_flush() {
      self.watcher.collect_all()
    } else {
      self.watcher.collect_ready()
    };

    let count = changes.len();
    changes.into_iter().for_each(handler);

    self.last_batch = now;
    Ok(count)
  }

  pub fn watcher(&self) -> &DebouncedWatcher {
    &self.watcher
  }

  pub fn watcher_mut(&mut self) -> &mut DebouncedWatcher {
    &mut self.watcher
  }
}

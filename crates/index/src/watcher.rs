use notify::event::{ModifyKind, RenameMode};
use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher as NotifyWatcher};
use std::cell::RefCell;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{Receiver, channel};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Error, Debug)]
pub enum WatchError {
  #[error("Notify error: {0}")]
  Notify(#[from] notify::Error),
  #[error("Channel receive error")]
  ChannelRecv,
}

/// Type of file change event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeKind {
  Created,
  Modified,
  Deleted,
}

/// A file change event
#[derive(Debug, Clone)]
pub struct FileChange {
  pub path: PathBuf,
  pub kind: ChangeKind,
}

/// File system watcher for code indexing
pub struct FileWatcher {
  _watcher: RecommendedWatcher,
  receiver: Receiver<Result<Event, notify::Error>>,
  root: PathBuf,
  /// A single notify `Event` can expand to more than one [`FileChange`] (a
  /// rename reported as one `Both` event yields a delete-from plus a
  /// create-to); the overflow is queued here and drained before polling for
  /// a fresh notify event.
  queued: RefCell<VecDeque<FileChange>>,
}

impl FileWatcher {
  /// Create a new file watcher for the given root directory
  pub fn new(root: &Path) -> Result<Self, WatchError> {
    Self::with_poll_interval(root, Duration::from_secs(2))
  }

  /// Create a new file watcher with a custom poll interval
  pub fn with_poll_interval(root: &Path, poll_interval: Duration) -> Result<Self, WatchError> {
    let (tx, rx) = channel();

    let config = Config::default().with_poll_interval(poll_interval);

    let mut watcher = RecommendedWatcher::new(
      move |res| {
        let _ = tx.send(res);
      },
      config,
    )?;

    watcher.watch(root, RecursiveMode::Recursive)?;

    Ok(Self {
      _watcher: watcher,
      receiver: rx,
      root: root.to_path_buf(),
      queued: RefCell::new(VecDeque::new()),
    })
  }

  /// Create a file watcher with poll interval in milliseconds
  pub fn with_poll_interval_ms(root: &Path, poll_ms: u64) -> Result<Self, WatchError> {
    Self::with_poll_interval(root, Duration::from_millis(poll_ms))
  }

  /// Get the root directory being watched
  pub fn root(&self) -> &Path {
    &self.root
  }

  /// Poll for the next file change event (non-blocking)
  pub fn poll(&self) -> Option<FileChange> {
    if let Some(change) = self.queued.borrow_mut().pop_front() {
      return Some(change);
    }
    match self.receiver.try_recv() {
      Ok(Ok(event)) => self.next_from(event),
      Ok(Err(e)) => {
        warn!("Watch error: {}", e);
        None
      }
      Err(_) => None,
    }
  }

  /// Wait for the next file change event (blocking)
  pub fn wait(&self) -> Result<FileChange, WatchError> {
    if let Some(change) = self.queued.borrow_mut().pop_front() {
      return Ok(change);
    }
    loop {
      match self.receiver.recv() {
        Ok(Ok(event)) => {
          if let Some(change) = self.next_from(event) {
            return Ok(change);
          }
        }
        Ok(Err(e)) => {
          warn!("Watch error: {}", e);
          return Err(WatchError::Notify(e));
        }
        Err(_) => return Err(WatchError::ChannelRecv),
      }
    }
  }

  /// Wait for the next file change event with timeout
  pub fn wait_timeout(&self, timeout: Duration) -> Result<Option<FileChange>, WatchError> {
    if let Some(change) = self.queued.borrow_mut().pop_front() {
      return Ok(Some(change));
    }
    match self.receiver.recv_timeout(timeout) {
      Ok(Ok(event)) => Ok(self.next_from(event)),
      Ok(Err(e)) => {
        warn!("Watch error: {}", e);
        Err(WatchError::Notify(e))
      }
      Err(std::sync::mpsc::RecvTimeoutError::Timeout) => Ok(None),
      Err(std::sync::mpsc::RecvTimeoutError::Disconnected) => Err(WatchError::ChannelRecv),
    }
  }

  /// Expands one notify `Event` into its `FileChange`s, returns the first
  /// and stashes any rest in `queued`.
  fn next_from(&self, event: Event) -> Option<FileChange> {
    let mut changes = self.process_event(event);
    if changes.is_empty() {
      return None;
    }
    let first = changes.remove(0);
    self.queued.borrow_mut().extend(changes);
    Some(first)
  }

  /// Collect all pending changes
  pub fn collect_pending(&self) -> Vec<FileChange> {
    let mut changes = Vec::new();
    while let Some(change) = self.poll() {
      changes.push(change);
    }
    changes
  }

  /// A rename is reported either as a single `Both` event carrying
  /// `[from, to]`, or as a paired `From`/`To` event on platforms that can't
  /// correlate the two paths in one notification. Either way it's modeled
  /// as a delete of the old path plus a create of the new one, so a moved
  /// file is reindexed under its new identity rather than edited in place.
  fn process_event(&self, event: Event) -> Vec<FileChange> {
    match event.kind {
      EventKind::Create(_) => single(event.paths.first(), ChangeKind::Created),
      EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => {
        let Some(from) = event.paths.first() else { return Vec::new() };
        let Some(to) = event.paths.get(1) else { return Vec::new() };
        let mut changes = Vec::new();
        if !from.is_dir() {
          changes.push(FileChange { path: from.clone(), kind: ChangeKind::Deleted });
        }
        if !to.is_dir() {
          changes.push(FileChange { path: to.clone(), kind: ChangeKind::Created });
        }
        changes
      }
      EventKind::Modify(ModifyKind::Name(RenameMode::From)) => single(event.paths.first(), ChangeKind::Deleted),
      EventKind::Modify(ModifyKind::Name(RenameMode::To)) => single(event.paths.first(), ChangeKind::Created),
      EventKind::Modify(_) => single(event.paths.first(), ChangeKind::Modified),
      EventKind::Remove(_) => single(event.paths.first(), ChangeKind::Deleted),
      EventKind::Any => {
        debug!("Ignoring Any event for {:?}", event.paths);
        Vec::new()
      }
      EventKind::Access(_) => {
        debug!("Ignoring Access event for {:?}", event.paths);
        Vec::new()
      }
      EventKind::Other => {
        debug!("Ignoring Other event for {:?}", event.paths);
        Vec::new()
      }
    }
  }
}

/// Builds a one-element change list unless `path` is absent or a directory.
fn single(path: Option<&PathBuf>, kind: ChangeKind) -> Vec<FileChange> {
  match path {
    Some(p) if !p.is_dir() => vec![FileChange { path: p.clone(), kind }],
    _ => Vec::new(),
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::fs;
  use tempfile::TempDir;

  #[test]
  fn test_watcher_creation() {
    let dir = TempDir::new().unwrap();
    let watcher = FileWatcher::new(dir.path());
    assert!(watcher.is_ok());
  }

  #[test]
  fn test_watcher_detects_create() {
    let dir = TempDir::new().unwrap();
    let watcher = FileWatcher::new(dir.path()).unwrap();

    // Create a file
    let file_path = dir.path().join("test.rs");
    fs::write(&file_path, "fn main() {}").unwrap();

    // Wait a bit for the event
    std::thread::sleep(Duration::from_millis(100));

    // Poll for changes
    let changes = watcher.collect_pending();

    // Should have detected the create (might also have modify)
    let has_create_or_modify = changes
      .iter()
      .any(|c| c.path == file_path && (c.kind == ChangeKind::Created || c.kind == ChangeKind::Modified));

    // Note: Some systems may batch create+modify events differently
    // This test is somewhat flaky due to OS-level event batching
    assert!(
      has_create_or_modify || changes.is_empty(),
      "Expected create/modify event or empty (due to timing)"
    );
  }

  #[test]
  fn test_change_kind_equality() {
    assert_eq!(ChangeKind::Created, ChangeKind::Created);
    assert_ne!(ChangeKind::Created, ChangeKind::Modified);
  }
}

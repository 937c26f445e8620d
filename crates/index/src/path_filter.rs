//! Path and glob filtering, used both by `search`'s post-query narrowing and
//! by the scanner/watcher's admit/deny decision.

use globset::{Glob, GlobSet, GlobSetBuilder};
use ragdex_core::{Error, Result};
use std::path::{Path, PathBuf};

/// Patterns excluded by default regardless of any caller-supplied
/// `ignore_patterns`, matching the common housekeeping directories every
/// project accumulates.
pub fn default_ignore_patterns() -> Vec<String> {
  vec![".git".to_string(), "__pycache__".to_string(), "*.pyc".to_string()]
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
  let mut builder = GlobSetBuilder::new();
  for pattern in patterns {
    // Bare-extension filters (`*.md`) mean "any path ending with .md", so
    // widen them to also match a nested path, not just a bare filename.
    let glob = if !pattern.contains('/') && pattern.starts_with("*.") {
      Glob::new(&format!("**/{pattern}")).map_err(|e| Error::Filter(e.to_string()))?
    } else {
      Glob::new(pattern).map_err(|e| Error::Filter(e.to_string()))?
    };
    builder.add(glob);
  }
  builder.build().map_err(|e| Error::Filter(e.to_string()))
}

/// Whether a path is admitted: glob-matches `pattern` and matches none of
/// `ignore_patterns` (merged with [`default_ignore_patterns`]).
#[derive(Clone)]
pub struct PathFilter {
  pattern: GlobSet,
  ignore: GlobSet,
}

impl PathFilter {
  pub fn new(pattern: &str, ignore_patterns: &[String]) -> Result<Self> {
    let mut ignore = default_ignore_patterns();
    ignore.extend(ignore_patterns.iter().cloned());
    Ok(Self {
      pattern: build_globset(&[pattern.to_string()])?,
      ignore: build_globset(&ignore)?,
    })
  }

  /// True iff `path` matches the admit pattern and no ignore pattern.
  pub fn admits(&self, path: &Path) -> bool {
    if self.ignore.is_match(path) {
      return false;
    }
    let name_matches = path.file_name().map(|n| self.ignore.is_match(Path::new(n))).unwrap_or(false);
    if name_matches {
      return false;
    }
    self.pattern.is_match(path)
  }

  /// `matches(doc, paths?, path_filters?)` from the search path: a doc
  /// matches iff it's a descendant of some `paths` entry (or `paths` is
  /// empty) AND it glob-matches some `path_filters` entry (or that's
  /// empty).
  pub fn matches(source: &str, paths: &[PathBuf], path_filters: &[String]) -> Result<bool> {
    let source_path = Path::new(source);

    let under_paths = paths.is_empty()
      || paths.iter().any(|p| {
        source_path.starts_with(p) || p.canonicalize().map(|c| source_path.starts_with(&c)).unwrap_or(false)
      });
    if !under_paths {
      return Ok(false);
    }

    if path_filters.is_empty() {
      return Ok(true);
    }

    let set = build_globset(path_filters)?;
    Ok(set.is_match(source_path))
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn admits_matching_non_ignored_path() {
    let filter = PathFilter::new("**/*.*", &[]).unwrap();
    assert!(filter.admits(Path::new("docs/readme.md")));
  }

  #[test]
  fn rejects_default_ignored_directories() {
    let filter = PathFilter::new("**/*.*", &[]).unwrap();
    assert!(!filter.admits(Path::new("project/.git/HEAD")));
    assert!(!filter.admits(Path::new("project/__pycache__/mod.pyc")));
  }

  #[test]
  fn rejects_caller_supplied_ignore_pattern() {
    let filter = PathFilter::new("**/*.*", &["target/**".to_string()]).unwrap();
    assert!(!filter.admits(Path::new("target/debug/build.rs")));
  }

  #[test]
  fn matches_with_no_paths_or_filters_is_permissive() {
    assert!(PathFilter::matches("/a/b/c.md", &[], &[]).unwrap());
  }

  #[test]
  fn matches_respects_bare_extension_filter() {
    assert!(PathFilter::matches("/a/b/c.md", &[], &["*.md".to_string()]).unwrap());
    assert!(!PathFilter::matches("/a/b/c.rs", &[], &["*.md".to_string()]).unwrap());
  }

  #[test]
  fn matches_respects_path_scope() {
    let scope = vec![PathBuf::from("/a/b")];
    assert!(PathFilter::matches("/a/b/c.md", &scope, &[]).unwrap());
    assert!(!PathFilter::matches("/x/y/c.md", &scope, &[]).unwrap());
  }
}

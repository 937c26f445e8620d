//! Binary and database-suffix exclusion.
//!
//! Unlike a code-indexing pipeline, this one accepts arbitrary text files;
//! the only files it refuses on sight are ones that are never text: known
//! binary/database artifacts and compiled bytecode.

use std::path::Path;

const EXCLUDED_EXTENSIONS: &[&str] = &["sqlite3", "db", "bin", "pyc"];

/// True if `path`'s extension marks it as never-indexable content.
pub fn is_excluded(path: &Path) -> bool {
  path
    .extension()
    .and_then(|ext| ext.to_str())
    .map(|ext| EXCLUDED_EXTENSIONS.iter().any(|excluded| ext.eq_ignore_ascii_case(excluded)))
    .unwrap_or(false)
}

/// True if `path` should be considered for indexing based on its extension
/// alone (inverse of [`is_excluded`]; directory-level filters still apply).
pub fn is_indexable(path: &Path) -> bool {
  !is_excluded(path)
}

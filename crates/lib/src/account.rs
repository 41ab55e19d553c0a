//! Dependency and output accounting.
//!
//! Everything the pipeline consulted while producing its primary output is
//! accumulated into a [`DepSet`] and flushed exactly once at the end of the
//! invocation as a Makefile-style dependency record. The used-environment
//! record is written alongside, and the primary output's mtime is bumped so
//! it is never older than that record.

use std::collections::{BTreeMap, BTreeSet};
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use thiserror::Error;
use tracing::debug;

use crate::env;

/// Accounting failures are I/O failures on one of the output files. All
/// fatal: a half-written record must never pass as complete.
#[derive(Debug, Error)]
pub enum AccountError {
  #[error("failed to write dependency record {path}: {source}")]
  WriteDepfile {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("failed to write used environment file {path}: {source}")]
  WriteUsedEnv {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("failed to touch {path}: {source}")]
  Touch {
    path: PathBuf,
    #[source]
    source: io::Error,
  },
}

/// Append-only, insertion-ordered, de-duplicated file path collection.
///
/// Entries are never removed within an invocation.
#[derive(Debug, Default)]
pub struct DepSet {
  seen: BTreeSet<PathBuf>,
  ordered: Vec<PathBuf>,
}

impl DepSet {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn add(&mut self, path: impl Into<PathBuf>) {
    let path = path.into();
    if self.seen.insert(path.clone()) {
      self.ordered.push(path);
    }
  }

  pub fn extend(&mut self, paths: impl IntoIterator<Item = PathBuf>) {
    for path in paths {
      self.add(path);
    }
  }

  pub fn iter(&self) -> impl Iterator<Item = &PathBuf> {
    self.ordered.iter()
  }

  pub fn len(&self) -> usize {
    self.ordered.len()
  }

  pub fn is_empty(&self) -> bool {
    self.ordered.is_empty()
  }

  pub fn contains(&self, path: &Path) -> bool {
    self.seen.contains(path)
  }
}

/// Write the Makefile-style dependency record mapping `target` to every
/// entry of `deps`. The record is regenerated whole, never merged with a
/// previous version. Write-then-rename keeps a crash from leaving a
/// half-written record behind.
pub fn write_depfile(path: &Path, target: &Path, deps: &DepSet) -> Result<(), AccountError> {
  let mut content = String::new();
  content.push_str(&escape(target));
  content.push(':');
  for dep in deps.iter() {
    content.push_str(" \\\n ");
    content.push_str(&escape(dep));
  }
  content.push('\n');

  atomic_write(path, content.as_bytes()).map_err(|source| AccountError::WriteDepfile {
    path: path.to_path_buf(),
    source,
  })?;
  debug!(path = %path.display(), deps = deps.len(), "wrote dependency record");
  Ok(())
}

/// Write the used-environment record.
pub fn write_used_env(path: &Path, pairs: &BTreeMap<String, String>) -> Result<(), AccountError> {
  atomic_write(path, env::serialize(pairs).as_bytes()).map_err(|source| AccountError::WriteUsedEnv {
    path: path.to_path_buf(),
    source,
  })?;
  debug!(path = %path.display(), vars = pairs.len(), "wrote used environment");
  Ok(())
}

/// Create the file if missing and set its mtime to now.
///
/// Called on the primary output after the used-environment record is
/// written, so downstream freshness checks never see the output older than
/// the record.
pub fn touch(path: &Path) -> Result<(), AccountError> {
  let map_err = |source| AccountError::Touch {
    path: path.to_path_buf(),
    source,
  };
  let file = std::fs::OpenOptions::new()
    .create(true)
    .append(true)
    .open(path)
    .map_err(map_err)?;
  file.set_modified(SystemTime::now()).map_err(map_err)
}

fn atomic_write(path: &Path, content: &[u8]) -> io::Result<()> {
  if let Some(parent) = path.parent() {
    std::fs::create_dir_all(parent)?;
  }
  let temp = path.with_extension("tmp");
  std::fs::write(&temp, content)?;
  std::fs::rename(&temp, path)
}

fn escape(path: &Path) -> String {
  path.to_string_lossy().replace('\\', "/").replace(' ', "\\ ")
}

#[cfg(test)]
mod tests {
  use super::*;
  use tempfile::TempDir;

  #[test]
  fn depset_preserves_insertion_order_and_dedupes() {
    let mut deps = DepSet::new();
    deps.add("b.txt");
    deps.add("a.txt");
    deps.add("b.txt");
    deps.extend([PathBuf::from("c.txt"), PathBuf::from("a.txt")]);
    let ordered: Vec<_> = deps.iter().map(|p| p.to_string_lossy().into_owned()).collect();
    assert_eq!(ordered, ["b.txt", "a.txt", "c.txt"]);
    assert_eq!(deps.len(), 3);
  }

  #[test]
  fn depfile_is_a_single_make_rule() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("build.graph.d");
    let mut deps = DepSet::new();
    deps.add("a/one.c");
    deps.add("a/with space.c");
    write_depfile(&path, Path::new("out/build.graph"), &deps).unwrap();

    let content = std::fs::read_to_string(&path).unwrap();
    assert_eq!(content, "out/build.graph: \\\n a/one.c \\\n a/with\\ space.c\n");
  }

  #[test]
  fn depfile_is_regenerated_not_merged() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("d");
    let mut first = DepSet::new();
    first.add("stale.c");
    write_depfile(&path, Path::new("t"), &first).unwrap();

    let mut second = DepSet::new();
    second.add("fresh.c");
    write_depfile(&path, Path::new("t"), &second).unwrap();

    let content = std::fs::read_to_string(&path).unwrap();
    assert!(content.contains("fresh.c"));
    assert!(!content.contains("stale.c"));
  }

  #[test]
  fn touch_bumps_mtime_past_a_reference_file() {
    let temp = TempDir::new().unwrap();
    let primary = temp.path().join("build.graph");
    let reference = temp.path().join("env.used");
    std::fs::write(&primary, "graph").unwrap();
    std::fs::write(&reference, "A=1\n").unwrap();

    touch(&primary).unwrap();

    let primary_mtime = std::fs::metadata(&primary).unwrap().modified().unwrap();
    let reference_mtime = std::fs::metadata(&reference).unwrap().modified().unwrap();
    assert!(primary_mtime >= reference_mtime);
  }

  #[test]
  fn touch_creates_a_missing_file() {
    let temp = TempDir::new().unwrap();
    let marker = temp.path().join("conversion.marker");
    touch(&marker).unwrap();
    assert!(marker.exists());
    assert_eq!(std::fs::metadata(&marker).unwrap().len(), 0);
  }
}

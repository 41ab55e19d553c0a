//! External workspace view.
//!
//! Generates target-format definitions directly into a caller-chosen
//! directory, without planting an overlay. The primary output is a
//! manifest listing every generated file, so downstream tooling has a
//! single path to watch for staleness.

use std::fs;
use std::io::Write as _;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::info;
use walkdir::WalkDir;

use crate::account::DepSet;
use crate::config::Config;
use crate::convert::{codegen, CodegenError};
use crate::engine::{AnalysisEngine, EngineError, PassRequest};

/// Name of the manifest file written at the view root.
pub const MANIFEST_NAME: &str = "view.manifest";

#[derive(Debug, Error)]
pub enum ViewError {
  #[error(transparent)]
  Engine(#[from] EngineError),

  #[error(transparent)]
  Codegen(#[from] CodegenError),

  #[error("failed to walk view dir {path}")]
  Walk {
    path: PathBuf,
    #[source]
    source: walkdir::Error,
  },

  #[error("failed to write view manifest {path}")]
  WriteManifest {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },
}

/// Generate the view under `view_dir` and write its manifest. Returns the
/// manifest path; consulted files land in `deps`.
pub fn run(
  config: &Config,
  engine: &dyn AnalysisEngine,
  view_dir: &Path,
  deps: &mut DepSet,
) -> Result<PathBuf, ViewError> {
  let outcome = engine.run_pass(config, &PassRequest::conversion())?;
  deps.extend(outcome.files_consulted);

  let written = codegen::generate(&outcome.modules, view_dir)?;
  info!(files = written.len(), root = %view_dir.display(), "generated workspace view");

  let manifest = view_dir.join(MANIFEST_NAME);
  write_manifest(&manifest, view_dir)?;
  Ok(manifest)
}

/// List every generated file relative to the view root, sorted, one per
/// line. The manifest itself is excluded.
fn write_manifest(manifest: &Path, view_dir: &Path) -> Result<(), ViewError> {
  let mut entries: Vec<String> = Vec::new();
  for entry in WalkDir::new(view_dir).sort_by_file_name() {
    let entry = entry.map_err(|source| ViewError::Walk {
      path: view_dir.to_path_buf(),
      source,
    })?;
    if !entry.file_type().is_file() {
      continue;
    }
    let rel = entry.path().strip_prefix(view_dir).unwrap_or(entry.path());
    if rel == Path::new(MANIFEST_NAME) {
      continue;
    }
    entries.push(rel.to_string_lossy().replace('\\', "/"));
  }
  entries.sort();

  let mut file = fs::File::create(manifest).map_err(|source| ViewError::WriteManifest {
    path: manifest.to_path_buf(),
    source,
  })?;
  for line in &entries {
    writeln!(file, "{line}").map_err(|source| ViewError::WriteManifest {
      path: manifest.to_path_buf(),
      source,
    })?;
  }
  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;
  use tempfile::TempDir;

  #[test]
  fn manifest_lists_generated_files_sorted() {
    let temp = TempDir::new().unwrap();
    let view = temp.path().join("view");
    fs::create_dir_all(view.join("b")).unwrap();
    fs::create_dir_all(view.join("a")).unwrap();
    fs::write(view.join("b").join("BUILD"), "x").unwrap();
    fs::write(view.join("a").join("BUILD"), "x").unwrap();
    fs::write(view.join("BUILD"), "x").unwrap();

    let manifest = view.join(MANIFEST_NAME);
    write_manifest(&manifest, &view).unwrap();

    let body = fs::read_to_string(&manifest).unwrap();
    assert_eq!(body, "BUILD\na/BUILD\nb/BUILD\n");
  }

  #[test]
  fn manifest_excludes_itself_on_rewrite() {
    let temp = TempDir::new().unwrap();
    let view = temp.path().join("view");
    fs::create_dir_all(&view).unwrap();
    fs::write(view.join("BUILD"), "x").unwrap();

    let manifest = view.join(MANIFEST_NAME);
    write_manifest(&manifest, &view).unwrap();
    write_manifest(&manifest, &view).unwrap();

    let body = fs::read_to_string(&manifest).unwrap();
    assert_eq!(body, "BUILD\n");
  }
}

//! Overlay workspace construction (symlink forest).
//!
//! For format conversion the generated definition files and the original
//! source tree are merged into one workspace an external build system can
//! treat as a normal source tree. The workspace is a forest of symbolic
//! references, fully reconstructed on every run so stale content from a
//! previous overlay can never leak into the new one.

pub mod plan;

pub use plan::{MemTree, OverlayPlan, PlannedEntry, TreeEntry, TreeView};

use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{info, warn};

/// Overlay construction failures (all I/O; planning itself cannot fail).
#[derive(Debug, Error)]
pub enum OverlayError {
  #[error("failed to clear stale workspace {path}: {source}")]
  ClearWorkspace {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("failed to create workspace directory {path}: {source}")]
  CreateDir {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("failed to link {path} -> {target}: {source}")]
  Link {
    path: PathBuf,
    target: PathBuf,
    #[source]
    source: io::Error,
  },
}

/// Subtrees excluded from the overlay.
///
/// Built once per invocation from the fixed infrastructure exclusions, the
/// build-system output directory, and the externally declared
/// always-excluded trees; never consulted after planning.
#[derive(Debug, Clone, Default)]
pub struct ExcludeSet {
  prefixes: Vec<PathBuf>,
}

/// Infrastructure directories that never belong in an overlay workspace.
const INFRA_EXCLUDES: &[&str] = &[".git", ".repo"];

impl ExcludeSet {
  /// `out_dir_rel` is the output directory relative to the source root, if
  /// it lives inside it; `declared` are the configured exclude subtrees.
  pub fn new(out_dir_rel: Option<&Path>, declared: &[PathBuf]) -> Self {
    let mut prefixes: Vec<PathBuf> = INFRA_EXCLUDES.iter().map(PathBuf::from).collect();
    if let Some(out) = out_dir_rel {
      prefixes.push(out.to_path_buf());
    }
    prefixes.extend(declared.iter().cloned());
    prefixes.sort();
    prefixes.dedup();
    Self { prefixes }
  }

  /// True if `rel` is an excluded path or inside one.
  pub fn matches(&self, rel: &Path) -> bool {
    self.prefixes.iter().any(|prefix| rel.starts_with(prefix))
  }

  /// True if some exclude lies strictly below `rel`.
  pub fn any_under(&self, rel: &Path) -> bool {
    self.prefixes.iter().any(|prefix| prefix.starts_with(rel) && prefix != rel)
  }
}

/// Filesystem-backed [`TreeView`].
///
/// An entry whose type cannot be determined is logged and skipped: a stale
/// unreadable file only affects overlay completeness, not the analysis
/// itself.
pub struct FsTree {
  root: PathBuf,
}

impl FsTree {
  pub fn new(root: impl Into<PathBuf>) -> Self {
    Self { root: root.into() }
  }
}

impl TreeView for FsTree {
  fn root(&self) -> &Path {
    &self.root
  }

  fn entries(&self, rel: &Path) -> Vec<TreeEntry> {
    let dir = self.root.join(rel);
    let reader = match std::fs::read_dir(&dir) {
      Ok(reader) => reader,
      Err(err) if err.kind() == io::ErrorKind::NotFound => return Vec::new(),
      Err(err) => {
        warn!(path = %dir.display(), error = %err, "cannot enumerate directory, skipping");
        return Vec::new();
      }
    };

    let mut entries = Vec::new();
    for item in reader {
      let item = match item {
        Ok(item) => item,
        Err(err) => {
          warn!(path = %dir.display(), error = %err, "unreadable directory entry, skipping");
          continue;
        }
      };
      let file_type = match item.file_type() {
        Ok(file_type) => file_type,
        Err(err) => {
          warn!(path = %item.path().display(), error = %err, "cannot stat entry, skipping");
          continue;
        }
      };
      entries.push(TreeEntry {
        name: item.file_name().to_string_lossy().into_owned(),
        is_dir: file_type.is_dir(),
      });
    }
    entries.sort();
    entries
  }
}

/// Materialize a plan under `workspace_root`, from scratch.
pub fn materialize(plan: &OverlayPlan, workspace_root: &Path) -> Result<(), OverlayError> {
  match std::fs::symlink_metadata(workspace_root) {
    Ok(_) => std::fs::remove_dir_all(workspace_root).map_err(|source| OverlayError::ClearWorkspace {
      path: workspace_root.to_path_buf(),
      source,
    })?,
    Err(err) if err.kind() == io::ErrorKind::NotFound => {}
    Err(source) => {
      return Err(OverlayError::ClearWorkspace {
        path: workspace_root.to_path_buf(),
        source,
      });
    }
  }
  std::fs::create_dir_all(workspace_root).map_err(|source| OverlayError::CreateDir {
    path: workspace_root.to_path_buf(),
    source,
  })?;

  for entry in &plan.entries {
    match entry {
      PlannedEntry::Dir(rel) => {
        let path = workspace_root.join(rel);
        std::fs::create_dir_all(&path).map_err(|source| OverlayError::CreateDir { path, source })?;
      }
      PlannedEntry::Link { rel, target, is_dir } => {
        let path = workspace_root.join(rel);
        symlink(target, &path, *is_dir).map_err(|source| OverlayError::Link {
          path,
          target: target.clone(),
          source,
        })?;
      }
    }
  }
  Ok(())
}

#[cfg(unix)]
fn symlink(target: &Path, path: &Path, _is_dir: bool) -> io::Result<()> {
  std::os::unix::fs::symlink(target, path)
}

#[cfg(windows)]
fn symlink(target: &Path, path: &Path, is_dir: bool) -> io::Result<()> {
  if is_dir {
    std::os::windows::fs::symlink_dir(target, path)
  } else {
    std::os::windows::fs::symlink_file(target, path)
  }
}

/// Plan and materialize the overlay in one step.
///
/// Returns every path examined while planning, for dependency accounting.
pub fn plant_forest(
  source_root: &Path,
  generated_root: &Path,
  workspace_root: &Path,
  excludes: &ExcludeSet,
) -> Result<Vec<PathBuf>, OverlayError> {
  let source = FsTree::new(source_root);
  let generated = FsTree::new(generated_root);
  let plan = plan::compute(&source, &generated, excludes);
  materialize(&plan, workspace_root)?;
  info!(
    workspace = %workspace_root.display(),
    entries = plan.entries.len(),
    "planted overlay workspace"
  );
  Ok(plan.examined)
}

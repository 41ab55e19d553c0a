//! Overlay planning.
//!
//! The overlay mapping is computed as a pure function of the source tree,
//! the generated tree, and the exclude set, so the decision logic is unit
//! testable without touching a filesystem. Materialization happens
//! separately in the parent module.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use super::ExcludeSet;

/// Read-only view of a directory tree, relative paths throughout.
pub trait TreeView {
  /// Absolute root of the tree; link targets are resolved against it.
  fn root(&self) -> &Path;

  /// Sorted entries of a directory. A directory that does not exist has no
  /// entries.
  fn entries(&self, rel: &Path) -> Vec<TreeEntry>;
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct TreeEntry {
  pub name: String,
  pub is_dir: bool,
}

/// One materialization step, workspace-relative.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlannedEntry {
  /// Create a real directory (the subtree mixes source and generated
  /// content, or an exclude applies somewhere below).
  Dir(PathBuf),
  /// Create a symbolic reference to `target`.
  Link {
    rel: PathBuf,
    target: PathBuf,
    is_dir: bool,
  },
}

/// The desired overlay mapping plus every path examined to compute it.
#[derive(Debug, Default)]
pub struct OverlayPlan {
  pub entries: Vec<PlannedEntry>,
  pub examined: Vec<PathBuf>,
}

impl OverlayPlan {
  /// Resolve a workspace-relative path to its planned link target, if the
  /// plan maps it. Test and inspection helper.
  pub fn target_of(&self, rel: &Path) -> Option<&Path> {
    self.entries.iter().find_map(|entry| match entry {
      PlannedEntry::Link { rel: r, target, .. } if r == rel => Some(target.as_path()),
      _ => None,
    })
  }
}

/// Compute the overlay mapping.
///
/// Rules, applied per directory level:
/// - an exclude match drops the whole subtree, source and generated alike;
/// - a path present in both trees resolves to the generated side (conflicts
///   are settled here, before any link is created);
/// - a source directory untouched by generated content and excludes becomes
///   one directory link; anything else recurses into a real directory;
/// - generated-only paths are linked from the generated tree.
pub fn compute(source: &dyn TreeView, generated: &dyn TreeView, excludes: &ExcludeSet) -> OverlayPlan {
  let mut plan = OverlayPlan::default();
  walk(Path::new(""), source, generated, excludes, &mut plan);
  plan
}

fn walk(rel: &Path, source: &dyn TreeView, generated: &dyn TreeView, excludes: &ExcludeSet, plan: &mut OverlayPlan) {
  let src_entries = source.entries(rel);
  let gen_entries: BTreeMap<String, bool> = generated
    .entries(rel)
    .into_iter()
    .map(|entry| (entry.name, entry.is_dir))
    .collect();

  for entry in &src_entries {
    let child = rel.join(&entry.name);
    if excludes.matches(&child) {
      debug!(path = %child.display(), "excluded from overlay");
      continue;
    }
    plan.examined.push(source.root().join(&child));

    match gen_entries.get(&entry.name) {
      Some(true) if entry.is_dir => {
        // Both sides have a directory here: merge by recursing. Only the
        // conflicting files below are dropped, never the directory.
        plan.entries.push(PlannedEntry::Dir(child.clone()));
        walk(&child, source, generated, excludes, plan);
      }
      Some(gen_is_dir) => {
        // Same path in both trees, not both directories: generated wins.
        if is_definition_file(&entry.name) {
          warn!(path = %child.display(), "ignoring existing definition file superseded by generated output");
        } else {
          warn!(path = %child.display(), "source path shadowed by generated output");
        }
        plan.examined.push(generated.root().join(&child));
        plan.entries.push(PlannedEntry::Link {
          rel: child.clone(),
          target: generated.root().join(&child),
          is_dir: *gen_is_dir,
        });
      }
      None if entry.is_dir => {
        if excludes.any_under(&child) {
          plan.entries.push(PlannedEntry::Dir(child.clone()));
          walk(&child, source, generated, excludes, plan);
        } else {
          plan.entries.push(PlannedEntry::Link {
            rel: child.clone(),
            target: source.root().join(&child),
            is_dir: true,
          });
        }
      }
      None => {
        plan.entries.push(PlannedEntry::Link {
          rel: child.clone(),
          target: source.root().join(&child),
          is_dir: false,
        });
      }
    }
  }

  // Generated-only entries.
  for (name, is_dir) in &gen_entries {
    if src_entries.iter().any(|entry| &entry.name == name) {
      continue;
    }
    let child = rel.join(name);
    if excludes.matches(&child) {
      continue;
    }
    plan.examined.push(generated.root().join(&child));
    plan.entries.push(PlannedEntry::Link {
      rel: child,
      target: generated.root().join(rel).join(name),
      is_dir: *is_dir,
    });
  }
}

/// Build-definition file names recognized in the target format.
pub fn is_definition_file(name: &str) -> bool {
  name == "BUILD" || name == "BUILD.bazel"
}

/// In-memory [`TreeView`] for tests and inspection.
#[derive(Debug, Default)]
pub struct MemTree {
  root: PathBuf,
  files: Vec<PathBuf>,
}

impl MemTree {
  pub fn new(root: impl Into<PathBuf>, files: impl IntoIterator<Item = impl Into<PathBuf>>) -> Self {
    Self {
      root: root.into(),
      files: files.into_iter().map(Into::into).collect(),
    }
  }
}

impl TreeView for MemTree {
  fn root(&self) -> &Path {
    &self.root
  }

  fn entries(&self, rel: &Path) -> Vec<TreeEntry> {
    let mut entries: Vec<TreeEntry> = Vec::new();
    for file in &self.files {
      let Ok(rest) = file.strip_prefix(rel) else {
        continue;
      };
      let mut components = rest.components();
      let Some(first) = components.next() else {
        continue;
      };
      let name = first.as_os_str().to_string_lossy().into_owned();
      let is_dir = components.next().is_some();
      if !entries.iter().any(|e| e.name == name) {
        entries.push(TreeEntry { name, is_dir });
      }
    }
    entries.sort();
    entries
  }
}

//! Target-format definition file generation.
//!
//! Renders one `BUILD` file per module directory, in a small bazel-style
//! rule syntax. The generated tree is cleared and rewritten whole on every
//! run.

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::debug;

use crate::graph::{Module, ModuleGraph};

#[derive(Debug, Error)]
pub enum CodegenError {
  #[error("failed to clear generated tree {path}: {source}")]
  Clear {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("failed to write generated file {path}: {source}")]
  Write {
    path: PathBuf,
    #[source]
    source: io::Error,
  },
}

/// Generate the target-format tree under `root`. Returns the written
/// files, sorted.
pub fn generate(graph: &ModuleGraph, root: &Path) -> Result<Vec<PathBuf>, CodegenError> {
  match std::fs::remove_dir_all(root) {
    Ok(()) => {}
    Err(err) if err.kind() == io::ErrorKind::NotFound => {}
    Err(source) => {
      return Err(CodegenError::Clear {
        path: root.to_path_buf(),
        source,
      });
    }
  }

  let mut by_dir: BTreeMap<PathBuf, Vec<&Module>> = BTreeMap::new();
  for module in graph.modules() {
    by_dir.entry(module.dir.clone()).or_default().push(module);
  }

  let mut written = Vec::with_capacity(by_dir.len());
  for (dir, modules) in by_dir {
    let content = render_file(&modules, &dir, graph);
    let out_dir = if dir == Path::new(".") { root.to_path_buf() } else { root.join(&dir) };
    let path = out_dir.join("BUILD");
    std::fs::create_dir_all(&out_dir)
      .and_then(|_| std::fs::write(&path, content))
      .map_err(|source| CodegenError::Write {
        path: path.clone(),
        source,
      })?;
    debug!(path = %path.display(), modules = modules.len(), "generated definition file");
    written.push(path);
  }
  written.sort();
  Ok(written)
}

fn render_file(modules: &[&Module], dir: &Path, graph: &ModuleGraph) -> String {
  let mut out = String::from("# Generated by strata-build. Do not edit.\n");
  for module in modules {
    let _ = write!(out, "\nstrata_{}(\n    name = \"{}\",\n", module.def.kind, module.def.name);
    if !module.srcs.is_empty() {
      out.push_str("    srcs = [\n");
      for src in &module.srcs {
        let rel = src.strip_prefix(dir).unwrap_or(src);
        let _ = writeln!(out, "        \"{}\",", rel.to_string_lossy().replace('\\', "/"));
      }
      out.push_str("    ],\n");
    }
    let deps = graph.deps_of(&module.id());
    if !deps.is_empty() {
      out.push_str("    deps = [\n");
      for dep in deps {
        let _ = writeln!(out, "        \"//{}\",", dep.id());
      }
      out.push_str("    ],\n");
    }
    out.push_str(")\n");
  }
  out
}

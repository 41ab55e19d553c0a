//! Module graph and executable build graph types.
//!
//! The analysis engine parses module definition files into [`ModuleDef`]s,
//! expands their sources, and links them into a [`ModuleGraph`] (a petgraph
//! DAG with edges from dependency to dependent). Lowering turns the graph
//! into a [`BuildGraph`], the executor-consumable list of actions.
//!
//! # Determinism
//!
//! Modules are keyed by qualified id in a `BTreeMap`, nodes are inserted in
//! id order, and actions are emitted in topological order with that same
//! insertion order as tie-break, so two runs over the same tree produce
//! byte-identical output.

pub mod docs;
pub mod dump;

use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};

use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

/// Errors raised while linking or ordering the module graph.
#[derive(Debug, Error)]
pub enum GraphError {
  #[error("module {module} depends on {dep}, which does not exist")]
  Unresolved { module: String, dep: String },

  #[error("module {module} depends on {dep} in namespace {namespace}, which is not exported")]
  NotExported {
    module: String,
    dep: String,
    namespace: String,
  },

  #[error("dependency {dep} of module {module} is ambiguous: {candidates:?}")]
  Ambiguous {
    module: String,
    dep: String,
    candidates: Vec<String>,
  },

  #[error("dependency cycle involving module {module}")]
  Cycle { module: String },

  #[error("duplicate module {id}")]
  Duplicate { id: String },
}

/// One module definition as written in a definition file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleDef {
  pub name: String,
  pub kind: String,
  /// Glob patterns relative to the defining directory.
  #[serde(default)]
  pub srcs: Vec<String>,
  /// Plain names (same directory or an exported namespace) or
  /// `dir:name` qualified references.
  #[serde(default)]
  pub deps: Vec<String>,
  /// Action command template; `${in}` and `${out}` are substituted.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub cmd: Option<String>,
  /// In mixed mode this module's outputs come from the external build
  /// system instead of native lowering.
  #[serde(default)]
  pub external: bool,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub doc: Option<String>,
}

/// The on-disk shape of a definition file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefFile {
  pub modules: Vec<ModuleDef>,
}

/// A definition bound to its directory, with sources expanded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Module {
  pub def: ModuleDef,
  /// Directory of the defining file, relative to the source root
  /// (`.` for the root itself).
  pub dir: PathBuf,
  /// Expanded source files, relative to the source root, sorted.
  pub srcs: Vec<PathBuf>,
}

impl Module {
  /// Qualified id, `dir:name`.
  pub fn id(&self) -> String {
    qualified_id(&self.dir, &self.def.name)
  }
}

pub fn qualified_id(dir: &Path, name: &str) -> String {
  format!("{}:{}", namespace_of(dir), name)
}

fn namespace_of(dir: &Path) -> String {
  let text = dir.to_string_lossy().replace('\\', "/");
  if text.is_empty() { ".".to_string() } else { text }
}

/// Name-resolution policy: which namespaces (source-relative directories)
/// are visible from everywhere in the tree. The root namespace is always
/// exported.
#[derive(Debug, Clone)]
pub struct NameResolver {
  exported: Vec<String>,
}

impl NameResolver {
  pub fn new(exported_namespaces: &[String]) -> Self {
    let mut exported: Vec<String> = exported_namespaces.to_vec();
    exported.push(".".to_string());
    exported.sort();
    exported.dedup();
    Self { exported }
  }

  fn is_exported(&self, namespace: &str) -> bool {
    self.exported.iter().any(|ns| ns == namespace)
  }
}

/// The linked module dependency graph.
#[derive(Debug, Default)]
pub struct ModuleGraph {
  graph: DiGraph<Module, ()>,
  by_id: BTreeMap<String, NodeIndex>,
}

impl ModuleGraph {
  /// Link modules into a graph, resolving every `deps` entry under the
  /// given policy.
  ///
  /// With `allow_missing`, an unresolvable plain or qualified reference
  /// drops the edge instead of failing; visibility and ambiguity
  /// violations stay fatal because the reference names something that
  /// does exist.
  pub fn link(modules: Vec<Module>, resolver: &NameResolver, allow_missing: bool) -> Result<Self, GraphError> {
    let mut graph = DiGraph::new();
    let mut by_id: BTreeMap<String, NodeIndex> = BTreeMap::new();

    // Deterministic node order: sort by id before insertion.
    let mut modules = modules;
    modules.sort_by_key(Module::id);
    for module in modules {
      let id = module.id();
      if by_id.contains_key(&id) {
        return Err(GraphError::Duplicate { id });
      }
      let idx = graph.add_node(module);
      by_id.insert(id, idx);
    }

    // name -> [(namespace, id)] for plain-name resolution.
    let mut by_name: BTreeMap<String, Vec<(String, String)>> = BTreeMap::new();
    for (id, idx) in &by_id {
      let module = &graph[*idx];
      by_name
        .entry(module.def.name.clone())
        .or_default()
        .push((namespace_of(&module.dir), id.clone()));
    }

    let mut edges: Vec<(NodeIndex, NodeIndex)> = Vec::new();
    for (id, idx) in &by_id {
      let module = &graph[*idx];
      let from_ns = namespace_of(&module.dir);
      for dep in &module.def.deps {
        match resolve_dep(id, &from_ns, dep, resolver, &by_name) {
          Ok(dep_id) => {
            let dep_idx = by_id[&dep_id];
            edges.push((dep_idx, *idx));
          }
          Err(GraphError::Unresolved { .. }) if allow_missing => {
            debug!(module = %id, dep = %dep, "allowing missing dependency");
          }
          Err(err) => return Err(err),
        }
      }
    }
    for (from, to) in edges {
      graph.add_edge(from, to, ());
    }

    let linked = Self { graph, by_id };
    linked.toposorted()?;
    Ok(linked)
  }

  /// Modules in dependency order (dependencies before dependents).
  pub fn toposorted(&self) -> Result<Vec<&Module>, GraphError> {
    let order = toposort(&self.graph, None).map_err(|cycle| GraphError::Cycle {
      module: self.graph[cycle.node_id()].id(),
    })?;
    Ok(order.into_iter().map(|idx| &self.graph[idx]).collect())
  }

  /// Modules in id order.
  pub fn modules(&self) -> impl Iterator<Item = &Module> {
    self.by_id.values().map(|idx| &self.graph[*idx])
  }

  pub fn get(&self, id: &str) -> Option<&Module> {
    self.by_id.get(id).map(|idx| &self.graph[*idx])
  }

  /// Resolved dependencies of a module, in id order.
  pub fn deps_of(&self, id: &str) -> Vec<&Module> {
    let Some(idx) = self.by_id.get(id) else {
      return Vec::new();
    };
    let mut deps: Vec<&Module> = self
      .graph
      .neighbors_directed(*idx, petgraph::Direction::Incoming)
      .map(|dep_idx| &self.graph[dep_idx])
      .collect();
    deps.sort_by_key(|module| module.id());
    deps
  }

  pub fn len(&self) -> usize {
    self.by_id.len()
  }

  pub fn is_empty(&self) -> bool {
    self.by_id.is_empty()
  }
}

fn resolve_dep(
  module: &str,
  from_ns: &str,
  dep: &str,
  resolver: &NameResolver,
  by_name: &BTreeMap<String, Vec<(String, String)>>,
) -> Result<String, GraphError> {
  if let Some((namespace, name)) = dep.rsplit_once(':') {
    // Qualified reference: must exist, and its namespace must be visible.
    let id = format!("{namespace}:{name}");
    let exists = by_name
      .get(name)
      .is_some_and(|candidates| candidates.iter().any(|(_, cand)| cand == &id));
    if !exists {
      return Err(GraphError::Unresolved {
        module: module.to_string(),
        dep: dep.to_string(),
      });
    }
    if namespace != from_ns && !resolver.is_exported(namespace) {
      return Err(GraphError::NotExported {
        module: module.to_string(),
        dep: dep.to_string(),
        namespace: namespace.to_string(),
      });
    }
    return Ok(id);
  }

  // Plain name: same namespace wins, then exported namespaces.
  let candidates = by_name.get(dep).map(Vec::as_slice).unwrap_or_default();
  if let Some((_, id)) = candidates.iter().find(|(ns, _)| ns == from_ns) {
    return Ok(id.clone());
  }
  let visible: Vec<&String> = candidates
    .iter()
    .filter(|(ns, _)| resolver.is_exported(ns))
    .map(|(_, id)| id)
    .collect();
  match visible.as_slice() {
    [] => Err(GraphError::Unresolved {
      module: module.to_string(),
      dep: dep.to_string(),
    }),
    [id] => Ok((*id).clone()),
    _ => Err(GraphError::Ambiguous {
      module: module.to_string(),
      dep: dep.to_string(),
      candidates: visible.into_iter().cloned().collect(),
    }),
  }
}

/// One executor-consumable action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Action {
  pub module: String,
  pub command: String,
  pub inputs: Vec<PathBuf>,
  pub outputs: Vec<PathBuf>,
}

/// The executable build graph, primary output of the build activities.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildGraph {
  pub actions: Vec<Action>,
}

impl BuildGraph {
  /// Serialize to the primary output file.
  pub fn write(&self, path: &Path) -> io::Result<()> {
    let mut payload = serde_json::to_string_pretty(self).map_err(io::Error::other)?;
    payload.push('\n');
    std::fs::write(path, payload)
  }
}

#[cfg(test)]
pub(crate) fn test_module(dir: &str, name: &str, deps: &[&str]) -> Module {
  Module {
    def: ModuleDef {
      name: name.to_string(),
      kind: "library".to_string(),
      srcs: Vec::new(),
      deps: deps.iter().map(|d| d.to_string()).collect(),
      cmd: None,
      external: false,
      doc: None,
    },
    dir: PathBuf::from(dir),
    srcs: Vec::new(),
  }
}

//! JSON module-graph dump.
//!
//! Debugging surface for external tooling: the whole module graph in one
//! JSON document, requested through the `STRATA_DUMP_JSON_MODULE_GRAPH`
//! environment variable.

use std::path::PathBuf;

use serde::Serialize;

use crate::graph::ModuleGraph;

#[derive(Debug, Serialize)]
struct DumpModule<'a> {
  id: String,
  name: &'a str,
  kind: &'a str,
  dir: String,
  srcs: &'a [PathBuf],
  deps: Vec<String>,
  external: bool,
}

/// Render the module graph as a JSON array, one entry per module, in id
/// order with resolved dependency ids.
pub fn render(graph: &ModuleGraph) -> String {
  let entries: Vec<DumpModule<'_>> = graph
    .modules()
    .map(|module| DumpModule {
      id: module.id(),
      name: &module.def.name,
      kind: &module.def.kind,
      dir: module.dir.to_string_lossy().replace('\\', "/"),
      srcs: &module.srcs,
      deps: graph.deps_of(&module.id()).iter().map(|dep| dep.id()).collect(),
      external: module.def.external,
    })
    .collect();
  let mut out = serde_json::to_string_pretty(&entries).expect("module dump serializes");
  out.push('\n');
  out
}

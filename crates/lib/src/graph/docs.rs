//! Documentation emission for the Docs activity.

use std::fmt::Write as _;

use crate::graph::ModuleGraph;

/// Render a markdown summary of every module in the graph.
pub fn render(graph: &ModuleGraph) -> String {
  let mut out = String::new();
  out.push_str("# Module reference\n");
  for module in graph.modules() {
    let _ = writeln!(out, "\n## {}\n", module.id());
    if let Some(doc) = &module.def.doc {
      let _ = writeln!(out, "{doc}\n");
    }
    let _ = writeln!(out, "- kind: `{}`", module.def.kind);
    let _ = writeln!(out, "- sources: {}", module.srcs.len());
    let deps = graph.deps_of(&module.id());
    if !deps.is_empty() {
      let ids: Vec<String> = deps.iter().map(|dep| dep.id()).collect();
      let _ = writeln!(out, "- deps: {}", ids.join(", "));
    }
  }
  out
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::graph::{ModuleGraph, NameResolver, test_module};

  #[test]
  fn renders_one_section_per_module() {
    let modules = vec![test_module("a", "lib", &[]), test_module("a", "bin", &["lib"])];
    let graph = ModuleGraph::link(modules, &NameResolver::new(&[]), false).unwrap();
    let docs = render(&graph);
    assert!(docs.contains("## a:lib"));
    assert!(docs.contains("## a:bin"));
    assert!(docs.contains("- deps: a:lib"));
  }
}

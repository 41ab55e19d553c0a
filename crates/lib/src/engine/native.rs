//! Default analysis engine.
//!
//! Reads the module list, parses each definition file, expands `srcs`
//! globs, links the module graph under the configured name-resolution
//! policy, and lowers to an executable build graph unless the pass stops at
//! resolution.

use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::config::Config;
use crate::engine::{AnalysisEngine, EngineError, PassOutcome, PassRequest, StopStage};
use crate::external::ActionRequest;
use crate::graph::{Action, BuildGraph, Module, ModuleGraph, NameResolver};

#[derive(Debug, Default)]
pub struct NativeEngine;

impl NativeEngine {
  pub fn new() -> Self {
    Self
  }
}

impl AnalysisEngine for NativeEngine {
  fn run_pass(&self, config: &Config, request: &PassRequest) -> Result<PassOutcome, EngineError> {
    let mut consulted: Vec<PathBuf> = Vec::new();
    let modules = load_modules(config, &mut consulted)?;
    info!(
      modules = modules.len(),
      conversion = request.conversion,
      "linking module graph"
    );

    let resolver = NameResolver::new(config.exported_namespaces());
    let graph = ModuleGraph::link(modules, &resolver, config.allow_missing_deps())?;

    let external_actions = if config.external_enabled() {
      collect_external_actions(&graph)
    } else {
      Vec::new()
    };

    let lowered = if request.conversion || request.stop == StopStage::Resolve {
      None
    } else {
      Some(lower(&graph, config)?)
    };

    Ok(PassOutcome {
      modules: graph,
      graph: lowered,
      files_consulted: consulted,
      external_actions,
    })
  }
}

/// Parse the module list and every definition file it names.
fn load_modules(config: &Config, consulted: &mut Vec<PathBuf>) -> Result<Vec<Module>, EngineError> {
  let list_path = config.module_list();
  let list = std::fs::read_to_string(list_path).map_err(|source| EngineError::ModuleList {
    path: list_path.to_path_buf(),
    source,
  })?;
  consulted.push(list_path.to_path_buf());

  let mut modules = Vec::new();
  for line in list.lines() {
    let entry = line.trim();
    if entry.is_empty() || entry.starts_with('#') {
      continue;
    }
    let rel = PathBuf::from(entry);
    let def_path = config.abs(&rel);
    let content = std::fs::read_to_string(&def_path).map_err(|source| EngineError::ReadDef {
      path: def_path.clone(),
      source,
    })?;
    consulted.push(def_path.clone());

    let def_file: crate::graph::DefFile =
      serde_json::from_str(&content).map_err(|source| EngineError::ParseDef {
        path: def_path.clone(),
        source,
      })?;

    let dir = rel.parent().filter(|p| !p.as_os_str().is_empty()).map_or_else(
      || PathBuf::from("."),
      Path::to_path_buf,
    );
    for def in def_file.modules {
      let srcs = expand_srcs(config, &dir, &def.srcs, &def_path, consulted)?;
      debug!(module = %def.name, dir = %dir.display(), srcs = srcs.len(), "loaded module");
      modules.push(Module { def, dir: dir.clone(), srcs });
    }
  }
  Ok(modules)
}

/// Expand `srcs` glob patterns relative to the defining directory.
///
/// Every expanded member is recorded as a consulted file; a pattern with no
/// matches expands to nothing.
fn expand_srcs(
  config: &Config,
  dir: &Path,
  patterns: &[String],
  def_path: &Path,
  consulted: &mut Vec<PathBuf>,
) -> Result<Vec<PathBuf>, EngineError> {
  let base = config.abs(dir);
  let mut srcs = Vec::new();
  for pattern in patterns {
    let full = base.join(pattern);
    let full_text = full.to_string_lossy().into_owned();
    let matches = glob::glob(&full_text).map_err(|source| EngineError::Pattern {
      pattern: pattern.clone(),
      path: def_path.to_path_buf(),
      source,
    })?;
    for entry in matches {
      let path = entry.map_err(|source| EngineError::Expand {
        pattern: pattern.clone(),
        source,
      })?;
      if !path.is_file() {
        continue;
      }
      consulted.push(path.clone());
      let rel = path.strip_prefix(config.source_root()).map_or_else(|_| path.clone(), Path::to_path_buf);
      srcs.push(rel);
    }
  }
  srcs.sort();
  srcs.dedup();
  Ok(srcs)
}

fn collect_external_actions(graph: &ModuleGraph) -> Vec<ActionRequest> {
  graph
    .modules()
    .filter(|module| module.def.external)
    .map(|module| ActionRequest {
      module: module.id(),
      inputs: module.srcs.clone(),
    })
    .collect()
}

/// Lower the module graph to executor actions, in dependency order.
fn lower(graph: &ModuleGraph, config: &Config) -> Result<BuildGraph, EngineError> {
  let order = graph.toposorted()?;
  let mut outputs_by_id: std::collections::BTreeMap<String, Vec<PathBuf>> = std::collections::BTreeMap::new();
  let mut actions = Vec::with_capacity(order.len());

  for module in order {
    let id = module.id();
    let external_outputs = config
      .external_results()
      .and_then(|results| results.outputs.get(&id))
      .filter(|_| module.def.external);

    let outputs = match external_outputs {
      Some(paths) => paths.clone(),
      None => vec![
        PathBuf::from("obj")
          .join(&module.dir)
          .join(format!("{}.out", module.def.name)),
      ],
    };

    let mut inputs: Vec<PathBuf> = match external_outputs {
      // The external system already consumed the sources; the native action
      // just imports its outputs.
      Some(paths) => paths.clone(),
      None => module.srcs.clone(),
    };
    for dep in graph.deps_of(&id) {
      if let Some(dep_outputs) = outputs_by_id.get(&dep.id()) {
        inputs.extend(dep_outputs.iter().cloned());
      }
    }

    let template = match (&module.def.cmd, external_outputs.is_some()) {
      (Some(cmd), _) => cmd.clone(),
      (None, true) => "strata-import ${in} -o ${out}".to_string(),
      (None, false) => format!("strata-{} ${{in}} -o ${{out}}", module.def.kind),
    };
    let command = substitute(&template, &inputs, &outputs);

    outputs_by_id.insert(id.clone(), outputs.clone());
    actions.push(Action {
      module: id,
      command,
      inputs,
      outputs,
    });
  }

  Ok(BuildGraph { actions })
}

fn substitute(template: &str, inputs: &[PathBuf], outputs: &[PathBuf]) -> String {
  let join = |paths: &[PathBuf]| {
    paths
      .iter()
      .map(|p| p.to_string_lossy().replace('\\', "/"))
      .collect::<Vec<_>>()
      .join(" ")
  };
  template.replace("${in}", &join(inputs)).replace("${out}", &join(outputs))
}

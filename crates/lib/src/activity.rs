//! Activity selection and the top-level run loop.
//!
//! Exactly one activity runs per invocation. Selection looks only at the
//! configuration and the tracked environment, so every variable that
//! influenced the choice ends up in the used-env record.

use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::info;

use crate::account::{self, AccountError, DepSet};
use crate::config::{self, Config};
use crate::convert::{self, ConvertError};
use crate::engine::{AnalysisEngine, EngineError, PassRequest, StopStage};
use crate::external::ExternalBuilder;
use crate::graph::{docs, dump, BuildGraph};
use crate::mixed::{self, MixedError};
use crate::view::{self, ViewError};

/// What this invocation does. At most one per run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Activity {
  /// Render module documentation and stop.
  Docs(PathBuf),
  /// Generate target-format definitions and plant the overlay workspace.
  FormatConversion { marker: PathBuf },
  /// Generate a standalone definition tree for external tooling.
  ExternalWorkspaceView { dir: PathBuf },
  /// Dump the resolved module graph as JSON.
  ModuleGraphDump { path: PathBuf },
  /// Two-pass build coordinated with the external build system.
  MixedModeBuild,
  /// Single-pass build, everything handled natively.
  PlainBuild,
}

#[derive(Debug, Error)]
pub enum ActivityError {
  #[error(transparent)]
  Engine(#[from] EngineError),

  #[error(transparent)]
  Convert(#[from] ConvertError),

  #[error(transparent)]
  View(#[from] ViewError),

  #[error(transparent)]
  Mixed(#[from] MixedError),

  #[error(transparent)]
  Account(#[from] AccountError),

  #[error("build produced no graph")]
  MissingGraph,

  #[error("failed to write {what} {path}")]
  Write {
    what: &'static str,
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },
}

/// Pick the activity for this invocation.
///
/// Precedence: docs, then conversion, then workspace view, then graph
/// dump, then a build (mixed when the external switch is on, plain
/// otherwise). The dump path comes from the environment so external
/// drivers can request it without touching the command line.
pub fn select(config: &Config) -> Activity {
  if let Some(path) = config.docs_file() {
    return Activity::Docs(path.to_path_buf());
  }
  if let Some(marker) = config.convert_marker() {
    return Activity::FormatConversion {
      marker: marker.to_path_buf(),
    };
  }
  if let Some(dir) = config.view_dir() {
    return Activity::ExternalWorkspaceView { dir: dir.to_path_buf() };
  }
  if let Some(path) = config.env().get(config::DUMP_MODULE_GRAPH) {
    if !path.is_empty() {
      return Activity::ModuleGraphDump {
        path: config.abs(Path::new(&path)),
      };
    }
  }
  if config.external_enabled() {
    Activity::MixedModeBuild
  } else {
    Activity::PlainBuild
  }
}

/// Run the selected activity end to end and return its primary output.
///
/// Every activity except docs finishes by flushing the accounting
/// records and touching the primary output, in that order, so a primary
/// output never postdates its own dependency record.
pub fn run(
  config: &Config,
  engine: &dyn AnalysisEngine,
  external: &dyn ExternalBuilder,
) -> Result<PathBuf, ActivityError> {
  let activity = select(config);
  info!(activity = ?activity, "selected activity");

  let mut deps = DepSet::default();
  deps.add(config.available_env_file().to_path_buf());
  if let Some(used) = config.used_env_file() {
    deps.add(used.to_path_buf());
  }
  if let Some(depfile) = config.depfile() {
    deps.add(depfile.to_path_buf());
  }

  let primary = match &activity {
    Activity::Docs(path) => {
      let outcome = engine.run_pass(config, &PassRequest::build(StopStage::Resolve))?;
      write_text(path, &docs::render(&outcome.modules), "docs file")?;
      // Docs are a terminal query: no graph, no accounting.
      return Ok(path.clone());
    }
    Activity::FormatConversion { marker } => {
      convert::run(config, engine, &mut deps)?;
      marker.clone()
    }
    Activity::ExternalWorkspaceView { dir } => view::run(config, engine, dir, &mut deps)?,
    Activity::ModuleGraphDump { path } => {
      let outcome = engine.run_pass(config, &PassRequest::build(StopStage::Resolve))?;
      deps.extend(outcome.files_consulted);
      write_text(path, &dump::render(&outcome.modules), "module graph dump")?;
      // The primary output still appears, so callers that stat it see
      // this invocation, but it carries no actions.
      write_graph(&BuildGraph::default(), config.output_file())?;
      config.output_file().to_path_buf()
    }
    Activity::MixedModeBuild => {
      let graph = mixed::run(config, engine, external, &mut deps)?;
      write_graph(&graph, config.output_file())?;
      config.output_file().to_path_buf()
    }
    Activity::PlainBuild => {
      let outcome = engine.run_pass(config, &PassRequest::build(StopStage::Full))?;
      deps.extend(outcome.files_consulted);
      let graph = if config.empty_graph_file() {
        BuildGraph::default()
      } else {
        outcome.graph.ok_or(ActivityError::MissingGraph)?
      };
      write_graph(&graph, config.output_file())?;
      config.output_file().to_path_buf()
    }
  };

  if let Some(depfile) = config.depfile() {
    account::write_depfile(depfile, &primary, &deps)?;
  }
  if let Some(used_env) = config.used_env_file() {
    account::write_used_env(used_env, &config.env().used())?;
  }
  account::touch(&primary)?;
  Ok(primary)
}

fn write_text(path: &Path, content: &str, what: &'static str) -> Result<(), ActivityError> {
  if let Some(parent) = path.parent() {
    fs::create_dir_all(parent).map_err(|source| ActivityError::Write {
      what,
      path: path.to_path_buf(),
      source,
    })?;
  }
  fs::write(path, content).map_err(|source| ActivityError::Write {
    what,
    path: path.to_path_buf(),
    source,
  })
}

fn write_graph(graph: &BuildGraph, path: &Path) -> Result<(), ActivityError> {
  if let Some(parent) = path.parent() {
    fs::create_dir_all(parent).map_err(|source| ActivityError::Write {
      what: "build graph",
      path: path.to_path_buf(),
      source,
    })?;
  }
  graph.write(path).map_err(|source| ActivityError::Write {
    what: "build graph",
    path: path.to_path_buf(),
    source,
  })
}

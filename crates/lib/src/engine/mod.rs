//! Analysis engine interface.
//!
//! One engine invocation ("pass") parses the module definitions, links the
//! module graph, and optionally lowers it to an executable build graph. The
//! orchestration pipeline only depends on the [`AnalysisEngine`] trait; the
//! shipped [`NativeEngine`] is the default implementation, and tests drive
//! the pipeline with stub engines.

pub mod native;

pub use native::NativeEngine;

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::config::Config;
use crate::external::ActionRequest;
use crate::graph::{BuildGraph, GraphError, ModuleGraph};

/// How far a pass proceeds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopStage {
  /// Parse and link only; no executable graph is produced.
  Resolve,
  /// Lower to an executable graph, but the caller discards it instead of
  /// writing it (mixed-mode exploratory pass).
  BeforeGraphWrite,
  /// Lower and hand the graph back for emission.
  Full,
}

/// Parameters of one engine invocation.
#[derive(Debug, Clone, Copy)]
pub struct PassRequest {
  pub stop: StopStage,
  /// Conversion passes feed format codegen instead of a build; they never
  /// lower.
  pub conversion: bool,
}

impl PassRequest {
  pub fn conversion() -> Self {
    Self {
      stop: StopStage::Resolve,
      conversion: true,
    }
  }

  pub fn build(stop: StopStage) -> Self {
    Self { stop, conversion: false }
  }
}

/// What one pass produced.
#[derive(Debug)]
pub struct PassOutcome {
  /// The linked module graph.
  pub modules: ModuleGraph,
  /// The executable build graph; absent for `StopStage::Resolve` passes.
  pub graph: Option<BuildGraph>,
  /// Every file consulted: the module list, definition files, and every
  /// expanded glob member. Feeds the dependency record.
  pub files_consulted: Vec<PathBuf>,
  /// Actions delegated to the external build system; empty unless the
  /// external build is enabled.
  pub external_actions: Vec<ActionRequest>,
}

/// Engine-level failures. Always fatal to the pass, never downgraded.
#[derive(Debug, Error)]
pub enum EngineError {
  #[error("failed to read module list {path}: {source}")]
  ModuleList {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("failed to read definition file {path}: {source}")]
  ReadDef {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("failed to parse definition file {path}: {source}")]
  ParseDef {
    path: PathBuf,
    #[source]
    source: serde_json::Error,
  },

  #[error("invalid source pattern {pattern:?} in {path}: {source}")]
  Pattern {
    pattern: String,
    path: PathBuf,
    #[source]
    source: glob::PatternError,
  },

  #[error("failed to expand source pattern {pattern:?}: {source}")]
  Expand {
    pattern: String,
    #[source]
    source: glob::GlobError,
  },

  #[error(transparent)]
  Graph(#[from] GraphError),
}

/// One invocation of the module-graph analysis engine.
pub trait AnalysisEngine {
  /// Run a pass under the given configuration.
  ///
  /// The allow-missing-dependencies flag and the exported-namespace policy
  /// are taken from `config` unchanged.
  fn run_pass(&self, config: &Config, request: &PassRequest) -> Result<PassOutcome, EngineError>;
}

//! Two-pass mixed-mode build coordination.
//!
//! Pass one runs the analysis to just before graph emission, collecting the
//! actions delegated to the external build system. The external builder is
//! invoked once with those actions, and pass two re-runs the analysis with
//! the results injected, producing the final graph. When no actions are
//! delegated the invocation is skipped and the second pass still runs, so a
//! module set with no external modules produces the same graph as a plain
//! build.

use std::fmt;

use thiserror::Error;
use tracing::info;

use crate::account::DepSet;
use crate::config::Config;
use crate::engine::{AnalysisEngine, EngineError, PassRequest, StopStage};
use crate::external::{ExternalBuilder, ExternalError, ExternalOutcome, ExternalResults};
use crate::graph::BuildGraph;

/// Where the coordinator currently is; logged at each transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
  /// First pass: discover delegated actions.
  Exploring,
  /// External builder running.
  Invoking,
  /// Second pass: final graph with results injected.
  Finalizing,
}

impl fmt::Display for Phase {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let name = match self {
      Phase::Exploring => "exploring",
      Phase::Invoking => "invoking",
      Phase::Finalizing => "finalizing",
    };
    f.write_str(name)
  }
}

#[derive(Debug, Error)]
pub enum MixedError {
  #[error(transparent)]
  Engine(#[from] EngineError),

  #[error(transparent)]
  External(#[from] ExternalError),

  #[error("final pass produced no build graph")]
  MissingGraph,
}

/// Run both passes and return the final build graph. Files consulted by
/// either pass land in `deps`.
pub fn run(
  config: &Config,
  engine: &dyn AnalysisEngine,
  builder: &dyn ExternalBuilder,
  deps: &mut DepSet,
) -> Result<BuildGraph, MixedError> {
  info!(phase = %Phase::Exploring, "mixed-mode pass");
  let first = engine.run_pass(config, &PassRequest::build(StopStage::BeforeGraphWrite))?;
  deps.extend(first.files_consulted);

  let results = if first.external_actions.is_empty() {
    info!("no delegated actions; skipping external builder");
    ExternalResults::default()
  } else {
    info!(phase = %Phase::Invoking, actions = first.external_actions.len(), "mixed-mode pass");
    let outcome = builder.invoke(&first.external_actions)?;
    // The handoff files are inputs of the final graph: a re-run of the
    // external system must invalidate the primary output.
    deps.extend(outcome.files);
    outcome.results
  };

  info!(phase = %Phase::Finalizing, "mixed-mode pass");
  let final_config = config.for_final_pass(results);
  let second = engine.run_pass(&final_config, &PassRequest::build(StopStage::Full))?;
  deps.extend(second.files_consulted);
  second.graph.ok_or(MixedError::MissingGraph)
}

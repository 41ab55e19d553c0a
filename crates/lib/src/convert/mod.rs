//! Format conversion pipeline.
//!
//! Runs the analysis engine in conversion mode, generates the target-format
//! definition tree under `<out>/convert`, and plants the overlay workspace
//! under `<out>/workspace`. The conversion marker itself is touched by the
//! activity driver after accounting, so a marker only ever exists for a
//! fully completed conversion.

pub mod codegen;

pub use codegen::CodegenError;

use std::path::PathBuf;

use thiserror::Error;
use tracing::info;

use crate::account::DepSet;
use crate::config::Config;
use crate::engine::{AnalysisEngine, EngineError, PassRequest};
use crate::overlay::{self, ExcludeSet, OverlayError};

#[derive(Debug, Error)]
pub enum ConvertError {
  #[error(transparent)]
  Engine(#[from] EngineError),

  #[error(transparent)]
  Codegen(#[from] CodegenError),

  #[error(transparent)]
  Overlay(#[from] OverlayError),
}

/// Directory under the output dir that receives generated definitions.
pub const GENERATED_DIR: &str = "convert";

/// Directory under the output dir that receives the overlay workspace.
pub const WORKSPACE_DIR: &str = "workspace";

/// Build the exclude set for this invocation's overlay.
pub fn exclude_set(config: &Config) -> ExcludeSet {
  let out_rel = config.out_dir().strip_prefix(config.source_root()).ok();
  ExcludeSet::new(out_rel, config.overlay_excludes())
}

/// Run the conversion pipeline. Consulted and examined paths land in
/// `deps`.
pub fn run(config: &Config, engine: &dyn AnalysisEngine, deps: &mut DepSet) -> Result<(), ConvertError> {
  let outcome = engine.run_pass(config, &PassRequest::conversion())?;
  deps.extend(outcome.files_consulted);

  let generated = generated_root(config);
  let written = codegen::generate(&outcome.modules, &generated)?;
  info!(files = written.len(), root = %generated.display(), "generated target-format definitions");

  let examined = overlay::plant_forest(
    config.source_root(),
    &generated,
    &workspace_root(config),
    &exclude_set(config),
  )?;
  deps.extend(examined);
  Ok(())
}

/// Where the generated tree for this invocation lives.
pub fn generated_root(config: &Config) -> PathBuf {
  config.out_dir().join(GENERATED_DIR)
}

/// Where the overlay workspace for this invocation lives.
pub fn workspace_root(config: &Config) -> PathBuf {
  config.out_dir().join(WORKSPACE_DIR)
}

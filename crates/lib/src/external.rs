//! External build system invocation.
//!
//! In mixed-mode builds part of the module graph is delegated to a second,
//! independently invoked build system. The exploratory analysis pass collects
//! the action requests; [`ExternalBuilder::invoke`] hands them over in one
//! blocking call and returns the produced outputs, which the final pass then
//! consumes through a derived configuration.
//!
//! The handoff is file-based: the requests are written as JSON next to the
//! expected results file, and the external command is invoked with both paths
//! as arguments. This layer imposes no timeout; the external system owns its
//! own cancellation policy.

use std::collections::BTreeMap;
use std::io;
use std::path::PathBuf;
use std::process::Command;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

/// Errors from the external build system handoff.
#[derive(Debug, Error)]
pub enum ExternalError {
  #[error("external build requested but no external command is configured")]
  NoCommand,

  #[error("failed to encode external request payload: {source}")]
  EncodeRequest {
    #[source]
    source: serde_json::Error,
  },

  #[error("failed to write external request file {path}: {source}")]
  WriteRequest {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("failed to spawn external build command {program}: {source}")]
  Spawn {
    program: String,
    #[source]
    source: io::Error,
  },

  #[error("external build command {program} failed with exit code {code:?}")]
  Failed { program: String, code: Option<i32> },

  #[error("failed to read external results file {path}: {source}")]
  ReadResults {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("failed to parse external results file {path}: {source}")]
  ParseResults {
    path: PathBuf,
    #[source]
    source: serde_json::Error,
  },
}

/// One action the module graph delegates to the external build system.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionRequest {
  /// Qualified module id (`dir:name`).
  pub module: String,
  /// Source files the external system needs, relative to the source root.
  pub inputs: Vec<PathBuf>,
}

/// Outputs produced by the external build system, keyed by module id.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalResults {
  pub outputs: BTreeMap<String, Vec<PathBuf>>,
}

/// What one external invocation produced, plus the handoff files involved.
#[derive(Debug, Clone, Default)]
pub struct ExternalOutcome {
  pub results: ExternalResults,
  /// Files written or read during the handoff. These feed the dependency
  /// record: a changed results file must invalidate the primary output.
  pub files: Vec<PathBuf>,
}

/// One synchronous invocation of the external build system.
pub trait ExternalBuilder {
  /// Invoke the external system with the discovered action requests.
  ///
  /// Any non-zero result is fatal; partial results are never consumed.
  fn invoke(&self, requests: &[ActionRequest]) -> Result<ExternalOutcome, ExternalError>;
}

/// [`ExternalBuilder`] that spawns a configured command.
///
/// The command is run as `<program> <requests.json> <results.json>` with the
/// work directory created on demand under the output directory.
pub struct CommandBuilder {
  program: Option<PathBuf>,
  work_dir: PathBuf,
}

impl CommandBuilder {
  pub fn new(program: Option<PathBuf>, work_dir: PathBuf) -> Self {
    Self { program, work_dir }
  }
}

impl ExternalBuilder for CommandBuilder {
  fn invoke(&self, requests: &[ActionRequest]) -> Result<ExternalOutcome, ExternalError> {
    let Some(program) = &self.program else {
      return Err(ExternalError::NoCommand);
    };
    let program_label = program.display().to_string();

    let request_path = self.work_dir.join("requests.json");
    let results_path = self.work_dir.join("results.json");
    let payload = serde_json::to_string_pretty(requests)
      .map_err(|source| ExternalError::EncodeRequest { source })?;
    std::fs::create_dir_all(&self.work_dir)
      .and_then(|_| std::fs::write(&request_path, payload))
      .map_err(|source| ExternalError::WriteRequest {
        path: request_path.clone(),
        source,
      })?;

    info!(program = %program_label, requests = requests.len(), "invoking external build system");
    let status = Command::new(program)
      .arg(&request_path)
      .arg(&results_path)
      .status()
      .map_err(|source| ExternalError::Spawn {
        program: program_label.clone(),
        source,
      })?;
    if !status.success() {
      return Err(ExternalError::Failed {
        program: program_label,
        code: status.code(),
      });
    }

    let content = std::fs::read_to_string(&results_path).map_err(|source| ExternalError::ReadResults {
      path: results_path.clone(),
      source,
    })?;
    let results: ExternalResults = serde_json::from_str(&content).map_err(|source| ExternalError::ParseResults {
      path: results_path.clone(),
      source,
    })?;
    debug!(modules = results.outputs.len(), "external build results loaded");
    Ok(ExternalOutcome {
      results,
      files: vec![request_path, results_path],
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn missing_command_is_an_error() {
    let builder = CommandBuilder::new(None, PathBuf::from("/tmp/unused"));
    let err = builder.invoke(&[]).unwrap_err();
    assert!(matches!(err, ExternalError::NoCommand));
  }

  #[cfg(unix)]
  #[test]
  fn failing_command_is_fatal() {
    let temp = tempfile::TempDir::new().unwrap();
    let builder = CommandBuilder::new(Some(PathBuf::from("/bin/false")), temp.path().to_path_buf());
    let err = builder.invoke(&[]).unwrap_err();
    assert!(matches!(err, ExternalError::Failed { .. }));
  }

  #[cfg(unix)]
  #[test]
  fn successful_command_results_are_parsed() {
    let temp = tempfile::TempDir::new().unwrap();
    // Stand-in external builder: ignores the request file and echoes a fixed
    // results file.
    let script = temp.path().join("builder.sh");
    std::fs::write(
      &script,
      "#!/bin/sh\necho '{\"outputs\":{\"a:lib\":[\"out/a.o\"]}}' > \"$2\"\n",
    )
    .unwrap();
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

    let builder = CommandBuilder::new(Some(script), temp.path().join("work"));
    let outcome = builder
      .invoke(&[ActionRequest {
        module: "a:lib".to_string(),
        inputs: vec![PathBuf::from("a/one.c")],
      }])
      .unwrap();
    assert_eq!(outcome.results.outputs["a:lib"], vec![PathBuf::from("out/a.o")]);
    // Both handoff files are reported for dependency accounting.
    assert_eq!(
      outcome.files,
      vec![temp.path().join("work/requests.json"), temp.path().join("work/results.json")]
    );
  }
}

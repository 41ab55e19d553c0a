//! Environment snapshot access with read tracking.
//!
//! The driver never reads the process environment directly. The outer build
//! tool dumps the available environment to a file before invoking us, and
//! every lookup goes through [`Env`], which records the name of each variable
//! read. At the end of a successful run the recorded pairs are re-serialized
//! as the used-environment record so the next invocation can detect staleness
//! by comparing values.

use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use thiserror::Error;

/// Errors that can occur while reading the available-environment snapshot.
#[derive(Debug, Error)]
pub enum EnvError {
  #[error("failed to read environment file {path}: {source}")]
  Read {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("malformed line {line} in environment file {path}: {text:?}")]
  Malformed { path: PathBuf, line: usize, text: String },
}

/// The available-environment snapshot plus the record of every name read.
///
/// Cloning shares the used-variable record: a configuration derived for a
/// later analysis pass keeps appending to the same record, so the final
/// used-environment file covers the whole invocation.
#[derive(Debug, Clone)]
pub struct Env {
  vars: BTreeMap<String, String>,
  used: Arc<Mutex<BTreeMap<String, String>>>,
}

impl Env {
  /// Load the snapshot from a line-oriented `NAME=value` file.
  ///
  /// Blank lines and lines starting with `#` are ignored. A line without
  /// `=` is a malformed-snapshot error.
  pub fn from_file(path: &Path) -> Result<Self, EnvError> {
    let content = std::fs::read_to_string(path).map_err(|source| EnvError::Read {
      path: path.to_path_buf(),
      source,
    })?;
    let vars = parse(&content, path)?;
    Ok(Self {
      vars,
      used: Arc::new(Mutex::new(BTreeMap::new())),
    })
  }

  /// Build a snapshot directly from pairs. Used by tests and by derived
  /// configurations that already hold a parsed snapshot.
  pub fn from_pairs<I, K, V>(pairs: I) -> Self
  where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Into<String>,
  {
    Self {
      vars: pairs.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
      used: Arc::new(Mutex::new(BTreeMap::new())),
    }
  }

  /// Look up a variable, recording the read.
  ///
  /// A name that is absent from the snapshot is still recorded (with an
  /// empty value) so that a variable added to the environment later also
  /// invalidates the previous run.
  pub fn get(&self, name: &str) -> Option<String> {
    let value = self.vars.get(name).cloned();
    let mut used = self.used.lock().expect("env read tracker poisoned");
    used.insert(name.to_string(), value.clone().unwrap_or_default());
    value
  }

  /// True if the variable reads as the literal string `true`.
  pub fn is_true(&self, name: &str) -> bool {
    self.get(name).as_deref() == Some("true")
  }

  /// Snapshot of every (name, value) pair read so far.
  pub fn used(&self) -> BTreeMap<String, String> {
    self.used.lock().expect("env read tracker poisoned").clone()
  }
}

fn parse(content: &str, path: &Path) -> Result<BTreeMap<String, String>, EnvError> {
  let mut vars = BTreeMap::new();
  for (idx, raw) in content.lines().enumerate() {
    let line = raw.trim();
    if line.is_empty() || line.starts_with('#') {
      continue;
    }
    let Some((name, value)) = line.split_once('=') else {
      return Err(EnvError::Malformed {
        path: path.to_path_buf(),
        line: idx + 1,
        text: raw.to_string(),
      });
    };
    vars.insert(name.trim().to_string(), value.to_string());
  }
  Ok(vars)
}

/// Serialize (name, value) pairs into the `NAME=value` file format.
pub fn serialize(pairs: &BTreeMap<String, String>) -> String {
  let mut out = String::new();
  for (name, value) in pairs {
    out.push_str(name);
    out.push('=');
    out.push_str(value);
    out.push('\n');
  }
  out
}

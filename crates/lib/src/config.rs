//! Per-invocation configuration.
//!
//! One [`Config`] is constructed at startup and passed by shared reference to
//! every component; it is immutable after construction. All mutation happens
//! on the [`ConfigBuilder`], so the write-once-then-freeze discipline is
//! enforced by the type system rather than by convention.
//!
//! Mixed-mode builds derive a second configuration with
//! [`Config::for_final_pass`]; the original is never mutated.

use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::env::Env;
use crate::external::ExternalResults;

/// Environment variable that enables lenient dependency resolution.
pub const ALLOW_MISSING_DEPENDENCIES: &str = "ALLOW_MISSING_DEPENDENCIES";

/// Environment variable that enables the mixed-mode external build.
pub const USE_EXTERNAL_BUILD: &str = "STRATA_USE_EXTERNAL";

/// Environment variable holding the module-graph JSON dump path, if any.
pub const DUMP_MODULE_GRAPH: &str = "STRATA_DUMP_JSON_MODULE_GRAPH";

/// Configuration construction errors, reported before any pass runs.
#[derive(Debug, Error)]
pub enum ConfigError {
  #[error("--module-list not set")]
  MissingModuleList,

  #[error("external build enabled via {USE_EXTERNAL_BUILD} but --external-cmd not set")]
  MissingExternalCommand,
}

/// Immutable per-invocation configuration.
#[derive(Debug, Clone)]
pub struct Config {
  source_root: PathBuf,
  out_dir: PathBuf,
  output_file: PathBuf,
  depfile: Option<PathBuf>,
  module_list: PathBuf,
  env: Env,
  available_env_file: PathBuf,
  used_env_file: Option<PathBuf>,
  docs_file: Option<PathBuf>,
  convert_marker: Option<PathBuf>,
  view_dir: Option<PathBuf>,
  overlay_excludes: Vec<PathBuf>,
  exported_namespaces: Vec<String>,
  external_cmd: Option<PathBuf>,
  empty_graph_file: bool,
  allow_missing_deps: bool,
  external_enabled: bool,
  external_results: Option<ExternalResults>,
}

impl Config {
  /// Root of the source tree (`--top`).
  pub fn source_root(&self) -> &Path {
    &self.source_root
  }

  /// Output directory, absolute.
  pub fn out_dir(&self) -> &Path {
    &self.out_dir
  }

  /// Primary output path for build activities, absolute.
  pub fn output_file(&self) -> &Path {
    &self.output_file
  }

  /// Dependency record path, if requested.
  pub fn depfile(&self) -> Option<&Path> {
    self.depfile.as_deref()
  }

  /// Module list file, absolute.
  pub fn module_list(&self) -> &Path {
    &self.module_list
  }

  /// The tracked environment snapshot.
  pub fn env(&self) -> &Env {
    &self.env
  }

  /// Path the snapshot was loaded from, for dependency accounting.
  pub fn available_env_file(&self) -> &Path {
    &self.available_env_file
  }

  pub fn used_env_file(&self) -> Option<&Path> {
    self.used_env_file.as_deref()
  }

  pub fn docs_file(&self) -> Option<&Path> {
    self.docs_file.as_deref()
  }

  pub fn convert_marker(&self) -> Option<&Path> {
    self.convert_marker.as_deref()
  }

  pub fn view_dir(&self) -> Option<&Path> {
    self.view_dir.as_deref()
  }

  /// Always-excluded subtrees for the overlay workspace, source-relative.
  pub fn overlay_excludes(&self) -> &[PathBuf] {
    &self.overlay_excludes
  }

  /// Namespaces (source-relative directories) whose modules are visible
  /// from the whole module tree. The root namespace is always exported.
  pub fn exported_namespaces(&self) -> &[String] {
    &self.exported_namespaces
  }

  pub fn external_cmd(&self) -> Option<&Path> {
    self.external_cmd.as_deref()
  }

  /// True when the primary output should be written empty without lowering.
  pub fn empty_graph_file(&self) -> bool {
    self.empty_graph_file
  }

  pub fn allow_missing_deps(&self) -> bool {
    self.allow_missing_deps
  }

  /// True when the external build system participates in this invocation.
  pub fn external_enabled(&self) -> bool {
    self.external_enabled
  }

  /// Results injected for the mixed-mode final pass, absent otherwise.
  pub fn external_results(&self) -> Option<&ExternalResults> {
    self.external_results.as_ref()
  }

  /// Derive the configuration for the mixed-mode final pass.
  ///
  /// The derived configuration shares the environment read record with the
  /// original, so variables read during the final pass still land in the
  /// used-environment record.
  pub fn for_final_pass(&self, results: ExternalResults) -> Config {
    let mut derived = self.clone();
    derived.external_results = Some(results);
    derived
  }

  /// Resolve a source-relative path against the source root.
  pub fn abs(&self, path: &Path) -> PathBuf {
    if path.is_absolute() {
      path.to_path_buf()
    } else {
      self.source_root.join(path)
    }
  }
}

/// Builder for [`Config`]. All flags are applied here; `build` freezes them.
pub struct ConfigBuilder {
  source_root: PathBuf,
  out_dir: PathBuf,
  output_file: PathBuf,
  depfile: Option<PathBuf>,
  module_list: Option<PathBuf>,
  env: Env,
  available_env_file: PathBuf,
  used_env_file: Option<PathBuf>,
  docs_file: Option<PathBuf>,
  convert_marker: Option<PathBuf>,
  view_dir: Option<PathBuf>,
  overlay_excludes: Vec<PathBuf>,
  exported_namespaces: Vec<String>,
  external_cmd: Option<PathBuf>,
  empty_graph_file: bool,
}

impl ConfigBuilder {
  /// Start a builder from the three always-required inputs: source root,
  /// output directory, and the parsed environment snapshot.
  pub fn new(source_root: PathBuf, out_dir: PathBuf, env: Env, available_env_file: PathBuf) -> Self {
    Self {
      source_root,
      out_dir,
      output_file: PathBuf::from("build.graph"),
      depfile: None,
      module_list: None,
      env,
      available_env_file,
      used_env_file: None,
      docs_file: None,
      convert_marker: None,
      view_dir: None,
      overlay_excludes: Vec::new(),
      exported_namespaces: Vec::new(),
      external_cmd: None,
      empty_graph_file: false,
    }
  }

  pub fn output_file(mut self, path: PathBuf) -> Self {
    self.output_file = path;
    self
  }

  pub fn depfile(mut self, path: Option<PathBuf>) -> Self {
    self.depfile = path;
    self
  }

  pub fn module_list(mut self, path: PathBuf) -> Self {
    self.module_list = Some(path);
    self
  }

  pub fn used_env_file(mut self, path: Option<PathBuf>) -> Self {
    self.used_env_file = path;
    self
  }

  pub fn docs_file(mut self, path: Option<PathBuf>) -> Self {
    self.docs_file = path;
    self
  }

  pub fn convert_marker(mut self, path: Option<PathBuf>) -> Self {
    self.convert_marker = path;
    self
  }

  pub fn view_dir(mut self, path: Option<PathBuf>) -> Self {
    self.view_dir = path;
    self
  }

  pub fn overlay_excludes(mut self, excludes: Vec<PathBuf>) -> Self {
    self.overlay_excludes = excludes;
    self
  }

  pub fn exported_namespaces(mut self, namespaces: Vec<String>) -> Self {
    self.exported_namespaces = namespaces;
    self
  }

  pub fn external_cmd(mut self, cmd: Option<PathBuf>) -> Self {
    self.external_cmd = cmd;
    self
  }

  pub fn empty_graph_file(mut self, empty: bool) -> Self {
    self.empty_graph_file = empty;
    self
  }

  /// Freeze the configuration.
  ///
  /// Reads `ALLOW_MISSING_DEPENDENCIES` and the external-build switch from
  /// the tracked snapshot here, so those reads always appear in the
  /// used-environment record. Relative paths are resolved against the
  /// source root.
  pub fn build(self) -> Result<Config, ConfigError> {
    let module_list = self.module_list.ok_or(ConfigError::MissingModuleList)?;

    let allow_missing_deps = self.env.is_true(ALLOW_MISSING_DEPENDENCIES);
    let external_enabled = self.env.is_true(USE_EXTERNAL_BUILD);
    if external_enabled && self.external_cmd.is_none() {
      return Err(ConfigError::MissingExternalCommand);
    }

    let root = self.source_root;
    let join = |p: PathBuf| if p.is_absolute() { p } else { root.join(p) };
    let join_opt = |p: Option<PathBuf>| p.map(&join);

    let out_dir = join(self.out_dir);
    Ok(Config {
      output_file: join(self.output_file),
      depfile: join_opt(self.depfile),
      module_list: join(module_list),
      env: self.env,
      available_env_file: join(self.available_env_file),
      used_env_file: join_opt(self.used_env_file),
      docs_file: join_opt(self.docs_file),
      convert_marker: join_opt(self.convert_marker),
      view_dir: join_opt(self.view_dir),
      overlay_excludes: self.overlay_excludes,
      exported_namespaces: self.exported_namespaces,
      external_cmd: self.external_cmd,
      empty_graph_file: self.empty_graph_file,
      allow_missing_deps,
      external_enabled,
      external_results: None,
      out_dir,
      source_root: root,
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn builder(env: Env) -> ConfigBuilder {
    ConfigBuilder::new(
      PathBuf::from("/src"),
      PathBuf::from("out"),
      env,
      PathBuf::from("out/env.available"),
    )
    .module_list(PathBuf::from("out/modules.list"))
  }

  #[test]
  fn missing_module_list_is_an_error() {
    let cfg = ConfigBuilder::new(
      PathBuf::from("/src"),
      PathBuf::from("out"),
      Env::from_pairs::<_, &str, &str>([]),
      PathBuf::from("env"),
    )
    .build();
    assert!(matches!(cfg, Err(ConfigError::MissingModuleList)));
  }

  #[test]
  fn flags_are_read_from_the_tracked_snapshot() {
    let env = Env::from_pairs([(ALLOW_MISSING_DEPENDENCIES, "true"), (USE_EXTERNAL_BUILD, "false")]);
    let cfg = builder(env.clone()).build().unwrap();
    assert!(cfg.allow_missing_deps());
    assert!(!cfg.external_enabled());
    // Both switches must land in the used-environment record.
    let used = env.used();
    assert!(used.contains_key(ALLOW_MISSING_DEPENDENCIES));
    assert!(used.contains_key(USE_EXTERNAL_BUILD));
  }

  #[test]
  fn external_build_requires_a_command() {
    let env = Env::from_pairs([(USE_EXTERNAL_BUILD, "true")]);
    let cfg = builder(env).build();
    assert!(matches!(cfg, Err(ConfigError::MissingExternalCommand)));
  }

  #[test]
  fn relative_paths_resolve_against_the_source_root() {
    let cfg = builder(Env::from_pairs::<_, &str, &str>([])).build().unwrap();
    assert_eq!(cfg.out_dir(), Path::new("/src/out"));
    assert_eq!(cfg.module_list(), Path::new("/src/out/modules.list"));
    assert_eq!(cfg.output_file(), Path::new("/src/build.graph"));
  }

  #[test]
  fn derived_config_shares_the_env_record() {
    let env = Env::from_pairs([("LATE", "v")]);
    let cfg = builder(env.clone()).build().unwrap();
    let derived = cfg.for_final_pass(ExternalResults::default());
    derived.env().get("LATE");
    assert!(env.used().contains_key("LATE"));
    assert!(derived.external_results().is_some());
    assert!(cfg.external_results().is_none());
  }
}

//! Shared test helpers for CLI integration tests.

use std::path::PathBuf;

use assert_cmd::Command;
use assert_cmd::cargo::cargo_bin_cmd;
use tempfile::TempDir;

/// Isolated test environment: a temporary source tree the driver runs
/// against.
pub struct TestEnv {
  pub temp: TempDir,
}

impl TestEnv {
  /// Create an empty tree containing only an environment snapshot.
  pub fn empty() -> Self {
    let env = TestEnv { temp: TempDir::new().unwrap() };
    env.write_file("env.available", "PATH=/usr/bin\n");
    env
  }

  /// Create a tree with one directory of modules: a library built from
  /// two C files and a binary depending on it.
  pub fn seeded() -> Self {
    let env = TestEnv::empty();
    env.write_file("lib/one.c", "int one;\n");
    env.write_file("lib/two.c", "int two;\n");
    env.write_file(
      "lib/strata.json",
      r#"{"modules":[
        {"name":"core","kind":"library","srcs":["*.c"]},
        {"name":"tool","kind":"binary","deps":["core"]}
      ]}"#,
    );
    env.write_file("modules.list", "lib/strata.json\n");
    env
  }

  /// Write a file relative to the tree root.
  pub fn write_file(&self, relative_path: &str, content: &str) {
    let path = self.temp.path().join(relative_path);
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(&path, content).unwrap();
  }

  pub fn path(&self, relative_path: &str) -> PathBuf {
    self.temp.path().join(relative_path)
  }

  pub fn read(&self, relative_path: &str) -> String {
    std::fs::read_to_string(self.path(relative_path))
      .unwrap_or_else(|e| panic!("failed to read {relative_path}: {e}"))
  }

  /// A driver command pointed at this tree, with the snapshot and module
  /// list already wired up.
  pub fn driver(&self) -> Command {
    let mut cmd: Command = cargo_bin_cmd!("strata-build");
    cmd.current_dir(self.temp.path());
    cmd.args([
      "--top",
      ".",
      "--out",
      "out",
      "--available-env",
      "env.available",
      "--module-list",
      "modules.list",
    ]);
    cmd
  }

  /// A driver command with no environment snapshot flag.
  pub fn driver_without_env(&self) -> Command {
    let mut cmd: Command = cargo_bin_cmd!("strata-build");
    cmd.current_dir(self.temp.path());
    cmd.args(["--top", ".", "--out", "out", "--module-list", "modules.list"]);
    cmd
  }
}

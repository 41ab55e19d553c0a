//! Build activities: plain builds, graph dumps, docs, and accounting.

use predicates::prelude::*;

use crate::common::TestEnv;

#[test]
fn plain_build_writes_graph_depfile_and_used_env() {
  let env = TestEnv::seeded();
  env
    .driver()
    .args(["-o", "out/build.graph", "-d", "out/build.graph.d", "--used-env", "out/env.used"])
    .assert()
    .success();

  let graph: serde_json::Value = serde_json::from_str(&env.read("out/build.graph")).unwrap();
  let actions = graph["actions"].as_array().unwrap();
  assert_eq!(actions.len(), 2);
  assert_eq!(actions[0]["module"], "lib:core");
  assert_eq!(actions[1]["module"], "lib:tool");

  let depfile = env.read("out/build.graph.d");
  assert!(depfile.contains("build.graph:"));
  assert!(depfile.contains("modules.list"));
  assert!(depfile.contains("lib/strata.json"));
  assert!(depfile.contains("lib/one.c"));
  assert!(depfile.contains("lib/two.c"));
  // The accounting files themselves are dependencies of the output.
  assert!(depfile.contains("env.available"));
  assert!(depfile.contains("env.used"));
}

#[test]
fn used_env_records_every_variable_consulted() {
  let env = TestEnv::seeded();
  env
    .driver()
    .args(["-o", "out/build.graph", "--used-env", "out/env.used"])
    .assert()
    .success();

  let used = env.read("out/env.used");
  // Selection and configuration always consult these, present or not.
  assert!(used.contains("ALLOW_MISSING_DEPENDENCIES=\n"));
  assert!(used.contains("STRATA_USE_EXTERNAL=\n"));
  assert!(used.contains("STRATA_DUMP_JSON_MODULE_GRAPH=\n"));
  // Unread snapshot variables stay out of the record.
  assert!(!used.contains("PATH="));
}

#[test]
fn missing_snapshot_is_fatal_before_any_output() {
  let env = TestEnv::seeded();
  env
    .driver_without_env()
    .args(["-o", "out/build.graph", "-d", "out/build.graph.d", "--used-env", "out/env.used"])
    .assert()
    .failure()
    .stderr(predicate::str::contains("--available-env"));

  assert!(!env.path("out/build.graph").exists());
  assert!(!env.path("out/build.graph.d").exists());
  assert!(!env.path("out/env.used").exists());
}

#[test]
fn docs_render_and_skip_accounting() {
  let env = TestEnv::seeded();
  env
    .driver()
    .args(["--docs", "out/modules.md", "-o", "out/build.graph", "--used-env", "out/env.used"])
    .assert()
    .success();

  let docs = env.read("out/modules.md");
  assert!(docs.contains("lib:core"));
  assert!(docs.contains("lib:tool"));
  // A docs run is a query: no graph, no accounting.
  assert!(!env.path("out/build.graph").exists());
  assert!(!env.path("out/env.used").exists());
}

#[test]
fn empty_graph_flag_suppresses_actions() {
  let env = TestEnv::seeded();
  env
    .driver()
    .args(["-o", "out/build.graph", "--empty-graph-file"])
    .assert()
    .success();

  let graph: serde_json::Value = serde_json::from_str(&env.read("out/build.graph")).unwrap();
  assert_eq!(graph["actions"].as_array().unwrap().len(), 0);
}

#[test]
fn dump_request_in_snapshot_wins_over_plain_build() {
  let env = TestEnv::seeded();
  env.write_file(
    "env.available",
    "PATH=/usr/bin\nSTRATA_DUMP_JSON_MODULE_GRAPH=out/modules.json\n",
  );
  env.driver().args(["-o", "out/build.graph"]).assert().success();

  let dump: serde_json::Value = serde_json::from_str(&env.read("out/modules.json")).unwrap();
  let ids: Vec<&str> = dump
    .as_array()
    .unwrap()
    .iter()
    .map(|m| m["id"].as_str().unwrap())
    .collect();
  assert_eq!(ids, vec!["lib:core", "lib:tool"]);

  // The primary output still appears, but carries no actions.
  let graph: serde_json::Value = serde_json::from_str(&env.read("out/build.graph")).unwrap();
  assert_eq!(graph["actions"].as_array().unwrap().len(), 0);
}

#[cfg(unix)]
#[test]
fn mixed_mode_runs_the_external_builder_and_imports_its_outputs() {
  use std::os::unix::fs::PermissionsExt;

  let env = TestEnv::seeded();
  env.write_file("env.available", "PATH=/usr/bin\nSTRATA_USE_EXTERNAL=true\n");
  env.write_file("gen/gen.c", "int gen;\n");
  env.write_file(
    "gen/strata.json",
    r#"{"modules":[{"name":"gen","kind":"library","srcs":["*.c"],"external":true}]}"#,
  );
  env.write_file("modules.list", "lib/strata.json\ngen/strata.json\n");
  env.write_file(
    "builder.sh",
    "#!/bin/sh\necho '{\"outputs\":{\"gen:gen\":[\"prebuilt/gen.a\"]}}' > \"$2\"\n",
  );
  std::fs::set_permissions(env.path("builder.sh"), std::fs::Permissions::from_mode(0o755)).unwrap();

  env
    .driver()
    .args(["-o", "out/build.graph", "-d", "out/build.graph.d", "--external-cmd", "./builder.sh"])
    .assert()
    .success();

  // The handoff files live under the out dir.
  assert!(env.path("out/external/requests.json").exists());
  assert!(env.path("out/external/results.json").exists());

  let graph: serde_json::Value = serde_json::from_str(&env.read("out/build.graph")).unwrap();
  let actions = graph["actions"].as_array().unwrap();
  let imported = actions.iter().find(|a| a["module"] == "gen:gen").unwrap();
  assert_eq!(imported["outputs"][0], "prebuilt/gen.a");
  assert!(imported["command"].as_str().unwrap().starts_with("strata-import"));

  // A changed external results file must invalidate the primary output.
  let depfile = env.read("out/build.graph.d");
  assert!(depfile.contains("out/external/requests.json"));
  assert!(depfile.contains("out/external/results.json"));
}

#[test]
fn unresolved_dependency_fails_unless_allowed() {
  let env = TestEnv::empty();
  env.write_file(
    "lib/strata.json",
    r#"{"modules":[{"name":"tool","kind":"binary","deps":["ghost"]}]}"#,
  );
  env.write_file("modules.list", "lib/strata.json\n");

  env
    .driver()
    .args(["-o", "out/build.graph"])
    .assert()
    .failure()
    .stderr(predicate::str::contains("ghost"));

  env.write_file("env.available", "ALLOW_MISSING_DEPENDENCIES=true\n");
  env.driver().args(["-o", "out/build.graph"]).assert().success();
}

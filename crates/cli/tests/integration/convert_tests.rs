//! Format conversion and workspace view flows.

use crate::common::TestEnv;

#[cfg(unix)]
#[test]
fn conversion_generates_definitions_and_plants_the_overlay() {
  let env = TestEnv::seeded();
  env
    .driver()
    .args([
      "--convert-marker",
      "out/convert.marker",
      "-d",
      "out/convert.d",
      "--used-env",
      "out/env.used",
    ])
    .assert()
    .success();

  // Generated definitions land under the out dir, grouped per directory.
  let generated = env.read("out/convert/lib/BUILD");
  assert!(generated.contains("strata_library("));
  assert!(generated.contains("name = \"core\""));
  assert!(generated.contains("strata_binary("));

  // The overlay workspace resolves definition paths to the generated
  // tree while sources still come from the source tree.
  let overlay_build = env.read("out/workspace/lib/BUILD");
  assert_eq!(overlay_build, generated);
  assert_eq!(env.read("out/workspace/lib/one.c"), "int one;\n");
  // The out dir itself never appears in the workspace.
  assert!(!env.path("out/workspace/out").exists());

  // The marker exists and its dependency record names what was read.
  assert!(env.path("out/convert.marker").exists());
  let depfile = env.read("out/convert.d");
  assert!(depfile.contains("convert.marker:"));
  assert!(depfile.contains("lib/strata.json"));
  assert!(depfile.contains("lib/one.c"));
}

#[cfg(unix)]
#[test]
fn conversion_leaves_no_marker_when_analysis_fails() {
  let env = TestEnv::empty();
  env.write_file(
    "lib/strata.json",
    r#"{"modules":[{"name":"tool","kind":"binary","deps":["ghost"]}]}"#,
  );
  env.write_file("modules.list", "lib/strata.json\n");

  env
    .driver()
    .args(["--convert-marker", "out/convert.marker"])
    .assert()
    .failure();
  assert!(!env.path("out/convert.marker").exists());
}

#[test]
fn view_writes_definitions_and_a_sorted_manifest() {
  let env = TestEnv::seeded();
  env.write_file("app/main.c", "int main;\n");
  env.write_file(
    "app/strata.json",
    r#"{"modules":[{"name":"app","kind":"binary","srcs":["*.c"],"deps":["lib:core"]}]}"#,
  );
  env.write_file("modules.list", "lib/strata.json\napp/strata.json\n");

  env
    .driver()
    .args(["--view-dir", "out/view", "-d", "out/view.d", "--export-namespace", "lib"])
    .assert()
    .success();

  let manifest = env.read("out/view/view.manifest");
  assert_eq!(manifest, "app/BUILD\nlib/BUILD\n");

  let app = env.read("out/view/app/BUILD");
  assert!(app.contains("strata_binary("));
  assert!(app.contains("\"//lib:core\""));

  // The manifest is the primary output the depfile describes.
  let depfile = env.read("out/view.d");
  assert!(depfile.contains("view.manifest:"));
  assert!(depfile.contains("app/strata.json"));
}

//! strata-build: the build driver binary.
//!
//! Loads the environment snapshot, assembles the invocation configuration,
//! and runs exactly one activity. All real work lives in strata-lib; this
//! binary only parses flags and reports errors.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result, bail};
use clap::Parser;
use strata_lib::activity;
use strata_lib::config::ConfigBuilder;
use strata_lib::engine::NativeEngine;
use strata_lib::env::Env;
use strata_lib::external::CommandBuilder;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// strata-build - module analysis and build graph generation
#[derive(Parser)]
#[command(name = "strata-build")]
#[command(author, version, about, long_about = None)]
struct Cli {
  /// Root of the source tree
  #[arg(long, default_value = ".")]
  top: PathBuf,

  /// Output directory
  #[arg(long, default_value = "out")]
  out: PathBuf,

  /// Environment snapshot to run against (NAME=value lines)
  #[arg(long)]
  available_env: Option<PathBuf>,

  /// Where to record the environment variables actually read
  #[arg(long)]
  used_env: Option<PathBuf>,

  /// Primary output: the build graph file
  #[arg(short, long, default_value = "build.graph")]
  output: PathBuf,

  /// Dependency record for the primary output
  #[arg(short, long)]
  depfile: Option<PathBuf>,

  /// File listing module definition files, one path per line
  #[arg(short = 'l', long)]
  module_list: PathBuf,

  /// Render module documentation to this file and stop
  #[arg(long)]
  docs: Option<PathBuf>,

  /// Run format conversion and touch this marker on completion
  #[arg(long)]
  convert_marker: Option<PathBuf>,

  /// Generate a standalone workspace view under this directory
  #[arg(long)]
  view_dir: Option<PathBuf>,

  /// Source-relative path to leave out of the overlay workspace
  #[arg(long = "overlay-exclude")]
  overlay_exclude: Vec<PathBuf>,

  /// Namespace whose modules may be referenced from other directories
  #[arg(long = "export-namespace")]
  export_namespace: Vec<String>,

  /// Program to invoke for delegated external actions
  #[arg(long)]
  external_cmd: Option<PathBuf>,

  /// Write an empty build graph regardless of the module set
  #[arg(long)]
  empty_graph_file: bool,
}

fn main() -> ExitCode {
  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::from_default_env())
    .without_time()
    .init();

  match run(Cli::parse()) {
    Ok(()) => ExitCode::SUCCESS,
    Err(err) => {
      eprintln!("error: {err}");
      for cause in err.chain().skip(1) {
        eprintln!("  caused by: {cause}");
      }
      ExitCode::FAILURE
    }
  }
}

fn run(cli: Cli) -> Result<()> {
  let top = dunce::canonicalize(&cli.top)
    .with_context(|| format!("cannot resolve source root {}", cli.top.display()))?;

  // Refuse to do anything without the environment snapshot: every output
  // this program writes is tied to the environment it ran against.
  let Some(available_env) = cli.available_env else {
    bail!("no environment snapshot; pass --available-env");
  };
  let env_path = resolve(&top, &available_env);
  let env = Env::from_file(&env_path)?;

  let config = ConfigBuilder::new(top, cli.out, env, available_env)
    .output_file(cli.output)
    .depfile(cli.depfile)
    .module_list(cli.module_list)
    .used_env_file(cli.used_env)
    .docs_file(cli.docs)
    .convert_marker(cli.convert_marker)
    .view_dir(cli.view_dir)
    .overlay_excludes(cli.overlay_exclude)
    .exported_namespaces(cli.export_namespace)
    .external_cmd(cli.external_cmd)
    .empty_graph_file(cli.empty_graph_file)
    .build()?;

  let engine = NativeEngine::new();
  let builder = CommandBuilder::new(
    config.external_cmd().map(Path::to_path_buf),
    config.out_dir().join("external"),
  );

  let primary = activity::run(&config, &engine, &builder)?;
  info!(primary = %primary.display(), "done");
  Ok(())
}

fn resolve(top: &Path, path: &Path) -> PathBuf {
  if path.is_absolute() {
    path.to_path_buf()
  } else {
    top.join(path)
  }
}

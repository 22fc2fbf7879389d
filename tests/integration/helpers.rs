//! Test helpers for integration tests

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use tempfile::TempDir;

pub const CSV: &str = "\
apiVersion: operators.coreos.com/v1alpha1
kind: ClusterServiceVersion
metadata:
  name: widget.v0.0.0
spec:
  displayName: Widget
  version: 0.0.0
";

/// A throwaway operator project
pub struct TestSource {
  _root: TempDir,
  pub path: PathBuf,
}

impl TestSource {
  /// Empty directory
  pub fn empty() -> Result<Self> {
    let root = TempDir::new()?;
    let path = root.path().to_path_buf();
    Ok(Self { _root: root, path })
  }

  /// Minimal kubebuilder layout: PROJECT, go.mod, base CSV
  pub fn operator() -> Result<Self> {
    let source = Self::empty()?;
    source.write("PROJECT", "domain: acme.io\nprojectName: widget\nrepo: github.com/acme/widget\n")?;
    source.write("go.mod", "module github.com/acme/widget\n\ngo 1.22.0\n")?;
    source.write("cmd/main.go", "package main\n\nfunc main() {}\n")?;
    source.write("config/manifests/bases/widget.clusterserviceversion.yaml", CSV)?;
    Ok(source)
  }

  pub fn write(&self, path: &str, contents: &str) -> Result<()> {
    let target = self.path.join(path);
    if let Some(parent) = target.parent() {
      std::fs::create_dir_all(parent)?;
    }
    std::fs::write(&target, contents).with_context(|| format!("Failed to write {}", target.display()))?;
    Ok(())
  }

  pub fn read(&self, path: &str) -> Result<String> {
    Ok(std::fs::read_to_string(self.path.join(path))?)
  }

  /// Run operator-rail against this source
  pub fn run(&self, args: &[&str]) -> Result<Output> {
    run_operator_rail(&self.path, args, &[])
  }

  /// Run operator-rail with extra environment variables
  pub fn run_with_env(&self, args: &[&str], env: &[(&str, &str)]) -> Result<Output> {
    run_operator_rail(&self.path, args, env)
  }
}

/// Run the operator-rail binary; the exit status is left to the caller
pub fn run_operator_rail(source: &Path, args: &[&str], env: &[(&str, &str)]) -> Result<Output> {
  let bin = env!("CARGO_BIN_EXE_operator-rail");

  let mut cmd = Command::new(bin);
  cmd.args(args).arg("--source").arg(source).env_remove("RUST_LOG");
  for (key, value) in env {
    cmd.env(key, value);
  }
  cmd.output().context("Failed to run operator-rail")
}

pub fn stdout(output: &Output) -> String {
  String::from_utf8_lossy(&output.stdout).into_owned()
}

pub fn stderr(output: &Output) -> String {
  String::from_utf8_lossy(&output.stderr).into_owned()
}

/// Exit code, panicking with both streams when the process was killed
pub fn exit_code(output: &Output) -> i32 {
  output
    .status
    .code()
    .unwrap_or_else(|| panic!("terminated by signal\nstdout: {}\nstderr: {}", stdout(output), stderr(output)))
}

//! Host executor - runs tools as local subprocesses
//!
//! Each command runs in a fresh scratch directory holding a copy of the input
//! snapshot; the directory is captured again afterwards as the output snapshot.
//! The input snapshot is never touched, so a failed command leaves no trace.

use crate::core::error::{RailResult, ResultExt};
use crate::core::executor::{ExecOutput, Executor, ToolCommand};
use crate::core::snapshot::SourceSnapshot;
use std::process::Command;
use tracing::debug;

/// Environment variables passed through to tools
const PASSTHROUGH_ENV: &[&str] = &[
  "PATH",
  "HOME",
  "USER",
  "TMPDIR",
  "GOPATH",
  "GOBIN",
  "GOCACHE",
  "GOMODCACHE",
  "GOFLAGS",
  "GOPROXY",
  "GOPRIVATE",
  "DOCKER_HOST",
  "DOCKER_CONFIG",
  "SSL_CERT_FILE",
  "HTTP_PROXY",
  "HTTPS_PROXY",
  "NO_PROXY",
];

/// Executor running commands on the host
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalExecutor;

impl LocalExecutor {
  pub fn new() -> Self {
    Self::default()
  }

  /// Build the process with an isolated environment
  ///
  /// - Clears environment variables
  /// - Whitelists toolchain, proxy and docker variables
  /// - Applies the command's own variables last
  fn command(&self, command: &ToolCommand) -> Command {
    let mut cmd = Command::new(&command.program);
    cmd.args(&command.args);

    cmd.env_clear();
    for name in PASSTHROUGH_ENV {
      if let Ok(value) = std::env::var(name) {
        cmd.env(name, value);
      }
    }
    for (key, value) in &command.env {
      cmd.env(key, value);
    }

    cmd
  }
}

impl Executor for LocalExecutor {
  fn run(&self, snapshot: &SourceSnapshot, command: &ToolCommand) -> RailResult<ExecOutput> {
    let workdir = tempfile::Builder::new()
      .prefix("operator-rail-")
      .tempdir()
      .context("Failed to create scratch directory")?;
    snapshot.materialize(workdir.path())?;

    debug!(command = %command, workdir = %workdir.path().display(), "running tool");
    let output = self
      .command(command)
      .current_dir(workdir.path())
      .output()
      .with_context(|| format!("Failed to execute {}", command.program))?;

    let next = snapshot.successor_from_dir(workdir.path())?;

    Ok(ExecOutput {
      snapshot: next,
      stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
      stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
      status: output.status.code(),
    })
  }
}

#[cfg(all(test, unix))]
mod tests {
  use super::*;

  #[test]
  fn test_command_output_becomes_next_snapshot() {
    let base = SourceSnapshot::empty().with_file("input.txt", "hello");
    let exec = LocalExecutor::new();

    let out = exec
      .run(&base, &ToolCommand::script("cat input.txt > copy.txt && echo done"))
      .unwrap();

    assert!(out.success());
    assert_eq!(out.stdout.trim(), "done");
    assert_eq!(out.snapshot.read("copy.txt"), Some(b"hello".as_slice()));
    assert_eq!(out.snapshot.generation(), base.generation() + 1);
    assert!(!base.contains("copy.txt"));
  }

  #[test]
  fn test_failed_command_reports_status() {
    let exec = LocalExecutor::new();
    let out = exec
      .run(&SourceSnapshot::empty(), &ToolCommand::script("echo broken >&2; exit 3"))
      .unwrap();

    assert_eq!(out.status, Some(3));
    assert_eq!(out.stderr.trim(), "broken");
  }

  #[test]
  fn test_missing_program_is_an_error() {
    let exec = LocalExecutor::new();
    let result = exec.run(&SourceSnapshot::empty(), &ToolCommand::new("operator-rail-no-such-tool"));
    assert!(result.is_err());
  }

  #[test]
  fn test_environment_is_isolated() {
    let exec = LocalExecutor::new();
    let cmd = ToolCommand::script("echo \"[$CARGO_PKG_NAME][$STAGE]\"").env("STAGE", "lint");
    let out = exec.run(&SourceSnapshot::empty(), &cmd).unwrap();
    assert_eq!(out.stdout.trim(), "[][lint]");
  }
}

//! External build execution
//!
//! Every external tool (controller-gen, operator-sdk, golangci-lint, opm, ...)
//! is invoked through one capability: run a command against a snapshot and get
//! back the resulting snapshot, the captured output and the exit status.
//!
//! - **local**: runs commands on the host in a scratch copy of the snapshot
//! - **provision**: decorator that installs missing tools before first use

pub mod local;
pub mod provision;

pub use local::LocalExecutor;
pub use provision::{Provisioned, ToolRequirement};

use crate::core::error::RailResult;
use crate::core::snapshot::SourceSnapshot;
use crate::utils::shell_quote;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A command line for an external tool
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCommand {
  pub program: String,
  pub args: Vec<String>,
  #[serde(default, skip_serializing_if = "Vec::is_empty")]
  pub env: Vec<(String, String)>,
}

impl ToolCommand {
  pub fn new(program: impl Into<String>) -> Self {
    Self {
      program: program.into(),
      args: Vec::new(),
      env: Vec::new(),
    }
  }

  /// Split a command line on whitespace (no quoting rules)
  pub fn parse(line: &str) -> Self {
    let mut parts = line.split_whitespace();
    let program = parts.next().unwrap_or_default();
    Self::new(program).args(parts)
  }

  /// Run a snippet through bash, for pipes and `cd`
  pub fn script(script: impl Into<String>) -> Self {
    Self::new("/bin/bash").arg("-c").arg(script)
  }

  pub fn arg(mut self, arg: impl Into<String>) -> Self {
    self.args.push(arg.into());
    self
  }

  pub fn args<I, S>(mut self, args: I) -> Self
  where
    I: IntoIterator<Item = S>,
    S: Into<String>,
  {
    self.args.extend(args.into_iter().map(Into::into));
    self
  }

  pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
    self.env.push((key.into(), value.into()));
    self
  }

  /// Whether this command invokes `tool`, directly or inside a script
  pub fn mentions(&self, tool: &str) -> bool {
    if self.program == tool || self.program.rsplit('/').next() == Some(tool) {
      return true;
    }
    if self.is_script() {
      return self.args.iter().skip(1).any(|script| {
        script
          .split(|c: char| c.is_whitespace() || matches!(c, '|' | '&' | ';' | '(' | ')'))
          .any(|word| word == tool)
      });
    }
    false
  }

  fn is_script(&self) -> bool {
    self.program.ends_with("bash") && self.args.first().map(String::as_str) == Some("-c")
  }
}

impl fmt::Display for ToolCommand {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    for (key, value) in &self.env {
      write!(f, "{}={} ", key, shell_quote(value))?;
    }
    write!(f, "{}", self.program)?;
    for arg in &self.args {
      write!(f, " {}", shell_quote(arg))?;
    }
    Ok(())
  }
}

/// Result of one external command
#[derive(Debug, Clone)]
pub struct ExecOutput {
  /// Tree as the command left it (a new generation)
  pub snapshot: SourceSnapshot,
  pub stdout: String,
  pub stderr: String,
  /// Exit code; `None` when the process was killed by a signal
  pub status: Option<i32>,
}

impl ExecOutput {
  pub fn success(&self) -> bool {
    self.status == Some(0)
  }

  /// Combined output, stdout first, for diagnostics
  pub fn combined_output(&self) -> String {
    match (self.stdout.trim_end().is_empty(), self.stderr.trim_end().is_empty()) {
      (_, true) => self.stdout.clone(),
      (true, false) => self.stderr.clone(),
      (false, false) => format!("{}\n{}", self.stdout.trim_end(), self.stderr),
    }
  }
}

/// The build-execution capability every stage relies on
///
/// `Err` means the command could not be run at all (spawn failure, I/O);
/// a command that ran and failed is an `Ok` with a non-zero status.
pub trait Executor {
  fn run(&self, snapshot: &SourceSnapshot, command: &ToolCommand) -> RailResult<ExecOutput>;
}

impl<E: Executor + ?Sized> Executor for &E {
  fn run(&self, snapshot: &SourceSnapshot, command: &ToolCommand) -> RailResult<ExecOutput> {
    (**self).run(snapshot, command)
  }
}

impl<E: Executor + ?Sized> Executor for Box<E> {
  fn run(&self, snapshot: &SourceSnapshot, command: &ToolCommand) -> RailResult<ExecOutput> {
    (**self).run(snapshot, command)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_parse_splits_on_whitespace() {
    let cmd = ToolCommand::parse("operator-sdk bundle validate ./bundle");
    assert_eq!(cmd.program, "operator-sdk");
    assert_eq!(cmd.args, vec!["bundle", "validate", "./bundle"]);
  }

  #[test]
  fn test_display_renders_env_and_quotes() {
    let cmd = ToolCommand::new("go")
      .args(["build", "-o", "manager"])
      .env("CGO_ENABLED", "0");
    assert_eq!(cmd.to_string(), "CGO_ENABLED=0 go build -o manager");

    let script = ToolCommand::script("cd config/manager && kustomize edit set image controller=x:1");
    assert_eq!(
      script.to_string(),
      "/bin/bash -c 'cd config/manager && kustomize edit set image controller=x:1'"
    );
  }

  #[test]
  fn test_mentions_direct_and_script_invocations() {
    assert!(ToolCommand::parse("opm index add").mentions("opm"));
    assert!(ToolCommand::new("/usr/local/bin/opm").mentions("opm"));
    let script = ToolCommand::script("kustomize build config/manifests | operator-sdk generate bundle -q");
    assert!(script.mentions("kustomize"));
    assert!(script.mentions("operator-sdk"));
    assert!(!script.mentions("opm"));
    assert!(!ToolCommand::parse("go build ./...").mentions("gofumpt"));
  }

  #[test]
  fn test_combined_output_prefers_both_streams() {
    let out = ExecOutput {
      snapshot: SourceSnapshot::empty(),
      stdout: "first\n".to_string(),
      stderr: "second\n".to_string(),
      status: Some(1),
    };
    assert_eq!(out.combined_output(), "first\nsecond\n");
    assert!(!out.success());
  }
}

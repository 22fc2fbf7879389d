//! Stage-attributed command execution and the build log

use crate::core::error::{RailError, RailResult, ResultExt};
use crate::core::executor::{ExecOutput, Executor, ToolCommand};
use crate::core::snapshot::SourceSnapshot;
use crate::release::stage::Stage;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// One command recorded in the build log
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
  pub stage: Stage,
  pub command: String,
  /// Exit status; `None` for signals
  pub status: Option<i32>,
  /// Captured output of a successful command
  pub output: String,
}

/// Concatenated output of every stage, in execution order
///
/// The output of a failed command is not logged; it travels in the
/// [`StageError`](crate::core::error::StageError) instead.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildLog {
  entries: Vec<LogEntry>,
}

impl BuildLog {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn push(&mut self, entry: LogEntry) {
    self.entries.push(entry);
  }

  /// Record a note that did not come from an external command
  pub fn note(&mut self, stage: Stage, message: impl Into<String>) {
    self.entries.push(LogEntry {
      stage,
      command: String::new(),
      status: Some(0),
      output: message.into(),
    });
  }

  pub fn is_empty(&self) -> bool {
    self.entries.is_empty()
  }

  /// The log as text: a header per command followed by its output
  pub fn render(&self) -> String {
    let mut out = String::new();
    for entry in &self.entries {
      if entry.command.is_empty() {
        out.push_str(&format!("==> [{}] {}\n", entry.stage, entry.output.trim_end()));
        continue;
      }
      out.push_str(&format!("==> [{}] {}\n", entry.stage, entry.command));
      match entry.status {
        Some(0) => {
          let output = entry.output.trim_end();
          if !output.is_empty() {
            out.push_str(output);
            out.push('\n');
          }
        }
        Some(code) => out.push_str(&format!("(failed with exit code {})\n", code)),
        None => out.push_str("(terminated by signal)\n"),
      }
    }
    out
  }
}

/// Called once each time the pipeline moves to a new stage
pub type StageObserver = Box<dyn FnMut(Stage)>;

/// Runs commands on behalf of a stage and records them in the build log
pub struct StageRunner<E> {
  executor: E,
  log: BuildLog,
  current: Option<Stage>,
  observer: Option<StageObserver>,
}

impl<E: Executor> StageRunner<E> {
  pub fn new(executor: E) -> Self {
    Self {
      executor,
      log: BuildLog::new(),
      current: None,
      observer: None,
    }
  }

  pub fn set_observer(&mut self, observer: StageObserver) {
    self.observer = Some(observer);
  }

  /// Mark the start of `stage`, notifying the observer on transitions
  pub fn enter(&mut self, stage: Stage) {
    if self.current == Some(stage) {
      return;
    }
    self.current = Some(stage);
    info!(stage = %stage, "entering stage");
    if let Some(observer) = self.observer.as_mut() {
      observer(stage);
    }
  }

  pub fn log(&self) -> &BuildLog {
    &self.log
  }

  pub fn log_mut(&mut self) -> &mut BuildLog {
    &mut self.log
  }

  /// Run a command; a non-zero exit becomes a stage error
  pub fn run(&mut self, stage: Stage, snapshot: &SourceSnapshot, command: &ToolCommand) -> RailResult<ExecOutput> {
    self.enter(stage);
    debug!(stage = %stage, generation = snapshot.generation(), command = %command, "stage command");

    let output = self
      .executor
      .run(snapshot, command)
      .with_context(|| format!("Stage '{}' could not run {}", stage, command))?;

    if !output.success() {
      info!(stage = %stage, status = ?output.status, "stage command failed");
      self.log.push(LogEntry {
        stage,
        command: command.to_string(),
        status: output.status,
        output: String::new(),
      });
      return Err(RailError::stage(
        stage,
        command.to_string(),
        output.status,
        output.combined_output(),
      ));
    }

    self.log.push(LogEntry {
      stage,
      command: command.to_string(),
      status: output.status,
      output: output.combined_output(),
    });
    Ok(output)
  }

  /// Run commands in order, threading the snapshot through each
  pub fn run_all(
    &mut self,
    stage: Stage,
    snapshot: &SourceSnapshot,
    commands: &[ToolCommand],
  ) -> RailResult<SourceSnapshot> {
    let mut current = snapshot.clone();
    for command in commands {
      current = self.run(stage, &current, command)?.snapshot;
    }
    Ok(current)
  }
}

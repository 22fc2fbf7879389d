//! In-memory executor and image builder for unit tests
//!
//! Both record every invocation so tests can assert on exact command lines
//! and on which stages never ran.

use crate::core::error::{RailError, RailResult};
use crate::core::executor::{ExecOutput, Executor, ToolCommand};
use crate::core::snapshot::SourceSnapshot;
use crate::release::builder::{ImageBuilder, RuntimeImage};
use crate::release::model::{ArtifactKind, ImageHandle};
use crate::release::publish::RegistryCredential;
use crate::release::stage::Stage;
use std::sync::Mutex;

type Effect = Box<dyn Fn(&SourceSnapshot, &ToolCommand) -> SourceSnapshot + Send + Sync>;

enum Rule {
  Fail { status: i32, output: String },
  Stdout(String),
  Effect(Effect),
}

/// Executor answering from a script of rules keyed by command substrings
///
/// Unmatched commands succeed with empty output and an unchanged tree.
#[derive(Default)]
pub struct ScriptedExecutor {
  rules: Vec<(String, Rule)>,
  calls: Mutex<Vec<String>>,
}

impl ScriptedExecutor {
  pub fn new() -> Self {
    Self::default()
  }

  /// Commands containing `pattern` exit with `status`
  pub fn fail_on(mut self, pattern: &str, status: i32, output: &str) -> Self {
    self.rules.push((
      pattern.to_string(),
      Rule::Fail {
        status,
        output: output.to_string(),
      },
    ));
    self
  }

  /// Commands containing `pattern` print `stdout`
  pub fn stdout_on(mut self, pattern: &str, stdout: &str) -> Self {
    self.rules.push((pattern.to_string(), Rule::Stdout(stdout.to_string())));
    self
  }

  /// Commands containing `pattern` transform the tree
  pub fn on<F>(mut self, pattern: &str, effect: F) -> Self
  where
    F: Fn(&SourceSnapshot, &ToolCommand) -> SourceSnapshot + Send + Sync + 'static,
  {
    self.rules.push((pattern.to_string(), Rule::Effect(Box::new(effect))));
    self
  }

  /// Rendered command lines, in call order
  pub fn invocations(&self) -> Vec<String> {
    self.calls.lock().map(|c| c.clone()).unwrap_or_default()
  }

  /// Whether any invocation contains `pattern`
  pub fn ran(&self, pattern: &str) -> bool {
    self.invocations().iter().any(|c| c.contains(pattern))
  }
}

impl Executor for ScriptedExecutor {
  fn run(&self, snapshot: &SourceSnapshot, command: &ToolCommand) -> RailResult<ExecOutput> {
    let rendered = command.to_string();
    if let Ok(mut calls) = self.calls.lock() {
      calls.push(rendered.clone());
    }

    let mut output = ExecOutput {
      snapshot: snapshot.edit().build(),
      stdout: String::new(),
      stderr: String::new(),
      status: Some(0),
    };

    for (pattern, rule) in &self.rules {
      if !rendered.contains(pattern.as_str()) {
        continue;
      }
      match rule {
        Rule::Fail { status, output: text } => {
          output.status = Some(*status);
          output.stderr = text.clone();
          return Ok(output);
        }
        Rule::Stdout(text) => output.stdout = text.clone(),
        Rule::Effect(effect) => output.snapshot = effect(&output.snapshot, command),
      }
    }

    Ok(output)
  }
}

/// Image builder that never touches a daemon or registry
#[derive(Default)]
pub struct FakeImages {
  fail_publish: Option<String>,
  calls: Mutex<Vec<String>>,
}

impl FakeImages {
  pub fn new() -> Self {
    Self::default()
  }

  /// Publishing a name containing `pattern` fails
  pub fn fail_publish_on(mut self, pattern: &str) -> Self {
    self.fail_publish = Some(pattern.to_string());
    self
  }

  pub fn calls(&self) -> Vec<String> {
    self.calls.lock().map(|c| c.clone()).unwrap_or_default()
  }

  /// Names pushed, in order
  pub fn published(&self) -> Vec<String> {
    self
      .calls()
      .iter()
      .filter_map(|c| c.strip_prefix("publish ").map(|rest| rest.split(' ').next().unwrap_or_default().to_string()))
      .collect()
  }

  fn record(&self, call: String) {
    if let Ok(mut calls) = self.calls.lock() {
      calls.push(call);
    }
  }
}

impl ImageBuilder for FakeImages {
  fn build_dockerfile(&self, snapshot: &SourceSnapshot, dockerfile: &str, kind: ArtifactKind) -> RailResult<ImageHandle> {
    self.record(format!("build {} {}", kind, dockerfile));
    Ok(ImageHandle::new(kind, format!("sha256:{}-{}", kind, snapshot.digest().short())))
  }

  fn package_binary(&self, snapshot: &SourceSnapshot, binary: &str, runtime: &RuntimeImage) -> RailResult<ImageHandle> {
    self.record(format!("package {} on {} as {}", binary, runtime.base, runtime.user));
    Ok(ImageHandle::new(
      ArtifactKind::Manager,
      format!("sha256:manager-{}", snapshot.digest().short()),
    ))
  }

  fn import_archive(&self, snapshot: &SourceSnapshot, archive: &str, kind: ArtifactKind) -> RailResult<ImageHandle> {
    if !snapshot.contains(archive) {
      return Err(RailError::message(format!("archive {} missing", archive)));
    }
    self.record(format!("import {} {}", kind, archive));
    Ok(ImageHandle::new(kind, format!("sha256:{}-imported", kind)))
  }

  fn publish(&self, image: &ImageHandle, name: &str, credentials: &[RegistryCredential]) -> RailResult<String> {
    self.record(format!("publish {} creds={}", name, credentials.len()));
    if let Some(pattern) = &self.fail_publish
      && name.contains(pattern.as_str())
    {
      return Err(RailError::stage(Stage::Publish, format!("push {}", name), Some(1), "denied"));
    }
    Ok(format!("{}@{}", name, image.id))
  }
}

//! Reviewable release plans
//!
//! A `--dry-run` release never touches the executor or the image builder.
//! Instead the pipeline describes every step it would take as a [`Plan`]:
//!
//! - **Dry-run mode**: show what will happen without doing it
//! - **Auditability**: plans are JSON-serializable for logging and review
//! - **Idempotency**: same options and source tree give the same plan id
//!
//! # Architecture
//!
//! ```text
//! ReleaseOptions + SourceSnapshot
//!   ↓
//! Plan (what to do)         <- --dry-run stops here
//!   ↓
//! ReleasePipeline (do it)
//!   ↓
//! ReleaseOutcome
//! ```

use crate::core::error::RailResult;
use crate::release::stage::Stage;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// Plan identifier (SHA256 hash of plan contents)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanId(String);

impl PlanId {
  /// Create a plan ID from plan contents
  pub fn from_contents(contents: &[u8]) -> Self {
    let mut hasher = Sha256::new();
    hasher.update(contents);
    let result = hasher.finalize();
    Self(format!("{:x}", result))
  }

  /// Get the short ID (first 12 characters)
  pub fn short(&self) -> &str {
    &self.0[..12.min(self.0.len())]
  }
}

impl fmt::Display for PlanId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.short())
  }
}

/// One step the release would take
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Operation {
  /// Run an external tool against the current snapshot
  Exec { stage: Stage, command: String },

  /// Point the CSV `replaces` field at the previous release
  PatchReplaces { path: String, replaces: String },

  /// Build an image from a Dockerfile in the snapshot
  BuildImage {
    stage: Stage,
    dockerfile: String,
    image: String,
  },

  /// Package a single binary onto a runtime base image
  PackageBinary {
    stage: Stage,
    binary: String,
    base: String,
    image: String,
  },

  /// Load a saved image archive back as a buildable image
  ImportArchive { archive: String, image: String },

  /// Push an image under a fully qualified name
  Publish { image: String },

  /// Persist the resolved version in the final snapshot
  WriteMarker { path: String, version: String },
}

impl Operation {
  /// Stage the operation runs in, if attributed to one
  pub fn stage(&self) -> Option<Stage> {
    match self {
      Operation::Exec { stage, .. } => Some(*stage),
      Operation::PatchReplaces { .. } => Some(Stage::Bundle),
      Operation::BuildImage { stage, .. } | Operation::PackageBinary { stage, .. } => Some(*stage),
      Operation::ImportArchive { .. } => Some(Stage::Catalog),
      Operation::Publish { .. } => Some(Stage::Publish),
      Operation::WriteMarker { .. } => None,
    }
  }
}

/// Plan metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanMetadata {
  /// Plan ID (content hash)
  pub id: PlanId,

  /// Release version the plan produces
  pub version: String,

  /// Version the release replaces, if any
  pub previous_version: Option<String>,

  /// Whether the plan pushes images to a registry
  pub is_destructive: bool,
}

/// A plan represents a sequence of operations to perform
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Plan {
  /// Plan metadata
  pub metadata: PlanMetadata,

  /// Operations to perform (in order)
  pub operations: Vec<Operation>,

  /// Human-readable summary
  pub summary: String,
}

impl Plan {
  /// Create a new plan
  pub fn new(version: impl Into<String>, previous_version: Option<String>) -> Self {
    Self {
      metadata: PlanMetadata {
        id: PlanId::from_contents(&[]),
        version: version.into(),
        previous_version,
        is_destructive: false,
      },
      operations: Vec::new(),
      summary: String::new(),
    }
  }

  /// Add an operation to the plan
  pub fn add_operation(&mut self, operation: Operation) {
    if matches!(operation, Operation::Publish { .. }) {
      self.metadata.is_destructive = true;
    }
    self.operations.push(operation);
    self.recompute_id();
  }

  /// Add an external command for `stage`
  pub fn exec(&mut self, stage: Stage, command: impl ToString) {
    self.add_operation(Operation::Exec {
      stage,
      command: command.to_string(),
    });
  }

  /// Set the summary
  pub fn with_summary(mut self, summary: impl Into<String>) -> Self {
    self.summary = summary.into();
    self
  }

  /// Recompute plan ID based on current contents
  fn recompute_id(&mut self) {
    let json = serde_json::to_vec(&(&self.metadata.version, &self.operations)).unwrap_or_default();
    self.metadata.id = PlanId::from_contents(&json);
  }

  /// Serialize to JSON
  pub fn to_json(&self) -> RailResult<String> {
    Ok(serde_json::to_string_pretty(self)?)
  }

  /// Stages touched by the plan, in order of first appearance
  pub fn stages(&self) -> Vec<Stage> {
    let mut stages = Vec::new();
    for stage in self.operations.iter().filter_map(Operation::stage) {
      if !stages.contains(&stage) {
        stages.push(stage);
      }
    }
    stages
  }

  /// Get human-readable representation
  pub fn to_human_readable(&self) -> String {
    let mut output = String::new();

    output.push_str(&format!(
      "📋 Plan: release {} ({})\n",
      self.metadata.version, self.metadata.id
    ));

    match self.metadata.previous_version {
      Some(ref previous) => output.push_str(&format!("   Replaces: {}\n", previous)),
      None => output.push_str("   Replaces: (none, fresh catalog)\n"),
    }

    if !self.summary.is_empty() {
      output.push_str(&format!("\n{}\n", self.summary));
    }

    output.push_str(&format!("\n   Operations ({}):\n", self.operations.len()));

    for (i, op) in self.operations.iter().enumerate() {
      output.push_str(&format!("   {}. {}\n", i + 1, operation_to_string(op)));
    }

    if self.metadata.is_destructive {
      output.push_str("\n⚠️  NOTE: This release pushes images to the registry\n");
      output.push_str("   (Published images are not rolled back if a later stage fails)\n");
    }

    output
  }
}

/// Convert operation to human-readable string
fn operation_to_string(op: &Operation) -> String {
  match op {
    Operation::Exec { stage, command } => format!("[{}] {}", stage, command),
    Operation::PatchReplaces { path, replaces } => format!("[bundle] Set replaces: {} in {}", replaces, path),
    Operation::BuildImage {
      stage,
      dockerfile,
      image,
    } => format!("[{}] Build {} from {}", stage, image, dockerfile),
    Operation::PackageBinary {
      stage,
      binary,
      base,
      image,
    } => format!("[{}] Package /{} on {} as {}", stage, binary, base, image),
    Operation::ImportArchive { archive, image } => format!("[catalog] Import {} as {}", archive, image),
    Operation::Publish { image } => format!("[publish] Push {}", image),
    Operation::WriteMarker { path, version } => format!("Write {} = {}", path, version),
  }
}

//! Pipeline stage identities

use serde::{Deserialize, Serialize};
use std::fmt;

/// A named step of the release pipeline
///
/// Every external command runs on behalf of exactly one stage, so failures and
/// build-log entries can always be attributed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Stage {
  /// Installing a missing tool
  Provision,
  /// CRD/RBAC/webhook generation
  Manifests,
  /// OLM bundle generation and validation
  Bundle,
  Format,
  Lint,
  VulnCheck,
  /// Transient control-plane assets for tests
  EnvTest,
  Test,
  BuildManager,
  BuildBundle,
  /// Catalog index composition
  Catalog,
  Publish,
}

impl Stage {
  pub fn as_str(&self) -> &'static str {
    match self {
      Stage::Provision => "provision",
      Stage::Manifests => "manifests",
      Stage::Bundle => "bundle",
      Stage::Format => "format",
      Stage::Lint => "lint",
      Stage::VulnCheck => "vuln-check",
      Stage::EnvTest => "envtest",
      Stage::Test => "test",
      Stage::BuildManager => "build-manager",
      Stage::BuildBundle => "build-bundle",
      Stage::Catalog => "catalog",
      Stage::Publish => "publish",
    }
  }

}

impl fmt::Display for Stage {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

//! Project descriptor (`PROJECT`) parsing

use crate::core::error::{RailError, RailResult, ValidationError};
use crate::core::snapshot::SourceSnapshot;
use serde::Deserialize;

/// Path of the project descriptor inside the source tree
pub const PROJECT_FILE: &str = "PROJECT";

/// The fields of `PROJECT` the pipeline relies on
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectDescriptor {
  pub project_name: String,
  #[serde(default)]
  pub domain: Option<String>,
  #[serde(default)]
  pub repo: Option<String>,
}

impl ProjectDescriptor {
  /// Load the descriptor from a snapshot
  ///
  /// A missing file, malformed YAML or a missing/blank `projectName` are
  /// all fatal validation errors.
  pub fn load(snapshot: &SourceSnapshot) -> RailResult<Self> {
    let contents = snapshot
      .read_string(PROJECT_FILE)?
      .ok_or_else(|| invalid("file not found in source tree"))?;
    Self::parse(&contents)
  }

  pub fn parse(contents: &str) -> RailResult<Self> {
    let descriptor: ProjectDescriptor = serde_yaml::from_str(contents).map_err(|e| invalid(e.to_string()))?;
    if descriptor.project_name.trim().is_empty() {
      return Err(invalid("projectName is empty"));
    }
    Ok(descriptor)
  }

  /// RBAC role name, unique per operator sharing a cluster
  pub fn role_name(&self) -> &str {
    &self.project_name
  }
}

fn invalid(reason: impl Into<String>) -> RailError {
  RailError::Validation(ValidationError::ProjectDescriptor {
    path: PROJECT_FILE.to_string(),
    reason: reason.into(),
  })
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::core::error::ExitCode;

  const KUBEBUILDER_PROJECT: &str = r#"
domain: example.com
layout:
- go.kubebuilder.io/v4
plugins:
  manifests.sdk.operatorframework.io/v2: {}
projectName: widget-operator
repo: github.com/acme/widget-operator
resources:
- api:
    crdVersion: v1
  group: apps
  kind: Widget
  version: v1alpha1
version: "3"
"#;

  #[test]
  fn test_parse_kubebuilder_project() {
    let project = ProjectDescriptor::parse(KUBEBUILDER_PROJECT).unwrap();
    assert_eq!(project.role_name(), "widget-operator");
    assert_eq!(project.domain.as_deref(), Some("example.com"));
  }

  #[test]
  fn test_missing_name_is_fatal() {
    let err = ProjectDescriptor::parse("domain: example.com\n").unwrap_err();
    assert_eq!(err.exit_code(), ExitCode::Validation);
    assert!(ProjectDescriptor::parse("projectName: ''\n").is_err());
    assert!(ProjectDescriptor::parse("- not\n- a mapping\n").is_err());
  }

  #[test]
  fn test_missing_file_is_fatal() {
    let err = ProjectDescriptor::load(&SourceSnapshot::empty()).unwrap_err();
    assert!(err.to_string().contains("PROJECT"));
  }
}

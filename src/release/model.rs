//! Release data model: versions, artifacts and image names

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// A resolved release
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Release {
  /// Semver version being released
  pub target_version: String,
  /// Version this release replaces, absent for fresh installs
  pub previous_version: Option<String>,
  /// OLM channels the bundle is published to
  pub channels: BTreeSet<String>,
  /// Whether the version was derived from a CI build number
  pub is_build_number: bool,
}

impl Release {
  /// Parse a comma separated channel list, ignoring blanks
  pub fn parse_channels(channels: &str) -> BTreeSet<String> {
    channels
      .split(',')
      .map(str::trim)
      .filter(|c| !c.is_empty())
      .map(str::to_string)
      .collect()
  }

  /// Channels as the comma separated form operator-sdk expects
  pub fn channels_arg(&self) -> Option<String> {
    if self.channels.is_empty() {
      None
    } else {
      Some(self.channels.iter().cloned().collect::<Vec<_>>().join(","))
    }
  }
}

/// The three images a release produces
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactKind {
  Manager,
  Bundle,
  Catalog,
}

impl ArtifactKind {
  /// Suffix appended to the repository name
  pub fn suffix(&self) -> &'static str {
    match self {
      ArtifactKind::Manager => "",
      ArtifactKind::Bundle => "-bundle",
      ArtifactKind::Catalog => "-catalog",
    }
  }
}

impl fmt::Display for ArtifactKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      ArtifactKind::Manager => write!(f, "manager"),
      ArtifactKind::Bundle => write!(f, "bundle"),
      ArtifactKind::Catalog => write!(f, "catalog"),
    }
  }
}

/// An image reference without a tag: `registry/repository[-suffix]`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ImageName {
  pub registry: String,
  pub repository: String,
  pub kind: ArtifactKind,
}

impl ImageName {
  pub fn new(registry: &str, repository: &str, kind: ArtifactKind) -> Self {
    Self {
      registry: registry.trim_end_matches('/').to_string(),
      repository: repository.trim_matches('/').to_string(),
      kind,
    }
  }

  pub fn manager(registry: &str, repository: &str) -> Self {
    Self::new(registry, repository, ArtifactKind::Manager)
  }

  pub fn bundle(registry: &str, repository: &str) -> Self {
    Self::new(registry, repository, ArtifactKind::Bundle)
  }

  pub fn catalog(registry: &str, repository: &str) -> Self {
    Self::new(registry, repository, ArtifactKind::Catalog)
  }

  /// Fully qualified name with a version tag
  pub fn tagged(&self, version: &str) -> String {
    format!("{}:{}", self, version)
  }

  /// Fully qualified name with the `latest` tag
  pub fn latest(&self) -> String {
    self.tagged("latest")
  }
}

impl fmt::Display for ImageName {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}/{}{}", self.registry, self.repository, self.kind.suffix())
  }
}

/// A built image that has not been published yet
///
/// The id is whatever the image builder uses to address the image locally.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageHandle {
  pub kind: ArtifactKind,
  pub id: String,
}

impl ImageHandle {
  pub fn new(kind: ArtifactKind, id: impl Into<String>) -> Self {
    Self { kind, id: id.into() }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_image_names() {
    let manager = ImageName::manager("quay.io/", "acme/widget");
    assert_eq!(manager.tagged("1.2.3"), "quay.io/acme/widget:1.2.3");
    assert_eq!(
      ImageName::bundle("quay.io", "acme/widget").tagged("1.2.3"),
      "quay.io/acme/widget-bundle:1.2.3"
    );
    assert_eq!(
      ImageName::catalog("quay.io", "acme/widget").latest(),
      "quay.io/acme/widget-catalog:latest"
    );
  }

  #[test]
  fn test_channels_parse_and_render_sorted() {
    let release = Release {
      target_version: "1.0.0".to_string(),
      previous_version: None,
      channels: Release::parse_channels("stable, alpha,,stable"),
      is_build_number: false,
    };
    assert_eq!(release.channels.len(), 2);
    assert_eq!(release.channels_arg().as_deref(), Some("alpha,stable"));

    let none = Release {
      channels: BTreeSet::new(),
      ..release
    };
    assert_eq!(none.channels_arg(), None);
  }
}

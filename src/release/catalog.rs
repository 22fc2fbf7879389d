//! Catalog index chaining
//!
//! Every published catalog is linked to its predecessor through `--from-index`
//! so it carries the full bundle history plus the new bundle. Isolated builds
//! skip the link and produce an index holding only the new bundle.
//!
//! | previous catalog | update | mode     | `--from-index`     |
//! |------------------|--------|----------|--------------------|
//! | any              | false  | Fresh    | none               |
//! | absent           | true   | InPlace  | the catalog itself |
//! | present          | true   | Linked   | previous catalog   |

use crate::core::error::{RailResult, ResultExt};
use crate::core::executor::{Executor, ToolCommand};
use crate::core::snapshot::SourceSnapshot;
use crate::release::builder::ImageBuilder;
use crate::release::model::{ArtifactKind, ImageHandle};
use crate::release::runner::StageRunner;
use crate::release::stage::Stage;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::info;

/// Flat archive the composed index is saved to
pub const CATALOG_ARCHIVE: &str = "catalog.tar";

/// How a catalog relates to the existing chain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CatalogMode {
  /// New index with only the new bundle
  Fresh,
  /// Extend the image currently tagged with the catalog name
  InPlace,
  /// Extend an explicit previous catalog
  Linked,
}

impl fmt::Display for CatalogMode {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      CatalogMode::Fresh => write!(f, "fresh"),
      CatalogMode::InPlace => write!(f, "in-place"),
      CatalogMode::Linked => write!(f, "linked"),
    }
  }
}

/// Inputs of one catalog build
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogRequest {
  /// Fully qualified catalog image to produce
  pub catalog: String,
  /// Fully qualified predecessor, if any
  pub previous: Option<String>,
  /// Fully qualified bundle image to add
  pub bundle: String,
  pub update: bool,
}

impl CatalogRequest {
  pub fn new(catalog: impl Into<String>, previous: Option<&str>, bundle: impl Into<String>, update: bool) -> Self {
    Self {
      catalog: catalog.into(),
      previous: previous.map(str::trim).filter(|p| !p.is_empty()).map(str::to_string),
      bundle: bundle.into(),
      update,
    }
  }

  pub fn mode(&self) -> CatalogMode {
    match (self.update, self.previous.is_some()) {
      (false, _) => CatalogMode::Fresh,
      (true, false) => CatalogMode::InPlace,
      (true, true) => CatalogMode::Linked,
    }
  }

  /// The index the new catalog inherits from
  pub fn from_index(&self) -> Option<&str> {
    match self.mode() {
      CatalogMode::Fresh => None,
      CatalogMode::InPlace => Some(&self.catalog),
      CatalogMode::Linked => self.previous.as_deref(),
    }
  }

  /// `opm index add` in semver mode
  pub fn compose_command(&self) -> ToolCommand {
    let cmd = ToolCommand::new("opm").args([
      "index",
      "add",
      "--container-tool",
      "docker",
      "--mode",
      "semver",
      "--tag",
      self.catalog.as_str(),
      "--bundles",
      self.bundle.as_str(),
    ]);
    match self.from_index() {
      Some(index) => cmd.arg("--from-index").arg(index),
      None => cmd,
    }
  }

  /// Save the composed image as a flat archive in the working tree
  pub fn save_command(&self) -> ToolCommand {
    ToolCommand::new("docker")
      .arg("save")
      .arg(format!("--output={}", CATALOG_ARCHIVE))
      .arg(&self.catalog)
  }
}

/// Compose the catalog and import it as a publishable image
///
/// The working tree only hosts the archive; it never becomes part of the
/// release snapshot.
pub fn build_catalog<E, B>(runner: &mut StageRunner<E>, images: &B, request: &CatalogRequest) -> RailResult<ImageHandle>
where
  E: Executor,
  B: ImageBuilder,
{
  info!(
    catalog = %request.catalog,
    mode = %request.mode(),
    from_index = request.from_index().unwrap_or("-"),
    "composing catalog"
  );

  let workdir = SourceSnapshot::empty();
  let composed = runner.run(Stage::Catalog, &workdir, &request.compose_command())?;
  let saved = runner.run(Stage::Catalog, &composed.snapshot, &request.save_command())?;

  let handle = images
    .import_archive(&saved.snapshot, CATALOG_ARCHIVE, ArtifactKind::Catalog)
    .with_context(|| format!("Failed to import catalog archive for {}", request.catalog))?;
  runner
    .log_mut()
    .note(Stage::Catalog, format!("{} catalog {}", request.mode(), request.catalog));
  Ok(handle)
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::release::testing::{FakeImages, ScriptedExecutor};

  const CATALOG: &str = "quay.io/acme/widget-catalog:1.3.0";
  const BUNDLE: &str = "quay.io/acme/widget-bundle:1.3.0";

  fn docker_save() -> ScriptedExecutor {
    ScriptedExecutor::new().on("docker save", |snap, _| snap.with_file(CATALOG_ARCHIVE, "tar"))
  }

  #[test]
  fn test_fresh_has_no_from_index() {
    let request = CatalogRequest::new(CATALOG, Some(""), BUNDLE, false);
    assert_eq!(request.mode(), CatalogMode::Fresh);
    assert_eq!(
      request.compose_command().to_string(),
      "opm index add --container-tool docker --mode semver --tag quay.io/acme/widget-catalog:1.3.0 --bundles quay.io/acme/widget-bundle:1.3.0"
    );
  }

  #[test]
  fn test_linked_uses_exact_previous() {
    let request = CatalogRequest::new(CATALOG, Some("repo-catalog:1.2.0"), BUNDLE, true);
    assert_eq!(request.mode(), CatalogMode::Linked);
    let cmd = request.compose_command();
    let pos = cmd.args.iter().position(|a| a == "--from-index").unwrap();
    assert_eq!(cmd.args[pos + 1], "repo-catalog:1.2.0");
  }

  #[test]
  fn test_update_without_previous_is_in_place() {
    let request = CatalogRequest::new(CATALOG, None, BUNDLE, true);
    assert_eq!(request.mode(), CatalogMode::InPlace);
    assert_eq!(request.from_index(), Some(CATALOG));
  }

  #[test]
  fn test_isolated_build_ignores_previous() {
    let request = CatalogRequest::new(CATALOG, Some("repo-catalog:1.2.0"), BUNDLE, false);
    assert_eq!(request.from_index(), None);
    assert!(!request.compose_command().to_string().contains("--from-index"));
  }

  #[test]
  fn test_build_catalog_imports_saved_archive() {
    let exec = docker_save();
    let images = FakeImages::new();
    let mut runner = StageRunner::new(&exec);
    let request = CatalogRequest::new(CATALOG, Some("quay.io/acme/widget-catalog:1.2.0"), BUNDLE, true);

    let handle = build_catalog(&mut runner, &images, &request).unwrap();

    assert_eq!(handle.kind, ArtifactKind::Catalog);
    assert_eq!(images.calls(), vec!["import catalog catalog.tar"]);
    let calls = exec.invocations();
    assert_eq!(calls.len(), 2);
    assert!(calls[0].ends_with("--from-index quay.io/acme/widget-catalog:1.2.0"));
    assert_eq!(calls[1], "docker save --output=catalog.tar quay.io/acme/widget-catalog:1.3.0");
  }

  #[test]
  fn test_compose_failure_carries_tool_output() {
    let exec = docker_save().fail_on("opm index add", 1, "error pulling image quay.io/acme/widget-catalog:1.2.0");
    let images = FakeImages::new();
    let mut runner = StageRunner::new(&exec);
    let request = CatalogRequest::new(CATALOG, Some("quay.io/acme/widget-catalog:1.2.0"), BUNDLE, true);

    let err = build_catalog(&mut runner, &images, &request).unwrap_err();

    assert_eq!(err.failed_stage(), Some(Stage::Catalog));
    assert!(err.to_string().contains("error pulling image"));
    assert!(!exec.ran("docker save"));
    assert!(images.calls().is_empty());
  }
}

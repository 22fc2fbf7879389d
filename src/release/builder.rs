//! Manager and bundle image builds
//!
//! Image building and pushing sit behind [`ImageBuilder`]; the pipeline only
//! decides what goes into each image.

use crate::core::config::ToolVersions;
use crate::core::error::{RailError, RailResult, ResultExt};
use crate::core::executor::{Executor, ToolCommand};
use crate::core::snapshot::SourceSnapshot;
use crate::release::model::{ArtifactKind, ImageHandle};
use crate::release::publish::RegistryCredential;
use crate::release::runner::StageRunner;
use crate::release::stage::Stage;
use tracing::info;

/// Output path of the compiled manager binary
pub const MANAGER_BINARY: &str = "manager";

/// Build descriptor of the bundle image
pub const BUNDLE_DOCKERFILE: &str = "bundle.Dockerfile";

/// Builds, imports and pushes container images
pub trait ImageBuilder {
  /// Build an image from a Dockerfile in the snapshot, using the snapshot as context
  fn build_dockerfile(&self, snapshot: &SourceSnapshot, dockerfile: &str, kind: ArtifactKind) -> RailResult<ImageHandle>;

  /// Put a single binary from the snapshot onto a runtime base image
  fn package_binary(&self, snapshot: &SourceSnapshot, binary: &str, runtime: &RuntimeImage) -> RailResult<ImageHandle>;

  /// Load an image archive stored in the snapshot
  fn import_archive(&self, snapshot: &SourceSnapshot, archive: &str, kind: ArtifactKind) -> RailResult<ImageHandle>;

  /// Push `image` as `name` after applying every credential; returns the digest reference
  fn publish(&self, image: &ImageHandle, name: &str, credentials: &[RegistryCredential]) -> RailResult<String>;
}

impl<B: ImageBuilder + ?Sized> ImageBuilder for &B {
  fn build_dockerfile(&self, snapshot: &SourceSnapshot, dockerfile: &str, kind: ArtifactKind) -> RailResult<ImageHandle> {
    (**self).build_dockerfile(snapshot, dockerfile, kind)
  }

  fn package_binary(&self, snapshot: &SourceSnapshot, binary: &str, runtime: &RuntimeImage) -> RailResult<ImageHandle> {
    (**self).package_binary(snapshot, binary, runtime)
  }

  fn import_archive(&self, snapshot: &SourceSnapshot, archive: &str, kind: ArtifactKind) -> RailResult<ImageHandle> {
    (**self).import_archive(snapshot, archive, kind)
  }

  fn publish(&self, image: &ImageHandle, name: &str, credentials: &[RegistryCredential]) -> RailResult<String> {
    (**self).publish(image, name, credentials)
  }
}

/// Minimal non-root image a single binary runs in
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeImage {
  pub base: String,
  /// Numeric `uid:gid`
  pub user: String,
}

impl RuntimeImage {
  pub fn from_tools(tools: &ToolVersions) -> Self {
    Self {
      base: tools.runtime_image.clone(),
      user: tools.runtime_user.clone(),
    }
  }

  /// Dockerfile placing `binary` at the root as the sole entrypoint
  pub fn dockerfile(&self, binary: &str) -> String {
    format!(
      "FROM {base}\nWORKDIR /\nCOPY {binary} /{binary}\nUSER {user}\nENTRYPOINT [\"/{binary}\"]\n",
      base = self.base,
      binary = binary,
      user = self.user,
    )
  }
}

/// Static manager build, no host C toolchain involved
pub fn manager_build_command() -> ToolCommand {
  ToolCommand::parse("go build -a -o manager cmd/main.go").env("CGO_ENABLED", "0")
}

/// Compile the manager and package it on the runtime image
///
/// The compiled binary never enters the release snapshot.
pub fn build_manager<E, B>(
  runner: &mut StageRunner<E>,
  images: &B,
  snapshot: &SourceSnapshot,
  runtime: &RuntimeImage,
) -> RailResult<ImageHandle>
where
  E: Executor,
  B: ImageBuilder,
{
  let build = manager_build_command();
  let built = runner.run(Stage::BuildManager, snapshot, &build)?;
  if !built.snapshot.contains(MANAGER_BINARY) {
    return Err(RailError::stage(
      Stage::BuildManager,
      build.to_string(),
      Some(0),
      format!("no '{}' binary produced; check that cmd/main.go is the operator entrypoint", MANAGER_BINARY),
    ));
  }

  let handle = images
    .package_binary(&built.snapshot, MANAGER_BINARY, runtime)
    .context("Failed to package manager image")?;
  info!(image = %handle.id, "built manager image");
  runner
    .log_mut()
    .note(Stage::BuildManager, format!("manager image {}", handle.id));
  Ok(handle)
}

/// Build the bundle image from `bundle.Dockerfile`
pub fn build_bundle<E, B>(runner: &mut StageRunner<E>, images: &B, snapshot: &SourceSnapshot) -> RailResult<ImageHandle>
where
  E: Executor,
  B: ImageBuilder,
{
  if !snapshot.contains(BUNDLE_DOCKERFILE) {
    return Err(RailError::with_help(
      format!("'{}' not found in source tree", BUNDLE_DOCKERFILE),
      "It is written by `operator-sdk generate bundle`; check the bundle stage output.",
    ));
  }

  let handle = images
    .build_dockerfile(snapshot, BUNDLE_DOCKERFILE, ArtifactKind::Bundle)
    .context("Failed to build bundle image")?;
  info!(image = %handle.id, "built bundle image");
  runner
    .log_mut()
    .note(Stage::BuildBundle, format!("bundle image {}", handle.id));
  Ok(handle)
}

//! Docker CLI image builder
//!
//! Build contexts are materialized from snapshots into scratch directories.
//! Registry logins go to a throwaway `DOCKER_CONFIG` so credentials never land
//! in the user's docker config.

use crate::core::error::{RailError, RailResult, ResultExt};
use crate::core::snapshot::SourceSnapshot;
use crate::release::builder::{ImageBuilder, RuntimeImage};
use crate::release::model::{ArtifactKind, ImageHandle};
use crate::release::publish::RegistryCredential;
use crate::release::stage::Stage;
use std::fs;
use std::io::Write;
use std::path::Path;
use std::process::{Command, Output, Stdio};
use tempfile::TempDir;
use tracing::debug;

/// Image builder driving the local `docker` CLI
#[derive(Debug, Clone)]
pub struct DockerImages {
  program: String,
}

impl Default for DockerImages {
  fn default() -> Self {
    Self {
      program: "docker".to_string(),
    }
  }
}

impl DockerImages {
  pub fn new() -> Self {
    Self::default()
  }

  fn scratch(prefix: &str) -> RailResult<TempDir> {
    tempfile::Builder::new()
      .prefix(prefix)
      .tempdir()
      .context("Failed to create scratch directory")
  }

  /// Run docker, turning a non-zero exit into a stage error
  fn docker(&self, stage: Stage, args: &[&str], dir: Option<&Path>, stdin: Option<&str>) -> RailResult<String> {
    let mut cmd = Command::new(&self.program);
    cmd.args(args);
    if let Some(dir) = dir {
      cmd.current_dir(dir);
    }
    let rendered = format!("{} {}", self.program, args.join(" "));
    debug!(command = %rendered, "docker");

    let output = match stdin {
      Some(input) => {
        cmd.stdin(Stdio::piped()).stdout(Stdio::piped()).stderr(Stdio::piped());
        let mut child = cmd
          .spawn()
          .with_context(|| format!("Failed to execute {}", self.program))?;
        if let Some(mut pipe) = child.stdin.take() {
          pipe.write_all(input.as_bytes())?;
        }
        child.wait_with_output()?
      }
      None => cmd
        .output()
        .with_context(|| format!("Failed to execute {}", self.program))?,
    };

    check(stage, &rendered, output)
  }

  fn build_in(&self, stage: Stage, dir: &Path, dockerfile: &str, kind: ArtifactKind) -> RailResult<ImageHandle> {
    let iidfile = dir.join(".operator-rail.iid");
    let iidfile_arg = iidfile.to_string_lossy().into_owned();
    self.docker(
      stage,
      &["build", "-f", dockerfile, "--iidfile", &iidfile_arg, "."],
      Some(dir),
      None,
    )?;
    let id = fs::read_to_string(&iidfile).with_context(|| format!("Failed to read image id for {}", kind))?;
    Ok(ImageHandle::new(kind, id.trim()))
  }
}

fn check(stage: Stage, rendered: &str, output: Output) -> RailResult<String> {
  let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
  if output.status.success() {
    return Ok(stdout);
  }
  let stderr = String::from_utf8_lossy(&output.stderr);
  Err(RailError::stage(
    stage,
    rendered,
    output.status.code(),
    format!("{}{}", stdout, stderr),
  ))
}

fn stage_for(kind: ArtifactKind) -> Stage {
  match kind {
    ArtifactKind::Manager => Stage::BuildManager,
    ArtifactKind::Bundle => Stage::BuildBundle,
    ArtifactKind::Catalog => Stage::Catalog,
  }
}

/// Image reference reported by `docker load`
pub fn parse_loaded_image(output: &str) -> Option<String> {
  output.lines().find_map(|line| {
    line
      .strip_prefix("Loaded image: ")
      .or_else(|| line.strip_prefix("Loaded image ID: "))
      .map(|image| image.trim().to_string())
  })
}

/// Digest reported by `docker push`
pub fn parse_push_digest(output: &str) -> Option<String> {
  output.lines().find_map(|line| {
    let start = line.find("digest: ")? + "digest: ".len();
    line[start..].split_whitespace().next().map(str::to_string)
  })
}

impl ImageBuilder for DockerImages {
  fn build_dockerfile(&self, snapshot: &SourceSnapshot, dockerfile: &str, kind: ArtifactKind) -> RailResult<ImageHandle> {
    let dir = Self::scratch("operator-rail-build-")?;
    snapshot.materialize(dir.path())?;
    self.build_in(stage_for(kind), dir.path(), dockerfile, kind)
  }

  fn package_binary(&self, snapshot: &SourceSnapshot, binary: &str, runtime: &RuntimeImage) -> RailResult<ImageHandle> {
    let contents = snapshot
      .read(binary)
      .ok_or_else(|| RailError::message(format!("Binary '{}' not found in build output", binary)))?;

    let dir = Self::scratch("operator-rail-package-")?;
    let mut context = SourceSnapshot::empty().edit();
    context
      .write(binary, contents.to_vec())
      .set_executable(binary, true)
      .write("Dockerfile", runtime.dockerfile(binary));
    context.build().materialize(dir.path())?;

    self.build_in(Stage::BuildManager, dir.path(), "Dockerfile", ArtifactKind::Manager)
  }

  fn import_archive(&self, snapshot: &SourceSnapshot, archive: &str, kind: ArtifactKind) -> RailResult<ImageHandle> {
    let contents = snapshot
      .read(archive)
      .ok_or_else(|| RailError::message(format!("Image archive '{}' not found", archive)))?;

    let dir = Self::scratch("operator-rail-import-")?;
    let path = dir.path().join("image.tar");
    fs::write(&path, contents).with_context(|| format!("Failed to write {}", path.display()))?;
    let path_arg = path.to_string_lossy().into_owned();

    let output = self.docker(stage_for(kind), &["load", "--input", &path_arg], None, None)?;
    let image = parse_loaded_image(&output)
      .ok_or_else(|| RailError::message(format!("docker load reported no image for {}", archive)))?;
    Ok(ImageHandle::new(kind, image))
  }

  fn publish(&self, image: &ImageHandle, name: &str, credentials: &[RegistryCredential]) -> RailResult<String> {
    let config = Self::scratch("operator-rail-docker-")?;
    let config_arg = config.path().to_string_lossy().into_owned();

    for credential in credentials {
      self.docker(
        Stage::Publish,
        &[
          "--config",
          &config_arg,
          "login",
          &credential.url,
          "--username",
          &credential.username,
          "--password-stdin",
        ],
        None,
        Some(credential.password.expose()),
      )?;
    }

    self.docker(Stage::Publish, &["tag", &image.id, name], None, None)?;
    let output = self.docker(Stage::Publish, &["--config", &config_arg, "push", name], None, None)?;

    let repository = name.rsplit_once(':').map(|(repo, _)| repo).unwrap_or(name);
    Ok(match parse_push_digest(&output) {
      Some(digest) => format!("{}@{}", repository, digest),
      None => name.to_string(),
    })
  }
}

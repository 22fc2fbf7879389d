//! OLM bundle generation
//!
//! The upgrade edge of a release is the CSV `spec.replaces` field. It is
//! patched in place, keeping the rest of the file byte-for-byte, before the
//! bundle is regenerated from kustomize output.

use crate::core::error::{RailError, RailResult};
use crate::core::executor::{Executor, ToolCommand};
use crate::core::snapshot::SourceSnapshot;
use crate::release::model::Release;
use crate::release::project::ProjectDescriptor;
use crate::release::runner::StageRunner;
use crate::release::stage::Stage;
use tracing::{debug, info};

/// Path of the base ClusterServiceVersion for a project
pub fn csv_path(project_name: &str) -> String {
  format!("config/manifests/bases/{}.clusterserviceversion.yaml", project_name)
}

/// The `replaces` value for a previous release
pub fn replaces_value(project_name: &str, previous_version: &str) -> String {
  format!("{}.v{}", project_name, previous_version)
}

/// Set `spec.replaces` in a CSV document
///
/// An existing `replaces` line directly under `spec` is rewritten, otherwise
/// one is inserted as the first key of `spec`. The result is re-parsed to make
/// sure the edit landed where OLM will read it.
pub fn set_replaces(csv: &str, replaces: &str) -> RailResult<String> {
  let lines: Vec<&str> = csv.lines().collect();
  let spec = lines.iter().position(|l| l.trim_end() == "spec:");

  let mut out: Vec<String> = lines.iter().map(|l| l.to_string()).collect();
  match spec {
    None => {
      out.push("spec:".to_string());
      out.push(format!("  replaces: {}", replaces));
    }
    Some(start) => {
      let end = lines[start + 1..]
        .iter()
        .position(|l| !l.trim().is_empty() && !l.starts_with(' ') && !l.starts_with('#'))
        .map(|offset| start + 1 + offset)
        .unwrap_or(lines.len());
      let indent = lines[start + 1..end]
        .iter()
        .find(|l| !l.trim().is_empty() && !l.trim_start().starts_with('#'))
        .map(|l| l.len() - l.trim_start().len())
        .unwrap_or(2);
      let prefix = " ".repeat(indent);
      let line = format!("{}replaces: {}", prefix, replaces);

      let existing = (start + 1..end).find(|&i| {
        let l = lines[i];
        l.len() - l.trim_start().len() == indent && l.trim_start().starts_with("replaces:")
      });
      match existing {
        Some(i) => out[i] = line,
        None => out.insert(start + 1, line),
      }
    }
  }

  let mut patched = out.join("\n");
  if csv.ends_with('\n') || csv.is_empty() {
    patched.push('\n');
  }

  verify_replaces(&patched, replaces)?;
  Ok(patched)
}

fn verify_replaces(csv: &str, expected: &str) -> RailResult<()> {
  let doc: serde_yaml::Value = serde_yaml::from_str(csv)?;
  let actual = doc.get("spec").and_then(|s| s.get("replaces")).and_then(|r| r.as_str());
  if actual != Some(expected) {
    return Err(RailError::message(format!(
      "Failed to set spec.replaces to '{}' (found {:?})",
      expected, actual
    )));
  }
  Ok(())
}

/// Point the CSV at the previous release, if there is one
///
/// Without a previous version the snapshot is returned unmodified.
pub fn patch_replaces(
  snapshot: &SourceSnapshot,
  project: &ProjectDescriptor,
  previous_version: Option<&str>,
) -> RailResult<SourceSnapshot> {
  let Some(previous) = previous_version.map(str::trim).filter(|v| !v.is_empty()) else {
    debug!("no previous version, bundle keeps no replaces edge");
    return Ok(snapshot.clone());
  };

  let path = csv_path(&project.project_name);
  let csv = snapshot.read_string(&path)?.ok_or_else(|| {
    RailError::with_help(
      format!("ClusterServiceVersion '{}' not found", path),
      "Run `operator-sdk generate kustomize manifests` once and commit the base CSV.",
    )
  })?;

  let replaces = replaces_value(&project.project_name, previous);
  let patched = set_replaces(&csv, &replaces)?;
  Ok(snapshot.with_file(&path, patched))
}

/// Bundle generation commands, in order
pub fn bundle_commands(image: &str, version: &str, channels: Option<&str>) -> Vec<ToolCommand> {
  let mut generate = format!(
    "kustomize build config/manifests | operator-sdk generate bundle -q --overwrite --version {}",
    version
  );
  if let Some(channels) = channels.filter(|c| !c.is_empty()) {
    generate.push_str(&format!(" --channels={}", channels));
  }

  vec![
    ToolCommand::parse("operator-sdk generate kustomize manifests -q --apis-dir ./api"),
    ToolCommand::script(format!(
      "cd config/manager && kustomize edit set image controller={}:{}",
      image, version
    )),
    ToolCommand::script(generate),
    ToolCommand::parse("operator-sdk bundle validate ./bundle"),
  ]
}

/// Regenerate the bundle for `release`, returning the next snapshot
pub fn generate_bundle<E: Executor>(
  runner: &mut StageRunner<E>,
  snapshot: &SourceSnapshot,
  image: &str,
  release: &Release,
) -> RailResult<SourceSnapshot> {
  let project = ProjectDescriptor::load(snapshot)?;

  let patched = patch_replaces(snapshot, &project, release.previous_version.as_deref())
    .map_err(|e| e.context(format!("Stage '{}' failed to patch the CSV", Stage::Bundle)))?;
  if let Some(previous) = release.previous_version.as_deref() {
    runner.log_mut().note(
      Stage::Bundle,
      format!("replaces: {}", replaces_value(&project.project_name, previous)),
    );
  }

  let channels = release.channels_arg();
  let next = runner.run_all(
    Stage::Bundle,
    &patched,
    &bundle_commands(image, &release.target_version, channels.as_deref()),
  )?;
  info!(version = %release.target_version, bundle = %next.subtree_digest("bundle"), "generated bundle");
  Ok(next)
}

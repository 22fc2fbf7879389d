//! CRD, RBAC and webhook manifest generation

use crate::core::error::RailResult;
use crate::core::executor::{Executor, ToolCommand};
use crate::core::snapshot::SourceSnapshot;
use crate::release::project::ProjectDescriptor;
use crate::release::runner::StageRunner;
use crate::release::stage::Stage;
use tracing::info;

/// Where controller-gen writes CRDs
pub const CRD_DIR: &str = "config/crd/bases";

/// controller-gen `crd` generator argument
pub fn crd_generator(crd_version: Option<&str>) -> String {
  match crd_version.map(str::trim).filter(|v| !v.is_empty()) {
    Some(version) => format!("crd:crdVersions={},generateEmbeddedObjectMeta=true", version),
    None => "crd:generateEmbeddedObjectMeta=true".to_string(),
  }
}

/// Generator commands, in order
///
/// The role name is the project name so operators sharing a cluster do not
/// collide on RBAC objects.
pub fn manifest_commands(role_name: &str, crd_version: Option<&str>) -> Vec<ToolCommand> {
  vec![
    ToolCommand::new("controller-gen").args([
      format!("rbac:roleName={}", role_name),
      crd_generator(crd_version),
      "webhook".to_string(),
      "paths=./...".to_string(),
      format!("output:crd:artifacts:config={}", CRD_DIR),
    ]),
    ToolCommand::new("crd")
      .args(["clean-crd", "--crd-file"])
      .arg(format!("{}/*.yaml", CRD_DIR)),
    ToolCommand::parse("controller-gen object:headerFile=hack/boilerplate.go.txt paths=./..."),
  ]
}

/// Regenerate manifests, returning the next snapshot
pub fn generate_manifests<E: Executor>(
  runner: &mut StageRunner<E>,
  snapshot: &SourceSnapshot,
  crd_version: Option<&str>,
) -> RailResult<SourceSnapshot> {
  let project = ProjectDescriptor::load(snapshot)?;
  let next = runner.run_all(
    Stage::Manifests,
    snapshot,
    &manifest_commands(project.role_name(), crd_version),
  )?;
  info!(
    project = %project.project_name,
    crds = %next.subtree_digest(CRD_DIR),
    "generated manifests"
  );
  Ok(next)
}

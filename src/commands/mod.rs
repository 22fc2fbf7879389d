//! CLI commands for operator-rail
//!
//! - **version**: Resolve and print the release version
//! - **release**: Run (or plan) the full release pipeline
//! - **catalog**: Run the catalog chainer on its own
//!
//! All commands accept `&SourceContext` so the source tree is captured once.

pub mod catalog;
pub mod release;
pub mod version;

pub use catalog::{CatalogArgs, run_catalog};
pub use release::{ReleaseArgs, run_release};
pub use version::{VersionArgs, run_version};

use crate::core::config::ToolVersions;
use crate::core::context::SourceContext;
use crate::core::error::{ConfigError, RailError, RailResult};
use crate::core::executor::{LocalExecutor, Provisioned, ToolRequirement};
use crate::release::publish::{RegistryCredential, Secret};
use clap::Args;

/// Registry location and login, shared by `release` and `catalog`
#[derive(Args, Debug, Clone, Default)]
pub struct RegistryArgs {
  /// Registry host (default: [image] registry in release.toml)
  #[arg(long)]
  pub registry: Option<String>,
  /// Repository below the registry (default: [image] repository in release.toml)
  #[arg(long)]
  pub repository: Option<String>,
  /// Registry username used to publish
  #[arg(long)]
  pub username: Option<String>,
  /// Name of the environment variable holding the registry password
  #[arg(long, value_name = "VAR")]
  pub password_env: Option<String>,
}

impl RegistryArgs {
  /// Registry and repository, flags first then release.toml
  pub fn location(&self, ctx: &SourceContext) -> RailResult<(String, String)> {
    Ok((ctx.registry(self.registry.clone())?, ctx.repository(self.repository.clone())?))
  }

  /// Login for `registry`; none when no username was given
  pub fn credentials(&self, registry: &str) -> RailResult<Vec<RegistryCredential>> {
    match (&self.username, &self.password_env) {
      (None, None) => Ok(Vec::new()),
      (Some(username), Some(var)) => Ok(vec![RegistryCredential::new(registry, username, Secret::from_env(var)?)]),
      (Some(_), None) => Err(missing("password-env")),
      (None, Some(_)) => Err(missing("username")),
    }
  }
}

fn missing(field: &str) -> RailError {
  RailError::Config(ConfigError::MissingField {
    field: field.to_string(),
  })
}

/// Host executor that installs missing tools on first use
pub fn host_executor(tools: &ToolVersions) -> Provisioned<LocalExecutor> {
  Provisioned::new(LocalExecutor::new(), ToolRequirement::release_toolchain(tools))
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_credentials_need_both_halves() {
    let args = RegistryArgs {
      username: Some("robot".to_string()),
      ..Default::default()
    };
    assert!(args.credentials("quay.io").is_err());
    assert!(RegistryArgs::default().credentials("quay.io").unwrap().is_empty());
  }
}

//! Install-if-missing decorator for executors
//!
//! Tools are probed lazily: the first command that mentions a tool triggers a
//! probe (`<tool> version` or similar). When the probe fails, the tool's
//! install commands run. Each tool is settled at most once per decorator.

use crate::core::config::ToolVersions;
use crate::core::error::{RailError, RailResult};
use crate::core::executor::{ExecOutput, Executor, ToolCommand};
use crate::core::snapshot::SourceSnapshot;
use crate::release::stage::Stage;
use std::collections::BTreeSet;
use std::sync::Mutex;
use tracing::{debug, info};

/// How to detect and install one tool
#[derive(Debug, Clone)]
pub struct ToolRequirement {
  /// Binary name as it appears in commands
  pub name: String,
  /// Succeeds when the tool is usable
  pub probe: ToolCommand,
  /// Run in order when the probe fails
  pub install: Vec<ToolCommand>,
}

impl ToolRequirement {
  pub fn new(name: impl Into<String>, probe: ToolCommand, install: Vec<ToolCommand>) -> Self {
    Self {
      name: name.into(),
      probe,
      install,
    }
  }

  fn go_install(name: &str, probe: &str, module: &str, version: &str) -> Self {
    Self::new(
      name,
      ToolCommand::parse(probe),
      vec![ToolCommand::new("go").arg("install").arg(format!("{}@{}", module, version))],
    )
  }

  fn download(name: &str, probe: &str, url: &str, bin_dir: &str) -> Self {
    Self::new(
      name,
      ToolCommand::parse(probe),
      vec![ToolCommand::script(format!(
        "curl --fail -sSL {url} -o {bin_dir}/{name} && chmod +x {bin_dir}/{name}"
      ))],
    )
  }

  pub fn operator_sdk(tools: &ToolVersions) -> Self {
    Self::download("operator-sdk", "operator-sdk version", &tools.operator_sdk_url(), &tools.bin_dir)
  }

  pub fn opm(tools: &ToolVersions) -> Self {
    Self::download("opm", "opm version", &tools.opm_url(), &tools.bin_dir)
  }

  pub fn controller_gen(tools: &ToolVersions) -> Self {
    Self::go_install(
      "controller-gen",
      "controller-gen --version",
      "sigs.k8s.io/controller-tools/cmd/controller-gen",
      &tools.controller_gen,
    )
  }

  pub fn clean_crd(tools: &ToolVersions) -> Self {
    Self::go_install("crd", "crd --version", &tools.clean_crd_module, &tools.clean_crd)
  }

  pub fn kustomize(tools: &ToolVersions) -> Self {
    Self::go_install(
      "kustomize",
      "kustomize version",
      "sigs.k8s.io/kustomize/kustomize/v5",
      &tools.kustomize,
    )
  }

  pub fn golangci_lint(tools: &ToolVersions) -> Self {
    // The upstream installer resolves "latest" itself when no tag is given
    let tag = if tools.golangci_lint == "latest" {
      String::new()
    } else {
      format!(" {}", tools.golangci_lint)
    };
    Self::new(
      "golangci-lint",
      ToolCommand::parse("golangci-lint version"),
      vec![ToolCommand::script(format!(
        "curl -sSfL https://raw.githubusercontent.com/golangci/golangci-lint/master/install.sh | sh -s -- -b {}{}",
        tools.bin_dir, tag
      ))],
    )
  }

  pub fn gofumpt(tools: &ToolVersions) -> Self {
    Self::go_install("gofumpt", "gofumpt -version", "mvdan.cc/gofumpt", &tools.gofumpt)
  }

  pub fn govulncheck(tools: &ToolVersions) -> Self {
    Self::go_install(
      "govulncheck",
      "govulncheck -version",
      "golang.org/x/vuln/cmd/govulncheck",
      &tools.govulncheck,
    )
  }

  pub fn setup_envtest(tools: &ToolVersions) -> Self {
    Self::new(
      "setup-envtest",
      ToolCommand::script("command -v setup-envtest"),
      vec![ToolCommand::new("go").arg("install").arg(format!(
        "sigs.k8s.io/controller-runtime/tools/setup-envtest@{}",
        tools.setup_envtest
      ))],
    )
  }

  /// Every tool the release pipeline may invoke
  pub fn release_toolchain(tools: &ToolVersions) -> Vec<Self> {
    vec![
      Self::operator_sdk(tools),
      Self::opm(tools),
      Self::controller_gen(tools),
      Self::clean_crd(tools),
      Self::kustomize(tools),
      Self::golangci_lint(tools),
      Self::gofumpt(tools),
      Self::govulncheck(tools),
      Self::setup_envtest(tools),
    ]
  }
}

/// Executor decorator that provisions tools before their first use
pub struct Provisioned<E> {
  inner: E,
  requirements: Vec<ToolRequirement>,
  settled: Mutex<BTreeSet<String>>,
}

impl<E: Executor> Provisioned<E> {
  pub fn new(inner: E, requirements: Vec<ToolRequirement>) -> Self {
    Self {
      inner,
      requirements,
      settled: Mutex::new(BTreeSet::new()),
    }
  }

  fn ensure(&self, snapshot: &SourceSnapshot, requirement: &ToolRequirement) -> RailResult<()> {
    let mut settled = self
      .settled
      .lock()
      .map_err(|_| RailError::message("Tool provisioning state is poisoned"))?;
    if settled.contains(&requirement.name) {
      return Ok(());
    }

    let present = matches!(self.inner.run(snapshot, &requirement.probe), Ok(out) if out.success());
    if present {
      debug!(tool = %requirement.name, "tool already available");
    } else {
      info!(tool = %requirement.name, "installing missing tool");
      for install in &requirement.install {
        let out = self.inner.run(snapshot, install)?;
        if !out.success() {
          return Err(RailError::stage(
            Stage::Provision,
            install.to_string(),
            out.status,
            out.combined_output(),
          ));
        }
      }
    }

    settled.insert(requirement.name.clone());
    Ok(())
  }
}

impl<E: Executor> Executor for Provisioned<E> {
  fn run(&self, snapshot: &SourceSnapshot, command: &ToolCommand) -> RailResult<ExecOutput> {
    for requirement in &self.requirements {
      if command.mentions(&requirement.name) {
        self.ensure(snapshot, requirement)?;
      }
    }
    self.inner.run(snapshot, command)
  }
}

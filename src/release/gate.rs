//! Quality gate: format, lint, vulnerability scan, tests
//!
//! The gate is fail-fast. Formatting rewrites the tree; lint and the scan are
//! read-only; tests add a filtered coverage profile to the tree.

use crate::core::error::{RailError, RailResult};
use crate::core::executor::{Executor, ToolCommand};
use crate::core::snapshot::SourceSnapshot;
use crate::release::runner::StageRunner;
use crate::release::stage::Stage;
use serde::{Deserialize, Serialize};
use tracing::info;

/// Filtered coverage profile merged into the tree
pub const COVERAGE_FILE: &str = "coverage.out";

/// Raw profile written by `go test`
pub const COVERAGE_RAW: &str = "coverage.out.tmp";

/// Where envtest control-plane binaries are cached
pub const ENVTEST_BIN_DIR: &str = "/tmp/envtest";

/// Gate settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GateOptions {
  pub with_test: bool,
  /// Kubernetes version of the envtest control plane
  pub kube_version: String,
}

impl Default for GateOptions {
  fn default() -> Self {
    Self {
      with_test: false,
      kube_version: "latest".to_string(),
    }
  }
}

/// Diagnostics collected by a passing gate
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GateReport {
  /// Files gofumpt rewrote
  pub formatted: Vec<String>,
  pub lint: String,
  pub vulnerabilities: String,
  /// Whether a coverage profile was produced
  pub coverage: bool,
}

/// The `go` directive of go.mod, e.g. "1.22.0"
pub fn go_version(snapshot: &SourceSnapshot) -> Option<String> {
  let bytes = snapshot.read("go.mod")?;
  String::from_utf8_lossy(bytes).lines().find_map(|line| {
    let mut parts = line.split_whitespace();
    match (parts.next(), parts.next()) {
      (Some("go"), Some(version)) => Some(version.to_string()),
      _ => None,
    }
  })
}

/// govulncheck only understands modules targeting go 1.18 or later
fn supports_vulncheck(go_version: &str) -> bool {
  let mut parts = go_version.split('.').map(|p| p.parse::<u64>().unwrap_or(0));
  let major = parts.next().unwrap_or(0);
  let minor = parts.next().unwrap_or(0);
  (major, minor) >= (1, 18)
}

/// Drop generated code from a coverage profile
pub fn filter_coverage(profile: &str) -> String {
  profile
    .lines()
    .filter(|line| !line.contains("_generated"))
    .map(|line| format!("{}\n", line))
    .collect()
}

pub fn format_command() -> ToolCommand {
  ToolCommand::parse("gofumpt -w -d .")
}

pub fn lint_command(go_version: Option<&str>) -> ToolCommand {
  let cmd = ToolCommand::parse("golangci-lint run --timeout 5m --out-format colored-line-number");
  match go_version {
    Some(version) => cmd.arg("--go").arg(version),
    None => cmd,
  }
}

pub fn vuln_command() -> ToolCommand {
  ToolCommand::parse("govulncheck ./...")
}

pub fn envtest_command(kube_version: &str) -> ToolCommand {
  ToolCommand::new("setup-envtest")
    .args(["use", kube_version, "--bin-dir", ENVTEST_BIN_DIR, "-p", "path"])
}

pub fn test_command(assets: &str) -> ToolCommand {
  ToolCommand::parse(
    "go test -p=1 -count=1 -vet=off -timeout=60m -covermode=atomic -coverprofile=coverage.out.tmp ./...",
  )
  .env("TEST", "true")
  .env("KUBEBUILDER_ASSETS", assets)
}

/// Run the gate over `snapshot`, returning the formatted (and covered) tree
pub fn run_gate<E: Executor>(
  runner: &mut StageRunner<E>,
  snapshot: &SourceSnapshot,
  options: &GateOptions,
) -> RailResult<(SourceSnapshot, GateReport)> {
  let mut report = GateReport::default();

  let formatted = runner.run(Stage::Format, snapshot, &format_command())?.snapshot;
  let diff = snapshot.diff(&formatted);
  report.formatted = diff.modified;
  info!(files = report.formatted.len(), "formatted sources");

  let go = go_version(&formatted);
  report.lint = runner.run(Stage::Lint, &formatted, &lint_command(go.as_deref()))?.stdout;

  if let Some(version) = go.as_deref()
    && !supports_vulncheck(version)
  {
    return Err(RailError::stage(
      Stage::VulnCheck,
      vuln_command().to_string(),
      None,
      format!("govulncheck requires go 1.18 or later, go.mod targets {}", version),
    ));
  }
  report.vulnerabilities = runner.run(Stage::VulnCheck, &formatted, &vuln_command())?.stdout;

  if !options.with_test {
    return Ok((formatted, report));
  }

  let envtest = envtest_command(&options.kube_version);
  let assets = runner.run(Stage::EnvTest, &formatted, &envtest)?.stdout.trim().to_string();
  if assets.is_empty() {
    return Err(RailError::stage(
      Stage::EnvTest,
      envtest.to_string(),
      Some(0),
      "setup-envtest printed no asset path",
    ));
  }

  let test = test_command(&assets);
  let tested = runner.run(Stage::Test, &formatted, &test)?;
  let raw = tested.snapshot.read_string(COVERAGE_RAW)?.ok_or_else(|| {
    RailError::stage(Stage::Test, test.to_string(), Some(0), format!("no coverage profile at {}", COVERAGE_RAW))
  })?;
  report.coverage = true;

  let mut covered = tested.snapshot.edit();
  covered.write(COVERAGE_FILE, filter_coverage(&raw)).remove(COVERAGE_RAW);
  Ok((covered.build(), report))
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::release::testing::ScriptedExecutor;

  fn source() -> SourceSnapshot {
    let mut builder = SourceSnapshot::empty().edit();
    builder
      .write("go.mod", "module github.com/acme/widget\n\ngo 1.22.0\n")
      .write("main.go", "package main\nfunc main(){}\n");
    builder.build()
  }

  fn toolchain() -> ScriptedExecutor {
    ScriptedExecutor::new()
      .on("gofumpt", |snap, _| snap.with_file("main.go", "package main\n\nfunc main() {}\n"))
      .stdout_on("setup-envtest", "/tmp/envtest/k8s/1.30.0-linux-amd64\n")
      .on("go test", |snap, cmd| {
        assert!(cmd.env.contains(&("KUBEBUILDER_ASSETS".to_string(), "/tmp/envtest/k8s/1.30.0-linux-amd64".to_string())));
        snap.with_file(
          COVERAGE_RAW,
          "mode: atomic\napi/v1/widget.go:10.2,12.3 1 1\napi/v1/zz_generated.deepcopy.go:5.1,6.2 1 0\n",
        )
      })
  }

  #[test]
  fn test_go_version_from_go_mod() {
    assert_eq!(go_version(&source()).as_deref(), Some("1.22.0"));
    assert_eq!(go_version(&SourceSnapshot::empty()), None);
  }

  #[test]
  fn test_lint_command_passes_go_version() {
    assert_eq!(
      lint_command(Some("1.22.0")).to_string(),
      "golangci-lint run --timeout 5m --out-format colored-line-number --go 1.22.0"
    );
    assert!(!lint_command(None).to_string().contains("--go"));
  }

  #[test]
  fn test_filter_coverage_drops_generated() {
    let filtered = filter_coverage("mode: atomic\na.go:1.1,2.2 1 1\nzz_generated.deepcopy.go:1.1,2.2 1 0\n");
    assert_eq!(filtered, "mode: atomic\na.go:1.1,2.2 1 1\n");
  }

  #[test]
  fn test_gate_without_tests() {
    let exec = toolchain();
    let mut runner = StageRunner::new(&exec);

    let (out, report) = run_gate(&mut runner, &source(), &GateOptions::default()).unwrap();

    assert_eq!(report.formatted, vec!["main.go"]);
    assert!(!report.coverage);
    assert!(!out.contains(COVERAGE_FILE));
    assert!(!exec.ran("setup-envtest"));
    assert!(!exec.ran("go test"));
  }

  #[test]
  fn test_gate_with_tests_merges_filtered_coverage() {
    let exec = toolchain();
    let mut runner = StageRunner::new(&exec);
    let options = GateOptions {
      with_test: true,
      kube_version: "1.30.0".to_string(),
    };

    let (out, report) = run_gate(&mut runner, &source(), &options).unwrap();

    assert!(report.coverage);
    let coverage = out.read_string(COVERAGE_FILE).unwrap().unwrap();
    assert_eq!(coverage, "mode: atomic\napi/v1/widget.go:10.2,12.3 1 1\n");
    assert!(!out.contains(COVERAGE_RAW));
    assert!(exec.ran("setup-envtest use 1.30.0 --bin-dir /tmp/envtest -p path"));
  }

  #[test]
  fn test_lint_failure_stops_the_gate() {
    let exec = toolchain().fail_on("golangci-lint", 1, "main.go:1: exported func lacks comment");
    let mut runner = StageRunner::new(&exec);
    let options = GateOptions {
      with_test: true,
      ..Default::default()
    };

    let err = run_gate(&mut runner, &source(), &options).unwrap_err();

    assert_eq!(err.failed_stage(), Some(Stage::Lint));
    assert!(!exec.ran("govulncheck"));
    assert!(!exec.ran("setup-envtest"));
    assert!(!exec.ran("go test"));
  }

  #[test]
  fn test_envtest_failure_is_distinct_from_test_failure() {
    let exec = toolchain().fail_on("setup-envtest", 1, "no such version");
    let mut runner = StageRunner::new(&exec);
    let options = GateOptions {
      with_test: true,
      kube_version: "9.99".to_string(),
    };
    let err = run_gate(&mut runner, &source(), &options).unwrap_err();
    assert_eq!(err.failed_stage(), Some(Stage::EnvTest));
    assert!(!exec.ran("go test"));

    let exec = toolchain().fail_on("go test", 1, "--- FAIL: TestWidget");
    let mut runner = StageRunner::new(&exec);
    let err = run_gate(&mut runner, &source(), &options).unwrap_err();
    assert_eq!(err.failed_stage(), Some(Stage::Test));
  }

  #[test]
  fn test_old_go_refuses_vulncheck() {
    let exec = toolchain();
    let mut runner = StageRunner::new(&exec);
    let old = source().with_file("go.mod", "module x\n\ngo 1.17\n");
    let err = run_gate(&mut runner, &old, &GateOptions::default()).unwrap_err();
    assert_eq!(err.failed_stage(), Some(Stage::VulnCheck));
    assert!(err.to_string().contains("1.17"));
    assert!(!exec.ran("govulncheck"));
  }

  #[test]
  fn test_missing_coverage_profile_fails_test_stage() {
    let exec = ScriptedExecutor::new().stdout_on("setup-envtest", "/tmp/envtest/k8s/1.30.0-linux-amd64\n");
    let mut runner = StageRunner::new(&exec);
    let options = GateOptions {
      with_test: true,
      kube_version: "1.30.0".to_string(),
    };
    let err = run_gate(&mut runner, &source(), &options).unwrap_err();
    assert_eq!(err.failed_stage(), Some(Stage::Test));
    assert!(err.to_string().contains(COVERAGE_RAW));
  }
}

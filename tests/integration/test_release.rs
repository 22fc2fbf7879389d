//! Integration tests for `operator-rail release`

use crate::helpers::{TestSource, exit_code, stderr, stdout};
use anyhow::Result;

const PASSWORD_VAR: &str = "OPERATOR_RAIL_TEST_PASSWORD";

fn publish_dry_run(extra: &[&str]) -> Vec<String> {
  let mut args: Vec<String> = [
    "release",
    "--registry",
    "quay.io",
    "--repository",
    "acme/widget",
    "--publish",
    "--username",
    "robot",
    "--password-env",
    PASSWORD_VAR,
    "--dry-run",
    "--json",
  ]
  .iter()
  .map(|s| s.to_string())
  .collect();
  args.extend(extra.iter().map(|s| s.to_string()));
  args
}

fn as_strs(args: &[String]) -> Vec<&str> {
  args.iter().map(String::as_str).collect()
}

#[test]
fn test_dry_run_links_catalog_to_previous_release() -> Result<()> {
  let source = TestSource::operator()?;
  source.write("VERSION", "1.2.0\n")?;

  let args = publish_dry_run(&["--version", "1.3.0"]);
  let output = source.run_with_env(&as_strs(&args), &[(PASSWORD_VAR, "s3cret")])?;

  assert_eq!(exit_code(&output), 0, "stderr: {}", stderr(&output));
  let out = stdout(&output);
  assert!(out.contains("--from-index quay.io/acme/widget-catalog:1.2.0"));
  assert!(!out.contains("s3cret"));

  let plan: serde_json::Value = serde_json::from_str(&out)?;
  assert_eq!(plan["metadata"]["version"], "1.3.0");
  assert_eq!(plan["metadata"]["previous_version"], "1.2.0");
  assert_eq!(plan["metadata"]["is_destructive"], true);

  let operations = plan["operations"].as_array().cloned().unwrap_or_default();
  let patch = operations
    .iter()
    .find(|op| op["type"] == "patch_replaces")
    .expect("replaces patch planned");
  assert_eq!(patch["replaces"], "widget.v1.2.0");

  // nothing ran, nothing was written
  assert!(!source.path.join("bundle").exists());
  assert_eq!(source.read("VERSION")?, "1.2.0\n");
  Ok(())
}

#[test]
fn test_dry_run_skip_previous_is_isolated() -> Result<()> {
  let source = TestSource::operator()?;
  source.write("VERSION", "1.2.0\n")?;

  let args = publish_dry_run(&["--build-number", "pr7", "--skip-previous"]);
  let output = source.run_with_env(&as_strs(&args), &[(PASSWORD_VAR, "s3cret")])?;

  assert_eq!(exit_code(&output), 0, "stderr: {}", stderr(&output));
  let out = stdout(&output);
  assert!(!out.contains("--from-index"));
  assert!(!out.contains("patch_replaces"));

  let plan: serde_json::Value = serde_json::from_str(&out)?;
  assert_eq!(plan["metadata"]["version"], "1.2.1-pr7");
  assert!(plan["metadata"]["previous_version"].is_null());
  Ok(())
}

#[test]
fn test_publish_without_credentials_exits_user_error() -> Result<()> {
  let source = TestSource::operator()?;

  let output = source.run(&[
    "release",
    "--version",
    "1.3.0",
    "--registry",
    "quay.io",
    "--repository",
    "acme/widget",
    "--publish",
  ])?;

  assert_eq!(exit_code(&output), 1);
  assert!(stderr(&output).contains("quay.io"));
  assert!(!source.path.join("VERSION").exists());
  Ok(())
}

#[test]
fn test_password_env_must_be_set() -> Result<()> {
  let source = TestSource::operator()?;

  let args = publish_dry_run(&["--version", "1.3.0"]);
  let output = source.run_with_env(&as_strs(&args), &[(PASSWORD_VAR, "")])?;

  assert_eq!(exit_code(&output), 1);
  Ok(())
}

#[test]
fn test_missing_project_descriptor_is_validation_error() -> Result<()> {
  let source = TestSource::empty()?;

  let output = source.run(&[
    "release",
    "--version",
    "1.0.0",
    "--registry",
    "quay.io",
    "--repository",
    "acme/widget",
    "--dry-run",
  ])?;

  assert_eq!(exit_code(&output), 3);
  assert!(stderr(&output).contains("PROJECT"));
  Ok(())
}

#[test]
fn test_release_toml_supplies_image_location() -> Result<()> {
  let source = TestSource::operator()?;
  source.write(
    "release.toml",
    "[image]\nregistry = \"quay.io\"\nrepository = \"acme/widget\"\n\n[release]\nchannels = \"stable\"\n",
  )?;

  let output = source.run(&["release", "--version", "1.3.0", "--dry-run"])?;

  assert_eq!(exit_code(&output), 0, "stderr: {}", stderr(&output));
  let out = stdout(&output);
  assert!(out.contains("quay.io/acme/widget-bundle:1.3.0"));
  assert!(out.contains("--channels=stable"));
  Ok(())
}

#[test]
fn test_missing_registry_is_user_error() -> Result<()> {
  let source = TestSource::operator()?;

  let output = source.run(&["release", "--version", "1.3.0", "--dry-run"])?;

  assert_eq!(exit_code(&output), 1);
  assert!(stderr(&output).contains("registry"));
  Ok(())
}

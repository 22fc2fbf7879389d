//! Integration tests for `operator-rail catalog`

use crate::helpers::{TestSource, exit_code, stderr, stdout};
use anyhow::Result;

const CATALOG: &str = "quay.io/acme/widget-catalog:1.3.0";

fn dry_run(source: &TestSource, extra: &[&str]) -> Result<serde_json::Value> {
  let mut args = vec![
    "catalog",
    "--version",
    "1.3.0",
    "--registry",
    "quay.io",
    "--repository",
    "acme/widget",
    "--dry-run",
    "--json",
  ];
  args.extend_from_slice(extra);
  let output = source.run(&args)?;
  assert_eq!(exit_code(&output), 0, "stderr: {}", stderr(&output));
  Ok(serde_json::from_str(&stdout(&output))?)
}

#[test]
fn test_catalog_decision_table() -> Result<()> {
  let source = TestSource::empty()?;

  let fresh = dry_run(&source, &[])?;
  assert_eq!(fresh["mode"], "fresh");
  assert!(fresh["from_index"].is_null());

  let isolated = dry_run(&source, &["--previous", "1.2.0"])?;
  assert_eq!(isolated["mode"], "fresh");
  assert!(!isolated["command"].as_str().unwrap_or_default().contains("--from-index"));

  let in_place = dry_run(&source, &["--update"])?;
  assert_eq!(in_place["mode"], "in-place");
  assert_eq!(in_place["from_index"], CATALOG);

  let linked = dry_run(&source, &["--update", "--previous", "1.2.0"])?;
  assert_eq!(linked["mode"], "linked");
  assert_eq!(linked["from_index"], "quay.io/acme/widget-catalog:1.2.0");
  assert!(
    linked["command"]
      .as_str()
      .unwrap_or_default()
      .ends_with("--bundles quay.io/acme/widget-bundle:1.3.0 --from-index quay.io/acme/widget-catalog:1.2.0")
  );
  Ok(())
}

#[test]
fn test_catalog_rejects_invalid_version() -> Result<()> {
  let source = TestSource::empty()?;

  let output = source.run(&[
    "catalog",
    "--version",
    "latest",
    "--registry",
    "quay.io",
    "--repository",
    "acme/widget",
    "--dry-run",
  ])?;

  assert_eq!(exit_code(&output), 3);
  Ok(())
}

#[test]
fn test_catalog_publish_requires_credentials() -> Result<()> {
  let source = TestSource::empty()?;

  let output = source.run(&[
    "catalog",
    "--version",
    "1.3.0",
    "--registry",
    "quay.io",
    "--repository",
    "acme/widget",
    "--publish",
    "--dry-run",
  ])?;

  assert_eq!(exit_code(&output), 1);
  Ok(())
}

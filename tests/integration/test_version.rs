//! Integration tests for `operator-rail version`

use crate::helpers::{TestSource, exit_code, stdout};
use anyhow::Result;

#[test]
fn test_build_number_without_marker_starts_at_zero() -> Result<()> {
  let source = TestSource::operator()?;

  let output = source.run(&["version", "--build-number", "ci7"])?;

  assert_eq!(exit_code(&output), 0);
  assert_eq!(stdout(&output).trim(), "0.0.1-ci7");
  Ok(())
}

#[test]
fn test_build_number_bumps_marker_patch() -> Result<()> {
  let source = TestSource::operator()?;
  source.write("VERSION", "1.2.0\n")?;

  let output = source.run(&["version", "--build-number", "42", "--json"])?;

  assert_eq!(exit_code(&output), 0);
  let resolved: serde_json::Value = serde_json::from_str(&stdout(&output))?;
  assert_eq!(resolved["version"], "1.2.1-42");
  assert_eq!(resolved["previous_version"], "1.2.0");
  Ok(())
}

#[test]
fn test_skip_previous_drops_predecessor() -> Result<()> {
  let source = TestSource::operator()?;
  source.write("VERSION", "1.2.0")?;

  let output = source.run(&["version", "--version", "1.3.0", "--skip-previous", "--json"])?;

  let resolved: serde_json::Value = serde_json::from_str(&stdout(&output))?;
  assert_eq!(resolved["version"], "1.3.0");
  assert!(resolved["previous_version"].is_null());
  Ok(())
}

#[test]
fn test_invalid_explicit_version_is_validation_error() -> Result<()> {
  let source = TestSource::operator()?;

  let output = source.run(&["version", "--version", "one-point-oh"])?;

  assert_eq!(exit_code(&output), 3);
  Ok(())
}

#[test]
fn test_unparsable_marker_has_no_predecessor() -> Result<()> {
  let source = TestSource::operator()?;
  source.write("VERSION", "not a version\n")?;

  let output = source.run(&["version", "--build-number", "ci7", "--json"])?;

  assert_eq!(exit_code(&output), 0);
  let resolved: serde_json::Value = serde_json::from_str(&stdout(&output))?;
  assert_eq!(resolved["version"], "0.0.1-ci7");
  assert!(resolved["previous_version"].is_null());
  Ok(())
}

#[test]
fn test_rerelease_of_marker_version_is_validation_error() -> Result<()> {
  let source = TestSource::operator()?;
  source.write("VERSION", "1.2.0\n")?;

  let output = source.run(&["version", "--version", "1.2.0"])?;

  assert_eq!(exit_code(&output), 3);
  Ok(())
}

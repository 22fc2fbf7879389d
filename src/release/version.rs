//! Release version resolution
//!
//! The version marker is a plain-text `VERSION` file at the root of the source
//! tree holding the last released version. It is read once at the start of a
//! release and rewritten once at the very end.

use crate::core::error::{RailError, RailResult, ValidationError};
use crate::core::snapshot::SourceSnapshot;
use semver::{Prerelease, Version};
use tracing::{debug, warn};

/// Path of the version marker inside the source tree
pub const VERSION_MARKER: &str = "VERSION";

/// Trimmed content of the version marker, if present and non-empty
pub fn read_marker(snapshot: &SourceSnapshot) -> Option<String> {
  let bytes = snapshot.read(VERSION_MARKER)?;
  let text = String::from_utf8_lossy(bytes).trim().to_string();
  if text.is_empty() { None } else { Some(text) }
}

/// Parse the marker as semver, defaulting to 0.0.0
///
/// An absent or unparsable marker is not an error.
pub fn marker_version(marker: Option<&str>) -> Version {
  match marker.map(|m| Version::parse(m.trim())) {
    Some(Ok(version)) => version,
    Some(Err(e)) => {
      warn!(marker = marker.unwrap_or_default(), error = %e, "unparsable version marker, using 0.0.0");
      Version::new(0, 0, 0)
    }
    None => Version::new(0, 0, 0),
  }
}

/// Next patch release, dropping any pre-release or build metadata
///
/// A patch number that cannot be incremented falls back to 0.0.1.
pub fn bump_patch(version: &Version) -> Version {
  match version.patch.checked_add(1) {
    Some(patch) => Version::new(version.major, version.minor, patch),
    None => {
      warn!(marker = %version, "version marker patch cannot be incremented, restarting at 0.0.1");
      Version::new(0, 0, 1)
    }
  }
}

/// Compute the release version
///
/// - An explicit version wins unless `is_build_number` is set; it is returned unchanged.
/// - A build number release is `MAJOR.MINOR.(PATCH+1)-<build_id>` over the marker.
pub fn resolve(explicit: &str, is_build_number: bool, build_id: &str, marker: Option<&str>) -> RailResult<String> {
  let explicit = explicit.trim();

  if !is_build_number {
    if explicit.is_empty() {
      return Err(invalid(explicit, "no version given; pass --version or --build-number"));
    }
    Version::parse(explicit).map_err(|e| invalid(explicit, e.to_string()))?;
    return Ok(explicit.to_string());
  }

  let build_id = build_id.trim();
  if build_id.is_empty() {
    return Err(invalid(build_id, "build number is empty"));
  }
  let pre = Prerelease::new(build_id).map_err(|e| invalid(build_id, e.to_string()))?;

  let mut next = bump_patch(&marker_version(marker));
  next.pre = pre;
  debug!(version = %next, "resolved build number version");
  Ok(next.to_string())
}

/// Version the release replaces
///
/// An explicit previous version wins; otherwise the marker is used when it is
/// valid semver. Isolated builds (`skip_previous`) never have a predecessor.
pub fn previous_version(explicit: Option<&str>, skip_previous: bool, marker: Option<&str>) -> Option<String> {
  if skip_previous {
    return None;
  }
  if let Some(explicit) = explicit.map(str::trim).filter(|v| !v.is_empty()) {
    return Some(explicit.to_string());
  }
  let marker = marker.map(str::trim).filter(|v| !v.is_empty())?;
  match Version::parse(marker) {
    Ok(_) => Some(marker.to_string()),
    Err(e) => {
      warn!(marker, error = %e, "unparsable version marker, releasing without a predecessor");
      None
    }
  }
}

/// Reject a release that would replace itself
///
/// A previous version that sorts after the target only warns.
pub fn check_ordering(target: &str, previous: Option<&str>) -> RailResult<()> {
  let Some(previous) = previous else { return Ok(()) };
  match (Version::parse(target), Version::parse(previous)) {
    (Ok(t), Ok(p)) if p < t => {}
    (Ok(t), Ok(p)) if p == t => {
      return Err(invalid(target, format!("release cannot replace itself (previous version is {})", previous)));
    }
    (Ok(_), Ok(_)) => warn!(
      version = target,
      previous,
      "previous version is not ordered before the release version"
    ),
    _ => warn!(version = target, previous, "cannot compare release versions"),
  }
  Ok(())
}

fn invalid(version: &str, reason: impl Into<String>) -> RailError {
  RailError::Validation(ValidationError::InvalidVersion {
    version: version.to_string(),
    reason: reason.into(),
  })
}

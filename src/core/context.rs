//! Source context - load once, pass everywhere
//!
//! ```text
//! main.rs:
//!   SourceContext::build() -> &SourceContext
//!   |
//!   v
//! commands/release.rs, catalog.rs, version.rs:
//!   fn run_*(ctx: &SourceContext, ...)
//! ```

use crate::core::config::RailConfig;
use crate::core::error::{ConfigError, RailError, RailResult, ResultExt};
use crate::core::snapshot::SourceSnapshot;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// The operator source tree and its configuration
///
/// The snapshot is captured once at startup; the directory on disk is only
/// written again when a release exports its result.
#[derive(Debug, Clone)]
pub struct SourceContext {
  /// Source root (absolute path)
  pub root: PathBuf,

  /// Immutable capture of the source root
  pub snapshot: SourceSnapshot,

  /// release.toml, or defaults when absent
  pub config: RailConfig,
}

impl SourceContext {
  /// Capture `root` and load its configuration
  ///
  /// An explicit `config_path` must exist; otherwise release.toml is
  /// searched in the source root and defaults apply when none is found.
  pub fn build(root: &Path, config_path: Option<&Path>) -> RailResult<Self> {
    let root = root
      .canonicalize()
      .with_context(|| format!("Source directory {} is not accessible", root.display()))?;
    if !root.is_dir() {
      return Err(RailError::with_help(
        format!("Source path {} is not a directory", root.display()),
        "Pass the operator project root with --source.",
      ));
    }

    let config = match config_path {
      Some(path) => RailConfig::load_file(path)?,
      None => RailConfig::load(&root)?,
    };
    let snapshot = SourceSnapshot::from_dir(&root)?;
    if snapshot.is_empty() {
      warn!(root = %root.display(), "source directory is empty");
    }
    debug!(root = %root.display(), files = snapshot.len(), digest = %snapshot.digest(), "captured source");

    Ok(Self { root, snapshot, config })
  }

  /// Registry from the flag, falling back to release.toml
  pub fn registry(&self, flag: Option<String>) -> RailResult<String> {
    flag
      .or_else(|| self.config.image.registry.clone())
      .filter(|r| !r.trim().is_empty())
      .ok_or_else(|| {
        RailError::Config(ConfigError::MissingField {
          field: "registry".to_string(),
        })
      })
  }

  /// Repository from the flag, falling back to release.toml
  pub fn repository(&self, flag: Option<String>) -> RailResult<String> {
    flag
      .or_else(|| self.config.image.repository.clone())
      .filter(|r| !r.trim().is_empty())
      .ok_or_else(|| {
        RailError::Config(ConfigError::MissingField {
          field: "repository".to_string(),
        })
      })
  }
}

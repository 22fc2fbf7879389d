use crate::core::error::{ConfigError, RailError, RailResult, ResultExt};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Configuration for operator-rail
/// Searched in order: release.toml, .release.toml, .config/release.toml
///
/// Every section is optional; a source tree without any file gets the defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RailConfig {
  #[serde(default)]
  pub image: ImageConfig,
  #[serde(default)]
  pub tools: ToolVersions,
  #[serde(default)]
  pub release: ReleaseDefaults,
}

/// Where the operator images live
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ImageConfig {
  /// OCI registry host, e.g. "quay.io"
  #[serde(default)]
  pub registry: Option<String>,

  /// Repository below the registry, e.g. "acme/widget-operator"
  #[serde(default)]
  pub repository: Option<String>,
}

/// Versions of every external tool and base image the pipeline relies on
///
/// Tool versions accept a release tag or "latest".
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolVersions {
  /// operator-sdk release (downloaded binary)
  #[serde(default = "default_latest")]
  pub operator_sdk: String,

  /// opm release (downloaded binary)
  #[serde(default = "default_latest")]
  pub opm: String,

  #[serde(default = "default_latest")]
  pub controller_gen: String,

  /// CRD cleanup tool version
  #[serde(default = "default_latest")]
  pub clean_crd: String,

  /// Go module providing the CRD cleanup tool
  #[serde(default = "default_clean_crd_module")]
  pub clean_crd_module: String,

  #[serde(default = "default_latest")]
  pub kustomize: String,

  #[serde(default = "default_latest")]
  pub golangci_lint: String,

  #[serde(default = "default_latest")]
  pub gofumpt: String,

  #[serde(default = "default_latest")]
  pub govulncheck: String,

  #[serde(default = "default_latest")]
  pub setup_envtest: String,

  /// Directory downloaded binaries are installed into (shell-expanded)
  #[serde(default = "default_bin_dir")]
  pub bin_dir: String,

  /// Base image of the manager runtime image
  #[serde(default = "default_runtime_image")]
  pub runtime_image: String,

  /// Numeric `uid:gid` the manager runs as
  #[serde(default = "default_runtime_user")]
  pub runtime_user: String,
}

fn default_latest() -> String {
  "latest".to_string()
}

fn default_clean_crd_module() -> String {
  "github.com/disaster37/operator-sdk-extra/cmd/crd".to_string()
}

fn default_bin_dir() -> String {
  "$(go env GOPATH)/bin".to_string()
}

fn default_runtime_image() -> String {
  "gcr.io/distroless/static:nonroot".to_string()
}

fn default_runtime_user() -> String {
  "65532:65532".to_string()
}

impl Default for ToolVersions {
  fn default() -> Self {
    Self {
      operator_sdk: default_latest(),
      opm: default_latest(),
      controller_gen: default_latest(),
      clean_crd: default_latest(),
      clean_crd_module: default_clean_crd_module(),
      kustomize: default_latest(),
      golangci_lint: default_latest(),
      gofumpt: default_latest(),
      govulncheck: default_latest(),
      setup_envtest: default_latest(),
      bin_dir: default_bin_dir(),
      runtime_image: default_runtime_image(),
      runtime_user: default_runtime_user(),
    }
  }
}

impl ToolVersions {
  /// Validate tool configuration
  pub fn validate(&self) -> RailResult<()> {
    let versions = [
      ("tools.operator_sdk", &self.operator_sdk),
      ("tools.opm", &self.opm),
      ("tools.controller_gen", &self.controller_gen),
      ("tools.clean_crd", &self.clean_crd),
      ("tools.kustomize", &self.kustomize),
      ("tools.golangci_lint", &self.golangci_lint),
      ("tools.gofumpt", &self.gofumpt),
      ("tools.govulncheck", &self.govulncheck),
      ("tools.setup_envtest", &self.setup_envtest),
    ];

    for (field, version) in versions {
      if version.is_empty() || version.chars().any(char::is_whitespace) {
        return Err(invalid(field, format!("'{}' is not a version or 'latest'", version)));
      }
    }

    if self.runtime_image.trim().is_empty() {
      return Err(invalid("tools.runtime_image", "must name a base image"));
    }

    // The runtime user must be numeric so the image runs as non-root without /etc/passwd
    let numeric = |part: &str| !part.is_empty() && part.chars().all(|c| c.is_ascii_digit());
    match self.runtime_user.split_once(':') {
      Some((uid, gid)) if numeric(uid) && numeric(gid) => {}
      _ => {
        return Err(invalid(
          "tools.runtime_user",
          format!("'{}' must be numeric uid:gid, e.g. 65532:65532", self.runtime_user),
        ));
      }
    }

    Ok(())
  }

  /// Download URL of the operator-sdk binary
  pub fn operator_sdk_url(&self) -> String {
    if self.operator_sdk == "latest" {
      "https://github.com/operator-framework/operator-sdk/releases/latest/download/operator-sdk_linux_amd64".to_string()
    } else {
      format!(
        "https://github.com/operator-framework/operator-sdk/releases/download/{}/operator-sdk_linux_amd64",
        self.operator_sdk
      )
    }
  }

  /// Download URL of the opm binary
  pub fn opm_url(&self) -> String {
    if self.opm == "latest" {
      "https://github.com/operator-framework/operator-registry/releases/latest/download/linux-amd64-opm".to_string()
    } else {
      format!(
        "https://github.com/operator-framework/operator-registry/releases/download/{}/linux-amd64-opm",
        self.opm
      )
    }
  }
}

fn invalid(field: &str, reason: impl Into<String>) -> RailError {
  RailError::Config(ConfigError::Invalid {
    field: field.to_string(),
    reason: reason.into(),
  })
}

/// Defaults for release invocations; CLI flags override them
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReleaseDefaults {
  /// Comma separated OLM channels
  #[serde(default)]
  pub channels: Option<String>,

  /// CRD API version passed to controller-gen
  #[serde(default)]
  pub crd_version: Option<String>,

  /// Run the test stage
  #[serde(default)]
  pub with_test: bool,

  /// Kubernetes version of the envtest control plane
  #[serde(default = "default_latest")]
  pub kube_version: String,

  /// Also tag the catalog as latest when publishing
  #[serde(default)]
  pub publish_latest: bool,
}

impl Default for ReleaseDefaults {
  fn default() -> Self {
    Self {
      channels: None,
      crd_version: None,
      with_test: false,
      kube_version: default_latest(),
      publish_latest: false,
    }
  }
}

impl RailConfig {
  /// Find config file in search order: release.toml, .release.toml, .config/release.toml
  pub fn find_config_path(path: &Path) -> Option<PathBuf> {
    let candidates = vec![
      path.join("release.toml"),
      path.join(".release.toml"),
      path.join(".config").join("release.toml"),
    ];

    candidates.into_iter().find(|p| p.exists())
  }

  /// Load config from the source root, falling back to defaults when no file exists
  pub fn load(path: &Path) -> RailResult<Self> {
    match Self::find_config_path(path) {
      Some(config_path) => Self::load_file(&config_path),
      None => Ok(Self::default()),
    }
  }

  /// Load config from an explicit file
  pub fn load_file(config_path: &Path) -> RailResult<Self> {
    if !config_path.exists() {
      return Err(RailError::Config(ConfigError::NotFound {
        path: config_path.to_path_buf(),
      }));
    }

    let content = fs::read_to_string(config_path)
      .with_context(|| format!("Failed to read config from {}", config_path.display()))?;
    let config: RailConfig = toml_edit::de::from_str(&content)
      .with_context(|| format!("Failed to parse config from {}", config_path.display()))?;

    config
      .tools
      .validate()
      .with_context(|| format!("Invalid tool configuration in {}", config_path.display()))?;

    Ok(config)
  }
}

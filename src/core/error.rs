//! Error types for operator-rail with contextual messages and exit codes
//!
//! This module provides a unified error type that categorizes errors and provides
//! contextual help messages to users. Pipeline failures always name the stage
//! that failed and carry the diagnostic output of the external tool.

use crate::release::stage::Stage;
use std::fmt;
use std::io;
use std::path::PathBuf;

/// Exit codes for operator-rail
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitCode {
  /// User error (config, invalid args, missing credentials)
  User = 1,
  /// System error (external tool, image builder, I/O)
  System = 2,
  /// Validation failure (malformed project descriptor, invalid version)
  Validation = 3,
}

impl ExitCode {
  /// Convert to i32 for process exit
  pub fn as_i32(self) -> i32 {
    self as i32
  }
}

/// Main error type for operator-rail
#[derive(Debug)]
pub enum RailError {
  /// Configuration errors
  Config(ConfigError),

  /// External tool failures, wrapped with the stage that ran them
  Stage(StageError),

  /// Validation errors (project descriptor, versions)
  Validation(ValidationError),

  /// I/O errors
  Io(io::Error),

  /// Generic error with message and optional context
  Message {
    message: String,
    context: Option<String>,
    help: Option<String>,
  },
}

impl RailError {
  /// Create a simple error message
  pub fn message(msg: impl Into<String>) -> Self {
    RailError::Message {
      message: msg.into(),
      context: None,
      help: None,
    }
  }

  /// Create an error with help text
  pub fn with_help(msg: impl Into<String>, help: impl Into<String>) -> Self {
    RailError::Message {
      message: msg.into(),
      context: None,
      help: Some(help.into()),
    }
  }

  /// Create a stage failure from a non-zero exit of an external command
  pub fn stage(stage: Stage, command: impl Into<String>, exit_code: Option<i32>, output: impl Into<String>) -> Self {
    RailError::Stage(StageError {
      stage,
      command: command.into(),
      exit_code,
      output: output.into(),
    })
  }

  /// Add context to an existing error
  ///
  /// Stage, config and validation errors keep their category (and exit code);
  /// context is only folded into message-style errors.
  pub fn context(self, ctx: impl Into<String>) -> Self {
    let ctx_str = ctx.into();
    match self {
      RailError::Message { message, context, help } => RailError::Message {
        message,
        context: Some(context.map(|c| format!("{}\n{}", ctx_str, c)).unwrap_or(ctx_str)),
        help,
      },
      RailError::Io(err) => RailError::Message {
        message: ctx_str,
        context: Some(format!("I/O error: {}", err)),
        help: None,
      },
      _ => self,
    }
  }

  /// Get the appropriate exit code for this error
  pub fn exit_code(&self) -> ExitCode {
    match self {
      RailError::Config(_) => ExitCode::User,
      RailError::Stage(_) => ExitCode::System,
      RailError::Validation(_) => ExitCode::Validation,
      RailError::Io(_) => ExitCode::System,
      RailError::Message { .. } => ExitCode::User,
    }
  }

  /// Get contextual help message for this error
  pub fn help_message(&self) -> Option<String> {
    match self {
      RailError::Config(e) => e.help_message(),
      RailError::Stage(e) => e.help_message(),
      RailError::Validation(e) => e.help_message(),
      RailError::Message { help, .. } => help.clone(),
      _ => None,
    }
  }

  /// The stage that failed, if this is a stage failure
  pub fn failed_stage(&self) -> Option<Stage> {
    match self {
      RailError::Stage(e) => Some(e.stage),
      _ => None,
    }
  }
}

impl fmt::Display for RailError {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      RailError::Config(e) => write!(f, "{}", e),
      RailError::Stage(e) => write!(f, "{}", e),
      RailError::Validation(e) => write!(f, "{}", e),
      RailError::Io(e) => write!(f, "I/O error: {}", e),
      RailError::Message { message, context, .. } => {
        write!(f, "{}", message)?;
        if let Some(ctx) = context {
          write!(f, "\n{}", ctx)?;
        }
        Ok(())
      }
    }
  }
}

impl std::error::Error for RailError {
  fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
    match self {
      RailError::Io(e) => Some(e),
      _ => None,
    }
  }
}

impl From<io::Error> for RailError {
  fn from(err: io::Error) -> Self {
    RailError::Io(err)
  }
}

impl From<String> for RailError {
  fn from(msg: String) -> Self {
    RailError::message(msg)
  }
}

impl From<&str> for RailError {
  fn from(msg: &str) -> Self {
    RailError::message(msg)
  }
}

impl From<toml_edit::de::Error> for RailError {
  fn from(err: toml_edit::de::Error) -> Self {
    RailError::message(format!("TOML deserialization error: {}", err))
  }
}

impl From<serde_json::Error> for RailError {
  fn from(err: serde_json::Error) -> Self {
    RailError::message(format!("JSON error: {}", err))
  }
}

impl From<serde_yaml::Error> for RailError {
  fn from(err: serde_yaml::Error) -> Self {
    RailError::message(format!("YAML error: {}", err))
  }
}

impl From<semver::Error> for RailError {
  fn from(err: semver::Error) -> Self {
    RailError::message(format!("Semver error: {}", err))
  }
}

impl From<walkdir::Error> for RailError {
  fn from(err: walkdir::Error) -> Self {
    RailError::message(format!("Directory walk error: {}", err))
  }
}

impl From<std::string::FromUtf8Error> for RailError {
  fn from(err: std::string::FromUtf8Error) -> Self {
    RailError::message(format!("UTF-8 conversion error: {}", err))
  }
}

impl From<std::path::StripPrefixError> for RailError {
  fn from(err: std::path::StripPrefixError) -> Self {
    RailError::message(format!("Path strip prefix error: {}", err))
  }
}

/// Configuration-related errors
#[derive(Debug)]
pub enum ConfigError {
  /// An explicitly requested configuration file does not exist
  NotFound { path: PathBuf },

  /// Missing required field
  MissingField { field: String },

  /// Publishing was requested without any registry credential
  MissingCredentials { registry: String },

  /// A field holds a value that cannot be used
  Invalid { field: String, reason: String },
}

impl ConfigError {
  fn help_message(&self) -> Option<String> {
    match self {
      ConfigError::NotFound { .. } => {
        Some("Create a release.toml in the source root or drop the --config flag.".to_string())
      }
      ConfigError::MissingField { field } => Some(format!(
        "Pass --{} on the command line or set it in release.toml.",
        field.replace('_', "-")
      )),
      ConfigError::MissingCredentials { registry } => Some(format!(
        "Pass --username and --password-env for {} (the password is read from the named environment variable).",
        registry
      )),
      ConfigError::Invalid { .. } => None,
    }
  }
}

impl fmt::Display for ConfigError {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      ConfigError::NotFound { path } => {
        write!(f, "Configuration file not found: {}", path.display())
      }
      ConfigError::MissingField { field } => {
        write!(f, "Missing required setting: {}", field)
      }
      ConfigError::MissingCredentials { registry } => {
        write!(
          f,
          "Publishing to '{}' was requested but no registry credentials were provided",
          registry
        )
      }
      ConfigError::Invalid { field, reason } => {
        write!(f, "Invalid value for '{}': {}", field, reason)
      }
    }
  }
}

/// An external tool run by a pipeline stage exited unsuccessfully
#[derive(Debug)]
pub struct StageError {
  /// Stage that ran the command
  pub stage: Stage,
  /// Rendered command line
  pub command: String,
  /// Exit status, if the process exited normally
  pub exit_code: Option<i32>,
  /// Captured diagnostic output of the tool
  pub output: String,
}

impl StageError {
  fn help_message(&self) -> Option<String> {
    match self.stage {
      Stage::Provision => Some("A required tool could not be installed. Check network access and the versions in [tools].".to_string()),
      Stage::Manifests => Some("Check the kubebuilder markers in api/ and that PROJECT names the project.".to_string()),
      Stage::Bundle => Some("Run `operator-sdk bundle validate ./bundle` locally to inspect the bundle.".to_string()),
      Stage::Lint => Some("Fix the reported lint findings, then re-run the release.".to_string()),
      Stage::VulnCheck => Some("Upgrade the affected modules reported by govulncheck.".to_string()),
      Stage::EnvTest => Some("The envtest control plane could not be provisioned; check --kube-version.".to_string()),
      Stage::Catalog => Some(
        "The previous catalog image must exist and be pullable. Use --skip-previous for an isolated build.".to_string(),
      ),
      Stage::Publish => Some("Check the registry credentials and that the repository exists.".to_string()),
      _ => None,
    }
  }
}

impl fmt::Display for StageError {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "Stage '{}' failed: {}", self.stage, self.command)?;
    match self.exit_code {
      Some(code) => write!(f, " (exit code {})", code)?,
      None => write!(f, " (did not complete)")?,
    }
    let output = self.output.trim_end();
    if !output.is_empty() {
      write!(f, "\n{}", output)?;
    }
    Ok(())
  }
}

/// Validation errors
#[derive(Debug)]
pub enum ValidationError {
  /// Project descriptor missing or unusable
  ProjectDescriptor { path: String, reason: String },

  /// A version string is not valid semver
  InvalidVersion { version: String, reason: String },
}

impl ValidationError {
  fn help_message(&self) -> Option<String> {
    match self {
      ValidationError::ProjectDescriptor { .. } => {
        Some("The PROJECT file is written by `operator-sdk init` and must contain `projectName`.".to_string())
      }
      ValidationError::InvalidVersion { .. } => {
        Some("Versions must be semver, e.g. 1.2.3 or 1.2.3-rc.1; build numbers must be alphanumeric.".to_string())
      }
    }
  }
}

impl fmt::Display for ValidationError {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      ValidationError::ProjectDescriptor { path, reason } => {
        write!(f, "Invalid project descriptor '{}': {}", path, reason)
      }
      ValidationError::InvalidVersion { version, reason } => {
        write!(f, "Invalid version '{}': {}", version, reason)
      }
    }
  }
}

/// Result type alias for operator-rail
pub type RailResult<T> = Result<T, RailError>;

/// Helper trait to add context to Results
pub trait ResultExt<T> {
  /// Add context to an error result
  fn context(self, ctx: impl Into<String>) -> RailResult<T>;

  /// Add context using a closure (lazy evaluation)
  fn with_context<F>(self, f: F) -> RailResult<T>
  where
    F: FnOnce() -> String;
}

impl<T, E> ResultExt<T> for Result<T, E>
where
  E: Into<RailError>,
{
  fn context(self, ctx: impl Into<String>) -> RailResult<T> {
    self.map_err(|e| e.into().context(ctx))
  }

  fn with_context<F>(self, f: F) -> RailResult<T>
  where
    F: FnOnce() -> String,
  {
    self.map_err(|e| e.into().context(f()))
  }
}

/// Pretty-print an error to stderr with help text
pub fn print_error(error: &RailError) {
  eprintln!("\n❌ {}\n", error);

  if let Some(help) = error.help_message() {
    eprintln!("💡 Help: {}\n", help);
  }
}

impl From<anyhow::Error> for RailError {
  fn from(err: anyhow::Error) -> Self {
    RailError::message(err.to_string())
  }
}

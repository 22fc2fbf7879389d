//! Registry credentials and image publishing

use crate::core::error::{ConfigError, RailError, RailResult};
use crate::release::builder::ImageBuilder;
use crate::release::model::ImageHandle;
use std::fmt;
use tracing::info;

/// A password that never shows up in logs or debug output
#[derive(Clone, PartialEq, Eq)]
pub struct Secret(String);

impl Secret {
  pub fn new(value: impl Into<String>) -> Self {
    Self(value.into())
  }

  /// Read a secret from the environment variable `var`
  pub fn from_env(var: &str) -> RailResult<Self> {
    match std::env::var(var) {
      Ok(value) if !value.is_empty() => Ok(Self::new(value)),
      _ => Err(RailError::Config(ConfigError::Invalid {
        field: "password-env".to_string(),
        reason: format!("environment variable '{}' is unset or empty", var),
      })),
    }
  }

  pub fn expose(&self) -> &str {
    &self.0
  }
}

impl fmt::Debug for Secret {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str("Secret(***)")
  }
}

/// Login for one registry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryCredential {
  pub url: String,
  pub username: String,
  pub password: Secret,
}

impl RegistryCredential {
  pub fn new(url: impl Into<String>, username: impl Into<String>, password: Secret) -> Self {
    Self {
      url: url.into(),
      username: username.into(),
      password,
    }
  }
}

/// Registry host of a fully qualified image name
pub fn registry_of(name: &str) -> &str {
  name.split('/').next().unwrap_or(name)
}

/// Pushes images with every accumulated credential applied
pub struct Publisher<B> {
  images: B,
  credentials: Vec<RegistryCredential>,
}

impl<B: ImageBuilder> Publisher<B> {
  pub fn new(images: B) -> Self {
    Self {
      images,
      credentials: Vec::new(),
    }
  }

  pub fn with_credential(mut self, credential: RegistryCredential) -> Self {
    self.credentials.push(credential);
    self
  }

  pub fn add_credential(&mut self, credential: RegistryCredential) {
    self.credentials.push(credential);
  }

  pub fn images(&self) -> &B {
    &self.images
  }

  /// Fail unless at least one credential is configured
  pub fn ensure_credentials(&self, registry: &str) -> RailResult<()> {
    if self.credentials.is_empty() {
      return Err(RailError::Config(ConfigError::MissingCredentials {
        registry: registry.to_string(),
      }));
    }
    Ok(())
  }

  /// Push `image` as `name`; returns the digest reference
  pub fn publish(&self, image: &ImageHandle, name: &str) -> RailResult<String> {
    self.ensure_credentials(registry_of(name))?;
    let digest = self.images.publish(image, name, &self.credentials)?;
    info!(image = name, digest = %digest, "published image");
    Ok(digest)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::core::error::ExitCode;
  use crate::release::model::ArtifactKind;
  use crate::release::testing::FakeImages;

  fn credential(url: &str) -> RegistryCredential {
    RegistryCredential::new(url, "robot", Secret::new("hunter2"))
  }

  #[test]
  fn test_secret_is_redacted() {
    let rendered = format!("{:?}", credential("quay.io"));
    assert!(!rendered.contains("hunter2"));
    assert!(rendered.contains("Secret(***)"));
  }

  #[test]
  fn test_publish_without_credentials_never_pushes() {
    let images = FakeImages::new();
    let publisher = Publisher::new(&images);
    let image = ImageHandle::new(ArtifactKind::Catalog, "sha256:abc");

    let err = publisher
      .publish(&image, "quay.io/acme/widget-catalog:1.0.0")
      .unwrap_err();

    assert_eq!(err.exit_code(), ExitCode::User);
    assert!(err.to_string().contains("quay.io"));
    assert!(images.calls().is_empty());
  }

  #[test]
  fn test_every_credential_is_applied() {
    let images = FakeImages::new();
    let publisher = Publisher::new(&images)
      .with_credential(credential("quay.io"))
      .with_credential(credential("ghcr.io"));
    let image = ImageHandle::new(ArtifactKind::Manager, "sha256:abc");

    let digest = publisher.publish(&image, "ghcr.io/acme/widget:1.0.0").unwrap();
    assert_eq!(digest, "ghcr.io/acme/widget:1.0.0@sha256:abc");
    assert_eq!(images.calls(), vec!["publish ghcr.io/acme/widget:1.0.0 creds=2"]);
  }

  #[test]
  fn test_missing_password_env_is_config_error() {
    let err = Secret::from_env("OPERATOR_RAIL_TEST_UNSET_PASSWORD").unwrap_err();
    assert_eq!(err.exit_code(), ExitCode::User);
  }
}

//! The release pipeline
//!
//! ```text
//! resolve version -> manifests -> bundle -> gate -> build manager/bundle
//!   -> [publish manager, bundle -> compose catalog -> publish catalog]
//!   -> write VERSION
//! ```
//!
//! Every stage consumes the snapshot produced by the one before it. The
//! catalog is composed only after the bundle is pushed, since the index tool
//! pulls the bundle from the registry.

use crate::core::config::{ReleaseDefaults, ToolVersions};
use crate::core::error::{ConfigError, RailError, RailResult, ValidationError};
use crate::core::executor::Executor;
use crate::core::plan::{Operation, Plan};
use crate::core::snapshot::SourceSnapshot;
use crate::release::builder::{
  BUNDLE_DOCKERFILE, ImageBuilder, MANAGER_BINARY, RuntimeImage, build_bundle, build_manager, manager_build_command,
};
use crate::release::bundle::{bundle_commands, csv_path, generate_bundle, replaces_value};
use crate::release::catalog::{CATALOG_ARCHIVE, CatalogMode, CatalogRequest, build_catalog};
use crate::release::gate::{
  GateOptions, GateReport, envtest_command, format_command, go_version, lint_command, run_gate, test_command,
  vuln_command,
};
use crate::release::manifest::{generate_manifests, manifest_commands};
use crate::release::model::{ArtifactKind, ImageHandle, ImageName, Release};
use crate::release::project::ProjectDescriptor;
use crate::release::publish::{Publisher, RegistryCredential};
use crate::release::runner::{BuildLog, StageObserver, StageRunner};
use crate::release::stage::Stage;
use crate::release::version::{self, VERSION_MARKER};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

/// Everything a release invocation can be told
///
/// Built with [`ReleaseOptions::new`] and the chained setters; every field not
/// set keeps the documented default.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReleaseOptions {
  /// Registry host, e.g. "quay.io"
  pub registry: String,
  /// Repository below the registry, e.g. "acme/widget-operator"
  pub repository: String,
  /// Explicit semver version (ignored for build-number releases)
  pub version: Option<String>,
  /// CI build identifier; when set the version is derived from VERSION
  pub build_number: Option<String>,
  /// Version to replace; defaults to the VERSION marker
  pub previous_version: Option<String>,
  /// Isolated build: no replaces edge, fresh catalog
  pub skip_previous: bool,
  pub crd_version: Option<String>,
  /// Comma separated OLM channels
  pub channels: Option<String>,
  pub with_test: bool,
  /// Default "latest"
  pub kube_version: String,
  pub with_publish: bool,
  /// Also push the catalog as `:latest`
  pub publish_latest: bool,
  pub credentials: Vec<RegistryCredential>,
}

impl ReleaseOptions {
  pub fn new(registry: impl Into<String>, repository: impl Into<String>) -> Self {
    Self {
      registry: registry.into(),
      repository: repository.into(),
      version: None,
      build_number: None,
      previous_version: None,
      skip_previous: false,
      crd_version: None,
      channels: None,
      with_test: false,
      kube_version: "latest".to_string(),
      with_publish: false,
      publish_latest: false,
      credentials: Vec::new(),
    }
  }

  /// Start from release.toml defaults
  pub fn from_defaults(registry: impl Into<String>, repository: impl Into<String>, defaults: &ReleaseDefaults) -> Self {
    let mut options = Self::new(registry, repository);
    options.channels = defaults.channels.clone();
    options.crd_version = defaults.crd_version.clone();
    options.with_test = defaults.with_test;
    options.kube_version = defaults.kube_version.clone();
    options.publish_latest = defaults.publish_latest;
    options
  }

  pub fn version(mut self, version: impl Into<String>) -> Self {
    self.version = Some(version.into());
    self
  }

  pub fn build_number(mut self, build_number: impl Into<String>) -> Self {
    self.build_number = Some(build_number.into());
    self
  }

  pub fn previous_version(mut self, previous: impl Into<String>) -> Self {
    self.previous_version = Some(previous.into());
    self
  }

  pub fn skip_previous(mut self, skip: bool) -> Self {
    self.skip_previous = skip;
    self
  }

  pub fn crd_version(mut self, crd_version: impl Into<String>) -> Self {
    self.crd_version = Some(crd_version.into());
    self
  }

  pub fn channels(mut self, channels: impl Into<String>) -> Self {
    self.channels = Some(channels.into());
    self
  }

  pub fn with_test(mut self, with_test: bool) -> Self {
    self.with_test = with_test;
    self
  }

  pub fn kube_version(mut self, kube_version: impl Into<String>) -> Self {
    self.kube_version = kube_version.into();
    self
  }

  pub fn publish(mut self, publish: bool) -> Self {
    self.with_publish = publish;
    self
  }

  pub fn publish_latest(mut self, latest: bool) -> Self {
    self.publish_latest = latest;
    self
  }

  pub fn credential(mut self, credential: RegistryCredential) -> Self {
    self.credentials.push(credential);
    self
  }

  /// Check the options without touching anything
  pub fn validate(&self) -> RailResult<()> {
    if self.registry.trim().is_empty() {
      return Err(missing("registry"));
    }
    if self.repository.trim().is_empty() {
      return Err(missing("repository"));
    }

    match (&self.build_number, &self.version) {
      (Some(build), _) if build.trim().is_empty() => {
        return Err(invalid_version(build, "build number is empty"));
      }
      (Some(_), _) => {}
      (None, None) => return Err(invalid_version("", "no version given; pass --version or --build-number")),
      (None, Some(version)) => {
        semver::Version::parse(version.trim()).map_err(|e| invalid_version(version, e.to_string()))?;
      }
    }

    if let Some(previous) = self.previous_version.as_deref().filter(|p| !p.trim().is_empty()) {
      semver::Version::parse(previous.trim()).map_err(|e| invalid_version(previous, e.to_string()))?;
    }

    if self.with_publish && self.credentials.is_empty() {
      return Err(RailError::Config(ConfigError::MissingCredentials {
        registry: self.registry.clone(),
      }));
    }

    Ok(())
  }

  /// Resolve version and predecessor against the source tree
  pub fn resolve(&self, source: &SourceSnapshot) -> RailResult<Release> {
    let marker = version::read_marker(source);
    let target_version = version::resolve(
      self.version.as_deref().unwrap_or_default(),
      self.build_number.is_some(),
      self.build_number.as_deref().unwrap_or_default(),
      marker.as_deref(),
    )?;
    let previous_version =
      version::previous_version(self.previous_version.as_deref(), self.skip_previous, marker.as_deref());
    version::check_ordering(&target_version, previous_version.as_deref())?;

    Ok(Release {
      target_version,
      previous_version,
      channels: self.channels.as_deref().map(Release::parse_channels).unwrap_or_default(),
      is_build_number: self.build_number.is_some(),
    })
  }

  pub fn manager_image(&self) -> ImageName {
    ImageName::manager(&self.registry, &self.repository)
  }

  pub fn bundle_image(&self) -> ImageName {
    ImageName::bundle(&self.registry, &self.repository)
  }

  pub fn catalog_image(&self) -> ImageName {
    ImageName::catalog(&self.registry, &self.repository)
  }

  /// Catalog request for a release: linked to the previous catalog when there is one
  pub fn catalog_request(&self, release: &Release) -> CatalogRequest {
    let catalog = self.catalog_image();
    let previous = release.previous_version.as_deref().map(|p| catalog.tagged(p));
    CatalogRequest::new(
      catalog.tagged(&release.target_version),
      previous.as_deref(),
      self.bundle_image().tagged(&release.target_version),
      release.previous_version.is_some(),
    )
  }

  fn gate_options(&self) -> GateOptions {
    GateOptions {
      with_test: self.with_test,
      kube_version: self.kube_version.clone(),
    }
  }
}

fn missing(field: &str) -> RailError {
  RailError::Config(ConfigError::MissingField {
    field: field.to_string(),
  })
}

fn invalid_version(version: &str, reason: impl Into<String>) -> RailError {
  RailError::Validation(ValidationError::InvalidVersion {
    version: version.to_string(),
    reason: reason.into(),
  })
}

/// An image pushed to a registry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishedImage {
  pub kind: ArtifactKind,
  pub name: String,
  pub digest: String,
}

/// Result of a successful release
#[derive(Debug, Clone)]
pub struct ReleaseOutcome {
  pub release: Release,
  /// Final tree: regenerated manifests, bundle, coverage and VERSION
  pub snapshot: SourceSnapshot,
  pub manager: ImageHandle,
  pub bundle: ImageHandle,
  pub catalog: Option<ImageHandle>,
  pub catalog_mode: Option<CatalogMode>,
  pub published: Vec<PublishedImage>,
  pub gate: GateReport,
}

/// Drives one release from source snapshot to published images
pub struct ReleasePipeline<E, B> {
  runner: StageRunner<E>,
  images: B,
  tools: ToolVersions,
}

impl<E: Executor, B: ImageBuilder> ReleasePipeline<E, B> {
  pub fn new(executor: E, images: B, tools: ToolVersions) -> Self {
    Self {
      runner: StageRunner::new(executor),
      images,
      tools,
    }
  }

  pub fn with_observer(mut self, observer: StageObserver) -> Self {
    self.runner.set_observer(observer);
    self
  }

  /// Output of every stage run so far, including up to a failure
  pub fn log(&self) -> &BuildLog {
    self.runner.log()
  }

  /// Run the whole release
  pub fn run(&mut self, source: &SourceSnapshot, options: &ReleaseOptions) -> RailResult<ReleaseOutcome> {
    options.validate()?;
    let release = options.resolve(source)?;
    info!(
      version = %release.target_version,
      previous = release.previous_version.as_deref().unwrap_or("-"),
      source = %source.digest(),
      "starting release"
    );

    let manager_name = options.manager_image();
    let manifests = generate_manifests(&mut self.runner, source, options.crd_version.as_deref())?;
    let bundled = generate_bundle(&mut self.runner, &manifests, &manager_name.to_string(), &release)?;
    let (gated, gate) = run_gate(&mut self.runner, &bundled, &options.gate_options())?;

    let runtime = RuntimeImage::from_tools(&self.tools);
    let manager = build_manager(&mut self.runner, &self.images, &gated, &runtime)?;
    let bundle = build_bundle(&mut self.runner, &self.images, &gated)?;

    let mut outcome = ReleaseOutcome {
      release,
      snapshot: gated.clone(),
      manager,
      bundle,
      catalog: None,
      catalog_mode: None,
      published: Vec::new(),
      gate,
    };

    if options.with_publish {
      self.publish(options, &mut outcome)?;
    }

    outcome.snapshot = gated.with_file(VERSION_MARKER, outcome.release.target_version.clone());
    info!(version = %outcome.release.target_version, "release complete");
    Ok(outcome)
  }

  fn publish(&mut self, options: &ReleaseOptions, outcome: &mut ReleaseOutcome) -> RailResult<()> {
    let version = outcome.release.target_version.clone();
    let mut publisher = Publisher::new(&self.images);
    for credential in &options.credentials {
      publisher.add_credential(credential.clone());
    }
    publisher.ensure_credentials(&options.registry)?;

    self.runner.enter(Stage::Publish);
    let manager_name = options.manager_image().tagged(&version);
    let digest = publisher.publish(&outcome.manager, &manager_name)?;
    record(&mut self.runner, outcome, ArtifactKind::Manager, manager_name, digest);

    let bundle_name = options.bundle_image().tagged(&version);
    let digest = publisher.publish(&outcome.bundle, &bundle_name)?;
    record(&mut self.runner, outcome, ArtifactKind::Bundle, bundle_name, digest);

    let request = options.catalog_request(&outcome.release);
    let catalog = build_catalog(&mut self.runner, &self.images, &request)?;
    outcome.catalog_mode = Some(request.mode());

    self.runner.enter(Stage::Publish);
    let digest = publisher.publish(&catalog, &request.catalog)?;
    record(&mut self.runner, outcome, ArtifactKind::Catalog, request.catalog.clone(), digest);

    if options.publish_latest {
      let latest = options.catalog_image().latest();
      let digest = publisher.publish(&catalog, &latest)?;
      record(&mut self.runner, outcome, ArtifactKind::Catalog, latest, digest);
    }

    outcome.catalog = Some(catalog);
    Ok(())
  }

  /// Describe the release without running anything
  pub fn plan(&self, source: &SourceSnapshot, options: &ReleaseOptions) -> RailResult<Plan> {
    options.validate()?;
    let release = options.resolve(source)?;
    let project = ProjectDescriptor::load(source)?;
    let version = release.target_version.clone();
    let manager_name = options.manager_image();

    let mut plan = Plan::new(version.clone(), release.previous_version.clone());

    for command in manifest_commands(project.role_name(), options.crd_version.as_deref()) {
      plan.exec(Stage::Manifests, command);
    }

    if let Some(previous) = release.previous_version.as_deref() {
      plan.add_operation(Operation::PatchReplaces {
        path: csv_path(&project.project_name),
        replaces: replaces_value(&project.project_name, previous),
      });
    }
    let channels = release.channels_arg();
    for command in bundle_commands(&manager_name.to_string(), &version, channels.as_deref()) {
      plan.exec(Stage::Bundle, command);
    }

    plan.exec(Stage::Format, format_command());
    plan.exec(Stage::Lint, lint_command(go_version(source).as_deref()));
    plan.exec(Stage::VulnCheck, vuln_command());
    if options.with_test {
      plan.exec(Stage::EnvTest, envtest_command(&options.kube_version));
      plan.exec(Stage::Test, test_command("<envtest assets>"));
    }

    let runtime = RuntimeImage::from_tools(&self.tools);
    plan.exec(Stage::BuildManager, manager_build_command());
    plan.add_operation(Operation::PackageBinary {
      stage: Stage::BuildManager,
      binary: MANAGER_BINARY.to_string(),
      base: runtime.base,
      image: manager_name.tagged(&version),
    });
    plan.add_operation(Operation::BuildImage {
      stage: Stage::BuildBundle,
      dockerfile: BUNDLE_DOCKERFILE.to_string(),
      image: options.bundle_image().tagged(&version),
    });

    let mut summary = String::new();
    if options.with_publish {
      let request = options.catalog_request(&release);
      plan.add_operation(Operation::Publish {
        image: manager_name.tagged(&version),
      });
      plan.add_operation(Operation::Publish {
        image: options.bundle_image().tagged(&version),
      });
      plan.exec(Stage::Catalog, request.compose_command());
      plan.exec(Stage::Catalog, request.save_command());
      plan.add_operation(Operation::ImportArchive {
        archive: CATALOG_ARCHIVE.to_string(),
        image: request.catalog.clone(),
      });
      plan.add_operation(Operation::Publish {
        image: request.catalog.clone(),
      });
      if options.publish_latest {
        plan.add_operation(Operation::Publish {
          image: options.catalog_image().latest(),
        });
      }
      summary = match request.from_index() {
        Some(index) => format!("   Catalog: {} (from {})", request.mode(), index),
        None => format!("   Catalog: {}", request.mode()),
      };
    }

    plan.add_operation(Operation::WriteMarker {
      path: VERSION_MARKER.to_string(),
      version,
    });

    Ok(plan.with_summary(summary))
  }
}

fn record<E: Executor>(
  runner: &mut StageRunner<E>,
  outcome: &mut ReleaseOutcome,
  kind: ArtifactKind,
  name: String,
  digest: String,
) {
  runner.log_mut().note(Stage::Publish, format!("pushed {} ({})", name, digest));
  outcome.published.push(PublishedImage { kind, name, digest });
}

/// Machine-readable summary of a release, printed with `--json`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReleaseReport {
  pub version: String,
  pub previous_version: Option<String>,
  pub images: Vec<ImageReport>,
  pub catalog_mode: Option<CatalogMode>,
  pub published: Vec<PublishedImage>,
  pub gate: GateReport,
  pub log: String,
  pub finished_at: DateTime<Utc>,
}

/// A built image and its intended name
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageReport {
  pub kind: ArtifactKind,
  pub name: String,
  pub id: String,
}

impl ReleaseReport {
  pub fn new(outcome: &ReleaseOutcome, options: &ReleaseOptions, log: &BuildLog) -> Self {
    let version = &outcome.release.target_version;
    let mut images = vec![
      ImageReport {
        kind: ArtifactKind::Manager,
        name: options.manager_image().tagged(version),
        id: outcome.manager.id.clone(),
      },
      ImageReport {
        kind: ArtifactKind::Bundle,
        name: options.bundle_image().tagged(version),
        id: outcome.bundle.id.clone(),
      },
    ];
    if let Some(catalog) = &outcome.catalog {
      images.push(ImageReport {
        kind: ArtifactKind::Catalog,
        name: options.catalog_image().tagged(version),
        id: catalog.id.clone(),
      });
    }

    Self {
      version: version.clone(),
      previous_version: outcome.release.previous_version.clone(),
      images,
      catalog_mode: outcome.catalog_mode,
      published: outcome.published.clone(),
      gate: outcome.gate.clone(),
      log: log.render(),
      finished_at: Utc::now(),
    }
  }
}

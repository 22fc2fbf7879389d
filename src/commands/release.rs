//! Release command implementation

use crate::commands::{RegistryArgs, host_executor};
use crate::core::context::SourceContext;
use crate::core::error::RailResult;
use crate::release::docker::DockerImages;
use crate::release::pipeline::{ReleaseOptions, ReleasePipeline, ReleaseReport};
use crate::ui::progress::StageProgress;
use clap::Args;

#[derive(Args, Debug, Clone, Default)]
pub struct ReleaseArgs {
  /// Explicit semver version
  #[arg(long = "version", value_name = "VERSION")]
  pub explicit: Option<String>,
  /// CI build number; derives MAJOR.MINOR.(PATCH+1)-<build> from VERSION
  #[arg(long)]
  pub build_number: Option<String>,
  /// Version being replaced (default: VERSION file)
  #[arg(long)]
  pub previous_version: Option<String>,
  /// Isolated build: no replaces edge, fresh catalog
  #[arg(long)]
  pub skip_previous: bool,
  /// CRD API version passed to controller-gen
  #[arg(long)]
  pub crd_version: Option<String>,
  /// Comma separated OLM channels
  #[arg(long)]
  pub channels: Option<String>,
  /// Run the envtest suite
  #[arg(long)]
  pub with_test: bool,
  /// Kubernetes version of the envtest control plane
  #[arg(long)]
  pub kube_version: Option<String>,
  /// Push manager, bundle and catalog images
  #[arg(long)]
  pub publish: bool,
  /// Also push the catalog as :latest
  #[arg(long)]
  pub publish_latest: bool,
  #[command(flatten)]
  pub registry: RegistryArgs,
  /// Print the stage plan without running anything
  #[arg(long)]
  pub dry_run: bool,
  /// Keep the source directory untouched
  #[arg(long)]
  pub no_export: bool,
  /// Output in JSON format
  #[arg(long)]
  pub json: bool,
}

impl ReleaseArgs {
  /// Merge the flags over release.toml defaults
  pub fn options(&self, ctx: &SourceContext) -> RailResult<ReleaseOptions> {
    let (registry, repository) = self.registry.location(ctx)?;
    let defaults = &ctx.config.release;
    let mut options = ReleaseOptions::from_defaults(&registry, repository, defaults)
      .skip_previous(self.skip_previous)
      .with_test(self.with_test || defaults.with_test)
      .publish(self.publish)
      .publish_latest(self.publish_latest || defaults.publish_latest);

    if let Some(version) = &self.explicit {
      options = options.version(version);
    }
    if let Some(build) = &self.build_number {
      options = options.build_number(build);
    }
    if let Some(previous) = &self.previous_version {
      options = options.previous_version(previous);
    }
    if let Some(crd_version) = &self.crd_version {
      options = options.crd_version(crd_version);
    }
    if let Some(channels) = &self.channels {
      options = options.channels(channels);
    }
    if let Some(kube_version) = &self.kube_version {
      options = options.kube_version(kube_version);
    }
    for credential in self.registry.credentials(&registry)? {
      options = options.credential(credential);
    }
    Ok(options)
  }
}

/// Run the release command
pub fn run_release(ctx: &SourceContext, args: ReleaseArgs) -> RailResult<()> {
  let options = args.options(ctx)?;
  let tools = ctx.config.tools.clone();
  let mut pipeline = ReleasePipeline::new(host_executor(&tools), DockerImages::new(), tools);

  let plan = pipeline.plan(&ctx.snapshot, &options)?;
  if args.dry_run {
    if args.json {
      println!("{}", plan.to_json()?);
    } else {
      println!("{}", plan.to_human_readable());
      println!("🔍 Dry-run mode (nothing executed)");
    }
    return Ok(());
  }

  if StageProgress::enabled(args.json) {
    let progress = StageProgress::new(plan.stages(), format!("release {}", plan.metadata.version));
    pipeline = pipeline.with_observer(progress.into_observer());
  }

  let outcome = match pipeline.run(&ctx.snapshot, &options) {
    Ok(outcome) => outcome,
    Err(err) => {
      if !pipeline.log().is_empty() {
        eprintln!("{}", pipeline.log().render());
      }
      if let Some(stage) = err.failed_stage() {
        eprintln!("❌ Release {} stopped at stage '{}'", plan.metadata.version, stage);
      }
      return Err(err);
    }
  };

  if !args.no_export {
    let diff = outcome.snapshot.export_changes(&ctx.snapshot, &ctx.root)?;
    if !args.json && !diff.is_empty() {
      println!(
        "📝 Updated {} files in {} (+{} ~{} -{})",
        diff.len(),
        ctx.root.display(),
        diff.added.len(),
        diff.modified.len(),
        diff.removed.len()
      );
    }
  }

  let report = ReleaseReport::new(&outcome, &options, pipeline.log());
  if args.json {
    println!("{}", serde_json::to_string_pretty(&report)?);
    return Ok(());
  }

  println!("📦 Release {}", report.version);
  if let Some(previous) = &report.previous_version {
    println!("   Replaces: {}", previous);
  }
  for image in &report.images {
    println!("   {:<8} {} ({})", image.kind.to_string(), image.name, image.id);
  }
  if let Some(mode) = report.catalog_mode {
    println!("   Catalog:  {}", mode);
  }
  println!(
    "   Gate:     {} files formatted, coverage {}",
    report.gate.formatted.len(),
    if report.gate.coverage { "recorded" } else { "skipped" }
  );
  for published in &report.published {
    println!("✅ Pushed {}", published.digest);
  }
  if report.published.is_empty() {
    println!("✅ Built {} (not published)", report.version);
  }
  Ok(())
}

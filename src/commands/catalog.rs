//! Catalog command: compose (and optionally push) one catalog image

use crate::commands::{RegistryArgs, host_executor};
use crate::core::context::SourceContext;
use crate::core::error::{RailError, RailResult, ValidationError};
use crate::release::catalog::{CatalogRequest, build_catalog};
use crate::release::docker::DockerImages;
use crate::release::model::ImageName;
use crate::release::publish::Publisher;
use crate::release::runner::StageRunner;
use crate::release::stage::Stage;
use clap::Args;
use serde_json::json;

#[derive(Args, Debug, Clone, Default)]
pub struct CatalogArgs {
  /// Version of the bundle to add and of the catalog to produce
  #[arg(long = "version", value_name = "VERSION")]
  pub target_version: String,
  /// Version of the catalog to extend
  #[arg(long)]
  pub previous: Option<String>,
  /// Extend an existing index instead of starting a fresh one
  #[arg(long)]
  pub update: bool,
  /// Push the catalog after composing it
  #[arg(long)]
  pub publish: bool,
  /// Also push the catalog as :latest
  #[arg(long)]
  pub publish_latest: bool,
  #[command(flatten)]
  pub registry: RegistryArgs,
  /// Print the compose command without running it
  #[arg(long)]
  pub dry_run: bool,
  /// Output in JSON format
  #[arg(long)]
  pub json: bool,
}

/// Run the catalog command
pub fn run_catalog(ctx: &SourceContext, args: CatalogArgs) -> RailResult<()> {
  semver::Version::parse(args.target_version.trim()).map_err(|e| {
    RailError::Validation(ValidationError::InvalidVersion {
      version: args.target_version.clone(),
      reason: e.to_string(),
    })
  })?;

  let (registry, repository) = args.registry.location(ctx)?;
  let catalog = ImageName::catalog(&registry, &repository);
  let previous = args.previous.as_deref().map(|p| catalog.tagged(p.trim()));
  let request = CatalogRequest::new(
    catalog.tagged(&args.target_version),
    previous.as_deref(),
    ImageName::bundle(&registry, &repository).tagged(&args.target_version),
    args.update,
  );

  let publisher = args
    .registry
    .credentials(&registry)?
    .into_iter()
    .fold(Publisher::new(DockerImages::new()), Publisher::with_credential);
  if args.publish {
    publisher.ensure_credentials(&registry)?;
  }

  if args.dry_run {
    if args.json {
      let plan = json!({
        "catalog": request.catalog,
        "mode": request.mode(),
        "from_index": request.from_index(),
        "command": request.compose_command().to_string(),
      });
      println!("{}", serde_json::to_string_pretty(&plan)?);
    } else {
      println!("📋 Catalog {} ({})", request.catalog, request.mode());
      println!("   {}", request.compose_command());
      println!("🔍 Dry-run mode (nothing executed)");
    }
    return Ok(());
  }

  let mut runner = StageRunner::new(host_executor(&ctx.config.tools));
  let handle = match build_catalog(&mut runner, publisher.images(), &request) {
    Ok(handle) => handle,
    Err(err) => {
      eprintln!("{}", runner.log().render());
      return Err(err);
    }
  };

  let mut pushed = Vec::new();
  if args.publish {
    runner.enter(Stage::Publish);
    pushed.push(publisher.publish(&handle, &request.catalog)?);
    if args.publish_latest {
      pushed.push(publisher.publish(&handle, &catalog.latest())?);
    }
  }

  if args.json {
    let report = json!({
      "catalog": request.catalog,
      "mode": request.mode(),
      "from_index": request.from_index(),
      "image": handle.id,
      "published": pushed,
    });
    println!("{}", serde_json::to_string_pretty(&report)?);
  } else {
    println!("📦 Catalog {} ({})", request.catalog, request.mode());
    for digest in &pushed {
      println!("✅ Pushed {}", digest);
    }
  }
  Ok(())
}

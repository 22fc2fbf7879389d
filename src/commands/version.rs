//! Version command: print the version a release would use

use crate::core::context::SourceContext;
use crate::core::error::RailResult;
use crate::release::version;
use clap::Args;
use serde::Serialize;

#[derive(Args, Debug, Clone, Default)]
pub struct VersionArgs {
  /// Explicit semver version
  #[arg(long = "version", value_name = "VERSION")]
  pub explicit: Option<String>,
  /// CI build number; derives MAJOR.MINOR.(PATCH+1)-<build> from VERSION
  #[arg(long)]
  pub build_number: Option<String>,
  /// Version being replaced (default: VERSION file)
  #[arg(long)]
  pub previous_version: Option<String>,
  /// Isolated build without a predecessor
  #[arg(long)]
  pub skip_previous: bool,
  /// Output in JSON format
  #[arg(long)]
  pub json: bool,
}

#[derive(Debug, Serialize)]
struct ResolvedVersion {
  version: String,
  previous_version: Option<String>,
}

/// Run the version command
pub fn run_version(ctx: &SourceContext, args: VersionArgs) -> RailResult<()> {
  let marker = version::read_marker(&ctx.snapshot);
  let resolved = ResolvedVersion {
    version: version::resolve(
      args.explicit.as_deref().unwrap_or_default(),
      args.build_number.is_some(),
      args.build_number.as_deref().unwrap_or_default(),
      marker.as_deref(),
    )?,
    previous_version: version::previous_version(args.previous_version.as_deref(), args.skip_previous, marker.as_deref()),
  };
  version::check_ordering(&resolved.version, resolved.previous_version.as_deref())?;

  if args.json {
    println!("{}", serde_json::to_string_pretty(&resolved)?);
  } else {
    println!("{}", resolved.version);
  }
  Ok(())
}

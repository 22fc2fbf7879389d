mod commands;
mod core;
mod release;
mod ui;
mod utils;

use clap::{Parser, Subcommand};
use core::context::SourceContext;
use core::error::{RailError, print_error};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Release Kubernetes operators: bundles, images and chained OLM catalogs
#[derive(Parser)]
#[command(name = "operator-rail")]
#[command(version, about, long_about = None)]
#[command(styles = get_styles())]
struct Cli {
  /// Operator project root
  #[arg(long, global = true, default_value = ".")]
  source: PathBuf,

  /// Explicit release.toml (default: searched in the source root)
  #[arg(long, global = true)]
  config: Option<PathBuf>,

  /// Log pipeline internals (same as RUST_LOG=debug)
  #[arg(short, long, global = true)]
  verbose: bool,

  #[command(subcommand)]
  command: Commands,
}

#[derive(Subcommand)]
enum Commands {
  /// Print the version a release would use
  Version(commands::VersionArgs),

  /// Run the release pipeline (or plan it with --dry-run)
  Release(commands::ReleaseArgs),

  /// Compose one catalog image, optionally chained to a previous one
  Catalog(commands::CatalogArgs),
}

fn get_styles() -> clap::builder::Styles {
  clap::builder::Styles::styled()
    .usage(
      anstyle::Style::new()
        .bold()
        .underline()
        .fg_color(Some(anstyle::Color::Ansi(anstyle::AnsiColor::Yellow))),
    )
    .header(
      anstyle::Style::new()
        .bold()
        .underline()
        .fg_color(Some(anstyle::Color::Ansi(anstyle::AnsiColor::Yellow))),
    )
    .literal(anstyle::Style::new().fg_color(Some(anstyle::Color::Ansi(anstyle::AnsiColor::Green))))
    .invalid(
      anstyle::Style::new()
        .bold()
        .fg_color(Some(anstyle::Color::Ansi(anstyle::AnsiColor::Red))),
    )
    .error(
      anstyle::Style::new()
        .bold()
        .fg_color(Some(anstyle::Color::Ansi(anstyle::AnsiColor::Red))),
    )
    .valid(
      anstyle::Style::new()
        .bold()
        .underline()
        .fg_color(Some(anstyle::Color::Ansi(anstyle::AnsiColor::Green))),
    )
    .placeholder(anstyle::Style::new().fg_color(Some(anstyle::Color::Ansi(anstyle::AnsiColor::White))))
}

/// Logs go to stderr so `--json` output stays parseable
fn init_logging(verbose: bool) {
  let filter = if verbose {
    EnvFilter::new("debug")
  } else {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
  };
  tracing_subscriber::fmt()
    .with_env_filter(filter)
    .with_writer(std::io::stderr)
    .with_target(false)
    .init();
}

fn main() {
  let cli = Cli::parse();
  init_logging(cli.verbose);

  let ctx = match SourceContext::build(&cli.source, cli.config.as_deref()) {
    Ok(ctx) => ctx,
    Err(e) => handle_error(e),
  };

  let result = match cli.command {
    Commands::Version(args) => commands::run_version(&ctx, args),
    Commands::Release(args) => commands::run_release(&ctx, args),
    Commands::Catalog(args) => commands::run_catalog(&ctx, args),
  };

  if let Err(err) = result {
    handle_error(err);
  }
}

fn handle_error(err: RailError) -> ! {
  print_error(&err);
  std::process::exit(err.exit_code().as_i32());
}

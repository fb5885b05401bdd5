use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{error, info};

use schemagen::{hooks, sdl, HooksConfig, SdlConfig};

/// Schema and data-hook generators.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Log debug detail
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Generate a GraphQL schema from the newest SQL migration
    Sdl {
        /// Directory holding the migrations
        #[arg(short, long)]
        migrations_dir: Option<PathBuf>,

        /// Convert this file instead of the newest migration
        #[arg(short, long)]
        input: Option<PathBuf>,

        /// File the schema is written to
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Generate react-query hooks next to every route config
    Hooks {
        /// Directory to scan, defaults to the current one
        root: Option<PathBuf>,
    },
}

fn init_tracing(verbose: bool) {
    let default_filter = if verbose { "schemagen=debug" } else { "schemagen=info" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .without_time()
        .init();
}

fn run_sdl(
    migrations_dir: Option<PathBuf>,
    input: Option<PathBuf>,
    output: Option<PathBuf>,
) -> Result<()> {
    let mut config = SdlConfig::default();
    if let Some(dir) = migrations_dir {
        config.migrations_dir = dir;
    }
    if let Some(output) = output {
        config.output = output;
    }

    let input = match input {
        Some(input) => input,
        None => sdl::latest_migration(&config.migrations_dir)?,
    };
    sdl::generate_sdl(&input, &config.output)
        .with_context(|| format!("generating schema from {}", input.display()))?;
    Ok(())
}

fn main() -> ExitCode {
    let args = Args::parse();
    init_tracing(args.verbose);

    match args.command {
        Command::Sdl {
            migrations_dir,
            input,
            output,
        } => match run_sdl(migrations_dir, input, output) {
            Ok(()) => ExitCode::SUCCESS,
            Err(err) => {
                error!("❌ {:#}", err);
                ExitCode::FAILURE
            }
        },
        Command::Hooks { root } => {
            let root = root.unwrap_or_else(|| PathBuf::from("."));
            let config = HooksConfig::default();
            let summary = hooks::generate(&root, &config);
            info!(
                "{} written, {} skipped, {} failed",
                summary.written.len(),
                summary.skipped.len(),
                summary.failed.len()
            );
            ExitCode::SUCCESS
        }
    }
}

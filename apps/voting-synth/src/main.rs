use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use svckit::InMemoryProvider;
use svckit_bootstrap::{AppConfig, CliArgs, OutputFormat};

use std::path::{Path, PathBuf};
use std::sync::Arc;

mod topology;

/// Voting Synth - composes the voting application from service extensions
#[derive(Parser)]
#[command(name = "voting-synth")]
#[command(about = "Voting Synth - composes the voting application from service extensions")]
#[command(version = "0.1.0")]
struct Cli {
    /// Path to configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Environment id override (overrides config)
    #[arg(short, long)]
    environment: Option<String>,

    /// Manifest format override
    #[arg(short, long, value_enum)]
    format: Option<Format>,

    /// Write the manifest to this file instead of stdout
    #[arg(short, long)]
    output: Option<String>,

    /// Print effective configuration (YAML) and exit
    #[arg(long)]
    print_config: bool,

    /// Log verbosity level (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Clone, Copy, ValueEnum)]
enum Format {
    Yaml,
    Json,
}

impl From<Format> for OutputFormat {
    fn from(format: Format) -> Self {
        match format {
            Format::Yaml => OutputFormat::Yaml,
            Format::Json => OutputFormat::Json,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Build every service and emit the deployment manifest
    Synth,
    /// Build every service without emitting anything
    Check,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let args = CliArgs {
        config: cli.config.as_ref().map(|p| p.to_string_lossy().to_string()),
        environment: cli.environment.clone(),
        format: cli.format.map(OutputFormat::from),
        output: cli.output.clone(),
        print_config: cli.print_config,
        verbose: cli.verbose,
    };

    // Layered config:
    // 1) defaults -> 2) YAML (if provided) -> 3) env (SVCKIT__*) -> 4) CLI overrides
    let mut config = AppConfig::load_or_default(cli.config.as_deref())?;
    config.apply_cli_overrides(&args);

    // Relative log files live next to the config file.
    let base_dir = cli
        .config
        .as_deref()
        .and_then(Path::parent)
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));
    let logging_config = config.logging.clone().unwrap_or_default();
    svckit_bootstrap::logging::init_logging_unified(&logging_config, &base_dir);

    tracing::info!("Voting Synth starting");

    if cli.print_config {
        println!("{}", config.to_yaml()?);
        return Ok(());
    }

    match cli.command.unwrap_or(Commands::Synth) {
        Commands::Synth => synth(&config),
        Commands::Check => check(&config),
    }
}

fn synth(config: &AppConfig) -> Result<()> {
    let deployment = topology::synthesize(config, Arc::new(InMemoryProvider::new()))?;
    let rendered = topology::render_manifest(&deployment.manifest(), config.output.format)?;

    match &config.output.path {
        Some(path) => {
            std::fs::write(path, rendered)
                .with_context(|| format!("Failed to write manifest to {path}"))?;
            tracing::info!(path = %path, "Manifest written");
        }
        None => println!("{rendered}"),
    }
    Ok(())
}

fn check(config: &AppConfig) -> Result<()> {
    tracing::info!("Checking configuration…");
    let deployment = topology::synthesize(config, Arc::new(InMemoryProvider::new()))?;
    println!(
        "Configuration is valid: {} services, {} connections",
        deployment.services().count(),
        deployment.connection_graph().len()
    );
    Ok(())
}

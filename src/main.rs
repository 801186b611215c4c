// ABOUTME: Entry point for the stagecoach CLI application.
// ABOUTME: Parses arguments, sets up tracing and dispatches to command handlers.

mod cli;
mod commands;

use clap::Parser;
use cli::{Cli, Commands};
use stagecoach::config;
use stagecoach::deploy::DeployRequest;
use stagecoach::error::Result;
use stagecoach::output::{Output, OutputMode};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // RUST_LOG wins over the verbose flag
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if cli.verbose {
            EnvFilter::new("debug")
        } else {
            EnvFilter::new("warn")
        }
    });
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    let mode = if cli.json {
        OutputMode::Json
    } else if cli.quiet {
        OutputMode::Quiet
    } else {
        OutputMode::Normal
    };

    let code = match run(cli, mode).await {
        Ok(code) => code,
        Err(e) => {
            Output::new(mode).error(&e.to_string());
            e.exit_code()
        }
    };
    std::process::exit(code);
}

async fn run(cli: Cli, mode: OutputMode) -> Result<i32> {
    let output = Output::new(mode);
    let config_path = cli.config.as_deref();

    match cli.command {
        Commands::Init {
            service,
            image,
            force,
        } => {
            let cwd = std::env::current_dir()?;
            config::init_config(&cwd, service.as_deref(), image.as_deref(), force)?;
            output.success(&format!("Created {}", config::CONFIG_FILENAME));
            Ok(0)
        }
        Commands::Seed {
            environment,
            version,
            force,
        } => commands::seed(config_path, environment, version, force, output),
        Commands::Bump {
            environment,
            kind,
            dry_run,
        } => commands::bump(config_path, environment, kind, dry_run, output),
        Commands::Deploy {
            environment,
            version,
            increment,
            approve,
            force_lease,
        } => {
            let config = commands::load_config(config_path)?;
            let request = DeployRequest {
                environment,
                version,
                increment,
                approved: approve,
                force_lease,
            };
            commands::deploy(config, request, output).await
        }
        Commands::Rollback {
            environment,
            force_lease,
        } => {
            let config = commands::load_config(config_path)?;
            commands::rollback(config, environment, force_lease, output).await
        }
        Commands::Status { environment, live } => {
            let config = commands::load_config(config_path)?;
            commands::status(config, environment, live, output).await
        }
    }
}

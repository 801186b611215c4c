// ABOUTME: Command-line interface definition using clap derive macros.
// ABOUTME: Defines all subcommands and their arguments.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use stagecoach::types::{Environment, IncrementKind, Version};

#[derive(Parser)]
#[command(name = "stagecoach")]
#[command(about = "Staged container deployments with health verification and rollback")]
#[command(version)]
pub struct Cli {
    /// Path to the configuration file (default: discover stagecoach.yml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Only print the final result
    #[arg(short, long, global = true, conflicts_with = "json")]
    pub quiet: bool,

    /// Print JSON lines instead of text
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize a new stagecoach.yml configuration file
    Init {
        /// Service name
        #[arg(long)]
        service: Option<String>,

        /// Image repository (without tag)
        #[arg(long)]
        image: Option<String>,

        /// Overwrite an existing configuration
        #[arg(long)]
        force: bool,
    },

    /// Create the initial version record for an environment
    Seed {
        environment: Environment,

        version: Version,

        /// Overwrite an existing record (the old one is kept as .bak)
        #[arg(long)]
        force: bool,
    },

    /// Increment an environment's recorded version without deploying
    Bump {
        environment: Environment,

        /// patch, minor, major or auto
        kind: IncrementKind,

        /// Print the next version without saving it
        #[arg(long)]
        dry_run: bool,
    },

    /// Deploy a version to an environment
    Deploy {
        environment: Environment,

        /// Exact version to deploy
        #[arg(required_unless_present = "increment")]
        version: Option<Version>,

        /// Deploy the next version instead (patch, minor, major or auto)
        #[arg(short, long, conflicts_with = "version")]
        increment: Option<IncrementKind>,

        /// Approve a deploy to an environment that requires approval
        #[arg(long)]
        approve: bool,

        /// Break a lease held by another deploy
        #[arg(long)]
        force_lease: bool,
    },

    /// Re-apply the last known-good state of an environment
    Rollback {
        environment: Environment,

        /// Break a lease held by another deploy
        #[arg(long)]
        force_lease: bool,
    },

    /// Show version, last attempt and lease state
    Status {
        /// Environment to show (default: all configured)
        environment: Option<Environment>,

        /// Also run the status command on the target
        #[arg(long)]
        live: bool,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn deploy_takes_version_or_increment() {
        let cli = Cli::try_parse_from(["stagecoach", "deploy", "dev", "v1.2.3"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Deploy { version: Some(v), increment: None, .. } if v == Version::new(1, 2, 3)
        ));

        let cli = Cli::try_parse_from(["stagecoach", "deploy", "prod", "-i", "patch", "--approve"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Deploy { environment: Environment::Prod, increment: Some(IncrementKind::Patch), approve: true, .. }
        ));

        assert!(Cli::try_parse_from(["stagecoach", "deploy", "dev"]).is_err());
        assert!(Cli::try_parse_from(["stagecoach", "deploy", "dev", "v1.0.0", "-i", "patch"]).is_err());
        assert!(Cli::try_parse_from(["stagecoach", "deploy", "qa", "v1.0.0"]).is_err());
    }

    #[test]
    fn global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["stagecoach", "status", "--json", "-v"]).unwrap();
        assert!(cli.json && cli.verbose);
        assert!(Cli::try_parse_from(["stagecoach", "status", "--json", "--quiet"]).is_err());
    }
}

use std::{path::PathBuf, sync::OnceLock};

use clap::{Parser, Subcommand};

/// Deploy applications described by a values file to Kubernetes and AWS.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Args {
    /// Path to the values file.
    #[arg(short = 'f', long, global = true, default_value = "fh.yaml")]
    pub values: PathBuf,
    /// Org the stacks live in. Overrides the values file.
    #[arg(short, long, global = true)]
    pub org: Option<String>,
    /// AWS region. Overrides the values file.
    #[arg(short, long, global = true, env = "AWS_REGION")]
    pub region: Option<String>,
    /// Log debug output.
    #[arg(long, global = true)]
    pub debug: bool,
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Commands {
    /// Deploy the application, or preview the deployment.
    Up(UpArgs),
    /// Delete the application.
    Destroy(DestroyArgs),
    /// List the applications deployed in the org.
    Get,
}

#[derive(clap::Args, Debug, Clone, PartialEq, Eq)]
pub struct UpArgs {
    /// Only show what would change.
    #[arg(short, long)]
    pub preview: bool,
    /// Show the engine's own output instead of the progress log.
    #[arg(short, long)]
    pub verbose: bool,
    /// Docker build context of the application.
    #[arg(short, long, default_value = ".")]
    pub dir: PathBuf,
    /// Use a network load balancer for public services.
    #[arg(long)]
    pub nlb: bool,
}

#[derive(clap::Args, Debug, Clone, PartialEq, Eq)]
pub struct DestroyArgs {
    /// Only show what would be deleted.
    #[arg(short, long)]
    pub preview: bool,
    #[arg(short, long)]
    pub verbose: bool,
    /// Docker build context of the application.
    #[arg(short, long, default_value = ".")]
    pub dir: PathBuf,
}

static ARGS: OnceLock<Args> = OnceLock::new();

pub fn get_cli_args() -> &'static Args {
    ARGS.get_or_init(Args::parse)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Args::command().debug_assert();
    }

    #[test]
    fn test_up_flags() {
        let args = Args::try_parse_from([
            "fh", "-f", "api.yaml", "--org", "acme", "up", "-p", "--dir", "app", "--nlb",
        ])
        .unwrap();
        assert_eq!(args.values, PathBuf::from("api.yaml"));
        assert_eq!(args.org.as_deref(), Some("acme"));
        assert_eq!(
            args.command,
            Commands::Up(UpArgs {
                preview: true,
                verbose: false,
                dir: PathBuf::from("app"),
                nlb: true,
            })
        );
    }

    #[test]
    fn test_destroy_defaults() {
        let args = Args::try_parse_from(["fh", "destroy", "-v"]).unwrap();
        assert_eq!(args.values, PathBuf::from("fh.yaml"));
        assert_eq!(
            args.command,
            Commands::Destroy(DestroyArgs {
                preview: false,
                verbose: true,
                dir: PathBuf::from("."),
            })
        );
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let args = Args::try_parse_from(["fh", "get", "--debug", "-o", "acme"]).unwrap();
        assert!(args.debug);
        assert_eq!(args.org.as_deref(), Some("acme"));
        assert_eq!(args.command, Commands::Get);
    }
}

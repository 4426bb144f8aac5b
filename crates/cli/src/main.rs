//! Sitegate CLI - Main Entry Point
//!
//! Verifies a candidate deployment against a baseline deployment, page by
//! page, and exits non-zero when any page regressed.

use clap::{Parser, Subcommand};
use tracing::error;

mod commands;
mod output;

use commands::{manifest, verify};

/// Exit code for runs that could not start or finish
const EXIT_FATAL: i32 = 2;

/// Sitegate - visual regression gate for site deployments
#[derive(Parser)]
#[command(name = "sitegate")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Output format
    #[arg(long, default_value = "table", global = true)]
    format: output::OutputFormat,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compare the candidate deployment against the baseline
    Verify(verify::VerifyArgs),

    /// Validate a manifest and list its normalized paths
    Manifest(manifest::ManifestArgs),

    /// Show version information
    Version,
}

async fn run(cli: Cli) -> anyhow::Result<i32> {
    match cli.command {
        Commands::Verify(args) => verify::execute(args, cli.format).await,
        Commands::Manifest(args) => {
            manifest::execute(args, cli.format).await?;
            Ok(0)
        }
        Commands::Version => {
            println!("Sitegate CLI v{}", sitegate_common::VERSION);
            Ok(0)
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let code = match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            error!("{}", e);
            for cause in e.chain().skip(1) {
                error!(cause = %cause, "caused by");
            }
            output::print_error(&e.to_string());
            EXIT_FATAL
        }
    };

    std::process::exit(code);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verify_flags_parse() {
        let cli = Cli::try_parse_from([
            "sitegate",
            "verify",
            "--mode",
            "visual",
            "--page",
            "/about",
            "--improvement-tolerant",
            "--window",
            "2",
            "--format",
            "json",
        ])
        .unwrap();

        assert_eq!(cli.format, output::OutputFormat::Json);
        match cli.command {
            Commands::Verify(args) => {
                assert!(matches!(args.mode, Some(verify::ModeArg::Visual)));
                assert_eq!(args.page.as_deref(), Some("/about"));
                assert!(args.improvement_tolerant);
                assert_eq!(args.window, Some(2));
            }
            _ => panic!("expected verify"),
        }
    }

    #[test]
    fn test_unknown_mode_is_rejected() {
        assert!(Cli::try_parse_from(["sitegate", "verify", "--mode", "dom"]).is_err());
    }

    #[test]
    fn test_manifest_subcommand_parses() {
        let cli = Cli::try_parse_from(["sitegate", "manifest", "--manifest", "site/pages.txt"]).unwrap();
        match cli.command {
            Commands::Manifest(args) => assert_eq!(args.manifest, std::path::PathBuf::from("site/pages.txt")),
            _ => panic!("expected manifest"),
        }
    }
}

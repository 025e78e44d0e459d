//! # cpan-lock
//!
//! Converts `cpanfile.snapshot` files into lockfiles for reproducible fetches.

mod commands;
mod lockfile;
mod metacpan;
mod snapshot;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use commands::lock::{LockOptions, Output};
use metacpan::LockError;
use snapshot::SnapshotError;
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "cpan-lock")]
#[command(about = "Lock cpanfile.snapshot dependencies", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[command(flatten)]
    options: GlobalOptions,
}

#[derive(Args)]
struct GlobalOptions {
    /// Base directory for relative paths
    #[arg(long, global = true, env = "BUILD_WORKING_DIRECTORY")]
    working_dir: Option<PathBuf>,

    /// Release API endpoint
    #[arg(long, global = true, env = "METACPAN_API_ENDPOINT")]
    endpoint: Option<String>,

    /// Request timeout in seconds (default: wait indefinitely)
    #[arg(long, global = true, value_parser = clap::value_parser!(u64).range(1..))]
    timeout: Option<u64>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Write the lockfile
    Lock {
        /// Path to cpanfile.snapshot
        snapshot: PathBuf,
        /// Lockfile path (defaults to <SNAPSHOT>.lock.json)
        output: Option<PathBuf>,
    },
    /// Print the lockfile to stdout
    Print {
        /// Path to cpanfile.snapshot
        snapshot: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Logs go to stderr so `print` output stays clean
    let level = if cli.options.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)),
        )
        .with_writer(std::io::stderr)
        .init();

    let options = LockOptions {
        working_dir: cli.options.working_dir,
        endpoint: cli.options.endpoint,
        timeout: cli.options.timeout.map(Duration::from_secs),
    };

    let result = match cli.command {
        Commands::Lock { snapshot, output } => {
            let output = Output::File(output);
            commands::lock::execute(&snapshot, output, &options, std::io::stdout()).await
        }
        Commands::Print { snapshot } => {
            commands::lock::execute(&snapshot, Output::Stdout, &options, std::io::stdout()).await
        }
    };

    if let Err(err) = result {
        if is_reportable(&err) {
            eprintln!("{:#}", err);
            std::process::exit(1);
        }
        return Err(err);
    }

    Ok(())
}

/// Lock failures and a missing snapshot are reported without a backtrace
fn is_reportable(err: &anyhow::Error) -> bool {
    err.chain().any(|cause| {
        cause.is::<LockError>()
            || matches!(
                cause.downcast_ref::<SnapshotError>(),
                Some(SnapshotError::Missing { .. })
            )
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;

    #[test]
    fn test_cli_lock_args() {
        let cli = Cli::parse_from(["cpan-lock", "lock", "cpanfile.snapshot", "out.json"]);
        match cli.command {
            Commands::Lock { snapshot, output } => {
                assert_eq!(snapshot, PathBuf::from("cpanfile.snapshot"));
                assert_eq!(output, Some(PathBuf::from("out.json")));
            }
            Commands::Print { .. } => panic!("expected lock command"),
        }
    }

    #[test]
    fn test_cli_print_args() {
        let cli = Cli::parse_from([
            "cpan-lock",
            "print",
            "cpanfile.snapshot",
            "--endpoint",
            "http://localhost/release",
            "--timeout",
            "5",
        ]);
        assert!(matches!(cli.command, Commands::Print { .. }));
        assert_eq!(cli.options.endpoint.as_deref(), Some("http://localhost/release"));
        assert_eq!(cli.options.timeout, Some(5));
    }

    #[test]
    fn test_reportable_errors() {
        let lock_err = anyhow::Error::new(LockError::MissingRelease {
            url: "http://api/x".to_string(),
            body: "{}".to_string(),
        });
        assert!(is_reportable(&lock_err));

        let missing = anyhow::Error::new(SnapshotError::Missing {
            path: PathBuf::from("cpanfile.snapshot"),
            source: std::io::Error::from(std::io::ErrorKind::NotFound),
        });
        assert!(is_reportable(&missing));

        let parse_err = anyhow::Error::new(SnapshotError::OrphanLine {
            line: 1,
            text: "Foo 1".to_string(),
        });
        assert!(!is_reportable(&parse_err));
    }

    #[test]
    fn test_missing_output_directory_is_not_reportable() {
        let write_err: Result<()> = Err(std::io::Error::from(std::io::ErrorKind::NotFound))
            .context("Failed to write nope/cpanfile.snapshot.lock.json");

        assert!(!is_reportable(&write_err.unwrap_err()));
    }

    #[test]
    fn test_cli_rejects_zero_timeout() {
        let result = Cli::try_parse_from(["cpan-lock", "print", "cpanfile.snapshot", "--timeout", "0"]);
        assert!(result.is_err());

        let cli = Cli::parse_from(["cpan-lock", "print", "cpanfile.snapshot", "--timeout", "1"]);
        assert_eq!(cli.options.timeout, Some(1));
    }
}

//! # Lock Command
//!
//! Lock a `cpanfile.snapshot` and write or print the result.

use crate::lockfile::{self, LockBuilder, Lockfile};
use crate::metacpan::{MetaCpan, ReleaseSource};
use crate::snapshot;
use anyhow::{Context, Result};
use colored::Colorize;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info_span};

/// Where the lockfile goes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Output {
    /// Write to this file, or beside the snapshot when `None`
    File(Option<PathBuf>),
    /// Print to the command's standard output
    Stdout,
}

/// Options shared by both output modes
#[derive(Debug, Clone)]
pub struct LockOptions {
    /// Base for relative paths
    pub working_dir: Option<PathBuf>,
    /// Release API endpoint
    pub endpoint: Option<String>,
    /// Request timeout
    pub timeout: Option<Duration>,
}

/// Execute the `cpan-lock lock` and `cpan-lock print` commands
pub async fn execute<W: Write>(
    snapshot: &Path,
    output: Output,
    options: &LockOptions,
    stdout: W,
) -> Result<()> {
    let source = MetaCpan::new(options.endpoint.as_deref(), options.timeout)?;
    debug!("Using release endpoint {}", source.endpoint());
    run(source, snapshot, output, options.working_dir.as_deref(), stdout).await
}

/// Lock `snapshot` with releases from `source`.
///
/// `Output::Stdout` writes the lockfile to `stdout`.
pub async fn run<S: ReleaseSource, W: Write>(
    source: S,
    snapshot: &Path,
    output: Output,
    working_dir: Option<&Path>,
    mut stdout: W,
) -> Result<()> {
    let snapshot_path = resolve_path(snapshot, working_dir);
    let snapshot = snapshot::load(&snapshot_path)?;

    let span = info_span!("lock", snapshot = %snapshot_path.display());
    let lockfile = LockBuilder::new(source)
        .with_span(span)
        .build(&snapshot)
        .await?;

    match output {
        Output::File(path) => {
            let path = match path {
                Some(path) => resolve_path(&path, working_dir),
                None => default_lockfile_path(&snapshot_path),
            };
            lockfile::save(&lockfile, &path)?;
            report(&lockfile, &path.display().to_string());
        }
        Output::Stdout => {
            let content = lockfile::render(&lockfile)?;
            stdout
                .write_all(content.as_bytes())
                .context("Failed to print lockfile")?;
            stdout.flush().context("Failed to print lockfile")?;
            report(&lockfile, "stdout");
        }
    }

    Ok(())
}

fn report(lockfile: &Lockfile, destination: &str) {
    eprintln!(
        "{} {} distribution(s) to {}",
        "Locked".green().bold(),
        lockfile.len(),
        destination
    );
}

/// Resolve a relative path against the working directory
pub fn resolve_path(path: &Path, working_dir: Option<&Path>) -> PathBuf {
    if path.is_absolute() {
        return path.to_path_buf();
    }
    working_dir.unwrap_or_else(|| Path::new(".")).join(path)
}

/// `<snapshot>.lock.json` beside the snapshot
pub fn default_lockfile_path(snapshot: &Path) -> PathBuf {
    let mut name = snapshot
        .file_name()
        .map(|name| name.to_os_string())
        .unwrap_or_default();
    name.push(".lock.json");
    snapshot.with_file_name(name)
}

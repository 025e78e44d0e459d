//! # Lockfile Generation
//!
//! Builds the `*.lock.json` lockfile from a parsed snapshot.

use crate::metacpan::{LockError, ReleaseSource};
use crate::snapshot::Snapshot;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use tracing::{debug, info, warn, Instrument, Span};

/// Lockfile, keyed by distribution name without version
pub type Lockfile = BTreeMap<String, LockEntry>;

/// Locked distribution.
///
/// Fields are declared in alphabetical order so the rendered JSON has
/// sorted keys.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockEntry {
    /// Names of the locked distributions this one requires
    pub dependencies: BTreeSet<String>,
    /// Archive checksum
    pub sha256: String,
    /// Top-level directory inside the archive
    pub strip_prefix: String,
    /// Archive download URL
    pub url: String,
}

/// Strip the trailing `-version` from a distribution name
pub fn sanitize_name(name: &str) -> &str {
    match name.rfind('-') {
        Some(index) => &name[..index],
        None => name,
    }
}

/// Get the CPAN author id from an archive pathname
pub fn author_of(pathname: &str) -> Option<&str> {
    let segments: Vec<&str> = pathname.split('/').collect();
    if segments.len() < 2 {
        return None;
    }
    Some(segments[segments.len() - 2])
}

/// Find the distributions providing the requirements of `key`.
///
/// Each requirement maps to the first other distribution that provides it.
/// Requirements nobody provides, like core modules, are dropped.
pub fn resolve_dependencies(snapshot: &Snapshot, key: &str) -> BTreeSet<String> {
    let mut dependencies = BTreeSet::new();
    let Some(distribution) = snapshot.get(key) else {
        return dependencies;
    };

    for requirement in distribution.requirements.keys() {
        let provider = snapshot
            .iter()
            .filter(|(other, _)| other.as_str() != key)
            .find(|(_, other)| other.provides.contains_key(requirement));

        if let Some((provider, _)) = provider {
            dependencies.insert(sanitize_name(provider).to_string());
        }
    }

    dependencies
}

/// Lockfile builder
pub struct LockBuilder<S> {
    source: S,
    span: Span,
}

impl<S: ReleaseSource> LockBuilder<S> {
    /// Create a builder fetching releases from `source`
    pub fn new(source: S) -> Self {
        Self {
            source,
            span: Span::none(),
        }
    }

    /// Record all builder events inside `span`
    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    /// Lock every distribution of the snapshot.
    ///
    /// Releases are fetched one at a time. The first failure aborts the
    /// whole build.
    pub async fn build(&self, snapshot: &Snapshot) -> Result<Lockfile, LockError> {
        self.build_entries(snapshot)
            .instrument(self.span.clone())
            .await
    }

    async fn build_entries(&self, snapshot: &Snapshot) -> Result<Lockfile, LockError> {
        let mut lockfile = Lockfile::new();

        for (key, distribution) in snapshot {
            let dependencies = resolve_dependencies(snapshot, key);

            let author = author_of(&distribution.pathname).ok_or_else(|| LockError::Author {
                distribution: key.clone(),
                pathname: distribution.pathname.clone(),
            })?;
            debug!(distribution = %key, author, ?dependencies, "Resolved distribution");

            let release = self.source.fetch_release(author, key).await?;
            debug!(distribution = %key, ?release, "Fetched release");

            let name = sanitize_name(&release.name).to_string();
            info!(distribution = %release.distribution, "Adding {}", name);

            let entry = LockEntry {
                dependencies,
                sha256: release.checksum_sha256,
                strip_prefix: key.clone(),
                url: release.download_url,
            };

            if let Some(previous) = lockfile.insert(name.clone(), entry) {
                warn!(
                    "{} locked twice, replacing {} with {}",
                    name, previous.strip_prefix, key
                );
            }
        }

        Ok(lockfile)
    }
}

/// Render a lockfile as pretty JSON with a trailing newline
pub fn render(lockfile: &Lockfile) -> Result<String> {
    let mut content =
        serde_json::to_string_pretty(lockfile).context("Failed to serialize lockfile")?;
    content.push('\n');
    Ok(content)
}

/// Write a lockfile, replacing any existing file
pub fn save<P: AsRef<Path>>(lockfile: &Lockfile, path: P) -> Result<()> {
    let path = path.as_ref();
    let content = render(lockfile)?;

    std::fs::write(path, content)
        .with_context(|| format!("Failed to write {}", path.display()))?;

    Ok(())
}

//! # Snapshot Parsing
//!
//! Reads `cpanfile.snapshot` files into an ordered map of distributions.

use indexmap::IndexMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Parsed snapshot, keyed by distribution (`Name-Version`) in file order
pub type Snapshot = IndexMap<String, Distribution>;

/// One distribution block of a snapshot
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Distribution {
    /// Archive path, e.g. `E/ET/ETHER/Try-Tiny-0.31.tar.gz`
    pub pathname: String,
    /// Module name to version provided by this distribution
    pub provides: IndexMap<String, String>,
    /// Module name to version required by this distribution
    pub requirements: IndexMap<String, String>,
}

/// Snapshot loading error
#[derive(Debug, Error)]
pub enum SnapshotError {
    /// The snapshot file does not exist
    #[error("Snapshot not found: {}", path.display())]
    Missing {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A field or nested line appeared before any distribution header
    #[error("line {line}: `{text}` does not belong to any distribution")]
    OrphanLine { line: usize, text: String },
}

#[derive(Clone, Copy)]
enum Container {
    Provides,
    Requirements,
}

/// Read and parse a snapshot file
pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Snapshot> {
    use anyhow::Context;

    let path = path.as_ref();
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(source) if source.kind() == std::io::ErrorKind::NotFound => {
            return Err(SnapshotError::Missing {
                path: path.to_path_buf(),
                source,
            }
            .into())
        }
        Err(err) => {
            return Err(err).with_context(|| format!("Failed to read {}", path.display()))
        }
    };

    let snapshot = parse(&content)
        .with_context(|| format!("Failed to parse {}", path.display()))?;

    Ok(snapshot)
}

/// Parse the text of a snapshot.
///
/// The snapshot is indentation structured: two spaces open a distribution,
/// four spaces hold its fields and six or more hold the entries of the
/// `provides`/`requirements` container opened last. Other lines, such as the
/// `DISTRIBUTIONS` marker, are skipped.
pub fn parse(content: &str) -> Result<Snapshot, SnapshotError> {
    let mut snapshot = Snapshot::new();
    let mut current: Option<String> = None;
    let mut container: Option<Container> = None;

    for (index, line) in content.lines().enumerate() {
        let text = line.trim();
        if text.is_empty() || text.starts_with('#') {
            continue;
        }

        let indent = line.len() - line.trim_start_matches(' ').len();

        if indent == 2 {
            snapshot.insert(text.to_string(), Distribution::default());
            current = Some(text.to_string());
            container = None;
            continue;
        }

        if indent < 4 || indent == 5 {
            continue;
        }

        let distribution = current
            .as_ref()
            .and_then(|key| snapshot.get_mut(key))
            .ok_or_else(|| SnapshotError::OrphanLine {
                line: index + 1,
                text: text.to_string(),
            })?;

        if indent == 4 {
            container = None;
            if let Some(pathname) = text.strip_prefix("pathname:") {
                distribution.pathname = pathname.trim().to_string();
            } else if text.starts_with("provides:") {
                container = Some(Container::Provides);
            } else if text.starts_with("requirements:") {
                container = Some(Container::Requirements);
            }
            continue;
        }

        let Some(container) = container else {
            continue;
        };

        let (key, value) = text.split_once(' ').unwrap_or((text, ""));
        let entries = match container {
            Container::Provides => &mut distribution.provides,
            Container::Requirements => &mut distribution.requirements,
        };
        entries.insert(key.to_string(), value.trim().to_string());
    }

    Ok(snapshot)
}

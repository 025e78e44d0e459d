//! # Release Metadata
//!
//! Client for the MetaCPAN release API.

use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;

/// Default release API endpoint
pub const DEFAULT_ENDPOINT: &str = "https://fastapi.metacpan.org/release";

/// Failure to generate a lockfile
#[derive(Debug, Error)]
pub enum LockError {
    #[error("Failed to create HTTP client: {0}")]
    Client(#[source] reqwest::Error),

    #[error("Failed to fetch {url}: {source}")]
    Fetch {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Failed to fetch {url}: HTTP {status}. Body:\n{body}")]
    Status {
        url: String,
        status: reqwest::StatusCode,
        body: String,
    },

    #[error("Failed to parse JSON from {url}: {source}")]
    Json {
        url: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to find 'release' key in JSON from {url}. Json:\n{body}")]
    MissingRelease { url: String, body: String },

    #[error("Unexpected 'release' in JSON from {url}: {source}. Json:\n{body}")]
    InvalidRelease {
        url: String,
        #[source]
        source: serde_json::Error,
        body: String,
    },

    #[error("Cannot determine author of {distribution} from pathname '{pathname}'")]
    Author {
        distribution: String,
        pathname: String,
    },
}

/// Canonical release information
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Release {
    /// Release name, e.g. `Try-Tiny-0.31`
    pub name: String,
    /// Distribution name without version
    pub distribution: String,
    /// Archive download URL
    pub download_url: String,
    /// SHA-256 of the archive
    pub checksum_sha256: String,
}

/// Source of release metadata
pub trait ReleaseSource {
    /// Look up the release of `distribution` uploaded by `author`
    async fn fetch_release(&self, author: &str, distribution: &str) -> Result<Release, LockError>;
}

/// MetaCPAN API client
pub struct MetaCpan {
    endpoint: String,
    client: reqwest::Client,
}

impl MetaCpan {
    /// Create a new client. Requests wait indefinitely unless `timeout` is set.
    pub fn new(endpoint: Option<&str>, timeout: Option<Duration>) -> Result<Self, LockError> {
        let endpoint = endpoint
            .unwrap_or(DEFAULT_ENDPOINT)
            .trim_end_matches('/')
            .to_string();

        let mut builder = reqwest::Client::builder()
            .user_agent(format!("cpan-lock/{}", env!("CARGO_PKG_VERSION")));
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder.build().map_err(LockError::Client)?;

        Ok(Self { endpoint, client })
    }

    /// Get endpoint URL
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

impl ReleaseSource for MetaCpan {
    async fn fetch_release(&self, author: &str, distribution: &str) -> Result<Release, LockError> {
        let url = format!("{}/{}/{}", self.endpoint, author, distribution);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|source| LockError::Fetch {
                url: url.clone(),
                source,
            })?;

        let status = response.status();
        let body = response.text().await.map_err(|source| LockError::Fetch {
            url: url.clone(),
            source,
        })?;

        if !status.is_success() {
            return Err(LockError::Status { url, status, body });
        }

        parse_release(&url, &body)
    }
}

/// Extract the `release` object from an API response body
fn parse_release(url: &str, body: &str) -> Result<Release, LockError> {
    let mut json: serde_json::Value =
        serde_json::from_str(body).map_err(|source| LockError::Json {
            url: url.to_string(),
            source,
        })?;

    let release = match json.get_mut("release") {
        Some(release) => release.take(),
        None => {
            return Err(LockError::MissingRelease {
                url: url.to_string(),
                body: body.to_string(),
            })
        }
    };

    serde_json::from_value(release).map_err(|source| LockError::InvalidRelease {
        url: url.to_string(),
        source,
        body: body.to_string(),
    })
}

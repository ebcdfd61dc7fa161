//! Release discovery against a GitHub-style releases endpoint
//!
//! The index answers with a JSON array of releases, newest first, each with a
//! `tag_name` and an ordered `assets` list. Every release should carry a
//! classifier and an encoder asset; anything with fewer usable assets is
//! skipped rather than indexed blindly.

use parking_lot::RwLock;
use sentiscope_core::{Error, ModelVersion, ReleaseEntry, Result};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Release index configuration
#[derive(Debug, Clone)]
pub struct DiscoveryConfig {
    /// Releases endpoint, e.g. `https://api.github.com/repos/{owner}/{repo}/releases`
    pub releases_url: String,

    /// Bearer token sent with index requests
    pub token: Option<String>,

    /// Fail with a configuration error when no token is set
    pub token_required: bool,

    /// Upper bound on one index request
    pub timeout: Duration,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            releases_url: "https://api.github.com/repos/remla25-team20/model-training/releases"
                .to_string(),
            token: None,
            token_required: false,
            timeout: Duration::from_secs(15),
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawRelease {
    tag_name: String,
    #[serde(default)]
    assets: Vec<RawAsset>,
}

#[derive(Debug, Deserialize)]
struct RawAsset {
    #[serde(default)]
    name: Option<String>,
    browser_download_url: String,
    /// `sha256:<hex>` when the index publishes digests
    #[serde(default)]
    digest: Option<String>,
}

impl RawAsset {
    fn sha256(&self) -> Option<String> {
        self.digest
            .as_deref()
            .and_then(|d| d.strip_prefix("sha256:"))
            .map(str::to_string)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AssetRole {
    Encoder,
    Classifier,
}

fn role_from_name(name: &str) -> Option<AssetRole> {
    let name = name.to_ascii_lowercase();
    // "cv" (count vectorizer) is too short to match as a substring.
    let cv_word = name
        .split(|c: char| !c.is_ascii_alphanumeric())
        .any(|word| word == "cv");
    if cv_word || ["encoder", "vectorizer", "bow"].iter().any(|k| name.contains(k)) {
        Some(AssetRole::Encoder)
    } else if ["classifier", "model"].iter().any(|k| name.contains(k)) {
        Some(AssetRole::Classifier)
    } else {
        None
    }
}

/// Pick (encoder, classifier) out of a release's assets
///
/// Unambiguous file names win. Otherwise the published layout applies:
/// asset 0 is the classifier, asset 1 the encoder.
fn select_assets(assets: &[RawAsset]) -> Option<(&RawAsset, &RawAsset)> {
    let named = |role| {
        let mut matches = assets
            .iter()
            .filter(move |a| a.name.as_deref().and_then(role_from_name) == Some(role));
        match (matches.next(), matches.next()) {
            (Some(asset), None) => Some(asset),
            _ => None,
        }
    };

    if let (Some(encoder), Some(classifier)) =
        (named(AssetRole::Encoder), named(AssetRole::Classifier))
    {
        return Some((encoder, classifier));
    }

    let classifier = assets.first()?;
    let encoder = assets.get(1)?;
    Some((encoder, classifier))
}

/// Parse a releases document into entries, preserving index order
pub fn parse_releases(body: &[u8]) -> Result<Vec<ReleaseEntry>> {
    let releases: Vec<RawRelease> = serde_json::from_slice(body)
        .map_err(|e| Error::discovery(format!("malformed release index: {}", e)))?;

    let mut entries = Vec::with_capacity(releases.len());
    for release in releases {
        let version = match ModelVersion::new(release.tag_name.as_str()) {
            Ok(version) => version,
            Err(_) => {
                warn!("Skipping release with unusable tag {:?}", release.tag_name);
                continue;
            }
        };

        let Some((encoder, classifier)) = select_assets(&release.assets) else {
            debug!(
                "Skipping release {} with {} asset(s)",
                version,
                release.assets.len()
            );
            continue;
        };

        entries.push(ReleaseEntry {
            encoder_url: encoder.browser_download_url.clone(),
            classifier_url: classifier.browser_download_url.clone(),
            encoder_sha256: encoder.sha256(),
            classifier_sha256: classifier.sha256(),
            version,
        });
    }

    Ok(entries)
}

/// Client for the release index
pub struct ReleaseDiscovery {
    config: DiscoveryConfig,
    client: reqwest::Client,
}

impl ReleaseDiscovery {
    /// Create a discovery client
    pub fn new(config: DiscoveryConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent(concat!("sentiscope/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Error::config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self { config, client })
    }

    /// Discovery configuration
    pub fn config(&self) -> &DiscoveryConfig {
        &self.config
    }

    /// Fetch and parse the release index, newest first
    pub async fn list_releases(&self) -> Result<Vec<ReleaseEntry>> {
        let token = self.config.token.as_deref().filter(|t| !t.is_empty());
        if self.config.token_required && token.is_none() {
            return Err(Error::config(
                "release index requires an access token but none is configured",
            ));
        }

        let mut request = self
            .client
            .get(&self.config.releases_url)
            .header(reqwest::header::ACCEPT, "application/vnd.github+json");
        if let Some(token) = token {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| Error::discovery(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::discovery(format!(
                "release index answered with status {}",
                status
            )));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| Error::discovery(e.to_string()))?;

        let entries = parse_releases(&body)?;
        info!(
            "Discovered {} release(s) from {}",
            entries.len(),
            self.config.releases_url
        );
        Ok(entries)
    }

    /// The newest release, if any
    pub async fn latest(&self) -> Result<Option<ReleaseEntry>> {
        Ok(self.list_releases().await?.into_iter().next())
    }
}

/// The most recent release listing, shared between discovery and loading
#[derive(Default)]
pub struct ReleaseCatalog {
    entries: RwLock<Arc<Vec<ReleaseEntry>>>,
}

impl ReleaseCatalog {
    /// Create an empty catalog
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the listing wholesale
    pub fn replace(&self, entries: Vec<ReleaseEntry>) {
        *self.entries.write() = Arc::new(entries);
    }

    /// Snapshot of the listing, newest first
    pub fn entries(&self) -> Arc<Vec<ReleaseEntry>> {
        Arc::clone(&self.entries.read())
    }

    /// Look up one version
    pub fn get(&self, version: &ModelVersion) -> Option<ReleaseEntry> {
        self.entries
            .read()
            .iter()
            .find(|entry| &entry.version == version)
            .cloned()
    }

    /// The newest release
    pub fn latest(&self) -> Option<ReleaseEntry> {
        self.entries.read().first().cloned()
    }

    /// Known versions, newest first
    pub fn versions(&self) -> Vec<ModelVersion> {
        self.entries
            .read()
            .iter()
            .map(|entry| entry.version.clone())
            .collect()
    }

    /// Number of known releases
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Whether no release is known
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

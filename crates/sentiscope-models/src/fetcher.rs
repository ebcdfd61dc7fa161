//! Artifact download and local cache
//!
//! Layout: `{cache_dir}/{version}/{encoder_file}` and
//! `{cache_dir}/{version}/{classifier_file}`. A file that already exists is
//! never downloaded again, even if the remote copy changed.

use crate::model::ArtifactPaths;
use sentiscope_core::{Error, ModelVersion, ReleaseEntry, Result};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

/// Configuration for the artifact cache
#[derive(Debug, Clone)]
pub struct FetcherConfig {
    /// Root directory of the per-version cache
    pub cache_dir: PathBuf,

    /// File name of the encoder inside a version directory
    pub encoder_file: String,

    /// File name of the classifier inside a version directory
    pub classifier_file: String,

    /// Upper bound on a single download
    pub timeout: Duration,
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            cache_dir: default_cache_dir(),
            encoder_file: "encoder.json".to_string(),
            classifier_file: "classifier.json".to_string(),
            timeout: Duration::from_secs(60),
        }
    }
}

/// `~/.cache/sentiscope/models`, or `./models` when no cache dir is known
pub fn default_cache_dir() -> PathBuf {
    dirs::cache_dir()
        .map(|dir| dir.join("sentiscope/models"))
        .unwrap_or_else(|| PathBuf::from("./models"))
}

/// Downloads artifacts into the version cache
pub struct ArtifactFetcher {
    config: FetcherConfig,
    client: reqwest::Client,
    downloads: AtomicU64,
}

impl ArtifactFetcher {
    /// Create a fetcher with its own HTTP client
    pub fn new(config: FetcherConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent(concat!("sentiscope/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Error::config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self::with_client(config, client))
    }

    /// Create a fetcher around an existing client
    pub fn with_client(config: FetcherConfig, client: reqwest::Client) -> Self {
        Self {
            config,
            client,
            downloads: AtomicU64::new(0),
        }
    }

    /// Cache configuration
    pub fn config(&self) -> &FetcherConfig {
        &self.config
    }

    /// Directory holding one version's artifacts
    pub fn version_dir(&self, version: &ModelVersion) -> PathBuf {
        self.config.cache_dir.join(version.as_str())
    }

    /// Deterministic target paths for a version (no I/O)
    pub fn local_paths(&self, version: &ModelVersion) -> ArtifactPaths {
        let dir = self.version_dir(version);
        ArtifactPaths {
            encoder: dir.join(&self.config.encoder_file),
            classifier: dir.join(&self.config.classifier_file),
        }
    }

    /// Whether both artifacts of a version are on disk
    pub fn is_cached(&self, version: &ModelVersion) -> bool {
        self.local_paths(version).exist()
    }

    /// Number of HTTP downloads performed so far
    pub fn download_count(&self) -> u64 {
        self.downloads.load(Ordering::Relaxed)
    }

    /// Make sure both artifacts of `version` are present locally
    pub async fn ensure_local(
        &self,
        version: &ModelVersion,
        encoder_url: &str,
        classifier_url: &str,
    ) -> Result<ArtifactPaths> {
        let paths = self.local_paths(version);
        self.fetch_to(encoder_url, &paths.encoder, None).await?;
        self.fetch_to(classifier_url, &paths.classifier, None).await?;
        Ok(paths)
    }

    /// Like [`ensure_local`](Self::ensure_local), verifying published digests
    pub async fn ensure_release(&self, entry: &ReleaseEntry) -> Result<ArtifactPaths> {
        let paths = self.local_paths(&entry.version);
        self.fetch_to(&entry.encoder_url, &paths.encoder, entry.encoder_sha256.as_deref())
            .await?;
        self.fetch_to(
            &entry.classifier_url,
            &paths.classifier,
            entry.classifier_sha256.as_deref(),
        )
        .await?;
        Ok(paths)
    }

    /// Versions with both artifacts in the cache, sorted
    pub fn cached_versions(&self) -> Result<Vec<ModelVersion>> {
        let entries = match std::fs::read_dir(&self.config.cache_dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut versions = Vec::new();
        for entry in entries {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            let Some(name) = entry.file_name().to_str().map(str::to_string) else {
                continue;
            };
            if let Ok(version) = ModelVersion::new(name) {
                if self.is_cached(&version) {
                    versions.push(version);
                }
            }
        }

        versions.sort();
        Ok(versions)
    }

    /// Download `url` to `target` unless `target` already exists
    async fn fetch_to(&self, url: &str, target: &Path, expected_sha256: Option<&str>) -> Result<()> {
        if tokio::fs::try_exists(target).await? {
            debug!("Artifact already cached: {:?}", target);
            return Ok(());
        }

        let dir = target
            .parent()
            .ok_or_else(|| Error::internal(format!("artifact path has no parent: {:?}", target)))?;
        tokio::fs::create_dir_all(dir).await?;

        info!("Downloading artifact {} -> {:?}", url, target);
        self.downloads.fetch_add(1, Ordering::Relaxed);

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| Error::artifact(url, e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::artifact(url, format!("status {}", status)));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| Error::artifact(url, e.to_string()))?;

        if let Some(expected) = expected_sha256 {
            let actual = format!("{:x}", Sha256::digest(&body));
            if !actual.eq_ignore_ascii_case(expected) {
                return Err(Error::artifact(
                    url,
                    format!("sha256 mismatch: expected {}, got {}", expected, actual),
                ));
            }
        }

        write_atomically(dir, target, &body).await?;
        debug!("Stored {} bytes at {:?}", body.len(), target);
        Ok(())
    }
}

/// Write to a unique temp file in `dir`, then rename over `target`
async fn write_atomically(dir: &Path, target: &Path, body: &[u8]) -> Result<()> {
    let file_name = target
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("artifact");
    let tmp = dir.join(format!(".{}.{}.part", file_name, uuid::Uuid::new_v4()));

    let write = async {
        let mut file = tokio::fs::File::create(&tmp).await?;
        file.write_all(body).await?;
        file.sync_all().await?;
        drop(file);
        tokio::fs::rename(&tmp, target).await
    };

    if let Err(e) = write.await {
        if let Err(cleanup) = tokio::fs::remove_file(&tmp).await {
            warn!("Failed to remove partial download {:?}: {}", tmp, cleanup);
        }
        return Err(e.into());
    }

    Ok(())
}

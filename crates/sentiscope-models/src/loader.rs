//! Model loading seam used by the registry

use crate::discovery::ReleaseCatalog;
use crate::fetcher::ArtifactFetcher;
use crate::model::LoadedModel;
use async_trait::async_trait;
use sentiscope_core::{Error, ModelVersion, Result};
use std::sync::Arc;
use tracing::{debug, info};

/// Produces a ready model for a version
///
/// The registry guarantees at most one concurrent call per version.
#[async_trait]
pub trait ModelLoader: Send + Sync {
    /// Load the given version
    async fn load(&self, version: &ModelVersion) -> Result<LoadedModel>;
}

/// Loads versions from the artifact cache, downloading missing files
///
/// Resolution order: files already on disk, then the release catalog. A
/// version that is in neither is unknown.
pub struct ArtifactModelLoader {
    fetcher: Arc<ArtifactFetcher>,
    catalog: Arc<ReleaseCatalog>,
}

impl ArtifactModelLoader {
    /// Create a loader over a fetcher and catalog
    pub fn new(fetcher: Arc<ArtifactFetcher>, catalog: Arc<ReleaseCatalog>) -> Self {
        Self { fetcher, catalog }
    }
}

#[async_trait]
impl ModelLoader for ArtifactModelLoader {
    async fn load(&self, version: &ModelVersion) -> Result<LoadedModel> {
        let mut paths = self.fetcher.local_paths(version);

        if !paths.exist() {
            match self.catalog.get(version) {
                Some(entry) => {
                    info!("Fetching artifacts for model {}", version);
                    paths = self
                        .fetcher
                        .ensure_release(&entry)
                        .await
                        .map_err(|e| Error::model_load(version.as_str(), e.to_string()))?;
                }
                None if paths.any_exist() => {
                    return Err(Error::model_load(
                        version.as_str(),
                        "artifact pair is incomplete and the version is not in the release catalog",
                    ));
                }
                None => return Err(Error::UnknownVersion(version.to_string())),
            }
        }

        debug!("Deserializing model {} from {:?}", version, paths.encoder.parent());
        let version = version.clone();
        tokio::task::spawn_blocking(move || LoadedModel::load(&version, &paths))
            .await
            .map_err(|e| Error::internal(format!("model load task failed: {}", e)))?
    }
}

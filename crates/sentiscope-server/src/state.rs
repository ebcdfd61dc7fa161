//! Shared application state and startup orchestration

use crate::config::{LoadMode, ServiceConfig};
use metrics_exporter_prometheus::PrometheusHandle;
use parking_lot::RwLock;
use sentiscope_core::{Error, ModelVersion, Result};
use sentiscope_models::{
    ArtifactFetcher, ArtifactModelLoader, LoadedModel, ModelLoader, ModelRegistry, PredictionEngine,
    RegistryEvent, RegistryObserver, ReleaseCatalog, ReleaseDiscovery,
};
use sentiscope_telemetry::{FeedbackSink, ServiceEvent};
use std::sync::Arc;
use std::time::SystemTime;
use tracing::{debug, info, warn};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// Effective configuration
    pub config: Arc<ServiceConfig>,

    /// Resident model versions and the active one
    pub registry: Arc<ModelRegistry>,

    /// Latest release listing
    pub catalog: Arc<ReleaseCatalog>,

    /// Release index client
    pub discovery: Arc<ReleaseDiscovery>,

    /// Artifact cache
    pub fetcher: Arc<ArtifactFetcher>,

    /// Tokenize, encode, classify
    pub engine: PredictionEngine,

    /// Feedback log
    pub feedback: Arc<dyn FeedbackSink>,

    /// Prometheus renderer, absent when no recorder is installed
    pub metrics: Option<PrometheusHandle>,

    /// Version to activate on first request in lazy mode
    pending_default: Arc<RwLock<Option<ModelVersion>>>,
}

impl AppState {
    /// Wire up every component; performs no network I/O
    pub fn build(
        config: ServiceConfig,
        feedback: Arc<dyn FeedbackSink>,
        metrics: Option<PrometheusHandle>,
    ) -> Result<Self> {
        Self::build_with_loader(config, feedback, metrics, |fetcher, catalog| {
            Arc::new(ArtifactModelLoader::new(fetcher, catalog))
        })
    }

    /// Like [`build`](Self::build), with the model loader supplied by `loader`
    pub fn build_with_loader(
        config: ServiceConfig,
        feedback: Arc<dyn FeedbackSink>,
        metrics: Option<PrometheusHandle>,
        loader: impl FnOnce(Arc<ArtifactFetcher>, Arc<ReleaseCatalog>) -> Arc<dyn ModelLoader>,
    ) -> Result<Self> {
        let fetcher = Arc::new(ArtifactFetcher::new(config.fetcher_config())?);
        let discovery = Arc::new(ReleaseDiscovery::new(config.discovery_config())?);
        let catalog = Arc::new(ReleaseCatalog::new());

        let loader = loader(Arc::clone(&fetcher), Arc::clone(&catalog));
        let registry = ModelRegistry::new(loader, config.registry_config())
            .with_observer(Arc::new(MetricsObserver));

        Ok(Self {
            config: Arc::new(config),
            registry: Arc::new(registry),
            catalog,
            discovery,
            fetcher,
            engine: PredictionEngine::with_default()?,
            feedback,
            metrics,
            pending_default: Arc::new(RwLock::new(None)),
        })
    }

    /// Startup sequence: discover, optionally preload, pick the default version
    ///
    /// Only configuration errors are fatal. An unreachable index drops the
    /// service into offline mode over whatever is already cached, and a
    /// default version that fails to load leaves predictions answering
    /// not-ready until one is activated.
    pub async fn initialize(&self) -> Result<()> {
        let offline = match self.refresh_catalog().await {
            Ok(count) => {
                info!("Release catalog holds {} version(s)", count);
                false
            }
            Err(e @ Error::Configuration(_)) => return Err(e),
            Err(e) => {
                warn!("Release discovery failed, serving cached versions only: {}", e);
                true
            }
        };

        let candidates = if offline {
            self.fetcher.cached_versions()?
        } else {
            self.catalog.versions()
        };

        let target = match self.config.default_version()? {
            Some(version) => Some(version),
            None if offline => self.newest_cached(&candidates),
            None => self.catalog.latest().map(|entry| entry.version),
        };

        match self.config.load_mode {
            LoadMode::Eager => {
                let report = self.registry.preload(&candidates).await;
                for (version, err) in &report.failed {
                    warn!("Preload of {} failed: {}", version, err);
                }
                if let Some(version) = target {
                    self.activate_default(&version).await;
                }
            }
            LoadMode::Lazy => {
                if let Some(version) = &target {
                    info!("Model {} will be activated on first request", version);
                }
                *self.pending_default.write() = target;
            }
        }

        if self.registry.active_version().is_none() && self.pending_default.read().is_none() {
            warn!("No model version available; predictions will fail until one is activated");
        }

        Ok(())
    }

    /// Re-read the release index into the catalog
    pub async fn refresh_catalog(&self) -> Result<usize> {
        match self.discovery.list_releases().await {
            Ok(entries) => {
                let count = entries.len();
                self.catalog.replace(entries);
                ServiceEvent::Discovery {
                    success: true,
                    releases: count,
                }
                .record();
                Ok(count)
            }
            Err(e) => {
                ServiceEvent::Discovery {
                    success: false,
                    releases: 0,
                }
                .record();
                Err(e)
            }
        }
    }

    /// Model for a request: the named version, or the active one
    pub async fn resolve_model(&self, version: Option<&str>) -> Result<Arc<LoadedModel>> {
        if let Some(version) = version {
            let version = ModelVersion::new(version)?;
            return self.registry.get_or_load(&version).await;
        }

        if let Ok(model) = self.registry.active() {
            return Ok(model);
        }

        let pending = self.pending_default.read().clone();
        match pending {
            Some(version) => {
                debug!("Activating pending default model {}", version);
                // An explicit activation during this load takes precedence.
                let model = self.registry.set_active_if_unset(&version).await?;
                self.clear_pending(&version);
                Ok(model)
            }
            None => self.registry.active(),
        }
    }

    /// Switch the active version
    pub async fn activate(&self, version: &ModelVersion) -> Result<Arc<LoadedModel>> {
        let model = self.registry.set_active(version).await?;
        *self.pending_default.write() = None;
        Ok(model)
    }

    /// Version waiting for lazy activation
    pub fn pending_default(&self) -> Option<ModelVersion> {
        self.pending_default.read().clone()
    }

    async fn activate_default(&self, version: &ModelVersion) {
        match self.registry.set_active(version).await {
            Ok(_) => info!("Active model: {}", version),
            Err(e) => warn!("Failed to activate default model {}: {}", version, e),
        }
    }

    fn clear_pending(&self, version: &ModelVersion) {
        let mut pending = self.pending_default.write();
        if pending.as_ref() == Some(version) {
            *pending = None;
        }
    }

    /// Most recently written of the cached versions
    fn newest_cached(&self, versions: &[ModelVersion]) -> Option<ModelVersion> {
        versions
            .iter()
            .max_by_key(|version| {
                std::fs::metadata(self.fetcher.version_dir(version))
                    .and_then(|meta| meta.modified())
                    .unwrap_or(SystemTime::UNIX_EPOCH)
            })
            .cloned()
    }
}

/// Forwards registry lifecycle events to metrics
pub struct MetricsObserver;

impl RegistryObserver for MetricsObserver {
    fn on_event(&self, event: &RegistryEvent) {
        let service_event = match event {
            RegistryEvent::LoadStarted { .. } => return,
            RegistryEvent::LoadSucceeded { version, elapsed } => ServiceEvent::ModelLoad {
                version: version.to_string(),
                success: true,
                elapsed: *elapsed,
            },
            RegistryEvent::LoadFailed {
                version, elapsed, ..
            } => ServiceEvent::ModelLoad {
                version: version.to_string(),
                success: false,
                elapsed: *elapsed,
            },
            RegistryEvent::Evicted { version } => ServiceEvent::ModelEvicted {
                version: version.to_string(),
            },
            RegistryEvent::ActiveChanged { previous, current } => ServiceEvent::ActiveModelChanged {
                previous: previous.as_ref().map(ToString::to_string),
                current: current.to_string(),
            },
        };
        service_event.record();
    }
}

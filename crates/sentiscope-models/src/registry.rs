//! Model registry: one resident instance per version, one active version
//!
//! Each version owns a slot holding its [`ModelState`]. Loads are serialized
//! per slot by an async mutex, so concurrent callers for the same version
//! share one load. Callers that queued behind a failed attempt receive that
//! attempt's error; the next fresh call retries.
//!
//! The active model is published through an atomic pointer. Requests that
//! already hold the previous `Arc<LoadedModel>` finish on it undisturbed.

use crate::loader::ModelLoader;
use crate::model::{LoadedModel, ModelState};
use arc_swap::ArcSwapOption;
use parking_lot::Mutex;
use sentiscope_core::{Error, ModelVersion, Result};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Registry policy
#[derive(Debug, Clone, Default)]
pub struct RegistryConfig {
    /// Maximum number of ready versions kept in memory; `None` is unbounded.
    /// The active version is never evicted.
    pub max_resident: Option<usize>,
}

/// Lifecycle notifications for telemetry
#[derive(Debug, Clone)]
pub enum RegistryEvent {
    LoadStarted {
        version: ModelVersion,
    },
    LoadSucceeded {
        version: ModelVersion,
        elapsed: Duration,
    },
    LoadFailed {
        version: ModelVersion,
        error: String,
        elapsed: Duration,
    },
    Evicted {
        version: ModelVersion,
    },
    ActiveChanged {
        previous: Option<ModelVersion>,
        current: ModelVersion,
    },
}

/// Receives registry lifecycle events
pub trait RegistryObserver: Send + Sync {
    fn on_event(&self, event: &RegistryEvent);
}

/// Outcome of an eager preload
#[derive(Debug, Default)]
pub struct PreloadReport {
    pub loaded: Vec<ModelVersion>,
    pub failed: Vec<(ModelVersion, Error)>,
}

#[derive(Debug, Clone)]
enum Failure {
    Unknown,
    Load(String),
}

struct SlotInner {
    state: ModelState,
    /// Completed or abandoned load attempts
    attempts: u64,
    last_failure: Option<Failure>,
    last_used: u64,
}

struct Slot {
    load_lock: tokio::sync::Mutex<()>,
    inner: Mutex<SlotInner>,
}

impl Slot {
    fn new() -> Self {
        Self {
            load_lock: tokio::sync::Mutex::new(()),
            inner: Mutex::new(SlotInner {
                state: ModelState::Uninitialized,
                attempts: 0,
                last_failure: None,
                last_used: 0,
            }),
        }
    }
}

/// Marks a slot failed if a load future is dropped before it completes
struct LoadingGuard<'a> {
    slot: &'a Slot,
    armed: bool,
}

impl Drop for LoadingGuard<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let mut inner = self.slot.inner.lock();
        if matches!(inner.state, ModelState::Loading) {
            let reason = "load was cancelled".to_string();
            inner.state = ModelState::Failed(reason.clone());
            inner.last_failure = Some(Failure::Load(reason));
        }
    }
}

enum Publish {
    Swapped {
        model: Arc<LoadedModel>,
        previous: Option<ModelVersion>,
    },
    Declined(Arc<LoadedModel>),
}

/// Registry of loaded model versions
pub struct ModelRegistry {
    loader: Arc<dyn ModelLoader>,
    config: RegistryConfig,
    slots: Mutex<HashMap<ModelVersion, Arc<Slot>>>,
    active: ArcSwapOption<LoadedModel>,
    clock: AtomicU64,
    observer: Option<Arc<dyn RegistryObserver>>,
}

impl ModelRegistry {
    /// Create an empty registry
    pub fn new(loader: Arc<dyn ModelLoader>, config: RegistryConfig) -> Self {
        Self {
            loader,
            config,
            slots: Mutex::new(HashMap::new()),
            active: ArcSwapOption::empty(),
            clock: AtomicU64::new(1),
            observer: None,
        }
    }

    /// Attach a lifecycle observer
    pub fn with_observer(mut self, observer: Arc<dyn RegistryObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Registry policy
    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    /// Return the ready model for `version`, loading it if needed
    pub async fn get_or_load(&self, version: &ModelVersion) -> Result<Arc<LoadedModel>> {
        let slot = self.slot(version);

        let seen_attempts = {
            let mut guard = slot.inner.lock();
            let inner = &mut *guard;
            if let ModelState::Ready(model) = &inner.state {
                inner.last_used = self.tick();
                return Ok(Arc::clone(model));
            }
            inner.attempts
        };

        let _load = slot.load_lock.lock().await;

        {
            let mut guard = slot.inner.lock();
            let inner = &mut *guard;
            match &inner.state {
                ModelState::Ready(model) => {
                    inner.last_used = self.tick();
                    return Ok(Arc::clone(model));
                }
                ModelState::Failed(_) if inner.attempts > seen_attempts => {
                    debug!("Sharing failed load outcome for {}", version);
                    return Err(failure_error(version, inner.last_failure.as_ref()));
                }
                _ => {}
            }
            inner.state = ModelState::Loading;
        }

        let mut cancel_guard = LoadingGuard {
            slot: &slot,
            armed: true,
        };

        self.emit(RegistryEvent::LoadStarted {
            version: version.clone(),
        });
        info!("Loading model {}", version);

        let started = Instant::now();
        let outcome = self.loader.load(version).await;
        let elapsed = started.elapsed();
        cancel_guard.armed = false;

        match outcome {
            Ok(model) => {
                let model = {
                    let mut inner = slot.inner.lock();
                    inner.attempts += 1;
                    inner.last_failure = None;
                    inner.last_used = self.tick();
                    match &inner.state {
                        // Activation put the evicted instance back while we loaded.
                        ModelState::Ready(existing) => Arc::clone(existing),
                        _ => {
                            let model = Arc::new(model);
                            inner.state = ModelState::Ready(Arc::clone(&model));
                            model
                        }
                    }
                };

                info!("Model {} ready in {:?}", version, elapsed);
                self.emit(RegistryEvent::LoadSucceeded {
                    version: version.clone(),
                    elapsed,
                });

                self.enforce_capacity(version);
                Ok(model)
            }
            Err(err) => {
                let failure = match &err {
                    Error::UnknownVersion(_) => Failure::Unknown,
                    other => Failure::Load(other.to_string()),
                };

                let reinstated = {
                    let mut inner = slot.inner.lock();
                    inner.attempts += 1;
                    match &inner.state {
                        ModelState::Ready(existing) => Some(Arc::clone(existing)),
                        _ => {
                            inner.state = ModelState::Failed(err.to_string());
                            inner.last_failure = Some(failure.clone());
                            None
                        }
                    }
                };
                if let Some(model) = reinstated {
                    return Ok(model);
                }

                warn!("Failed to load model {}: {}", version, err);
                self.emit(RegistryEvent::LoadFailed {
                    version: version.clone(),
                    error: err.to_string(),
                    elapsed,
                });

                if matches!(failure, Failure::Unknown) {
                    self.forget(version, &slot);
                }

                Err(match err {
                    err @ (Error::UnknownVersion(_)
                    | Error::InvalidVersion(_)
                    | Error::ModelLoad { .. }) => err,
                    other => Error::model_load(version.as_str(), other.to_string()),
                })
            }
        }
    }

    /// Make `version` the default for requests that name none
    ///
    /// Returns once the new model is published; predictions that started
    /// earlier keep the model they already hold.
    pub async fn set_active(&self, version: &ModelVersion) -> Result<Arc<LoadedModel>> {
        let loaded = self.get_or_load(version).await?;
        match self.publish(&loaded, false) {
            Publish::Swapped { model, previous } => {
                self.announce(previous, version);
                Ok(model)
            }
            Publish::Declined(current) => Ok(current),
        }
    }

    /// Make `version` active only while no version is active
    ///
    /// Returns the model that is active afterwards. An activation that
    /// publishes while this load is running wins and is left in place.
    pub async fn set_active_if_unset(&self, version: &ModelVersion) -> Result<Arc<LoadedModel>> {
        if let Ok(current) = self.active() {
            return Ok(current);
        }

        let loaded = self.get_or_load(version).await?;
        match self.publish(&loaded, true) {
            Publish::Swapped { model, previous } => {
                self.announce(previous, version);
                Ok(model)
            }
            Publish::Declined(current) => {
                debug!(
                    "Not activating {}: {} was activated meanwhile",
                    version,
                    current.version()
                );
                Ok(current)
            }
        }
    }

    /// The active model
    pub fn active(&self) -> Result<Arc<LoadedModel>> {
        self.active
            .load_full()
            .ok_or_else(|| Error::not_ready("no active model version is loaded"))
    }

    /// The active version, if any
    pub fn active_version(&self) -> Option<ModelVersion> {
        self.active.load().as_ref().map(|m| m.version().clone())
    }

    /// The named version, or the active one when `version` is `None`
    pub async fn resolve(&self, version: Option<&ModelVersion>) -> Result<Arc<LoadedModel>> {
        match version {
            Some(version) => self.get_or_load(version).await,
            None => self.active(),
        }
    }

    /// Load every version concurrently; failures are collected, not fatal
    pub async fn preload(&self, versions: &[ModelVersion]) -> PreloadReport {
        let outcomes = futures::future::join_all(
            versions
                .iter()
                .map(|version| async move { (version.clone(), self.get_or_load(version).await) }),
        )
        .await;

        let mut report = PreloadReport::default();
        for (version, outcome) in outcomes {
            match outcome {
                Ok(_) => report.loaded.push(version),
                Err(e) => report.failed.push((version, e)),
            }
        }

        info!(
            "Preloaded {}/{} model version(s)",
            report.loaded.len(),
            versions.len()
        );
        report
    }

    /// Snapshot of one version's state
    pub fn state(&self, version: &ModelVersion) -> ModelState {
        let slot = self.slots.lock().get(version).cloned();
        match slot {
            Some(slot) => slot.inner.lock().state.clone(),
            None => ModelState::Uninitialized,
        }
    }

    /// Snapshot of every tracked version's state, sorted by version
    pub fn states(&self) -> Vec<(ModelVersion, ModelState)> {
        let mut states: Vec<_> = self
            .slots
            .lock()
            .iter()
            .map(|(version, slot)| (version.clone(), slot.inner.lock().state.clone()))
            .collect();
        states.sort_by(|a, b| a.0.cmp(&b.0));
        states
    }

    /// Versions currently resident and ready, sorted
    pub fn list_versions(&self) -> Vec<ModelVersion> {
        self.states()
            .into_iter()
            .filter(|(_, state)| state.is_ready())
            .map(|(version, _)| version)
            .collect()
    }

    /// Number of ready versions
    pub fn resident_count(&self) -> usize {
        self.slots
            .lock()
            .values()
            .filter(|slot| slot.inner.lock().state.is_ready())
            .count()
    }

    /// Drop a resident version. The active version cannot be evicted.
    pub fn evict(&self, version: &ModelVersion) -> bool {
        let slot = self.slots.lock().get(version).cloned();
        let evicted = match slot {
            Some(slot) => {
                let mut inner = slot.inner.lock();
                if inner.state.is_ready() && !self.is_active(version) {
                    inner.state = ModelState::Uninitialized;
                    true
                } else {
                    false
                }
            }
            None => false,
        };

        if evicted {
            info!("Evicted model {}", version);
            self.emit(RegistryEvent::Evicted {
                version: version.clone(),
            });
        }
        evicted
    }

    fn slot(&self, version: &ModelVersion) -> Arc<Slot> {
        let mut slots = self.slots.lock();
        Arc::clone(
            slots
                .entry(version.clone())
                .or_insert_with(|| Arc::new(Slot::new())),
        )
    }

    fn forget(&self, version: &ModelVersion, slot: &Arc<Slot>) {
        let mut slots = self.slots.lock();
        if slots.get(version).is_some_and(|current| Arc::ptr_eq(current, slot)) {
            slots.remove(version);
        }
    }

    /// Swap `model` in under its slot lock
    ///
    /// Eviction checks the active version under the same lock, so a slot is
    /// never cleared once its model is published. A slot cleared before the
    /// swap gets the model back; a slot reloaded meanwhile keeps its own
    /// instance, and that one is published instead.
    fn publish(&self, model: &Arc<LoadedModel>, only_if_unset: bool) -> Publish {
        let slot = self.slot(model.version());
        let mut inner = slot.inner.lock();

        let model = match &inner.state {
            ModelState::Ready(resident) => Arc::clone(resident),
            _ => Arc::clone(model),
        };

        let previous = if only_if_unset {
            let unset: Option<Arc<LoadedModel>> = None;
            let previous = arc_swap::Guard::into_inner(
                self.active.compare_and_swap(&unset, Some(Arc::clone(&model))),
            );
            if let Some(current) = previous {
                return Publish::Declined(current);
            }
            None
        } else {
            self.active.swap(Some(Arc::clone(&model)))
        };

        if !inner.state.is_ready() {
            inner.state = ModelState::Ready(Arc::clone(&model));
        }
        inner.last_used = self.tick();

        Publish::Swapped {
            model,
            previous: previous.map(|m| m.version().clone()),
        }
    }

    fn announce(&self, previous: Option<ModelVersion>, current: &ModelVersion) {
        if previous.as_ref() == Some(current) {
            return;
        }
        info!(
            "Active model switched: {} -> {}",
            previous.as_ref().map_or("none", |v| v.as_str()),
            current
        );
        self.emit(RegistryEvent::ActiveChanged {
            previous,
            current: current.clone(),
        });
    }

    fn is_active(&self, version: &ModelVersion) -> bool {
        self.active
            .load()
            .as_ref()
            .is_some_and(|m| m.version() == version)
    }

    /// Evict least recently used versions beyond capacity
    fn enforce_capacity(&self, keep: &ModelVersion) {
        let Some(capacity) = self.config.max_resident else {
            return;
        };

        let mut evicted = Vec::new();
        {
            let slots = self.slots.lock();
            let mut resident: Vec<(u64, &ModelVersion, &Arc<Slot>)> = slots
                .iter()
                .filter_map(|(version, slot)| {
                    let inner = slot.inner.lock();
                    inner
                        .state
                        .is_ready()
                        .then_some((inner.last_used, version, slot))
                })
                .collect();

            if resident.len() <= capacity {
                return;
            }

            let mut excess = resident.len() - capacity;
            resident.sort_by_key(|(last_used, _, _)| *last_used);

            for (_, version, slot) in resident {
                if excess == 0 {
                    break;
                }
                if version == keep {
                    continue;
                }
                // Checked under the slot lock so a concurrent publish is seen.
                let mut inner = slot.inner.lock();
                if inner.state.is_ready() && !self.is_active(version) {
                    inner.state = ModelState::Uninitialized;
                    evicted.push(version.clone());
                    excess -= 1;
                }
            }
        }

        for version in evicted {
            info!("Evicted least recently used model {}", version);
            self.emit(RegistryEvent::Evicted { version });
        }
    }

    fn tick(&self) -> u64 {
        self.clock.fetch_add(1, Ordering::Relaxed)
    }

    fn emit(&self, event: RegistryEvent) {
        if let Some(observer) = &self.observer {
            observer.on_event(&event);
        }
    }
}

fn failure_error(version: &ModelVersion, failure: Option<&Failure>) -> Error {
    match failure {
        Some(Failure::Unknown) => Error::UnknownVersion(version.to_string()),
        Some(Failure::Load(reason)) => Error::model_load(version.as_str(), reason.clone()),
        None => Error::model_load(version.as_str(), "previous load failed"),
    }
}

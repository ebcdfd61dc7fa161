//! Sentiscope Models
//!
//! Everything between a release feed and a prediction:
//!
//! - [`discovery`]: reads the release index and pairs each tag with its two artifacts
//! - [`fetcher`]: downloads artifacts once into a per-version cache directory
//! - [`artifact`]: the bag-of-words encoder and classifier formats
//! - [`registry`]: loads versions on demand, at most once each, and publishes the active one
//! - [`engine`]: tokenize, encode, classify
//!
//! Versions move through an explicit state machine
//! (`Uninitialized -> Loading -> Ready | Failed`, and `Failed -> Loading` on
//! the next request), so a failed load never wedges a version.

pub mod artifact;
pub mod discovery;
pub mod engine;
pub mod fetcher;
pub mod loader;
pub mod model;
pub mod registry;

pub use artifact::{ArtifactError, BagOfWordsEncoder, ClassifierArtifact, GaussianNb, LinearClassifier};
pub use discovery::{parse_releases, DiscoveryConfig, ReleaseCatalog, ReleaseDiscovery};
pub use engine::{Prediction, PredictionEngine};
pub use fetcher::{ArtifactFetcher, FetcherConfig};
pub use loader::{ArtifactModelLoader, ModelLoader};
pub use model::{ArtifactPaths, LoadedModel, ModelState};
pub use registry::{
    ModelRegistry, PreloadReport, RegistryConfig, RegistryEvent, RegistryObserver,
};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::engine::{Prediction, PredictionEngine};
    pub use crate::fetcher::ArtifactFetcher;
    pub use crate::loader::ModelLoader;
    pub use crate::model::{LoadedModel, ModelState};
    pub use crate::registry::{ModelRegistry, RegistryConfig};
}

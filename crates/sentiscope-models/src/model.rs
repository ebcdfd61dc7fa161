//! Loaded models and per-version lifecycle state

use crate::artifact::{ArtifactError, BagOfWordsEncoder, ClassifierArtifact};
use sentiscope_core::{Error, ModelVersion, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

/// Local locations of one version's two artifacts
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactPaths {
    pub encoder: PathBuf,
    pub classifier: PathBuf,
}

impl ArtifactPaths {
    /// Whether both files are present
    pub fn exist(&self) -> bool {
        self.encoder.is_file() && self.classifier.is_file()
    }

    /// Whether at least one file is present
    pub fn any_exist(&self) -> bool {
        self.encoder.is_file() || self.classifier.is_file()
    }
}

/// A version whose encoder and classifier are materialized and ready to serve
///
/// Instances only come out of a successful load, so holding one means the
/// model is ready. Encoder and classifier travel together: swapping the
/// active model swaps both at once.
#[derive(Debug)]
pub struct LoadedModel {
    version: ModelVersion,
    encoder: BagOfWordsEncoder,
    classifier: ClassifierArtifact,
    loaded_at: SystemTime,
}

impl LoadedModel {
    /// Pair an encoder with a classifier, checking their feature widths agree
    pub fn new(
        version: ModelVersion,
        encoder: BagOfWordsEncoder,
        classifier: ClassifierArtifact,
    ) -> std::result::Result<Self, ArtifactError> {
        let expected = classifier.n_features()?;
        if expected != encoder.width() {
            return Err(ArtifactError::WidthMismatch {
                encoder: encoder.width(),
                classifier: expected,
            });
        }

        Ok(Self {
            version,
            encoder,
            classifier,
            loaded_at: SystemTime::now(),
        })
    }

    /// Read both artifacts from disk
    ///
    /// Blocking; async callers should run this on the blocking pool.
    pub fn load(version: &ModelVersion, paths: &ArtifactPaths) -> Result<Self> {
        let build = || -> std::result::Result<Self, ArtifactError> {
            let encoder = BagOfWordsEncoder::from_file(&paths.encoder)?;
            let classifier = ClassifierArtifact::from_file(&paths.classifier)?;
            Self::new(version.clone(), encoder, classifier)
        };

        build().map_err(|e| Error::model_load(version.as_str(), e.to_string()))
    }

    /// Load from a version directory using the given file names
    pub fn load_dir(
        version: &ModelVersion,
        dir: &Path,
        encoder_file: &str,
        classifier_file: &str,
    ) -> Result<Self> {
        let paths = ArtifactPaths {
            encoder: dir.join(encoder_file),
            classifier: dir.join(classifier_file),
        };
        Self::load(version, &paths)
    }

    /// Version this model was built from
    pub fn version(&self) -> &ModelVersion {
        &self.version
    }

    /// The token encoder
    pub fn encoder(&self) -> &BagOfWordsEncoder {
        &self.encoder
    }

    /// The label classifier
    pub fn classifier(&self) -> &ClassifierArtifact {
        &self.classifier
    }

    /// When the model finished loading
    pub fn loaded_at(&self) -> SystemTime {
        self.loaded_at
    }
}

/// Lifecycle state of one version inside the registry
#[derive(Debug, Clone)]
pub enum ModelState {
    /// Never loaded, or evicted
    Uninitialized,
    /// A load is in flight
    Loading,
    /// Ready to serve
    Ready(Arc<LoadedModel>),
    /// The last load failed; the next request retries
    Failed(String),
}

impl ModelState {
    /// State name for status endpoints and logs
    pub fn name(&self) -> &'static str {
        match self {
            Self::Uninitialized => "uninitialized",
            Self::Loading => "loading",
            Self::Ready(_) => "ready",
            Self::Failed(_) => "failed",
        }
    }

    /// Whether the state holds a servable model
    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Ready(_))
    }

    /// The servable model, if any
    pub fn model(&self) -> Option<&Arc<LoadedModel>> {
        match self {
            Self::Ready(model) => Some(model),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(dir: &Path, name: &str, body: &str) {
        std::fs::write(dir.join(name), body).unwrap();
    }

    #[test]
    fn test_load_dir_reads_both_artifacts() {
        let dir = tempfile::tempdir().unwrap();
        write(
            dir.path(),
            "encoder.json",
            r#"{"kind":"bag_of_words","vocabulary":{"good":0,"bad":1}}"#,
        );
        write(
            dir.path(),
            "classifier.json",
            r#"{"kind":"linear","weights":[1.0,-1.0],"intercept":0.0}"#,
        );

        let version = ModelVersion::new("v1").unwrap();
        let model = LoadedModel::load_dir(&version, dir.path(), "encoder.json", "classifier.json")
            .unwrap();
        assert_eq!(model.version(), &version);
        assert_eq!(model.encoder().width(), 2);
        assert_eq!(model.classifier().kind(), "linear");
    }

    #[test]
    fn test_missing_file_is_model_load_error() {
        let dir = tempfile::tempdir().unwrap();
        let version = ModelVersion::new("v1").unwrap();
        let err = LoadedModel::load_dir(&version, dir.path(), "encoder.json", "classifier.json")
            .unwrap_err();
        assert!(matches!(err, Error::ModelLoad { .. }));
    }

    #[test]
    fn test_width_mismatch_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        write(
            dir.path(),
            "encoder.json",
            r#"{"kind":"bag_of_words","vocabulary":{"good":0,"bad":1}}"#,
        );
        write(
            dir.path(),
            "classifier.json",
            r#"{"kind":"linear","weights":[1.0],"intercept":0.0}"#,
        );

        let version = ModelVersion::new("v1").unwrap();
        let err = LoadedModel::load_dir(&version, dir.path(), "encoder.json", "classifier.json")
            .unwrap_err();
        match err {
            Error::ModelLoad { reason, .. } => assert!(reason.contains("width mismatch")),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_state_names() {
        assert_eq!(ModelState::Uninitialized.name(), "uninitialized");
        assert_eq!(ModelState::Failed("x".into()).name(), "failed");
        assert!(!ModelState::Loading.is_ready());
    }
}

//! Serialized encoder and classifier artifacts
//!
//! Both artifacts are JSON documents tagged by `kind`, published as release
//! assets next to each other. The encoder fixes the feature width; the
//! classifier must agree with it.

use sentiscope_core::Label;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use thiserror::Error;

/// Errors raised while reading or validating an artifact
#[derive(Debug, Error)]
pub enum ArtifactError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed artifact {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid artifact: {0}")]
    Invalid(String),

    #[error("feature width mismatch: encoder produces {encoder}, classifier expects {classifier}")]
    WidthMismatch { encoder: usize, classifier: usize },
}

fn read_json<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<T, ArtifactError> {
    let display = path.display().to_string();
    let bytes = std::fs::read(path).map_err(|source| ArtifactError::Read {
        path: display.clone(),
        source,
    })?;
    serde_json::from_slice(&bytes).map_err(|source| ArtifactError::Parse {
        path: display,
        source,
    })
}

/// On-disk encoder document
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum EncoderDocument {
    BagOfWords {
        vocabulary: HashMap<String, usize>,
        #[serde(default)]
        width: Option<usize>,
        #[serde(default)]
        binary: bool,
    },
}

/// Count vectorizer over a fixed vocabulary
#[derive(Debug, Clone)]
pub struct BagOfWordsEncoder {
    vocabulary: HashMap<String, usize>,
    width: usize,
    binary: bool,
}

impl BagOfWordsEncoder {
    /// Create an encoder whose width is one past the largest index
    pub fn new(vocabulary: HashMap<String, usize>, binary: bool) -> Self {
        let width = vocabulary.values().max().map_or(0, |max| max + 1);
        Self {
            vocabulary,
            width,
            binary,
        }
    }

    /// Parse an encoder from its JSON document
    pub fn from_json(json: &str) -> Result<Self, ArtifactError> {
        let doc: EncoderDocument = serde_json::from_str(json).map_err(|source| ArtifactError::Parse {
            path: "<inline>".to_string(),
            source,
        })?;
        Self::from_document(doc)
    }

    /// Read an encoder from disk
    pub fn from_file(path: &Path) -> Result<Self, ArtifactError> {
        Self::from_document(read_json(path)?)
    }

    fn from_document(doc: EncoderDocument) -> Result<Self, ArtifactError> {
        let EncoderDocument::BagOfWords {
            vocabulary,
            width,
            binary,
        } = doc;

        let mut encoder = Self::new(vocabulary, binary);
        if let Some(width) = width {
            if width < encoder.width {
                return Err(ArtifactError::Invalid(format!(
                    "declared width {} is smaller than vocabulary index {}",
                    width,
                    encoder.width - 1
                )));
            }
            encoder.width = width;
        }

        if encoder.width == 0 {
            return Err(ArtifactError::Invalid("encoder vocabulary is empty".to_string()));
        }

        Ok(encoder)
    }

    /// Number of features produced per document
    pub fn width(&self) -> usize {
        self.width
    }

    /// Number of known tokens
    pub fn vocabulary_len(&self) -> usize {
        self.vocabulary.len()
    }

    /// Encode tokens into a fixed-width count vector
    pub fn encode(&self, tokens: &[String]) -> Vec<f64> {
        let mut features = vec![0.0; self.width];
        for token in tokens {
            if let Some(&index) = self.vocabulary.get(token) {
                if self.binary {
                    features[index] = 1.0;
                } else {
                    features[index] += 1.0;
                }
            }
        }
        features
    }
}

/// Gaussian naive Bayes parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GaussianNb {
    pub classes: Vec<Label>,
    pub class_prior: Vec<f64>,
    /// Per-class feature means
    pub theta: Vec<Vec<f64>>,
    /// Per-class feature variances (smoothing already applied)
    pub var: Vec<Vec<f64>>,
}

impl GaussianNb {
    fn validate(&self) -> Result<usize, ArtifactError> {
        let n_classes = self.classes.len();
        if n_classes == 0 {
            return Err(ArtifactError::Invalid("gaussian_nb has no classes".to_string()));
        }
        if self.class_prior.len() != n_classes
            || self.theta.len() != n_classes
            || self.var.len() != n_classes
        {
            return Err(ArtifactError::Invalid(
                "gaussian_nb parameter rows do not match class count".to_string(),
            ));
        }

        let width = self.theta[0].len();
        for (means, vars) in self.theta.iter().zip(&self.var) {
            if means.len() != width || vars.len() != width {
                return Err(ArtifactError::Invalid(
                    "gaussian_nb rows have unequal widths".to_string(),
                ));
            }
            if means.iter().any(|m| !m.is_finite()) {
                return Err(ArtifactError::Invalid(
                    "gaussian_nb means must be finite".to_string(),
                ));
            }
            if vars.iter().any(|v| !(*v > 0.0) || !v.is_finite()) {
                return Err(ArtifactError::Invalid(
                    "gaussian_nb variances must be positive and finite".to_string(),
                ));
            }
        }
        if self.class_prior.iter().any(|p| !(*p > 0.0) || !p.is_finite()) {
            return Err(ArtifactError::Invalid(
                "gaussian_nb class priors must be positive and finite".to_string(),
            ));
        }

        Ok(width)
    }

    /// Argmax of the joint log likelihood; ties go to the earlier class
    fn predict(&self, x: &[f64]) -> Label {
        let mut best = (f64::NEG_INFINITY, self.classes[0]);

        for (i, class) in self.classes.iter().enumerate() {
            let mut log_likelihood = self.class_prior[i].ln();
            for ((xj, mean), var) in x.iter().zip(&self.theta[i]).zip(&self.var[i]) {
                log_likelihood -= 0.5 * (2.0 * std::f64::consts::PI * var).ln();
                log_likelihood -= 0.5 * (xj - mean).powi(2) / var;
            }
            if log_likelihood > best.0 {
                best = (log_likelihood, *class);
            }
        }

        best.1
    }
}

/// Binary linear decision function
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinearClassifier {
    pub weights: Vec<f64>,
    pub intercept: f64,
    #[serde(default = "default_linear_classes")]
    pub classes: [Label; 2],
}

fn default_linear_classes() -> [Label; 2] {
    [Label::Negative, Label::Positive]
}

impl LinearClassifier {
    fn predict(&self, x: &[f64]) -> Label {
        let score: f64 = self
            .weights
            .iter()
            .zip(x)
            .map(|(w, xi)| w * xi)
            .sum::<f64>()
            + self.intercept;

        if score > 0.0 {
            self.classes[1]
        } else {
            self.classes[0]
        }
    }
}

/// Classifier artifact, tagged by algorithm
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ClassifierArtifact {
    GaussianNb(GaussianNb),
    Linear(LinearClassifier),
}

impl ClassifierArtifact {
    /// Parse a classifier from its JSON document
    pub fn from_json(json: &str) -> Result<Self, ArtifactError> {
        let artifact: Self = serde_json::from_str(json).map_err(|source| ArtifactError::Parse {
            path: "<inline>".to_string(),
            source,
        })?;
        artifact.n_features()?;
        Ok(artifact)
    }

    /// Read a classifier from disk
    pub fn from_file(path: &Path) -> Result<Self, ArtifactError> {
        let artifact: Self = read_json(path)?;
        artifact.n_features()?;
        Ok(artifact)
    }

    /// Expected feature width, validating the parameters on the way
    pub fn n_features(&self) -> Result<usize, ArtifactError> {
        match self {
            Self::GaussianNb(nb) => nb.validate(),
            Self::Linear(linear) => {
                if linear.weights.iter().any(|w| !w.is_finite()) || !linear.intercept.is_finite() {
                    return Err(ArtifactError::Invalid(
                        "linear parameters must be finite".to_string(),
                    ));
                }
                Ok(linear.weights.len())
            }
        }
    }

    /// Algorithm name for logs
    pub fn kind(&self) -> &'static str {
        match self {
            Self::GaussianNb(_) => "gaussian_nb",
            Self::Linear(_) => "linear",
        }
    }

    /// Predict a label for an encoded feature vector
    pub fn predict(&self, features: &[f64]) -> Label {
        match self {
            Self::GaussianNb(nb) => nb.predict(features),
            Self::Linear(linear) => linear.predict(features),
        }
    }
}

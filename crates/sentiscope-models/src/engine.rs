//! Prediction engine: tokenize, encode, classify

use crate::model::{LoadedModel, ModelState};
use sentiscope_core::{Error, ModelVersion, PredictionResult, Result, ReviewTokenizer, Tokenizer};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// One prediction together with the version that produced it
#[derive(Debug, Clone)]
pub struct Prediction {
    /// Version of the model that served the request
    pub version: ModelVersion,

    /// Token counts and label
    pub result: PredictionResult,

    /// Time spent in tokenize, encode and classify
    pub elapsed: Duration,
}

/// Runs reviews through a loaded model
///
/// Stateless apart from the tokenizer; a single engine serves every version.
#[derive(Clone)]
pub struct PredictionEngine {
    tokenizer: Arc<dyn Tokenizer>,
}

impl PredictionEngine {
    /// Create an engine with a custom tokenizer
    pub fn new(tokenizer: Arc<dyn Tokenizer>) -> Self {
        Self { tokenizer }
    }

    /// Create an engine with the review tokenizer
    pub fn with_default() -> Result<Self> {
        Ok(Self::new(Arc::new(ReviewTokenizer::new()?)))
    }

    /// Classify `review` with `model`
    ///
    /// Empty and whitespace-only reviews are valid: they encode to the zero
    /// vector and the classifier still answers.
    pub fn predict(&self, model: &LoadedModel, review: &str) -> Prediction {
        let start = Instant::now();

        let tokens = self.tokenizer.tokenize(review);
        let features = model.encoder().encode(&tokens);
        let label = model.classifier().predict(&features);

        let encoded: f64 = features.iter().sum();

        Prediction {
            version: model.version().clone(),
            result: PredictionResult {
                raw_token_count: tokens.len(),
                encoded_token_count: encoded as u64,
                label,
            },
            elapsed: start.elapsed(),
        }
    }

    /// Classify against a registry state, refusing anything not ready
    pub fn predict_state(&self, state: &ModelState, review: &str) -> Result<Prediction> {
        match state {
            ModelState::Ready(model) => Ok(self.predict(model, review)),
            other => Err(Error::not_ready(format!("model is {}", other.name()))),
        }
    }
}

//! Sentiscope Core
//!
//! Core types, traits, and utilities shared across Sentiscope components.
//!
//! This crate provides:
//! - The service-wide error taxonomy and result alias
//! - Model version identifiers and release entries
//! - Prediction and feedback records
//! - The text tokenizer used ahead of encoding

pub mod error;
pub mod tokenize;
pub mod types;

pub use error::{Error, Result};
pub use tokenize::{ReviewTokenizer, Tokenizer};
pub use types::{FeedbackRecord, Label, ModelVersion, PredictionResult, ReleaseEntry};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::error::{Error, Result};
    pub use crate::tokenize::{ReviewTokenizer, Tokenizer};
    pub use crate::types::{FeedbackRecord, Label, ModelVersion, PredictionResult, ReleaseEntry};
}

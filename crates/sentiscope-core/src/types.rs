//! Core types for Sentiscope

use crate::error::Error;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of one published (encoder, classifier) artifact pair
///
/// Versions are used verbatim as a directory name in the artifact cache, so
/// construction rejects anything that could escape that directory.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ModelVersion(String);

impl ModelVersion {
    /// Maximum accepted identifier length in bytes
    pub const MAX_LEN: usize = 128;

    /// Validate and wrap a version identifier
    pub fn new(id: impl Into<String>) -> Result<Self, Error> {
        let id = id.into();

        if id.is_empty() || id.len() > Self::MAX_LEN || id == "." || id == ".." {
            return Err(Error::InvalidVersion(id));
        }

        if id
            .chars()
            .any(|c| c == '/' || c == '\\' || c == ':' || c.is_control())
        {
            return Err(Error::InvalidVersion(id));
        }

        Ok(Self(id))
    }

    /// Get the identifier as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ModelVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for ModelVersion {
    type Error = Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl std::str::FromStr for ModelVersion {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl From<ModelVersion> for String {
    fn from(version: ModelVersion) -> Self {
        version.0
    }
}

impl AsRef<str> for ModelVersion {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// One entry of the release index with its two artifact locations
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseEntry {
    /// Release tag
    pub version: ModelVersion,

    /// Download URL of the encoder (vectorizer) artifact
    pub encoder_url: String,

    /// Download URL of the classifier artifact
    pub classifier_url: String,

    /// Expected SHA-256 of the encoder, when the index publishes one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encoder_sha256: Option<String>,

    /// Expected SHA-256 of the classifier, when the index publishes one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub classifier_sha256: Option<String>,
}

impl ReleaseEntry {
    /// Create a release entry without digests
    pub fn new(
        version: ModelVersion,
        encoder_url: impl Into<String>,
        classifier_url: impl Into<String>,
    ) -> Self {
        Self {
            version,
            encoder_url: encoder_url.into(),
            classifier_url: classifier_url.into(),
            encoder_sha256: None,
            classifier_sha256: None,
        }
    }
}

/// Binary sentiment label
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub enum Label {
    Negative,
    Positive,
}

impl Label {
    /// Numeric class value used by artifacts and the HTTP API
    pub fn as_i64(self) -> i64 {
        match self {
            Self::Negative => 0,
            Self::Positive => 1,
        }
    }

    /// Lowercase name for logs and metric labels
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Negative => "negative",
            Self::Positive => "positive",
        }
    }
}

impl TryFrom<i64> for Label {
    type Error = Error;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Negative),
            1 => Ok(Self::Positive),
            other => Err(Error::internal(format!("label out of range: {other}"))),
        }
    }
}

impl From<Label> for i64 {
    fn from(label: Label) -> Self {
        label.as_i64()
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of a single prediction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PredictionResult {
    /// Number of tokens produced by the tokenizer
    pub raw_token_count: usize,

    /// Sum of the encoded feature vector (tokens recognized by the vocabulary)
    pub encoded_token_count: u64,

    /// Predicted label
    pub label: Label,
}

/// User feedback on a prediction, kept for retraining
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedbackRecord {
    /// The review text that was classified
    pub review: String,

    /// The label the service returned
    pub prediction: Label,

    /// Whether the user agreed with the label
    pub is_correct: bool,

    /// When the service accepted the record
    #[serde(default = "Utc::now")]
    pub received_at: DateTime<Utc>,
}

impl FeedbackRecord {
    /// Create a feedback record stamped with the current time
    pub fn new(review: impl Into<String>, prediction: Label, is_correct: bool) -> Self {
        Self {
            review: review.into(),
            prediction,
            is_correct,
            received_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_accepts_release_tags() {
        for tag in ["v1", "v0.2.1", "release-2024_05", "1.0.0+build.7"] {
            assert_eq!(ModelVersion::new(tag).unwrap().as_str(), tag);
        }
    }

    #[test]
    fn test_version_rejects_traversal() {
        for tag in ["", ".", "..", "../etc", "a/b", "a\\b", "c:", "v1\n", "x\0y"] {
            assert!(
                matches!(ModelVersion::new(tag), Err(Error::InvalidVersion(_))),
                "accepted {tag:?}"
            );
        }
        assert!(ModelVersion::new("v".repeat(200)).is_err());
    }

    #[test]
    fn test_version_serde_validates() {
        let ok: ModelVersion = serde_json::from_str("\"v3\"").unwrap();
        assert_eq!(ok.as_str(), "v3");
        assert!(serde_json::from_str::<ModelVersion>("\"../v3\"").is_err());
    }

    #[test]
    fn test_label_serializes_as_integer() {
        assert_eq!(serde_json::to_string(&Label::Positive).unwrap(), "1");
        assert_eq!(serde_json::from_str::<Label>("0").unwrap(), Label::Negative);
        assert!(serde_json::from_str::<Label>("-1").is_err());
    }

    #[test]
    fn test_feedback_timestamp_defaults() {
        let record: FeedbackRecord =
            serde_json::from_str(r#"{"review":"fine","prediction":1,"is_correct":false}"#).unwrap();
        assert_eq!(record.prediction, Label::Positive);
        assert!(!record.is_correct);
    }
}

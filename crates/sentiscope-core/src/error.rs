//! Error types for Sentiscope

/// Result type alias using Sentiscope's Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for Sentiscope operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Missing or invalid configuration (fatal at startup)
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Release index unreachable or answered with a non-success status
    #[error("release discovery unavailable: {0}")]
    DiscoveryUnavailable(String),

    /// Artifact download failed
    #[error("artifact unavailable at {url}: {reason}")]
    ArtifactUnavailable { url: String, reason: String },

    /// Artifact missing or failed to deserialize
    #[error("failed to load model {version}: {reason}")]
    ModelLoad { version: String, reason: String },

    /// Prediction attempted before a model was ready
    #[error("model not ready: {0}")]
    ModelNotReady(String),

    /// Requested version was neither discovered nor resident
    #[error("unknown model version: {0}")]
    UnknownVersion(String),

    /// Version identifier unusable as a storage path segment
    #[error("invalid model version {0:?}")]
    InvalidVersion(String),

    /// Filesystem errors
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization errors
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Generic internal errors
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a new configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    /// Create a new discovery error
    pub fn discovery(msg: impl Into<String>) -> Self {
        Self::DiscoveryUnavailable(msg.into())
    }

    /// Create a new artifact download error
    pub fn artifact(url: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ArtifactUnavailable {
            url: url.into(),
            reason: reason.into(),
        }
    }

    /// Create a new model load error
    pub fn model_load(version: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ModelLoad {
            version: version.into(),
            reason: reason.into(),
        }
    }

    /// Create a new not-ready error
    pub fn not_ready(msg: impl Into<String>) -> Self {
        Self::ModelNotReady(msg.into())
    }

    /// Create a new internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Whether a caller may reasonably retry the failed operation later
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::DiscoveryUnavailable(_)
                | Self::ArtifactUnavailable { .. }
                | Self::ModelLoad { .. }
                | Self::ModelNotReady(_)
                | Self::Io(_)
        )
    }

    /// Short machine-readable name, used for metric labels and error bodies
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Configuration(_) => "configuration",
            Self::DiscoveryUnavailable(_) => "discovery_unavailable",
            Self::ArtifactUnavailable { .. } => "artifact_unavailable",
            Self::ModelLoad { .. } => "model_load",
            Self::ModelNotReady(_) => "model_not_ready",
            Self::UnknownVersion(_) => "unknown_version",
            Self::InvalidVersion(_) => "invalid_version",
            Self::Io(_) => "io",
            Self::Serialization(_) => "serialization",
            Self::Internal(_) => "internal",
        }
    }
}

//! Metric events
//!
//! Every measurement the service takes goes through [`ServiceEvent::record`],
//! so the set of metrics and their labels lives in one `match`.

use sentiscope_core::Label;
use std::time::Duration;

pub const PREDICTIONS_TOTAL: &str = "sentiscope_predictions_total";
pub const PREDICTION_ERRORS_TOTAL: &str = "sentiscope_prediction_errors_total";
pub const PREDICTION_LATENCY_SECONDS: &str = "sentiscope_prediction_latency_seconds";
pub const RAW_TOKENS: &str = "sentiscope_raw_tokens";
pub const ENCODED_TOKENS: &str = "sentiscope_encoded_tokens";
pub const FEEDBACK_TOTAL: &str = "sentiscope_feedback_total";
pub const MODEL_LOADS_TOTAL: &str = "sentiscope_model_loads_total";
pub const MODEL_LOAD_SECONDS: &str = "sentiscope_model_load_seconds";
pub const MODEL_EVICTIONS_TOTAL: &str = "sentiscope_model_evictions_total";
pub const RESIDENT_MODELS: &str = "sentiscope_resident_models";
pub const ACTIVE_MODEL_INFO: &str = "sentiscope_active_model_info";
pub const DISCOVERY_TOTAL: &str = "sentiscope_discovery_total";
pub const KNOWN_RELEASES: &str = "sentiscope_known_releases";
pub const PROCESS_RESIDENT_MEMORY_BYTES: &str = "sentiscope_process_resident_memory_bytes";
pub const PROCESS_CPU_SECONDS_TOTAL: &str = "sentiscope_process_cpu_seconds_total";

/// Something worth counting
#[derive(Debug, Clone)]
pub enum ServiceEvent {
    /// A prediction was served
    Prediction {
        version: String,
        label: Label,
        raw_tokens: usize,
        encoded_tokens: u64,
        elapsed: Duration,
    },

    /// A prediction request failed; `kind` is the error kind
    PredictionFailed { kind: &'static str },

    /// A feedback record was accepted
    Feedback { is_correct: bool },

    /// A model load finished
    ModelLoad {
        version: String,
        success: bool,
        elapsed: Duration,
    },

    /// A resident model was dropped
    ModelEvicted { version: String },

    /// Number of ready versions changed
    ResidentModels(usize),

    /// The default version changed
    ActiveModelChanged {
        previous: Option<String>,
        current: String,
    },

    /// A release index query finished
    Discovery { success: bool, releases: usize },

    /// Process resource usage sample
    Process {
        resident_memory_bytes: Option<u64>,
        cpu_seconds: Option<f64>,
    },
}

impl ServiceEvent {
    /// Record the event against the installed recorder
    pub fn record(&self) {
        match self {
            Self::Prediction {
                version,
                label,
                raw_tokens,
                encoded_tokens,
                elapsed,
            } => {
                metrics::counter!(
                    PREDICTIONS_TOTAL,
                    "version" => version.clone(),
                    "label" => label.as_str()
                )
                .increment(1);
                metrics::histogram!(PREDICTION_LATENCY_SECONDS, "version" => version.clone())
                    .record(elapsed.as_secs_f64());
                metrics::histogram!(RAW_TOKENS).record(*raw_tokens as f64);
                metrics::histogram!(ENCODED_TOKENS).record(*encoded_tokens as f64);
            }
            Self::PredictionFailed { kind } => {
                metrics::counter!(PREDICTION_ERRORS_TOTAL, "kind" => *kind).increment(1);
            }
            Self::Feedback { is_correct } => {
                let correct = if *is_correct { "true" } else { "false" };
                metrics::counter!(FEEDBACK_TOTAL, "correct" => correct).increment(1);
            }
            Self::ModelLoad {
                version,
                success,
                elapsed,
            } => {
                let outcome = if *success { "success" } else { "failure" };
                metrics::counter!(MODEL_LOADS_TOTAL, "outcome" => outcome).increment(1);
                metrics::histogram!(MODEL_LOAD_SECONDS, "version" => version.clone())
                    .record(elapsed.as_secs_f64());
            }
            Self::ModelEvicted { version } => {
                metrics::counter!(MODEL_EVICTIONS_TOTAL, "version" => version.clone())
                    .increment(1);
            }
            Self::ResidentModels(count) => {
                metrics::gauge!(RESIDENT_MODELS).set(*count as f64);
            }
            Self::ActiveModelChanged { previous, current } => {
                if let Some(previous) = previous {
                    metrics::gauge!(ACTIVE_MODEL_INFO, "version" => previous.clone()).set(0.0);
                }
                metrics::gauge!(ACTIVE_MODEL_INFO, "version" => current.clone()).set(1.0);
            }
            Self::Discovery { success, releases } => {
                let outcome = if *success { "success" } else { "failure" };
                metrics::counter!(DISCOVERY_TOTAL, "outcome" => outcome).increment(1);
                if *success {
                    metrics::gauge!(KNOWN_RELEASES).set(*releases as f64);
                }
            }
            Self::Process {
                resident_memory_bytes,
                cpu_seconds,
            } => {
                if let Some(bytes) = resident_memory_bytes {
                    metrics::gauge!(PROCESS_RESIDENT_MEMORY_BYTES).set(*bytes as f64);
                }
                if let Some(seconds) = cpu_seconds {
                    metrics::gauge!(PROCESS_CPU_SECONDS_TOTAL).set(*seconds);
                }
            }
        }
    }
}

/// Register descriptions for every metric
pub fn describe_metrics() {
    use metrics::Unit;

    metrics::describe_counter!(PREDICTIONS_TOTAL, "Predictions served by version and label");
    metrics::describe_counter!(
        PREDICTION_ERRORS_TOTAL,
        "Failed prediction requests by error kind"
    );
    metrics::describe_histogram!(
        PREDICTION_LATENCY_SECONDS,
        Unit::Seconds,
        "Tokenize, encode and classify latency by version"
    );
    metrics::describe_histogram!(RAW_TOKENS, Unit::Count, "Tokens per review after normalization");
    metrics::describe_histogram!(
        ENCODED_TOKENS,
        Unit::Count,
        "Tokens per review recognized by the encoder vocabulary"
    );
    metrics::describe_counter!(FEEDBACK_TOTAL, "Feedback records accepted");
    metrics::describe_counter!(MODEL_LOADS_TOTAL, "Model loads by outcome");
    metrics::describe_histogram!(MODEL_LOAD_SECONDS, Unit::Seconds, "Model load duration");
    metrics::describe_counter!(MODEL_EVICTIONS_TOTAL, "Resident models evicted");
    metrics::describe_gauge!(RESIDENT_MODELS, "Model versions currently in memory");
    metrics::describe_gauge!(ACTIVE_MODEL_INFO, "1 for the active model version");
    metrics::describe_counter!(DISCOVERY_TOTAL, "Release index queries by outcome");
    metrics::describe_gauge!(KNOWN_RELEASES, "Releases in the last index listing");
    metrics::describe_gauge!(
        PROCESS_RESIDENT_MEMORY_BYTES,
        Unit::Bytes,
        "Resident set size of the process"
    );
    metrics::describe_gauge!(
        PROCESS_CPU_SECONDS_TOTAL,
        Unit::Seconds,
        "User and system CPU time consumed by the process"
    );
}

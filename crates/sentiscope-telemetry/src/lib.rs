//! Sentiscope Telemetry
//!
//! Metrics and feedback persistence for Sentiscope.
//!
//! Provides:
//! - A tagged event type mapped onto Prometheus counters, gauges and histograms
//! - Process resource gauges refreshed on scrape
//! - An append-only JSON-lines feedback log

pub mod events;
pub mod feedback;
pub mod process;

pub use events::{describe_metrics, ServiceEvent};
pub use feedback::{FeedbackConfig, FeedbackSink, JsonlFeedbackSink};
pub use process::ProcessSnapshot;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::events::ServiceEvent;
    pub use crate::feedback::{FeedbackSink, JsonlFeedbackSink};
}

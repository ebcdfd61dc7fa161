//! Sentiscope Server
//!
//! HTTP front end for the sentiment service: configuration, startup
//! orchestration, and the axum router. The binary in `main.rs` adds tracing,
//! the Prometheus recorder and signal handling.

pub mod cli;
pub mod config;
pub mod routes;
pub mod state;

pub use cli::Cli;
pub use config::{LoadMode, LogFormat, ServiceConfig};
pub use routes::{create_router, AppError};
pub use state::{AppState, MetricsObserver};

//! Sentiscope
//!
//! Sentiment inference service. Serves predictions from versioned
//! encoder/classifier pairs published as releases, switching the active
//! version without interrupting in-flight requests.

use anyhow::Result;
use clap::Parser;
use metrics_exporter_prometheus::PrometheusHandle;
use sentiscope_server::{create_router, AppState, Cli, LogFormat, ServiceConfig};
use sentiscope_telemetry::{FeedbackConfig, JsonlFeedbackSink};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = ServiceConfig::load(&cli)?;
    if cli.print_config {
        print!("{}", config.to_redacted_yaml()?);
        return Ok(());
    }

    init_tracing(cli.verbose, config.log_format);

    info!("Starting Sentiscope");
    info!("Release index: {}", config.releases_url);
    info!("Artifact cache: {:?}", config.cache_dir);
    info!("Load mode: {:?}", config.load_mode);

    let metrics_handle = init_metrics()?;

    let feedback = Arc::new(JsonlFeedbackSink::new(FeedbackConfig {
        path: config.feedback_path.clone(),
        ..Default::default()
    })?);

    let addr: SocketAddr = format!("{}:{}", config.listen, config.port).parse()?;

    let state = AppState::build(config, feedback.clone(), Some(metrics_handle))?;
    state.initialize().await?;
    info!("Application state initialized");

    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            shutdown_signal().await;
            warn!("Shutdown signal received, stopping server...");
        })
        .await?;

    feedback.shutdown().await;
    info!("Server shutdown complete");
    Ok(())
}

/// Listen for shutdown signals (SIGTERM, SIGINT)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

/// Initialize tracing/logging
fn init_tracing(verbose: bool, format: LogFormat) {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = if verbose {
        EnvFilter::new("sentiscope=debug,tower_http=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("sentiscope=info"))
    };

    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).init(),
        LogFormat::Text => registry.with(tracing_subscriber::fmt::layer()).init(),
    }
}

/// Initialize metrics exporter and return handle for rendering
fn init_metrics() -> Result<PrometheusHandle> {
    use metrics_exporter_prometheus::PrometheusBuilder;

    let handle = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| anyhow::anyhow!("Failed to install metrics: {}", e))?;

    sentiscope_telemetry::describe_metrics();

    info!("Metrics exporter initialized");
    Ok(handle)
}

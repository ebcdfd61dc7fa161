use crate::config::LoadMode;
use clap::Parser;
use std::path::PathBuf;

/// Command line arguments. Anything given here overrides the config file and
/// `SENTISCOPE__*` environment variables.
#[derive(Parser, Debug, Clone)]
#[command(name = "sentiscope")]
#[command(author, version, about = "Sentiment inference service with versioned models")]
pub struct Cli {
    /// Configuration file path (missing file is fine)
    #[arg(short, long, default_value = "config.yaml", env = "SENTISCOPE_CONFIG")]
    pub config: String,

    /// Listen address
    #[arg(short = 'l', long)]
    pub listen: Option<String>,

    /// Listen port
    #[arg(short = 'P', long)]
    pub port: Option<u16>,

    /// Release index URL
    #[arg(long)]
    pub releases_url: Option<String>,

    /// Token for the release index
    #[arg(long, env = "GITHUB_TOKEN", hide_env_values = true)]
    pub github_token: Option<String>,

    /// Artifact cache directory
    #[arg(long)]
    pub cache_dir: Option<PathBuf>,

    /// Load every release at startup instead of on first use
    #[arg(long, value_enum)]
    pub load_mode: Option<LoadMode>,

    /// Version to activate instead of the latest release
    #[arg(long)]
    pub default_version: Option<String>,

    /// Maximum number of versions kept in memory
    #[arg(long)]
    pub max_resident: Option<usize>,

    /// Feedback log file
    #[arg(long)]
    pub feedback_path: Option<PathBuf>,

    /// Emit logs as JSON
    #[arg(long)]
    pub json_logs: bool,

    /// Print the effective configuration as YAML and exit
    #[arg(long)]
    pub print_config: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,
}

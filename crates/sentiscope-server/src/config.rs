//! Service configuration
//!
//! Sources, lowest precedence first: built-in defaults, the YAML file,
//! `SENTISCOPE__*` environment variables, command line flags.

use crate::cli::Cli;
use sentiscope_core::{Error, ModelVersion, Result};
use sentiscope_models::fetcher::default_cache_dir;
use sentiscope_models::{DiscoveryConfig, FetcherConfig, RegistryConfig};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// When model versions are loaded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum LoadMode {
    /// On first request
    #[default]
    Lazy,
    /// Every release at startup
    Eager,
}

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Listen address
    pub listen: String,

    /// Listen port
    pub port: u16,

    /// Release index endpoint
    pub releases_url: String,

    /// Token for the release index
    #[serde(default)]
    pub github_token: Option<String>,

    /// Refuse to query the index without a token
    #[serde(default)]
    pub token_required: bool,

    /// Root of the per-version artifact cache
    pub cache_dir: PathBuf,

    /// Encoder file name inside a version directory
    pub encoder_file: String,

    /// Classifier file name inside a version directory
    pub classifier_file: String,

    /// Upper bound on one artifact download
    pub download_timeout_secs: u64,

    /// Upper bound on one index query
    pub discovery_timeout_secs: u64,

    /// Lazy or eager loading
    #[serde(default)]
    pub load_mode: LoadMode,

    /// Version to activate instead of the latest release
    #[serde(default)]
    pub default_version: Option<String>,

    /// Maximum number of versions kept in memory
    #[serde(default)]
    pub max_resident: Option<usize>,

    /// Feedback log file
    pub feedback_path: PathBuf,

    /// Log output format
    #[serde(default)]
    pub log_format: LogFormat,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        let fetcher = FetcherConfig::default();
        let discovery = DiscoveryConfig::default();

        Self {
            listen: "0.0.0.0".to_string(),
            port: 8080,
            releases_url: discovery.releases_url,
            github_token: None,
            token_required: false,
            cache_dir: default_cache_dir(),
            encoder_file: fetcher.encoder_file,
            classifier_file: fetcher.classifier_file,
            download_timeout_secs: fetcher.timeout.as_secs(),
            discovery_timeout_secs: discovery.timeout.as_secs(),
            load_mode: LoadMode::Lazy,
            default_version: None,
            max_resident: None,
            feedback_path: PathBuf::from("./feedback/feedback.jsonl"),
            log_format: LogFormat::Text,
        }
    }
}

impl ServiceConfig {
    /// Load configuration from all sources and validate it
    pub fn load(cli: &Cli) -> Result<Self> {
        let defaults = config::Config::try_from(&Self::default()).map_err(config_error)?;

        let layered = config::Config::builder()
            .add_source(defaults)
            .add_source(config::File::with_name(&cli.config).required(false))
            .add_source(
                config::Environment::with_prefix("SENTISCOPE")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(config_error)?;

        let mut config: Self = layered.try_deserialize().map_err(config_error)?;
        config.apply_cli(cli);
        config.validate()?;
        Ok(config)
    }

    fn apply_cli(&mut self, cli: &Cli) {
        if let Some(listen) = &cli.listen {
            self.listen = listen.clone();
        }
        if let Some(port) = cli.port {
            self.port = port;
        }
        if let Some(url) = &cli.releases_url {
            self.releases_url = url.clone();
        }
        if let Some(token) = &cli.github_token {
            self.github_token = Some(token.clone());
        }
        if let Some(dir) = &cli.cache_dir {
            self.cache_dir = dir.clone();
        }
        if let Some(mode) = cli.load_mode {
            self.load_mode = mode;
        }
        if let Some(version) = &cli.default_version {
            self.default_version = Some(version.clone());
        }
        if let Some(max) = cli.max_resident {
            self.max_resident = Some(max);
        }
        if let Some(path) = &cli.feedback_path {
            self.feedback_path = path.clone();
        }
        if cli.json_logs {
            self.log_format = LogFormat::Json;
        }
    }

    /// Reject configurations the service cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.port == 0 {
            return Err(Error::config("port must be non-zero"));
        }
        if self.releases_url.trim().is_empty() {
            return Err(Error::config("releases_url must not be empty"));
        }
        if self.download_timeout_secs == 0 || self.discovery_timeout_secs == 0 {
            return Err(Error::config("timeouts must be positive"));
        }
        if self.max_resident == Some(0) {
            return Err(Error::config("max_resident must be at least 1"));
        }
        for (key, name) in [
            ("encoder_file", &self.encoder_file),
            ("classifier_file", &self.classifier_file),
        ] {
            if name.is_empty() || name.contains(['/', '\\']) || name == "." || name == ".." {
                return Err(Error::config(format!("{} must be a plain file name", key)));
            }
        }
        if self.encoder_file == self.classifier_file {
            return Err(Error::config("encoder_file and classifier_file must differ"));
        }
        if let Some(version) = &self.default_version {
            ModelVersion::new(version.as_str())
                .map_err(|_| Error::config(format!("default_version {:?} is not usable", version)))?;
        }
        if self.token_required && self.github_token.as_deref().map_or(true, str::is_empty) {
            return Err(Error::config(
                "token_required is set but no github_token is configured",
            ));
        }
        Ok(())
    }

    /// The configured default version, if any
    pub fn default_version(&self) -> Result<Option<ModelVersion>> {
        self.default_version
            .as_deref()
            .map(ModelVersion::new)
            .transpose()
    }

    /// Artifact cache settings
    pub fn fetcher_config(&self) -> FetcherConfig {
        FetcherConfig {
            cache_dir: self.cache_dir.clone(),
            encoder_file: self.encoder_file.clone(),
            classifier_file: self.classifier_file.clone(),
            timeout: Duration::from_secs(self.download_timeout_secs),
        }
    }

    /// Release index settings
    pub fn discovery_config(&self) -> DiscoveryConfig {
        DiscoveryConfig {
            releases_url: self.releases_url.clone(),
            token: self.github_token.clone(),
            token_required: self.token_required,
            timeout: Duration::from_secs(self.discovery_timeout_secs),
        }
    }

    /// Registry policy
    pub fn registry_config(&self) -> RegistryConfig {
        RegistryConfig {
            max_resident: self.max_resident,
        }
    }

    /// YAML rendering with the token masked
    pub fn to_redacted_yaml(&self) -> Result<String> {
        let mut redacted = self.clone();
        if redacted.github_token.is_some() {
            redacted.github_token = Some("***".to_string());
        }
        serde_yaml::to_string(&redacted).map_err(|e| Error::internal(e.to_string()))
    }
}

fn config_error(err: config::ConfigError) -> Error {
    Error::config(err.to_string())
}

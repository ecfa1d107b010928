//! Configuration loading and config file resolution
//!
//! Bootstrap configuration lives in a single TOML file. Every field has a
//! built-in default, so a missing file is a warning, not a startup failure.
//!
//! # Config file priority
//!
//! 1. Command-line argument (highest priority)
//! 2. Environment variable (`RVP_CONFIG`)
//! 3. Platform config directory (`<config_dir>/rvp/rvp-ingest.toml`)
//! 4. Built-in defaults (no file)

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Environment variable naming an explicit config file
pub const CONFIG_ENV_VAR: &str = "RVP_CONFIG";

/// File name looked up inside the platform config directory
pub const CONFIG_FILE_NAME: &str = "rvp-ingest.toml";

/// Bootstrap configuration loaded from TOML file
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct TomlConfig {
    /// HTTP control plane port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Number of concurrent fetch workers
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Delay inserted before every fetch attempt (milliseconds)
    #[serde(default = "default_delay_per_call_ms")]
    pub delay_per_call_ms: u64,

    /// Highest page identifier a run may claim
    #[serde(default = "default_max_pages")]
    pub max_pages: u64,

    /// Bridge timeout for one page fetch (milliseconds)
    #[serde(default = "default_fetch_timeout_ms")]
    pub fetch_timeout_ms: u64,

    /// Bridge timeout for scoring one page (milliseconds)
    #[serde(default = "default_score_timeout_ms")]
    pub score_timeout_ms: u64,

    /// Spawn a replacement when a worker exits on a failed page
    #[serde(default = "default_replace_failed_workers")]
    pub replace_failed_workers: bool,

    /// EventBus channel capacity
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,

    /// Time window used when a start request does not name one
    #[serde(default = "default_duration_days")]
    pub default_duration_days: u32,

    /// Initial chart layout: one merged chart instead of three
    #[serde(default = "default_merge_charts")]
    pub merge_charts: bool,

    /// Remote page source
    #[serde(default)]
    pub source: SourceConfig,

    /// Scorer settings
    #[serde(default)]
    pub scorer: ScorerConfig,

    /// Logging configuration (optional)
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Remote page source settings
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct SourceConfig {
    /// URL with a `{page}` placeholder
    #[serde(default = "default_url_template")]
    pub url_template: String,
}

/// Scorer settings
#[derive(Debug, Clone, PartialEq, Default, Deserialize, Serialize)]
pub struct ScorerConfig {
    /// Optional TOML lexicon (`[words]` table); built-in lexicon when absent
    #[serde(default)]
    pub lexicon_path: Option<PathBuf>,
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_port() -> u16 {
    5730
}

fn default_concurrency() -> usize {
    2
}

fn default_delay_per_call_ms() -> u64 {
    1500
}

fn default_max_pages() -> u64 {
    1000
}

fn default_fetch_timeout_ms() -> u64 {
    30_000
}

fn default_score_timeout_ms() -> u64 {
    60_000
}

fn default_replace_failed_workers() -> bool {
    true
}

fn default_event_capacity() -> usize {
    100
}

fn default_duration_days() -> u32 {
    90
}

fn default_merge_charts() -> bool {
    true
}

fn default_url_template() -> String {
    "http://127.0.0.1:8080/reviews?page={page}".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for TomlConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            concurrency: default_concurrency(),
            delay_per_call_ms: default_delay_per_call_ms(),
            max_pages: default_max_pages(),
            fetch_timeout_ms: default_fetch_timeout_ms(),
            score_timeout_ms: default_score_timeout_ms(),
            replace_failed_workers: default_replace_failed_workers(),
            event_capacity: default_event_capacity(),
            default_duration_days: default_duration_days(),
            merge_charts: default_merge_charts(),
            source: SourceConfig::default(),
            scorer: ScorerConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            url_template: default_url_template(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl TomlConfig {
    /// Resolve the config file and load it, falling back to defaults
    ///
    /// An explicitly named file (CLI or environment) that cannot be read is an
    /// error. A missing file in the platform config directory is not.
    pub fn load(cli_arg: Option<&Path>) -> Result<(Self, Option<PathBuf>)> {
        match resolve_config_path(cli_arg, CONFIG_ENV_VAR) {
            Some(ConfigSource::Explicit(path)) => {
                let config = load_toml_config(&path)?;
                info!("Loaded configuration from {}", path.display());
                Ok((config, Some(path)))
            }
            Some(ConfigSource::Discovered(path)) => match load_toml_config(&path) {
                Ok(config) => {
                    info!("Loaded configuration from {}", path.display());
                    Ok((config, Some(path)))
                }
                Err(e) => {
                    warn!("Ignoring unreadable config {}: {}", path.display(), e);
                    Ok((Self::default(), None))
                }
            },
            None => {
                info!("No config file found, using built-in defaults");
                Ok((Self::default(), None))
            }
        }
    }

    /// Check values that would make the pipeline unusable
    pub fn validate(&self) -> Result<()> {
        if self.concurrency == 0 {
            return Err(Error::Config("concurrency must be at least 1".to_string()));
        }
        if self.max_pages == 0 {
            return Err(Error::Config("max_pages must be at least 1".to_string()));
        }
        if !self.source.url_template.contains("{page}") {
            return Err(Error::Config(format!(
                "source.url_template must contain {{page}}: {}",
                self.source.url_template
            )));
        }
        Ok(())
    }
}

/// Where a config path came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    /// Named by CLI argument or environment variable
    Explicit(PathBuf),
    /// Found in the platform config directory
    Discovered(PathBuf),
}

/// Config file resolution following the module-level priority order
pub fn resolve_config_path(cli_arg: Option<&Path>, env_var_name: &str) -> Option<ConfigSource> {
    // Priority 1: Command-line argument
    if let Some(path) = cli_arg {
        return Some(ConfigSource::Explicit(path.to_path_buf()));
    }

    // Priority 2: Environment variable
    if let Ok(path) = std::env::var(env_var_name) {
        if !path.trim().is_empty() {
            return Some(ConfigSource::Explicit(PathBuf::from(path)));
        }
    }

    // Priority 3: Platform config directory
    default_config_path()
        .filter(|p| p.exists())
        .map(ConfigSource::Discovered)
}

/// Platform config file location, if the platform has a config directory
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("rvp").join(CONFIG_FILE_NAME))
}

/// Read and parse one TOML config file
pub fn load_toml_config(path: &Path) -> Result<TomlConfig> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("Read {} failed: {}", path.display(), e)))?;
    toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Parse {} failed: {}", path.display(), e)))
}

//! Configuration loading and resolution
//!
//! Settings are resolved in priority order:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable
//! 3. TOML config file
//! 4. Compiled default (fallback)
//!
//! A missing TOML file is not an error: a warning is logged and compiled
//! defaults are used. A TOML file that exists but does not parse is.

use crate::model::GAMEPLAY_FORM;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

/// Default chart server endpoint
pub const DEFAULT_SERVER_URL: &str = "http://localhost:14324";

/// Default per-request timeout in seconds
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 10;

/// Environment variable overriding the server endpoint
pub const SERVER_URL_ENV: &str = "CHARTSYNC_SERVER_URL";

/// Environment variable overriding the config file location
pub const CONFIG_PATH_ENV: &str = "CHARTSYNC_CONFIG";

const APP_DIR: &str = "chartsync";
const PROJECTS_FILE_NAME: &str = "editor_data.json";

/// Bootstrap configuration loaded from TOML file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TomlConfig {
    /// JSON-RPC endpoint of the chart server
    #[serde(default = "default_server_url")]
    pub server_url: String,

    /// Per-request timeout in seconds
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Staff form whose periods are run through the filter chain
    #[serde(default = "default_gameplay_form")]
    pub gameplay_form: String,

    /// Recent projects file (optional, platform data dir if not specified)
    #[serde(default)]
    pub projects_file: Option<PathBuf>,

    /// Logging configuration (optional)
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for TomlConfig {
    fn default() -> Self {
        Self {
            server_url: default_server_url(),
            request_timeout_secs: default_request_timeout_secs(),
            gameplay_form: default_gameplay_form(),
            projects_file: None,
            logging: LoggingConfig::default(),
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

fn default_server_url() -> String {
    DEFAULT_SERVER_URL.to_string()
}

fn default_request_timeout_secs() -> u64 {
    DEFAULT_REQUEST_TIMEOUT_SECS
}

fn default_gameplay_form() -> String {
    GAMEPLAY_FORM.to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Values supplied on the command line
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub config_path: Option<PathBuf>,
    pub server_url: Option<String>,
    pub request_timeout_secs: Option<u64>,
}

/// Fully resolved settings used to wire the client
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedConfig {
    pub server_url: String,
    pub request_timeout: Duration,
    pub gameplay_form: String,
    pub projects_file: PathBuf,
    pub log_level: String,
}

/// Platform config file location (`<config_dir>/chartsync/config.toml`)
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join(APP_DIR).join("config.toml"))
}

/// Platform location of the recent projects file
pub fn default_projects_file() -> PathBuf {
    dirs::data_dir()
        .map(|d| d.join(APP_DIR))
        .unwrap_or_else(|| PathBuf::from("./chartsync_data"))
        .join(PROJECTS_FILE_NAME)
}

/// Read and parse a TOML config file
pub fn load_toml_config(path: &Path) -> Result<TomlConfig> {
    let content = std::fs::read_to_string(path)?;
    toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Parse TOML failed ({}): {}", path.display(), e)))
}

/// Load the TOML config if it exists, otherwise fall back to defaults
pub fn load_or_default(path: Option<&Path>) -> Result<TomlConfig> {
    match path {
        Some(path) if path.exists() => {
            let config = load_toml_config(path)?;
            info!("Loaded configuration from {}", path.display());
            Ok(config)
        }
        Some(path) => {
            warn!(
                "Config file not found at {}, using compiled defaults",
                path.display()
            );
            Ok(TomlConfig::default())
        }
        None => {
            warn!("Could not determine config directory, using compiled defaults");
            Ok(TomlConfig::default())
        }
    }
}

/// Write a TOML config file, creating its parent directory
pub fn write_toml_config(config: &TomlConfig, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let content = toml::to_string_pretty(config)
        .map_err(|e| Error::Config(format!("Serialize TOML failed: {}", e)))?;
    std::fs::write(path, content)?;
    Ok(())
}

/// Resolve every setting from CLI → ENV → TOML → defaults
pub fn resolve(overrides: &ConfigOverrides) -> Result<ResolvedConfig> {
    let config_path = overrides
        .config_path
        .clone()
        .or_else(|| non_empty_env(CONFIG_PATH_ENV).map(PathBuf::from))
        .or_else(default_config_path);

    let toml_config = load_or_default(config_path.as_deref())?;

    let server_url = overrides
        .server_url
        .clone()
        .or_else(|| non_empty_env(SERVER_URL_ENV))
        .unwrap_or(toml_config.server_url);
    validate_server_url(&server_url)?;

    let timeout_secs = overrides
        .request_timeout_secs
        .unwrap_or(toml_config.request_timeout_secs);
    if timeout_secs == 0 {
        return Err(Error::Config(
            "request timeout must be at least 1 second".to_string(),
        ));
    }

    if toml_config.gameplay_form.trim().is_empty() {
        return Err(Error::Config("gameplay_form must not be empty".to_string()));
    }

    Ok(ResolvedConfig {
        server_url,
        request_timeout: Duration::from_secs(timeout_secs),
        gameplay_form: toml_config.gameplay_form,
        projects_file: toml_config
            .projects_file
            .unwrap_or_else(default_projects_file),
        log_level: toml_config.logging.level,
    })
}

fn non_empty_env(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn validate_server_url(url: &str) -> Result<()> {
    if url.starts_with("http://") || url.starts_with("https://") {
        Ok(())
    } else {
        Err(Error::Config(format!(
            "server URL must start with http:// or https://, got '{}'",
            url
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = TomlConfig::default();
        assert_eq!(config.server_url, "http://localhost:14324");
        assert_eq!(config.request_timeout_secs, 10);
        assert_eq!(config.gameplay_form, "Dremu");
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_partial_toml_fills_defaults() {
        let config: TomlConfig = toml::from_str("request_timeout_secs = 3\n").unwrap();
        assert_eq!(config.request_timeout_secs, 3);
        assert_eq!(config.server_url, DEFAULT_SERVER_URL);
        assert!(config.projects_file.is_none());
    }

    #[test]
    fn test_server_url_validation() {
        assert!(validate_server_url("http://localhost:14324").is_ok());
        assert!(validate_server_url("https://charts.example").is_ok());
        assert!(matches!(
            validate_server_url("localhost:14324"),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_default_projects_file_name() {
        let path = default_projects_file();
        assert!(path.ends_with("editor_data.json"));
    }
}

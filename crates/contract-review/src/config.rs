//! Configuration management for contract-review.
//!
//! This module provides configuration loading and validation using figment,
//! supporting TOML config files, environment variables, and defaults.

use std::path::PathBuf;
use std::time::Duration;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::convert::DocumentKind;
use crate::error::{Error, Result};
use crate::logging::Verbosity;

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "config.toml";

/// Default data directory name.
const DATA_DIR_NAME: &str = "contract-review";

/// Default database file name.
const DATABASE_FILE_NAME: &str = "contracts.db";

/// Default directory for uploaded contract files, under the data dir.
const UPLOAD_DIR_NAME: &str = "contracts";

/// Prefix for environment overrides, e.g. `CONTRACT_REVIEW_SERVER__PORT`.
const ENV_PREFIX: &str = "CONTRACT_REVIEW_";

/// Application configuration.
///
/// Configuration is loaded from (in order of precedence, highest first):
/// 1. Environment variables (prefixed with `CONTRACT_REVIEW_`, sections split by `__`)
/// 2. TOML config file at `~/.config/contract-review/config.toml`
/// 3. Default values
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// HTTP server configuration.
    pub server: ServerConfig,
    /// Storage configuration.
    pub storage: StorageConfig,
    /// Upload configuration.
    pub upload: UploadConfig,
    /// Conversion backend configuration.
    pub converter: ConverterConfig,
    /// Logging configuration.
    pub logging: LoggingConfig,
}

/// HTTP server configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address to bind.
    pub host: String,
    /// Port to bind.
    pub port: u16,
    /// Deployment environment. `development` exposes error details in responses.
    pub env: String,
}

/// Storage-related configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Path to the database file.
    /// Defaults to `~/.local/share/contract-review/contracts.db`
    pub database_path: Option<PathBuf>,
}

/// Upload-related configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UploadConfig {
    /// Directory uploaded files are written to.
    /// Defaults to `~/.local/share/contract-review/contracts`
    pub dir: Option<PathBuf>,
    /// Maximum accepted file size in bytes.
    pub max_file_size: usize,
    /// Accepted file extensions, lowercase with a leading dot.
    pub allowed_extensions: Vec<String>,
    /// Maximum file name length in bytes.
    pub max_file_name_len: usize,
}

/// Conversion backend configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConverterConfig {
    /// Base URL of the Word/PDF to Markdown backend. Unset disables remote conversion.
    pub backend_url: Option<String>,
    /// Request timeout in seconds.
    pub timeout_secs: u64,
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default log level when no `-v`/`-q` flag is given.
    pub level: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            env: "development".to_string(),
        }
    }
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            dir: None,
            max_file_size: 10 * 1024 * 1024,
            allowed_extensions: vec![".docx".to_string(), ".pdf".to_string(), ".txt".to_string()],
            max_file_name_len: 255,
        }
    }
}

impl Default for ConverterConfig {
    fn default() -> Self {
        Self {
            backend_url: None,
            timeout_secs: 60,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from all sources.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration loading or parsing fails.
    pub fn load() -> Result<Self> {
        Self::load_from(None)
    }

    /// Load configuration with an optional custom config path.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration loading or parsing fails.
    pub fn load_from(config_path: Option<PathBuf>) -> Result<Self> {
        let config_file = config_path.unwrap_or_else(Self::default_config_path);

        let figment = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file(&config_file))
            .merge(Env::prefixed(ENV_PREFIX).split("__"));

        let config: Config = figment.extract()?;
        config.validate()?;
        Ok(config)
    }

    /// Get the default configuration file path.
    #[must_use]
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from(".config"))
            .join(DATA_DIR_NAME)
            .join(CONFIG_FILE_NAME)
    }

    /// Get the default data directory path.
    #[must_use]
    pub fn default_data_dir() -> PathBuf {
        dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from(".local/share"))
            .join(DATA_DIR_NAME)
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if any configuration values are invalid.
    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            return Err(invalid("server.port must be greater than 0"));
        }

        if self.upload.max_file_size == 0 {
            return Err(invalid("upload.max_file_size must be greater than 0"));
        }

        if self.upload.max_file_name_len == 0 {
            return Err(invalid("upload.max_file_name_len must be greater than 0"));
        }

        if self.upload.allowed_extensions.is_empty() {
            return Err(invalid("upload.allowed_extensions must not be empty"));
        }

        for ext in &self.upload.allowed_extensions {
            if !ext.starts_with('.') || ext.len() < 2 {
                return Err(invalid(format!(
                    "upload extension must start with a dot: {ext}"
                )));
            }
            if DocumentKind::from_extension(ext).is_none() {
                return Err(invalid(format!(
                    "no converter handles upload extension {ext}"
                )));
            }
        }

        if let Some(url) = &self.converter.backend_url {
            if reqwest::Url::parse(url).is_err() {
                return Err(invalid(format!("invalid converter.backend_url: {url}")));
            }
        }

        if self.converter.timeout_secs == 0 {
            return Err(invalid("converter.timeout_secs must be greater than 0"));
        }

        if Verbosity::from_level_name(&self.logging.level).is_none() {
            return Err(invalid(format!(
                "unknown logging.level: {}",
                self.logging.level
            )));
        }

        Ok(())
    }

    /// Get the database path, resolving defaults if not set.
    #[must_use]
    pub fn database_path(&self) -> PathBuf {
        self.storage
            .database_path
            .clone()
            .unwrap_or_else(|| Self::default_data_dir().join(DATABASE_FILE_NAME))
    }

    /// Get the upload directory, resolving defaults if not set.
    #[must_use]
    pub fn upload_dir(&self) -> PathBuf {
        self.upload
            .dir
            .clone()
            .unwrap_or_else(|| Self::default_data_dir().join(UPLOAD_DIR_NAME))
    }

    /// Get the converter request timeout as a Duration.
    #[must_use]
    pub fn converter_timeout(&self) -> Duration {
        Duration::from_secs(self.converter.timeout_secs)
    }

    /// The `host:port` string the server binds to.
    #[must_use]
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }

    /// Whether error details should be included in API responses.
    #[must_use]
    pub fn is_development(&self) -> bool {
        self.server.env.eq_ignore_ascii_case("development")
    }

    /// Verbosity derived from `logging.level`, `Normal` if unrecognised.
    #[must_use]
    pub fn verbosity(&self) -> Verbosity {
        Verbosity::from_level_name(&self.logging.level).unwrap_or_default()
    }
}

fn invalid(message: impl Into<String>) -> Error {
    Error::ConfigValidation {
        message: message.into(),
    }
}

//! Loading configuration files from disk or strings.

use crate::{ConfigValidator, SequencingConfig, ValidationError};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

/// Errors raised while loading configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("Failed to read config file '{path}': {source}")]
    Io {
        /// File that failed to load
        path: PathBuf,
        /// Underlying IO error
        source: std::io::Error,
    },

    /// The content could not be parsed.
    #[error("Failed to parse {format} config: {message}")]
    Parse {
        /// Format being parsed
        format: ConfigFormat,
        /// Parser message
        message: String,
    },

    /// The format is unknown or its feature is disabled.
    #[error("Unsupported config format: {0}")]
    UnsupportedFormat(String),

    /// The parsed configuration failed validation.
    #[error("Invalid configuration: {0}")]
    Validation(#[from] ValidationError),
}

/// Supported configuration file formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    /// TOML
    Toml,
    /// YAML
    Yaml,
    /// JSON
    Json,
}

impl ConfigFormat {
    /// Detect the format from a file extension.
    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let ext = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.to_lowercase())
            .unwrap_or_default();

        match ext.as_str() {
            "toml" => Ok(Self::Toml),
            "yaml" | "yml" => Ok(Self::Yaml),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::UnsupportedFormat(format!(
                "extension '{}' of {}",
                other,
                path.display()
            ))),
        }
    }
}

impl std::fmt::Display for ConfigFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigFormat::Toml => write!(f, "TOML"),
            ConfigFormat::Yaml => write!(f, "YAML"),
            ConfigFormat::Json => write!(f, "JSON"),
        }
    }
}

/// Loads and validates [`SequencingConfig`] values.
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load a configuration file, picking the format from its extension.
    pub async fn load_from_file(path: impl AsRef<Path>) -> Result<SequencingConfig, ConfigError> {
        let path = path.as_ref();
        let format = ConfigFormat::from_path(path)?;

        debug!("Loading {} config from {}", format, path.display());
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| ConfigError::Io {
                path: path.to_path_buf(),
                source,
            })?;

        let config = Self::load_from_str(&content, format)?;
        info!(
            "Loaded sequencing config from {} ({} processors, {} workers)",
            path.display(),
            config.processors.len(),
            config.workers
        );
        Ok(config)
    }

    /// Parse and validate configuration text.
    pub fn load_from_str(content: &str, format: ConfigFormat) -> Result<SequencingConfig, ConfigError> {
        let config = Self::parse(content, format)?;
        ConfigValidator::validate(&config)?;
        Ok(config)
    }

    fn parse(content: &str, format: ConfigFormat) -> Result<SequencingConfig, ConfigError> {
        let parse_error = |message: String| ConfigError::Parse { format, message };

        match format {
            ConfigFormat::Json => serde_json::from_str(content).map_err(|e| parse_error(e.to_string())),
            #[cfg(feature = "toml")]
            ConfigFormat::Toml => toml::from_str(content).map_err(|e| parse_error(e.to_string())),
            #[cfg(feature = "yaml")]
            ConfigFormat::Yaml => serde_yaml::from_str(content).map_err(|e| parse_error(e.to_string())),
            #[allow(unreachable_patterns)]
            other => Err(ConfigError::UnsupportedFormat(format!(
                "{} support is not compiled in",
                other
            ))),
        }
    }
}

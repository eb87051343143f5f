//! Configuration loading functionality
//!
//! Layers configuration sources with increasing priority:
//!
//! 1. Default values
//! 2. JSON configuration file
//! 3. Environment variables (`SNI_OVERRIDE_CONNECT_TIMEOUT_MS=5000`, ...)

use std::fs;
use std::path::Path;

use ::config::{Config, Environment, File, FileFormat};
use log::{debug, info};

use super::defaults::{DEFAULT_CONFIG_FILE, ENV_PREFIX};
use super::error::{ConfigError, Result};
use super::TransportConfig;

impl TransportConfig {
    /// Load configuration from a JSON file only
    ///
    /// Missing keys take their default values.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(ConfigError::FileNotFound(path.to_path_buf()));
        }

        let content = fs::read_to_string(path).map_err(|e| {
            ConfigError::Load(format!("failed to read config file {}: {}", path.display(), e))
        })?;

        serde_json::from_str(&content).map_err(|e| {
            ConfigError::Load(format!("failed to parse JSON config file {}: {}", path.display(), e))
        })
    }

    /// Load layered configuration
    ///
    /// When `path` is `None`, `sni-override.json` in the working directory
    /// is used if it exists. An explicit `path` must exist.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = Config::builder();

        match path {
            Some(path) => {
                if !path.is_file() {
                    return Err(ConfigError::FileNotFound(path.to_path_buf()));
                }
                info!("Loading configuration from {}", path.display());
                builder = builder.add_source(File::from(path).format(FileFormat::Json).required(true));
            }
            None => {
                let default_path = Path::new(DEFAULT_CONFIG_FILE);
                if default_path.is_file() {
                    info!("Loading configuration from {}", DEFAULT_CONFIG_FILE);
                    builder = builder.add_source(File::from(default_path).format(FileFormat::Json));
                } else {
                    debug!("No {} found, using defaults", DEFAULT_CONFIG_FILE);
                }
            }
        }

        builder = builder.add_source(
            Environment::with_prefix(ENV_PREFIX)
                .try_parsing(true)
                .list_separator(",")
                .with_list_parse_key("alpn"),
        );

        let config: TransportConfig = builder.build()?.try_deserialize()?;
        debug!("Loaded configuration: {:?}", config);
        Ok(config)
    }
}

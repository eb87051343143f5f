//! Configuration errors
//!
//! This module defines error types for override rules and transport
//! configuration.

use std::path::PathBuf;

use thiserror::Error;

/// Configuration error type
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Override address is not an IP address (optionally with a port)
    #[error("invalid override address '{value}': {reason}")]
    InvalidAddress {
        /// Rejected input
        value: String,
        /// Why it was rejected
        reason: String,
    },

    /// Hostname or hostname pattern is malformed
    #[error("invalid hostname '{value}': {reason}")]
    InvalidHostname {
        /// Rejected input
        value: String,
        /// Why it was rejected
        reason: String,
    },

    /// Certificate fingerprint is not a SHA-256 hex digest
    #[error("invalid certificate fingerprint '{value}': {reason}")]
    InvalidFingerprint {
        /// Rejected input
        value: String,
        /// Why it was rejected
        reason: String,
    },

    /// Invalid value for a configuration option
    #[error("invalid value for '{name}': {reason}")]
    InvalidValue {
        /// Option name
        name: String,
        /// Why it was rejected
        reason: String,
    },

    /// Skipping chain verification without a pinned fingerprint
    #[error("insecure_skip_chain_verification requires a pinned certificate fingerprint")]
    InsecureWithoutPin,

    /// File not found
    #[error("file not found: {}", .0.display())]
    FileNotFound(PathBuf),

    /// Error reading or parsing configuration sources
    #[error("failed to load configuration: {0}")]
    Load(String),
}

/// Result type alias for configuration operations
pub type Result<T> = std::result::Result<T, ConfigError>;

impl From<serde_json::Error> for ConfigError {
    fn from(err: serde_json::Error) -> Self {
        ConfigError::Load(err.to_string())
    }
}

impl From<::config::ConfigError> for ConfigError {
    fn from(err: ::config::ConfigError) -> Self {
        ConfigError::Load(err.to_string())
    }
}

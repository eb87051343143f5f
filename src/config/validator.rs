//! Configuration validator
//!
//! This module provides functionality for validating configuration.

use log::warn;

use super::error::{ConfigError, Result};
use super::TransportConfig;

impl TransportConfig {
    /// Validate the configuration
    ///
    /// Checks timeouts, ALPN identifiers, the CA file and every override
    /// entry. Returns the first problem found.
    pub fn validate(&self) -> Result<()> {
        validate_timeouts(self)?;
        validate_tls_settings(self)?;

        for entry in &self.overrides {
            entry.to_rule()?;
        }

        Ok(())
    }

    /// Check configuration for potential issues
    ///
    /// Unlike [`validate`](Self::validate) this never fails; it returns
    /// human-readable warnings.
    pub fn check_warnings(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        match self.log_level.as_str() {
            "error" | "warn" | "info" | "debug" | "trace" => {}
            level => warnings.push(format!("Invalid log level '{}', using default 'info'", level)),
        }

        if !self.use_system_roots && self.ca_file.is_none() {
            warnings.push(
                "System roots are disabled and no CA file is configured; only pinned connections can succeed"
                    .to_string(),
            );
        }

        if self.connect_timeout_ms > 60_000 {
            warnings.push(format!("Connect timeout of {} ms is unusually long", self.connect_timeout_ms));
        }

        warnings
    }
}

fn validate_timeouts(config: &TransportConfig) -> Result<()> {
    if config.connect_timeout_ms == 0 {
        return Err(ConfigError::InvalidValue {
            name: "connect_timeout_ms".to_string(),
            reason: "Connect timeout must be greater than 0".to_string(),
        });
    }

    if config.handshake_timeout_ms == 0 {
        return Err(ConfigError::InvalidValue {
            name: "handshake_timeout_ms".to_string(),
            reason: "Handshake timeout must be greater than 0".to_string(),
        });
    }

    if config.tcp_keepalive_secs == Some(0) {
        return Err(ConfigError::InvalidValue {
            name: "tcp_keepalive_secs".to_string(),
            reason: "Keepalive must be greater than 0 when set".to_string(),
        });
    }

    Ok(())
}

fn validate_tls_settings(config: &TransportConfig) -> Result<()> {
    if let Some(ref ca_file) = config.ca_file {
        if !ca_file.is_file() {
            return Err(ConfigError::FileNotFound(ca_file.clone()));
        }
    }

    for protocol in &config.alpn {
        if protocol.is_empty() || protocol.len() > 255 {
            return Err(ConfigError::InvalidValue {
                name: "alpn".to_string(),
                reason: format!("ALPN protocol '{}' must be 1-255 bytes", protocol),
            });
        }
    }

    if !config.use_system_roots && config.ca_file.is_none() {
        warn!("No trusted roots configured");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::OverrideEntry;
    use std::path::PathBuf;

    #[test]
    fn test_default_config_is_valid() {
        assert!(TransportConfig::default().validate().is_ok());
        assert!(TransportConfig::default().check_warnings().is_empty());
    }

    #[test]
    fn test_zero_timeouts_rejected() {
        let mut config = TransportConfig::default();
        config.connect_timeout_ms = 0;
        assert!(config.validate().is_err());

        let mut config = TransportConfig::default();
        config.handshake_timeout_ms = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_bad_override_rejected() {
        let mut config = TransportConfig::default();
        config.overrides.push(OverrideEntry {
            host: "example.org".to_string(),
            address: "not-an-ip".to_string(),
            port: None,
        });
        assert!(matches!(config.validate(), Err(ConfigError::InvalidAddress { .. })));
    }

    #[test]
    fn test_missing_ca_file_rejected() {
        let mut config = TransportConfig::default();
        config.ca_file = Some(PathBuf::from("does/not/exist.pem"));
        assert!(matches!(config.validate(), Err(ConfigError::FileNotFound(_))));
    }

    #[test]
    fn test_warnings() {
        let mut config = TransportConfig::default();
        config.log_level = "loud".to_string();
        config.use_system_roots = false;
        assert_eq!(config.check_warnings().len(), 2);
    }
}

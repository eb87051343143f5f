//! Configuration module
//!
//! This module holds the transport configuration: timeouts, socket options,
//! TLS trust settings and the overrides to pre-load. Configuration is
//! layered as defaults, then an optional JSON file, then environment
//! variables prefixed with `SNI_OVERRIDE_`.

mod defaults;
mod error;
mod loader;
mod validator;

pub use self::defaults::{DEFAULT_CONFIG_FILE, ENV_PREFIX, LOG_LEVEL_STR};
pub use self::error::{ConfigError, Result};

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::common::parse_override_addr;
use crate::rules::OverrideRule;

/// Minimum TLS protocol version offered to servers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TlsVersion {
    /// TLS 1.2
    Tls12,
    /// TLS 1.3
    Tls13,
}

impl Default for TlsVersion {
    #[inline]
    fn default() -> Self {
        defaults::min_tls_version()
    }
}

impl fmt::Display for TlsVersion {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tls12 => write!(f, "1.2"),
            Self::Tls13 => write!(f, "1.3"),
        }
    }
}

impl FromStr for TlsVersion {
    type Err = ConfigError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "1.2" | "tls1.2" | "tlsv1.2" => Ok(Self::Tls12),
            "1.3" | "tls1.3" | "tlsv1.3" => Ok(Self::Tls13),
            _ => Err(ConfigError::InvalidValue {
                name: "min_tls_version".to_string(),
                reason: format!("unsupported TLS version '{}'. Valid values are: 1.2, 1.3", s),
            }),
        }
    }
}

impl Serialize for TlsVersion {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

// Environment values such as `1.3` arrive as floats once parsed
impl<'de> Deserialize<'de> for TlsVersion {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        struct TlsVersionVisitor;

        impl<'de> Visitor<'de> for TlsVersionVisitor {
            type Value = TlsVersion;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "a TLS version such as \"1.2\" or \"1.3\"")
            }

            fn visit_str<E: de::Error>(self, v: &str) -> std::result::Result<TlsVersion, E> {
                TlsVersion::from_str(v).map_err(E::custom)
            }

            fn visit_f64<E: de::Error>(self, v: f64) -> std::result::Result<TlsVersion, E> {
                self.visit_str(&v.to_string())
            }
        }

        deserializer.deserialize_any(TlsVersionVisitor)
    }
}

/// One configured override
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OverrideEntry {
    /// Hostname or `*.suffix` pattern
    pub host: String,
    /// Target IP, optionally with `:port`
    pub address: String,
    /// Target port; may also be given inside `address`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
}

impl OverrideEntry {
    /// Build the rule this entry describes
    pub fn to_rule(&self) -> Result<OverrideRule> {
        let (ip, addr_port) = parse_override_addr(&self.address)?;

        let port = match (addr_port, self.port) {
            (Some(a), Some(b)) if a != b => {
                return Err(ConfigError::InvalidValue {
                    name: format!("overrides[{}].port", self.host),
                    reason: format!("port {} conflicts with port {} in address", b, a),
                });
            }
            (Some(a), _) => Some(a),
            (None, p) => p,
        };

        OverrideRule::new(&self.host, ip, port)
    }
}

/// Transport configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    // --- Dialer settings ---

    /// TCP connect timeout in milliseconds, DNS included
    #[serde(default = "defaults::connect_timeout_ms")]
    pub connect_timeout_ms: u64,

    /// Set `TCP_NODELAY` on dialed sockets
    #[serde(default = "defaults::tcp_nodelay")]
    pub tcp_nodelay: bool,

    /// TCP keepalive idle time in seconds
    #[serde(default = "defaults::tcp_keepalive_secs", skip_serializing_if = "Option::is_none")]
    pub tcp_keepalive_secs: Option<u64>,

    // --- TLS settings ---

    /// TLS handshake timeout in milliseconds
    #[serde(default = "defaults::handshake_timeout_ms")]
    pub handshake_timeout_ms: u64,

    /// Minimum TLS protocol version
    #[serde(default = "defaults::min_tls_version")]
    pub min_tls_version: TlsVersion,

    /// Extra trusted root certificates (PEM bundle)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ca_file: Option<PathBuf>,

    /// Trust the platform root store
    #[serde(default = "defaults::use_system_roots")]
    pub use_system_roots: bool,

    /// ALPN protocols to offer, in preference order
    #[serde(default = "defaults::alpn")]
    pub alpn: Vec<String>,

    // --- General settings ---

    /// Log level (error, warn, info, debug, trace)
    #[serde(default = "defaults::log_level")]
    pub log_level: String,

    /// Overrides to register at startup
    #[serde(default = "defaults::overrides")]
    pub overrides: Vec<OverrideEntry>,
}

impl Default for TransportConfig {
    #[inline]
    fn default() -> Self {
        Self {
            connect_timeout_ms: defaults::connect_timeout_ms(),
            tcp_nodelay: defaults::tcp_nodelay(),
            tcp_keepalive_secs: defaults::tcp_keepalive_secs(),
            handshake_timeout_ms: defaults::handshake_timeout_ms(),
            min_tls_version: defaults::min_tls_version(),
            ca_file: None,
            use_system_roots: defaults::use_system_roots(),
            alpn: defaults::alpn(),
            log_level: defaults::log_level(),
            overrides: defaults::overrides(),
        }
    }
}

impl TransportConfig {
    /// Connect timeout as a `Duration`
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    /// Handshake timeout as a `Duration`
    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_millis(self.handshake_timeout_ms)
    }

    /// Keepalive idle time as a `Duration`
    pub fn tcp_keepalive(&self) -> Option<Duration> {
        self.tcp_keepalive_secs.map(Duration::from_secs)
    }

    /// Build the rules for every configured override
    pub fn override_rules(&self) -> Result<Vec<OverrideRule>> {
        self.overrides.iter().map(OverrideEntry::to_rule).collect()
    }

    /// Log the effective configuration
    pub fn log(&self) {
        use log::info;

        if !log::log_enabled!(log::Level::Info) {
            return;
        }

        info!("=== Transport Configuration ===");
        info!("  Connect timeout: {} ms", self.connect_timeout_ms);
        info!("  TCP_NODELAY: {}", self.tcp_nodelay);
        if let Some(keepalive) = self.tcp_keepalive_secs {
            info!("  TCP keepalive: {} s", keepalive);
        }
        info!("  Handshake timeout: {} ms", self.handshake_timeout_ms);
        info!("  Minimum TLS version: {}", self.min_tls_version);
        info!("  System roots: {}", self.use_system_roots);
        if let Some(ref ca_file) = self.ca_file {
            info!("  CA file: {}", ca_file.display());
        }
        if !self.alpn.is_empty() {
            info!("  ALPN: {}", self.alpn.join(","));
        }
        for entry in &self.overrides {
            info!("  Override: {} -> {}", entry.host, entry.address);
        }
        info!("===============================");
    }
}
